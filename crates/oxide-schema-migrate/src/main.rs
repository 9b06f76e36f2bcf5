//! oxide-schema CLI
//!
//! Command-line tool that turns JSON edit scripts into migration SQL.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_schema::TrackingMode;
use oxide_schema_migrate::prelude::*;

/// Plans schema migrations from edit scripts.
#[derive(Parser)]
#[command(name = "oxide-schema")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// SQL dialect to render (generic, mysql).
    #[arg(short, long, env = "OXIDE_SCHEMA_DIALECT", default_value = "generic")]
    dialect: String,

    /// Name of the schema unqualified paths refer to.
    #[arg(long, env = "OXIDE_SCHEMA_DEFAULT", default_value = "main")]
    default_schema: String,

    /// Overrides the dialect's identifier length limit.
    #[arg(long)]
    max_identifier_length: Option<usize>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize the changes of a script and print or write the SQL.
    Plan {
        /// Edit script (JSON).
        script: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = Format::Sql)]
        format: Format,

        /// File to write the migration to.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the output instead of writing it (dry run).
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate a script and report what it would do, without rendering.
    Check {
        /// Edit script (JSON).
        script: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Sql,
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let renderer = renderer(&cli.dialect)?;
    let options = DatabaseOptions {
        default_schema: cli.default_schema.clone(),
        max_identifier_length: cli.max_identifier_length,
    };

    match cli.command {
        Commands::Plan {
            script,
            format,
            output,
            dry_run,
        } => {
            let loaded = Script::load(&script)?;
            let plan = plan(&loaded, renderer.as_ref(), options)?;
            let text = match format {
                Format::Sql => plan.to_sql(chrono::Utc::now()),
                Format::Json => plan.to_json()?,
            };

            match output {
                Some(path) if !dry_run => {
                    std::fs::write(&path, text)?;
                    info!("Wrote {} statements to {}", plan.statements.len(), path.display());
                }
                Some(path) => {
                    info!("Dry run - would write {}", path.display());
                    println!("{text}");
                }
                None => println!("{text}"),
            }
        }

        Commands::Check { script } => {
            let loaded = Script::load(&script)?;
            let mut db = load(&loaded, renderer.as_ref(), options)?;
            db.set_tracking_mode(TrackingMode::DryRun);
            let actions = db.complete_pending_changes();

            if actions.is_empty() {
                info!("Script is valid; no changes to apply.");
            } else {
                println!("\nPending actions ({}):", renderer.name());
                println!("{:-<60}", "");
                for action in &actions {
                    println!(" - {}", action.label());
                }
                println!();
                info!("Script is valid; {} actions pending.", actions.len());
            }
        }
    }

    Ok(())
}
