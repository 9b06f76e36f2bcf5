//! DDL renderers, edit scripts and a command line front end for
//! `oxide-schema`.
//!
//! `oxide-schema` turns edits of a schema model into ordered [`Action`]s;
//! this crate turns those into SQL:
//!
//! - **Dialect** - [`DdlRenderer`] implementations for standard SQL and MySQL,
//!   including native type parsing
//! - **Script** - JSON edit scripts with a baseline (the live schema) and the
//!   changes to plan
//! - **Plan** - synthesized actions with their rendered statements
//!
//! # Example
//!
//! ```rust
//! use oxide_schema_migrate::prelude::*;
//!
//! let script = Script::from_json(r#"{
//!     "baseline": [{ "op": "create_table", "table": "users",
//!                    "columns": [{ "name": "id", "type": "BIGINT" }] }],
//!     "changes": [{ "op": "rename",
//!                   "target": { "kind": "table", "path": "users" }, "to": "accounts" }]
//! }"#).unwrap();
//!
//! let plan = plan(&script, &GenericDialect, DatabaseOptions::default()).unwrap();
//! assert_eq!(
//!     plan.statements,
//!     vec![r#"ALTER TABLE "main"."users" RENAME TO "accounts""#]
//! );
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the SQL for a script
//! oxide-schema plan changes.json
//!
//! # Write a MySQL migration file
//! oxide-schema --dialect mysql plan changes.json --output 0002_rename.sql
//!
//! # Validate a script without rendering
//! oxide-schema check changes.json
//! ```

pub mod dialect;
pub mod error;
pub mod script;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use oxide_schema::{Action, Database, DatabaseOptions};

use crate::dialect::{dialect_by_name, DdlRenderer};
use crate::error::{MigrateError, Result};
use crate::script::Script;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{
        DdlRenderer, GenericDialect, MySqlDialect, MySqlTypes, RenderError, RenderResult,
    };
    pub use crate::error::{MigrateError, Result};
    pub use crate::script::{ColumnSpec, Edit, ExprSpec, Script, Target};
    pub use crate::{load, plan, renderer, Plan};
    pub use oxide_schema::DatabaseOptions;
}

/// Synthesized actions and the statements rendered from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    /// Dialect the statements are written in.
    pub dialect: &'static str,
    pub actions: Vec<Action>,
    pub statements: Vec<String>,
}

impl Plan {
    /// Renders `actions` with `renderer`.
    pub fn render(renderer: &dyn DdlRenderer, actions: Vec<Action>) -> Result<Self> {
        let mut statements = Vec::new();
        for action in &actions {
            let rendered = renderer.render(action)?;
            debug!(action = action.label(), statements = rendered.len(), "rendered action");
            statements.extend(rendered);
        }
        Ok(Self {
            dialect: renderer.name(),
            actions,
            statements,
        })
    }

    /// Whether there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// A migration script: a comment header, then one statement per line
    /// group, each terminated by `;`.
    #[must_use]
    pub fn to_sql(&self, generated_at: DateTime<Utc>) -> String {
        let mut sql = format!(
            "-- oxide-schema migration ({})\n-- Generated: {}\n\n",
            self.dialect,
            generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if self.statements.is_empty() {
            sql.push_str("-- No changes\n");
        }
        for statement in &self.statements {
            sql.push_str(statement);
            sql.push_str(";\n");
        }
        sql
    }

    /// The actions as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Returns the renderer registered under `name`.
pub fn renderer(name: &str) -> Result<Box<dyn DdlRenderer>> {
    dialect_by_name(name).ok_or_else(|| MigrateError::UnknownDialect(name.to_string()))
}

/// Builds a database from `script`, leaving its changes pending.
pub fn load(
    script: &Script,
    renderer: &dyn DdlRenderer,
    options: DatabaseOptions,
) -> Result<Database> {
    let mut db = Database::with_options(renderer.types(), options);
    script.apply(&mut db, renderer)?;
    Ok(db)
}

/// Synthesizes and renders the changes of `script`.
pub fn plan(
    script: &Script,
    renderer: &dyn DdlRenderer,
    options: DatabaseOptions,
) -> Result<Plan> {
    let mut db = load(script, renderer, options)?;
    let plan = Plan::render(renderer, db.complete_pending_changes())?;
    info!(
        dialect = plan.dialect,
        actions = plan.actions.len(),
        statements = plan.statements.len(),
        "planned migration"
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::dialect::GenericDialect;

    #[test]
    fn test_sql_script_header() {
        let plan = Plan {
            dialect: "generic",
            actions: Vec::new(),
            statements: vec!["DROP TABLE \"main\".\"t\"".to_string()],
        };
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(
            plan.to_sql(at),
            "-- oxide-schema migration (generic)\n-- Generated: 2024-05-01 12:30:00 UTC\n\n\
             DROP TABLE \"main\".\"t\";\n"
        );
    }

    #[test]
    fn test_empty_plan() {
        let plan = plan(&Script::default(), &GenericDialect, DatabaseOptions::default()).unwrap();
        assert!(plan.is_empty());
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert!(plan.to_sql(at).ends_with("-- No changes\n"));
    }

    #[test]
    fn test_unknown_dialect() {
        assert!(matches!(
            renderer("oracle"),
            Err(MigrateError::UnknownDialect(name)) if name == "oracle"
        ));
    }
}
