//! DDL renderers.
//!
//! A renderer turns synthesized [`Action`]s into SQL statements for one
//! database system. The default methods of [`DdlRenderer`] produce standard
//! SQL (the generic dialect); dialects override what differs.

mod mysql;

pub use mysql::{MySqlDialect, MySqlTypes};

use std::sync::OnceLock;

use regex::Regex;

use oxide_schema::expr::{write_sql, ColumnName, SqlExpr, SqlQuery};
use oxide_schema::graph::ComputationStorage;
use oxide_schema::synth::{
    CheckDefinition, ColumnDefinition, ForeignKeyDefinition, IndexDefinition, KeyDefinition,
    PrimaryKeyDefinition, TableDefinition, TableRename,
};
use oxide_schema::{
    Action, AlterClause, ColumnType, QualifiedName, ReferentialAction, SortOrder, StandardTypes,
    TypeRegistry, ValueType,
};

/// Prefix of the temporary names renames are parked under.
pub const PARKING_PREFIX: &str = "_oxide_tmp_";

/// Errors raised while rendering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// The dialect cannot express an action.
    #[error("{dialect} does not support {feature}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// What was asked for.
        feature: String,
    },

    /// A native type name the dialect does not know.
    #[error("Unknown column type '{0}'")]
    UnknownType(String),
}

/// Result type for rendering.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

/// How one `ALTER TABLE` clause is rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClauseSql {
    /// Part of a comma-separated `ALTER TABLE` statement.
    Inline(String),
    /// A statement of its own.
    Statement(String),
}

/// Trait for database-specific DDL generation.
pub trait DdlRenderer: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the type registry databases targeting this dialect use.
    fn types(&self) -> Box<dyn TypeRegistry>;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quotes a schema-qualified name.
    fn qualified(&self, name: &QualifiedName) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(&name.schema),
            self.quote_identifier(&name.name)
        )
    }

    /// Renders one action. Some actions need several statements.
    fn render(&self, action: &Action) -> RenderResult<Vec<String>> {
        match action {
            Action::CreateSchema { name } => {
                Ok(vec![format!("CREATE SCHEMA {}", self.quote_identifier(name))])
            }
            Action::DropSchema { name } => {
                Ok(vec![format!("DROP SCHEMA {}", self.quote_identifier(name))])
            }
            Action::CreateTable { table } => self.create_table(table),
            Action::DropTable { name } => Ok(vec![format!("DROP TABLE {}", self.qualified(name))]),
            Action::RenameTables { renames } => Ok(self.rename_tables(renames)),
            Action::AlterTable { table, clauses } => self.alter_table(table, clauses),
            Action::Backfill {
                table,
                column,
                value,
            } => {
                let column = self.quote_identifier(column);
                Ok(vec![format!(
                    "UPDATE {} SET {column} = {} WHERE {column} IS NULL",
                    self.qualified(table),
                    value.to_sql()
                )])
            }
            Action::CreateView { view } => Ok(vec![format!(
                "CREATE VIEW {} AS {}",
                self.qualified(&view.name),
                self.render_query(&view.query)
            )]),
            Action::DropView { name } => Ok(vec![format!("DROP VIEW {}", self.qualified(name))]),
        }
    }

    /// Generates SQL for creating a table and its indexes.
    fn create_table(&self, table: &TableDefinition) -> RenderResult<Vec<String>> {
        let mut elements: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        if let Some(key) = &table.primary_key {
            elements.push(self.primary_key_constraint(key));
        }
        elements.extend(table.checks.iter().map(|c| self.check_constraint(c)));

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.qualified(&table.name),
            elements.join(",\n  ")
        )];
        for index in &table.indexes {
            statements.push(self.index_definition(&table.name, index)?);
        }
        Ok(statements)
    }

    /// Generates SQL for renaming and moving tables, one statement per step.
    fn rename_tables(&self, renames: &[TableRename]) -> Vec<String> {
        staged_table_renames(renames)
            .iter()
            .flat_map(|rename| {
                let mut statements = Vec::new();
                let mut current = rename.from.clone();
                if current.schema != rename.to.schema {
                    statements.push(format!(
                        "ALTER TABLE {} SET SCHEMA {}",
                        self.qualified(&current),
                        self.quote_identifier(&rename.to.schema)
                    ));
                    current.schema.clone_from(&rename.to.schema);
                }
                if current.name != rename.to.name {
                    statements.push(format!(
                        "ALTER TABLE {} RENAME TO {}",
                        self.qualified(&current),
                        self.quote_identifier(&rename.to.name)
                    ));
                }
                statements
            })
            .collect()
    }

    /// Generates SQL for one `AlterTable` action.
    ///
    /// Renames run one statement at a time here, so swapped names are
    /// parked first.
    fn alter_table(
        &self,
        table: &QualifiedName,
        clauses: &[AlterClause],
    ) -> RenderResult<Vec<String>> {
        assemble_alter(self, table, &staged_clause_renames(clauses))
    }

    /// Renders one `ALTER TABLE` clause.
    fn alter_clause(&self, table: &QualifiedName, clause: &AlterClause) -> RenderResult<ClauseSql> {
        standard_clause(self, table, clause)
    }

    /// Generates column definition SQL.
    fn column_definition(&self, column: &ColumnDefinition) -> String {
        let mut parts = vec![
            self.quote_identifier(&column.name),
            column.column_type.to_sql(),
        ];

        if let Some(computation) = &column.computation {
            let storage = match computation.storage {
                ComputationStorage::Virtual => "VIRTUAL",
                ComputationStorage::Stored => "STORED",
            };
            parts.push(format!(
                "GENERATED ALWAYS AS ({}) {storage}",
                self.render_expr(&computation.expression)
            ));
        }

        if !column.nullable {
            parts.push("NOT NULL".to_string());
        }

        if let Some(default) = &column.default {
            parts.push(format!("DEFAULT {}", self.render_default(default)));
        }

        parts.join(" ")
    }

    /// Generates SQL for changing a column in place.
    fn modify_column(&self, column: &ColumnDefinition) -> String {
        let name = self.quote_identifier(&column.name);
        let mut parts = vec![format!(
            "ALTER COLUMN {name} TYPE {}",
            column.column_type.to_sql()
        )];
        if let Some(computation) = &column.computation {
            parts.push(format!(
                "ALTER COLUMN {name} SET EXPRESSION AS ({})",
                self.render_expr(&computation.expression)
            ));
        }
        let nullability = if column.nullable { "DROP" } else { "SET" };
        parts.push(format!("ALTER COLUMN {name} {nullability} NOT NULL"));
        parts.push(self.set_default(&column.name, column.default.as_ref()));
        parts.join(", ")
    }

    /// Generates SQL for setting or dropping a column default.
    fn set_default(&self, column: &str, default: Option<&SqlExpr>) -> String {
        let name = self.quote_identifier(column);
        match default {
            Some(expr) => format!(
                "ALTER COLUMN {name} SET DEFAULT {}",
                self.render_default(expr)
            ),
            None => format!("ALTER COLUMN {name} DROP DEFAULT"),
        }
    }

    /// Generates SQL for creating an index.
    fn index_definition(
        &self,
        table: &QualifiedName,
        index: &IndexDefinition,
    ) -> RenderResult<String> {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.qualified(table));
        sql.push_str(" (");
        sql.push_str(&self.key_list(&index.keys));
        sql.push(')');

        if let Some(filter) = &index.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_expr(filter));
        }

        Ok(sql)
    }

    /// Renders index keys, expressions in parentheses.
    fn key_list(&self, keys: &[KeyDefinition]) -> String {
        keys.iter()
            .map(|key| {
                let mut sql = match key.column() {
                    Some(column) => self.quote_identifier(column),
                    None => format!("({})", self.render_expr(&key.expr)),
                };
                if key.order == SortOrder::Descending {
                    sql.push_str(" DESC");
                }
                sql
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders a parenthesized column list.
    fn column_list(&self, columns: &[String]) -> String {
        let quoted: Vec<String> = columns.iter().map(|c| self.quote_identifier(c)).collect();
        quoted.join(", ")
    }

    /// `CONSTRAINT name PRIMARY KEY (...)`.
    fn primary_key_constraint(&self, key: &PrimaryKeyDefinition) -> String {
        format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            self.quote_identifier(&key.name),
            self.column_list(&key.columns)
        )
    }

    /// `CONSTRAINT name CHECK (...)`.
    fn check_constraint(&self, check: &CheckDefinition) -> String {
        format!(
            "CONSTRAINT {} CHECK ({})",
            self.quote_identifier(&check.name),
            self.render_expr(&check.condition)
        )
    }

    /// `CONSTRAINT name FOREIGN KEY (...) REFERENCES ...`.
    fn foreign_key_constraint(&self, key: &ForeignKeyDefinition) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&key.name),
            self.column_list(&key.columns),
            self.qualified(&key.referenced_table),
            self.column_list(&key.referenced_columns)
        );
        if key.on_delete != ReferentialAction::NoAction {
            sql.push_str(" ON DELETE ");
            sql.push_str(key.on_delete.as_sql());
        }
        if key.on_update != ReferentialAction::NoAction {
            sql.push_str(" ON UPDATE ");
            sql.push_str(key.on_update.as_sql());
        }
        sql
    }

    /// Renders an expression.
    fn render_expr(&self, expr: &SqlExpr) -> String {
        let mut out = String::new();
        write_sql(&mut out, expr, &|column: &ColumnName| {
            self.column_name(column)
        });
        out
    }

    /// Renders a default value expression.
    fn render_default(&self, expr: &SqlExpr) -> String {
        self.render_expr(expr)
    }

    /// Renders a column reference; view queries carry qualifiers.
    fn column_name(&self, column: &ColumnName) -> String {
        match &column.qualifier {
            Some(qualifier) => format!(
                "{}.{}",
                self.qualified(qualifier),
                self.quote_identifier(&column.name)
            ),
            None => self.quote_identifier(&column.name),
        }
    }

    /// Renders a view query.
    fn render_query(&self, query: &SqlQuery) -> String {
        let mut sql = String::from("SELECT ");
        if query.distinct {
            sql.push_str("DISTINCT ");
        }
        let columns: Vec<String> = query
            .columns
            .iter()
            .map(|projection| match &projection.alias {
                Some(alias) => format!(
                    "{} AS {}",
                    self.render_expr(&projection.expr),
                    self.quote_identifier(alias)
                ),
                None => self.render_expr(&projection.expr),
            })
            .collect();
        sql.push_str(&columns.join(", "));

        if !query.from.is_empty() {
            let sources: Vec<String> = query.from.iter().map(|s| self.qualified(s)).collect();
            sql.push_str(" FROM ");
            sql.push_str(&sources.join(", "));
        }
        if let Some(filter) = &query.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_expr(filter));
        }
        if !query.group_by.is_empty() {
            let groups: Vec<String> = query.group_by.iter().map(|e| self.render_expr(e)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }
        sql
    }

    /// Maps a native type name (upper case, without parameters) to its
    /// logical type.
    fn value_type_of(&self, native: &str) -> Option<ValueType> {
        standard_value_type(native)
    }

    /// Parses a native type such as `VARCHAR(40)` or `DECIMAL(10, 2)`.
    fn parse_column_type(&self, text: &str) -> RenderResult<ColumnType> {
        let unknown = || RenderError::UnknownType(text.to_string());
        let captures = type_pattern().captures(text).ok_or_else(unknown)?;
        let native = captures[1]
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_uppercase();
        let value_type = self.value_type_of(&native).ok_or_else(unknown)?;
        let first = captures
            .get(2)
            .map(|m| m.as_str().parse::<u32>())
            .transpose()
            .map_err(|_| unknown())?;
        let second = captures
            .get(3)
            .map(|m| m.as_str().parse::<u8>())
            .transpose()
            .map_err(|_| unknown())?;

        let mut column_type = ColumnType::new(value_type, native);
        match (value_type, first, second) {
            (ValueType::Decimal, Some(precision), scale) => {
                column_type.precision = Some(u8::try_from(precision).map_err(|_| unknown())?);
                column_type.scale = scale;
            }
            (_, Some(length), None) => column_type.length = Some(length),
            (_, None, _) => {}
            (_, Some(_), Some(_)) => return Err(unknown()),
        }
        Ok(column_type)
    }
}

/// Standard SQL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl GenericDialect {
    /// Creates a new generic dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DdlRenderer for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn types(&self) -> Box<dyn TypeRegistry> {
        Box::new(StandardTypes)
    }
}

/// Returns the renderer registered under `name`.
#[must_use]
pub fn dialect_by_name(name: &str) -> Option<Box<dyn DdlRenderer>> {
    match name.to_ascii_lowercase().as_str() {
        "generic" => Some(Box::new(GenericDialect)),
        "mysql" => Some(Box::new(MySqlDialect)),
        _ => None,
    }
}

/// Logical type of a standard SQL type name.
#[must_use]
pub fn standard_value_type(native: &str) -> Option<ValueType> {
    let value_type = match native {
        "BOOLEAN" | "BOOL" => ValueType::Boolean,
        "SMALLINT" => ValueType::SmallInt,
        "INTEGER" | "INT" => ValueType::Integer,
        "BIGINT" => ValueType::BigInt,
        "DECIMAL" | "NUMERIC" => ValueType::Decimal,
        "REAL" => ValueType::Real,
        "DOUBLE PRECISION" | "DOUBLE" => ValueType::Double,
        "TEXT" => ValueType::Text,
        "VARCHAR" | "CHARACTER VARYING" => ValueType::Varchar,
        "BLOB" | "BYTEA" => ValueType::Blob,
        "DATE" => ValueType::Date,
        "TIME" => ValueType::Time,
        "TIMESTAMP" => ValueType::Timestamp,
        "UUID" => ValueType::Uuid,
        "JSON" | "JSONB" => ValueType::Json,
        _ => return None,
    };
    Some(value_type)
}

fn type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z][A-Za-z ]*?)\s*(?:\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\))?\s*$")
            .expect("valid type regex")
    })
}

/// Orders `(from, to)` renames for one-at-a-time execution.
///
/// When a target is still held by a source that has not moved yet (a swap
/// or a cycle), every source is first parked under a temporary name and
/// then moved to its target.
pub fn stage_renames<T: Clone + PartialEq>(
    renames: &[(T, T)],
    park: impl Fn(usize, &T) -> T,
) -> Vec<(T, T)> {
    let blocked = renames
        .iter()
        .enumerate()
        .any(|(i, (_, to))| renames[i + 1..].iter().any(|(from, _)| from == to));
    if !blocked {
        return renames.to_vec();
    }

    let parked: Vec<T> = renames
        .iter()
        .enumerate()
        .map(|(i, (from, _))| park(i, from))
        .collect();
    let mut staged: Vec<(T, T)> = renames
        .iter()
        .zip(&parked)
        .map(|((from, _), parked)| (from.clone(), parked.clone()))
        .collect();
    staged.extend(
        renames
            .iter()
            .zip(parked)
            .map(|((_, to), parked)| (parked, to.clone())),
    );
    staged
}

/// [`stage_renames`] for table renames; tables are parked in their source
/// schema.
#[must_use]
pub fn staged_table_renames(renames: &[TableRename]) -> Vec<TableRename> {
    let pairs: Vec<(QualifiedName, QualifiedName)> = renames
        .iter()
        .map(|r| (r.from.clone(), r.to.clone()))
        .collect();
    stage_renames(&pairs, |i, from| {
        QualifiedName::new(from.schema.clone(), format!("{PARKING_PREFIX}{i}"))
    })
    .into_iter()
    .map(|(from, to)| TableRename { from, to })
    .collect()
}

/// Stages column and index renames of one statement; other clauses keep
/// their order after them.
fn staged_clause_renames(clauses: &[AlterClause]) -> Vec<AlterClause> {
    let park = |i: usize, _: &String| format!("{PARKING_PREFIX}{i}");
    let columns: Vec<(String, String)> = clauses
        .iter()
        .filter_map(|c| match c {
            AlterClause::RenameColumn { from, to } => Some((from.clone(), to.clone())),
            _ => None,
        })
        .collect();
    let indexes: Vec<(String, String)> = clauses
        .iter()
        .filter_map(|c| match c {
            AlterClause::RenameIndex { from, to } => Some((from.clone(), to.clone())),
            _ => None,
        })
        .collect();

    let mut staged: Vec<AlterClause> = stage_renames(&columns, park)
        .into_iter()
        .map(|(from, to)| AlterClause::RenameColumn { from, to })
        .collect();
    staged.extend(
        stage_renames(&indexes, park)
            .into_iter()
            .map(|(from, to)| AlterClause::RenameIndex { from, to }),
    );
    staged.extend(clauses.iter().filter(|c| !c.is_rename()).cloned());
    staged
}

/// Joins consecutive inline clauses into `ALTER TABLE` statements, keeping
/// standalone statements in clause order.
pub fn assemble_alter<R: DdlRenderer + ?Sized>(
    renderer: &R,
    table: &QualifiedName,
    clauses: &[AlterClause],
) -> RenderResult<Vec<String>> {
    let target = renderer.qualified(table);
    let mut statements = Vec::new();
    let mut inline: Vec<String> = Vec::new();
    for clause in clauses {
        match renderer.alter_clause(table, clause)? {
            ClauseSql::Inline(sql) => inline.push(sql),
            ClauseSql::Statement(sql) => {
                if !inline.is_empty() {
                    statements.push(format!("ALTER TABLE {target} {}", inline.join(", ")));
                    inline.clear();
                }
                statements.push(sql);
            }
        }
    }
    if !inline.is_empty() {
        statements.push(format!("ALTER TABLE {target} {}", inline.join(", ")));
    }
    Ok(statements)
}

/// Standard SQL rendering of an `ALTER TABLE` clause.
pub fn standard_clause<R: DdlRenderer + ?Sized>(
    renderer: &R,
    table: &QualifiedName,
    clause: &AlterClause,
) -> RenderResult<ClauseSql> {
    let quote = |name: &str| renderer.quote_identifier(name);
    let sibling = |name: &str| renderer.qualified(&QualifiedName::new(table.schema.clone(), name));
    let sql = match clause {
        AlterClause::RenameColumn { from, to } => ClauseSql::Statement(format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            renderer.qualified(table),
            quote(from),
            quote(to)
        )),
        AlterClause::RenameIndex { from, to } => {
            ClauseSql::Statement(format!("ALTER INDEX {} RENAME TO {}", sibling(from), quote(to)))
        }
        AlterClause::DropForeignKey { name }
        | AlterClause::DropCheck { name }
        | AlterClause::DropPrimaryKey { name } => {
            ClauseSql::Inline(format!("DROP CONSTRAINT {}", quote(name)))
        }
        AlterClause::DropIndex { name } => {
            ClauseSql::Statement(format!("DROP INDEX {}", sibling(name)))
        }
        AlterClause::DropColumn { name } => ClauseSql::Inline(format!("DROP COLUMN {}", quote(name))),
        AlterClause::AddColumn { column } => {
            ClauseSql::Inline(format!("ADD COLUMN {}", renderer.column_definition(column)))
        }
        AlterClause::ModifyColumn { column } => ClauseSql::Inline(renderer.modify_column(column)),
        AlterClause::SetDefault { column, default } => {
            ClauseSql::Inline(renderer.set_default(column, default.as_ref()))
        }
        AlterClause::AddPrimaryKey { key } => {
            ClauseSql::Inline(format!("ADD {}", renderer.primary_key_constraint(key)))
        }
        AlterClause::AddIndex { index } => {
            ClauseSql::Statement(renderer.index_definition(table, index)?)
        }
        AlterClause::AddCheck { check } => {
            ClauseSql::Inline(format!("ADD {}", renderer.check_constraint(check)))
        }
        AlterClause::AddForeignKey { key } => {
            ClauseSql::Inline(format!("ADD {}", renderer.foreign_key_constraint(key)))
        }
    };
    Ok(sql)
}
