//! JSON edit scripts.
//!
//! A script has two sections. `baseline` describes the schema as it exists
//! on the server: it is applied and accepted without emitting DDL.
//! `changes` holds the edits to turn into a migration.
//!
//! Objects are addressed by dotted paths: `table` or `schema.table` for
//! tables and views, `table.member` or `schema.table.member` for columns,
//! indexes, foreign keys and checks. Unqualified paths use the default
//! schema.
//!
//! ```json
//! {
//!   "baseline": [
//!     { "op": "create_table", "table": "users",
//!       "columns": [{ "name": "id", "type": "BIGINT", "nullable": false }],
//!       "primary_key": ["id"] }
//!   ],
//!   "changes": [
//!     { "op": "add_column", "table": "users",
//!       "column": { "name": "email", "type": "VARCHAR(255)" } },
//!     { "op": "rename", "target": { "kind": "table", "path": "users" }, "to": "accounts" }
//!   ]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use oxide_schema::expr::{BinaryOp, UnaryOp};
use oxide_schema::{
    col, field, ColumnId, Database, Expr, IndexSpec, Literal, ObjectId, ReferentialAction,
    SchemaId, TableId, ViewId, ViewQuery,
};

use crate::dialect::DdlRenderer;
use crate::error::{MigrateError, Result};

/// An edit script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Edits describing the live schema.
    #[serde(default)]
    pub baseline: Vec<Edit>,
    /// Edits to synthesize.
    #[serde(default)]
    pub changes: Vec<Edit>,
}

/// A column of `create_table` or `add_column`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// Native type, e.g. `VARCHAR(255)`.
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default = "nullable_by_default")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ExprSpec>,
}

const fn nullable_by_default() -> bool {
    true
}

/// An expression. Column names are resolved against the table the
/// expression belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprSpec {
    Literal(Literal),
    Column(String),
    Raw(String),
    Function {
        name: String,
        #[serde(default)]
        args: Vec<ExprSpec>,
    },
    Binary {
        left: Box<ExprSpec>,
        op: BinaryOp,
        right: Box<ExprSpec>,
    },
    Not(Box<ExprSpec>),
    IsNull(Box<ExprSpec>),
    IsNotNull(Box<ExprSpec>),
}

impl ExprSpec {
    /// Builds the expression, resolving column names with `column`.
    pub fn resolve<F>(&self, column: &mut F) -> Result<Expr>
    where
        F: FnMut(&str) -> Result<Expr>,
    {
        let expr = match self {
            Self::Literal(literal) => Expr::Literal(literal.clone()),
            Self::Column(name) => column(name)?,
            Self::Raw(sql) => Expr::raw(sql.clone()),
            Self::Function { name, args } => Expr::function(
                name.clone(),
                args.iter()
                    .map(|arg| arg.resolve(column))
                    .collect::<Result<_>>()?,
            ),
            Self::Binary { left, op, right } => {
                left.resolve(column)?.binary(*op, right.resolve(column)?)
            }
            Self::Not(operand) => Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand.resolve(column)?),
            },
            Self::IsNull(operand) => operand.resolve(column)?.is_null(),
            Self::IsNotNull(operand) => operand.resolve(column)?.is_not_null(),
        };
        Ok(expr)
    }
}

/// An object addressed by an edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum Target {
    Schema(String),
    Table(String),
    View(String),
    Column(String),
    Index(String),
    /// Path of the table owning the key.
    PrimaryKey(String),
    ForeignKey(String),
    Check(String),
}

/// One edit of the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    CreateSchema {
        name: String,
    },
    CreateTable {
        table: String,
        #[serde(default)]
        columns: Vec<ColumnSpec>,
        #[serde(default)]
        primary_key: Vec<String>,
    },
    AddColumn {
        table: String,
        column: ColumnSpec,
    },
    SetType {
        column: String,
        #[serde(rename = "type")]
        column_type: String,
    },
    SetNullable {
        column: String,
        nullable: bool,
    },
    SetDefault {
        column: String,
        #[serde(default)]
        default: Option<ExprSpec>,
    },
    CreateIndex {
        table: String,
        #[serde(default)]
        name: Option<String>,
        columns: Vec<String>,
        #[serde(default)]
        unique: bool,
        #[serde(default, rename = "virtual")]
        is_virtual: bool,
        #[serde(default)]
        filter: Option<ExprSpec>,
    },
    SetUnique {
        index: String,
        unique: bool,
    },
    CreatePrimaryKey {
        table: String,
        columns: Vec<String>,
    },
    /// References the primary key of `references`.
    CreateForeignKey {
        table: String,
        columns: Vec<String>,
        references: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        on_delete: ReferentialAction,
        #[serde(default)]
        on_update: ReferentialAction,
    },
    CreateCheck {
        table: String,
        condition: ExprSpec,
        #[serde(default)]
        name: Option<String>,
    },
    /// `select` holds `source.column` paths; `from` holds table or view
    /// paths.
    CreateView {
        view: String,
        select: Vec<String>,
        from: Vec<String>,
    },
    MoveTable {
        table: String,
        schema: String,
    },
    Rename {
        target: Target,
        to: String,
    },
    Remove {
        target: Target,
    },
    ResetName {
        target: Target,
    },
}

impl Script {
    /// Parses a script.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reads and parses a script file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| MigrateError::ReadScript {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Serializes the script.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Applies the baseline, accepts it, then applies the changes.
    ///
    /// Native types are parsed by `renderer`.
    pub fn apply(&self, db: &mut Database, renderer: &dyn DdlRenderer) -> Result<()> {
        apply_section(db, renderer, "baseline", &self.baseline)?;
        db.accept_changes();
        apply_section(db, renderer, "changes", &self.changes)
    }
}

fn apply_section(
    db: &mut Database,
    renderer: &dyn DdlRenderer,
    section: &'static str,
    edits: &[Edit],
) -> Result<()> {
    let mut applier = Applier { db, renderer };
    for (index, edit) in edits.iter().enumerate() {
        applier
            .apply(edit)
            .map_err(|source| MigrateError::Edit {
                section,
                index,
                source: Box::new(source),
            })?;
        debug!(section, index, "applied edit");
    }
    Ok(())
}

/// Splits `schema.name` or `name`.
fn split_object(path: &str) -> Result<(Option<&str>, &str)> {
    let parts: Vec<&str> = path.split('.').collect();
    match parts.as_slice() {
        [name] if !name.is_empty() => Ok((None, *name)),
        [schema, name] if !schema.is_empty() && !name.is_empty() => Ok((Some(*schema), *name)),
        _ => Err(MigrateError::InvalidPath(path.to_string())),
    }
}

/// Splits `owner.member` at the last dot.
fn split_member(path: &str) -> Result<(&str, &str)> {
    path.rsplit_once('.')
        .filter(|(owner, member)| !owner.is_empty() && !member.is_empty())
        .ok_or_else(|| MigrateError::InvalidPath(path.to_string()))
}

struct Applier<'a> {
    db: &'a mut Database,
    renderer: &'a dyn DdlRenderer,
}

impl Applier<'_> {
    fn schema(&self, name: Option<&str>) -> Result<SchemaId> {
        match name {
            Some(name) => Ok(self.db.schema(name)?),
            None => Ok(self.db.default_schema()),
        }
    }

    fn table(&self, path: &str) -> Result<TableId> {
        let (schema, name) = split_object(path)?;
        Ok(self.db.table(self.schema(schema)?, name)?)
    }

    fn view(&self, path: &str) -> Result<ViewId> {
        let (schema, name) = split_object(path)?;
        Ok(self.db.view(self.schema(schema)?, name)?)
    }

    /// Table and column of a column path.
    fn column(&self, path: &str) -> Result<(TableId, ColumnId)> {
        let (table, name) = split_member(path)?;
        let table = self.table(table)?;
        Ok((table, self.db.column(table, name)?))
    }

    fn columns(&self, table: TableId, names: &[String]) -> Result<Vec<ColumnId>> {
        names
            .iter()
            .map(|name| Ok(self.db.column(table, name)?))
            .collect()
    }

    fn table_expr(&self, table: TableId, spec: &ExprSpec) -> Result<Expr> {
        spec.resolve(&mut |name| Ok(col(self.db.column(table, name)?)))
    }

    /// A table or view of a view's FROM list.
    fn source(&self, schema: SchemaId, path: &str) -> Result<ObjectId> {
        let (qualifier, name) = split_object(path)?;
        let schema = match qualifier {
            Some(qualifier) => self.db.schema(qualifier)?,
            None => schema,
        };
        match self.db.try_table(schema, name) {
            Some(table) => Ok(table.id()),
            None => Ok(self.db.view(schema, name)?.id()),
        }
    }

    /// A table column or view field selected by a view.
    fn projection(&self, schema: SchemaId, path: &str) -> Result<Expr> {
        let (source, name) = split_member(path)?;
        let (qualifier, source) = split_object(source)?;
        let schema = match qualifier {
            Some(qualifier) => self.db.schema(qualifier)?,
            None => schema,
        };
        match self.db.try_table(schema, source) {
            Some(table) => Ok(col(self.db.column(table, name)?)),
            None => Ok(field(self.db.view(schema, source)?, name)),
        }
    }

    fn target(&self, target: &Target) -> Result<ObjectId> {
        let id = match target {
            Target::Schema(name) => self.db.schema(name)?.id(),
            Target::Table(path) => self.table(path)?.id(),
            Target::View(path) => self.view(path)?.id(),
            Target::Column(path) => self.column(path)?.1.id(),
            Target::Index(path) => {
                let (table, name) = split_member(path)?;
                self.db.index(self.table(table)?, name)?.id()
            }
            Target::PrimaryKey(path) => {
                let table = self.table(path)?;
                self.db
                    .primary_key(table)
                    .ok_or_else(|| MigrateError::InvalidPath(format!("{path} (no primary key)")))?
                    .id()
            }
            Target::ForeignKey(path) => {
                let (table, name) = split_member(path)?;
                self.db.foreign_key(self.table(table)?, name)?.id()
            }
            Target::Check(path) => {
                let (table, name) = split_member(path)?;
                self.db.check(self.table(table)?, name)?.id()
            }
        };
        Ok(id)
    }

    fn add_column(&mut self, table: TableId, spec: &ColumnSpec) -> Result<ColumnId> {
        let column_type = self.renderer.parse_column_type(&spec.column_type)?;
        let column = self.db.create_column(table, &spec.name, column_type)?;
        if !spec.nullable {
            self.db.set_nullable(column, false)?;
        }
        if let Some(default) = &spec.default {
            let default = self.table_expr(table, default)?;
            self.db.set_default(column, Some(default))?;
        }
        Ok(column)
    }

    fn apply(&mut self, edit: &Edit) -> Result<()> {
        match edit {
            Edit::CreateSchema { name } => {
                self.db.create_schema(name)?;
            }
            Edit::CreateTable {
                table,
                columns,
                primary_key,
            } => {
                let (schema, name) = split_object(table)?;
                let schema = self.schema(schema)?;
                let table = self.db.create_table(schema, name)?;
                for column in columns {
                    self.add_column(table, column)?;
                }
                if !primary_key.is_empty() {
                    let key = self.columns(table, primary_key)?;
                    self.db.create_primary_key(table, &key)?;
                }
            }
            Edit::AddColumn { table, column } => {
                let table = self.table(table)?;
                self.add_column(table, column)?;
            }
            Edit::SetType {
                column,
                column_type,
            } => {
                let (_, column) = self.column(column)?;
                let column_type = self.renderer.parse_column_type(column_type)?;
                self.db.set_column_type(column, column_type)?;
            }
            Edit::SetNullable { column, nullable } => {
                let (_, column) = self.column(column)?;
                self.db.set_nullable(column, *nullable)?;
            }
            Edit::SetDefault { column, default } => {
                let (table, column) = self.column(column)?;
                let default = default
                    .as_ref()
                    .map(|spec| self.table_expr(table, spec))
                    .transpose()?;
                self.db.set_default(column, default)?;
            }
            Edit::CreateIndex {
                table,
                name,
                columns,
                unique,
                is_virtual,
                filter,
            } => {
                let table = self.table(table)?;
                let mut spec = IndexSpec::new();
                for column in self.columns(table, columns)? {
                    spec = spec.on(column);
                }
                if let Some(name) = name {
                    spec = spec.named(name.clone());
                }
                if *unique {
                    spec = spec.unique();
                }
                if *is_virtual {
                    spec = spec.virtual_only();
                }
                if let Some(filter) = filter {
                    spec = spec.filter(self.table_expr(table, filter)?);
                }
                self.db.create_index(table, spec)?;
            }
            Edit::SetUnique { index, unique } => {
                let (table, name) = split_member(index)?;
                let index = self.db.index(self.table(table)?, name)?;
                self.db.set_unique(index, *unique)?;
            }
            Edit::CreatePrimaryKey { table, columns } => {
                let table = self.table(table)?;
                let columns = self.columns(table, columns)?;
                self.db.create_primary_key(table, &columns)?;
            }
            Edit::CreateForeignKey {
                table,
                columns,
                references,
                name,
                on_delete,
                on_update,
            } => {
                let table = self.table(table)?;
                let columns = self.columns(table, columns)?;
                let target = self.table(references)?;
                let key = self.db.create_foreign_key_to(table, &columns, target)?;
                if *on_delete != ReferentialAction::NoAction {
                    self.db.set_on_delete(key, *on_delete)?;
                }
                if *on_update != ReferentialAction::NoAction {
                    self.db.set_on_update(key, *on_update)?;
                }
                if let Some(name) = name {
                    self.db.rename(key, name)?;
                }
            }
            Edit::CreateCheck {
                table,
                condition,
                name,
            } => {
                let table = self.table(table)?;
                let condition = self.table_expr(table, condition)?;
                let check = self.db.create_check(table, condition)?;
                if let Some(name) = name {
                    self.db.rename(check, name)?;
                }
            }
            Edit::CreateView { view, select, from } => {
                let (schema, name) = split_object(view)?;
                let schema = self.schema(schema)?;
                let mut query = ViewQuery::new();
                for path in select {
                    query = query.select(self.projection(schema, path)?);
                }
                for path in from {
                    query = query.source(self.source(schema, path)?);
                }
                self.db.create_view(schema, name, query)?;
            }
            Edit::MoveTable { table, schema } => {
                let table = self.table(table)?;
                let schema = self.db.schema(schema)?;
                self.db.move_table(table, schema)?;
            }
            Edit::Rename { target, to } => {
                let id = self.target(target)?;
                self.db.rename(id, to)?;
            }
            Edit::Remove { target } => {
                let id = self.target(target)?;
                self.db.remove(id)?;
            }
            Edit::ResetName { target } => {
                let id = self.target(target)?;
                self.db.reset_name(id)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use oxide_schema::{Action, RuleCode};

    use super::*;
    use crate::dialect::GenericDialect;

    const SCRIPT: &str = r#"{
        "baseline": [
            { "op": "create_table", "table": "customers",
              "columns": [{ "name": "id", "type": "BIGINT", "nullable": false }],
              "primary_key": ["id"] },
            { "op": "create_table", "table": "orders",
              "columns": [
                  { "name": "id", "type": "BIGINT", "nullable": false },
                  { "name": "customer", "type": "BIGINT" },
                  { "name": "qty", "type": "INTEGER", "default": { "literal": { "integer": 1 } } }
              ],
              "primary_key": ["id"] },
            { "op": "create_foreign_key", "table": "orders", "columns": ["customer"],
              "references": "customers", "on_delete": "cascade" }
        ],
        "changes": [
            { "op": "create_check", "table": "orders",
              "condition": { "binary": { "left": { "column": "qty" }, "op": "gt",
                                         "right": { "literal": { "integer": 0 } } } } },
            { "op": "rename", "target": { "kind": "column", "path": "orders.qty" }, "to": "quantity" }
        ]
    }"#;

    #[test]
    fn test_apply_script() {
        let script = Script::from_json(SCRIPT).unwrap();
        assert_eq!(script.baseline.len(), 3);

        let mut db = Database::with_registry(GenericDialect.types());
        script.apply(&mut db, &GenericDialect).unwrap();

        let main = db.default_schema();
        let orders = db.table(main, "orders").unwrap();
        assert!(db.contains_column(orders, "quantity"));
        assert_eq!(db.foreign_keys(orders).len(), 1);
        assert_eq!(db.checks(orders).len(), 1);

        // only the changes are pending: a rename statement, then the check
        let actions = db.complete_pending_changes();
        assert_eq!(
            actions.iter().map(Action::label).collect::<Vec<_>>(),
            vec!["alter table", "alter table"]
        );
    }

    #[test]
    fn test_paths() {
        assert_eq!(split_object("t").unwrap(), (None, "t"));
        assert_eq!(split_object("s.t").unwrap(), (Some("s"), "t"));
        assert!(split_object("a.b.c").is_err());
        assert!(split_object("").is_err());
        assert_eq!(split_member("s.t.c").unwrap(), ("s.t", "c"));
        assert!(split_member("t.").is_err());
        assert!(split_member("c").is_err());
    }

    #[test]
    fn test_failed_edit_reports_position() {
        let script = Script {
            baseline: Vec::new(),
            changes: vec![
                Edit::CreateTable {
                    table: "t".into(),
                    columns: Vec::new(),
                    primary_key: Vec::new(),
                },
                Edit::CreateTable {
                    table: "t".into(),
                    columns: Vec::new(),
                    primary_key: Vec::new(),
                },
            ],
        };
        let mut db = Database::new();
        let err = script.apply(&mut db, &GenericDialect).unwrap_err();
        match err {
            MigrateError::Edit {
                section,
                index,
                source,
            } => {
                assert_eq!((section, index), ("changes", 1));
                assert!(matches!(
                    *source,
                    MigrateError::Schema(ref e) if e.violates(RuleCode::NameNotUnique)
                ));
            }
            other => panic!("Expected an edit error, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let script = Script::from_json(
            r#"{ "changes": [{ "op": "create_table", "table": "t",
                 "columns": [{ "name": "g", "type": "GEOMETRY" }] }] }"#,
        )
        .unwrap();
        let mut db = Database::new();
        let err = script.apply(&mut db, &GenericDialect).unwrap_err();
        assert!(err.to_string().contains("Unknown column type 'GEOMETRY'"));
    }

    #[test]
    fn test_view_over_table_and_view() {
        let script = Script::from_json(
            r#"{ "changes": [
                { "op": "create_table", "table": "t",
                  "columns": [{ "name": "a", "type": "INTEGER" }] },
                { "op": "create_view", "view": "v1", "select": ["t.a"], "from": ["t"] },
                { "op": "create_view", "view": "v2", "select": ["v1.a"], "from": ["v1"] }
            ] }"#,
        )
        .unwrap();
        let mut db = Database::new();
        script.apply(&mut db, &GenericDialect).unwrap();
        let main = db.default_schema();
        assert!(db.contains_view(main, "v2"));
    }

    #[test]
    fn test_round_trip() {
        let script = Script::from_json(SCRIPT).unwrap();
        let again = Script::from_json(&script.to_json().unwrap()).unwrap();
        assert_eq!(script, again);
    }
}
