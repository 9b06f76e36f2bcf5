//! Action descriptors.
//!
//! Actions carry resolved names only, so a renderer can turn them into SQL
//! without access to the object graph.

use serde::{Deserialize, Serialize};

use crate::expr::{ColumnName, Literal, QualifiedName, SqlExpr, SqlQuery};
use crate::graph::{Computation, ReferentialAction, SortOrder};
use crate::types::ColumnType;

/// A column as written in `CREATE TABLE` or `ADD COLUMN`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub default: Option<SqlExpr>,
    pub computation: Option<Computation<ColumnName>>,
}

/// One key of an index definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDefinition {
    /// A bare column reference for column keys.
    pub expr: SqlExpr,
    pub order: SortOrder,
}

impl KeyDefinition {
    /// Column name, for plain column keys.
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match &self.expr {
            SqlExpr::Column(c) => Some(&c.name),
            _ => None,
        }
    }
}

/// A physical index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub keys: Vec<KeyDefinition>,
    pub unique: bool,
    pub filter: Option<SqlExpr>,
}

/// A primary key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyDefinition {
    pub name: String,
    pub columns: Vec<String>,
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub referenced_table: QualifiedName,
    pub referenced_columns: Vec<String>,
    pub on_delete: ReferentialAction,
    pub on_update: ReferentialAction,
}

/// A check constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckDefinition {
    pub name: String,
    pub condition: SqlExpr,
}

/// Everything created inline with a table. Foreign keys are always added
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: QualifiedName,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Option<PrimaryKeyDefinition>,
    pub indexes: Vec<IndexDefinition>,
    pub checks: Vec<CheckDefinition>,
}

/// A view and its query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDefinition {
    pub name: QualifiedName,
    pub query: SqlQuery,
}

/// One clause of a multi-table rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRename {
    pub from: QualifiedName,
    pub to: QualifiedName,
}

/// One clause of an `ALTER TABLE` statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "clause", rename_all = "snake_case")]
pub enum AlterClause {
    RenameColumn { from: String, to: String },
    RenameIndex { from: String, to: String },
    DropForeignKey { name: String },
    DropCheck { name: String },
    DropIndex { name: String },
    DropPrimaryKey { name: String },
    DropColumn { name: String },
    AddColumn { column: ColumnDefinition },
    ModifyColumn { column: ColumnDefinition },
    SetDefault { column: String, default: Option<SqlExpr> },
    AddPrimaryKey { key: PrimaryKeyDefinition },
    AddIndex { index: IndexDefinition },
    AddCheck { check: CheckDefinition },
    AddForeignKey { key: ForeignKeyDefinition },
}

impl AlterClause {
    /// Whether the clause renames something.
    #[must_use]
    pub const fn is_rename(&self) -> bool {
        matches!(self, Self::RenameColumn { .. } | Self::RenameIndex { .. })
    }
}

/// One synthesized DDL action. A renderer may need several statements for
/// one action; it never merges actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    CreateSchema {
        name: String,
    },
    DropSchema {
        name: String,
    },
    CreateTable {
        table: TableDefinition,
    },
    DropTable {
        name: QualifiedName,
    },
    /// Renames and moves applied atomically, in order.
    RenameTables {
        renames: Vec<TableRename>,
    },
    AlterTable {
        table: QualifiedName,
        clauses: Vec<AlterClause>,
    },
    /// Fills NULLs of a column about to become NOT NULL.
    Backfill {
        table: QualifiedName,
        column: String,
        value: Literal,
    },
    CreateView {
        view: ViewDefinition,
    },
    DropView {
        name: QualifiedName,
    },
}

impl Action {
    /// Short lowercase label, used in logs and summaries.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "create schema",
            Self::DropSchema { .. } => "drop schema",
            Self::CreateTable { .. } => "create table",
            Self::DropTable { .. } => "drop table",
            Self::RenameTables { .. } => "rename tables",
            Self::AlterTable { .. } => "alter table",
            Self::Backfill { .. } => "backfill",
            Self::CreateView { .. } => "create view",
            Self::DropView { .. } => "drop view",
        }
    }
}
