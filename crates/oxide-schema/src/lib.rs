//! Mutable relational schema graph with net change tracking.
//!
//! `oxide-schema` holds a live model of a database schema (schemas, tables,
//! columns, indexes, keys, checks and views) and turns edits of that model
//! into an ordered list of DDL actions:
//!
//! - Every edit is validated as a whole before anything changes; a rejected
//!   edit reports every rule it violates
//! - Objects keep their identity across renames, moves and removal
//! - The change tracker keeps only the net difference to the last baseline,
//!   so undoing an edit by hand produces no statements
//! - Synthesis orders drops, renames, alters and creates so that the script
//!   applies cleanly, rebuilding dependent views and foreign keys as needed
//!
//! # Architecture
//!
//! - **Graph** - arena of objects addressed by typed handles
//! - **References** - dependency edges, cascades and the removal veto
//! - **Naming** - default names for indexes, keys and checks
//! - **Validation** - rule accumulator with machine-readable codes
//! - **Changes** - net diff per object
//! - **Synthesis** - ordered [`Action`]s for a renderer to turn into SQL
//!
//! # Example
//!
//! ```rust
//! use oxide_schema::prelude::*;
//!
//! let mut db = Database::new();
//! let main = db.default_schema();
//! let users = db.create_table(main, "users").unwrap();
//! let id = db.create_column_of(users, "id", ValueType::Integer).unwrap();
//! db.set_nullable(id, false).unwrap();
//! db.create_primary_key(users, &[id]).unwrap();
//! db.accept_changes();
//!
//! db.rename(users, "accounts").unwrap();
//! let actions = db.complete_pending_changes();
//! assert!(matches!(actions.as_slice(), [Action::RenameTables { .. }]));
//! ```

pub mod changes;
pub mod database;
pub mod error;
pub mod expr;
pub mod graph;
pub mod naming;
pub mod references;
pub mod synth;
pub mod types;
pub mod validate;

pub use changes::{Change, ChangeEntry, ChangeTracker, MutationContext, TrackingMode};
pub use database::{Database, DatabaseOptions, ForeignKeySpec, IndexSpec, PendingActions};
pub use error::{Result, RuleViolation, SchemaError, ValidationError};
pub use expr::{col, field, ColumnName, ColumnRef, Expr, Literal, QualifiedName, ViewQuery};
pub use graph::{
    CheckId, ColumnId, Computation, ForeignKeyId, IndexId, IndexKey, ObjectId, ObjectKind,
    PrimaryKeyId, ReferentialAction, SchemaId, SortOrder, TableId, TypedId, ViewId,
};
pub use synth::{synthesize, Action, AlterClause};
pub use types::{ColumnType, StandardTypes, TypeRegistry, ValueType};
pub use validate::RuleCode;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::changes::TrackingMode;
    pub use crate::database::{Database, DatabaseOptions, ForeignKeySpec, IndexSpec};
    pub use crate::error::{Result, SchemaError};
    pub use crate::expr::{col, field, Expr, ViewQuery};
    pub use crate::graph::{
        CheckId, ColumnId, Computation, ForeignKeyId, IndexId, IndexKey, PrimaryKeyId,
        ReferentialAction, SchemaId, SortOrder, TableId, ViewId,
    };
    pub use crate::synth::{Action, AlterClause};
    pub use crate::types::{ColumnType, TypeRegistry, ValueType};
    pub use crate::validate::RuleCode;
}
