//! The schema builder.
//!
//! [`Database`] owns the object graph, the change tracker and the type
//! registry. Every public mutation follows the same steps: validate into a
//! rule accumulator, capture the before-state of everything it is about to
//! touch, apply the change and its reference edges, then fold the touched
//! objects into the net diff.

mod columns;
mod constraints;
mod indexes;
mod lifecycle;
mod tables;

use std::ops::Range;

use tracing::{debug, info};

pub use constraints::ForeignKeySpec;
pub use indexes::IndexSpec;

use crate::changes::{ChangeTracker, MutationContext, TrackingMode};
use crate::error::{Result, RuleViolation, SchemaError, ValidationError};
use crate::expr::{ColumnName, ColumnRef, Expr, QualifiedName};
use crate::graph::{
    next_database_tag, wrap, ColumnId, ObjectData, ObjectGraph, ObjectId, ObjectKind, SchemaData,
    SchemaId, SchemaObject, TypedId,
};
use crate::synth::{synthesize, Action};
use crate::types::{StandardTypes, TypeRegistry};
use crate::validate::{RuleCode, Rules};

/// Construction options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    /// Name of the schema created with the database.
    pub default_schema: String,
    /// Overrides the registry's identifier length limit.
    pub max_identifier_length: Option<usize>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            default_schema: "main".to_string(),
            max_identifier_length: None,
        }
    }
}

/// Actions committed by [`Database::complete_pending_changes`] and not yet
/// consumed.
#[derive(Debug, Clone, Default)]
pub struct PendingActions {
    actions: Vec<Action>,
}

impl PendingActions {
    /// Number of pending actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// All pending actions in order.
    #[must_use]
    pub fn as_slice(&self) -> &[Action] {
        &self.actions
    }

    /// A sub-range of the pending actions, `None` if out of bounds.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Option<&[Action]> {
        self.actions.get(range)
    }

    /// Iterates over pending actions.
    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    /// Drops every pending action.
    pub fn clear(&mut self) {
        self.actions.clear();
    }

    fn extend(&mut self, actions: impl IntoIterator<Item = Action>) {
        self.actions.extend(actions);
    }
}

impl<'a> IntoIterator for &'a PendingActions {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A mutable relational schema with net change tracking.
///
/// ```
/// use oxide_schema::{Database, ValueType};
///
/// let mut db = Database::new();
/// let main = db.default_schema();
/// let users = db.create_table(main, "users").unwrap();
/// let id = db.create_column_of(users, "id", ValueType::Integer).unwrap();
/// db.set_nullable(id, false).unwrap();
/// db.create_primary_key(users, &[id]).unwrap();
///
/// let actions = db.complete_pending_changes();
/// assert_eq!(actions.len(), 1);
/// assert!(db.complete_pending_changes().is_empty());
/// ```
#[derive(Debug)]
pub struct Database {
    graph: ObjectGraph,
    tracker: ChangeTracker,
    registry: Box<dyn TypeRegistry>,
    options: DatabaseOptions,
    mode: TrackingMode,
    pending: PendingActions,
    default_schema: SchemaId,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Creates an empty database over the generic type registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Box::new(StandardTypes))
    }

    /// Creates an empty database over `registry`.
    #[must_use]
    pub fn with_registry(registry: Box<dyn TypeRegistry>) -> Self {
        Self::with_options(registry, DatabaseOptions::default())
    }

    /// Creates an empty database with explicit options.
    ///
    /// The default schema belongs to the baseline: it is never emitted as a
    /// `CREATE SCHEMA`.
    #[must_use]
    pub fn with_options(registry: Box<dyn TypeRegistry>, options: DatabaseOptions) -> Self {
        let mut graph = ObjectGraph::new(next_database_tag());
        let default_schema = SchemaId(graph.insert(
            options.default_schema.clone(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        ));
        debug!(
            dialect = registry.dialect(),
            schema = %options.default_schema,
            "created database"
        );
        Self {
            graph,
            tracker: ChangeTracker::new(),
            registry,
            options,
            mode: TrackingMode::default(),
            pending: PendingActions::default(),
            default_schema,
        }
    }

    /// The object graph.
    #[must_use]
    pub const fn graph(&self) -> &ObjectGraph {
        &self.graph
    }

    /// The type registry.
    #[must_use]
    pub fn registry(&self) -> &dyn TypeRegistry {
        self.registry.as_ref()
    }

    /// Construction options.
    #[must_use]
    pub const fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Longest identifier accepted for new names.
    #[must_use]
    pub fn max_identifier_length(&self) -> usize {
        self.options
            .max_identifier_length
            .unwrap_or_else(|| self.registry.max_identifier_length())
    }

    fn rules(&self) -> Rules<'_> {
        Rules::new(
            &self.graph,
            self.registry.as_ref(),
            self.max_identifier_length(),
        )
    }

    fn record(&mut self, ctx: MutationContext) {
        self.tracker.record(ctx, &self.graph);
    }

    /// Allocates an object and records its creation.
    fn insert(&mut self, name: String, parent: Option<ObjectId>, data: ObjectData) -> ObjectId {
        let id = self.graph.insert(name, parent, data);
        let mut ctx = MutationContext::new(id);
        ctx.created(id);
        self.record(ctx);
        id
    }

    fn not_found(&self, message: String) -> SchemaError {
        ValidationError {
            dialect: self.registry.dialect().to_string(),
            violations: vec![RuleViolation {
                code: RuleCode::ObjectNotFound,
                message,
            }],
        }
        .into()
    }

    /// Scope of the namespace a `kind` object under `parent` is named in.
    fn name_scope(&self, kind: ObjectKind, parent: Option<ObjectId>) -> Option<ObjectId> {
        match kind {
            ObjectKind::Schema => None,
            _ if kind.is_constraint() => parent.map(|p| self.graph.schema_of(p)),
            _ => parent,
        }
    }

    /// Finds a live object of kind `T` named `name` under `parent`.
    ///
    /// Constraints are looked up in the schema-wide constraint namespace but
    /// must belong to `parent`. A name taken by an object of another kind
    /// sharing the namespace is a [`SchemaError::KindMismatch`].
    pub fn lookup<T: TypedId>(&self, parent: Option<ObjectId>, name: &str) -> Result<Option<T>> {
        if let Some(parent) = parent {
            let mut rules = self.rules();
            rules.live(parent);
            rules.finish()?;
        }
        let scope = self.name_scope(T::KIND, parent);
        let Some(found) = self.graph.find(scope, T::KIND, name) else {
            return Ok(None);
        };
        if T::KIND.is_constraint() && self.graph.parent(found) != parent {
            return Ok(None);
        }
        let actual = self.graph.kind(found);
        if actual != T::KIND {
            return Err(SchemaError::KindMismatch {
                name: name.to_string(),
                expected: T::KIND,
                actual,
            });
        }
        Ok(Some(wrap(found)))
    }

    /// Like [`Database::lookup`], failing with `object.not_found` when
    /// nothing matches.
    pub fn require<T: TypedId>(&self, parent: Option<ObjectId>, name: &str) -> Result<T> {
        match self.lookup(parent, name)? {
            Some(found) => Ok(found),
            None => {
                let place = parent.map_or_else(
                    || "the database".to_string(),
                    |p| format!("{} '{}'", self.graph.kind(p), self.graph.name(p)),
                );
                Err(self.not_found(format!("no {} named '{name}' in {place}", T::KIND)))
            }
        }
    }

    /// Object by identity, removed ones included. `None` for handles of
    /// another database.
    #[must_use]
    pub fn get(&self, id: impl Into<ObjectId>) -> Option<&SchemaObject> {
        self.graph.get(id.into())
    }

    /// Current name of an object.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to another database.
    #[must_use]
    pub fn name(&self, id: impl Into<ObjectId>) -> &str {
        self.graph.name(id.into())
    }

    /// Kind of an object.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to another database.
    #[must_use]
    pub fn kind(&self, id: impl Into<ObjectId>) -> ObjectKind {
        self.graph.kind(id.into())
    }

    /// Whether an object has been removed. Handles of another database
    /// count as removed.
    #[must_use]
    pub fn is_removed(&self, id: impl Into<ObjectId>) -> bool {
        !self.graph.is_live(id.into())
    }

    /// Schema-qualified name of a table or view.
    #[must_use]
    pub fn qualified_name(&self, id: impl Into<ObjectId>) -> Option<QualifiedName> {
        let id = id.into();
        let object = self.graph.get(id)?;
        if !matches!(object.kind(), ObjectKind::Table | ObjectKind::View) {
            return None;
        }
        let schema = object.core().parent()?;
        Some(QualifiedName::new(
            self.graph.name(schema),
            object.name(),
        ))
    }

    /// Text of an expression with columns written by their current names.
    fn expr_text(&self, expr: &Expr) -> String {
        let resolved = expr.map_columns(&mut |column| match column {
            ColumnRef::Column(id) => ColumnName::bare(self.graph.name(id.id())),
            ColumnRef::ViewField { field, .. } => ColumnName::bare(field.clone()),
        });
        resolved.to_string()
    }

    /// Current tracking mode.
    #[must_use]
    pub const fn tracking_mode(&self) -> TrackingMode {
        self.mode
    }

    /// Switches between committing and dry-running synthesis.
    pub fn set_tracking_mode(&mut self, mode: TrackingMode) {
        debug!(?mode, "tracking mode changed");
        self.mode = mode;
    }

    /// The net diff since the last synthesis.
    #[must_use]
    pub const fn changes(&self) -> &ChangeTracker {
        &self.tracker
    }

    /// Synthesizes the tracked changes into ordered actions.
    ///
    /// In [`TrackingMode::Commit`] the actions are appended to
    /// [`Database::pending_actions`] and the current state becomes the new
    /// baseline. In [`TrackingMode::DryRun`] only the returned list is
    /// produced.
    pub fn complete_pending_changes(&mut self) -> Vec<Action> {
        let actions = synthesize(&self.graph, &self.tracker, self.registry.as_ref());
        if self.mode == TrackingMode::Commit {
            self.pending.extend(actions.iter().cloned());
            self.tracker.reset();
            info!(
                committed = actions.len(),
                pending = self.pending.len(),
                "committed pending changes"
            );
        }
        actions
    }

    /// Makes the current state the baseline without synthesizing anything,
    /// for state that already exists on the server.
    pub fn accept_changes(&mut self) {
        debug!(dirty = self.tracker.len(), "accepted changes");
        self.tracker.reset();
    }

    /// Actions committed so far.
    #[must_use]
    pub const fn pending_actions(&self) -> &PendingActions {
        &self.pending
    }

    /// Mutable access to the committed actions, to consume them.
    pub fn pending_actions_mut(&mut self) -> &mut PendingActions {
        &mut self.pending
    }
}

/// Columns an optional expression reads, as edge targets.
fn column_targets(expr: Option<&Expr>) -> Vec<ObjectId> {
    expr.map(|e| {
        e.referenced_columns()
            .into_iter()
            .map(ColumnId::id)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TableId;
    use crate::types::ValueType;

    #[test]
    fn test_default_schema_is_baseline() {
        let mut db = Database::new();
        assert_eq!(db.name(db.default_schema()), "main");
        assert!(db.changes().is_empty());
        assert!(db.complete_pending_changes().is_empty());
    }

    #[test]
    fn test_options_rename_default_schema() {
        let db = Database::with_options(
            Box::new(StandardTypes),
            DatabaseOptions {
                default_schema: "dbo".into(),
                max_identifier_length: Some(30),
            },
        );
        assert_eq!(db.name(db.default_schema()), "dbo");
        assert_eq!(db.max_identifier_length(), 30);
    }

    #[test]
    fn test_lookup_reports_kind_mismatch() {
        let mut db = Database::new();
        let main = db.default_schema();
        db.create_table(main, "orders").unwrap();

        let err = db
            .lookup::<crate::graph::ViewId>(Some(main.id()), "orders")
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::KindMismatch {
                name: "orders".into(),
                expected: ObjectKind::View,
                actual: ObjectKind::Table,
            }
        );
        let missing = db.require::<TableId>(Some(main.id()), "nope").unwrap_err();
        assert!(missing.violates(RuleCode::ObjectNotFound));
    }

    #[test]
    fn test_dry_run_keeps_dirty_set() {
        let mut db = Database::new();
        let main = db.default_schema();
        let t = db.create_table(main, "t").unwrap();
        db.create_column_of(t, "a", ValueType::Integer).unwrap();

        db.set_tracking_mode(TrackingMode::DryRun);
        let preview = db.complete_pending_changes();
        assert_eq!(preview.len(), 1);
        assert!(db.pending_actions().is_empty());
        assert!(!db.changes().is_empty());

        db.set_tracking_mode(TrackingMode::Commit);
        let committed = db.complete_pending_changes();
        assert_eq!(committed, preview);
        assert_eq!(db.pending_actions().as_slice(), committed.as_slice());
        assert!(db.changes().is_empty());

        db.pending_actions_mut().clear();
        assert!(db.pending_actions().is_empty());
    }

    #[test]
    fn test_accept_changes_emits_nothing() {
        let mut db = Database::new();
        let main = db.default_schema();
        db.create_table(main, "live").unwrap();
        db.accept_changes();
        assert!(db.complete_pending_changes().is_empty());
    }
}
