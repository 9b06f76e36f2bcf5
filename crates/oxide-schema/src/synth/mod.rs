//! Statement synthesis.
//!
//! Walks the net diff held by the [`ChangeTracker`] and compiles it into an
//! ordered list of [`Action`]s:
//!
//! 1. drop views to rebuild or remove, most-dependent first
//! 2. drop foreign keys and checks that go away or must be re-created
//! 3. drop removed tables, referencing tables first
//! 4. drop removed schemas
//! 5. create schemas, including rename targets
//! 6. rename and move tables in one atomic statement
//! 7. drop schemas emptied by renames
//! 8. create tables
//! 9. alter existing tables
//! 10. add foreign keys
//! 11. create views, least-dependent first
//!
//! Every object is looked at in two eras: the baseline (state at the last
//! synthesis) and the current state. Drops are named after the baseline,
//! creates after the current state.

mod action;
mod tables;
mod views;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

pub use action::{
    Action, AlterClause, CheckDefinition, ColumnDefinition, ForeignKeyDefinition,
    IndexDefinition, KeyDefinition, PrimaryKeyDefinition, TableDefinition, TableRename,
    ViewDefinition,
};

use crate::changes::{Change, ChangeTracker};
use crate::expr::{ColumnName, ColumnRef, Expr, QualifiedName, SqlExpr, SqlQuery, ViewQuery};
use crate::graph::{
    Computation, ComputationStorage, IndexData, IndexTarget, ObjectGraph, ObjectId, ObjectKind,
    ObjectState, TableId,
};
use crate::types::TypeRegistry;

/// Which state of an object to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Era {
    Baseline,
    Current,
}

/// Compiles the tracked changes into ordered actions.
#[must_use]
pub fn synthesize(
    graph: &ObjectGraph,
    tracker: &ChangeTracker,
    registry: &dyn TypeRegistry,
) -> Vec<Action> {
    let synth = Synthesizer::new(graph, tracker, registry);
    let facts = synth.analyze();
    let mut actions = Vec::new();

    synth.drop_views(&facts, &mut actions);
    synth.drop_constraints(&facts, &mut actions);
    synth.drop_tables(&facts, &mut actions);
    synth.drop_removed_schemas(&facts, &mut actions);
    synth.create_schemas(&facts, &mut actions);
    synth.rename_tables(&facts, &mut actions);
    synth.drop_emptied_schemas(&facts, &mut actions);
    synth.create_tables(&facts, &mut actions);
    synth.alter_tables(&facts, &mut actions);
    synth.add_foreign_keys(&facts, &mut actions);
    synth.create_views(&facts, &mut actions);

    info!(
        dirty = tracker.len(),
        actions = actions.len(),
        "synthesized pending changes"
    );
    actions
}

/// Derived facts shared by the synthesis phases.
#[derive(Debug, Default)]
pub(crate) struct Facts {
    pub(crate) schemas: Vec<ObjectId>,
    pub(crate) kept_tables: Vec<TableId>,
    pub(crate) created_tables: Vec<TableId>,
    /// Referencing tables first.
    pub(crate) dropped_tables: Vec<TableId>,
    /// Foreign keys between dropped tables dropped explicitly to break
    /// cycles, with their origin table.
    pub(crate) cycle_breaks: Vec<(TableId, ObjectId)>,
    /// Computed columns whose storage mode flip forces drop and add.
    pub(crate) rebuilt_columns: HashSet<ObjectId>,
    pub(crate) retyped_columns: HashSet<ObjectId>,
    /// Indexes whose physical identity changed.
    pub(crate) rebuilt_indexes: HashSet<ObjectId>,
    pub(crate) rebuilt_primary_keys: HashSet<TableId>,
    /// Foreign keys existing in both eras that must be dropped and re-added.
    pub(crate) rebuilt_foreign_keys: BTreeSet<ObjectId>,
    /// Most-dependent first.
    pub(crate) dropped_views: Vec<ObjectId>,
    /// Least-dependent first.
    pub(crate) created_views: Vec<ObjectId>,
}

pub(crate) struct Synthesizer<'a> {
    pub(crate) graph: &'a ObjectGraph,
    pub(crate) tracker: &'a ChangeTracker,
    pub(crate) registry: &'a dyn TypeRegistry,
    /// Children removed since the baseline, by baseline parent.
    removed_children: HashMap<ObjectId, Vec<ObjectId>>,
}

impl<'a> Synthesizer<'a> {
    fn new(
        graph: &'a ObjectGraph,
        tracker: &'a ChangeTracker,
        registry: &'a dyn TypeRegistry,
    ) -> Self {
        let mut removed_children: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for (id, entry) in tracker.iter() {
            if let Change::Removed { baseline, .. } = &entry.change {
                if let Some(parent) = baseline.parent {
                    removed_children.entry(parent).or_default().push(id);
                }
            }
        }
        Self {
            graph,
            tracker,
            registry,
            removed_children,
        }
    }

    /// State of `id` in `era`, `None` if it did not or does not exist.
    pub(crate) fn state(&self, era: Era, id: ObjectId) -> Option<ObjectState> {
        match era {
            Era::Baseline => self.tracker.baseline(self.graph, id),
            Era::Current => self
                .graph
                .is_live(id)
                .then(|| self.graph.snapshot(id)),
        }
    }

    pub(crate) fn existed(&self, id: ObjectId) -> bool {
        self.state(Era::Baseline, id).is_some()
    }

    pub(crate) fn exists(&self, id: ObjectId) -> bool {
        self.graph.is_live(id)
    }

    /// Clock value of the last rename of `id`.
    pub(crate) fn renamed_at(&self, id: ObjectId) -> u64 {
        self.tracker
            .get(id)
            .and_then(|e| e.renamed)
            .unwrap_or_default()
    }

    /// Children of `parent` in `era`, in creation order.
    pub(crate) fn children(&self, era: Era, parent: ObjectId) -> Vec<(ObjectId, ObjectState)> {
        let mut ids: Vec<ObjectId> = self.graph.object(parent).core().children().to_vec();
        if era == Era::Baseline {
            if let Some(removed) = self.removed_children.get(&parent) {
                ids.extend(removed.iter().copied());
            }
        }
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
            .filter_map(|id| self.state(era, id).map(|s| (id, s)))
            .filter(|(_, s)| s.parent == Some(parent))
            .collect()
    }

    fn name_in(&self, era: Era, id: ObjectId) -> String {
        self.state(era, id)
            .map_or_else(|| self.graph.name(id).to_string(), |s| s.name)
    }

    /// Schema-qualified name of a table or view in `era`.
    pub(crate) fn qualified(&self, era: Era, id: ObjectId) -> QualifiedName {
        let (name, parent) = match self.state(era, id) {
            Some(state) => (state.name, state.parent),
            None => (self.graph.name(id).to_string(), self.graph.parent(id)),
        };
        let schema = parent.map(|p| self.name_in(era, p)).unwrap_or_default();
        QualifiedName { schema, name }
    }

    /// Name of a column in `era`.
    pub(crate) fn column_name(&self, era: Era, column: ObjectId) -> String {
        self.name_in(era, column)
    }

    fn column_ref_name(&self, era: Era, column: &ColumnRef, qualify: bool) -> ColumnName {
        match column {
            ColumnRef::Column(id) => ColumnName {
                qualifier: qualify
                    .then(|| self.graph.parent(id.id()))
                    .flatten()
                    .map(|table| self.qualified(era, table)),
                name: self.column_name(era, id.id()),
            },
            ColumnRef::ViewField { view, field } => ColumnName {
                qualifier: qualify.then(|| self.qualified(era, view.id())),
                name: field.clone(),
            },
        }
    }

    /// Resolves column identities to names. View expressions are qualified,
    /// table-local ones are not.
    pub(crate) fn sql_expr(&self, era: Era, expr: &Expr, qualify: bool) -> SqlExpr {
        expr.map_columns(&mut |c| self.column_ref_name(era, c, qualify))
    }

    pub(crate) fn sql_query(&self, era: Era, query: &ViewQuery) -> SqlQuery {
        query.map(
            &mut |c| self.column_ref_name(era, c, true),
            &mut |source| self.qualified(era, *source),
        )
    }

    pub(crate) fn column_definition(&self, state: &ObjectState) -> Option<ColumnDefinition> {
        let data = state.data.as_column()?;
        Some(ColumnDefinition {
            name: state.name.clone(),
            column_type: data.column_type.clone(),
            nullable: data.nullable,
            default: data
                .default
                .as_ref()
                .map(|e| self.sql_expr(Era::Current, e, false)),
            computation: data.computation.as_ref().map(|c| Computation {
                expression: self.sql_expr(Era::Current, &c.expression, false),
                storage: c.storage,
            }),
        })
    }

    pub(crate) fn index_definition(&self, state: &ObjectState) -> Option<IndexDefinition> {
        let data = state.data.as_index()?;
        Some(IndexDefinition {
            name: state.name.clone(),
            keys: data
                .keys
                .iter()
                .map(|key| KeyDefinition {
                    expr: match &key.target {
                        IndexTarget::Column(column) => Expr::Column(ColumnName::bare(
                            self.column_name(Era::Current, column.id()),
                        )),
                        IndexTarget::Expression(expr) => self.sql_expr(Era::Current, expr, false),
                    },
                    order: key.order,
                })
                .collect(),
            unique: data.unique,
            filter: data
                .filter
                .as_ref()
                .map(|f| self.sql_expr(Era::Current, f, false)),
        })
    }

    /// Column names of an index's plain column keys in `era`.
    pub(crate) fn key_column_names(&self, era: Era, index: &IndexData) -> Vec<String> {
        index
            .keys
            .iter()
            .filter_map(|k| k.column())
            .map(|c| self.column_name(era, c.id()))
            .collect()
    }

    /// Columns an index depends on, through keys and filter.
    pub(crate) fn index_columns(index: &IndexData) -> BTreeSet<ObjectId> {
        let mut columns = BTreeSet::new();
        for key in &index.keys {
            match &key.target {
                IndexTarget::Column(c) => {
                    columns.insert(c.id());
                }
                IndexTarget::Expression(e) => {
                    columns.extend(e.referenced_columns().into_iter().map(|c| c.id()));
                }
            }
        }
        if let Some(filter) = &index.filter {
            columns.extend(filter.referenced_columns().into_iter().map(|c| c.id()));
        }
        columns
    }

    fn analyze(&self) -> Facts {
        let mut facts = Facts::default();
        for (id, object) in self.graph.iter() {
            match object.kind() {
                ObjectKind::Schema => facts.schemas.push(id),
                ObjectKind::Table => {
                    let table = TableId(id);
                    match (self.existed(id), self.exists(id)) {
                        (true, true) => facts.kept_tables.push(table),
                        (false, true) => facts.created_tables.push(table),
                        (true, false) => facts.dropped_tables.push(table),
                        (false, false) => {}
                    }
                }
                _ => {}
            }
        }
        self.analyze_columns(&mut facts);
        self.analyze_indexes(&mut facts);
        self.analyze_foreign_keys(&mut facts);
        self.order_dropped_tables(&mut facts);
        self.analyze_views(&mut facts);
        debug!(
            kept = facts.kept_tables.len(),
            created = facts.created_tables.len(),
            dropped = facts.dropped_tables.len(),
            views_dropped = facts.dropped_views.len(),
            views_created = facts.created_views.len(),
            "analyzed changes"
        );
        facts
    }

    fn analyze_columns(&self, facts: &mut Facts) {
        for (id, entry) in self.tracker.iter() {
            let Change::Modified { baseline } = &entry.change else {
                continue;
            };
            let (Some(before), Some(now)) = (
                baseline.data.as_column(),
                self.graph.object(id).data().as_column(),
            ) else {
                continue;
            };
            if storage_flip(before.computation.as_ref(), now.computation.as_ref()) {
                facts.rebuilt_columns.insert(id);
            }
            if before.column_type != now.column_type {
                facts.retyped_columns.insert(id);
            }
        }
    }

    fn analyze_indexes(&self, facts: &mut Facts) {
        for table in &facts.kept_tables {
            for (id, before) in self.children(Era::Baseline, table.id()) {
                let Some(before) = before.data.as_index() else {
                    continue;
                };
                let Some(now) = self.state(Era::Current, id) else {
                    continue;
                };
                let Some(now) = now.data.as_index() else {
                    continue;
                };
                if self.index_shape_changed(facts, before, now)
                    || before.primary_key != now.primary_key
                {
                    facts.rebuilt_indexes.insert(id);
                }
            }
            if self.primary_key_changed(facts, *table) {
                facts.rebuilt_primary_keys.insert(*table);
            }
        }
    }

    /// Keys, uniqueness, virtual flag or filter differ, or a column the
    /// index depends on is rebuilt.
    pub(crate) fn index_shape_changed(
        &self,
        facts: &Facts,
        before: &IndexData,
        now: &IndexData,
    ) -> bool {
        before.keys != now.keys
            || before.unique != now.unique
            || before.is_virtual != now.is_virtual
            || before.filter != now.filter
            || Self::index_columns(now)
                .iter()
                .any(|c| facts.rebuilt_columns.contains(c))
    }

    /// The table's primary key, with its state, in `era`.
    pub(crate) fn primary_key(&self, era: Era, table: TableId) -> Option<(ObjectId, ObjectState)> {
        self.children(era, table.id())
            .into_iter()
            .find(|(_, s)| s.kind() == ObjectKind::PrimaryKey)
    }

    fn primary_key_changed(&self, facts: &Facts, table: TableId) -> bool {
        match (
            self.primary_key(Era::Baseline, table),
            self.primary_key(Era::Current, table),
        ) {
            (None, None) => false,
            (Some((before_id, before)), Some((now_id, now))) => {
                let (Some(b), Some(n)) = (before.data.as_primary_key(), now.data.as_primary_key())
                else {
                    return true;
                };
                if before_id != now_id || before.name != now.name || b.index != n.index {
                    return true;
                }
                let index_before = self.state(Era::Baseline, b.index.id());
                let index_now = self.state(Era::Current, n.index.id());
                match (
                    index_before.as_ref().and_then(|s| s.data.as_index()),
                    index_now.as_ref().and_then(|s| s.data.as_index()),
                ) {
                    (Some(ib), Some(in_)) => self.index_shape_changed(facts, ib, in_),
                    _ => true,
                }
            }
            _ => true,
        }
    }

    fn analyze_foreign_keys(&self, facts: &mut Facts) {
        for table in &facts.kept_tables {
            for (id, before) in self.children(Era::Baseline, table.id()) {
                let Some(b) = before.data.as_foreign_key() else {
                    continue;
                };
                let Some(now) = self.state(Era::Current, id) else {
                    continue;
                };
                let touches_rebuilt = [b.origin, b.referenced].iter().any(|index| {
                    facts.rebuilt_indexes.contains(&index.id())
                        || self
                            .graph
                            .index_data(*index)
                            .primary_key
                            .and_then(|_| self.graph.table_of(index.id()))
                            .is_some_and(|t| facts.rebuilt_primary_keys.contains(&t))
                        || Self::index_columns(self.graph.index_data(*index))
                            .iter()
                            .any(|c| {
                                facts.rebuilt_columns.contains(c)
                                    || facts.retyped_columns.contains(c)
                            })
                });
                if before != now || touches_rebuilt {
                    facts.rebuilt_foreign_keys.insert(id);
                }
            }
        }
    }

    /// Orders dropped tables so that referencing tables go first. Foreign
    /// key cycles among them are broken by dropping the keys explicitly.
    fn order_dropped_tables(&self, facts: &mut Facts) {
        let dropped: BTreeSet<TableId> = facts.dropped_tables.iter().copied().collect();
        // (origin, fk, referenced table) among dropped tables
        let mut edges: Vec<(TableId, ObjectId, TableId)> = Vec::new();
        for table in &dropped {
            for (fk, state) in self.children(Era::Baseline, table.id()) {
                let Some(data) = state.data.as_foreign_key() else {
                    continue;
                };
                let Some(target) = self.graph.table_of(data.referenced.id()) else {
                    continue;
                };
                if target != *table && dropped.contains(&target) {
                    edges.push((*table, fk, target));
                }
            }
        }

        let mut remaining = dropped;
        let mut order = Vec::new();
        while !remaining.is_empty() {
            let ready = remaining.iter().copied().find(|t| {
                !edges
                    .iter()
                    .any(|(origin, _, target)| target == t && remaining.contains(origin))
            });
            let next = match ready {
                Some(table) => table,
                None => {
                    let Some(victim) = remaining.iter().next().copied() else {
                        break;
                    };
                    let (breaks, rest): (Vec<_>, Vec<_>) = edges
                        .into_iter()
                        .partition(|(origin, _, target)| *target == victim && remaining.contains(origin));
                    edges = rest;
                    for (origin, fk, _) in breaks {
                        debug!(table = %origin, fk = %fk, "breaking foreign key cycle");
                        facts.cycle_breaks.push((origin, fk));
                    }
                    victim
                }
            };
            remaining.remove(&next);
            order.push(next);
        }
        facts.dropped_tables = order;
    }

    fn drop_removed_schemas(&self, facts: &Facts, actions: &mut Vec<Action>) {
        for schema in &facts.schemas {
            if self.existed(*schema) && !self.exists(*schema) {
                actions.push(Action::DropSchema {
                    name: self.name_in(Era::Baseline, *schema),
                });
            }
        }
    }

    /// Names of schemas that exist once removed schemas are dropped.
    fn surviving_schema_names(&self, facts: &Facts) -> BTreeSet<String> {
        facts
            .schemas
            .iter()
            .filter(|s| self.exists(**s))
            .filter_map(|s| self.state(Era::Baseline, *s))
            .map(|s| s.name)
            .collect()
    }

    fn create_schemas(&self, facts: &Facts, actions: &mut Vec<Action>) {
        let existing = self.surviving_schema_names(facts);
        for schema in &facts.schemas {
            if !self.exists(*schema) {
                continue;
            }
            let name = self.graph.name(*schema);
            if !existing.contains(name) {
                actions.push(Action::CreateSchema {
                    name: name.to_string(),
                });
            }
        }
    }

    fn drop_emptied_schemas(&self, facts: &Facts, actions: &mut Vec<Action>) {
        let needed: BTreeSet<&str> = facts
            .schemas
            .iter()
            .filter(|s| self.exists(**s))
            .map(|s| self.graph.name(*s))
            .collect();
        for name in self.surviving_schema_names(facts) {
            if !needed.contains(name.as_str()) {
                actions.push(Action::DropSchema { name });
            }
        }
    }

    fn rename_tables(&self, facts: &Facts, actions: &mut Vec<Action>) {
        let mut renames: Vec<(u64, TableId, TableRename)> = Vec::new();
        for table in &facts.kept_tables {
            let from = self.qualified(Era::Baseline, table.id());
            let to = self.qualified(Era::Current, table.id());
            if from == to {
                continue;
            }
            let schema = self.graph.schema_of(table.id());
            let at = self.renamed_at(table.id()).max(self.renamed_at(schema));
            renames.push((at, *table, TableRename { from, to }));
        }
        if renames.is_empty() {
            return;
        }
        renames.sort_by_key(|(at, table, _)| (*at, *table));
        actions.push(Action::RenameTables {
            renames: renames.into_iter().map(|(_, _, r)| r).collect(),
        });
    }

    /// Groups clauses by table, keeping first-seen table order.
    pub(crate) fn push_grouped(
        actions: &mut Vec<Action>,
        groups: BTreeMap<TableId, (QualifiedName, Vec<AlterClause>)>,
    ) {
        for (_, (table, clauses)) in groups {
            if !clauses.is_empty() {
                actions.push(Action::AlterTable { table, clauses });
            }
        }
    }
}

/// Whether a storage change cannot be done in place: virtual to stored and
/// back, or between plain and virtual.
fn storage_flip(before: Option<&Computation>, now: Option<&Computation>) -> bool {
    let mode = |c: Option<&Computation>| c.map(|c| c.storage);
    match (mode(before), mode(now)) {
        (a, b) if a == b => false,
        (Some(ComputationStorage::Virtual), _) | (_, Some(ComputationStorage::Virtual)) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::col;
    use crate::graph::{ColumnId, ObjectId};

    fn computation(storage: ComputationStorage) -> Computation {
        Computation {
            expression: col(ColumnId(ObjectId::new(1, 0))),
            storage,
        }
    }

    #[test]
    fn test_storage_flip() {
        let virtual_ = computation(ComputationStorage::Virtual);
        let stored = computation(ComputationStorage::Stored);
        assert!(storage_flip(None, Some(&virtual_)));
        assert!(storage_flip(Some(&virtual_), Some(&stored)));
        assert!(storage_flip(Some(&stored), Some(&virtual_)));
        assert!(!storage_flip(None, Some(&stored)));
        assert!(!storage_flip(Some(&stored), None));
        assert!(!storage_flip(Some(&virtual_), Some(&virtual_)));
    }
}
