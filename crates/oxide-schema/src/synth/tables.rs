//! Table-level phases: foreign keys, table drops and creates, and the
//! per-table `ALTER TABLE` statements.

use std::collections::BTreeMap;

use super::{
    Action, AlterClause, CheckDefinition, Era, Facts, ForeignKeyDefinition,
    PrimaryKeyDefinition, Synthesizer, TableDefinition,
};
use crate::expr::QualifiedName;
use crate::graph::{ObjectId, ObjectKind, ObjectState, TableId};

/// Clauses of one existing table, bucketed by statement.
#[derive(Debug, Default)]
struct TableEdits {
    drops: Vec<AlterClause>,
    column_renames: Vec<(u64, AlterClause)>,
    index_renames: Vec<(u64, AlterClause)>,
    backfills: Vec<Action>,
    adds: Vec<AlterClause>,
}

impl TableEdits {
    /// Emits the statements of one table.
    ///
    /// Without renames or backfills the drop and add clauses form a single
    /// statement. Otherwise each bucket is its own statement: drops, column
    /// renames, index renames, backfills, adds.
    fn emit(mut self, table: &QualifiedName, actions: &mut Vec<Action>) {
        sort_clauses(&mut self.drops);
        sort_clauses(&mut self.adds);
        if self.column_renames.is_empty() && self.index_renames.is_empty() && self.backfills.is_empty()
        {
            let mut clauses = self.drops;
            clauses.extend(self.adds);
            push_alter(actions, table, clauses);
            return;
        }
        push_alter(actions, table, self.drops);
        self.column_renames.sort_by_key(|(at, _)| *at);
        push_alter(
            actions,
            table,
            self.column_renames.into_iter().map(|(_, c)| c).collect(),
        );
        self.index_renames.sort_by_key(|(at, _)| *at);
        push_alter(
            actions,
            table,
            self.index_renames.into_iter().map(|(_, c)| c).collect(),
        );
        actions.extend(self.backfills);
        push_alter(actions, table, self.adds);
    }
}

fn push_alter(actions: &mut Vec<Action>, table: &QualifiedName, clauses: Vec<AlterClause>) {
    if !clauses.is_empty() {
        actions.push(Action::AlterTable {
            table: table.clone(),
            clauses,
        });
    }
}

/// Position of a clause kind within a statement.
const fn clause_rank(clause: &AlterClause) -> u8 {
    match clause {
        AlterClause::RenameColumn { .. } => 0,
        AlterClause::RenameIndex { .. } => 1,
        AlterClause::DropForeignKey { .. } => 2,
        AlterClause::DropCheck { .. } => 3,
        AlterClause::DropIndex { .. } => 4,
        AlterClause::DropPrimaryKey { .. } => 5,
        AlterClause::DropColumn { .. } => 6,
        AlterClause::AddColumn { .. } => 7,
        AlterClause::ModifyColumn { .. } => 8,
        AlterClause::SetDefault { .. } => 9,
        AlterClause::AddPrimaryKey { .. } => 10,
        AlterClause::AddIndex { .. } => 11,
        AlterClause::AddCheck { .. } => 12,
        AlterClause::AddForeignKey { .. } => 13,
    }
}

fn sort_clauses(clauses: &mut [AlterClause]) {
    clauses.sort_by_key(clause_rank);
}

impl Synthesizer<'_> {
    fn foreign_key_definition(&self, state: &ObjectState) -> Option<ForeignKeyDefinition> {
        let data = state.data.as_foreign_key()?;
        let origin = self.graph.index_data(data.origin);
        let referenced = self.graph.index_data(data.referenced);
        let referenced_table = self.graph.table_of(data.referenced.id())?;
        Some(ForeignKeyDefinition {
            name: state.name.clone(),
            columns: self.key_column_names(Era::Current, origin),
            referenced_table: self.qualified(Era::Current, referenced_table.id()),
            referenced_columns: self.key_column_names(Era::Current, referenced),
            on_delete: data.on_delete,
            on_update: data.on_update,
        })
    }

    fn primary_key_definition(&self, state: &ObjectState) -> Option<PrimaryKeyDefinition> {
        let data = state.data.as_primary_key()?;
        Some(PrimaryKeyDefinition {
            name: state.name.clone(),
            columns: self.key_column_names(Era::Current, self.graph.index_data(data.index)),
        })
    }

    fn check_definition(&self, state: &ObjectState) -> Option<CheckDefinition> {
        let data = state.data.as_check()?;
        Some(CheckDefinition {
            name: state.name.clone(),
            condition: self.sql_expr(Era::Current, &data.condition, false),
        })
    }

    /// Phase 2: foreign keys, then checks, ahead of every constraint add.
    pub(crate) fn drop_constraints(&self, facts: &Facts, actions: &mut Vec<Action>) {
        let mut groups: BTreeMap<TableId, (QualifiedName, Vec<AlterClause>)> = BTreeMap::new();
        let mut push = |table: TableId, clause: AlterClause| {
            groups
                .entry(table)
                .or_insert_with(|| (self.qualified(Era::Baseline, table.id()), Vec::new()))
                .1
                .push(clause);
        };
        for table in &facts.kept_tables {
            for (id, state) in self.children(Era::Baseline, table.id()) {
                if state.kind() != ObjectKind::ForeignKey {
                    continue;
                }
                if !self.exists(id) || facts.rebuilt_foreign_keys.contains(&id) {
                    push(*table, AlterClause::DropForeignKey { name: state.name });
                }
            }
        }
        for (table, fk) in &facts.cycle_breaks {
            if let Some(state) = self.state(Era::Baseline, *fk) {
                push(*table, AlterClause::DropForeignKey { name: state.name });
            }
        }
        for table in &facts.kept_tables {
            for (id, state) in self.children(Era::Baseline, table.id()) {
                if state.kind() == ObjectKind::Check && self.check_outdated(facts, id, &state) {
                    push(*table, AlterClause::DropCheck { name: state.name });
                }
            }
        }
        Self::push_grouped(actions, groups);
    }

    /// Whether a baseline check is gone or must be re-created.
    fn check_outdated(&self, facts: &Facts, id: ObjectId, before: &ObjectState) -> bool {
        let unchanged = self.state(Era::Current, id).is_some_and(|now| {
            now == *before
                && now.data.as_check().is_some_and(|c| {
                    c.condition
                        .referenced_columns()
                        .iter()
                        .all(|column| !facts.rebuilt_columns.contains(&column.id()))
                })
        });
        !unchanged
    }

    /// Phase 3.
    pub(crate) fn drop_tables(&self, facts: &Facts, actions: &mut Vec<Action>) {
        for table in &facts.dropped_tables {
            actions.push(Action::DropTable {
                name: self.qualified(Era::Baseline, table.id()),
            });
        }
    }

    /// Phase 8.
    pub(crate) fn create_tables(&self, facts: &Facts, actions: &mut Vec<Action>) {
        for table in &facts.created_tables {
            let mut definition = TableDefinition {
                name: self.qualified(Era::Current, table.id()),
                columns: Vec::new(),
                primary_key: None,
                indexes: Vec::new(),
                checks: Vec::new(),
            };
            for (_, state) in self.children(Era::Current, table.id()) {
                match state.kind() {
                    ObjectKind::Column => {
                        definition.columns.extend(self.column_definition(&state));
                    }
                    ObjectKind::PrimaryKey => {
                        definition.primary_key = self.primary_key_definition(&state);
                    }
                    ObjectKind::Index => {
                        if state.data.as_index().is_some_and(|i| i.is_physical()) {
                            definition.indexes.extend(self.index_definition(&state));
                        }
                    }
                    ObjectKind::Check => definition.checks.extend(self.check_definition(&state)),
                    _ => {}
                }
            }
            actions.push(Action::CreateTable { table: definition });
        }
    }

    /// Phase 9.
    pub(crate) fn alter_tables(&self, facts: &Facts, actions: &mut Vec<Action>) {
        for table in &facts.kept_tables {
            let mut edits = TableEdits::default();
            self.alter_columns(facts, *table, &mut edits);
            self.alter_indexes(facts, *table, &mut edits);
            self.alter_primary_key(facts, *table, &mut edits);
            self.alter_checks(facts, *table, &mut edits);
            edits.emit(&self.qualified(Era::Current, table.id()), actions);
        }
    }

    fn alter_columns(&self, facts: &Facts, table: TableId, edits: &mut TableEdits) {
        for (id, before) in self.children(Era::Baseline, table.id()) {
            if before.kind() != ObjectKind::Column {
                continue;
            }
            let Some(now) = self.state(Era::Current, id) else {
                edits.drops.push(AlterClause::DropColumn { name: before.name });
                continue;
            };
            if facts.rebuilt_columns.contains(&id) {
                edits.drops.push(AlterClause::DropColumn { name: before.name });
                edits.adds.extend(
                    self.column_definition(&now)
                        .map(|column| AlterClause::AddColumn { column }),
                );
                continue;
            }
            if before.name != now.name {
                edits.column_renames.push((
                    self.renamed_at(id),
                    AlterClause::RenameColumn {
                        from: before.name.clone(),
                        to: now.name.clone(),
                    },
                ));
            }
            let (Some(b), Some(n)) = (before.data.as_column(), now.data.as_column()) else {
                continue;
            };
            if b == n {
                continue;
            }
            let default_only = b.column_type == n.column_type
                && b.nullable == n.nullable
                && b.computation == n.computation;
            if default_only {
                edits.adds.push(AlterClause::SetDefault {
                    column: now.name.clone(),
                    default: n
                        .default
                        .as_ref()
                        .map(|e| self.sql_expr(Era::Current, e, false)),
                });
                continue;
            }
            if b.nullable && !n.nullable && n.computation.is_none() {
                edits.backfills.push(Action::Backfill {
                    table: self.qualified(Era::Current, table.id()),
                    column: now.name.clone(),
                    value: self.registry.get_default_value(&n.column_type),
                });
            }
            edits.adds.extend(
                self.column_definition(&now)
                    .map(|column| AlterClause::ModifyColumn { column }),
            );
        }
        for (id, now) in self.children(Era::Current, table.id()) {
            if now.kind() == ObjectKind::Column && !self.existed(id) {
                edits.adds.extend(
                    self.column_definition(&now)
                        .map(|column| AlterClause::AddColumn { column }),
                );
            }
        }
    }

    fn alter_indexes(&self, facts: &Facts, table: TableId, edits: &mut TableEdits) {
        let mut ids: Vec<ObjectId> = self
            .children(Era::Baseline, table.id())
            .into_iter()
            .chain(self.children(Era::Current, table.id()))
            .filter(|(_, s)| s.kind() == ObjectKind::Index)
            .map(|(id, _)| id)
            .collect();
        ids.sort_unstable();
        ids.dedup();

        for id in ids {
            let before = self
                .state(Era::Baseline, id)
                .filter(|s| s.data.as_index().is_some_and(|i| i.is_physical()));
            let now = self
                .state(Era::Current, id)
                .filter(|s| s.data.as_index().is_some_and(|i| i.is_physical()));
            match (before, now) {
                (Some(before), Some(now)) => {
                    if facts.rebuilt_indexes.contains(&id) {
                        edits.drops.push(AlterClause::DropIndex { name: before.name });
                        edits.adds.extend(
                            self.index_definition(&now)
                                .map(|index| AlterClause::AddIndex { index }),
                        );
                    } else if before.name != now.name {
                        edits.index_renames.push((
                            self.renamed_at(id),
                            AlterClause::RenameIndex {
                                from: before.name,
                                to: now.name,
                            },
                        ));
                    }
                }
                (Some(before), None) => {
                    edits.drops.push(AlterClause::DropIndex { name: before.name });
                }
                (None, Some(now)) => {
                    edits.adds.extend(
                        self.index_definition(&now)
                            .map(|index| AlterClause::AddIndex { index }),
                    );
                }
                (None, None) => {}
            }
        }
    }

    fn alter_primary_key(&self, facts: &Facts, table: TableId, edits: &mut TableEdits) {
        if !facts.rebuilt_primary_keys.contains(&table) {
            return;
        }
        if let Some((_, before)) = self.primary_key(Era::Baseline, table) {
            edits
                .drops
                .push(AlterClause::DropPrimaryKey { name: before.name });
        }
        if let Some((_, now)) = self.primary_key(Era::Current, table) {
            edits.adds.extend(
                self.primary_key_definition(&now)
                    .map(|key| AlterClause::AddPrimaryKey { key }),
            );
        }
    }

    /// Re-creates the checks dropped in phase 2 and adds new ones.
    fn alter_checks(&self, facts: &Facts, table: TableId, edits: &mut TableEdits) {
        for (id, before) in self.children(Era::Baseline, table.id()) {
            if before.kind() != ObjectKind::Check || !self.check_outdated(facts, id, &before) {
                continue;
            }
            if let Some(now) = self.state(Era::Current, id) {
                edits.adds.extend(
                    self.check_definition(&now)
                        .map(|check| AlterClause::AddCheck { check }),
                );
            }
        }
        for (id, now) in self.children(Era::Current, table.id()) {
            if now.kind() == ObjectKind::Check && !self.existed(id) {
                edits.adds.extend(
                    self.check_definition(&now)
                        .map(|check| AlterClause::AddCheck { check }),
                );
            }
        }
    }

    /// Phase 10.
    pub(crate) fn add_foreign_keys(&self, facts: &Facts, actions: &mut Vec<Action>) {
        let mut groups: BTreeMap<TableId, (QualifiedName, Vec<AlterClause>)> = BTreeMap::new();
        let tables = facts.kept_tables.iter().chain(&facts.created_tables);
        for table in tables {
            for (id, state) in self.children(Era::Current, table.id()) {
                if state.kind() != ObjectKind::ForeignKey {
                    continue;
                }
                if self.existed(id) && !facts.rebuilt_foreign_keys.contains(&id) {
                    continue;
                }
                if let Some(key) = self.foreign_key_definition(&state) {
                    groups
                        .entry(*table)
                        .or_insert_with(|| (self.qualified(Era::Current, table.id()), Vec::new()))
                        .1
                        .push(AlterClause::AddForeignKey { key });
                }
            }
        }
        Self::push_grouped(actions, groups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> QualifiedName {
        QualifiedName::new("main", "t")
    }

    #[test]
    fn test_edits_merge_without_renames() {
        let edits = TableEdits {
            drops: vec![AlterClause::DropIndex { name: "IX".into() }],
            adds: vec![AlterClause::SetDefault {
                column: "a".into(),
                default: None,
            }],
            ..TableEdits::default()
        };
        let mut actions = Vec::new();
        edits.emit(&table(), &mut actions);
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn test_edits_split_around_renames() {
        let edits = TableEdits {
            drops: vec![AlterClause::DropColumn { name: "old".into() }],
            column_renames: vec![
                (
                    4,
                    AlterClause::RenameColumn {
                        from: "b".into(),
                        to: "c".into(),
                    },
                ),
                (
                    2,
                    AlterClause::RenameColumn {
                        from: "a".into(),
                        to: "b".into(),
                    },
                ),
            ],
            ..TableEdits::default()
        };
        let mut actions = Vec::new();
        edits.emit(&table(), &mut actions);
        assert_eq!(actions.len(), 2);
        let Action::AlterTable { clauses, .. } = &actions[1] else {
            panic!("expected an ALTER TABLE");
        };
        assert_eq!(
            clauses[0],
            AlterClause::RenameColumn {
                from: "a".into(),
                to: "b".into()
            }
        );
    }
}
