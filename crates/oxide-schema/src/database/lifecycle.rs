//! Operations shared by every object kind: rename, remove and default names.

use tracing::{debug, trace};

use super::Database;
use crate::changes::MutationContext;
use crate::error::Result;
use crate::graph::{
    CheckId, ColumnId, ForeignKeyId, IndexId, ObjectData, ObjectId, ObjectKind, TableId,
};
use crate::naming;
use crate::validate::RuleCode;

impl Database {
    /// Renames an object in place. Renaming to the current name does
    /// nothing.
    pub fn rename(&mut self, id: impl Into<ObjectId>, name: &str) -> Result<()> {
        let id = id.into();
        let mut rules = self.rules();
        if rules.live(id) {
            let graph = rules.graph;
            let kind = graph.kind(id);
            let scope = self.name_scope(kind, graph.parent(id));
            rules.name(scope, kind, name, Some(id));
            if kind == ObjectKind::Column && graph.name(id) != name {
                rules.column_rename(ColumnId(id));
            }
        }
        rules.finish()?;

        if self.graph.name(id) == name {
            return Ok(());
        }
        let mut ctx = MutationContext::new(id);
        ctx.touch(&self.graph, id);
        let previous = std::mem::replace(&mut self.graph.object_mut(id).core.name, name.to_string());
        self.record(ctx);
        debug!(kind = %self.graph.kind(id), from = %previous, to = name, "renamed");
        Ok(())
    }

    /// Removes an object with everything it owns.
    ///
    /// Removing a primary key takes its backing index along and the other
    /// way round. The removal is vetoed while an object outside the removed
    /// set still depends on something inside it. Removing an object twice
    /// is a no-op.
    pub fn remove(&mut self, id: impl Into<ObjectId>) -> Result<()> {
        let id = id.into();
        let mut rules = self.rules();
        if !rules.graph.owns(id) {
            rules.live(id);
            return rules.finish();
        }
        if rules.graph.object(id).is_removed() {
            trace!(%id, "already removed");
            return Ok(());
        }
        if id == self.default_schema.id() {
            rules.fail(
                RuleCode::SchemaDefaultRemoval,
                format!("the default schema '{}' cannot be removed", self.graph.name(id)),
            );
        }
        let cascade = rules.graph.cascade(id);
        rules.no_external_dependents(&cascade);
        rules.finish()?;

        let mut ctx = MutationContext::new(id);
        for member in &cascade {
            ctx.touch(&self.graph, *member);
        }
        for member in &cascade {
            self.graph.unlink_all(*member);
        }
        for member in &cascade {
            self.graph.detach(*member);
            self.graph.object_mut(*member).core.removed = true;
        }
        self.record(ctx);
        debug!(
            kind = %self.graph.kind(id),
            name = self.graph.name(id),
            cascade = cascade.len(),
            "removed"
        );
        Ok(())
    }

    /// The name the object would get by default in its current state, for
    /// kinds that have one: indexes, primary keys, foreign keys and checks.
    #[must_use]
    pub fn default_name(&self, id: impl Into<ObjectId>) -> Option<String> {
        let id = id.into();
        if !self.graph.is_live(id) {
            return None;
        }
        let table = self.graph.table_of(id)?;
        match self.graph.object(id).data() {
            ObjectData::Index(data) => {
                Some(self.index_default_name(table, data.unique, &data.keys))
            }
            ObjectData::PrimaryKey(_) => Some(self.primary_key_default_name(table)),
            ObjectData::ForeignKey(data) => {
                Some(self.foreign_key_default_name(data.origin, data.referenced))
            }
            ObjectData::Check(data) => Some(match data.ordinal {
                Some(ordinal) => naming::fit_identifier(
                    &naming::ordinal_check_name(self.graph.name(table.id()), ordinal),
                    self.max_identifier_length(),
                ),
                None => self.digest_check_name(table, &data.condition),
            }),
            _ => None,
        }
    }

    /// Renames an object to its default name.
    pub fn reset_name(&mut self, id: impl Into<ObjectId>) -> Result<()> {
        let id = id.into();
        let mut rules = self.rules();
        let mut name = None;
        if rules.live(id) {
            name = self.default_name(id);
            if name.is_none() {
                let message = format!(
                    "{} '{}' has no default name",
                    self.graph.kind(id),
                    self.graph.name(id)
                );
                rules.fail(RuleCode::NameNoDefault, message);
            }
        }
        rules.finish()?;

        match name {
            Some(name) => self.rename(id, &name),
            None => Ok(()),
        }
    }

    /// Renames an index to its default name.
    pub fn reset_index_name(&mut self, index: IndexId) -> Result<()> {
        self.reset_name(index)
    }

    /// Renames a foreign key to its default name.
    pub fn reset_foreign_key_name(&mut self, key: ForeignKeyId) -> Result<()> {
        self.reset_name(key)
    }

    /// Renames a check to its default name.
    pub fn reset_check_name(&mut self, check: CheckId) -> Result<()> {
        self.reset_name(check)
    }

    /// Renames a table and, when `constraints` is set, resets the names of
    /// its indexes and constraints that still carried their old default.
    pub fn rename_table(&mut self, table: TableId, name: &str, constraints: bool) -> Result<()> {
        let stale: Vec<ObjectId> = if constraints && self.graph.is_live(table.id()) {
            self.graph
                .object(table.id())
                .core()
                .children()
                .iter()
                .copied()
                .filter(|child| self.graph.kind(*child) != ObjectKind::Column)
                .filter(|child| self.default_name(*child).as_deref() == Some(self.graph.name(*child)))
                .collect()
        } else {
            Vec::new()
        };
        self.rename(table, name)?;
        for child in stale {
            self.reset_name(child)?;
        }
        Ok(())
    }
}
