//! Columns.

use tracing::{debug, trace};

use super::{column_targets, Database};
use crate::changes::MutationContext;
use crate::error::Result;
use crate::expr::Expr;
use crate::graph::{
    ColumnData, ColumnId, Computation, ObjectData, ObjectKind, ReferenceSource, TableId,
};
use crate::types::{ColumnType, ValueType};

impl Database {
    /// Creates a nullable column without default.
    pub fn create_column(
        &mut self,
        table: TableId,
        name: &str,
        column_type: ColumnType,
    ) -> Result<ColumnId> {
        let mut rules = self.rules();
        if rules.live(table) {
            rules.name(Some(table.id()), ObjectKind::Column, name, None);
        }
        rules.finish()?;

        let id = self.insert(
            name.to_string(),
            Some(table.id()),
            ObjectData::Column(ColumnData {
                column_type,
                nullable: true,
                default: None,
                computation: None,
            }),
        );
        debug!(table = self.graph.name(table.id()), column = name, "created column");
        Ok(ColumnId(id))
    }

    /// Creates a column of the registry's type for `value_type`.
    pub fn create_column_of(
        &mut self,
        table: TableId,
        name: &str,
        value_type: ValueType,
    ) -> Result<ColumnId> {
        let column_type = self.registry.get_by_type(value_type);
        self.create_column(table, name, column_type)
    }

    /// Column by name.
    pub fn column(&self, table: TableId, name: &str) -> Result<ColumnId> {
        self.require(Some(table.id()), name)
    }

    /// Column by name, if there is one.
    #[must_use]
    pub fn try_column(&self, table: TableId, name: &str) -> Option<ColumnId> {
        self.lookup(Some(table.id()), name).ok().flatten()
    }

    /// Whether `table` has a live column called `name`.
    #[must_use]
    pub fn contains_column(&self, table: TableId, name: &str) -> bool {
        self.try_column(table, name).is_some()
    }

    /// Returns the column called `name`, creating it if needed. An existing
    /// column keeps its type.
    pub fn get_or_create_column(
        &mut self,
        table: TableId,
        name: &str,
        column_type: ColumnType,
    ) -> Result<ColumnId> {
        match self.lookup(Some(table.id()), name)? {
            Some(column) => Ok(column),
            None => self.create_column(table, name, column_type),
        }
    }

    /// Removes a column.
    pub fn remove_column(&mut self, column: ColumnId) -> Result<()> {
        self.remove(column)
    }

    /// Changes the type of a column. A default value does not survive a
    /// change of value type. Returning to the committed value type brings
    /// the committed default back when the column has none.
    pub fn set_column_type(&mut self, column: ColumnId, column_type: ColumnType) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(column) {
            rules.column_retype(column, &column_type);
        }
        rules.finish()?;

        let committed = self
            .tracker
            .baseline(&self.graph, column.id())
            .and_then(|state| state.data.as_column().cloned())
            .filter(|data| data.column_type.value_type == column_type.value_type)
            .and_then(|data| data.default);
        let mut ctx = MutationContext::new(column);
        ctx.touch(&self.graph, column);
        let data = self.graph.column_data_mut(column);
        if data.column_type.value_type != column_type.value_type {
            if data.default.is_some() {
                trace!(%column, "clearing default on retype");
                data.default = None;
            } else if data.computation.is_none() && committed.is_some() {
                trace!(%column, "restoring committed default");
                data.default = committed;
            }
        }
        data.column_type = column_type;
        self.record(ctx);
        Ok(())
    }

    /// Allows or forbids NULL.
    pub fn set_nullable(&mut self, column: ColumnId, nullable: bool) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(column) && nullable {
            rules.column_nullable(column);
        }
        rules.finish()?;

        let mut ctx = MutationContext::new(column);
        ctx.touch(&self.graph, column);
        self.graph.column_data_mut(column).nullable = nullable;
        self.record(ctx);
        Ok(())
    }

    /// Sets or clears the default value.
    pub fn set_default(&mut self, column: ColumnId, default: Option<Expr>) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(column) {
            let graph = rules.graph;
            if let Some(table) = graph.table_of(column.id()) {
                let computation = graph
                    .column_data(column)
                    .computation
                    .as_ref()
                    .map(|c| &c.expression);
                rules.column_values(Some(column), table, default.as_ref(), computation);
            }
        }
        rules.finish()?;

        let mut ctx = MutationContext::new(column);
        ctx.touch(&self.graph, column);
        self.graph.column_data_mut(column).default = default;
        self.record(ctx);
        Ok(())
    }

    /// Turns a column into a computed one, or back into a plain one.
    pub fn set_computation(
        &mut self,
        column: ColumnId,
        computation: Option<Computation>,
    ) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(column) {
            let graph = rules.graph;
            if let Some(table) = graph.table_of(column.id()) {
                let default = graph.column_data(column).default.as_ref();
                let expression = computation.as_ref().map(|c| &c.expression);
                rules.column_values(Some(column), table, default, expression);
            }
        }
        rules.finish()?;

        let targets = column_targets(computation.as_ref().map(|c| &c.expression));
        let mut ctx = MutationContext::new(column);
        ctx.touch(&self.graph, column);
        self.graph.column_data_mut(column).computation = computation;
        self.graph
            .relink(column.id(), ReferenceSource::Computation, targets);
        self.record(ctx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{col, Expr};
    use crate::graph::{Computation, ReferenceSource};
    use crate::types::{ColumnType, ValueType};
    use crate::validate::RuleCode;
    use crate::Database;

    #[test]
    fn test_retype_clears_default() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let c = db.create_column_of(t, "c", ValueType::Integer).unwrap();
        db.set_default(c, Some(Expr::integer(0))).unwrap();

        db.set_column_type(c, ColumnType::new(ValueType::Text, "TEXT"))
            .unwrap();
        assert_eq!(db.graph().column_data(c).default, None);
    }

    #[test]
    fn test_retype_round_trip_restores_committed_default() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let c = db.create_column_of(t, "c", ValueType::Integer).unwrap();
        db.set_default(c, Some(Expr::integer(7))).unwrap();
        db.accept_changes();

        let integer = db.graph().column_data(c).column_type.clone();
        db.set_column_type(c, ColumnType::new(ValueType::Text, "TEXT"))
            .unwrap();
        db.set_column_type(c, integer).unwrap();
        assert_eq!(db.graph().column_data(c).default, Some(Expr::integer(7)));
        assert!(db.changes().is_empty());
        assert!(db.complete_pending_changes().is_empty());
    }

    #[test]
    fn test_retype_keeps_uncommitted_default_cleared() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let c = db.create_column_of(t, "c", ValueType::Integer).unwrap();
        db.accept_changes();

        db.set_default(c, Some(Expr::integer(7))).unwrap();
        db.set_column_type(c, ColumnType::new(ValueType::Text, "TEXT"))
            .unwrap();
        db.set_column_type(c, ColumnType::new(ValueType::Integer, "INTEGER"))
            .unwrap();
        assert_eq!(db.graph().column_data(c).default, None);
    }

    #[test]
    fn test_default_and_computation_exclude_each_other() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let a = db.create_column_of(t, "a", ValueType::Integer).unwrap();
        let b = db.create_column_of(t, "b", ValueType::Integer).unwrap();
        db.set_default(b, Some(Expr::integer(1))).unwrap();

        let err = db
            .set_computation(b, Some(Computation::stored(col(a).plus(Expr::integer(1)))))
            .unwrap_err();
        assert!(err.violates(RuleCode::ColumnDefaultWithComputation));
    }

    #[test]
    fn test_computation_links_and_rejects_cycles() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let a = db.create_column_of(t, "a", ValueType::Integer).unwrap();
        let b = db.create_column_of(t, "b", ValueType::Integer).unwrap();

        db.set_computation(b, Some(Computation::virtual_column(col(a))))
            .unwrap();
        let deps = db.graph().dependents(a.id());
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].source, ReferenceSource::Computation);

        let err = db
            .set_computation(a, Some(Computation::virtual_column(col(b))))
            .unwrap_err();
        assert!(err.violates(RuleCode::ColumnComputationCycle));
        let err = db
            .set_computation(a, Some(Computation::virtual_column(col(a))))
            .unwrap_err();
        assert!(err.violates(RuleCode::ColumnComputationSelfReference));

        db.set_computation(b, None).unwrap();
        assert!(db.graph().dependents(a.id()).is_empty());
    }

    #[test]
    fn test_computation_must_stay_in_table() {
        let mut db = Database::new();
        let main = db.default_schema();
        let t = db.create_table(main, "t").unwrap();
        let u = db.create_table(main, "u").unwrap();
        let a = db.create_column_of(t, "a", ValueType::Integer).unwrap();
        let x = db.create_column_of(u, "x", ValueType::Integer).unwrap();

        let err = db
            .set_computation(x, Some(Computation::virtual_column(col(a))))
            .unwrap_err();
        assert!(err.violates(RuleCode::ExpressionForeignColumn));
    }
}
