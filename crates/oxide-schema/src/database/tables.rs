//! Schemas, tables and views.

use std::collections::BTreeSet;

use tracing::debug;

use super::Database;
use crate::changes::MutationContext;
use crate::error::Result;
use crate::expr::ViewQuery;
use crate::graph::{
    ColumnId, ObjectData, ObjectId, ObjectKind, ReferenceSource, SchemaData, SchemaId, TableId,
    ViewData, ViewId,
};

impl Database {
    /// The schema created with the database.
    #[must_use]
    pub const fn default_schema(&self) -> SchemaId {
        self.default_schema
    }

    /// Live schemas in creation order.
    #[must_use]
    pub fn schemas(&self) -> Vec<SchemaId> {
        self.graph
            .namespace(None, ObjectKind::Schema)
            .into_iter()
            .map(SchemaId)
            .collect()
    }

    /// Creates a schema.
    pub fn create_schema(&mut self, name: &str) -> Result<SchemaId> {
        let mut rules = self.rules();
        rules.name(None, ObjectKind::Schema, name, None);
        rules.finish()?;

        let id = self.insert(
            name.to_string(),
            None,
            ObjectData::Schema(SchemaData { is_default: false }),
        );
        debug!(schema = name, "created schema");
        Ok(SchemaId(id))
    }

    /// Schema by name.
    pub fn schema(&self, name: &str) -> Result<SchemaId> {
        self.require(None, name)
    }

    /// Schema by name, if there is one.
    #[must_use]
    pub fn try_schema(&self, name: &str) -> Option<SchemaId> {
        self.lookup(None, name).ok().flatten()
    }

    /// Whether a live schema is called `name`.
    #[must_use]
    pub fn contains_schema(&self, name: &str) -> bool {
        self.try_schema(name).is_some()
    }

    /// Returns the schema called `name`, creating it if needed.
    pub fn get_or_create_schema(&mut self, name: &str) -> Result<SchemaId> {
        match self.lookup(None, name)? {
            Some(schema) => Ok(schema),
            None => self.create_schema(name),
        }
    }

    /// Removes a schema with everything in it.
    pub fn remove_schema(&mut self, schema: SchemaId) -> Result<()> {
        self.remove(schema)
    }

    /// Creates an empty table.
    pub fn create_table(&mut self, schema: SchemaId, name: &str) -> Result<TableId> {
        let mut rules = self.rules();
        if rules.live(schema) {
            rules.name(Some(schema.id()), ObjectKind::Table, name, None);
        }
        rules.finish()?;

        let id = self.insert(name.to_string(), Some(schema.id()), ObjectData::Table);
        debug!(schema = self.graph.name(schema.id()), table = name, "created table");
        Ok(TableId(id))
    }

    /// Table by name.
    pub fn table(&self, schema: SchemaId, name: &str) -> Result<TableId> {
        self.require(Some(schema.id()), name)
    }

    /// Table by name, if there is one.
    #[must_use]
    pub fn try_table(&self, schema: SchemaId, name: &str) -> Option<TableId> {
        self.lookup(Some(schema.id()), name).ok().flatten()
    }

    /// Whether `schema` holds a live table called `name`.
    #[must_use]
    pub fn contains_table(&self, schema: SchemaId, name: &str) -> bool {
        self.try_table(schema, name).is_some()
    }

    /// Returns the table called `name`, creating it if needed.
    pub fn get_or_create_table(&mut self, schema: SchemaId, name: &str) -> Result<TableId> {
        match self.lookup(Some(schema.id()), name)? {
            Some(table) => Ok(table),
            None => self.create_table(schema, name),
        }
    }

    /// Removes a table with its columns and constraints.
    pub fn remove_table(&mut self, table: TableId) -> Result<()> {
        self.remove(table)
    }

    /// Live tables of a schema in creation order.
    #[must_use]
    pub fn tables(&self, schema: SchemaId) -> Vec<TableId> {
        if !self.graph.is_live(schema.id()) {
            return Vec::new();
        }
        self.graph
            .children_of_kind(schema.id(), ObjectKind::Table)
            .map(TableId)
            .collect()
    }

    /// Live columns of a table in order.
    #[must_use]
    pub fn record_set(&self, table: TableId) -> Vec<ColumnId> {
        if !self.graph.is_live(table.id()) {
            return Vec::new();
        }
        self.graph.columns(table)
    }

    /// Moves a table to another schema, keeping its name.
    pub fn move_table(&mut self, table: TableId, schema: SchemaId) -> Result<()> {
        let mut rules = self.rules();
        let table_live = rules.live(table);
        let schema_live = rules.live(schema);
        if table_live && schema_live {
            let graph = rules.graph;
            rules.unique_name(
                Some(schema.id()),
                ObjectKind::Table,
                graph.name(table.id()),
                Some(table.id()),
            );
            for child in graph.object(table.id()).core().children() {
                let kind = graph.kind(*child);
                if kind.is_constraint() {
                    rules.unique_name(Some(schema.id()), kind, graph.name(*child), Some(*child));
                }
            }
        }
        rules.finish()?;

        if self.graph.parent(table.id()) == Some(schema.id()) {
            return Ok(());
        }
        let mut ctx = MutationContext::new(table);
        ctx.touch(&self.graph, table);
        self.graph.reparent(table.id(), schema.id());
        self.record(ctx);
        debug!(
            table = self.graph.name(table.id()),
            schema = self.graph.name(schema.id()),
            "moved table"
        );
        Ok(())
    }

    /// Creates a view over `query`.
    pub fn create_view(&mut self, schema: SchemaId, name: &str, query: ViewQuery) -> Result<ViewId> {
        let mut rules = self.rules();
        if rules.live(schema) {
            rules.name(Some(schema.id()), ObjectKind::View, name, None);
        }
        rules.view_query(None, &query);
        rules.finish()?;

        let id = self.graph.insert(
            name.to_string(),
            Some(schema.id()),
            ObjectData::View(ViewData { source: query }),
        );
        let view = ViewId(id);
        self.link_view(view);
        let mut ctx = MutationContext::new(id);
        ctx.created(id);
        self.record(ctx);
        debug!(view = name, "created view");
        Ok(view)
    }

    /// View by name.
    pub fn view(&self, schema: SchemaId, name: &str) -> Result<ViewId> {
        self.require(Some(schema.id()), name)
    }

    /// View by name, if there is one.
    #[must_use]
    pub fn try_view(&self, schema: SchemaId, name: &str) -> Option<ViewId> {
        self.lookup(Some(schema.id()), name).ok().flatten()
    }

    /// Whether `schema` holds a live view called `name`.
    #[must_use]
    pub fn contains_view(&self, schema: SchemaId, name: &str) -> bool {
        self.try_view(schema, name).is_some()
    }

    /// Returns the view called `name`, creating it over `query` if needed.
    /// An existing view keeps its query.
    pub fn get_or_create_view(
        &mut self,
        schema: SchemaId,
        name: &str,
        query: ViewQuery,
    ) -> Result<ViewId> {
        match self.lookup(Some(schema.id()), name)? {
            Some(view) => Ok(view),
            None => self.create_view(schema, name, query),
        }
    }

    /// Removes a view.
    pub fn remove_view(&mut self, view: ViewId) -> Result<()> {
        self.remove(view)
    }

    /// Live views of a schema in creation order.
    #[must_use]
    pub fn views(&self, schema: SchemaId) -> Vec<ViewId> {
        if !self.graph.is_live(schema.id()) {
            return Vec::new();
        }
        self.graph
            .children_of_kind(schema.id(), ObjectKind::View)
            .map(ViewId)
            .collect()
    }

    /// Replaces the query of a view. Fields that other views read must
    /// survive.
    pub fn set_view_source(&mut self, view: ViewId, query: ViewQuery) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(view) {
            rules.view_query(Some(view), &query);
            let fields = rules.graph.query_fields(&query);
            rules.view_fields_kept(view, &fields);
        }
        rules.finish()?;

        let mut ctx = MutationContext::new(view);
        ctx.touch(&self.graph, view);
        self.graph.view_data_mut(view).source = query;
        self.link_view(view);
        self.record(ctx);
        debug!(view = self.graph.name(view.id()), "replaced view source");
        Ok(())
    }

    /// Points the view's source edges at every relation, column and view
    /// its query reads.
    fn link_view(&mut self, view: ViewId) {
        let query = &self.graph.view_data(view).source;
        let mut targets: BTreeSet<ObjectId> = query.from.iter().copied().collect();
        targets.extend(query.referenced_columns().into_iter().map(ColumnId::id));
        targets.extend(query.referenced_views().into_iter().map(ViewId::id));
        self.graph
            .relink(view.id(), ReferenceSource::ViewSource, targets);
    }
}

#[cfg(test)]
mod tests {
    use crate::expr::{col, field, ViewQuery};
    use crate::types::ValueType;
    use crate::validate::RuleCode;
    use crate::Database;

    #[test]
    fn test_table_and_view_share_namespace() {
        let mut db = Database::new();
        let main = db.default_schema();
        db.create_table(main, "orders").unwrap();
        let err = db
            .create_view(main, "orders", ViewQuery::new())
            .unwrap_err();
        assert!(err.violates(RuleCode::NameNotUnique));
    }

    #[test]
    fn test_get_or_create_table_is_stable() {
        let mut db = Database::new();
        let main = db.default_schema();
        let a = db.get_or_create_table(main, "a").unwrap();
        let again = db.get_or_create_table(main, "a").unwrap();
        assert_eq!(a, again);
        assert!(db.contains_table(main, "a"));
        assert_eq!(db.tables(main), vec![a]);
    }

    #[test]
    fn test_move_table_checks_target_namespace() {
        let mut db = Database::new();
        let main = db.default_schema();
        let sales = db.create_schema("sales").unwrap();
        let t = db.create_table(main, "t").unwrap();
        db.create_table(sales, "t").unwrap();

        let err = db.move_table(t, sales).unwrap_err();
        assert!(err.violates(RuleCode::NameNotUnique));
        assert_eq!(db.tables(main), vec![t]);
    }

    #[test]
    fn test_view_source_keeps_read_fields() {
        let mut db = Database::new();
        let main = db.default_schema();
        let t = db.create_table(main, "t").unwrap();
        let a = db.create_column_of(t, "a", ValueType::Integer).unwrap();
        let b = db.create_column_of(t, "b", ValueType::Integer).unwrap();
        let v1 = db
            .create_view(main, "v1", ViewQuery::new().select(col(a)).source(t))
            .unwrap();
        db.create_view(main, "v2", ViewQuery::new().select(field(v1, "a")).source(v1))
            .unwrap();

        let err = db
            .set_view_source(v1, ViewQuery::new().select(col(b)).source(t))
            .unwrap_err();
        assert!(err.violates(RuleCode::ReferenceDependentExists));

        db.set_view_source(v1, ViewQuery::new().select(col(a)).select(col(b)).source(t))
            .unwrap();
        assert_eq!(db.graph().view_fields(v1), vec!["a", "b"]);
    }
}
