//! The object graph.
//!
//! Objects live in an arena owned by [`ObjectGraph`] and are addressed by
//! [`ObjectId`]. Slots are never reused: removed objects stay in the arena
//! with their removed flag set, so identities held by the change tracker
//! remain valid.

mod ids;
mod object;

pub(crate) use ids::{next_database_tag, wrap};
pub use ids::{
    CheckId, ColumnId, ForeignKeyId, IndexId, ObjectId, ObjectKind, PrimaryKeyId, SchemaId,
    TableId, TypedId, ViewId,
};
pub use object::{
    CheckData, ColumnData, Computation, ComputationStorage, ForeignKeyData, IndexData, IndexKey,
    IndexTarget, ObjectCore, ObjectData, ObjectState, PrimaryKeyData, Reference, ReferenceSource,
    ReferentialAction, SchemaData, SchemaObject, SortOrder, ViewData,
};

/// Arena of schema objects belonging to one database.
#[derive(Debug, Clone)]
pub struct ObjectGraph {
    database: u32,
    objects: Vec<SchemaObject>,
}

macro_rules! typed_access {
    ($get:ident, $get_mut:ident, $id:ty, $variant:ident, $data:ty) => {
        typed_access!($get, $id, $variant, $data);

        pub(crate) fn $get_mut(&mut self, id: $id) -> &mut $data {
            match &mut self.object_mut(id.0).data {
                ObjectData::$variant(data) => data,
                other => unreachable!("{} holds a {}", id, other.kind()),
            }
        }
    };
    ($get:ident, $id:ty, $variant:ident, $data:ty) => {
        /// Typed payload access.
        ///
        /// # Panics
        ///
        /// Panics if the handle belongs to another database.
        #[must_use]
        pub fn $get(&self, id: $id) -> &$data {
            match &self.object(id.0).data {
                ObjectData::$variant(data) => data,
                other => unreachable!("{} holds a {}", id, other.kind()),
            }
        }
    };
}

impl ObjectGraph {
    pub(crate) const fn new(database: u32) -> Self {
        Self {
            database,
            objects: Vec::new(),
        }
    }

    /// Tag of the owning database.
    #[must_use]
    pub const fn database(&self) -> u32 {
        self.database
    }

    /// Number of objects ever created, removed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the graph holds no objects at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Allocates a new object and appends it to its parent's children.
    pub(crate) fn insert(
        &mut self,
        name: String,
        parent: Option<ObjectId>,
        data: ObjectData,
    ) -> ObjectId {
        let slot = u32::try_from(self.objects.len()).unwrap_or(u32::MAX);
        let id = ObjectId::new(self.database, slot);
        self.objects.push(SchemaObject {
            core: ObjectCore::new(name, parent),
            data,
        });
        if let Some(parent) = parent {
            self.object_mut(parent).core.children.push(id);
        }
        id
    }

    /// Unlinks `id` from its parent's child list.
    pub(crate) fn detach(&mut self, id: ObjectId) {
        if let Some(parent) = self.parent(id) {
            self.object_mut(parent).core.children.retain(|c| *c != id);
        }
    }

    /// Moves `id` under `parent`, appending it to the new child list.
    pub(crate) fn reparent(&mut self, id: ObjectId, parent: ObjectId) {
        self.detach(id);
        self.object_mut(id).core.parent = Some(parent);
        self.object_mut(parent).core.children.push(id);
    }

    /// Returns the object if `id` belongs to this graph.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&SchemaObject> {
        if id.database() != self.database {
            return None;
        }
        self.objects.get(id.slot())
    }

    /// Whether `id` addresses an object of this graph.
    #[must_use]
    pub fn owns(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Whether `id` addresses a live object of this graph.
    #[must_use]
    pub fn is_live(&self, id: ObjectId) -> bool {
        self.get(id).is_some_and(|o| !o.core.removed)
    }

    /// Returns the object.
    ///
    /// # Panics
    ///
    /// Panics if `id` belongs to another database.
    #[must_use]
    pub fn object(&self, id: ObjectId) -> &SchemaObject {
        &self.objects[self.slot(id)]
    }

    pub(crate) fn object_mut(&mut self, id: ObjectId) -> &mut SchemaObject {
        let slot = self.slot(id);
        &mut self.objects[slot]
    }

    fn slot(&self, id: ObjectId) -> usize {
        assert!(
            id.database() == self.database,
            "object {id} belongs to another database"
        );
        id.slot()
    }

    /// All objects, removed ones included, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &SchemaObject)> + '_ {
        let database = self.database;
        self.objects.iter().enumerate().map(move |(slot, object)| {
            let slot = u32::try_from(slot).unwrap_or(u32::MAX);
            (ObjectId::new(database, slot), object)
        })
    }

    /// Current name of an object.
    #[must_use]
    pub fn name(&self, id: ObjectId) -> &str {
        &self.object(id).core.name
    }

    /// Kind of an object.
    #[must_use]
    pub fn kind(&self, id: ObjectId) -> ObjectKind {
        self.object(id).kind()
    }

    /// Owning object.
    #[must_use]
    pub fn parent(&self, id: ObjectId) -> Option<ObjectId> {
        self.object(id).core.parent
    }

    /// Schema that (transitively) owns `id`; a schema owns itself.
    #[must_use]
    pub fn schema_of(&self, id: ObjectId) -> ObjectId {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Table owning a column or constraint, or the table itself.
    #[must_use]
    pub fn table_of(&self, id: ObjectId) -> Option<TableId> {
        match self.kind(id) {
            ObjectKind::Table => Some(TableId(id)),
            ObjectKind::Schema | ObjectKind::View => None,
            _ => self.parent(id).map(TableId),
        }
    }

    /// Live children of `parent` with the given kind.
    pub fn children_of_kind(
        &self,
        parent: ObjectId,
        kind: ObjectKind,
    ) -> impl Iterator<Item = ObjectId> + '_ {
        self.object(parent)
            .core
            .children
            .iter()
            .copied()
            .filter(move |child| self.kind(*child) == kind)
    }

    /// Finds a live object by name in the namespace that `kind` lives in
    /// under `scope` (a database-wide search for schemas).
    #[must_use]
    pub fn find(&self, scope: Option<ObjectId>, kind: ObjectKind, name: &str) -> Option<ObjectId> {
        self.namespace(scope, kind)
            .into_iter()
            .find(|candidate| self.name(*candidate) == name)
    }

    /// Live members of the namespace `kind` belongs to under `scope`.
    ///
    /// Tables and views share a per-schema namespace, columns and indexes
    /// are scoped per table and constraints per schema.
    #[must_use]
    pub fn namespace(&self, scope: Option<ObjectId>, kind: ObjectKind) -> Vec<ObjectId> {
        match (kind, scope) {
            (ObjectKind::Schema, _) | (_, None) => self
                .iter()
                .filter(|(_, o)| !o.core.removed && o.kind() == ObjectKind::Schema)
                .map(|(id, _)| id)
                .collect(),
            (ObjectKind::Table | ObjectKind::View, Some(schema)) => self
                .object(schema)
                .core
                .children
                .iter()
                .copied()
                .filter(|id| matches!(self.kind(*id), ObjectKind::Table | ObjectKind::View))
                .collect(),
            (ObjectKind::Column | ObjectKind::Index, Some(table)) => {
                self.children_of_kind(table, kind).collect()
            }
            (_, Some(schema)) => {
                let mut members = Vec::new();
                for table in self.children_of_kind(schema, ObjectKind::Table) {
                    members.extend(
                        self.object(table)
                            .core
                            .children
                            .iter()
                            .copied()
                            .filter(|id| self.kind(*id).is_constraint()),
                    );
                }
                members
            }
        }
    }

    /// Snapshot of the comparable state of an object.
    #[must_use]
    pub fn snapshot(&self, id: ObjectId) -> ObjectState {
        let object = self.object(id);
        ObjectState {
            name: object.core.name.clone(),
            parent: object.core.parent,
            removed: object.core.removed,
            data: object.data.clone(),
        }
    }

    /// Live columns of a table in order.
    #[must_use]
    pub fn columns(&self, table: TableId) -> Vec<ColumnId> {
        self.children_of_kind(table.0, ObjectKind::Column)
            .map(ColumnId)
            .collect()
    }

    /// Live indexes of a table in creation order.
    #[must_use]
    pub fn indexes(&self, table: TableId) -> Vec<IndexId> {
        self.children_of_kind(table.0, ObjectKind::Index)
            .map(IndexId)
            .collect()
    }

    /// The table's live primary key.
    #[must_use]
    pub fn primary_key_of(&self, table: TableId) -> Option<PrimaryKeyId> {
        self.children_of_kind(table.0, ObjectKind::PrimaryKey)
            .next()
            .map(PrimaryKeyId)
    }

    typed_access!(schema_data, SchemaId, Schema, SchemaData);
    typed_access!(column_data, column_data_mut, ColumnId, Column, ColumnData);
    typed_access!(index_data, index_data_mut, IndexId, Index, IndexData);
    typed_access!(
        primary_key_data,
        primary_key_data_mut,
        PrimaryKeyId,
        PrimaryKey,
        PrimaryKeyData
    );
    typed_access!(
        foreign_key_data,
        foreign_key_data_mut,
        ForeignKeyId,
        ForeignKey,
        ForeignKeyData
    );
    typed_access!(check_data, check_data_mut, CheckId, Check, CheckData);
    typed_access!(view_data, view_data_mut, ViewId, View, ViewData);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StandardTypes, TypeRegistry, ValueType};

    fn column(types: &StandardTypes) -> ObjectData {
        ObjectData::Column(ColumnData {
            column_type: types.get_by_type(ValueType::Integer),
            nullable: true,
            default: None,
            computation: None,
        })
    }

    #[test]
    fn test_insert_links_children() {
        let types = StandardTypes;
        let mut graph = ObjectGraph::new(7);
        let schema = graph.insert(
            "main".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        let table = graph.insert("users".into(), Some(schema), ObjectData::Table);
        let id = graph.insert("id".into(), Some(table), column(&types));

        assert_eq!(graph.object(schema).core().children(), &[table]);
        assert_eq!(graph.columns(TableId(table)), vec![ColumnId(id)]);
        assert_eq!(graph.schema_of(id), schema);
        assert_eq!(graph.table_of(id), Some(TableId(table)));
        assert!(graph.schema_data(SchemaId(schema)).is_default);
    }

    #[test]
    fn test_find_uses_shared_table_view_namespace() {
        let mut graph = ObjectGraph::new(1);
        let schema = graph.insert(
            "main".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        let table = graph.insert("t".into(), Some(schema), ObjectData::Table);
        assert_eq!(graph.find(Some(schema), ObjectKind::View, "t"), Some(table));
        assert_eq!(graph.find(Some(schema), ObjectKind::Table, "u"), None);
    }

    #[test]
    fn test_get_rejects_foreign_ids() {
        let mut graph = ObjectGraph::new(1);
        let mut other = ObjectGraph::new(2);
        graph.insert(
            "a".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        let foreign = other.insert(
            "b".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        assert!(graph.get(foreign).is_none());
        assert!(!graph.owns(foreign));
    }

    #[test]
    #[should_panic(expected = "belongs to another database")]
    fn test_object_panics_on_foreign_ids() {
        let mut graph = ObjectGraph::new(1);
        let mut other = ObjectGraph::new(2);
        graph.insert(
            "a".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        let foreign = other.insert(
            "b".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        let _ = graph.object(foreign);
    }

    #[test]
    #[should_panic(expected = "belongs to another database")]
    fn test_typed_access_panics_on_foreign_ids() {
        let types = StandardTypes;
        let mut graph = ObjectGraph::new(1);
        let mut other = ObjectGraph::new(2);
        let schema = graph.insert(
            "main".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        let table = graph.insert("t".into(), Some(schema), ObjectData::Table);
        graph.insert("a".into(), Some(table), column(&types));
        let foreign = other.insert("a".into(), None, column(&types));
        let _ = graph.column_data(ColumnId(foreign));
    }
}
