//! Reference tracking.
//!
//! Edges are stored on both endpoints and tagged with the property of the
//! dependent object that created them, so re-assigning one property (say a
//! partial index filter) replaces only the edges that property owns.

use std::collections::HashSet;

use tracing::trace;

use crate::graph::{
    ColumnId, ForeignKeyId, IndexId, ObjectData, ObjectGraph, ObjectId, Reference, ReferenceSource,
};

impl ObjectGraph {
    /// Records that `from` depends on `to` through `source`.
    pub(crate) fn link(&mut self, from: ObjectId, to: ObjectId, source: ReferenceSource) {
        let forward = Reference { object: to, source };
        let backward = Reference {
            object: from,
            source,
        };
        if self.object(from).core.referenced.contains(&forward) {
            return;
        }
        trace!(%from, %to, ?source, "link");
        self.object_mut(from).core.referenced.push(forward);
        self.object_mut(to).core.referencing.push(backward);
    }

    /// Drops every edge `from` holds through `source`.
    pub(crate) fn unlink_source(&mut self, from: ObjectId, source: ReferenceSource) {
        let targets: Vec<ObjectId> = self
            .object(from)
            .core
            .referenced
            .iter()
            .filter(|r| r.source == source)
            .map(|r| r.object)
            .collect();
        self.object_mut(from)
            .core
            .referenced
            .retain(|r| r.source != source);
        for target in targets {
            self.object_mut(target)
                .core
                .referencing
                .retain(|r| !(r.object == from && r.source == source));
        }
    }

    /// Replaces the edges `from` holds through `source` with edges to
    /// `targets`.
    pub(crate) fn relink(
        &mut self,
        from: ObjectId,
        source: ReferenceSource,
        targets: impl IntoIterator<Item = ObjectId>,
    ) {
        self.unlink_source(from, source);
        for target in targets {
            self.link(from, target, source);
        }
    }

    /// Clears every edge of `id`, in both directions.
    pub(crate) fn unlink_all(&mut self, id: ObjectId) {
        let referenced = std::mem::take(&mut self.object_mut(id).core.referenced);
        for edge in referenced {
            self.object_mut(edge.object)
                .core
                .referencing
                .retain(|r| r.object != id);
        }
        let referencing = std::mem::take(&mut self.object_mut(id).core.referencing);
        for edge in referencing {
            self.object_mut(edge.object)
                .core
                .referenced
                .retain(|r| r.object != id);
        }
    }

    /// Live objects depending on `id`.
    #[must_use]
    pub fn dependents(&self, id: ObjectId) -> Vec<Reference> {
        self.object(id)
            .core
            .referencing
            .iter()
            .copied()
            .filter(|r| self.is_live(r.object))
            .collect()
    }

    /// Objects `id` depends on.
    #[must_use]
    pub fn dependencies(&self, id: ObjectId) -> &[Reference] {
        &self.object(id).core.referenced
    }

    /// Every live object removed together with `root`, children before
    /// their parents and `root` last.
    ///
    /// A primary key and its backing index always go together.
    #[must_use]
    pub fn cascade(&self, root: ObjectId) -> Vec<ObjectId> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.cascade_into(root, &mut visited, &mut order);
        order
    }

    fn cascade_into(
        &self,
        id: ObjectId,
        visited: &mut HashSet<ObjectId>,
        order: &mut Vec<ObjectId>,
    ) {
        if !self.is_live(id) || !visited.insert(id) {
            return;
        }
        for child in &self.object(id).core.children {
            self.cascade_into(*child, visited, order);
        }
        match &self.object(id).data {
            ObjectData::PrimaryKey(pk) => self.cascade_into(pk.index.id(), visited, order),
            ObjectData::Index(index) => {
                if let Some(pk) = index.primary_key {
                    self.cascade_into(pk.id(), visited, order);
                }
            }
            _ => {}
        }
        order.push(id);
    }

    /// Columns paired with `column` by live foreign keys, on either side.
    #[must_use]
    pub fn foreign_key_counterparts(&self, column: ColumnId) -> Vec<ColumnId> {
        let mut found = Vec::new();
        for key in self.dependents(column.id()) {
            if key.source != ReferenceSource::IndexKey {
                continue;
            }
            let index = IndexId(key.object);
            let Some(position) = self
                .index_data(index)
                .keys
                .iter()
                .position(|k| k.column() == Some(column))
            else {
                continue;
            };
            for edge in self.dependents(index.id()) {
                let fk = ForeignKeyId(edge.object);
                let other = match edge.source {
                    ReferenceSource::ForeignKeyOrigin => self.foreign_key_data(fk).referenced,
                    ReferenceSource::ForeignKeyTarget => self.foreign_key_data(fk).origin,
                    _ => continue,
                };
                if let Some(c) = self.index_data(other).keys.get(position).and_then(|k| k.column()) {
                    found.push(c);
                }
            }
        }
        found
    }

    /// Live dependents of any member of `set` that are not themselves in
    /// `set`.
    #[must_use]
    pub fn external_dependents(&self, set: &[ObjectId]) -> Vec<(ObjectId, Reference)> {
        let members: HashSet<ObjectId> = set.iter().copied().collect();
        let mut found = Vec::new();
        for id in set {
            for dependent in self.dependents(*id) {
                if !members.contains(&dependent.object) {
                    found.push((*id, dependent));
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::{
        IndexData, IndexId, IndexKey, ObjectData, ObjectGraph, PrimaryKeyData, PrimaryKeyId,
        ReferenceSource, SchemaData,
    };

    fn graph() -> (ObjectGraph, crate::graph::ObjectId) {
        let mut graph = ObjectGraph::new(1);
        let schema = graph.insert(
            "main".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        (graph, schema)
    }

    #[test]
    fn test_unlink_source_keeps_other_edges() {
        let (mut graph, schema) = graph();
        let a = graph.insert("a".into(), Some(schema), ObjectData::Table);
        let b = graph.insert("b".into(), Some(schema), ObjectData::Table);
        graph.link(a, b, ReferenceSource::IndexKey);
        graph.link(a, b, ReferenceSource::IndexFilter);
        graph.unlink_source(a, ReferenceSource::IndexFilter);

        assert_eq!(graph.dependencies(a).len(), 1);
        assert_eq!(graph.dependents(b).len(), 1);
        assert_eq!(graph.dependents(b)[0].source, ReferenceSource::IndexKey);
    }

    #[test]
    fn test_link_is_deduplicated() {
        let (mut graph, schema) = graph();
        let a = graph.insert("a".into(), Some(schema), ObjectData::Table);
        let b = graph.insert("b".into(), Some(schema), ObjectData::Table);
        graph.link(a, b, ReferenceSource::ViewSource);
        graph.link(a, b, ReferenceSource::ViewSource);
        assert_eq!(graph.dependents(b).len(), 1);
    }

    #[test]
    fn test_unlink_all_clears_both_directions() {
        let (mut graph, schema) = graph();
        let a = graph.insert("a".into(), Some(schema), ObjectData::Table);
        let b = graph.insert("b".into(), Some(schema), ObjectData::Table);
        let c = graph.insert("c".into(), Some(schema), ObjectData::Table);
        graph.link(a, b, ReferenceSource::ViewSource);
        graph.link(c, a, ReferenceSource::ViewSource);
        graph.unlink_all(a);
        assert!(graph.dependents(b).is_empty());
        assert!(graph.dependencies(c).is_empty());
    }

    #[test]
    fn test_cascade_couples_primary_key_and_index() {
        let (mut graph, schema) = graph();
        let table = graph.insert("t".into(), Some(schema), ObjectData::Table);
        let index = graph.insert(
            "UIX_T".into(),
            Some(table),
            ObjectData::Index(IndexData {
                keys: Vec::<IndexKey>::new(),
                unique: true,
                is_virtual: false,
                filter: None,
                primary_key: None,
            }),
        );
        let pk = graph.insert(
            "PK_T".into(),
            Some(table),
            ObjectData::PrimaryKey(PrimaryKeyData {
                index: IndexId(index),
            }),
        );
        graph.index_data_mut(IndexId(index)).primary_key = Some(PrimaryKeyId(pk));

        assert_eq!(graph.cascade(pk), vec![index, pk]);
        assert_eq!(graph.cascade(index), vec![pk, index]);
        assert_eq!(graph.cascade(table), vec![pk, index, table]);
    }
}
