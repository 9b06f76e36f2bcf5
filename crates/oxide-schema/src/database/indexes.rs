//! Indexes and primary keys.

use std::collections::BTreeSet;

use tracing::debug;

use super::{column_targets, Database};
use crate::changes::MutationContext;
use crate::error::Result;
use crate::expr::Expr;
use crate::graph::{
    ColumnId, IndexData, IndexId, IndexKey, IndexTarget, ObjectData, ObjectId, ObjectKind,
    PrimaryKeyData, PrimaryKeyId, ReferenceSource, SortOrder, TableId,
};
use crate::naming::{self, KeyLabel};
use crate::validate::{RuleCode, Rules};

/// Description of an index to create.
///
/// ```
/// use oxide_schema::{Database, IndexSpec, ValueType};
///
/// let mut db = Database::new();
/// let t = db.create_table(db.default_schema(), "orders").unwrap();
/// let customer = db.create_column_of(t, "customer", ValueType::Integer).unwrap();
/// let placed = db.create_column_of(t, "placed", ValueType::Timestamp).unwrap();
///
/// let index = db
///     .create_index(t, IndexSpec::new().on(customer).on_desc(placed))
///     .unwrap();
/// assert_eq!(db.name(index), "IX_orders_customerA_placedD");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexSpec {
    name: Option<String>,
    keys: Vec<IndexKey>,
    unique: bool,
    is_virtual: bool,
    filter: Option<Expr>,
}

impl IndexSpec {
    /// An empty, non-unique index named by default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an ascending column key.
    #[must_use]
    pub fn on(mut self, column: ColumnId) -> Self {
        self.keys.push(IndexKey::asc(column));
        self
    }

    /// Adds a descending column key.
    #[must_use]
    pub fn on_desc(mut self, column: ColumnId) -> Self {
        self.keys.push(IndexKey::desc(column));
        self
    }

    /// Adds an expression key.
    #[must_use]
    pub fn on_expression(mut self, expr: Expr, order: SortOrder) -> Self {
        self.keys.push(IndexKey::expression(expr, order));
        self
    }

    /// Adds a key.
    #[must_use]
    pub fn key(mut self, key: IndexKey) -> Self {
        self.keys.push(key);
        self
    }

    /// Enforces uniqueness.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Keeps the index in metadata only.
    #[must_use]
    pub const fn virtual_only(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    /// Makes the index partial.
    #[must_use]
    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter = Some(condition);
        self
    }

    /// Uses an explicit name instead of the default one.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Columns an index depends on through its keys.
fn key_targets(keys: &[IndexKey]) -> BTreeSet<ObjectId> {
    let mut targets = BTreeSet::new();
    for key in keys {
        match &key.target {
            IndexTarget::Column(column) => {
                targets.insert(column.id());
            }
            IndexTarget::Expression(expr) => {
                targets.extend(expr.referenced_columns().into_iter().map(ColumnId::id));
            }
        }
    }
    targets
}

impl Database {
    /// Default index name for `keys` on `table`.
    pub(super) fn index_default_name(&self, table: TableId, unique: bool, keys: &[IndexKey]) -> String {
        let labels: Vec<(KeyLabel<'_>, SortOrder)> = keys
            .iter()
            .enumerate()
            .map(|(position, key)| {
                let label = match &key.target {
                    IndexTarget::Column(column) => KeyLabel::Column(self.graph.name(column.id())),
                    IndexTarget::Expression(_) => KeyLabel::Expression(position + 1),
                };
                (label, key.order)
            })
            .collect();
        let name = naming::index_name(self.graph.name(table.id()), unique, &labels);
        naming::fit_identifier(&name, self.max_identifier_length())
    }

    fn index_rules(rules: &mut Rules<'_>, table: TableId, spec: &IndexSpec) {
        rules.index_keys(table, &spec.keys);
        rules.index_flags(spec.unique, spec.is_virtual, spec.filter.is_some());
        if let Some(filter) = &spec.filter {
            rules.table_expression(filter, table, "index filter");
        }
    }

    /// Creates an index.
    pub fn create_index(&mut self, table: TableId, spec: IndexSpec) -> Result<IndexId> {
        let mut rules = self.rules();
        let mut name = spec.name.clone();
        if rules.live(table) {
            Self::index_rules(&mut rules, table, &spec);
            if name.is_none() && rules.is_clean() {
                name = Some(self.index_default_name(table, spec.unique, &spec.keys));
            }
            if let Some(name) = &name {
                rules.name(Some(table.id()), ObjectKind::Index, name, None);
            }
        }
        rules.finish()?;

        let name = name.unwrap_or_default();
        let id = self.graph.insert(
            name.clone(),
            Some(table.id()),
            ObjectData::Index(IndexData {
                keys: spec.keys,
                unique: spec.unique,
                is_virtual: spec.is_virtual,
                filter: spec.filter,
                primary_key: None,
            }),
        );
        let index = IndexId(id);
        self.link_index(index);
        let mut ctx = MutationContext::new(id);
        ctx.created(id);
        self.record(ctx);
        debug!(table = self.graph.name(table.id()), index = %name, "created index");
        Ok(index)
    }

    fn link_index(&mut self, index: IndexId) {
        let data = self.graph.index_data(index);
        let keys = key_targets(&data.keys);
        let filter = column_targets(data.filter.as_ref());
        self.graph.relink(index.id(), ReferenceSource::IndexKey, keys);
        self.graph
            .relink(index.id(), ReferenceSource::IndexFilter, filter);
    }

    /// Index by name.
    pub fn index(&self, table: TableId, name: &str) -> Result<IndexId> {
        self.require(Some(table.id()), name)
    }

    /// Index by name, if there is one.
    #[must_use]
    pub fn try_index(&self, table: TableId, name: &str) -> Option<IndexId> {
        self.lookup(Some(table.id()), name).ok().flatten()
    }

    /// Whether `table` has a live index called `name`.
    #[must_use]
    pub fn contains_index(&self, table: TableId, name: &str) -> bool {
        self.try_index(table, name).is_some()
    }

    /// Returns the index named by `spec`, explicitly or by default,
    /// creating it if needed.
    pub fn get_or_create_index(&mut self, table: TableId, spec: IndexSpec) -> Result<IndexId> {
        if self.graph.is_live(table.id()) {
            let name = match &spec.name {
                Some(name) => Some(name.clone()),
                None => {
                    let mut rules = self.rules();
                    rules.index_keys(table, &spec.keys);
                    rules
                        .is_clean()
                        .then(|| self.index_default_name(table, spec.unique, &spec.keys))
                }
            };
            if let Some(name) = name {
                if let Some(index) = self.lookup(Some(table.id()), &name)? {
                    return Ok(index);
                }
            }
        }
        self.create_index(table, spec)
    }

    /// Live indexes of a table in creation order.
    #[must_use]
    pub fn indexes(&self, table: TableId) -> Vec<IndexId> {
        if !self.graph.is_live(table.id()) {
            return Vec::new();
        }
        self.graph.indexes(table)
    }

    /// Removes an index. Removing the index of a primary key removes the
    /// primary key too.
    pub fn remove_index(&mut self, index: IndexId) -> Result<()> {
        self.remove(index)
    }

    /// Turns uniqueness on or off.
    pub fn set_unique(&mut self, index: IndexId, unique: bool) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(index) {
            let graph = rules.graph;
            let data = graph.index_data(index);
            if !unique {
                rules.index_not_key(index, "lose uniqueness");
            }
            rules.index_flags(unique, data.is_virtual, data.filter.is_some());
        }
        rules.finish()?;

        self.update_index(index, |data| data.unique = unique);
        Ok(())
    }

    /// Moves an index between metadata-only and physical.
    pub fn set_virtual(&mut self, index: IndexId, is_virtual: bool) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(index) {
            let graph = rules.graph;
            let data = graph.index_data(index);
            if is_virtual {
                rules.index_not_key(index, "become virtual");
            }
            rules.index_flags(data.unique, is_virtual, data.filter.is_some());
        }
        rules.finish()?;

        self.update_index(index, |data| data.is_virtual = is_virtual);
        Ok(())
    }

    /// Sets or clears the partial index condition.
    pub fn set_filter(&mut self, index: IndexId, filter: Option<Expr>) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(index) {
            let graph = rules.graph;
            let data = graph.index_data(index);
            if let Some(condition) = &filter {
                rules.index_not_key(index, "become partial");
                if let Some(table) = graph.table_of(index.id()) {
                    rules.table_expression(condition, table, "index filter");
                }
            }
            rules.index_flags(data.unique, data.is_virtual, filter.is_some());
        }
        rules.finish()?;

        let targets = column_targets(filter.as_ref());
        self.update_index(index, |data| data.filter = filter);
        self.graph
            .relink(index.id(), ReferenceSource::IndexFilter, targets);
        Ok(())
    }

    /// Replaces the keys of an index. Keys of an index used by a foreign
    /// key are fixed.
    pub fn set_index_keys(&mut self, index: IndexId, keys: Vec<IndexKey>) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(index) {
            let graph = rules.graph;
            if let Some(table) = graph.table_of(index.id()) {
                rules.index_keys(table, &keys);
            }
            if rules.backs_primary_key(index) {
                rules.key_columns_not_null(&keys, RuleCode::PrimaryKeyNullableColumn, "primary key");
            }
            for dependent in graph.dependents(index.id()) {
                if matches!(
                    dependent.source,
                    ReferenceSource::ForeignKeyOrigin | ReferenceSource::ForeignKeyTarget
                ) {
                    rules.fail(
                        RuleCode::ReferenceDependentExists,
                        format!(
                            "keys of index '{}' are used by foreign key '{}'",
                            graph.name(index.id()),
                            graph.name(dependent.object)
                        ),
                    );
                }
            }
        }
        rules.finish()?;

        let targets = key_targets(&keys);
        self.update_index(index, |data| data.keys = keys);
        self.graph
            .relink(index.id(), ReferenceSource::IndexKey, targets);
        Ok(())
    }

    fn update_index(&mut self, index: IndexId, change: impl FnOnce(&mut IndexData)) {
        let mut ctx = MutationContext::new(index);
        ctx.touch(&self.graph, index);
        change(self.graph.index_data_mut(index));
        self.record(ctx);
        debug!(index = self.graph.name(index.id()), "updated index");
    }

    /// Creates a primary key over `columns`, backed by a new unique index.
    pub fn create_primary_key(&mut self, table: TableId, columns: &[ColumnId]) -> Result<PrimaryKeyId> {
        let keys: Vec<IndexKey> = columns.iter().copied().map(IndexKey::asc).collect();
        let mut rules = self.rules();
        let mut names = None;
        if rules.live(table) {
            if rules.graph.primary_key_of(table).is_some() {
                let message = format!("table '{}' already has a primary key", self.graph.name(table.id()));
                rules.fail(RuleCode::PrimaryKeyExists, message);
            }
            rules.index_keys(table, &keys);
            rules.key_columns_not_null(&keys, RuleCode::PrimaryKeyNullableColumn, "primary key");
            if rules.is_clean() {
                let index_name = self.index_default_name(table, true, &keys);
                let key_name = self.primary_key_default_name(table);
                rules.name(Some(table.id()), ObjectKind::Index, &index_name, None);
                rules.name(
                    self.name_scope(ObjectKind::PrimaryKey, Some(table.id())),
                    ObjectKind::PrimaryKey,
                    &key_name,
                    None,
                );
                names = Some((index_name, key_name));
            }
        }
        rules.finish()?;

        let (index_name, key_name) = names.unwrap_or_default();
        let index = IndexId(self.graph.insert(
            index_name,
            Some(table.id()),
            ObjectData::Index(IndexData {
                keys,
                unique: true,
                is_virtual: false,
                filter: None,
                primary_key: None,
            }),
        ));
        let key = PrimaryKeyId(self.graph.insert(
            key_name,
            Some(table.id()),
            ObjectData::PrimaryKey(PrimaryKeyData { index }),
        ));
        self.graph.index_data_mut(index).primary_key = Some(key);
        self.link_index(index);
        self.graph
            .link(key.id(), index.id(), ReferenceSource::PrimaryKeyIndex);

        let mut ctx = MutationContext::new(key);
        ctx.created(index);
        ctx.created(key);
        self.record(ctx);
        debug!(table = self.graph.name(table.id()), "created primary key");
        Ok(key)
    }

    pub(super) fn primary_key_default_name(&self, table: TableId) -> String {
        naming::fit_identifier(
            &naming::primary_key_name(self.graph.name(table.id())),
            self.max_identifier_length(),
        )
    }

    /// Creates a primary key backed by an existing unique index.
    pub fn create_primary_key_on(&mut self, index: IndexId) -> Result<PrimaryKeyId> {
        let mut rules = self.rules();
        let mut table = None;
        if rules.live(index) {
            let graph = rules.graph;
            if let Some(owner) = graph.table_of(index.id()) {
                if graph.primary_key_of(owner).is_some() {
                    rules.fail(
                        RuleCode::PrimaryKeyExists,
                        format!("table '{}' already has a primary key", graph.name(owner.id())),
                    );
                }
                rules.primary_key_index(owner, index);
                let name = self.primary_key_default_name(owner);
                rules.name(
                    self.name_scope(ObjectKind::PrimaryKey, Some(owner.id())),
                    ObjectKind::PrimaryKey,
                    &name,
                    None,
                );
                table = Some((owner, name));
            }
        }
        rules.finish()?;

        let Some((table, name)) = table else {
            unreachable!("a live index always has a table");
        };
        let key = PrimaryKeyId(self.graph.insert(
            name,
            Some(table.id()),
            ObjectData::PrimaryKey(PrimaryKeyData { index }),
        ));
        let mut ctx = MutationContext::new(key);
        ctx.created(key);
        ctx.touch(&self.graph, index);
        self.graph.index_data_mut(index).primary_key = Some(key);
        self.graph
            .link(key.id(), index.id(), ReferenceSource::PrimaryKeyIndex);
        self.record(ctx);
        debug!(table = self.graph.name(table.id()), "created primary key on index");
        Ok(key)
    }

    /// The table's primary key.
    #[must_use]
    pub fn primary_key(&self, table: TableId) -> Option<PrimaryKeyId> {
        if !self.graph.is_live(table.id()) {
            return None;
        }
        self.graph.primary_key_of(table)
    }

    /// Removes a primary key together with its backing index.
    pub fn remove_primary_key(&mut self, key: PrimaryKeyId) -> Result<()> {
        self.remove(key)
    }

    /// Moves a primary key onto another unique index of the same table. The
    /// previous index stays as an ordinary unique index.
    pub fn set_primary_key_index(&mut self, key: PrimaryKeyId, index: IndexId) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(key) && rules.live(index) {
            let graph = rules.graph;
            if graph.primary_key_data(key).index == index {
                return Ok(());
            }
            if let Some(table) = graph.table_of(key.id()) {
                rules.primary_key_index(table, index);
            }
        }
        rules.finish()?;

        let previous = self.graph.primary_key_data(key).index;
        let mut ctx = MutationContext::new(key);
        ctx.touch(&self.graph, key);
        ctx.touch(&self.graph, previous);
        ctx.touch(&self.graph, index);
        self.graph.index_data_mut(previous).primary_key = None;
        self.graph.index_data_mut(index).primary_key = Some(key);
        self.graph.primary_key_data_mut(key).index = index;
        self.graph
            .relink(key.id(), ReferenceSource::PrimaryKeyIndex, [index.id()]);
        self.record(ctx);
        debug!(
            key = self.graph.name(key.id()),
            index = self.graph.name(index.id()),
            "moved primary key"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::IndexSpec;
    use crate::expr::{col, Expr};
    use crate::graph::SortOrder;
    use crate::types::ValueType;
    use crate::validate::RuleCode;
    use crate::Database;

    fn table() -> (Database, crate::TableId, crate::ColumnId, crate::ColumnId) {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "T").unwrap();
        let c = db.create_column_of(t, "C", ValueType::Integer).unwrap();
        let d = db.create_column_of(t, "D", ValueType::Integer).unwrap();
        db.set_nullable(c, false).unwrap();
        (db, t, c, d)
    }

    #[test]
    fn test_primary_key_default_names() {
        let (mut db, t, c, _) = table();
        let pk = db.create_primary_key(t, &[c]).unwrap();
        let index = db.graph().primary_key_data(pk).index;
        assert_eq!(db.name(pk), "PK_T");
        assert_eq!(db.name(index), "UIX_T_CA");
        assert_eq!(db.primary_key(t), Some(pk));
    }

    #[test]
    fn test_primary_key_rejects_nullable_and_duplicate() {
        let (mut db, t, c, d) = table();
        let err = db.create_primary_key(t, &[d]).unwrap_err();
        assert!(err.violates(RuleCode::PrimaryKeyNullableColumn));

        db.create_primary_key(t, &[c]).unwrap();
        let err = db.create_primary_key(t, &[c]).unwrap_err();
        assert!(err.violates(RuleCode::PrimaryKeyExists));
    }

    #[test]
    fn test_key_column_cannot_become_nullable() {
        let (mut db, t, c, _) = table();
        db.create_primary_key(t, &[c]).unwrap();
        let err = db.set_nullable(c, true).unwrap_err();
        assert!(err.violates(RuleCode::ColumnNullableKey));
    }

    #[test]
    fn test_expression_key_names() {
        let (mut db, t, c, d) = table();
        let index = db
            .create_index(
                t,
                IndexSpec::new()
                    .on(c)
                    .on_expression(col(d).plus(Expr::integer(1)), SortOrder::Descending),
            )
            .unwrap();
        assert_eq!(db.name(index), "IX_T_CA_EXPR2D");
    }

    #[test]
    fn test_virtual_index_flags() {
        let (mut db, t, c, _) = table();
        let err = db
            .create_index(t, IndexSpec::new().on(c).unique().virtual_only())
            .unwrap_err();
        assert!(err.violates(RuleCode::IndexVirtualUnique));

        let index = db
            .create_index(t, IndexSpec::new().on(c).virtual_only())
            .unwrap();
        let err = db
            .set_filter(index, Some(col(c).gt(Expr::integer(0))))
            .unwrap_err();
        assert!(err.violates(RuleCode::IndexVirtualPartial));
    }

    #[test]
    fn test_index_backing_primary_key_keeps_uniqueness() {
        let (mut db, t, c, _) = table();
        let pk = db.create_primary_key(t, &[c]).unwrap();
        let index = db.graph().primary_key_data(pk).index;
        let err = db.set_unique(index, false).unwrap_err();
        assert!(err.violates(RuleCode::IndexPrimaryKey));
        let err = db.set_filter(index, Some(col(c).gt(Expr::integer(0)))).unwrap_err();
        assert!(err.violates(RuleCode::IndexPrimaryKey));
    }

    #[test]
    fn test_move_primary_key_to_other_index() {
        let (mut db, t, c, d) = table();
        db.set_nullable(d, false).unwrap();
        let pk = db.create_primary_key(t, &[c]).unwrap();
        let old = db.graph().primary_key_data(pk).index;
        let other = db
            .create_index(t, IndexSpec::new().on(c).on(d).unique())
            .unwrap();

        db.set_primary_key_index(pk, other).unwrap();
        assert_eq!(db.graph().index_data(old).primary_key, None);
        assert_eq!(db.graph().index_data(other).primary_key, Some(pk));
        assert!(db.graph().index_data(old).unique);
    }

    #[test]
    fn test_get_or_create_index_finds_default_name() {
        let (mut db, t, c, _) = table();
        let a = db.get_or_create_index(t, IndexSpec::new().on(c)).unwrap();
        let b = db.get_or_create_index(t, IndexSpec::new().on(c)).unwrap();
        assert_eq!(a, b);
        assert_eq!(db.indexes(t), vec![a]);
    }
}
