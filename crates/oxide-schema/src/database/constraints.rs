//! Foreign keys and check constraints.

use tracing::debug;

use super::{column_targets, Database};
use crate::changes::MutationContext;
use crate::error::Result;
use crate::expr::Expr;
use crate::graph::{
    CheckData, CheckId, ColumnId, ForeignKeyData, ForeignKeyId, IndexData, IndexId, IndexKey,
    ObjectData, ObjectKind, ReferenceSource, ReferentialAction, SchemaId, TableId,
};
use crate::naming;
use crate::validate::RuleCode;

/// Description of a foreign key between two existing indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    origin: IndexId,
    referenced: IndexId,
    on_delete: ReferentialAction,
    on_update: ReferentialAction,
    name: Option<String>,
}

impl ForeignKeySpec {
    /// A foreign key from the `origin` index columns to the unique
    /// `referenced` index.
    #[must_use]
    pub fn new(origin: IndexId, referenced: IndexId) -> Self {
        Self {
            origin,
            referenced,
            on_delete: ReferentialAction::default(),
            on_update: ReferentialAction::default(),
            name: None,
        }
    }

    /// Action when a referenced row is deleted.
    #[must_use]
    pub const fn on_delete(mut self, action: ReferentialAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Action when a referenced key is updated.
    #[must_use]
    pub const fn on_update(mut self, action: ReferentialAction) -> Self {
        self.on_update = action;
        self
    }

    /// Uses an explicit name instead of the default one.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl Database {
    /// Default foreign key name for an origin index and a referenced one.
    pub(super) fn foreign_key_default_name(&self, origin: IndexId, referenced: IndexId) -> String {
        let graph = &self.graph;
        let columns: Vec<&str> = graph
            .index_data(origin)
            .keys
            .iter()
            .filter_map(IndexKey::column)
            .map(|c| graph.name(c.id()))
            .collect();
        let table = graph
            .table_of(origin.id())
            .unwrap_or(TableId(origin.id()));
        self.foreign_key_name_for(table, &columns, referenced)
    }

    fn foreign_key_name_for(&self, table: TableId, columns: &[&str], referenced: IndexId) -> String {
        let graph = &self.graph;
        let target = graph.parent(referenced.id()).unwrap_or(referenced.id());
        let target_schema = graph.schema_of(target);
        let schema =
            (target_schema != graph.schema_of(table.id())).then(|| graph.name(target_schema));
        let name = naming::foreign_key_name(graph.name(table.id()), columns, schema, graph.name(target));
        naming::fit_identifier(&name, self.max_identifier_length())
    }

    /// Creates a foreign key between two existing indexes.
    pub fn create_foreign_key(&mut self, table: TableId, spec: ForeignKeySpec) -> Result<ForeignKeyId> {
        let mut rules = self.rules();
        let mut name = spec.name.clone();
        if rules.live(table) && rules.owned_by(spec.origin, table) {
            rules.foreign_key_pair(spec.origin, spec.referenced);
            if name.is_none() && rules.is_clean() {
                name = Some(self.foreign_key_default_name(spec.origin, spec.referenced));
            }
            if let Some(name) = &name {
                rules.name(
                    self.name_scope(ObjectKind::ForeignKey, Some(table.id())),
                    ObjectKind::ForeignKey,
                    name,
                    None,
                );
            }
        }
        rules.finish()?;

        let name = name.unwrap_or_default();
        let key = ForeignKeyId(self.graph.insert(
            name.clone(),
            Some(table.id()),
            ObjectData::ForeignKey(ForeignKeyData {
                origin: spec.origin,
                referenced: spec.referenced,
                on_delete: spec.on_delete,
                on_update: spec.on_update,
            }),
        ));
        self.link_foreign_key(key);
        let mut ctx = MutationContext::new(key);
        ctx.created(key);
        self.record(ctx);
        debug!(table = self.graph.name(table.id()), key = %name, "created foreign key");
        Ok(key)
    }

    fn link_foreign_key(&mut self, key: ForeignKeyId) {
        let data = self.graph.foreign_key_data(key);
        let (origin, referenced) = (data.origin.id(), data.referenced.id());
        self.graph
            .link(key.id(), origin, ReferenceSource::ForeignKeyOrigin);
        self.graph
            .link(key.id(), referenced, ReferenceSource::ForeignKeyTarget);
    }

    /// Creates a foreign key from `columns` to the primary key of `target`.
    ///
    /// The origin columns get a metadata-only index, so the key does not
    /// cost a physical index on the referencing table.
    pub fn create_foreign_key_to(
        &mut self,
        table: TableId,
        columns: &[ColumnId],
        target: TableId,
    ) -> Result<ForeignKeyId> {
        let keys: Vec<IndexKey> = columns.iter().copied().map(IndexKey::asc).collect();
        let mut rules = self.rules();
        let mut names = None;
        let table_live = rules.live(table);
        let target_live = rules.live(target);
        if table_live && target_live {
            let graph = rules.graph;
            rules.index_keys(table, &keys);
            match graph.primary_key_of(target) {
                None => rules.fail(
                    RuleCode::ForeignKeyTargetNotUnique,
                    format!("table '{}' has no primary key", graph.name(target.id())),
                ),
                Some(pk) if rules.is_clean() => {
                    let referenced = graph.primary_key_data(pk).index;
                    rules.foreign_key_target(Some(columns.to_vec()), referenced);
                    if rules.is_clean() {
                        let index_name = self.index_default_name(table, false, &keys);
                        let column_names: Vec<&str> =
                            columns.iter().map(|c| graph.name(c.id())).collect();
                        let key_name =
                            self.foreign_key_name_for(table, &column_names, referenced);
                        rules.name(Some(table.id()), ObjectKind::Index, &index_name, None);
                        rules.name(
                            self.name_scope(ObjectKind::ForeignKey, Some(table.id())),
                            ObjectKind::ForeignKey,
                            &key_name,
                            None,
                        );
                        names = Some((index_name, key_name, referenced));
                    }
                }
                Some(_) => {}
            }
        }
        rules.finish()?;

        let Some((index_name, key_name, referenced)) = names else {
            let message = format!("table '{}' has no primary key", self.graph.name(target.id()));
            return Err(self.not_found(message));
        };
        let origin = IndexId(self.graph.insert(
            index_name,
            Some(table.id()),
            ObjectData::Index(IndexData {
                keys,
                unique: false,
                is_virtual: true,
                filter: None,
                primary_key: None,
            }),
        ));
        for column in columns {
            self.graph
                .link(origin.id(), column.id(), ReferenceSource::IndexKey);
        }
        let key = ForeignKeyId(self.graph.insert(
            key_name,
            Some(table.id()),
            ObjectData::ForeignKey(ForeignKeyData {
                origin,
                referenced,
                on_delete: ReferentialAction::default(),
                on_update: ReferentialAction::default(),
            }),
        ));
        self.link_foreign_key(key);
        let mut ctx = MutationContext::new(key);
        ctx.created(origin);
        ctx.created(key);
        self.record(ctx);
        debug!(
            table = self.graph.name(table.id()),
            target = self.graph.name(target.id()),
            "created foreign key to primary key"
        );
        Ok(key)
    }

    /// Foreign key by name.
    pub fn foreign_key(&self, table: TableId, name: &str) -> Result<ForeignKeyId> {
        self.require(Some(table.id()), name)
    }

    /// Foreign key by name, if there is one.
    #[must_use]
    pub fn try_foreign_key(&self, table: TableId, name: &str) -> Option<ForeignKeyId> {
        self.lookup(Some(table.id()), name).ok().flatten()
    }

    /// Live foreign keys of a table in creation order.
    #[must_use]
    pub fn foreign_keys(&self, table: TableId) -> Vec<ForeignKeyId> {
        if !self.graph.is_live(table.id()) {
            return Vec::new();
        }
        self.graph
            .children_of_kind(table.id(), ObjectKind::ForeignKey)
            .map(ForeignKeyId)
            .collect()
    }

    /// Removes a foreign key. Its indexes stay.
    pub fn remove_foreign_key(&mut self, key: ForeignKeyId) -> Result<()> {
        self.remove(key)
    }

    /// Sets the action on delete of a referenced row.
    pub fn set_on_delete(&mut self, key: ForeignKeyId, action: ReferentialAction) -> Result<()> {
        self.update_foreign_key(key, |data| data.on_delete = action)
    }

    /// Sets the action on update of a referenced key.
    pub fn set_on_update(&mut self, key: ForeignKeyId, action: ReferentialAction) -> Result<()> {
        self.update_foreign_key(key, |data| data.on_update = action)
    }

    fn update_foreign_key(
        &mut self,
        key: ForeignKeyId,
        change: impl FnOnce(&mut ForeignKeyData),
    ) -> Result<()> {
        let mut rules = self.rules();
        rules.live(key);
        rules.finish()?;

        let mut ctx = MutationContext::new(key);
        ctx.touch(&self.graph, key);
        change(self.graph.foreign_key_data_mut(key));
        self.record(ctx);
        Ok(())
    }

    /// Creates a check named `CHK_<table>_<n>` after the table's check
    /// counter.
    pub fn create_check(&mut self, table: TableId, condition: Expr) -> Result<CheckId> {
        let mut rules = self.rules();
        let mut name = None;
        if rules.live(table) {
            rules.table_expression(&condition, table, "check condition");
            let ordinal = rules.graph.object(table.id()).core().check_counter + 1;
            let candidate = naming::fit_identifier(
                &naming::ordinal_check_name(self.graph.name(table.id()), ordinal),
                self.max_identifier_length(),
            );
            rules.name(
                self.name_scope(ObjectKind::Check, Some(table.id())),
                ObjectKind::Check,
                &candidate,
                None,
            );
            name = Some((candidate, ordinal));
        }
        rules.finish()?;

        let (name, ordinal) = name.unwrap_or_default();
        self.graph.object_mut(table.id()).core.check_counter = ordinal;
        self.insert_check(table, name, condition, Some(ordinal))
    }

    /// Creates a check named after the digest of its condition, so the same
    /// condition always gets the same name.
    pub fn add_check_constraint(&mut self, table: TableId, condition: Expr) -> Result<CheckId> {
        let mut rules = self.rules();
        let mut name = None;
        if rules.live(table) {
            rules.table_expression(&condition, table, "check condition");
            if rules.is_clean() {
                let candidate = self.digest_check_name(table, &condition);
                rules.name(
                    self.name_scope(ObjectKind::Check, Some(table.id())),
                    ObjectKind::Check,
                    &candidate,
                    None,
                );
                name = Some(candidate);
            }
        }
        rules.finish()?;

        self.insert_check(table, name.unwrap_or_default(), condition, None)
    }

    pub(super) fn digest_check_name(&self, table: TableId, condition: &Expr) -> String {
        let name = naming::digest_check_name(self.graph.name(table.id()), &self.expr_text(condition));
        naming::fit_identifier(&name, self.max_identifier_length())
    }

    fn insert_check(
        &mut self,
        table: TableId,
        name: String,
        condition: Expr,
        ordinal: Option<u32>,
    ) -> Result<CheckId> {
        let targets = column_targets(Some(&condition));
        let check = CheckId(self.graph.insert(
            name.clone(),
            Some(table.id()),
            ObjectData::Check(CheckData { condition, ordinal }),
        ));
        self.graph
            .relink(check.id(), ReferenceSource::CheckCondition, targets);
        let mut ctx = MutationContext::new(check);
        ctx.created(check);
        self.record(ctx);
        debug!(table = self.graph.name(table.id()), check = %name, "created check");
        Ok(check)
    }

    /// Check by name.
    pub fn check(&self, table: TableId, name: &str) -> Result<CheckId> {
        self.require(Some(table.id()), name)
    }

    /// Check by name, if there is one.
    #[must_use]
    pub fn try_check(&self, table: TableId, name: &str) -> Option<CheckId> {
        self.lookup(Some(table.id()), name).ok().flatten()
    }

    /// Returns the table's check with exactly this condition, creating one
    /// with an ordinal name if there is none.
    pub fn get_or_create_check(&mut self, table: TableId, condition: Expr) -> Result<CheckId> {
        let existing = self.checks(table).into_iter().find(|check| {
            self.graph.check_data(*check).condition == condition
        });
        match existing {
            Some(check) => Ok(check),
            None => self.create_check(table, condition),
        }
    }

    /// Live checks of a table in creation order.
    #[must_use]
    pub fn checks(&self, table: TableId) -> Vec<CheckId> {
        if !self.graph.is_live(table.id()) {
            return Vec::new();
        }
        self.graph
            .children_of_kind(table.id(), ObjectKind::Check)
            .map(CheckId)
            .collect()
    }

    /// Replaces the condition of a check. The name stays until reset.
    pub fn set_check_condition(&mut self, check: CheckId, condition: Expr) -> Result<()> {
        let mut rules = self.rules();
        if rules.live(check) {
            if let Some(table) = rules.graph.table_of(check.id()) {
                rules.table_expression(&condition, table, "check condition");
            }
        }
        rules.finish()?;

        let targets = column_targets(Some(&condition));
        let mut ctx = MutationContext::new(check);
        ctx.touch(&self.graph, check);
        self.graph.check_data_mut(check).condition = condition;
        self.graph
            .relink(check.id(), ReferenceSource::CheckCondition, targets);
        self.record(ctx);
        Ok(())
    }

    /// Removes a check.
    pub fn remove_check(&mut self, check: CheckId) -> Result<()> {
        self.remove(check)
    }

    /// Whether any live constraint of `schema` is called `name`. Constraint
    /// kinds share one namespace per schema.
    #[must_use]
    pub fn contains_constraint(&self, schema: SchemaId, name: &str) -> bool {
        if !self.graph.is_live(schema.id()) {
            return false;
        }
        self.graph
            .find(Some(schema.id()), ObjectKind::Check, name)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::ForeignKeySpec;
    use crate::expr::{col, Expr};
    use crate::graph::ReferentialAction;
    use crate::types::{ColumnType, ValueType};
    use crate::validate::RuleCode;
    use crate::{Database, IndexSpec, TableId};

    fn customers(db: &mut Database) -> TableId {
        let t = db.create_table(db.default_schema(), "customers").unwrap();
        let id = db.create_column_of(t, "id", ValueType::Integer).unwrap();
        db.set_nullable(id, false).unwrap();
        db.create_primary_key(t, &[id]).unwrap();
        t
    }

    #[test]
    fn test_foreign_key_to_primary_key() {
        let mut db = Database::new();
        let customers = customers(&mut db);
        let orders = db.create_table(db.default_schema(), "orders").unwrap();
        let customer = db
            .create_column_of(orders, "customer", ValueType::Integer)
            .unwrap();

        let fk = db.create_foreign_key_to(orders, &[customer], customers).unwrap();
        assert_eq!(db.name(fk), "FK_orders_customer_REF_customers");
        let origin = db.graph().foreign_key_data(fk).origin;
        assert!(db.graph().index_data(origin).is_virtual);

        db.set_on_delete(fk, ReferentialAction::Cascade).unwrap();
        assert_eq!(
            db.graph().foreign_key_data(fk).on_delete,
            ReferentialAction::Cascade
        );
    }

    #[test]
    fn test_foreign_key_names_other_schema() {
        let mut db = Database::new();
        let customers = customers(&mut db);
        let sales = db.create_schema("sales").unwrap();
        let orders = db.create_table(sales, "orders").unwrap();
        let customer = db
            .create_column_of(orders, "customer", ValueType::Integer)
            .unwrap();
        let fk = db.create_foreign_key_to(orders, &[customer], customers).unwrap();
        assert_eq!(db.name(fk), "FK_orders_customer_REF_main_customers");
    }

    #[test]
    fn test_foreign_key_rejects_incompatible_types() {
        let mut db = Database::new();
        let customers = customers(&mut db);
        let orders = db.create_table(db.default_schema(), "orders").unwrap();
        let customer = db
            .create_column(orders, "customer", ColumnType::new(ValueType::Text, "TEXT"))
            .unwrap();
        let err = db
            .create_foreign_key_to(orders, &[customer], customers)
            .unwrap_err();
        assert!(err.violates(RuleCode::ForeignKeyColumnType));
    }

    #[test]
    fn test_foreign_key_target_must_be_unique() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let a = db.create_column_of(t, "a", ValueType::Integer).unwrap();
        let b = db.create_column_of(t, "b", ValueType::Integer).unwrap();
        let ia = db.create_index(t, IndexSpec::new().on(a)).unwrap();
        let ib = db.create_index(t, IndexSpec::new().on(b)).unwrap();

        let err = db
            .create_foreign_key(t, ForeignKeySpec::new(ia, ib))
            .unwrap_err();
        assert!(err.violates(RuleCode::ForeignKeyTargetNotUnique));
        assert!(err.violates(RuleCode::ForeignKeyTargetNullable));
    }

    #[test]
    fn test_retype_vetoed_by_foreign_key() {
        let mut db = Database::new();
        let customers = customers(&mut db);
        let orders = db.create_table(db.default_schema(), "orders").unwrap();
        let customer = db
            .create_column_of(orders, "customer", ValueType::Integer)
            .unwrap();
        db.create_foreign_key_to(orders, &[customer], customers).unwrap();

        let err = db
            .set_column_type(customer, ColumnType::new(ValueType::Text, "TEXT"))
            .unwrap_err();
        assert!(err.violates(RuleCode::ColumnTypeIncompatible));
    }

    #[test]
    fn test_check_names() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let a = db.create_column_of(t, "a", ValueType::Integer).unwrap();

        let first = db.create_check(t, col(a).gt(Expr::integer(0))).unwrap();
        let second = db.create_check(t, col(a).lt(Expr::integer(9))).unwrap();
        assert_eq!(db.name(first), "CHK_t_1");
        assert_eq!(db.name(second), "CHK_t_2");

        let digest = db
            .add_check_constraint(t, col(a).not_eq(Expr::integer(5)))
            .unwrap();
        assert!(db.name(digest).starts_with("CHK_t_"));
        assert_eq!(db.name(digest).len(), "CHK_t_".len() + 32);

        let again = db.get_or_create_check(t, col(a).gt(Expr::integer(0))).unwrap();
        assert_eq!(again, first);
        assert!(db.contains_constraint(db.default_schema(), "CHK_t_2"));
    }

    #[test]
    fn test_check_counter_survives_removal() {
        let mut db = Database::new();
        let t = db.create_table(db.default_schema(), "t").unwrap();
        let a = db.create_column_of(t, "a", ValueType::Integer).unwrap();
        let first = db.create_check(t, col(a).gt(Expr::integer(0))).unwrap();
        db.remove_check(first).unwrap();
        let next = db.create_check(t, col(a).gt(Expr::integer(1))).unwrap();
        assert_eq!(db.name(next), "CHK_t_2");
    }
}
