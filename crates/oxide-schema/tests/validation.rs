//! Integration tests for validation: uniqueness, referential veto, cascade
//! completeness and error reporting.

mod common;

use common::{alters, commit, keyed_table, table};
use oxide_schema::{
    col, field, AlterClause, ColumnType, Computation, Database, Expr, ForeignKeySpec, IndexSpec,
    RuleCode, SchemaError, ValueType, ViewQuery,
};

// =============================================================================
// Uniqueness
// =============================================================================

#[test]
fn test_names_unique_per_namespace() {
    let mut db = Database::new();
    let main = db.default_schema();
    let (t, c) = table(&mut db, "t", &["a"]);
    let (u, d) = table(&mut db, "u", &["a"]);

    assert!(db.create_table(main, "t").unwrap_err().violates(RuleCode::NameNotUnique));
    assert!(db
        .create_column_of(t, "a", ValueType::Integer)
        .unwrap_err()
        .violates(RuleCode::NameNotUnique));

    // indexes are scoped per table
    db.create_index(t, IndexSpec::new().on(c[0]).named("ix")).unwrap();
    db.create_index(u, IndexSpec::new().on(d[0]).named("ix")).unwrap();

    // constraints are scoped per schema
    let check = db.create_check(t, col(c[0]).gt(Expr::integer(0))).unwrap();
    let other = db.create_check(u, col(d[0]).gt(Expr::integer(0))).unwrap();
    let taken = db.name(check).to_string();
    assert!(db
        .rename(other, &taken)
        .unwrap_err()
        .violates(RuleCode::NameNotUnique));

    // other schemas have their own namespaces
    let sales = db.create_schema("sales").unwrap();
    db.create_table(sales, "t").unwrap();
}

#[test]
fn test_removed_names_are_free() {
    let mut db = Database::new();
    let main = db.default_schema();
    let (t, _) = table(&mut db, "t", &["a"]);
    db.remove(t).unwrap();
    let again = db.create_table(main, "t").unwrap();
    assert_ne!(again, t);
    assert_eq!(db.tables(main), vec![again]);
}

#[test]
fn test_name_syntax() {
    let mut db = Database::new();
    let main = db.default_schema();
    let long = "x".repeat(65);
    let err = db.create_table(main, &long).unwrap_err();
    assert!(err.violates(RuleCode::NameTooLong));
    let err = db.create_table(main, "bad\"name").unwrap_err();
    assert!(err.violates(RuleCode::NameInvalidCharacter));
}

// =============================================================================
// Error reporting
// =============================================================================

#[test]
fn test_every_violation_is_reported() {
    let mut db = Database::new();
    let (t, c) = table(&mut db, "t", &["a"]);
    let err = db
        .create_index(
            t,
            IndexSpec::new()
                .on(c[0])
                .unique()
                .virtual_only()
                .filter(col(c[0]).is_not_null()),
        )
        .unwrap_err();
    let SchemaError::Validation(validation) = err else {
        panic!("Expected a validation error");
    };
    assert_eq!(validation.dialect, "generic");
    assert_eq!(
        validation.codes(),
        vec![RuleCode::IndexVirtualUnique, RuleCode::IndexVirtualPartial]
    );
    assert!(db.indexes(t).is_empty(), "nothing is applied on failure");
}

#[test]
fn test_foreign_handles_are_rejected() {
    let mut db = Database::new();
    let mut other = Database::new();
    let (t, _) = table(&mut other, "t", &["a"]);

    let err = db.create_column_of(t, "b", ValueType::Integer).unwrap_err();
    assert!(err.violates(RuleCode::ObjectForeignDatabase));
    assert!(db.is_removed(t));
    assert!(db.get(t).is_none());
}

#[test]
fn test_removed_objects_reject_mutation() {
    let mut db = Database::new();
    let (t, c) = table(&mut db, "t", &["a"]);
    db.remove(t).unwrap();

    assert!(db.set_nullable(c[0], false).unwrap_err().violates(RuleCode::ObjectRemoved));
    assert!(db
        .create_column_of(t, "b", ValueType::Integer)
        .unwrap_err()
        .violates(RuleCode::ObjectRemoved));
}

#[test]
fn test_try_lookup_of_other_kind_is_none() {
    let mut db = Database::new();
    let main = db.default_schema();
    table(&mut db, "orders", &["a"]);
    assert!(db.try_view(main, "orders").is_none());
    assert!(matches!(
        db.view(main, "orders"),
        Err(SchemaError::KindMismatch { .. })
    ));
}

// =============================================================================
// Referential veto
// =============================================================================

#[test]
fn test_removal_vetoed_while_referenced() {
    let mut db = Database::new();
    let main = db.default_schema();
    let (customers, _) = keyed_table(&mut db, "customers", &["id"]);
    let (orders, c) = keyed_table(&mut db, "orders", &["id", "customer"]);
    db.create_foreign_key_to(orders, &[c[1]], customers).unwrap();
    db.create_view(main, "v", ViewQuery::new().select(col(c[1])).source(orders))
        .unwrap();

    let err = db.remove(customers).unwrap_err();
    assert!(err.violates(RuleCode::ReferenceDependentExists));
    let err = db.remove(c[1]).unwrap_err();
    assert!(err.violates(RuleCode::ReferenceDependentExists));
    assert!(!db.is_removed(customers));
    assert!(!db.is_removed(c[1]));
}

#[test]
fn test_retype_vetoed_on_either_side_of_foreign_key() {
    let mut db = Database::new();
    let (customers, k) = keyed_table(&mut db, "customers", &["id"]);
    let (orders, c) = keyed_table(&mut db, "orders", &["id", "customer"]);
    db.create_foreign_key_to(orders, &[c[1]], customers).unwrap();

    let text = ColumnType::new(ValueType::Text, "TEXT");
    assert!(db
        .set_column_type(k[0], text.clone())
        .unwrap_err()
        .violates(RuleCode::ColumnTypeIncompatible));
    assert!(db
        .set_column_type(c[1], text)
        .unwrap_err()
        .violates(RuleCode::ColumnTypeIncompatible));
}

#[test]
fn test_unique_flip_vetoed_for_keys_and_foreign_key_targets() {
    let mut db = Database::new();
    let (t, c) = keyed_table(&mut db, "T", &["id", "code", "tag"]);
    let (u, d) = table(&mut db, "U", &["code"]);
    db.set_nullable(c[1], false).unwrap();
    let pk_index = db.graph().primary_key_data(db.primary_key(t).unwrap()).index;
    let referenced = db.create_index(t, IndexSpec::new().on(c[1]).unique()).unwrap();
    let free = db.create_index(t, IndexSpec::new().on(c[2]).unique()).unwrap();
    let origin = db
        .create_index(u, IndexSpec::new().on(d[0]).virtual_only())
        .unwrap();
    db.create_foreign_key(u, ForeignKeySpec::new(origin, referenced))
        .unwrap();
    db.accept_changes();

    let err = db.set_unique(pk_index, false).unwrap_err();
    assert!(err.violates(RuleCode::IndexPrimaryKey));
    let err = db.set_unique(referenced, false).unwrap_err();
    assert!(err.violates(RuleCode::IndexForeignKeyTarget));
    assert!(!err.violates(RuleCode::IndexPrimaryKey));
    assert!(db.graph().index_data(pk_index).unique);
    assert!(db.graph().index_data(referenced).unique);

    let name = db.name(free).to_string();
    db.set_unique(free, false).unwrap();
    let clauses = alters(&commit(&mut db));
    assert_eq!(clauses.len(), 1);
    assert_eq!(clauses[0].len(), 2);
    assert_eq!(clauses[0][0], AlterClause::DropIndex { name });
    assert!(matches!(&clauses[0][1], AlterClause::AddIndex { index } if !index.unique));
}

#[test]
fn test_key_columns_stay_not_null() {
    let mut db = Database::new();
    let (_, k) = keyed_table(&mut db, "t", &["id"]);
    let err = db.set_nullable(k[0], true).unwrap_err();
    assert!(err.violates(RuleCode::ColumnNullableKey));
}

#[test]
fn test_column_rename_vetoed_by_view_reader() {
    let mut db = Database::new();
    let main = db.default_schema();
    let (t, c) = table(&mut db, "t", &["a", "b"]);
    let v1 = db
        .create_view(main, "v1", ViewQuery::new().select(col(c[0])).source(t))
        .unwrap();
    db.create_view(main, "v2", ViewQuery::new().select(field(v1, "a")).source(v1))
        .unwrap();

    let err = db.rename(c[0], "z").unwrap_err();
    assert!(err.violates(RuleCode::ReferenceRenameBlocked));
    db.rename(c[1], "z").unwrap();
}

#[test]
fn test_computed_column_blocks_rename() {
    let mut db = Database::new();
    let (_, c) = table(&mut db, "t", &["a", "b"]);
    db.set_computation(c[1], Some(Computation::stored(col(c[0]).times(Expr::integer(2)))))
        .unwrap();
    assert!(db
        .rename(c[0], "z")
        .unwrap_err()
        .violates(RuleCode::ReferenceRenameBlocked));
}

// =============================================================================
// Cascade completeness
// =============================================================================

#[test]
fn test_cascade_removes_everything_owned() {
    let mut db = Database::new();
    let main = db.default_schema();
    let (t, c) = keyed_table(&mut db, "t", &["id", "a"]);
    let index = db.create_index(t, IndexSpec::new().on(c[1])).unwrap();
    let check = db.create_check(t, col(c[1]).gt(Expr::integer(0))).unwrap();
    let pk = db.primary_key(t).unwrap();
    let backing = db.graph().primary_key_data(pk).index;

    db.remove(t).unwrap();
    for id in [c[0].id(), c[1].id(), index.id(), check.id(), pk.id(), backing.id()] {
        assert!(db.is_removed(id), "{id} should be removed");
        assert!(db.graph().dependents(id).is_empty());
        assert!(db.graph().dependencies(id).is_empty());
    }
    assert!(db.tables(main).is_empty());
    assert!(db.record_set(t).is_empty());
}

#[test]
fn test_primary_key_and_index_go_together() {
    let mut db = Database::new();
    let (t, _) = keyed_table(&mut db, "t", &["id"]);
    let pk = db.primary_key(t).unwrap();
    let backing = db.graph().primary_key_data(pk).index;

    db.remove(backing).unwrap();
    assert!(db.is_removed(pk));
    assert!(db.primary_key(t).is_none());
}
