//! End-to-end tests: edit scripts planned and rendered in both dialects.

use std::io::Write;

use oxide_schema_migrate::prelude::*;

fn plan_with(renderer: &dyn DdlRenderer, json: &str) -> Plan {
    let script = Script::from_json(json).unwrap();
    plan(&script, renderer, DatabaseOptions::default()).unwrap()
}

const SHOP: &str = r#"{
    "baseline": [
        { "op": "create_table", "table": "customers",
          "columns": [
              { "name": "id", "type": "BIGINT", "nullable": false },
              { "name": "name", "type": "VARCHAR(80)" }
          ],
          "primary_key": ["id"] },
        { "op": "create_table", "table": "orders",
          "columns": [
              { "name": "id", "type": "BIGINT", "nullable": false },
              { "name": "customer", "type": "BIGINT" },
              { "name": "qty", "type": "INTEGER" }
          ],
          "primary_key": ["id"] },
        { "op": "create_foreign_key", "table": "orders", "columns": ["customer"],
          "references": "customers" }
    ],
    "changes": []
}"#;

fn shop_with(changes: &str) -> String {
    SHOP.replace(r#""changes": []"#, &format!(r#""changes": {changes}"#))
}

// =============================================================================
// Generic dialect
// =============================================================================

#[test]
fn test_new_table_with_key() {
    let json = shop_with(
        r#"[
        { "op": "create_table", "table": "items",
          "columns": [
              { "name": "order_id", "type": "BIGINT", "nullable": false },
              { "name": "sku", "type": "VARCHAR(32)", "nullable": false }
          ],
          "primary_key": ["order_id", "sku"] },
        { "op": "create_foreign_key", "table": "items", "columns": ["order_id"],
          "references": "orders", "on_delete": "cascade" }
    ]"#,
    );
    let plan = plan_with(&GenericDialect, &json);
    assert_eq!(
        plan.statements,
        vec![
            "CREATE TABLE \"main\".\"items\" (\n  \"order_id\" BIGINT NOT NULL,\n  \
             \"sku\" VARCHAR(32) NOT NULL,\n  \
             CONSTRAINT \"PK_items\" PRIMARY KEY (\"order_id\", \"sku\")\n)",
            "ALTER TABLE \"main\".\"items\" ADD CONSTRAINT \"FK_items_order_id_REF_orders\" \
             FOREIGN KEY (\"order_id\") REFERENCES \"main\".\"orders\" (\"id\") ON DELETE CASCADE",
        ]
    );
}

#[test]
fn test_not_null_column_is_backfilled() {
    let json = shop_with(
        r#"[{ "op": "set_nullable", "column": "orders.qty", "nullable": false }]"#,
    );
    let plan = plan_with(&GenericDialect, &json);
    assert_eq!(
        plan.statements,
        vec![
            "UPDATE \"main\".\"orders\" SET \"qty\" = 0 WHERE \"qty\" IS NULL",
            "ALTER TABLE \"main\".\"orders\" ALTER COLUMN \"qty\" TYPE INTEGER, \
             ALTER COLUMN \"qty\" SET NOT NULL, ALTER COLUMN \"qty\" DROP DEFAULT",
        ]
    );
}

#[test]
fn test_dropped_foreign_key_precedes_retype() {
    let json = shop_with(
        r#"[
        { "op": "remove", "target": { "kind": "foreign_key",
                                       "path": "orders.FK_orders_customer_REF_customers" } },
        { "op": "set_type", "column": "orders.customer", "type": "INTEGER" }
    ]"#,
    );
    let plan = plan_with(&GenericDialect, &json);
    assert_eq!(
        plan.statements,
        vec![
            "ALTER TABLE \"main\".\"orders\" DROP CONSTRAINT \"FK_orders_customer_REF_customers\"",
            "ALTER TABLE \"main\".\"orders\" ALTER COLUMN \"customer\" TYPE INTEGER, \
             ALTER COLUMN \"customer\" DROP NOT NULL, ALTER COLUMN \"customer\" DROP DEFAULT",
        ]
    );
}

#[test]
fn test_swapped_table_names_are_parked() {
    let json = shop_with(
        r#"[
        { "op": "rename", "target": { "kind": "table", "path": "orders" }, "to": "tmp" },
        { "op": "rename", "target": { "kind": "table", "path": "customers" }, "to": "orders" },
        { "op": "rename", "target": { "kind": "table", "path": "tmp" }, "to": "customers" }
    ]"#,
    );
    let plan = plan_with(&GenericDialect, &json);
    assert_eq!(plan.actions.len(), 1);
    assert_eq!(
        plan.statements,
        vec![
            "ALTER TABLE \"main\".\"customers\" RENAME TO \"_oxide_tmp_0\"",
            "ALTER TABLE \"main\".\"orders\" RENAME TO \"_oxide_tmp_1\"",
            "ALTER TABLE \"main\".\"_oxide_tmp_0\" RENAME TO \"orders\"",
            "ALTER TABLE \"main\".\"_oxide_tmp_1\" RENAME TO \"customers\"",
        ]
    );
}

#[test]
fn test_views_are_rebuilt_around_renames() {
    let json = SHOP.replace(
        r#""changes": []"#,
        r#""changes": [
            { "op": "rename", "target": { "kind": "column", "path": "orders.qty" },
              "to": "quantity" }
        ]"#,
    );
    let json = json.replace(
        r#""references": "customers" }"#,
        r#""references": "customers" },
        { "op": "create_view", "view": "order_sizes", "select": ["orders.qty"],
          "from": ["orders"] }"#,
    );
    let plan = plan_with(&GenericDialect, &json);
    assert_eq!(
        plan.statements,
        vec![
            "DROP VIEW \"main\".\"order_sizes\"",
            "ALTER TABLE \"main\".\"orders\" RENAME COLUMN \"qty\" TO \"quantity\"",
            "CREATE VIEW \"main\".\"order_sizes\" AS SELECT \"main\".\"orders\".\"quantity\" \
             FROM \"main\".\"orders\"",
        ]
    );
}

// =============================================================================
// MySQL dialect
// =============================================================================

#[test]
fn test_mysql_uses_native_types() {
    let json = shop_with(
        r#"[{ "op": "add_column", "table": "customers",
              "column": { "name": "active", "type": "TINYINT(1)", "nullable": false,
                          "default": { "literal": { "boolean": true } } } }]"#,
    );
    let plan = plan_with(&MySqlDialect, &json);
    assert_eq!(
        plan.statements,
        vec!["ALTER TABLE `main`.`customers` ADD COLUMN `active` TINYINT(1) NOT NULL DEFAULT TRUE"]
    );
}

#[test]
fn test_mysql_rejects_partial_index() {
    let json = shop_with(
        r#"[{ "op": "create_index", "table": "orders", "columns": ["qty"],
              "filter": { "is_not_null": { "column": "qty" } } }]"#,
    );
    let script = Script::from_json(&json).unwrap();
    let err = plan(&script, &MySqlDialect, DatabaseOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        MigrateError::Render(RenderError::Unsupported { dialect: "mysql", .. })
    ));

    // the generic dialect renders it
    let plan = plan_with(&GenericDialect, &json);
    assert_eq!(
        plan.statements,
        vec![
            "CREATE INDEX \"IX_orders_qtyA\" ON \"main\".\"orders\" (\"qty\") \
             WHERE \"qty\" IS NOT NULL"
        ]
    );
}

// =============================================================================
// Scripts on disk
// =============================================================================

#[test]
fn test_load_script_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(shop_with("[]").as_bytes()).unwrap();

    let script = Script::load(file.path()).unwrap();
    let plan = plan(&script, &GenericDialect, DatabaseOptions::default()).unwrap();
    assert!(plan.is_empty(), "the baseline alone plans nothing");

    let missing = Script::load(&file.path().with_extension("missing")).unwrap_err();
    assert!(matches!(missing, MigrateError::ReadScript { .. }));
}

#[test]
fn test_custom_default_schema() {
    let script = Script::from_json(
        r#"{ "changes": [{ "op": "create_table", "table": "t",
                          "columns": [{ "name": "a", "type": "TEXT" }] }] }"#,
    )
    .unwrap();
    let options = DatabaseOptions {
        default_schema: "app".to_string(),
        ..DatabaseOptions::default()
    };
    let plan = plan(&script, &GenericDialect, options).unwrap();
    assert_eq!(
        plan.statements,
        vec!["CREATE TABLE \"app\".\"t\" (\n  \"a\" TEXT\n)"]
    );
}
