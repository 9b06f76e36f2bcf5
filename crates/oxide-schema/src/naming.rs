//! Default names for constraints and indexes.
//!
//! Names are derived from the current table and column names every time
//! they are asked for, never memoized, so resetting a name after renames
//! reflects the renames.

use sha2::{Digest, Sha256};

use crate::graph::SortOrder;

/// A key as it appears in an index name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLabel<'a> {
    /// A column key, labelled by the column name.
    Column(&'a str),
    /// An expression key, labelled by its 1-based position.
    Expression(usize),
}

/// `PK_<table>`.
#[must_use]
pub fn primary_key_name(table: &str) -> String {
    format!("PK_{table}")
}

/// `<U?>IX_<table>_<key><A|D>[_<key><A|D>...]`.
#[must_use]
pub fn index_name(table: &str, unique: bool, keys: &[(KeyLabel<'_>, SortOrder)]) -> String {
    let mut name = String::new();
    if unique {
        name.push('U');
    }
    name.push_str("IX_");
    name.push_str(table);
    for (label, order) in keys {
        name.push('_');
        match label {
            KeyLabel::Column(column) => name.push_str(column),
            KeyLabel::Expression(position) => {
                name.push_str("EXPR");
                name.push_str(&position.to_string());
            }
        }
        name.push(order.letter());
    }
    name
}

/// `FK_<table>_<columns>_REF_[<schema>_]<target>`; the schema part only
/// appears when the referenced table lives in another schema.
#[must_use]
pub fn foreign_key_name(
    table: &str,
    columns: &[&str],
    target_schema: Option<&str>,
    target_table: &str,
) -> String {
    let mut name = format!("FK_{table}_{}_REF_", columns.join("_"));
    if let Some(schema) = target_schema {
        name.push_str(schema);
        name.push('_');
    }
    name.push_str(target_table);
    name
}

/// `CHK_<table>_<n>`.
#[must_use]
pub fn ordinal_check_name(table: &str, ordinal: u32) -> String {
    format!("CHK_{table}_{ordinal}")
}

/// `CHK_<table>_<digest>` over the canonical text of the condition.
#[must_use]
pub fn digest_check_name(table: &str, condition: &str) -> String {
    format!("CHK_{table}_{}", condition_digest(condition))
}

/// First 16 bytes of the SHA-256 of `text`, as 32 uppercase hex digits.
#[must_use]
pub fn condition_digest(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    hex::encode_upper(&hash[..16])
}

/// Shortens `name` to at most `max` characters.
///
/// Over-long names keep their head and end in `_` plus eight hex digits of
/// the full name's digest, so two long names sharing a prefix stay apart.
#[must_use]
pub fn fit_identifier(name: &str, max: usize) -> String {
    const SUFFIX: usize = 9;
    if name.chars().count() <= max || max <= SUFFIX {
        return name.to_string();
    }
    let hash = Sha256::digest(name.as_bytes());
    let head: String = name.chars().take(max - SUFFIX).collect();
    format!("{head}_{}", hex::encode_upper(&hash[..4]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_key_name() {
        assert_eq!(primary_key_name("T"), "PK_T");
    }

    #[test]
    fn test_index_names() {
        assert_eq!(
            index_name("T", true, &[(KeyLabel::Column("C"), SortOrder::Ascending)]),
            "UIX_T_CA"
        );
        assert_eq!(
            index_name(
                "orders",
                false,
                &[
                    (KeyLabel::Column("customer"), SortOrder::Ascending),
                    (KeyLabel::Expression(2), SortOrder::Descending),
                ]
            ),
            "IX_orders_customerA_EXPR2D"
        );
    }

    #[test]
    fn test_foreign_key_names() {
        assert_eq!(
            foreign_key_name("orders", &["customer_id"], None, "customers"),
            "FK_orders_customer_id_REF_customers"
        );
        assert_eq!(
            foreign_key_name("orders", &["a", "b"], Some("crm"), "customers"),
            "FK_orders_a_b_REF_crm_customers"
        );
    }

    #[test]
    fn test_check_names() {
        assert_eq!(ordinal_check_name("T", 3), "CHK_T_3");
        let name = digest_check_name("T", "\"a\" > 0");
        assert_eq!(name.len(), "CHK_T_".len() + 32);
        assert_eq!(name, digest_check_name("T", "\"a\" > 0"));
        assert_ne!(name, digest_check_name("T", "\"a\" > 1"));
    }

    #[test]
    fn test_fit_identifier() {
        assert_eq!(fit_identifier("short", 64), "short");
        let long = "x".repeat(80);
        let fitted = fit_identifier(&long, 64);
        assert_eq!(fitted.chars().count(), 64);
        assert!(fitted.starts_with(&"x".repeat(55)));
        assert_eq!(fitted, fit_identifier(&long, 64));
        assert_ne!(fitted, fit_identifier(&"x".repeat(81), 64));
    }
}
