//! MySQL dialect.
//!
//! MySQL applies every clause of an `ALTER TABLE` at once, so column and
//! index swaps need no parking, and indexes are part of the table
//! statement. `RENAME TABLE` runs its clauses left to right. Partial
//! indexes do not exist.

use oxide_schema::expr::{Expr, SqlExpr};
use oxide_schema::synth::{IndexDefinition, TableDefinition, TableRename};
use oxide_schema::{AlterClause, ColumnType, QualifiedName, TypeRegistry, ValueType};

use super::{
    assemble_alter, staged_table_renames, standard_clause, ClauseSql, DdlRenderer, RenderError,
    RenderResult,
};

/// MySQL column types.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlTypes;

impl TypeRegistry for MySqlTypes {
    fn dialect(&self) -> &str {
        "mysql"
    }

    fn get_by_type(&self, value_type: ValueType) -> ColumnType {
        match value_type {
            ValueType::Boolean => ColumnType::new(value_type, "TINYINT").with_length(1),
            ValueType::SmallInt => ColumnType::new(value_type, "SMALLINT"),
            ValueType::Integer => ColumnType::new(value_type, "INT"),
            ValueType::BigInt => ColumnType::new(value_type, "BIGINT"),
            ValueType::Decimal => ColumnType::new(value_type, "DECIMAL").with_precision(18, 4),
            ValueType::Real => ColumnType::new(value_type, "FLOAT"),
            ValueType::Double => ColumnType::new(value_type, "DOUBLE"),
            ValueType::Text => ColumnType::new(value_type, "LONGTEXT"),
            ValueType::Varchar => ColumnType::new(value_type, "VARCHAR").with_length(255),
            ValueType::Blob => ColumnType::new(value_type, "LONGBLOB"),
            ValueType::Date => ColumnType::new(value_type, "DATE"),
            ValueType::Time => ColumnType::new(value_type, "TIME"),
            ValueType::Timestamp => ColumnType::new(value_type, "DATETIME"),
            ValueType::Uuid => ColumnType::new(value_type, "CHAR").with_length(36),
            ValueType::Json => ColumnType::new(value_type, "JSON"),
        }
    }

    fn identifier_delimiters(&self) -> &[char] {
        &['`']
    }
}

/// MySQL DDL dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl MySqlDialect {
    /// Creates a new MySQL dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// `[UNIQUE] INDEX name (keys)`, as written inside table statements.
    fn index_element(&self, index: &IndexDefinition) -> RenderResult<String> {
        if index.filter.is_some() {
            return Err(self.unsupported(format!("partial index '{}'", index.name)));
        }
        let kind = if index.unique { "UNIQUE INDEX" } else { "INDEX" };
        Ok(format!(
            "{kind} {} ({})",
            self.quote_identifier(&index.name),
            self.key_list(&index.keys)
        ))
    }

    fn unsupported(&self, feature: String) -> RenderError {
        RenderError::Unsupported {
            dialect: self.name(),
            feature,
        }
    }
}

impl DdlRenderer for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn types(&self) -> Box<dyn TypeRegistry> {
        Box::new(MySqlTypes)
    }

    fn quote_identifier(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    fn create_table(&self, table: &TableDefinition) -> RenderResult<Vec<String>> {
        let mut elements: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.column_definition(c))
            .collect();
        if let Some(key) = &table.primary_key {
            elements.push(self.primary_key_constraint(key));
        }
        for index in &table.indexes {
            elements.push(self.index_element(index)?);
        }
        elements.extend(table.checks.iter().map(|c| self.check_constraint(c)));

        Ok(vec![format!(
            "CREATE TABLE {} (\n  {}\n)",
            self.qualified(&table.name),
            elements.join(",\n  ")
        )])
    }

    fn rename_tables(&self, renames: &[TableRename]) -> Vec<String> {
        let clauses: Vec<String> = staged_table_renames(renames)
            .iter()
            .map(|r| format!("{} TO {}", self.qualified(&r.from), self.qualified(&r.to)))
            .collect();
        if clauses.is_empty() {
            return Vec::new();
        }
        vec![format!("RENAME TABLE {}", clauses.join(", "))]
    }

    fn alter_table(
        &self,
        table: &QualifiedName,
        clauses: &[AlterClause],
    ) -> RenderResult<Vec<String>> {
        assemble_alter(self, table, clauses)
    }

    fn alter_clause(&self, table: &QualifiedName, clause: &AlterClause) -> RenderResult<ClauseSql> {
        let quote = |name: &str| self.quote_identifier(name);
        let sql = match clause {
            AlterClause::RenameColumn { from, to } => {
                format!("RENAME COLUMN {} TO {}", quote(from), quote(to))
            }
            AlterClause::RenameIndex { from, to } => {
                format!("RENAME INDEX {} TO {}", quote(from), quote(to))
            }
            AlterClause::DropForeignKey { name } => format!("DROP FOREIGN KEY {}", quote(name)),
            AlterClause::DropCheck { name } => format!("DROP CHECK {}", quote(name)),
            AlterClause::DropIndex { name } => format!("DROP INDEX {}", quote(name)),
            AlterClause::DropPrimaryKey { .. } => "DROP PRIMARY KEY".to_string(),
            AlterClause::ModifyColumn { column } => {
                format!("MODIFY COLUMN {}", self.column_definition(column))
            }
            AlterClause::AddIndex { index } => format!("ADD {}", self.index_element(index)?),
            _ => return standard_clause(self, table, clause),
        };
        Ok(ClauseSql::Inline(sql))
    }

    fn index_definition(
        &self,
        table: &QualifiedName,
        index: &IndexDefinition,
    ) -> RenderResult<String> {
        if index.filter.is_some() {
            return Err(self.unsupported(format!("partial index '{}'", index.name)));
        }
        let unique = if index.unique { "UNIQUE " } else { "" };
        Ok(format!(
            "CREATE {unique}INDEX {} ON {} ({})",
            self.quote_identifier(&index.name),
            self.qualified(table),
            self.key_list(&index.keys)
        ))
    }

    /// Expression defaults must be parenthesized.
    fn render_default(&self, expr: &SqlExpr) -> String {
        match expr {
            Expr::Literal(_) | Expr::Raw(_) => self.render_expr(expr),
            _ => format!("({})", self.render_expr(expr)),
        }
    }

    fn value_type_of(&self, native: &str) -> Option<ValueType> {
        let value_type = match native {
            "TINYINT" | "BOOLEAN" | "BOOL" => ValueType::Boolean,
            "SMALLINT" => ValueType::SmallInt,
            "INT" | "INTEGER" | "MEDIUMINT" => ValueType::Integer,
            "BIGINT" => ValueType::BigInt,
            "DECIMAL" | "NUMERIC" => ValueType::Decimal,
            "FLOAT" => ValueType::Real,
            "DOUBLE" | "DOUBLE PRECISION" | "REAL" => ValueType::Double,
            "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" => ValueType::Text,
            "VARCHAR" => ValueType::Varchar,
            "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "VARBINARY" => ValueType::Blob,
            "DATE" => ValueType::Date,
            "TIME" => ValueType::Time,
            "DATETIME" | "TIMESTAMP" => ValueType::Timestamp,
            "CHAR" => ValueType::Uuid,
            "JSON" => ValueType::Json,
            _ => return None,
        };
        Some(value_type)
    }
}

#[cfg(test)]
mod tests {
    use oxide_schema::expr::ColumnName;
    use oxide_schema::synth::{ColumnDefinition, KeyDefinition};
    use oxide_schema::{Action, SortOrder};

    use super::*;

    fn table() -> QualifiedName {
        QualifiedName::new("shop", "orders")
    }

    fn index(filter: Option<SqlExpr>) -> IndexDefinition {
        IndexDefinition {
            name: "IX_orders_qtyA".into(),
            keys: vec![KeyDefinition {
                expr: Expr::Column(ColumnName::bare("qty")),
                order: SortOrder::Ascending,
            }],
            unique: false,
            filter,
        }
    }

    #[test]
    fn test_alter_is_one_statement() {
        let clauses = vec![
            AlterClause::RenameColumn {
                from: "b".into(),
                to: "a".into(),
            },
            AlterClause::RenameColumn {
                from: "a".into(),
                to: "b".into(),
            },
        ];
        let sql = MySqlDialect.alter_table(&table(), &clauses).unwrap();
        assert_eq!(
            sql,
            vec!["ALTER TABLE `shop`.`orders` RENAME COLUMN `b` TO `a`, RENAME COLUMN `a` TO `b`"]
        );

        let clauses = vec![
            AlterClause::DropForeignKey {
                name: "FK_orders_customer_REF_customers".into(),
            },
            AlterClause::DropPrimaryKey {
                name: "PK_orders".into(),
            },
            AlterClause::AddIndex { index: index(None) },
        ];
        let sql = MySqlDialect.alter_table(&table(), &clauses).unwrap();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE `shop`.`orders` DROP FOREIGN KEY `FK_orders_customer_REF_customers`, \
                 DROP PRIMARY KEY, ADD INDEX `IX_orders_qtyA` (`qty`)"
            ]
        );
    }

    #[test]
    fn test_partial_index_is_unsupported() {
        let filter = Expr::Column(ColumnName::bare("qty")).gt(Expr::integer(0));
        let clauses = vec![AlterClause::AddIndex {
            index: index(Some(filter)),
        }];
        let err = MySqlDialect.alter_table(&table(), &clauses).unwrap_err();
        assert!(matches!(err, RenderError::Unsupported { dialect: "mysql", .. }));
    }

    #[test]
    fn test_create_table_inlines_indexes() {
        let definition = TableDefinition {
            name: table(),
            columns: vec![ColumnDefinition {
                name: "qty".into(),
                column_type: MySqlTypes.get_by_type(ValueType::Integer),
                nullable: false,
                default: Some(Expr::integer(1).plus(Expr::integer(1))),
                computation: None,
            }],
            primary_key: None,
            indexes: vec![index(None)],
            checks: Vec::new(),
        };
        let sql = MySqlDialect.render(&Action::CreateTable { table: definition }).unwrap();
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE `shop`.`orders` (\n  `qty` INT NOT NULL DEFAULT (1 + 1),\n  \
                 INDEX `IX_orders_qtyA` (`qty`)\n)"
            ]
        );
    }

    #[test]
    fn test_swapped_tables_rename_in_one_statement() {
        let renames = vec![
            TableRename {
                from: QualifiedName::new("s", "b"),
                to: QualifiedName::new("s", "a"),
            },
            TableRename {
                from: QualifiedName::new("s", "a"),
                to: QualifiedName::new("s", "b"),
            },
        ];
        assert_eq!(
            MySqlDialect.rename_tables(&renames),
            vec![
                "RENAME TABLE `s`.`b` TO `s`.`_oxide_tmp_0`, `s`.`a` TO `s`.`_oxide_tmp_1`, \
                 `s`.`_oxide_tmp_0` TO `s`.`a`, `s`.`_oxide_tmp_1` TO `s`.`b`"
            ]
        );
    }

    #[test]
    fn test_native_types() {
        let dialect = MySqlDialect;
        let boolean = dialect.parse_column_type("tinyint(1)").unwrap();
        assert_eq!(boolean, MySqlTypes.get_by_type(ValueType::Boolean));
        let uuid = dialect.parse_column_type("CHAR(36)").unwrap();
        assert_eq!(uuid, MySqlTypes.get_by_type(ValueType::Uuid));
        assert_eq!(
            dialect.parse_column_type("datetime").unwrap().value_type,
            ValueType::Timestamp
        );
        assert_eq!(MySqlTypes.identifier_delimiters(), &['`']);
    }
}
