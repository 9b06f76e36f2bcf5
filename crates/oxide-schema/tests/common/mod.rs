#![allow(dead_code)]

use oxide_schema::{
    Action, AlterClause, ColumnId, Database, QualifiedName, TableId, ValueType,
};

/// Creates a table in the default schema with nullable integer columns.
pub fn table(db: &mut Database, name: &str, columns: &[&str]) -> (TableId, Vec<ColumnId>) {
    let table = db
        .create_table(db.default_schema(), name)
        .unwrap_or_else(|e| panic!("Failed to create table {name}: {e}"));
    let columns = columns
        .iter()
        .map(|column| db.create_column_of(table, column, ValueType::Integer).unwrap())
        .collect();
    (table, columns)
}

/// Creates a table whose first column is a NOT NULL integer primary key.
pub fn keyed_table(db: &mut Database, name: &str, columns: &[&str]) -> (TableId, Vec<ColumnId>) {
    let (table, columns) = table(db, name, columns);
    db.set_nullable(columns[0], false).unwrap();
    db.create_primary_key(table, &columns[..1]).unwrap();
    (table, columns)
}

/// Synthesizes and commits, returning the actions.
pub fn commit(db: &mut Database) -> Vec<Action> {
    db.complete_pending_changes()
}

pub fn main(name: &str) -> QualifiedName {
    QualifiedName::new("main", name)
}

pub fn labels(actions: &[Action]) -> Vec<&'static str> {
    actions.iter().map(Action::label).collect()
}

/// Clauses of every `ALTER TABLE` action, in order.
pub fn alters(actions: &[Action]) -> Vec<Vec<AlterClause>> {
    actions
        .iter()
        .filter_map(|action| match action {
            Action::AlterTable { clauses, .. } => Some(clauses.clone()),
            _ => None,
        })
        .collect()
}

pub fn rename_column(from: &str, to: &str) -> AlterClause {
    AlterClause::RenameColumn {
        from: from.to_string(),
        to: to.to_string(),
    }
}
