//! Property tests: edits undone by hand synthesize nothing, and the way a
//! table's clauses are grouped into statements follows from which kinds of
//! change are present.

mod common;

use common::table;
use oxide_schema::{Action, AlterClause, Database, Expr, IndexSpec, ValueType};
use proptest::prelude::*;

// =============================================================================
// Idempotent no-op
// =============================================================================

#[derive(Debug, Clone)]
enum Edit {
    Rename(usize, usize),
    Nullable(usize, bool),
    Default(usize, Option<i64>),
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0..4usize, 0..6usize).prop_map(|(column, name)| Edit::Rename(column, name)),
        (0..4usize, any::<bool>()).prop_map(|(column, nullable)| Edit::Nullable(column, nullable)),
        (0..4usize, proptest::option::of(-5i64..5))
            .prop_map(|(column, value)| Edit::Default(column, value)),
    ]
}

proptest! {
    #[test]
    fn test_edits_undone_by_hand_emit_nothing(edits in prop::collection::vec(edit(), 0..24)) {
        let mut db = Database::new();
        let names = ["c0", "c1", "c2", "c3"];
        let (_, columns) = table(&mut db, "t", &names);
        db.accept_changes();

        for edit in &edits {
            // edits colliding with a taken name are rejected and change nothing
            let _ = match edit {
                Edit::Rename(column, name) => db.rename(columns[*column], &format!("n{name}")),
                Edit::Nullable(column, nullable) => db.set_nullable(columns[*column], *nullable),
                Edit::Default(column, value) => {
                    db.set_default(columns[*column], value.map(Expr::integer))
                }
            };
        }

        for (i, column) in columns.iter().enumerate() {
            db.rename(*column, &format!("tmp{i}")).unwrap();
        }
        for (column, name) in columns.iter().zip(names) {
            db.rename(*column, name).unwrap();
            db.set_nullable(*column, true).unwrap();
            db.set_default(*column, None).unwrap();
        }

        prop_assert!(db.changes().is_empty());
        prop_assert!(db.complete_pending_changes().is_empty());
    }
}

// =============================================================================
// Statement merge combinations
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct Combination {
    drop_column: bool,
    add_column: bool,
    rename_column: bool,
    rename_index: bool,
    backfill: bool,
    set_default: bool,
}

fn combination() -> impl Strategy<Value = Combination> {
    (
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            |(drop_column, add_column, rename_column, rename_index, backfill, set_default)| {
                Combination {
                    drop_column,
                    add_column,
                    rename_column,
                    rename_index,
                    backfill,
                    set_default,
                }
            },
        )
}

fn clause_kind(clause: &AlterClause) -> &'static str {
    match clause {
        AlterClause::RenameColumn { .. } => "rename_column",
        AlterClause::RenameIndex { .. } => "rename_index",
        AlterClause::DropColumn { .. } => "drop_column",
        AlterClause::AddColumn { .. } => "add_column",
        AlterClause::ModifyColumn { .. } => "modify_column",
        AlterClause::SetDefault { .. } => "set_default",
        other => panic!("Unexpected clause {other:?}"),
    }
}

/// One entry per action: clause kinds of an `ALTER TABLE`, or `backfill`.
fn shape(actions: &[Action]) -> Vec<Vec<&'static str>> {
    actions
        .iter()
        .map(|action| match action {
            Action::AlterTable { clauses, .. } => clauses.iter().map(clause_kind).collect(),
            Action::Backfill { .. } => vec!["backfill"],
            other => panic!("Unexpected action {other:?}"),
        })
        .collect()
}

fn expected_shape(c: Combination) -> Vec<Vec<&'static str>> {
    let mut drops = Vec::new();
    if c.drop_column {
        drops.push("drop_column");
    }
    let mut adds = Vec::new();
    if c.add_column {
        adds.push("add_column");
    }
    if c.backfill {
        adds.push("modify_column");
    }
    if c.set_default {
        adds.push("set_default");
    }

    let split = c.rename_column || c.rename_index || c.backfill;
    if !split {
        drops.extend(adds);
        return if drops.is_empty() { Vec::new() } else { vec![drops] };
    }
    let mut shape = Vec::new();
    if !drops.is_empty() {
        shape.push(drops);
    }
    if c.rename_column {
        shape.push(vec!["rename_column"]);
    }
    if c.rename_index {
        shape.push(vec!["rename_index"]);
    }
    if c.backfill {
        shape.push(vec!["backfill"]);
    }
    if !adds.is_empty() {
        shape.push(adds);
    }
    shape
}

proptest! {
    #[test]
    fn test_statement_grouping(c in combination()) {
        let mut db = Database::new();
        let (t, columns) = table(&mut db, "t", &["k", "d", "r", "n"]);
        let index = db
            .create_index(t, IndexSpec::new().on(columns[0]).named("ix_k"))
            .unwrap();
        db.accept_changes();

        if c.drop_column {
            db.remove(columns[1]).unwrap();
        }
        if c.add_column {
            db.create_column_of(t, "x", ValueType::Text).unwrap();
        }
        if c.rename_column {
            db.rename(columns[2], "r2").unwrap();
        }
        if c.rename_index {
            db.rename(index, "ix_k2").unwrap();
        }
        if c.backfill {
            db.set_nullable(columns[3], false).unwrap();
        }
        if c.set_default {
            db.set_default(columns[0], Some(Expr::integer(1))).unwrap();
        }

        let actions = db.complete_pending_changes();
        prop_assert_eq!(shape(&actions), expected_shape(c));
    }
}
