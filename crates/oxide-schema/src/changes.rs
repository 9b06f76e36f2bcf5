//! Net change tracking.
//!
//! The tracker keeps one entry per dirty object describing how its current
//! state differs from the baseline (the state at the last synthesis). It is
//! not an edit log: an object edited back to its baseline state has no
//! entry at all.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::graph::{ObjectGraph, ObjectId, ObjectState};

/// What `complete_pending_changes` does with synthesized actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    /// Append to the pending-action sink and reset the baseline.
    #[default]
    Commit,
    /// Only return the actions; sink and baseline stay as they are.
    DryRun,
}

/// Net difference of one object against its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum Change {
    /// The object did not exist in the baseline.
    Created,
    /// The object existed and some property differs.
    Modified {
        /// State at the last synthesis.
        baseline: ObjectState,
    },
    /// The object existed and has been removed.
    Removed {
        /// State at the last synthesis.
        baseline: ObjectState,
        /// Object whose mutation removed this one.
        cause: ObjectId,
    },
}

impl Change {
    /// Baseline state, if the object existed at the last synthesis.
    #[must_use]
    pub const fn baseline(&self) -> Option<&ObjectState> {
        match self {
            Self::Created => None,
            Self::Modified { baseline } | Self::Removed { baseline, .. } => Some(baseline),
        }
    }
}

/// A dirty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// The net change.
    pub change: Change,
    /// Clock value of the last mutation touching the object.
    pub touched: u64,
    /// Clock value of the last mutation changing its name or parent.
    pub renamed: Option<u64>,
}

/// Scope of one public mutation.
///
/// The active object is the one the caller asked to change; everything else
/// touched while applying the mutation (cascaded removals, a default
/// cleared by a retype) is attributed to it.
#[derive(Debug)]
pub struct MutationContext {
    active: ObjectId,
    touched: Vec<(ObjectId, Option<ObjectState>)>,
}

impl MutationContext {
    /// Starts a mutation of `active`.
    #[must_use]
    pub fn new(active: impl Into<ObjectId>) -> Self {
        Self {
            active: active.into(),
            touched: Vec::new(),
        }
    }

    /// The object the mutation was requested for.
    #[must_use]
    pub const fn active(&self) -> ObjectId {
        self.active
    }

    /// Captures the state of `id` before it is modified. Only the first
    /// capture of an object counts.
    pub fn touch(&mut self, graph: &ObjectGraph, id: impl Into<ObjectId>) {
        let id = id.into();
        if self.touched.iter().any(|(t, _)| *t == id) {
            return;
        }
        self.touched.push((id, Some(graph.snapshot(id))));
    }

    /// Marks `id` as created by this mutation.
    pub fn created(&mut self, id: impl Into<ObjectId>) {
        let id = id.into();
        if !self.touched.iter().any(|(t, _)| *t == id) {
            self.touched.push((id, None));
        }
    }

    /// Objects touched so far.
    pub fn touched(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.touched.iter().map(|(id, _)| *id)
    }
}

/// Net diff of every dirty object.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    entries: BTreeMap<ObjectId, ChangeEntry>,
    clock: u64,
}

impl ChangeTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a finished mutation into the net diff.
    pub fn record(&mut self, ctx: MutationContext, graph: &ObjectGraph) {
        self.clock += 1;
        let tick = self.clock;
        let active = ctx.active;
        for (id, before) in ctx.touched {
            let current = graph.snapshot(id);
            let renamed = before
                .as_ref()
                .is_some_and(|b| b.name != current.name || b.parent != current.parent);
            let previous = self.entries.remove(&id);
            let change = match previous.as_ref().map(|e| &e.change) {
                Some(Change::Created) => (!current.removed).then_some(Change::Created),
                Some(Change::Modified { baseline } | Change::Removed { baseline, .. }) => {
                    Self::diff(baseline.clone(), &current, active)
                }
                None => match before {
                    None => (!current.removed).then_some(Change::Created),
                    Some(baseline) => Self::diff(baseline, &current, active),
                },
            };
            let Some(change) = change else {
                trace!(%id, "back to baseline");
                continue;
            };
            let renamed = if renamed {
                Some(tick)
            } else {
                previous.as_ref().and_then(|e| e.renamed)
            };
            trace!(%id, ?change, "recorded");
            self.entries.insert(
                id,
                ChangeEntry {
                    change,
                    touched: tick,
                    renamed,
                },
            );
        }
    }

    fn diff(baseline: ObjectState, current: &ObjectState, cause: ObjectId) -> Option<Change> {
        if current.removed {
            Some(Change::Removed { baseline, cause })
        } else if *current == baseline {
            None
        } else {
            Some(Change::Modified { baseline })
        }
    }

    /// Entry of a dirty object.
    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&ChangeEntry> {
        self.entries.get(&id)
    }

    /// All dirty objects, ordered by identity.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &ChangeEntry)> + '_ {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    /// Number of dirty objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no object is dirty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Makes the current state the new baseline.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// State of `id` at the last synthesis, or `None` if it did not exist
    /// then.
    #[must_use]
    pub fn baseline(&self, graph: &ObjectGraph, id: ObjectId) -> Option<ObjectState> {
        match self.entries.get(&id) {
            Some(entry) => entry.change.baseline().cloned(),
            None => {
                let state = graph.snapshot(id);
                (!state.removed).then_some(state)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ObjectData, SchemaData};

    fn graph() -> (ObjectGraph, ObjectId) {
        let mut graph = ObjectGraph::new(1);
        let schema = graph.insert(
            "main".into(),
            None,
            ObjectData::Schema(SchemaData { is_default: true }),
        );
        (graph, schema)
    }

    fn rename(graph: &mut ObjectGraph, tracker: &mut ChangeTracker, id: ObjectId, name: &str) {
        let mut ctx = MutationContext::new(id);
        ctx.touch(graph, id);
        graph.object_mut(id).core.name = name.to_string();
        tracker.record(ctx, graph);
    }

    #[test]
    fn test_rename_back_clears_entry() {
        let (mut graph, schema) = graph();
        let table = graph.insert("a".into(), Some(schema), ObjectData::Table);
        let mut tracker = ChangeTracker::new();

        rename(&mut graph, &mut tracker, table, "b");
        assert!(matches!(
            tracker.get(table).map(|e| &e.change),
            Some(Change::Modified { baseline }) if baseline.name == "a"
        ));
        rename(&mut graph, &mut tracker, table, "a");
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_created_then_removed_vanishes() {
        let (mut graph, schema) = graph();
        let mut tracker = ChangeTracker::new();
        let table = graph.insert("a".into(), Some(schema), ObjectData::Table);
        let mut ctx = MutationContext::new(table);
        ctx.created(table);
        tracker.record(ctx, &graph);
        assert_eq!(tracker.get(table).map(|e| &e.change), Some(&Change::Created));

        let mut ctx = MutationContext::new(table);
        ctx.touch(&graph, table);
        graph.object_mut(table).core.removed = true;
        tracker.record(ctx, &graph);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_removal_keeps_first_baseline_and_cause() {
        let (mut graph, schema) = graph();
        let table = graph.insert("a".into(), Some(schema), ObjectData::Table);
        let mut tracker = ChangeTracker::new();
        rename(&mut graph, &mut tracker, table, "b");

        let mut ctx = MutationContext::new(schema);
        ctx.touch(&graph, table);
        graph.object_mut(table).core.removed = true;
        tracker.record(ctx, &graph);

        match tracker.get(table).map(|e| &e.change) {
            Some(Change::Removed { baseline, cause }) => {
                assert_eq!(baseline.name, "a");
                assert_eq!(*cause, schema);
            }
            other => panic!("unexpected change {other:?}"),
        }
        assert_eq!(tracker.baseline(&graph, table).map(|s| s.name), Some("a".into()));
    }

    #[test]
    fn test_renamed_clock_tracks_last_rename() {
        let (mut graph, schema) = graph();
        let a = graph.insert("a".into(), Some(schema), ObjectData::Table);
        let b = graph.insert("b".into(), Some(schema), ObjectData::Table);
        let mut tracker = ChangeTracker::new();
        rename(&mut graph, &mut tracker, a, "x");
        rename(&mut graph, &mut tracker, b, "a");
        rename(&mut graph, &mut tracker, a, "b");

        let a_seq = tracker.get(a).and_then(|e| e.renamed);
        let b_seq = tracker.get(b).and_then(|e| e.renamed);
        assert!(b_seq < a_seq);
    }
}
