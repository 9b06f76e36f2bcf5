//! View phases.
//!
//! Views cannot be altered, renamed or moved, so any change that affects
//! one means dropping and re-creating it, together with every view built
//! on top of it.

use std::collections::{BTreeSet, HashSet};

use tracing::debug;

use super::{Action, Era, Facts, Synthesizer, ViewDefinition};
use crate::expr::ViewQuery;
use crate::graph::{ObjectId, ObjectKind};

/// What a view's query depends on.
#[derive(Debug, Default)]
struct ViewDependencies {
    columns: BTreeSet<ObjectId>,
    /// Tables and views, by source or by column.
    relations: BTreeSet<ObjectId>,
    views: BTreeSet<ObjectId>,
}

impl Synthesizer<'_> {
    fn view_query(&self, era: Era, view: ObjectId) -> Option<ViewQuery> {
        self.state(era, view)
            .and_then(|s| s.data.as_view().map(|v| v.source.clone()))
    }

    fn view_dependencies(&self, query: &ViewQuery) -> ViewDependencies {
        let mut deps = ViewDependencies::default();
        for source in &query.from {
            deps.relations.insert(*source);
            if self.graph.kind(*source) == ObjectKind::View {
                deps.views.insert(*source);
            }
        }
        for column in query.referenced_columns() {
            deps.columns.insert(column.id());
            if let Some(table) = self.graph.parent(column.id()) {
                deps.relations.insert(table);
            }
        }
        for view in query.referenced_views() {
            deps.relations.insert(view.id());
            deps.views.insert(view.id());
        }
        deps
    }

    /// Whether a view that exists in both eras must be re-created for
    /// reasons other than the views it reads.
    fn view_outdated(&self, facts: &Facts, view: ObjectId) -> bool {
        if self.tracker.get(view).is_some() {
            return true;
        }
        if self.qualified(Era::Baseline, view) != self.qualified(Era::Current, view) {
            return true;
        }
        let Some(query) = self.view_query(Era::Baseline, view) else {
            return false;
        };
        let deps = self.view_dependencies(&query);
        let column_changed = deps.columns.iter().any(|column| {
            facts.rebuilt_columns.contains(column)
                || match (
                    self.state(Era::Baseline, *column),
                    self.state(Era::Current, *column),
                ) {
                    (Some(before), Some(now)) => before.name != now.name,
                    _ => true,
                }
        });
        column_changed
            || deps.relations.iter().any(|relation| {
                !self.exists(*relation)
                    || self.qualified(Era::Baseline, *relation)
                        != self.qualified(Era::Current, *relation)
            })
    }

    pub(crate) fn analyze_views(&self, facts: &mut Facts) {
        let views: Vec<ObjectId> = self
            .graph
            .iter()
            .filter(|(_, o)| o.kind() == ObjectKind::View)
            .map(|(id, _)| id)
            .collect();

        let mut rebuild: HashSet<ObjectId> = views
            .iter()
            .copied()
            .filter(|v| self.existed(*v) && self.exists(*v))
            .filter(|v| self.view_outdated(facts, *v))
            .collect();
        loop {
            let before = rebuild.len();
            for view in &views {
                if rebuild.contains(view) || !self.existed(*view) || !self.exists(*view) {
                    continue;
                }
                let Some(query) = self.view_query(Era::Baseline, *view) else {
                    continue;
                };
                let reads_rebuilt = self
                    .view_dependencies(&query)
                    .views
                    .iter()
                    .any(|v| rebuild.contains(v) || !self.exists(*v));
                if reads_rebuilt {
                    rebuild.insert(*view);
                }
            }
            if rebuild.len() == before {
                break;
            }
        }

        let dropped: Vec<ObjectId> = views
            .iter()
            .copied()
            .filter(|v| self.existed(*v) && (!self.exists(*v) || rebuild.contains(v)))
            .collect();
        let created: Vec<ObjectId> = views
            .iter()
            .copied()
            .filter(|v| self.exists(*v) && (!self.existed(*v) || rebuild.contains(v)))
            .collect();
        debug!(
            rebuilt = rebuild.len(),
            dropped = dropped.len(),
            created = created.len(),
            "planned view rebuilds"
        );

        let mut drop_order = self.dependencies_first(Era::Baseline, &dropped);
        drop_order.reverse();
        facts.dropped_views = drop_order;
        facts.created_views = self.dependencies_first(Era::Current, &created);
    }

    /// Orders `views` so that every view comes after the views it reads.
    fn dependencies_first(&self, era: Era, views: &[ObjectId]) -> Vec<ObjectId> {
        let members: HashSet<ObjectId> = views.iter().copied().collect();
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for view in views {
            self.visit_view(era, *view, &members, &mut visited, &mut order);
        }
        order
    }

    fn visit_view(
        &self,
        era: Era,
        view: ObjectId,
        members: &HashSet<ObjectId>,
        visited: &mut HashSet<ObjectId>,
        order: &mut Vec<ObjectId>,
    ) {
        if !visited.insert(view) {
            return;
        }
        if let Some(query) = self.view_query(era, view) {
            for dependency in self.view_dependencies(&query).views {
                if members.contains(&dependency) {
                    self.visit_view(era, dependency, members, visited, order);
                }
            }
        }
        order.push(view);
    }

    /// Phase 1.
    pub(crate) fn drop_views(&self, facts: &Facts, actions: &mut Vec<Action>) {
        for view in &facts.dropped_views {
            actions.push(Action::DropView {
                name: self.qualified(Era::Baseline, *view),
            });
        }
    }

    /// Phase 11.
    pub(crate) fn create_views(&self, facts: &Facts, actions: &mut Vec<Action>) {
        for view in &facts.created_views {
            let Some(query) = self.view_query(Era::Current, *view) else {
                continue;
            };
            actions.push(Action::CreateView {
                view: ViewDefinition {
                    name: self.qualified(Era::Current, *view),
                    query: self.sql_query(Era::Current, &query),
                },
            });
        }
    }
}
