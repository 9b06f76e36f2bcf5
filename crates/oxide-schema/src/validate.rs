//! Validation rules.
//!
//! Every mutation collects all violated rules into a [`Rules`] accumulator
//! before touching the graph. Nothing here fails fast: a mutation that
//! breaks three rules reports three violations.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuleViolation, ValidationError};
use crate::expr::{ColumnRef, Expr, ViewQuery};
use crate::graph::{
    ColumnId, IndexId, IndexKey, IndexTarget, ObjectData, ObjectGraph, ObjectId, ObjectKind,
    ReferenceSource, TableId, ViewId,
};
use crate::types::{ColumnType, TypeRegistry};

/// Machine-readable identifier of a validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleCode {
    NameEmpty,
    NameInvalidCharacter,
    NameTooLong,
    NameNotUnique,
    NameNoDefault,
    ObjectNotFound,
    ObjectRemoved,
    ObjectForeignDatabase,
    ObjectWrongParent,
    ReferenceDependentExists,
    ReferenceRenameBlocked,
    SchemaDefaultRemoval,
    ColumnDefaultWithComputation,
    ColumnDefaultReferencesColumn,
    ColumnComputationSelfReference,
    ColumnComputationCycle,
    ExpressionForeignColumn,
    ColumnNullableKey,
    ColumnTypeIncompatible,
    IndexEmpty,
    IndexDuplicateKey,
    IndexVirtualUnique,
    IndexVirtualPartial,
    IndexPrimaryKey,
    IndexForeignKeyTarget,
    PrimaryKeyExists,
    PrimaryKeyIndexNotUnique,
    PrimaryKeyIndexPartial,
    PrimaryKeyIndexVirtual,
    PrimaryKeyNullableColumn,
    ForeignKeyColumnCount,
    ForeignKeyColumnType,
    ForeignKeyTargetNotUnique,
    ForeignKeyTargetPartial,
    ForeignKeyTargetVirtual,
    ForeignKeyTargetNullable,
    ForeignKeySameIndex,
    ViewUnknownSource,
    ViewUnknownField,
    ViewCycle,
}

impl RuleCode {
    /// Returns the stable code string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NameEmpty => "name.empty",
            Self::NameInvalidCharacter => "name.invalid_character",
            Self::NameTooLong => "name.too_long",
            Self::NameNotUnique => "name.not_unique",
            Self::NameNoDefault => "name.no_default",
            Self::ObjectNotFound => "object.not_found",
            Self::ObjectRemoved => "object.removed",
            Self::ObjectForeignDatabase => "object.foreign_database",
            Self::ObjectWrongParent => "object.wrong_parent",
            Self::ReferenceDependentExists => "reference.dependent_exists",
            Self::ReferenceRenameBlocked => "reference.rename_blocked",
            Self::SchemaDefaultRemoval => "schema.default_removal",
            Self::ColumnDefaultWithComputation => "column.default_with_computation",
            Self::ColumnDefaultReferencesColumn => "column.default_references_column",
            Self::ColumnComputationSelfReference => "column.computation_self_reference",
            Self::ColumnComputationCycle => "column.computation_cycle",
            Self::ExpressionForeignColumn => "expression.foreign_column",
            Self::ColumnNullableKey => "column.nullable_key",
            Self::ColumnTypeIncompatible => "column.type_incompatible",
            Self::IndexEmpty => "index.empty",
            Self::IndexDuplicateKey => "index.duplicate_key",
            Self::IndexVirtualUnique => "index.virtual_unique",
            Self::IndexVirtualPartial => "index.virtual_partial",
            Self::IndexPrimaryKey => "index.primary_key",
            Self::IndexForeignKeyTarget => "index.foreign_key_target",
            Self::PrimaryKeyExists => "primary_key.exists",
            Self::PrimaryKeyIndexNotUnique => "primary_key.index_not_unique",
            Self::PrimaryKeyIndexPartial => "primary_key.index_partial",
            Self::PrimaryKeyIndexVirtual => "primary_key.index_virtual",
            Self::PrimaryKeyNullableColumn => "primary_key.nullable_column",
            Self::ForeignKeyColumnCount => "foreign_key.column_count",
            Self::ForeignKeyColumnType => "foreign_key.column_type",
            Self::ForeignKeyTargetNotUnique => "foreign_key.target_not_unique",
            Self::ForeignKeyTargetPartial => "foreign_key.target_partial",
            Self::ForeignKeyTargetVirtual => "foreign_key.target_virtual",
            Self::ForeignKeyTargetNullable => "foreign_key.target_nullable",
            Self::ForeignKeySameIndex => "foreign_key.same_index",
            Self::ViewUnknownSource => "view.unknown_source",
            Self::ViewUnknownField => "view.unknown_field",
            Self::ViewCycle => "view.cycle",
        }
    }
}

impl fmt::Display for RuleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accumulates rule violations for one mutation.
pub(crate) struct Rules<'a> {
    pub(crate) graph: &'a ObjectGraph,
    registry: &'a dyn TypeRegistry,
    max_identifier_length: usize,
    violations: Vec<RuleViolation>,
}

impl<'a> Rules<'a> {
    pub(crate) fn new(
        graph: &'a ObjectGraph,
        registry: &'a dyn TypeRegistry,
        max_identifier_length: usize,
    ) -> Self {
        Self {
            graph,
            registry,
            max_identifier_length,
            violations: Vec::new(),
        }
    }

    pub(crate) fn fail(&mut self, code: RuleCode, message: impl Into<String>) {
        self.violations.push(RuleViolation {
            code,
            message: message.into(),
        });
    }

    pub(crate) fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    /// Turns the collected violations into a result.
    pub(crate) fn finish(self) -> Result<()> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                dialect: self.registry.dialect().to_string(),
                violations: self.violations,
            }
            .into())
        }
    }

    fn describe(&self, id: ObjectId) -> String {
        let object = self.graph.object(id);
        format!("{} '{}'", object.kind(), object.name())
    }

    /// The object belongs to this database and is not removed.
    pub(crate) fn live(&mut self, id: impl Into<ObjectId>) -> bool {
        let id = id.into();
        if !self.graph.owns(id) {
            self.fail(
                RuleCode::ObjectForeignDatabase,
                format!("object {id} belongs to another database"),
            );
            return false;
        }
        if self.graph.object(id).is_removed() {
            let message = format!("{} has been removed", self.describe(id));
            self.fail(RuleCode::ObjectRemoved, message);
            return false;
        }
        true
    }

    /// `id` is a live child of `parent`.
    pub(crate) fn owned_by(&mut self, id: impl Into<ObjectId>, parent: impl Into<ObjectId>) -> bool {
        let (id, parent) = (id.into(), parent.into());
        if !self.live(id) {
            return false;
        }
        if self.graph.parent(id) != Some(parent) {
            let message = format!(
                "{} does not belong to {}",
                self.describe(id),
                self.describe(parent)
            );
            self.fail(RuleCode::ObjectWrongParent, message);
            return false;
        }
        true
    }

    /// Identifier syntax.
    pub(crate) fn name_syntax(&mut self, name: &str) {
        if name.is_empty() {
            self.fail(RuleCode::NameEmpty, "name must not be empty");
            return;
        }
        let delimiters = self.registry.identifier_delimiters();
        if let Some(c) = name
            .chars()
            .find(|c| delimiters.contains(c) || c.is_control())
        {
            self.fail(
                RuleCode::NameInvalidCharacter,
                format!("name '{name}' contains the reserved character {c:?}"),
            );
        }
        let max = self.max_identifier_length;
        if name.chars().count() > max {
            self.fail(
                RuleCode::NameTooLong,
                format!("name '{name}' is longer than {max} characters"),
            );
        }
    }

    /// No other live object of the namespace uses `name`.
    pub(crate) fn unique_name(
        &mut self,
        scope: Option<ObjectId>,
        kind: ObjectKind,
        name: &str,
        except: Option<ObjectId>,
    ) {
        if let Some(existing) = self.graph.find(scope, kind, name) {
            if Some(existing) != except {
                let message = format!("{} already uses the name '{name}'", self.describe(existing));
                self.fail(RuleCode::NameNotUnique, message);
            }
        }
    }

    /// Name syntax plus uniqueness.
    pub(crate) fn name(
        &mut self,
        scope: Option<ObjectId>,
        kind: ObjectKind,
        name: &str,
        except: Option<ObjectId>,
    ) {
        self.name_syntax(name);
        if !name.is_empty() {
            self.unique_name(scope, kind, name, except);
        }
    }

    /// No live object outside `set` depends on a member of `set`.
    pub(crate) fn no_external_dependents(&mut self, set: &[ObjectId]) {
        for (target, dependent) in self.graph.external_dependents(set) {
            let message = format!(
                "{} is still referenced by {}",
                self.describe(target),
                self.describe(dependent.object)
            );
            self.fail(RuleCode::ReferenceDependentExists, message);
        }
    }

    /// Every column an expression reads is a live column of `table`.
    pub(crate) fn table_expression(&mut self, expr: &Expr, table: TableId, what: &str) {
        let mut refs = Vec::new();
        expr.visit_columns(&mut |c| refs.push(c.clone()));
        for column in refs {
            match column {
                ColumnRef::Column(id) => {
                    if self.live(id) && self.graph.parent(id.id()) != Some(table.id()) {
                        let message = format!(
                            "{what} of table '{}' references {} of another table",
                            self.graph.name(table.id()),
                            self.describe(id.id())
                        );
                        self.fail(RuleCode::ExpressionForeignColumn, message);
                    }
                }
                ColumnRef::ViewField { view, field } => {
                    self.fail(
                        RuleCode::ExpressionForeignColumn,
                        format!("{what} cannot reference field '{field}' of view {view}"),
                    );
                }
            }
        }
    }

    /// Default and computation of one column.
    pub(crate) fn column_values(
        &mut self,
        column: Option<ColumnId>,
        table: TableId,
        default: Option<&Expr>,
        computation: Option<&Expr>,
    ) {
        if default.is_some() && computation.is_some() {
            self.fail(
                RuleCode::ColumnDefaultWithComputation,
                "a column cannot have both a default value and a computation",
            );
        }
        if let Some(default) = default {
            if default.has_columns() {
                self.fail(
                    RuleCode::ColumnDefaultReferencesColumn,
                    "a default value cannot reference columns",
                );
            }
        }
        let Some(expression) = computation else {
            return;
        };
        self.table_expression(expression, table, "computation");
        let Some(column) = column else {
            return;
        };
        let direct = expression.referenced_columns();
        if direct.contains(&column) {
            self.fail(
                RuleCode::ColumnComputationSelfReference,
                format!("computed column '{}' references itself", self.graph.name(column.id())),
            );
        } else if self.computation_reaches(&direct, column) {
            self.fail(
                RuleCode::ColumnComputationCycle,
                format!(
                    "computation of '{}' forms a cycle through other computed columns",
                    self.graph.name(column.id())
                ),
            );
        }
    }

    fn computation_reaches(
        &self,
        start: &BTreeSet<ColumnId>,
        target: ColumnId,
    ) -> bool {
        let mut stack: Vec<ColumnId> = start.iter().copied().collect();
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) || !self.graph.is_live(current.id()) {
                continue;
            }
            if let Some(computation) = &self.graph.column_data(current).computation {
                stack.extend(computation.expression.referenced_columns());
            }
        }
        false
    }

    /// A new type must stay compatible with every foreign key partner.
    pub(crate) fn column_retype(&mut self, column: ColumnId, column_type: &ColumnType) {
        let graph = self.graph;
        for partner in graph.foreign_key_counterparts(column) {
            let other = &graph.column_data(partner).column_type;
            if !column_type.is_compatible_with(other) {
                let message = format!(
                    "column '{}' cannot become {column_type}: foreign key partner '{}' is {other}",
                    graph.name(column.id()),
                    graph.name(partner.id())
                );
                self.fail(RuleCode::ColumnTypeIncompatible, message);
            }
        }
    }

    /// Columns keyed by a primary key or a foreign key target must stay
    /// NOT NULL.
    pub(crate) fn column_nullable(&mut self, column: ColumnId) {
        let graph = self.graph;
        for key in graph.dependents(column.id()) {
            if key.source != ReferenceSource::IndexKey {
                continue;
            }
            let index = IndexId(key.object);
            let plain = graph
                .index_data(index)
                .keys
                .iter()
                .any(|k| k.column() == Some(column));
            if !plain {
                continue;
            }
            let what = if self.backs_primary_key(index) {
                "a primary key"
            } else if self.is_foreign_key_target(index) {
                "a referenced key"
            } else {
                continue;
            };
            let message = format!(
                "column '{}' belongs to {what} and cannot be nullable",
                graph.name(column.id())
            );
            self.fail(RuleCode::ColumnNullableKey, message);
        }
    }

    /// Keys of an index on `table`.
    pub(crate) fn index_keys(&mut self, table: TableId, keys: &[IndexKey]) {
        if keys.is_empty() {
            self.fail(RuleCode::IndexEmpty, "an index needs at least one key");
        }
        let mut seen = HashSet::new();
        for key in keys {
            match &key.target {
                IndexTarget::Column(column) => {
                    if self.owned_by(*column, table) && !seen.insert(*column) {
                        let message = format!(
                            "column '{}' appears twice in the index",
                            self.graph.name(column.id())
                        );
                        self.fail(RuleCode::IndexDuplicateKey, message);
                    }
                }
                IndexTarget::Expression(expr) => self.table_expression(expr, table, "index key"),
            }
        }
    }

    /// Unique, virtual and partial flags of an index.
    pub(crate) fn index_flags(&mut self, unique: bool, is_virtual: bool, partial: bool) {
        if is_virtual && unique {
            self.fail(
                RuleCode::IndexVirtualUnique,
                "a virtual index cannot enforce uniqueness",
            );
        }
        if is_virtual && partial {
            self.fail(RuleCode::IndexVirtualPartial, "a virtual index cannot be partial");
        }
    }

    /// Whether `index` currently backs a primary key.
    pub(crate) fn backs_primary_key(&self, index: IndexId) -> bool {
        self.graph.index_data(index).primary_key.is_some()
    }

    /// Whether a live foreign key references `index` as its target.
    pub(crate) fn is_foreign_key_target(&self, index: IndexId) -> bool {
        self.graph
            .dependents(index.id())
            .iter()
            .any(|r| r.source == ReferenceSource::ForeignKeyTarget)
    }

    /// An index may lose uniqueness, gain a filter or become virtual only
    /// if it neither backs a primary key nor is the target of a foreign key.
    pub(crate) fn index_not_key(&mut self, index: IndexId, change: &str) {
        let name = self.graph.name(index.id()).to_string();
        if self.backs_primary_key(index) {
            self.fail(
                RuleCode::IndexPrimaryKey,
                format!("index '{name}' backs a primary key and cannot {change}"),
            );
        }
        if self.is_foreign_key_target(index) {
            self.fail(
                RuleCode::IndexForeignKeyTarget,
                format!("index '{name}' is referenced by a foreign key and cannot {change}"),
            );
        }
    }

    /// An index may back a primary key.
    pub(crate) fn primary_key_index(&mut self, table: TableId, index: IndexId) {
        if !self.owned_by(index, table) {
            return;
        }
        let graph = self.graph;
        let data = graph.index_data(index);
        let name = graph.name(index.id()).to_string();
        if !data.unique {
            self.fail(
                RuleCode::PrimaryKeyIndexNotUnique,
                format!("primary key index '{name}' must be unique"),
            );
        }
        if data.filter.is_some() {
            self.fail(
                RuleCode::PrimaryKeyIndexPartial,
                format!("primary key index '{name}' cannot be partial"),
            );
        }
        if data.is_virtual {
            self.fail(
                RuleCode::PrimaryKeyIndexVirtual,
                format!("primary key index '{name}' cannot be virtual"),
            );
        }
        if data.primary_key.is_some() {
            self.fail(
                RuleCode::IndexPrimaryKey,
                format!("index '{name}' already backs a primary key"),
            );
        }
        let keys = data.keys.clone();
        self.key_columns_not_null(&keys, RuleCode::PrimaryKeyNullableColumn, "primary key");
    }

    pub(crate) fn key_columns_not_null(&mut self, keys: &[IndexKey], code: RuleCode, what: &str) {
        for column in keys.iter().filter_map(IndexKey::column) {
            if self.graph.is_live(column.id()) && self.graph.column_data(column).nullable {
                let message = format!(
                    "{what} column '{}' must not be nullable",
                    self.graph.name(column.id())
                );
                self.fail(code, message);
            }
        }
    }

    /// Origin and referenced index of a foreign key.
    pub(crate) fn foreign_key_pair(&mut self, origin: IndexId, referenced: IndexId) {
        let origin_live = self.live(origin);
        let referenced_live = self.live(referenced);
        if !origin_live || !referenced_live {
            return;
        }
        if origin == referenced {
            self.fail(
                RuleCode::ForeignKeySameIndex,
                "origin and referenced index must differ",
            );
        }
        let columns = self.graph.index_data(origin).key_columns();
        self.foreign_key_target(columns, referenced);
    }

    /// Referenced index of a foreign key over `origin` columns. `None`
    /// stands for an origin with expression keys.
    pub(crate) fn foreign_key_target(&mut self, origin: Option<Vec<ColumnId>>, referenced: IndexId) {
        let graph = self.graph;
        let target = graph.index_data(referenced);
        let target_name = graph.name(referenced.id()).to_string();
        if !target.unique {
            self.fail(
                RuleCode::ForeignKeyTargetNotUnique,
                format!("referenced index '{target_name}' is not unique"),
            );
        }
        if target.filter.is_some() {
            self.fail(
                RuleCode::ForeignKeyTargetPartial,
                format!("referenced index '{target_name}' is partial"),
            );
        }
        if target.is_virtual {
            self.fail(
                RuleCode::ForeignKeyTargetVirtual,
                format!("referenced index '{target_name}' is virtual"),
            );
        }
        self.key_columns_not_null(&target.keys, RuleCode::ForeignKeyTargetNullable, "referenced");

        match (origin, target.key_columns()) {
            (Some(from), Some(to)) if from.len() == to.len() => {
                for (a, b) in from.into_iter().zip(to) {
                    self.column_pair(a, b);
                }
            }
            (Some(from), Some(to)) => self.fail(
                RuleCode::ForeignKeyColumnCount,
                format!(
                    "origin has {} columns but the referenced index has {}",
                    from.len(),
                    to.len()
                ),
            ),
            _ => self.fail(
                RuleCode::ForeignKeyColumnCount,
                "foreign key indexes must consist of plain columns",
            ),
        }
    }

    fn column_pair(&mut self, origin: ColumnId, referenced: ColumnId) {
        let graph = self.graph;
        let a = &graph.column_data(origin).column_type;
        let b = &graph.column_data(referenced).column_type;
        if !a.is_compatible_with(b) {
            let message = format!(
                "column '{}' ({a}) is not compatible with '{}' ({b})",
                graph.name(origin.id()),
                graph.name(referenced.id())
            );
            self.fail(RuleCode::ForeignKeyColumnType, message);
        }
    }

    /// Sources, columns and fields a view query reads.
    pub(crate) fn view_query(&mut self, view: Option<ViewId>, query: &ViewQuery) {
        for source in &query.from {
            let known = self.graph.owns(*source)
                && matches!(self.graph.kind(*source), ObjectKind::Table | ObjectKind::View);
            if !known {
                self.fail(
                    RuleCode::ViewUnknownSource,
                    format!("view source {source} is not a table or view of this database"),
                );
            } else if self.live(*source) && Some(*source) == view.map(ViewId::id) {
                self.fail(RuleCode::ViewCycle, "a view cannot select from itself");
            }
        }
        let mut refs = Vec::new();
        query.visit_columns(&mut |c| refs.push(c.clone()));
        for column in refs {
            match column {
                ColumnRef::Column(id) => {
                    self.live(id);
                }
                ColumnRef::ViewField { view: source, field } => {
                    if !self.live(source) {
                        continue;
                    }
                    if !self.graph.view_fields(source).contains(&field) {
                        let message =
                            format!("{} has no field '{field}'", self.describe(source.id()));
                        self.fail(RuleCode::ViewUnknownField, message);
                    }
                }
            }
        }
        if let Some(view) = view {
            if self.view_reaches(query, view) {
                self.fail(
                    RuleCode::ViewCycle,
                    format!("{} would depend on itself", self.describe(view.id())),
                );
            }
        }
    }

    /// Views built on `view` only read fields that `fields` still exposes.
    pub(crate) fn view_fields_kept(&mut self, view: ViewId, fields: &[String]) {
        let graph = self.graph;
        for dependent in graph.dependents(view.id()) {
            if dependent.source != ReferenceSource::ViewSource {
                continue;
            }
            let reader = ViewId(dependent.object);
            for field in graph.fields_read(reader, view) {
                if !fields.contains(&field) {
                    let message = format!(
                        "{} reads field '{field}' of {}",
                        self.describe(reader.id()),
                        self.describe(view.id())
                    );
                    self.fail(RuleCode::ReferenceDependentExists, message);
                }
            }
        }
    }

    /// A column rename must not break expressions that cannot follow it,
    /// nor view fields other views read by name.
    pub(crate) fn column_rename(&mut self, column: ColumnId) {
        let graph = self.graph;
        for dependent in graph.dependents(column.id()) {
            match dependent.source {
                ReferenceSource::Computation
                | ReferenceSource::CheckCondition
                | ReferenceSource::IndexFilter => {
                    let message = format!(
                        "{} is referenced by {}",
                        self.describe(column.id()),
                        self.describe(dependent.object)
                    );
                    self.fail(RuleCode::ReferenceRenameBlocked, message);
                }
                ReferenceSource::ViewSource => {
                    let view = ViewId(dependent.object);
                    let old = graph.name(column.id());
                    let exposed = graph.view_data(view).source.columns.iter().any(|p| {
                        p.alias.is_none() && p.expr == Expr::Column(ColumnRef::Column(column))
                    });
                    if !exposed {
                        continue;
                    }
                    for reader in graph.dependents(view.id()) {
                        let reads = reader.source == ReferenceSource::ViewSource
                            && graph.fields_read(ViewId(reader.object), view).contains(old);
                        if reads {
                            let message = format!(
                                "field '{old}' of {} is read by {}",
                                self.describe(view.id()),
                                self.describe(reader.object)
                            );
                            self.fail(RuleCode::ReferenceRenameBlocked, message);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn view_reaches(&self, query: &ViewQuery, target: ViewId) -> bool {
        let mut stack = self.graph.query_views(query);
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current) || !self.graph.is_live(current.id()) {
                continue;
            }
            stack.extend(self.graph.query_views(&self.graph.view_data(current).source));
        }
        false
    }
}

impl ObjectGraph {
    /// Output field names of a view, in projection order.
    #[must_use]
    pub fn view_fields(&self, view: ViewId) -> Vec<String> {
        self.query_fields(&self.view_data(view).source)
    }

    /// Output field names a query would expose.
    #[must_use]
    pub fn query_fields(&self, query: &ViewQuery) -> Vec<String> {
        query
            .columns
            .iter()
            .enumerate()
            .map(|(position, projection)| match (&projection.alias, &projection.expr) {
                (Some(alias), _) => alias.clone(),
                (None, Expr::Column(ColumnRef::Column(id))) => self.name(id.id()).to_string(),
                (None, Expr::Column(ColumnRef::ViewField { field, .. })) => field.clone(),
                (None, _) => format!("expr{}", position + 1),
            })
            .collect()
    }

    /// Fields of `view` that `reader` refers to by name.
    #[must_use]
    pub fn fields_read(&self, reader: ViewId, view: ViewId) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        self.view_data(reader).source.visit_columns(&mut |c| {
            if let ColumnRef::ViewField { view: source, field } = c {
                if *source == view {
                    fields.insert(field.clone());
                }
            }
        });
        fields
    }

    /// Views a query reads, through its sources or field references.
    #[must_use]
    pub fn query_views(&self, query: &ViewQuery) -> Vec<ViewId> {
        let mut views: Vec<ViewId> = query
            .from
            .iter()
            .filter(|source| self.owns(**source))
            .filter(|source| matches!(self.object(**source).data, ObjectData::View(_)))
            .map(|source| ViewId(*source))
            .collect();
        for view in query.referenced_views() {
            if !views.contains(&view) {
                views.push(view);
            }
        }
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_dotted_lowercase() {
        for code in [
            RuleCode::NameNotUnique,
            RuleCode::ReferenceDependentExists,
            RuleCode::ForeignKeyTargetNullable,
            RuleCode::ViewCycle,
        ] {
            let text = code.as_str();
            assert!(text.contains('.'), "{text}");
            assert_eq!(text, text.to_lowercase());
        }
    }
}
