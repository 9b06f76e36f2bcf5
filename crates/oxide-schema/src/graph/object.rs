//! Object payloads.
//!
//! Every object is a shared [`ObjectCore`] plus a kind-specific
//! [`ObjectData`]. The data part holds exactly the properties that the
//! change tracker compares; child lists and reference edges live in the
//! core.

use serde::{Deserialize, Serialize};

use super::ids::{ColumnId, IndexId, ObjectId, ObjectKind, PrimaryKeyId};
use crate::expr::{ColumnRef, Expr, ViewQuery};
use crate::types::ColumnType;

/// Which property of a dependent object created a reference edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSource {
    /// A computed column's expression.
    Computation,
    /// A check constraint's condition.
    CheckCondition,
    /// An index key (column or expression).
    IndexKey,
    /// A partial index filter.
    IndexFilter,
    /// The index backing a primary key.
    PrimaryKeyIndex,
    /// The origin index of a foreign key.
    ForeignKeyOrigin,
    /// The referenced index of a foreign key.
    ForeignKeyTarget,
    /// A view's source query.
    ViewSource,
}

/// One reference edge as seen from one of its endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    /// The object at the other end.
    pub object: ObjectId,
    /// The property that created the edge.
    pub source: ReferenceSource,
}

/// State shared by every object kind.
#[derive(Debug, Clone)]
pub struct ObjectCore {
    pub(crate) name: String,
    /// Owning schema for tables and views, owning table for columns and
    /// constraints, `None` for schemas.
    pub(crate) parent: Option<ObjectId>,
    pub(crate) removed: bool,
    /// Live children in creation order.
    pub(crate) children: Vec<ObjectId>,
    /// Edges to objects this one depends on.
    pub(crate) referenced: Vec<Reference>,
    /// Edges from objects that depend on this one.
    pub(crate) referencing: Vec<Reference>,
    /// Last ordinal handed out to a check of this table.
    pub(crate) check_counter: u32,
}

impl ObjectCore {
    pub(crate) fn new(name: String, parent: Option<ObjectId>) -> Self {
        Self {
            name,
            parent,
            removed: false,
            children: Vec::new(),
            referenced: Vec::new(),
            referencing: Vec::new(),
            check_counter: 0,
        }
    }

    /// Current name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning object.
    #[must_use]
    pub const fn parent(&self) -> Option<ObjectId> {
        self.parent
    }

    /// Whether the object has been removed.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    /// Live children in creation order.
    #[must_use]
    pub fn children(&self) -> &[ObjectId] {
        &self.children
    }

    /// Objects this one depends on.
    #[must_use]
    pub fn referenced(&self) -> &[Reference] {
        &self.referenced
    }

    /// Objects depending on this one.
    #[must_use]
    pub fn referencing(&self) -> &[Reference] {
        &self.referencing
    }
}

/// Schema properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaData {
    /// Whether this is the database's default schema.
    pub is_default: bool,
}

/// How a computed column is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputationStorage {
    /// Evaluated on read.
    Virtual,
    /// Materialized on write.
    Stored,
}

/// Expression of a computed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Computation<C = ColumnRef> {
    /// The expression, over columns of the same table.
    pub expression: Expr<C>,
    /// Storage mode.
    pub storage: ComputationStorage,
}

impl Computation {
    /// A computed column evaluated on read.
    #[must_use]
    pub const fn virtual_column(expression: Expr) -> Self {
        Self {
            expression,
            storage: ComputationStorage::Virtual,
        }
    }

    /// A computed column materialized on write.
    #[must_use]
    pub const fn stored(expression: Expr) -> Self {
        Self {
            expression,
            storage: ComputationStorage::Stored,
        }
    }
}

/// Column properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnData {
    /// Dialect type.
    pub column_type: ColumnType,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value expression.
    pub default: Option<Expr>,
    /// Computation for generated columns.
    pub computation: Option<Computation>,
}

/// Sort direction of an index key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// The single letter used in default index names.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Ascending => 'A',
            Self::Descending => 'D',
        }
    }
}

/// What an index key orders by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexTarget {
    /// A column of the indexed table.
    Column(ColumnId),
    /// An expression over columns of the indexed table.
    Expression(Expr),
}

/// One key of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexKey {
    /// Key target.
    pub target: IndexTarget,
    /// Sort direction.
    pub order: SortOrder,
}

impl IndexKey {
    /// An ascending column key.
    #[must_use]
    pub const fn asc(column: ColumnId) -> Self {
        Self {
            target: IndexTarget::Column(column),
            order: SortOrder::Ascending,
        }
    }

    /// A descending column key.
    #[must_use]
    pub const fn desc(column: ColumnId) -> Self {
        Self {
            target: IndexTarget::Column(column),
            order: SortOrder::Descending,
        }
    }

    /// An expression key.
    #[must_use]
    pub const fn expression(expr: Expr, order: SortOrder) -> Self {
        Self {
            target: IndexTarget::Expression(expr),
            order,
        }
    }

    /// Column the key orders by, when it is a plain column key.
    #[must_use]
    pub const fn column(&self) -> Option<ColumnId> {
        match &self.target {
            IndexTarget::Column(id) => Some(*id),
            IndexTarget::Expression(_) => None,
        }
    }
}

/// Index properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexData {
    /// Ordered keys.
    pub keys: Vec<IndexKey>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Metadata-only index, never created physically.
    pub is_virtual: bool,
    /// Partial index condition.
    pub filter: Option<Expr>,
    /// Primary key this index backs.
    pub primary_key: Option<PrimaryKeyId>,
}

impl IndexData {
    /// Plain column keys, in order. `None` if any key is an expression.
    #[must_use]
    pub fn key_columns(&self) -> Option<Vec<ColumnId>> {
        self.keys.iter().map(IndexKey::column).collect()
    }

    /// Whether the index is created by `CREATE INDEX`/`ADD INDEX` rather
    /// than through a primary key, or not at all.
    #[must_use]
    pub const fn is_physical(&self) -> bool {
        !self.is_virtual && self.primary_key.is_none()
    }
}

/// Primary key properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyData {
    /// The backing unique index.
    pub index: IndexId,
}

/// Foreign key action on delete or update of the referenced row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Foreign key properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyData {
    /// Index over the referencing columns.
    pub origin: IndexId,
    /// Unique index over the referenced columns.
    pub referenced: IndexId,
    /// Action on delete.
    pub on_delete: ReferentialAction,
    /// Action on update.
    pub on_update: ReferentialAction,
}

/// Check constraint properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckData {
    /// Boolean condition over the table's columns.
    pub condition: Expr,
    /// Counter value for ordinal default names, `None` for digest names.
    pub ordinal: Option<u32>,
}

/// View properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewData {
    /// Defining query.
    pub source: ViewQuery,
}

/// Kind-specific payload of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectData {
    Schema(SchemaData),
    Table,
    Column(ColumnData),
    Index(IndexData),
    PrimaryKey(PrimaryKeyData),
    ForeignKey(ForeignKeyData),
    Check(CheckData),
    View(ViewData),
}

impl ObjectData {
    /// The kind of object this payload belongs to.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Schema(_) => ObjectKind::Schema,
            Self::Table => ObjectKind::Table,
            Self::Column(_) => ObjectKind::Column,
            Self::Index(_) => ObjectKind::Index,
            Self::PrimaryKey(_) => ObjectKind::PrimaryKey,
            Self::ForeignKey(_) => ObjectKind::ForeignKey,
            Self::Check(_) => ObjectKind::Check,
            Self::View(_) => ObjectKind::View,
        }
    }

    /// Column payload, if this is a column.
    #[must_use]
    pub const fn as_column(&self) -> Option<&ColumnData> {
        match self {
            Self::Column(data) => Some(data),
            _ => None,
        }
    }

    /// Index payload, if this is an index.
    #[must_use]
    pub const fn as_index(&self) -> Option<&IndexData> {
        match self {
            Self::Index(data) => Some(data),
            _ => None,
        }
    }

    /// Primary key payload, if this is a primary key.
    #[must_use]
    pub const fn as_primary_key(&self) -> Option<&PrimaryKeyData> {
        match self {
            Self::PrimaryKey(data) => Some(data),
            _ => None,
        }
    }

    /// Foreign key payload, if this is a foreign key.
    #[must_use]
    pub const fn as_foreign_key(&self) -> Option<&ForeignKeyData> {
        match self {
            Self::ForeignKey(data) => Some(data),
            _ => None,
        }
    }

    /// Check payload, if this is a check.
    #[must_use]
    pub const fn as_check(&self) -> Option<&CheckData> {
        match self {
            Self::Check(data) => Some(data),
            _ => None,
        }
    }

    /// View payload, if this is a view.
    #[must_use]
    pub const fn as_view(&self) -> Option<&ViewData> {
        match self {
            Self::View(data) => Some(data),
            _ => None,
        }
    }
}

/// An object of the graph.
#[derive(Debug, Clone)]
pub struct SchemaObject {
    pub(crate) core: ObjectCore,
    pub(crate) data: ObjectData,
}

impl SchemaObject {
    /// Shared state.
    #[must_use]
    pub const fn core(&self) -> &ObjectCore {
        &self.core
    }

    /// Kind-specific properties.
    #[must_use]
    pub const fn data(&self) -> &ObjectData {
        &self.data
    }

    /// Object kind.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.data.kind()
    }

    /// Current name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// Whether the object has been removed.
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.core.removed
    }
}

/// The comparable state of an object: everything the change tracker diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectState {
    /// Name.
    pub name: String,
    /// Owning object.
    pub parent: Option<ObjectId>,
    /// Removed flag.
    pub removed: bool,
    /// Properties.
    pub data: ObjectData,
}

impl ObjectState {
    /// Object kind.
    #[must_use]
    pub const fn kind(&self) -> ObjectKind {
        self.data.kind()
    }
}
