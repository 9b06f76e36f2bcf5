//! Stable object identities.
//!
//! Every object lives in an arena slot of the database that created it. An
//! [`ObjectId`] never changes across renames or removal, so reference edges
//! keyed by it survive both.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

static NEXT_DATABASE: AtomicU32 = AtomicU32::new(1);

/// Allocates a tag that distinguishes handles of different databases.
pub(crate) fn next_database_tag() -> u32 {
    NEXT_DATABASE.fetch_add(1, Ordering::Relaxed)
}

/// Identity of any schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId {
    database: u32,
    slot: u32,
}

impl ObjectId {
    pub(crate) const fn new(database: u32, slot: u32) -> Self {
        Self { database, slot }
    }

    /// Tag of the database that owns this object.
    #[must_use]
    pub const fn database(self) -> u32 {
        self.database
    }

    /// Arena slot.
    #[must_use]
    pub const fn slot(self) -> usize {
        self.slot as usize
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.slot)
    }
}

/// The kind of a schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// A schema (object container).
    Schema,
    /// A table.
    Table,
    /// A table column.
    Column,
    /// An index.
    Index,
    /// A primary key constraint.
    PrimaryKey,
    /// A foreign key constraint.
    ForeignKey,
    /// A check constraint.
    Check,
    /// A view.
    View,
}

impl ObjectKind {
    /// Returns the lowercase kind name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Column => "column",
            Self::Index => "index",
            Self::PrimaryKey => "primary key",
            Self::ForeignKey => "foreign key",
            Self::Check => "check",
            Self::View => "view",
        }
    }

    /// Whether objects of this kind live in the per-schema constraint
    /// namespace.
    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self, Self::PrimaryKey | Self::ForeignKey | Self::Check)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

mod sealed {
    pub trait Sealed {
        fn wrap(id: super::ObjectId) -> Self;
    }
}

/// A handle type bound to one object kind.
pub trait TypedId: sealed::Sealed + Copy + Into<ObjectId> {
    /// The kind every handle of this type refers to.
    const KIND: ObjectKind;
}

pub(crate) fn wrap<T: TypedId>(id: ObjectId) -> T {
    T::wrap(id)
}

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub(crate) ObjectId);

        impl $name {
            /// The kind every handle of this type refers to.
            pub const KIND: ObjectKind = ObjectKind::$kind;

            /// Returns the untyped identity.
            #[must_use]
            pub const fn id(self) -> ObjectId {
                self.0
            }
        }

        impl sealed::Sealed for $name {
            fn wrap(id: ObjectId) -> Self {
                Self(id)
            }
        }

        impl TypedId for $name {
            const KIND: ObjectKind = ObjectKind::$kind;
        }

        impl From<$name> for ObjectId {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", ObjectKind::$kind, self.0)
            }
        }
    };
}

typed_id!(
    /// Handle to a schema.
    SchemaId => Schema
);
typed_id!(
    /// Handle to a table.
    TableId => Table
);
typed_id!(
    /// Handle to a column.
    ColumnId => Column
);
typed_id!(
    /// Handle to an index.
    IndexId => Index
);
typed_id!(
    /// Handle to a primary key.
    PrimaryKeyId => PrimaryKey
);
typed_id!(
    /// Handle to a foreign key.
    ForeignKeyId => ForeignKey
);
typed_id!(
    /// Handle to a check constraint.
    CheckId => Check
);
typed_id!(
    /// Handle to a view.
    ViewId => View
);
