#![forbid(unsafe_code)]

//! Collaborator contracts between the operation list and the host model.
//!
//! The operation list never owns the semantics of the schema objects it
//! records. It talks to them through two traits:
//!
//! - [`ModelObject`]: a single domain object (table, column, constraint, ...)
//!   that can be deep-cloned into the snapshot pool and overwritten in place
//!   from a snapshot.
//! - [`ObjectModel`]: the container that owns live objects and knows how to
//!   insert and remove them, either at the model root or at an index inside
//!   a parent object.
//!
//! Objects are addressed by [`ObjectId`] instead of references, so records
//! never hold borrows into the model and no container/child cycles exist.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable identity of a domain object inside one model.
///
/// Snapshots carry the same id as the live object they were taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

impl ObjectId {
    /// Create a new object ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type tag of a schema object.
///
/// Used for history display and as the icon hint of progress notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Database,
    Schema,
    Table,
    View,
    Column,
    Constraint,
    Index,
    Trigger,
    Rule,
    Sequence,
    Function,
    Type,
    Domain,
    Role,
    Tablespace,
    Relationship,
    Textbox,
}

impl ObjectType {
    /// Short name, also used as the icon identifier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Table => "table",
            Self::View => "view",
            Self::Column => "column",
            Self::Constraint => "constraint",
            Self::Index => "index",
            Self::Trigger => "trigger",
            Self::Rule => "rule",
            Self::Sequence => "sequence",
            Self::Function => "function",
            Self::Type => "type",
            Self::Domain => "domain",
            Self::Role => "role",
            Self::Tablespace => "tablespace",
            Self::Relationship => "relationship",
            Self::Textbox => "textbox",
        }
    }

    /// Whether objects of this type live at an index inside a parent table.
    #[must_use]
    pub const fn is_table_object(self) -> bool {
        matches!(
            self,
            Self::Column | Self::Constraint | Self::Index | Self::Trigger | Self::Rule
        )
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an object sits in the model.
///
/// `parent` is set only for positional children (columns, constraints,
/// indexes, rules, triggers). Top-level objects live directly in the model.
/// `index` is `None` when the position is irrelevant or unknown, in which
/// case insertion appends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Placement {
    pub parent: Option<ObjectId>,
    pub index: Option<usize>,
}

impl Placement {
    /// Top-level object, appended on insertion.
    #[must_use]
    pub const fn root() -> Self {
        Self {
            parent: None,
            index: None,
        }
    }

    /// Top-level object at a fixed position.
    #[must_use]
    pub const fn root_at(index: usize) -> Self {
        Self {
            parent: None,
            index: Some(index),
        }
    }

    /// Child of `parent` at `index`.
    #[must_use]
    pub const fn child(parent: ObjectId, index: usize) -> Self {
        Self {
            parent: Some(parent),
            index: Some(index),
        }
    }

    /// Child of `parent`, appended on insertion.
    #[must_use]
    pub const fn child_of(parent: ObjectId) -> Self {
        Self {
            parent: Some(parent),
            index: None,
        }
    }
}

/// Errors reported by an [`ObjectModel`] when a structural change is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("object {0} not found in model")]
    NotFound(ObjectId),

    #[error("parent object {0} not found in model")]
    ParentNotFound(ObjectId),

    #[error("object {0} already present in model")]
    Duplicate(ObjectId),

    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("object {0} must be placed inside a table")]
    MissingParent(ObjectId),

    #[error("object {0} still owns child objects")]
    HasChildren(ObjectId),

    #[error("invalid object definition: {0}")]
    InvalidDefinition(String),
}

/// A domain object that can be recorded by the operation list.
///
/// `Clone` must produce a deep, type-correct copy: the clone is what lands in
/// the snapshot pool. `PartialEq` lets the pool share one snapshot between
/// records of an unchanged object.
pub trait ModelObject: Clone + PartialEq {
    /// Identity of the object. Must be preserved by `clone` and `assign_from`.
    fn id(&self) -> ObjectId;

    /// Display name for history and progress notifications.
    fn name(&self) -> &str;

    /// Type tag of the object.
    fn object_type(&self) -> ObjectType;

    /// Overwrite this object's state from `source` without replacing identity.
    fn assign_from(&mut self, source: &Self) {
        self.clone_from(source);
    }

    /// Serialized definition for dependent objects that reference columns
    /// injected by a relationship. Such objects are regenerated from this
    /// definition on restore instead of being cloned from the snapshot.
    fn dependent_definition(&self) -> Option<String> {
        None
    }
}

/// The live model an operation list is bound to.
pub trait ObjectModel {
    type Object: ModelObject;

    /// Look up a live object.
    fn object(&self, id: ObjectId) -> Option<&Self::Object>;

    /// Look up a live object for in-place modification.
    fn object_mut(&mut self, id: ObjectId) -> Option<&mut Self::Object>;

    /// Current index of `id` under `parent` (or among top-level objects).
    fn object_index(&self, id: ObjectId, parent: Option<ObjectId>) -> Option<usize>;

    /// Insert `object` at `placement`.
    fn insert_object(&mut self, object: Self::Object, placement: Placement)
    -> Result<(), ModelError>;

    /// Detach `id` from `parent` (or from the model root) and hand it back.
    fn remove_object(
        &mut self,
        id: ObjectId,
        parent: Option<ObjectId>,
    ) -> Result<Self::Object, ModelError>;

    /// Rebuild a dependent object from its serialized definition.
    ///
    /// `snapshot` is the pooled copy the definition was captured with. The
    /// default ignores the definition and returns a clone of the snapshot.
    fn regenerate_object(
        &mut self,
        _definition: &str,
        snapshot: &Self::Object,
    ) -> Result<Self::Object, ModelError> {
        Ok(snapshot.clone())
    }
}
