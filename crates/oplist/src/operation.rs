#![forbid(unsafe_code)]

//! Operation records stored in the history timeline.
//!
//! An [`Operation`] describes one mutation of one object: what happened
//! ([`OperationKind`]), how it groups with its neighbours ([`ChainRole`]),
//! which object it touched and where, and which pool slots hold the state
//! needed to revert or replay it.
//!
//! # Invariants
//!
//! - `snapshot` is `Some` for `Modified`, `Removed` and `Moved`, `None` for
//!   `Created` (there is no prior state to restore).
//! - `parked` is `Some` exactly while a `Created`, `Modified` or `Moved`
//!   record is undone. It holds the live state displaced by the undo.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object::{ObjectId, ObjectType, Placement};
use crate::pool::PoolIndex;

/// Kind of mutation an operation records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// The object's state was changed in place.
    Modified,
    /// The object was added to the model.
    Created,
    /// The object was removed from the model.
    Removed,
    /// Same restoration as `Modified`, but relationships are not revalidated.
    /// Meant for position changes of graphical objects.
    Moved,
}

impl OperationKind {
    /// Whether the record keeps a pre-mutation snapshot.
    #[must_use]
    pub const fn has_snapshot(self) -> bool {
        !matches!(self, Self::Created)
    }

    /// Whether replaying this kind requires relationship revalidation.
    #[must_use]
    pub const fn needs_revalidation(self) -> bool {
        !matches!(self, Self::Moved)
    }

    /// Short name for logs and history display.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Modified => "modified",
            Self::Created => "created",
            Self::Removed => "removed",
            Self::Moved => "moved",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an operation inside a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainRole {
    /// Not part of a chain.
    #[default]
    None,
    /// First operation of a chain.
    ChainStart,
    /// Interior operation of a chain.
    ChainMiddle,
    /// Last operation of a chain.
    ChainEnd,
}

impl ChainRole {
    #[must_use]
    pub const fn is_chained(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Role of the last record of a chain once the chain is closed.
    ///
    /// A middle record becomes the end; a lone start is just an operation.
    #[must_use]
    pub const fn closed(self) -> Self {
        match self {
            Self::ChainMiddle => Self::ChainEnd,
            Self::ChainStart => Self::None,
            role => role,
        }
    }
}

/// One recorded, reversible mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub(crate) kind: OperationKind,
    pub(crate) chain_role: ChainRole,
    pub(crate) object_id: ObjectId,
    pub(crate) placement: Placement,
    pub(crate) snapshot: Option<PoolIndex>,
    pub(crate) parked: Option<PoolIndex>,
    pub(crate) definition: Option<String>,
}

impl Operation {
    pub(crate) fn new(
        kind: OperationKind,
        object_id: ObjectId,
        placement: Placement,
        snapshot: Option<PoolIndex>,
        definition: Option<String>,
    ) -> Self {
        Self {
            kind,
            chain_role: ChainRole::None,
            object_id,
            placement,
            snapshot,
            parked: None,
            definition,
        }
    }

    #[must_use]
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    #[must_use]
    pub fn chain_role(&self) -> ChainRole {
        self.chain_role
    }

    #[must_use]
    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    #[must_use]
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Pool slot holding the pre-mutation state.
    #[must_use]
    pub fn snapshot(&self) -> Option<PoolIndex> {
        self.snapshot
    }

    /// Serialized definition captured for dependent objects.
    #[must_use]
    pub fn definition(&self) -> Option<&str> {
        self.definition.as_deref()
    }

    /// Pool slots this record keeps alive.
    pub(crate) fn pool_slots(&self) -> impl Iterator<Item = PoolIndex> + use<> {
        self.snapshot.into_iter().chain(self.parked)
    }
}

/// History entry as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub kind: OperationKind,
    pub chain_role: ChainRole,
    pub object_name: String,
    pub object_type: ObjectType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_has_no_snapshot() {
        assert!(!OperationKind::Created.has_snapshot());
        assert!(OperationKind::Modified.has_snapshot());
        assert!(OperationKind::Removed.has_snapshot());
        assert!(OperationKind::Moved.has_snapshot());
    }

    #[test]
    fn moved_skips_revalidation() {
        assert!(!OperationKind::Moved.needs_revalidation());
        assert!(OperationKind::Modified.needs_revalidation());
        assert!(OperationKind::Created.needs_revalidation());
    }

    #[test]
    fn new_operation_is_unchained_and_not_parked() {
        let op = Operation::new(
            OperationKind::Created,
            ObjectId::new(3),
            Placement::root(),
            None,
            None,
        );
        assert_eq!(op.chain_role(), ChainRole::None);
        assert_eq!(op.pool_slots().count(), 0);
        assert!(op.definition().is_none());
    }

    #[test]
    fn info_serializes_snake_case() {
        let info = OperationInfo {
            kind: OperationKind::Moved,
            chain_role: ChainRole::ChainEnd,
            object_name: "orders".into(),
            object_type: ObjectType::Table,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"moved\""));
        assert!(json.contains("\"chain_end\""));
        assert!(json.contains("\"table\""));
    }
}
