#![forbid(unsafe_code)]

//! Operation chain bookkeeping.
//!
//! A chain is a contiguous run of operations undone and redone as one unit.
//! The [`ChainCoordinator`] decides which [`ChainRole`] the next registered
//! operation receives; [`chain_bounds`] recovers the extent of a chain from
//! the roles stored in the timeline.
//!
//! ```text
//! start()  register  register  register  finish()
//!   │        Start     Middle    Middle  ─► last Middle becomes End
//!   ▼
//! next_role: Start ─► Middle ──────────────► None
//! ```
//!
//! While the ignore flag is set, registrations are stamped `None` and
//! `finish` does nothing. Callers must clear the flag before finishing or
//! the chain stays open.

use std::ops::Range;

use crate::operation::{ChainRole, Operation};

/// Chain state owned by one operation list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainCoordinator {
    next_role: ChainRole,
    ignore: bool,
}

impl ChainCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Role the next stamped operation will receive.
    #[must_use]
    pub fn next_role(&self) -> ChainRole {
        self.next_role
    }

    #[must_use]
    pub fn is_ignoring(&self) -> bool {
        self.ignore
    }

    /// A chain has been started and not finished yet.
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self.next_role, ChainRole::ChainStart | ChainRole::ChainMiddle)
    }

    /// At least one operation of the open chain has been stamped.
    #[must_use]
    pub fn has_stamped(&self) -> bool {
        self.next_role == ChainRole::ChainMiddle
    }

    /// Open a new chain. The caller finishes any open chain first.
    pub fn start(&mut self) {
        self.next_role = ChainRole::ChainStart;
    }

    /// Role for an operation being registered now.
    pub fn stamp(&mut self) -> ChainRole {
        if self.ignore {
            return ChainRole::None;
        }
        let role = self.next_role;
        if role == ChainRole::ChainStart {
            self.next_role = ChainRole::ChainMiddle;
        }
        role
    }

    /// Close the open chain.
    ///
    /// Returns `true` when operations were stamped since the chain started,
    /// meaning the last of them must be rewritten as the chain end. Returns
    /// `false` (and changes nothing) while the ignore flag is set.
    pub fn finish(&mut self) -> bool {
        if self.ignore {
            return false;
        }
        let stamped = self.has_stamped();
        self.next_role = ChainRole::None;
        stamped
    }

    pub fn set_ignore(&mut self, ignore: bool) {
        self.ignore = ignore;
    }

    /// Rewind an open chain whose stamped operations were all discarded.
    pub fn rewind(&mut self) {
        if self.has_stamped() {
            self.next_role = ChainRole::ChainStart;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Extent of the chain containing `index`.
///
/// An unchained operation is its own unit. A `ChainStart` extends forward to
/// the next `ChainEnd` (or the end of the timeline for an open chain), a
/// `ChainEnd` backward to its `ChainStart`, a `ChainMiddle` both ways.
/// Unchained operations lying between the bounds belong to the unit.
#[must_use]
pub fn chain_bounds(operations: &[Operation], index: usize) -> Range<usize> {
    let Some(op) = operations.get(index) else {
        return index..index;
    };
    let start = match op.chain_role {
        ChainRole::None => return index..index + 1,
        ChainRole::ChainStart => index,
        ChainRole::ChainMiddle | ChainRole::ChainEnd => operations[..index]
            .iter()
            .rposition(|op| op.chain_role == ChainRole::ChainStart)
            .unwrap_or(0),
    };
    let end = match op.chain_role {
        ChainRole::ChainEnd => index + 1,
        _ => operations[index + 1..]
            .iter()
            .position(|op| op.chain_role == ChainRole::ChainEnd)
            .map_or(operations.len(), |offset| index + 1 + offset + 1),
    };
    start..end
}

/// Index of the newest chained operation if its chain is still open.
///
/// A `ChainEnd` as the newest chained operation means every chain in the
/// timeline is closed.
#[must_use]
pub fn open_chain_tail(operations: &[Operation]) -> Option<usize> {
    let index = operations
        .iter()
        .rposition(|op| op.chain_role.is_chained())?;
    match operations[index].chain_role {
        ChainRole::ChainStart | ChainRole::ChainMiddle => Some(index),
        _ => None,
    }
}

/// Index of the last record kept when the timeline is truncated at `cut`,
/// if that truncation splits a closed chain.
///
/// The returned record must be closed so the kept part stays a chain of its
/// own. A cut through the open chain returns `None`: finishing it closes it.
#[must_use]
pub fn cut_chain_tail(operations: &[Operation], cut: usize) -> Option<usize> {
    let kept = operations.get(..cut)?;
    let index = kept.iter().rposition(|op| op.chain_role.is_chained())?;
    if !matches!(
        kept[index].chain_role,
        ChainRole::ChainStart | ChainRole::ChainMiddle
    ) {
        return None;
    }
    let bounds = chain_bounds(operations, index);
    let closed = bounds.end > cut
        && operations[bounds.end - 1].chain_role == ChainRole::ChainEnd;
    closed.then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectId, Placement};
    use crate::operation::OperationKind;

    fn ops(roles: &[ChainRole]) -> Vec<Operation> {
        roles
            .iter()
            .enumerate()
            .map(|(i, role)| {
                let mut op = Operation::new(
                    OperationKind::Created,
                    ObjectId::new(i as u64),
                    Placement::root(),
                    None,
                    None,
                );
                op.chain_role = *role;
                op
            })
            .collect()
    }

    use crate::operation::ChainRole::{ChainEnd as E, ChainMiddle as M, ChainStart as S, None as N};

    #[test]
    fn stamp_sequence() {
        let mut chain = ChainCoordinator::new();
        assert_eq!(chain.stamp(), N);
        chain.start();
        assert!(chain.is_started());
        assert!(!chain.has_stamped());
        assert_eq!(chain.stamp(), S);
        assert_eq!(chain.stamp(), M);
        assert_eq!(chain.stamp(), M);
        assert!(chain.finish());
        assert!(!chain.is_started());
        assert_eq!(chain.stamp(), N);
    }

    #[test]
    fn finish_without_stamps_reports_nothing() {
        let mut chain = ChainCoordinator::new();
        assert!(!chain.finish());
        chain.start();
        assert!(!chain.finish());
        assert!(!chain.is_started());
    }

    #[test]
    fn ignore_suppresses_stamping_and_finish() {
        let mut chain = ChainCoordinator::new();
        chain.start();
        chain.set_ignore(true);
        assert_eq!(chain.stamp(), N);
        // start was not consumed
        assert_eq!(chain.next_role(), S);
        assert!(!chain.finish());
        assert!(chain.is_started());

        chain.set_ignore(false);
        assert_eq!(chain.stamp(), S);
        assert!(chain.finish());
    }

    #[test]
    fn rewind_reopens_stamped_chain() {
        let mut chain = ChainCoordinator::new();
        chain.start();
        chain.stamp();
        chain.rewind();
        assert_eq!(chain.next_role(), S);
    }

    #[test]
    fn bounds_of_unchained() {
        let ops = ops(&[N, N, N]);
        assert_eq!(chain_bounds(&ops, 1), 1..2);
    }

    #[test]
    fn bounds_of_closed_chain_from_every_member() {
        let ops = ops(&[N, S, M, M, E, N]);
        for i in 1..=4 {
            assert_eq!(chain_bounds(&ops, i), 1..5, "member {i}");
        }
        assert_eq!(chain_bounds(&ops, 0), 0..1);
        assert_eq!(chain_bounds(&ops, 5), 5..6);
    }

    #[test]
    fn bounds_of_open_chain_reach_timeline_end() {
        let ops = ops(&[N, S, M]);
        assert_eq!(chain_bounds(&ops, 1), 1..3);
        assert_eq!(chain_bounds(&ops, 2), 1..3);
    }

    #[test]
    fn bounds_include_ignored_records_inside_chain() {
        let ops = ops(&[S, N, M, E]);
        assert_eq!(chain_bounds(&ops, 3), 0..4);
    }

    #[test]
    fn bounds_out_of_range_is_empty() {
        let ops = ops(&[N]);
        assert!(chain_bounds(&ops, 4).is_empty());
    }

    #[test]
    fn open_chain_tail_skips_ignored_records() {
        let open = ops(&[N, S, M, N]);
        assert_eq!(open_chain_tail(&open), Some(2));
        let unchained = ops(&[N, N]);
        assert_eq!(open_chain_tail(&unchained), None);
        let closed = ops(&[S, M, E, N]);
        assert_eq!(open_chain_tail(&closed), None);
    }

    #[test]
    fn cut_inside_closed_chain_reports_kept_tail() {
        let ops = ops(&[N, S, M, M, E]);
        assert_eq!(cut_chain_tail(&ops, 4), Some(3));
        assert_eq!(cut_chain_tail(&ops, 2), Some(1));
        // Cuts on unit boundaries split nothing.
        assert_eq!(cut_chain_tail(&ops, 1), None);
        assert_eq!(cut_chain_tail(&ops, 5), None);
        assert_eq!(cut_chain_tail(&ops, 0), None);
    }

    #[test]
    fn cut_skips_ignored_records_and_the_open_chain() {
        let closed = ops(&[S, N, M, E]);
        assert_eq!(cut_chain_tail(&closed, 2), Some(0));
        let open = ops(&[N, S, M, M]);
        assert_eq!(cut_chain_tail(&open, 3), None);
        let after_closed = ops(&[S, E, S, M]);
        assert_eq!(cut_chain_tail(&after_closed, 3), None);
    }

    #[test]
    fn closed_roles() {
        assert_eq!(M.closed(), E);
        assert_eq!(S.closed(), N);
        assert_eq!(E.closed(), E);
        assert_eq!(N.closed(), N);
    }
}
