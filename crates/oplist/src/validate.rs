#![forbid(unsafe_code)]

//! History scrubbing.
//!
//! Pool slots can disappear behind the back of the operations referring to
//! them, most often when the host forgets an object it destroyed outside the
//! history. Replaying such an operation would restore garbage, so every
//! operation whose state is no longer reachable is dropped together with
//! its whole chain before any replay.

use std::ops::Range;

use crate::chain::chain_bounds;
use crate::history::OperationList;
use crate::object::{ModelObject, ObjectId, ObjectModel};
use crate::operation::{Operation, OperationKind};
use crate::pool::PoolIndex;

impl<M: ObjectModel> OperationList<M> {
    /// Drop every operation whose pool state is gone, with its chain.
    ///
    /// Returns the number of operations dropped.
    pub fn validate_operations(&mut self) -> usize {
        let invalid: Vec<usize> = self
            .operations
            .iter()
            .enumerate()
            .filter(|(index, op)| !self.is_restorable(op, *index < self.current_index))
            .map(|(index, _)| index)
            .collect();
        if invalid.is_empty() {
            return 0;
        }
        self.drop_chains(&invalid)
    }

    /// Forget an object invalidated outside the history.
    ///
    /// Every snapshot of `id` is force-removed from the pool and the
    /// operations depending on them are dropped. Returns the number of
    /// operations dropped.
    pub fn forget_object(&mut self, id: ObjectId) -> usize {
        let removed = self.pool.remove_object(id);
        tracing::debug!(
            target: "oplist.validate",
            object = %id,
            slots = removed,
            "object forgotten"
        );
        if removed == 0 {
            return 0;
        }
        self.validate_operations()
    }

    fn is_restorable(&self, op: &Operation, done: bool) -> bool {
        let needs_parked = !done && op.kind != OperationKind::Removed;
        if !op.kind.has_snapshot() && !needs_parked {
            return true;
        }
        if !self.pool.contains(op.object_id) {
            return false;
        }
        let holds = |slot: Option<PoolIndex>| {
            slot.and_then(|slot| self.pool.get(slot))
                .is_some_and(|object| object.id() == op.object_id)
        };
        (!op.kind.has_snapshot() || holds(op.snapshot)) && (!needs_parked || holds(op.parked))
    }

    /// Drop the chains enclosing `indices`. Returns the number of operations
    /// dropped.
    fn drop_chains(&mut self, indices: &[usize]) -> usize {
        let mut ranges: Vec<Range<usize>> = Vec::new();
        for &index in indices {
            let bounds = chain_bounds(&self.operations, index);
            match ranges.last_mut() {
                Some(last) if bounds.start <= last.end => last.end = last.end.max(bounds.end),
                _ => ranges.push(bounds),
            }
        }

        let mut dropped = 0;
        for range in ranges.into_iter().rev() {
            let op = &self.operations[range.start];
            tracing::warn!(
                target: "oplist.validate",
                object = %op.object_id,
                start = range.start,
                len = range.len(),
                "operation state lost, chain dropped"
            );
            dropped += self.drop_range(range);
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use crate::config::OperationListConfig;
    use crate::error::OperationError;
    use crate::history::OperationList;
    use crate::memory::{MemoryModel, SchemaObject};
    use crate::object::{ObjectId, ObjectModel, ObjectType, Placement};
    use crate::operation::OperationKind;

    fn list(ids: &[u64]) -> OperationList<MemoryModel> {
        let mut model = MemoryModel::new();
        for id in ids {
            model
                .insert_object(
                    SchemaObject::new(ObjectId::new(*id), format!("t{id}"), ObjectType::Table),
                    Placement::root(),
                )
                .unwrap();
        }
        OperationList::with_config(model, OperationListConfig::unlimited())
    }

    fn modify(list: &mut OperationList<MemoryModel>, id: u64, comment: &str) {
        let id = ObjectId::new(id);
        list.register_object(id, OperationKind::Modified, Placement::root())
            .unwrap();
        list.model_mut().object_mut(id).unwrap().set_comment(comment);
    }

    #[test]
    fn intact_history_is_kept() {
        let mut list = list(&[1, 2]);
        modify(&mut list, 1, "a");
        modify(&mut list, 2, "b");
        list.undo_operation().unwrap().unwrap();
        assert_eq!(list.validate_operations(), 0);
        assert_eq!(list.current_size(), 2);
    }

    #[test]
    fn done_created_needs_no_state() {
        let mut list = list(&[]);
        list.register_object(ObjectId::new(5), OperationKind::Created, Placement::root())
            .unwrap();
        assert_eq!(list.validate_operations(), 0);
    }

    #[test]
    fn forget_object_drops_its_operations() {
        let mut list = list(&[1, 2]);
        modify(&mut list, 1, "a");
        modify(&mut list, 2, "b");
        modify(&mut list, 1, "c");

        assert_eq!(list.forget_object(ObjectId::new(1)), 2);
        assert_eq!(list.current_size(), 1);
        assert_eq!(list.current_index(), 1);
        assert_eq!(list.operation(0).unwrap().object_id(), ObjectId::new(2));
        assert_eq!(list.forget_object(ObjectId::new(1)), 0);
    }

    #[test]
    fn forget_object_drops_enclosing_chain() {
        let mut list = list(&[1, 2]);
        modify(&mut list, 2, "x");
        list.start_operation_chain();
        modify(&mut list, 2, "y");
        modify(&mut list, 1, "a");
        modify(&mut list, 2, "z");
        list.finish_operation_chain();

        assert_eq!(list.forget_object(ObjectId::new(1)), 3);
        assert_eq!(list.current_size(), 1);
        assert_eq!(list.chain_size(), 1);
    }

    #[test]
    fn forgotten_undone_created_is_dropped() {
        let mut list = list(&[1]);
        let id = ObjectId::new(2);
        list.register_object(id, OperationKind::Created, Placement::root())
            .unwrap();
        list.model_mut()
            .insert_object(
                SchemaObject::new(id, "orders", ObjectType::Table),
                Placement::root(),
            )
            .unwrap();
        modify(&mut list, 1, "a");
        list.undo_operation().unwrap().unwrap();
        list.undo_operation().unwrap().unwrap();
        assert_eq!(list.current_index(), 0);

        assert_eq!(list.forget_object(id), 1);
        assert_eq!(list.current_size(), 1);
        assert_eq!(list.current_index(), 0);
        assert!(list.is_redo_available());
    }

    #[test]
    fn replay_reports_invalidation() {
        let mut list = list(&[1]);
        modify(&mut list, 1, "a");
        let slot = list.operation(0).unwrap().snapshot().unwrap();
        // A host bypassing forget_object leaves the operation dangling.
        assert!(list.pool.remove(slot));

        let err = list.undo_operation().unwrap().unwrap_err();
        assert_eq!(err, OperationError::InvalidatedOperations { dropped: 1 });
        assert!(list.undo_operation().is_none());
    }
}
