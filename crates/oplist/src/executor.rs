#![forbid(unsafe_code)]

//! Undo/redo replay.
//!
//! A replay processes one unit of the timeline: the chain next to the
//! cursor, or a single operation while chaining is ignored. Undo walks the
//! unit last-registered first, redo first-to-last.
//!
//! | Kind                  | Undo                               | Redo                       |
//! |-----------------------|------------------------------------|----------------------------|
//! | `Created`             | detach live object, park it        | re-insert parked object    |
//! | `Removed`             | rebuild from snapshot, insert      | remove again               |
//! | `Modified` / `Moved`  | park live state, assign snapshot   | assign parked state        |
//!
//! If the model rejects a step, the steps already applied are reverted in
//! reverse order and the cursor stays where it was.

use std::ops::Range;

use crate::chain::chain_bounds;
use crate::error::OperationError;
use crate::object::{ModelError, ModelObject, ObjectId, ObjectModel, ObjectType};
use crate::history::OperationList;
use crate::operation::OperationKind;
use crate::pool::PoolIndex;

// ============================================================================
// Progress
// ============================================================================

/// Receives one notification per replayed operation.
pub trait ProgressSink {
    /// `progress` is the percentage of the unit processed so far,
    /// `object_label` reads `"name (type)"`.
    fn operation_executed(&mut self, progress: u8, object_label: &str, object_type: ObjectType);
}

impl<F> ProgressSink for F
where
    F: FnMut(u8, &str, ObjectType),
{
    fn operation_executed(&mut self, progress: u8, object_label: &str, object_type: ObjectType) {
        self(progress, object_label, object_type);
    }
}

/// Sink that discards every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn operation_executed(&mut self, _: u8, _: &str, _: ObjectType) {}
}

/// A recorded progress notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub progress: u8,
    pub object: String,
    pub object_type: ObjectType,
}

impl ProgressSink for Vec<ProgressEvent> {
    fn operation_executed(&mut self, progress: u8, object_label: &str, object_type: ObjectType) {
        self.push(ProgressEvent {
            progress,
            object: object_label.to_string(),
            object_type,
        });
    }
}

// ============================================================================
// Replay outcome
// ============================================================================

/// Direction of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Undo,
    Redo,
}

impl Direction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }

    #[must_use]
    pub const fn reverse(self) -> Self {
        match self {
            Self::Undo => Self::Redo,
            Self::Redo => Self::Undo,
        }
    }
}

/// Summary of a completed undo or redo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub direction: Direction,
    /// Number of operations processed.
    pub processed: usize,
    /// Objects touched, in processing order.
    pub objects: Vec<ObjectId>,
    /// At least one replayed operation was not a `Moved`: the host should
    /// revalidate relationships.
    pub needs_revalidation: bool,
}

// ============================================================================
// Undo / redo
// ============================================================================

impl<M: ObjectModel> OperationList<M> {
    /// Undo the unit ending right below the cursor.
    ///
    /// Returns `None` if nothing can be undone.
    pub fn undo_operation(&mut self) -> Option<Result<Replay, OperationError>> {
        self.undo_operation_with(&mut NoProgress)
    }

    /// [`undo_operation`](Self::undo_operation) reporting progress to `sink`.
    pub fn undo_operation_with<S: ProgressSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Option<Result<Replay, OperationError>> {
        if !self.is_undo_available() {
            return None;
        }
        Some(self.replay(Direction::Undo, sink))
    }

    /// Redo the unit starting at the cursor.
    ///
    /// Returns `None` if nothing can be redone.
    pub fn redo_operation(&mut self) -> Option<Result<Replay, OperationError>> {
        self.redo_operation_with(&mut NoProgress)
    }

    /// [`redo_operation`](Self::redo_operation) reporting progress to `sink`.
    pub fn redo_operation_with<S: ProgressSink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Option<Result<Replay, OperationError>> {
        if !self.is_redo_available() {
            return None;
        }
        Some(self.replay(Direction::Redo, sink))
    }

    fn replay_range(&self, direction: Direction) -> Range<usize> {
        match direction {
            Direction::Undo => {
                let last = self.current_index - 1;
                if self.chain.is_ignoring() {
                    return last..last + 1;
                }
                let bounds = chain_bounds(&self.operations, last);
                bounds.start..bounds.end.min(self.current_index)
            }
            Direction::Redo => {
                let first = self.current_index;
                if self.chain.is_ignoring() {
                    return first..first + 1;
                }
                let bounds = chain_bounds(&self.operations, first);
                bounds.start.max(self.current_index)..bounds.end
            }
        }
    }

    fn replay<S: ProgressSink + ?Sized>(
        &mut self,
        direction: Direction,
        sink: &mut S,
    ) -> Result<Replay, OperationError> {
        let dropped = self.validate_operations();
        if dropped > 0 {
            return Err(OperationError::InvalidatedOperations { dropped });
        }

        let range = self.replay_range(direction);
        let total = range.len();
        let order: Vec<usize> = match direction {
            Direction::Undo => range.clone().rev().collect(),
            Direction::Redo => range.clone().collect(),
        };

        let _span = tracing::debug_span!(
            "oplist.replay",
            direction = direction.as_str(),
            chain_size = total
        )
        .entered();
        tracing::debug!(
            target: "oplist.replay",
            from = self.current_index,
            "replay started"
        );

        let mut objects = Vec::with_capacity(total);
        let mut needs_revalidation = false;
        for (step, &position) in order.iter().enumerate() {
            let described = self.describe(&self.operations[position]);
            let op = &self.operations[position];
            let (kind, object) = (op.kind, op.object_id);

            if let Err(source) = self.apply_step(position, direction) {
                tracing::warn!(
                    target: "oplist.replay",
                    position,
                    object = %object,
                    error = %source,
                    "model rejected replay step, reverting chain"
                );
                self.compensate(&order[..step], direction);
                return Err(OperationError::ChainAborted {
                    position,
                    object,
                    source,
                });
            }
            tracing::trace!(
                target: "oplist.replay",
                position,
                object = %object,
                kind = kind.as_str(),
                "step applied"
            );

            objects.push(object);
            needs_revalidation |= kind.needs_revalidation();
            if let Some((name, object_type)) = described {
                let progress = ((step + 1) * 100 / total) as u8;
                let label = format!("{name} ({})", object_type.as_str());
                sink.operation_executed(progress, &label, object_type);
            }
        }

        self.current_index = match direction {
            Direction::Undo => range.start,
            Direction::Redo => range.end,
        };
        tracing::debug!(
            target: "oplist.replay",
            to = self.current_index,
            processed = total,
            "replay finished"
        );

        Ok(Replay {
            direction,
            processed: total,
            objects,
            needs_revalidation,
        })
    }

    /// Revert already applied steps, newest first.
    fn compensate(&mut self, applied: &[usize], direction: Direction) {
        for &position in applied.iter().rev() {
            if let Err(err) = self.apply_step(position, direction.reverse()) {
                tracing::error!(
                    target: "oplist.replay",
                    position,
                    error = %err,
                    "compensation failed, model may be inconsistent"
                );
            }
        }
    }

    fn apply_step(&mut self, position: usize, direction: Direction) -> Result<(), ModelError> {
        let op = &self.operations[position];
        let (kind, id, placement) = (op.kind, op.object_id, op.placement);

        match (direction, kind) {
            (Direction::Undo, OperationKind::Created) => {
                let index = self.model.object_index(id, placement.parent);
                let object = self.model.remove_object(id, placement.parent)?;
                let op = &mut self.operations[position];
                // Redo puts the object back where it was, not where it was registered.
                op.placement.index = index.or(op.placement.index);
                op.parked = Some(self.pool.park(object));
            }
            (Direction::Undo, OperationKind::Removed) => {
                let object = self.restored_state(position)?;
                self.model.insert_object(object, placement)?;
            }
            (Direction::Undo, OperationKind::Modified | OperationKind::Moved) => {
                let restored = self.restored_state(position)?;
                let live = self.model.object_mut(id).ok_or(ModelError::NotFound(id))?;
                let displaced = live.clone();
                live.assign_from(&restored);
                self.operations[position].parked = Some(self.pool.park(displaced));
            }
            (Direction::Redo, OperationKind::Created) => {
                let (slot, object) = self.parked_state(position)?;
                self.model.insert_object(object, placement)?;
                self.pool.release(slot);
                self.operations[position].parked = None;
            }
            (Direction::Redo, OperationKind::Removed) => {
                self.model.remove_object(id, placement.parent)?;
            }
            (Direction::Redo, OperationKind::Modified | OperationKind::Moved) => {
                let (slot, object) = self.parked_state(position)?;
                let live = self.model.object_mut(id).ok_or(ModelError::NotFound(id))?;
                live.assign_from(&object);
                self.pool.release(slot);
                self.operations[position].parked = None;
            }
        }
        Ok(())
    }

    /// Pre-mutation state of an operation, regenerated from its definition
    /// when it has one.
    fn restored_state(&mut self, position: usize) -> Result<M::Object, ModelError> {
        let op = &self.operations[position];
        let id = op.object_id;
        let snapshot = op
            .snapshot
            .and_then(|slot| self.pool.get(slot))
            .cloned()
            .ok_or(ModelError::NotFound(id))?;
        match op.definition.clone() {
            Some(definition) => self.model.regenerate_object(&definition, &snapshot),
            None => Ok((*snapshot).clone()),
        }
    }

    fn parked_state(&self, position: usize) -> Result<(PoolIndex, M::Object), ModelError> {
        let op = &self.operations[position];
        op.parked
            .and_then(|slot| self.pool.get(slot).map(|object| (slot, (**object).clone())))
            .ok_or(ModelError::NotFound(op.object_id))
    }
}
