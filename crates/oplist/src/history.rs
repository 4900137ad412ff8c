#![forbid(unsafe_code)]

//! Operation timeline for undo/redo.
//!
//! [`OperationList`] owns the live model it records, the ordered list of
//! [`Operation`]s and the [`SnapshotPool`] backing them. A cursor
//! (`current_index`) splits the timeline:
//!
//! ```text
//! register x5
//! ┌───────────────────────────────────────────────┐
//! │ Operations: [op0, op1, op2, op3, op4]         │
//! │ Cursor:                               ▲ 5     │
//! └───────────────────────────────────────────────┘
//!
//! undo() x2
//! ┌───────────────────────────────────────────────┐
//! │ Operations: [op0, op1, op2 | op3, op4]        │
//! │ Cursor:                    ▲ 3  (redoable →)  │
//! └───────────────────────────────────────────────┘
//!
//! register(op5)  <-- discards the redo tail
//! ┌───────────────────────────────────────────────┐
//! │ Operations: [op0, op1, op2, op5]              │
//! │ Cursor:                         ▲ 4           │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. `current_index <= operations.len()` after any call.
//! 2. Operations below the cursor are done, the others are undone.
//! 3. Registering discards every undone operation first.
//! 4. `operations.len() <= max_size`, except while the only evictable
//!    operations belong to the newest chain: chains are never split.
//! 5. Every chain but the open one ends with a `ChainEnd`, including one
//!    whose redo tail was discarded.
//!
//! # Contract
//!
//! [`register_object`](OperationList::register_object) must run strictly
//! before the mutation it records is applied to the model. The list has no
//! way to recover the pre-mutation state otherwise.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::chain::{ChainCoordinator, chain_bounds, cut_chain_tail, open_chain_tail};
use crate::config::OperationListConfig;
use crate::error::OperationError;
use crate::object::{ModelObject, ObjectId, ObjectModel, ObjectType, Placement};
use crate::operation::{ChainRole, Operation, OperationInfo, OperationKind};
use crate::pool::SnapshotPool;

/// Linear undo/redo history bound to one model.
pub struct OperationList<M: ObjectModel> {
    pub(crate) model: M,
    pub(crate) operations: Vec<Operation>,
    pub(crate) pool: SnapshotPool<M::Object>,
    pub(crate) chain: ChainCoordinator,
    config: OperationListConfig,
    pub(crate) current_index: usize,
}

impl<M: ObjectModel> fmt::Debug for OperationList<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationList")
            .field("len", &self.operations.len())
            .field("current_index", &self.current_index)
            .field("chain", &self.chain)
            .field("pool", &self.pool)
            .field("config", &self.config)
            .finish()
    }
}

impl<M: ObjectModel> OperationList<M> {
    /// Bind a new, empty history to `model`, following the process-wide
    /// maximum size.
    #[must_use]
    pub fn new(model: M) -> Self {
        Self::with_config(model, OperationListConfig::process_wide())
    }

    /// Bind a new, empty history to `model` with the given configuration.
    #[must_use]
    pub fn with_config(model: M, config: OperationListConfig) -> Self {
        Self {
            model,
            operations: Vec::new(),
            pool: SnapshotPool::new(),
            chain: ChainCoordinator::new(),
            config,
            current_index: 0,
        }
    }

    // ========================================================================
    // Model access
    // ========================================================================

    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Mutable access to the live model.
    ///
    /// Register every mutation before applying it through this handle.
    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Tear the history down and hand the model back.
    pub fn into_model(self) -> M {
        self.model
    }

    #[must_use]
    pub fn pool(&self) -> &SnapshotPool<M::Object> {
        &self.pool
    }

    #[must_use]
    pub fn config(&self) -> &OperationListConfig {
        &self.config
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Record that `id` is about to undergo `kind`.
    ///
    /// For every kind but `Created` the object must currently be in the
    /// model; its state is captured into the pool. A `Removed` object
    /// registered without an index gets its current index recorded, so undo
    /// re-inserts it in place.
    pub fn register_object(
        &mut self,
        id: ObjectId,
        kind: OperationKind,
        placement: Placement,
    ) -> Result<(), OperationError> {
        let mut placement = placement;
        let (snapshot, definition) = if kind.has_snapshot() {
            let object = self
                .model
                .object(id)
                .ok_or(OperationError::ObjectNotFound(id))?;
            if kind == OperationKind::Removed && placement.index.is_none() {
                placement.index = self.model.object_index(id, placement.parent);
            }
            let definition = object.dependent_definition();
            (Some(self.pool.capture(object)), definition)
        } else {
            (None, None)
        };

        self.discard_redo_tail();

        let mut operation = Operation::new(kind, id, placement, snapshot, definition);
        operation.chain_role = self.chain.stamp();
        tracing::debug!(
            target: "oplist.history",
            object = %id,
            kind = kind.as_str(),
            chain_role = ?operation.chain_role,
            index = self.operations.len(),
            "operation registered"
        );
        self.operations.push(operation);
        self.current_index = self.operations.len();

        self.enforce_limit();
        Ok(())
    }

    /// Drop the newest operation without restoring anything.
    ///
    /// If it is chained, the whole chain back to its start goes with it.
    /// Meant for rolling back a registration whose mutation then failed; the
    /// live model is left exactly as it is.
    ///
    /// Returns `false` if the history is empty.
    pub fn remove_last_operation(&mut self) -> bool {
        let len = self.operations.len();
        let Some(last) = len.checked_sub(1) else {
            return false;
        };
        let start = match self.operations[last].chain_role {
            ChainRole::None => last,
            _ => chain_bounds(&self.operations, last).start,
        };
        let removed = self.drop_range(start..len);
        tracing::debug!(
            target: "oplist.history",
            removed,
            "last operation removed without replay"
        );
        true
    }

    /// Clear the whole history. The model is kept as it is.
    pub fn remove_operations(&mut self) {
        self.operations.clear();
        self.pool.clear();
        self.chain.reset();
        self.current_index = 0;
        tracing::debug!(target: "oplist.history", "history cleared");
    }

    /// Record a new position of `id` inside its parent.
    ///
    /// Hosts call this after reordering child objects so that operations
    /// referring to the object restore it at the right index.
    pub fn update_object_index(&mut self, id: ObjectId, new_index: usize) {
        for op in self
            .operations
            .iter_mut()
            .filter(|op| op.object_id == id)
        {
            op.placement.index = Some(new_index);
        }
    }

    // ========================================================================
    // Chains
    // ========================================================================

    /// Open a chain: every operation registered until
    /// [`finish_operation_chain`](Self::finish_operation_chain) is undone
    /// and redone as one unit. An already open chain is finished first.
    pub fn start_operation_chain(&mut self) {
        if self.chain.is_started() {
            self.finish_operation_chain();
        }
        self.chain.start();
        tracing::debug!(target: "oplist.history", "operation chain started");
    }

    /// Close the open chain, marking its last operation as the chain end,
    /// then evict older chains the history no longer has room for.
    ///
    /// Does nothing while chaining is ignored: the ignore flag must be
    /// cleared first or the chain stays open.
    pub fn finish_operation_chain(&mut self) {
        if self.chain.is_ignoring() {
            if self.chain.is_started() {
                tracing::warn!(
                    target: "oplist.history",
                    "finish requested while chaining is ignored, chain left open"
                );
            }
            return;
        }
        if !self.chain.finish() {
            return;
        }
        if let Some(tail) = open_chain_tail(&self.operations) {
            self.operations[tail].chain_role = self.operations[tail].chain_role.closed();
        }
        tracing::debug!(target: "oplist.history", "operation chain finished");
        self.enforce_limit();
    }

    /// Suspend (or resume) chaining.
    ///
    /// While set, registrations are not chained and undo/redo step one
    /// operation at a time, even inside an existing chain.
    pub fn ignore_operation_chain(&mut self, ignore: bool) {
        self.chain.set_ignore(ignore);
    }

    #[must_use]
    pub fn is_operation_chain_started(&self) -> bool {
        self.chain.is_started()
    }

    /// Number of operations the next undo processes as one unit.
    #[must_use]
    pub fn chain_size(&self) -> usize {
        let Some(index) = self.current_index.checked_sub(1) else {
            return 0;
        };
        if self.chain.is_ignoring() {
            return 1;
        }
        let bounds = chain_bounds(&self.operations, index);
        (bounds.start..bounds.end.min(self.current_index)).len()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of operations in the history.
    #[must_use]
    pub fn current_size(&self) -> usize {
        self.operations.len()
    }

    /// Maximum history length in effect for this list.
    #[must_use]
    pub fn maximum_size(&self) -> usize {
        self.config.effective_max_size()
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn is_undo_available(&self) -> bool {
        self.current_index > 0
    }

    #[must_use]
    pub fn is_redo_available(&self) -> bool {
        self.current_index < self.operations.len()
    }

    /// Operation at `index`, if any.
    #[must_use]
    pub fn operation(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index)
    }

    /// Kind, object name and type of the operation at `index`.
    #[must_use]
    pub fn operation_data(&self, index: usize) -> Option<OperationInfo> {
        let op = self.operations.get(index)?;
        let (object_name, object_type) = self.describe(op)?;
        Some(OperationInfo {
            kind: op.kind,
            chain_role: op.chain_role,
            object_name,
            object_type,
        })
    }

    /// Pre-mutation state recorded by the operation at `index`.
    ///
    /// A handle kept after the snapshot leaves the pool keeps it alive in
    /// the orphan list until the history is dropped.
    #[must_use]
    pub fn snapshot(&self, index: usize) -> Option<Arc<M::Object>> {
        let slot = self.operations.get(index)?.snapshot?;
        self.pool.get(slot).cloned()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Name and type of the object an operation refers to, taken from the
    /// pool first and from the live model otherwise.
    pub(crate) fn describe(&self, op: &Operation) -> Option<(String, ObjectType)> {
        let pooled = op
            .snapshot
            .or(op.parked)
            .and_then(|slot| self.pool.get(slot))
            .map(|object| &**object);
        let object = pooled.or_else(|| self.model.object(op.object_id))?;
        Some((object.name().to_string(), object.object_type()))
    }

    /// Remove `range` from the timeline, releasing its pool slots and
    /// shifting the cursor. Returns the number of operations removed.
    pub(crate) fn drop_range(&mut self, range: Range<usize>) -> usize {
        let range = range.start.min(self.operations.len())..range.end.min(self.operations.len());
        if range.is_empty() {
            return 0;
        }
        let done_removed = range.end.min(self.current_index).saturating_sub(range.start);
        let removed = range.len();
        for op in self.operations.drain(range) {
            for slot in op.pool_slots() {
                self.pool.release(slot);
            }
        }
        self.current_index -= done_removed;

        // The open chain lost every stamped operation: start it over.
        if self.chain.has_stamped() && open_chain_tail(&self.operations).is_none() {
            self.chain.rewind();
        }
        removed
    }

    fn discard_redo_tail(&mut self) {
        let len = self.operations.len();
        if self.current_index >= len {
            return;
        }
        // A cut through a closed chain leaves its kept part as a closed chain.
        if let Some(tail) = cut_chain_tail(&self.operations, self.current_index) {
            self.operations[tail].chain_role = self.operations[tail].chain_role.closed();
        }
        let discarded = self.drop_range(self.current_index..len);
        tracing::debug!(
            target: "oplist.history",
            discarded,
            "redo history discarded"
        );
        self.validate_operations();
    }

    /// Evict the oldest chains until the history fits its maximum size.
    fn enforce_limit(&mut self) {
        let max = self.config.effective_max_size();
        let mut evicted = 0;
        while self.operations.len() > max {
            let front = chain_bounds(&self.operations, 0);
            if front.end >= self.operations.len() {
                tracing::warn!(
                    target: "oplist.history",
                    len = self.operations.len(),
                    max,
                    "history over limit, newest chain kept whole"
                );
                break;
            }
            evicted += self.drop_range(front);
        }
        if evicted > 0 {
            tracing::debug!(
                target: "oplist.history",
                evicted,
                max,
                "oldest operations evicted"
            );
            self.validate_operations();
        }
    }
}
