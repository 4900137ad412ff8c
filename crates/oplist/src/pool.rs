#![forbid(unsafe_code)]

//! Shared snapshot pool.
//!
//! [`SnapshotPool`] owns the deep copies of objects captured before each
//! recorded mutation. Operations refer to snapshots by [`PoolIndex`], never
//! by pointer, and several operations may share one slot.
//!
//! # Architecture
//!
//! ```text
//! register Modified(A) twice without changing A in between
//! ┌───────────────────────────────────────────────────────┐
//! │ Operations: [op0 → #0, op1 → #0, op2 → #1]            │
//! │ Slots:      #0 (A, refs 2)   #1 (B, refs 1)           │
//! │ Orphaned:   []                                        │
//! └───────────────────────────────────────────────────────┘
//!
//! evict op0
//! ┌───────────────────────────────────────────────────────┐
//! │ Operations: [op1 → #0, op2 → #1]                      │
//! │ Slots:      #0 (A, refs 1)   #1 (B, refs 1)           │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! # Invariants
//!
//! 1. A slot's `refs` equals the number of operations pointing at it.
//! 2. A slot is destroyed only when `refs` reaches zero.
//! 3. Slot contents never change after capture, so sharing is safe.
//! 4. Snapshots still referenced when they leave the pool (forced removal,
//!    or an `Arc` held by a caller) move to the orphan list and are released
//!    when the pool is dropped.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::object::{ModelObject, ObjectId};

/// Stable identifier of a pool slot. Never reused within one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolIndex(u64);

impl PoolIndex {
    /// Get the raw index value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PoolIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

struct Slot<O> {
    object: Arc<O>,
    refs: usize,
}

/// Arena of reference-counted object snapshots.
pub struct SnapshotPool<O: ModelObject> {
    slots: BTreeMap<PoolIndex, Slot<O>>,
    /// Number of slots per object, for identity lookups.
    per_object: HashMap<ObjectId, usize>,
    /// Snapshots removed from the pool while still referenced elsewhere.
    orphaned: Vec<Arc<O>>,
    next_index: u64,
}

impl<O: ModelObject> fmt::Debug for SnapshotPool<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotPool")
            .field("slots", &self.slots.len())
            .field("orphaned", &self.orphaned.len())
            .field("next_index", &self.next_index)
            .finish()
    }
}

impl<O: ModelObject> Default for SnapshotPool<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: ModelObject> SnapshotPool<O> {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            per_object: HashMap::new(),
            orphaned: Vec::new(),
            next_index: 0,
        }
    }

    /// Number of live slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the pool holds no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of snapshots retained in the orphan list.
    #[must_use]
    pub fn orphaned_len(&self) -> usize {
        self.orphaned.len()
    }

    /// Check whether a slot is still present.
    #[must_use]
    pub fn contains_index(&self, index: PoolIndex) -> bool {
        self.slots.contains_key(&index)
    }

    /// Snapshot stored at `index`.
    #[must_use]
    pub fn get(&self, index: PoolIndex) -> Option<&Arc<O>> {
        self.slots.get(&index).map(|slot| &slot.object)
    }

    /// Number of operations referencing `index` (0 if the slot is gone).
    #[must_use]
    pub fn references(&self, index: PoolIndex) -> usize {
        self.slots.get(&index).map_or(0, |slot| slot.refs)
    }

    /// Store an owned object in a fresh slot with one reference.
    pub fn park(&mut self, object: O) -> PoolIndex {
        self.insert(Arc::new(object))
    }

    /// Add one reference to an existing slot.
    ///
    /// Returns `false` if the slot no longer exists.
    pub fn retain(&mut self, index: PoolIndex) -> bool {
        match self.slots.get_mut(&index) {
            Some(slot) => {
                slot.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Drop one reference. The slot is reclaimed when none remain.
    pub fn release(&mut self, index: PoolIndex) {
        let Some(slot) = self.slots.get_mut(&index) else {
            return;
        };
        slot.refs = slot.refs.saturating_sub(1);
        if slot.refs == 0
            && let Some(slot) = self.take_slot(index)
        {
            self.reclaim(index, slot.object);
        }
    }

    /// Forcibly remove a slot.
    ///
    /// The snapshot is deallocated only if nothing references it; otherwise
    /// it is kept in the orphan list until the pool is dropped. Operations
    /// still pointing at `index` become dangling and must be scrubbed by the
    /// validator.
    ///
    /// Returns `false` if the slot did not exist.
    pub fn remove(&mut self, index: PoolIndex) -> bool {
        let Some(slot) = self.take_slot(index) else {
            return false;
        };
        if slot.refs > 0 {
            tracing::debug!(
                target: "oplist.pool",
                slot = index.raw(),
                refs = slot.refs,
                "referenced snapshot orphaned"
            );
            self.orphaned.push(slot.object);
        } else {
            self.reclaim(index, slot.object);
        }
        true
    }

    /// Drop every slot. Snapshots with outside handles go to the orphan list.
    pub fn clear(&mut self) {
        let slots = std::mem::take(&mut self.slots);
        self.per_object.clear();
        for (index, slot) in slots {
            self.reclaim(index, slot.object);
        }
    }

    fn insert(&mut self, object: Arc<O>) -> PoolIndex {
        let index = PoolIndex(self.next_index);
        self.next_index += 1;
        *self.per_object.entry(object.id()).or_insert(0) += 1;
        self.slots.insert(index, Slot { object, refs: 1 });
        index
    }

    fn take_slot(&mut self, index: PoolIndex) -> Option<Slot<O>> {
        let slot = self.slots.remove(&index)?;
        let id = slot.object.id();
        if let Some(count) = self.per_object.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.per_object.remove(&id);
            }
        }
        Some(slot)
    }

    fn reclaim(&mut self, index: PoolIndex, object: Arc<O>) {
        if Arc::strong_count(&object) > 1 {
            tracing::debug!(
                target: "oplist.pool",
                slot = index.raw(),
                "snapshot still shared, orphaned"
            );
            self.orphaned.push(object);
        }
    }

    /// Deep-copy `object` into a fresh slot.
    pub fn add(&mut self, object: &O) -> PoolIndex {
        self.insert(Arc::new(object.clone()))
    }

    /// Deep-copy `object`, sharing the most recent slot of the same object
    /// when its content is identical.
    pub fn capture(&mut self, object: &O) -> PoolIndex {
        let id = object.id();
        let latest = self
            .slots
            .iter()
            .rev()
            .find(|(_, slot)| slot.object.id() == id);
        if let Some((&index, slot)) = latest
            && *slot.object == *object
            && self.retain(index)
        {
            return index;
        }
        self.add(object)
    }

    /// Identity lookup: is any snapshot of `id` in the pool?
    #[must_use]
    pub fn contains(&self, id: ObjectId) -> bool {
        self.per_object.contains_key(&id)
    }

    /// Forcibly remove every slot holding `id`. Returns the number removed.
    pub fn remove_object(&mut self, id: ObjectId) -> usize {
        let doomed: Vec<PoolIndex> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.object.id() == id)
            .map(|(index, _)| *index)
            .collect();
        for index in &doomed {
            self.remove(*index);
        }
        doomed.len()
    }
}

impl<O: ModelObject> Drop for SnapshotPool<O> {
    fn drop(&mut self) {
        if !self.orphaned.is_empty() {
            tracing::trace!(
                target: "oplist.pool",
                orphaned = self.orphaned.len(),
                "releasing orphaned snapshots"
            );
        }
    }
}
