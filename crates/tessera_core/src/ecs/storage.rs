//! # Entity Storage
//!
//! Owns one [`EntityRecord`] per managed entity and the queue of entities
//! whose record changed since the last resolution pass.
//!
//! ## Dirty Tracking
//!
//! ```text
//! editor mutation ──► record.dirty: false → true ──► enqueue(entity)
//!                         (already true: no-op)
//!
//! resolve ──► drain N = queue length at call time
//!             for each: lock, snapshot, clear dirty, unlock, notify
//!                       drop the record if it was invalid
//! ```
//!
//! An entity is enqueued only on its clean-to-dirty transition, so it is
//! delivered at most once per pass no matter how often it was mutated.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::entity::Entity;
use super::mask::ComponentMask;

/// Shared handle to a record; editors keep one for their entity.
pub(crate) type RecordRef = Arc<Mutex<EntityRecord>>;

/// Per-entity component presence and lifecycle state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityRecord {
    pub(crate) entity: Entity,
    pub(crate) mask: ComponentMask,
    pub(crate) valid: bool,
    pub(crate) dirty: bool,
}

impl EntityRecord {
    fn new(entity: Entity) -> Self {
        Self {
            entity,
            mask: ComponentMask::new(),
            valid: true,
            dirty: false,
        }
    }

    /// Returns the entity this record describes.
    #[inline]
    #[must_use]
    pub const fn entity(&self) -> Entity {
        self.entity
    }

    /// Returns the set of attached component type indices.
    #[inline]
    #[must_use]
    pub const fn mask(&self) -> &ComponentMask {
        &self.mask
    }

    /// Returns `false` once the entity has been destroyed.
    #[inline]
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// Returns whether the record changed since the last pass.
    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }
}

/// Entity records plus the dirty queue.
pub struct EntityStorage {
    records: DashMap<Entity, RecordRef>,
    dirty_tx: Sender<Entity>,
    dirty_rx: Receiver<Entity>,
}

impl EntityStorage {
    /// Creates empty storage with room for `reserve` records.
    #[must_use]
    pub fn new(reserve: usize) -> Self {
        let (dirty_tx, dirty_rx) = crossbeam_channel::unbounded();
        Self {
            records: DashMap::with_capacity(reserve),
            dirty_tx,
            dirty_rx,
        }
    }

    /// Returns the record for `entity`, creating it if absent.
    ///
    /// A new record starts dirty so the next pass evaluates it against every
    /// aspect, including aspects that require no component at all.
    pub(crate) fn manage(&self, entity: Entity) -> RecordRef {
        match self.records.entry(entity) {
            Entry::Occupied(occupied) => Arc::clone(occupied.get()),
            Entry::Vacant(vacant) => {
                let record = Arc::new(Mutex::new(EntityRecord::new(entity)));
                {
                    let mut guard = record.lock();
                    self.mark_dirty(&mut guard);
                }
                vacant.insert(Arc::clone(&record));
                record
            }
        }
    }

    /// Flags `record` dirty, enqueueing it on the clean-to-dirty transition.
    ///
    /// Callers hold the record's lock, which makes the check-and-enqueue
    /// atomic per entity.
    pub(crate) fn mark_dirty(&self, record: &mut EntityRecord) {
        if record.dirty {
            return;
        }
        record.dirty = true;
        // The receiver lives as long as `self`, so the channel never disconnects.
        let _ = self.dirty_tx.send(record.entity);
    }

    /// Delivers every entity dirtied before this call to `notify`, once each,
    /// in enqueue order.
    ///
    /// Invalid records are dropped after their notification. Entities
    /// dirtied while this runs wait for the next pass.
    ///
    /// # Panics
    ///
    /// Panics if a queued entity has no record, which means the storage's
    /// own bookkeeping is broken.
    ///
    /// # Returns
    ///
    /// The number of records delivered.
    pub fn resolve<F>(&self, mut notify: F) -> usize
    where
        F: FnMut(&EntityRecord),
    {
        let pending = self.dirty_rx.len();
        let mut delivered = 0;

        for entity in self.dirty_rx.try_iter().take(pending) {
            let Some(record) = self.records.get(&entity).map(|r| Arc::clone(r.value())) else {
                panic!("dirty {entity} has no record");
            };

            // Clear before notifying: a mutation racing with this pass
            // re-enqueues instead of being folded into a stale snapshot.
            let snapshot = {
                let mut guard = record.lock();
                guard.dirty = false;
                guard.clone()
            };

            notify(&snapshot);

            if !snapshot.valid {
                self.records.remove(&entity);
            }
            delivered += 1;
        }

        delivered
    }

    /// Returns the number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Checks if no record is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of entities waiting for the next pass.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.dirty_rx.len()
    }

    /// Checks whether a record exists for `entity`.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.records.contains_key(&entity)
    }

    /// Snapshots every record, in no particular order.
    pub(crate) fn snapshot(&self) -> Vec<EntityRecord> {
        self.records
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect()
    }
}
