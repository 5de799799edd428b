//! # Entity Management
//!
//! Entities are lightweight identifiers consisting of:
//! - A slot index, reused after the slot is released
//! - A generation counter that tells reuses of the same slot apart

use parking_lot::Mutex;

use crate::error::{EcsError, EcsResult};

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Slot index
/// - Upper 32 bits: Generation counter for detecting stale references
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Entity(u64);

impl Entity {
    /// Creates a new entity handle from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the slot index portion of the handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the handle.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Returns the packed `u64` value.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

/// Slot bookkeeping behind the provider lock.
#[derive(Debug, Default)]
struct Slots {
    /// Current generation of every slot ever issued.
    generations: Vec<u32>,
    /// Whether each slot is currently handed out.
    alive: Vec<bool>,
    /// Released slot indices, reused LIFO.
    free: Vec<u32>,
    /// Number of slots currently handed out.
    alive_count: usize,
}

/// Recycles entity handles.
///
/// Handles come from the reuse pool when it is non-empty, otherwise from the
/// next never-used slot. Releasing a handle bumps its slot's generation, so
/// the next handle issued for that slot compares unequal to the released one.
/// A slot that has used up its generations is never issued again.
#[derive(Debug)]
pub struct HandleProvider {
    slots: Mutex<Slots>,
    capacity: u32,
}

impl HandleProvider {
    /// Creates a provider that can issue at most `capacity` distinct slots,
    /// reserving room for `reserve` of them up front.
    #[must_use]
    pub fn new(capacity: u32, reserve: usize) -> Self {
        let reserve = reserve.min(capacity as usize);
        Self {
            slots: Mutex::new(Slots {
                generations: Vec::with_capacity(reserve),
                alive: Vec::with_capacity(reserve),
                free: Vec::new(),
                alive_count: 0,
            }),
            capacity,
        }
    }

    /// Returns the maximum number of slots this provider can issue.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Issues a handle, reusing a released slot when one is available.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::HandleSpaceExhausted`] once every slot up to the
    /// capacity is live. This is not recoverable by retrying.
    pub fn acquire(&self) -> EcsResult<Entity> {
        let mut slots = self.slots.lock();

        if let Some(index) = slots.free.pop() {
            let idx = index as usize;
            slots.alive[idx] = true;
            slots.alive_count += 1;
            return Ok(Entity::new(index, slots.generations[idx]));
        }

        let next = slots.generations.len();
        if next >= self.capacity as usize {
            return Err(EcsError::HandleSpaceExhausted {
                capacity: self.capacity,
            });
        }

        slots.generations.push(0);
        slots.alive.push(true);
        slots.alive_count += 1;
        // `next < capacity <= u32::MAX`
        #[allow(clippy::cast_possible_truncation)]
        Ok(Entity::new(next as u32, 0))
    }

    /// Returns a handle to the reuse pool.
    ///
    /// Only the resolution pass calls this, after every aspect index has seen
    /// the entity's invalidity.
    ///
    /// # Returns
    ///
    /// `false` if the handle was not live (already released or stale).
    pub(crate) fn release(&self, entity: Entity) -> bool {
        let mut slots = self.slots.lock();
        let idx = entity.index() as usize;

        let live = slots.alive.get(idx).copied().unwrap_or(false)
            && slots.generations[idx] == entity.generation();
        if !live {
            return false;
        }

        slots.alive[idx] = false;
        slots.alive_count -= 1;
        // A slot whose generation would wrap is retired for good, otherwise
        // its next handle could equal one released long ago.
        match slots.generations[idx].checked_add(1) {
            Some(next) => {
                slots.generations[idx] = next;
                slots.free.push(entity.index());
            }
            None => tracing::debug!("retired slot {} at its last generation", entity.index()),
        }
        true
    }

    /// Checks whether `entity` is the current handle of a live slot.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let slots = self.slots.lock();
        let idx = entity.index() as usize;
        slots.alive.get(idx).copied().unwrap_or(false)
            && slots.generations[idx] == entity.generation()
    }

    /// Returns the number of handles currently issued.
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.slots.lock().alive_count
    }
}
