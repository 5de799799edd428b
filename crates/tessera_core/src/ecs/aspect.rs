//! # Aspects
//!
//! An [`Aspect`] is a system's matching rule: the component types an entity
//! must carry and the ones it must not. Each system gets one
//! [`AspectIndex`], which keeps the set of entities currently matching and
//! is updated incrementally from dirty records.
//!
//! ## Transition Rule
//!
//! Applied once per dirty record per index during a resolution pass:
//!
//! ```text
//! invalid                                   → Untracked
//! mask ⊇ included  and  mask ∩ excluded = ∅ → Tracked
//! otherwise                                 → Untracked
//! ```
//!
//! The rule only looks at the record, never at the previous state, so
//! applying it twice to the same record is harmless.

use std::collections::HashSet;

use parking_lot::RwLock;

use super::component::{Component, ComponentKey, ComponentTypeRegistry};
use super::entity::Entity;
use super::mask::ComponentMask;
use super::storage::EntityRecord;
use crate::error::EcsResult;

/// Required and forbidden component types.
///
/// # Example
///
/// ```rust
/// use tessera_core::{Aspect, Component};
///
/// #[derive(Default)]
/// struct Position;
/// impl Component for Position {}
///
/// #[derive(Default)]
/// struct Frozen;
/// impl Component for Frozen {}
///
/// let aspect = Aspect::new().include::<Position>().exclude::<Frozen>();
/// assert_eq!(aspect.included().len(), 1);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Aspect {
    /// Sorted, deduplicated.
    included: Vec<ComponentKey>,
    /// Sorted, deduplicated.
    excluded: Vec<ComponentKey>,
}

fn insert_sorted(keys: &mut Vec<ComponentKey>, key: ComponentKey) {
    if let Err(pos) = keys.binary_search(&key) {
        keys.insert(pos, key);
    }
}

impl Aspect {
    /// Creates an aspect that matches every valid entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires component `T`.
    #[must_use]
    pub fn include<T: Component>(mut self) -> Self {
        insert_sorted(&mut self.included, ComponentKey::of::<T>());
        self
    }

    /// Forbids component `T`.
    #[must_use]
    pub fn exclude<T: Component>(mut self) -> Self {
        insert_sorted(&mut self.excluded, ComponentKey::of::<T>());
        self
    }

    /// Returns the required component types.
    #[must_use]
    pub fn included(&self) -> &[ComponentKey] {
        &self.included
    }

    /// Returns the forbidden component types.
    #[must_use]
    pub fn excluded(&self) -> &[ComponentKey] {
        &self.excluded
    }
}

/// Declares a system to the engine context.
///
/// The name is the identity under which the system's [`AspectIndex`] is
/// cached.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemDescriptor {
    name: String,
    aspect: Aspect,
}

impl SystemDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, aspect: Aspect) -> Self {
        Self {
            name: name.into(),
            aspect,
        }
    }

    /// Returns the system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the system's aspect.
    #[must_use]
    pub fn aspect(&self) -> &Aspect {
        &self.aspect
    }
}

/// Outcome of applying the transition rule to one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Untracked → Tracked.
    Added,
    /// Tracked → Untracked.
    Removed,
    /// No change.
    Unchanged,
}

/// Live membership of one aspect.
#[derive(Debug)]
pub struct AspectIndex {
    name: String,
    aspect: Aspect,
    included: ComponentMask,
    excluded: ComponentMask,
    tracked: RwLock<HashSet<Entity>>,
}

impl AspectIndex {
    /// Compiles `descriptor`'s aspect into masks.
    ///
    /// Never assigns new indices: every type named by the aspect must have
    /// been registered already.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnregisteredComponentType`](crate::EcsError::UnregisteredComponentType)
    /// for the first unknown type.
    pub(crate) fn compile(
        descriptor: &SystemDescriptor,
        registry: &ComponentTypeRegistry,
    ) -> EcsResult<Self> {
        let to_mask = |keys: &[ComponentKey]| -> EcsResult<ComponentMask> {
            keys.iter()
                .map(|&key| registry.lookup(key).map(|ty| ty.index()))
                .collect()
        };
        let included = to_mask(descriptor.aspect.included())?;
        let excluded = to_mask(descriptor.aspect.excluded())?;

        if included.intersects(&excluded) {
            tracing::warn!(
                "aspect of system {} both requires and forbids a component; it matches nothing",
                descriptor.name
            );
        }
        tracing::debug!(
            "compiled aspect for system {}: {} included, {} excluded",
            descriptor.name,
            included.len(),
            excluded.len()
        );

        Ok(Self {
            name: descriptor.name.clone(),
            aspect: descriptor.aspect.clone(),
            included,
            excluded,
            tracked: RwLock::new(HashSet::new()),
        })
    }

    /// Returns the owning system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the aspect this index was compiled from.
    #[must_use]
    pub fn aspect(&self) -> &Aspect {
        &self.aspect
    }

    /// Returns the required-components mask.
    #[must_use]
    pub fn included_mask(&self) -> &ComponentMask {
        &self.included
    }

    /// Returns the forbidden-components mask.
    #[must_use]
    pub fn excluded_mask(&self) -> &ComponentMask {
        &self.excluded
    }

    /// Checks whether a component mask satisfies this aspect.
    #[must_use]
    pub fn matches(&self, mask: &ComponentMask) -> bool {
        mask.is_superset(&self.included) && !mask.intersects(&self.excluded)
    }

    /// Applies the transition rule to `record`.
    pub(crate) fn resolve(&self, record: &EntityRecord) -> Transition {
        let entity = record.entity();
        let wanted = record.is_valid() && self.matches(record.mask());

        let mut tracked = self.tracked.write();
        let transition = if wanted {
            if tracked.insert(entity) {
                Transition::Added
            } else {
                Transition::Unchanged
            }
        } else if tracked.remove(&entity) {
            Transition::Removed
        } else {
            Transition::Unchanged
        };

        if transition != Transition::Unchanged {
            tracing::trace!("system {}: {} {:?}", self.name, entity, transition);
        }
        transition
    }

    /// Snapshots the tracked entities, sorted.
    ///
    /// The snapshot is not updated by later passes.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        let mut entities: Vec<_> = self.tracked.read().iter().copied().collect();
        entities.sort_unstable();
        entities
    }

    /// Checks whether `entity` is currently tracked.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.tracked.read().contains(&entity)
    }

    /// Returns the number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracked.read().len()
    }

    /// Checks if no entity is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracked.read().is_empty()
    }
}
