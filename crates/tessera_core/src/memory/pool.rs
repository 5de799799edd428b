//! # Component Pools
//!
//! Recycling storage for component instances, one pool per component type.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::ecs::{ComponentBox, ComponentType, Entity};

/// Storage collaborator for component instances.
///
/// The engine calls these operations from editors, possibly from several
/// producer threads at once, so implementations must synchronize internally.
/// Implementations must not call back into the engine, and must not hold a
/// lock shared with other instances while a visitor runs.
pub trait ComponentPools: Send + Sync {
    /// Hands out an instance of `ty`, recycled or freshly constructed.
    fn acquire(&self, ty: &ComponentType) -> ComponentBox;

    /// Takes back an instance that is no longer attached to any entity.
    fn release(&self, ty: &ComponentType, instance: ComponentBox);

    /// Attaches `instance` to `entity`, replacing any previous instance.
    fn attach(&self, entity: Entity, ty: &ComponentType, instance: ComponentBox);

    /// Detaches the instance of `ty` from `entity`.
    fn detach(&self, entity: Entity, ty: &ComponentType) -> Option<ComponentBox>;

    /// Runs `visit` against the instance of `ty` attached to `entity`.
    ///
    /// # Returns
    ///
    /// `false` if no such instance is attached.
    fn with_instance(
        &self,
        entity: Entity,
        ty: &ComponentType,
        visit: &mut dyn FnMut(&mut (dyn Any + Send + Sync)),
    ) -> bool;
}

/// An attached instance. Emptied on detach, so a visitor that cloned the
/// slot just before sees nothing rather than a recycled instance.
type Slot = Arc<Mutex<Option<ComponentBox>>>;

/// Per-type pool: a free list of detached instances plus the attached ones.
#[derive(Default)]
struct TypePool {
    /// Detached instances, reset to default, reused LIFO.
    free: Vec<ComponentBox>,
    /// Instances currently attached, by owning entity.
    attached: HashMap<Entity, Slot>,
}

/// Default [`ComponentPools`] implementation.
///
/// Released instances are reset to `Default` and kept on a free list, so a
/// steady add/remove churn stops allocating once the free lists are warm.
///
/// # Thread Safety
///
/// The per-type maps are only locked for lookups and inserts, never while a
/// visitor runs. Each attached instance has its own lock, held for the
/// duration of [`with_instance`](ComponentPools::with_instance): a visitor
/// may read any other instance, but must not reach the one it is visiting.
#[derive(Default)]
pub struct ComponentStore {
    pools: DashMap<u32, TypePool>,
}

impl ComponentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of instances of `ty` attached to entities.
    #[must_use]
    pub fn attached_count(&self, ty: &ComponentType) -> usize {
        self.pools
            .get(&ty.index())
            .map_or(0, |pool| pool.attached.len())
    }

    /// Returns the number of recycled instances of `ty` waiting for reuse.
    #[must_use]
    pub fn free_count(&self, ty: &ComponentType) -> usize {
        self.pools.get(&ty.index()).map_or(0, |pool| pool.free.len())
    }

    fn slot(&self, entity: Entity, ty: &ComponentType) -> Option<Slot> {
        self.pools
            .get(&ty.index())
            .and_then(|pool| pool.attached.get(&entity).cloned())
    }
}

impl ComponentPools for ComponentStore {
    fn acquire(&self, ty: &ComponentType) -> ComponentBox {
        let recycled = self
            .pools
            .get_mut(&ty.index())
            .and_then(|mut pool| pool.free.pop());
        recycled.unwrap_or_else(|| ty.construct())
    }

    fn release(&self, ty: &ComponentType, mut instance: ComponentBox) {
        ty.reset(instance.as_mut());
        self.pools.entry(ty.index()).or_default().free.push(instance);
    }

    fn attach(&self, entity: Entity, ty: &ComponentType, instance: ComponentBox) {
        let previous = self
            .pools
            .entry(ty.index())
            .or_default()
            .attached
            .insert(entity, Arc::new(Mutex::new(Some(instance))));

        if let Some(slot) = previous {
            let replaced = slot.lock().take();
            if let Some(replaced) = replaced {
                self.release(ty, replaced);
            }
        }
    }

    fn detach(&self, entity: Entity, ty: &ComponentType) -> Option<ComponentBox> {
        let slot = self
            .pools
            .get_mut(&ty.index())
            .and_then(|mut pool| pool.attached.remove(&entity))?;
        let instance = slot.lock().take();
        instance
    }

    fn with_instance(
        &self,
        entity: Entity,
        ty: &ComponentType,
        visit: &mut dyn FnMut(&mut (dyn Any + Send + Sync)),
    ) -> bool {
        let Some(slot) = self.slot(entity, ty) else {
            return false;
        };
        let mut guard = slot.lock();
        match guard.as_mut() {
            Some(instance) => {
                visit(&mut **instance);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, ComponentTypeRegistry};

    #[derive(Debug, Default, PartialEq)]
    struct Fuel(u32);
    impl Component for Fuel {}

    fn fuel_type() -> ComponentType {
        ComponentTypeRegistry::new(true).register::<Fuel>()
    }

    fn read(store: &ComponentStore, entity: Entity, ty: &ComponentType) -> Option<u32> {
        let mut out = None;
        store.with_instance(entity, ty, &mut |any| {
            out = any.downcast_ref::<Fuel>().map(|f| f.0);
        });
        out
    }

    #[test]
    fn test_attach_visit_detach() {
        let store = ComponentStore::new();
        let ty = fuel_type();
        let entity = Entity::new(3, 0);

        let mut instance = store.acquire(&ty);
        instance.downcast_mut::<Fuel>().unwrap().0 = 7;
        store.attach(entity, &ty, instance);

        assert_eq!(read(&store, entity, &ty), Some(7));
        assert_eq!(store.attached_count(&ty), 1);

        let detached = store.detach(entity, &ty).unwrap();
        assert_eq!(detached.downcast_ref::<Fuel>(), Some(&Fuel(7)));
        assert_eq!(read(&store, entity, &ty), None);
        assert!(store.detach(entity, &ty).is_none());
    }

    #[test]
    fn test_released_instances_are_reset_and_reused() {
        let store = ComponentStore::new();
        let ty = fuel_type();

        let mut instance = store.acquire(&ty);
        instance.downcast_mut::<Fuel>().unwrap().0 = 99;
        store.release(&ty, instance);
        assert_eq!(store.free_count(&ty), 1);

        let reused = store.acquire(&ty);
        assert_eq!(reused.downcast_ref::<Fuel>(), Some(&Fuel(0)));
        assert_eq!(store.free_count(&ty), 0);
    }

    #[test]
    fn test_attach_replaces_previous_instance() {
        let store = ComponentStore::new();
        let ty = fuel_type();
        let entity = Entity::new(0, 0);

        store.attach(entity, &ty, Box::new(Fuel(1)));
        store.attach(entity, &ty, Box::new(Fuel(2)));

        assert_eq!(read(&store, entity, &ty), Some(2));
        assert_eq!(store.attached_count(&ty), 1);
        assert_eq!(store.free_count(&ty), 1);
    }

    #[test]
    fn test_visitor_can_read_same_type_on_other_entity() {
        let store = ComponentStore::new();
        let ty = fuel_type();
        let tank = Entity::new(0, 0);
        let reserve = Entity::new(1, 0);
        store.attach(tank, &ty, Box::new(Fuel(5)));
        store.attach(reserve, &ty, Box::new(Fuel(20)));

        let visited = store.with_instance(tank, &ty, &mut |any| {
            let extra = read(&store, reserve, &ty).unwrap_or(0);
            if let Some(fuel) = any.downcast_mut::<Fuel>() {
                fuel.0 += extra;
            }
        });

        assert!(visited);
        assert_eq!(read(&store, tank, &ty), Some(25));
    }

    #[test]
    fn test_detach_while_slot_is_shared() {
        let store = ComponentStore::new();
        let ty = fuel_type();
        let entity = Entity::new(0, 0);
        store.attach(entity, &ty, Box::new(Fuel(3)));

        let slot = store.slot(entity, &ty).unwrap();
        let detached = store.detach(entity, &ty).unwrap();
        assert_eq!(detached.downcast_ref::<Fuel>(), Some(&Fuel(3)));
        assert!(slot.lock().is_none());
    }
}
