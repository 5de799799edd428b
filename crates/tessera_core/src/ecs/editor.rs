//! # Entity Editor
//!
//! The only mutation path into an entity's record. The engine context caches
//! one editor per entity, and clones share the same underlying state, so
//! every mutation of an entity funnels through one place.

use std::sync::Arc;

use super::component::{Component, ComponentKey, ComponentType, ComponentTypeRegistry};
use super::entity::Entity;
use super::mask::ComponentMask;
use super::storage::{EntityStorage, RecordRef};
use crate::error::{EcsError, EcsResult};
use crate::memory::ComponentPools;

struct EditorInner {
    entity: Entity,
    record: RecordRef,
    storage: Arc<EntityStorage>,
    registry: Arc<ComponentTypeRegistry>,
    pools: Arc<dyn ComponentPools>,
}

/// Mutation handle for one entity.
///
/// Cheap to clone. All operations fail with
/// [`EcsError::StaleEntityReference`] once the entity has been destroyed,
/// except [`contains`](Self::contains), which then reports `false`.
///
/// Component data is reached through the [`ComponentPools`] collaborator.
/// Closures passed to [`with`](Self::with) and [`update`](Self::update) run
/// with only the visited component instance locked: they may read or edit
/// other entities and this entity's other components, but must not reach the
/// component they are visiting. Two producers that each nest into the
/// other's component in opposite order can still deadlock.
#[derive(Clone)]
pub struct EntityEditor {
    inner: Arc<EditorInner>,
}

impl std::fmt::Debug for EntityEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityEditor")
            .field("entity", &self.inner.entity)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

impl EntityEditor {
    pub(crate) fn new(
        entity: Entity,
        storage: Arc<EntityStorage>,
        registry: Arc<ComponentTypeRegistry>,
        pools: Arc<dyn ComponentPools>,
    ) -> Self {
        let record = storage.manage(entity);
        Self {
            inner: Arc::new(EditorInner {
                entity,
                record,
                storage,
                registry,
                pools,
            }),
        }
    }

    /// Returns the edited entity.
    #[inline]
    #[must_use]
    pub fn entity(&self) -> Entity {
        self.inner.entity
    }

    /// Checks whether two editors are the same cached instance.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns `true` once [`destroy`](Self::destroy) has been called.
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        !self.inner.record.lock().valid
    }

    /// Snapshots the entity's component mask.
    #[must_use]
    pub fn mask(&self) -> ComponentMask {
        self.inner.record.lock().mask.clone()
    }

    fn component_type<T: Component>(&self) -> EcsResult<ComponentType> {
        self.inner.registry.index_of::<T>()
    }

    fn not_present<T: Component>(&self) -> EcsError {
        EcsError::ComponentNotPresent {
            entity: self.inner.entity,
            component: T::type_name(),
        }
    }

    /// Checks whether component `T` is attached. Never fails.
    #[must_use]
    pub fn contains<T: Component>(&self) -> bool {
        let Some(ty) = self.inner.registry.find(ComponentKey::of::<T>()) else {
            return false;
        };
        let record = self.inner.record.lock();
        record.valid && record.mask.contains(ty.index())
    }

    /// Returns a copy of component `T`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ComponentNotPresent`] if `T` is not attached
    /// - [`EcsError::StaleEntityReference`] if the entity was destroyed
    /// - [`EcsError::UnregisteredComponentType`] if `T` is unknown to a
    ///   sealed registry
    pub fn get<T: Component + Clone>(&self) -> EcsResult<T> {
        self.with::<T, T, _>(T::clone)
    }

    /// Checks that the entity is live and carries `ty`.
    ///
    /// The record lock is released before returning, so component closures
    /// never run under it.
    fn ensure_present<T: Component>(&self, ty: &ComponentType) -> EcsResult<()> {
        let record = self.inner.record.lock();
        if !record.valid {
            return Err(EcsError::StaleEntityReference(self.inner.entity));
        }
        if !record.mask.contains(ty.index()) {
            return Err(self.not_present::<T>());
        }
        Ok(())
    }

    /// Runs `f` against component `T`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get). A component removed by another producer
    /// while the call is in flight reports
    /// [`EcsError::ComponentNotPresent`].
    pub fn with<T, R, F>(&self, f: F) -> EcsResult<R>
    where
        T: Component,
        F: FnOnce(&T) -> R,
    {
        let ty = self.component_type::<T>()?;
        self.ensure_present::<T>(&ty)?;

        let mut f = Some(f);
        let mut out = None;
        self.inner
            .pools
            .with_instance(self.inner.entity, &ty, &mut |instance| {
                if let (Some(component), Some(f)) = (instance.downcast_ref::<T>(), f.take()) {
                    out = Some(f(component));
                }
            });
        out.ok_or_else(|| self.not_present::<T>())
    }

    /// Runs `f` against component `T` mutably.
    ///
    /// Changing component data leaves the component mask untouched, so it
    /// does not dirty the entity.
    ///
    /// # Errors
    ///
    /// Same as [`with`](Self::with).
    pub fn update<T, R, F>(&self, f: F) -> EcsResult<R>
    where
        T: Component,
        F: FnOnce(&mut T) -> R,
    {
        let ty = self.component_type::<T>()?;
        self.ensure_present::<T>(&ty)?;

        let mut f = Some(f);
        let mut out = None;
        self.inner
            .pools
            .with_instance(self.inner.entity, &ty, &mut |instance| {
                if let (Some(component), Some(f)) = (instance.downcast_mut::<T>(), f.take()) {
                    out = Some(f(component));
                }
            });
        out.ok_or_else(|| self.not_present::<T>())
    }

    /// Attaches component `T`, initialised by `init`.
    ///
    /// If `T` is already attached the old instance is replaced.
    ///
    /// # Panics
    ///
    /// Panics if the [`ComponentPools`] implementation hands out an instance
    /// of another type.
    ///
    /// # Errors
    ///
    /// - [`EcsError::StaleEntityReference`] if the entity was destroyed
    /// - [`EcsError::UnregisteredComponentType`] if `T` is unknown to a
    ///   sealed registry
    pub fn add<T, F>(&self, init: F) -> EcsResult<&Self>
    where
        T: Component,
        F: FnOnce(&mut T),
    {
        let ty = self.component_type::<T>()?;
        if self.is_destroyed() {
            return Err(EcsError::StaleEntityReference(self.inner.entity));
        }

        let mut instance = self.inner.pools.acquire(&ty);
        let Some(component) = instance.downcast_mut::<T>() else {
            panic!(
                "component pools handed out a foreign instance for {}",
                ty.name()
            );
        };
        init(component);

        let mut record = self.inner.record.lock();
        if !record.valid {
            self.inner.pools.release(&ty, instance);
            return Err(EcsError::StaleEntityReference(self.inner.entity));
        }
        self.inner.pools.attach(self.inner.entity, &ty, instance);

        record.mask.insert(ty.index());
        self.inner.storage.mark_dirty(&mut record);
        Ok(self)
    }

    /// Attaches `T::default()`.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn add_default<T: Component>(&self) -> EcsResult<&Self> {
        self.add::<T, _>(|_| {})
    }

    /// Detaches component `T`.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ComponentNotPresent`] if `T` is not attached
    /// - [`EcsError::StaleEntityReference`] if the entity was destroyed
    /// - [`EcsError::UnregisteredComponentType`] if `T` is unknown to a
    ///   sealed registry
    pub fn remove<T: Component>(&self) -> EcsResult<&Self> {
        let ty = self.component_type::<T>()?;
        let mut record = self.inner.record.lock();
        if !record.valid {
            return Err(EcsError::StaleEntityReference(self.inner.entity));
        }
        if !record.mask.remove(ty.index()) {
            return Err(self.not_present::<T>());
        }

        if let Some(instance) = self.inner.pools.detach(self.inner.entity, &ty) {
            self.inner.pools.release(&ty, instance);
        }
        self.inner.storage.mark_dirty(&mut record);
        Ok(self)
    }

    /// Destroys the entity.
    ///
    /// Attached component instances go back to their pools immediately. The
    /// record stays until the next resolution pass has told every aspect
    /// index, and only then is the handle released for reuse.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntityReference`] if already destroyed.
    pub fn destroy(&self) -> EcsResult<()> {
        let mut record = self.inner.record.lock();
        if !record.valid {
            return Err(EcsError::StaleEntityReference(self.inner.entity));
        }
        record.valid = false;

        for index in record.mask.iter() {
            let Some(ty) = self.inner.registry.get(index) else {
                continue;
            };
            if let Some(instance) = self.inner.pools.detach(self.inner.entity, &ty) {
                self.inner.pools.release(&ty, instance);
            }
        }

        self.inner.storage.mark_dirty(&mut record);
        tracing::debug!("destroyed {}", self.inner.entity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ComponentStore;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Health(u32);
    impl Component for Health {}

    struct Fixture {
        storage: Arc<EntityStorage>,
        registry: Arc<ComponentTypeRegistry>,
        store: Arc<ComponentStore>,
    }

    impl Fixture {
        fn new(auto_register: bool) -> Self {
            Self {
                storage: Arc::new(EntityStorage::new(8)),
                registry: Arc::new(ComponentTypeRegistry::new(auto_register)),
                store: Arc::new(ComponentStore::new()),
            }
        }

        fn editor(&self, index: u32) -> EntityEditor {
            EntityEditor::new(
                Entity::new(index, 0),
                Arc::clone(&self.storage),
                Arc::clone(&self.registry),
                self.store.clone(),
            )
        }
    }

    #[test]
    fn test_add_get_remove() {
        let fx = Fixture::new(true);
        let editor = fx.editor(0);

        editor
            .add::<Position, _>(|p| {
                p.x = 1.0;
                p.y = 2.0;
            })
            .unwrap();
        assert!(editor.contains::<Position>());
        assert_eq!(editor.get::<Position>().unwrap(), Position { x: 1.0, y: 2.0 });

        editor.remove::<Position>().unwrap();
        assert!(!editor.contains::<Position>());
        assert!(matches!(
            editor.get::<Position>(),
            Err(EcsError::ComponentNotPresent { .. })
        ));
        assert!(matches!(
            editor.remove::<Position>(),
            Err(EcsError::ComponentNotPresent { .. })
        ));
    }

    #[test]
    fn test_add_then_remove_restores_mask() {
        let fx = Fixture::new(true);
        let editor = fx.editor(0);
        editor.add_default::<Health>().unwrap();

        let before = editor.mask();
        editor.add_default::<Position>().unwrap();
        assert_ne!(editor.mask(), before);
        editor.remove::<Position>().unwrap();
        assert_eq!(editor.mask(), before);
    }

    #[test]
    fn test_update_does_not_dirty() {
        let fx = Fixture::new(true);
        let editor = fx.editor(0);
        editor.add::<Health, _>(|h| h.0 = 10).unwrap();
        fx.storage.resolve(|_| {});

        let doubled = editor.update::<Health, _, _>(|h| {
            h.0 *= 2;
            h.0
        });
        assert_eq!(doubled, Ok(20));
        assert_eq!(fx.storage.pending(), 0);
        assert_eq!(editor.with::<Health, _, _>(|h| h.0), Ok(20));
    }

    #[test]
    fn test_mutations_enqueue_once() {
        let fx = Fixture::new(true);
        let editor = fx.editor(0);
        editor
            .add_default::<Health>()
            .and_then(|e| e.add_default::<Position>())
            .and_then(|e| e.remove::<Health>())
            .unwrap();
        assert_eq!(fx.storage.pending(), 1);
    }

    #[test]
    fn test_destroyed_editor_is_stale() {
        let fx = Fixture::new(true);
        let editor = fx.editor(0);
        let entity = editor.entity();
        editor.add_default::<Health>().unwrap();

        editor.destroy().unwrap();
        assert!(editor.is_destroyed());
        assert!(!editor.contains::<Health>());
        assert_eq!(
            editor.get::<Health>(),
            Err(EcsError::StaleEntityReference(entity))
        );
        assert_eq!(
            editor.add_default::<Position>().map(|_| ()),
            Err(EcsError::StaleEntityReference(entity))
        );
        assert_eq!(editor.destroy(), Err(EcsError::StaleEntityReference(entity)));

        // Instances were handed back to the pool.
        let health = fx.registry.register::<Health>();
        assert_eq!(fx.store.attached_count(&health), 0);
        assert_eq!(fx.store.free_count(&health), 1);
    }

    #[test]
    fn test_sealed_registry() {
        let fx = Fixture::new(false);
        let editor = fx.editor(0);

        assert!(!editor.contains::<Health>());
        assert!(matches!(
            editor.add_default::<Health>(),
            Err(EcsError::UnregisteredComponentType(_))
        ));

        fx.registry.register::<Health>();
        assert!(editor.add_default::<Health>().is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let fx = Fixture::new(true);
        let editor = fx.editor(0);
        let clone = editor.clone();
        clone.add_default::<Health>().unwrap();
        assert!(editor.contains::<Health>());
        assert!(editor.same_as(&clone));
        assert!(!editor.same_as(&fx.editor(1)));
    }

    #[test]
    fn test_update_reads_same_type_on_other_entity() {
        let fx = Fixture::new(true);
        let a = fx.editor(0);
        let b = fx.editor(1);
        a.add::<Position, _>(|p| p.x = 1.0).unwrap();
        b.add::<Position, _>(|p| p.x = 10.0).unwrap();

        a.update::<Position, _, _>(|p| p.x += b.get::<Position>().unwrap().x)
            .unwrap();
        assert_eq!(a.get::<Position>().unwrap().x, 11.0);
    }

    #[test]
    fn test_update_reads_own_other_component() {
        let fx = Fixture::new(true);
        let a = fx.editor(0);
        a.add::<Health, _>(|h| h.0 = 3)
            .and_then(|e| e.add_default::<Position>())
            .unwrap();

        a.update::<Position, _, _>(|p| {
            p.y = a.with::<Health, _, _>(|h| f32::from(u8::try_from(h.0).unwrap_or(0))).unwrap();
            assert!(a.contains::<Health>());
        })
        .unwrap();
        assert_eq!(a.get::<Position>().unwrap().y, 3.0);
    }

    struct ForeignPools(ComponentStore);

    impl ComponentPools for ForeignPools {
        fn acquire(&self, _ty: &ComponentType) -> crate::ecs::ComponentBox {
            Box::new(0u8)
        }

        fn release(&self, ty: &ComponentType, instance: crate::ecs::ComponentBox) {
            self.0.release(ty, instance);
        }

        fn attach(&self, entity: Entity, ty: &ComponentType, instance: crate::ecs::ComponentBox) {
            self.0.attach(entity, ty, instance);
        }

        fn detach(&self, entity: Entity, ty: &ComponentType) -> Option<crate::ecs::ComponentBox> {
            self.0.detach(entity, ty)
        }

        fn with_instance(
            &self,
            entity: Entity,
            ty: &ComponentType,
            visit: &mut dyn FnMut(&mut (dyn std::any::Any + Send + Sync)),
        ) -> bool {
            self.0.with_instance(entity, ty, visit)
        }
    }

    #[test]
    #[should_panic(expected = "foreign instance")]
    fn test_foreign_pool_instance_is_fatal() {
        let editor = EntityEditor::new(
            Entity::new(0, 0),
            Arc::new(EntityStorage::new(1)),
            Arc::new(ComponentTypeRegistry::new(true)),
            Arc::new(ForeignPools(ComponentStore::new())),
        );
        let _ = editor.add_default::<Health>();
    }
}
