//! # Engine Context
//!
//! The entry point for application code. An [`EngineContext`] owns every
//! piece of per-engine state: handles, the component type registry, entity
//! records, the editor cache and one [`AspectIndex`] per system.
//!
//! ## Cycle
//!
//! ```text
//! producers (any thread)          resolve() (alone)
//! ──────────────────────          ─────────────────────────────────────
//! create / manage                 drain dirty queue snapshot
//! editor.add / remove / destroy → for each record: every AspectIndex
//!   (marks dirty, enqueues once)    if invalid: evict editor, release handle
//! ```
//!
//! Systems get a [`SystemContext`] from [`EngineContext::context_for`]. It
//! reads one aspect's membership and can create or manage entities itself.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::config::EngineConfig;
use crate::ecs::{
    AspectIndex, Component, ComponentType, ComponentTypeRegistry, Entity, EntityEditor,
    EntityStorage, HandleProvider, SystemDescriptor,
};
use crate::error::{EcsError, EcsResult};
use crate::memory::{ComponentPools, ComponentStore};

/// Applies an initial component set to a freshly created entity.
///
/// Any `Fn(&EntityEditor) -> EcsResult<()>` closure is a blueprint.
pub trait Blueprint: Send + Sync {
    /// Populates `editor`.
    ///
    /// # Errors
    ///
    /// Whatever the blueprint reports. The half-built entity is destroyed by
    /// the caller.
    fn apply(&self, editor: &EntityEditor) -> EcsResult<()>;
}

impl<F> Blueprint for F
where
    F: Fn(&EntityEditor) -> EcsResult<()> + Send + Sync,
{
    fn apply(&self, editor: &EntityEditor) -> EcsResult<()> {
        self(editor)
    }
}

/// Entity creation and lookup, shared by the engine and system contexts.
pub trait Context {
    /// Creates an entity, applying `blueprint` before returning its editor.
    ///
    /// # Errors
    ///
    /// - [`EcsError::HandleSpaceExhausted`] if no handle is left
    /// - the blueprint's error, after the new entity has been destroyed
    fn create(&self, blueprint: Option<&dyn Blueprint>) -> EcsResult<EntityEditor>;

    /// Returns the cached editor for `entity`.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntityReference`] if `entity` was never issued or
    /// its slot has been released.
    fn manage(&self, entity: Entity) -> EcsResult<EntityEditor>;
}

/// Entity-access state. Never refers back to the contexts holding it.
struct Entities {
    handles: HandleProvider,
    registry: Arc<ComponentTypeRegistry>,
    storage: Arc<EntityStorage>,
    pools: Arc<dyn ComponentPools>,
    editors: DashMap<Entity, EntityEditor>,
}

impl Entities {
    fn editor_for(&self, entity: Entity) -> EntityEditor {
        self.editors
            .entry(entity)
            .or_insert_with(|| {
                EntityEditor::new(
                    entity,
                    Arc::clone(&self.storage),
                    Arc::clone(&self.registry),
                    Arc::clone(&self.pools),
                )
            })
            .clone()
    }
}

impl Context for Entities {
    fn create(&self, blueprint: Option<&dyn Blueprint>) -> EcsResult<EntityEditor> {
        let entity = self.handles.acquire()?;
        let editor = self.editor_for(entity);
        tracing::debug!("created {entity}");

        if let Some(blueprint) = blueprint {
            if let Err(err) = blueprint.apply(&editor) {
                if !editor.is_destroyed() {
                    editor.destroy()?;
                }
                return Err(err);
            }
        }
        Ok(editor)
    }

    fn manage(&self, entity: Entity) -> EcsResult<EntityEditor> {
        if let Some(editor) = self.editors.get(&entity) {
            return Ok(editor.clone());
        }
        if !self.handles.is_alive(entity) {
            return Err(EcsError::StaleEntityReference(entity));
        }
        Ok(self.editor_for(entity))
    }
}

/// Summary of one resolution pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResolveStats {
    /// Dirty records delivered to the aspect indexes.
    pub processed: usize,
    /// Destroyed entities whose handles were released.
    pub destroyed: usize,
    /// Aspect indexes notified.
    pub aspects: usize,
}

/// Owner of all entity, component and membership state for one engine.
///
/// # Example
///
/// ```rust
/// use tessera_core::{Aspect, Component, Context, EngineContext, SystemDescriptor};
///
/// #[derive(Clone, Default)]
/// struct Position { x: f32, y: f32 }
/// impl Component for Position {}
///
/// let engine = EngineContext::new();
/// engine.register::<Position>();
/// let movers = engine
///     .context_for(&SystemDescriptor::new("movers", Aspect::new().include::<Position>()))
///     .unwrap();
///
/// let editor = engine.create(None).unwrap();
/// editor.add::<Position, _>(|p| p.x = 1.0).unwrap();
/// engine.resolve();
///
/// assert!(movers.contains(editor.entity()));
/// ```
pub struct EngineContext {
    entities: Arc<Entities>,
    systems: RwLock<HashMap<String, Arc<AspectIndex>>>,
    resolving: Mutex<()>,
    config: EngineConfig,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("entities", &self.entity_count())
            .field("systems", &self.system_count())
            .field("pending", &self.pending())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineContext {
    /// Creates a context with the default configuration and a
    /// [`ComponentStore`].
    #[must_use]
    pub fn new() -> Self {
        Self::build(EngineConfig::default(), Arc::new(ComponentStore::new()))
    }

    /// Creates a context with a [`ComponentStore`].
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if `config` fails validation.
    pub fn with_config(config: EngineConfig) -> EcsResult<Self> {
        Self::with_pools(config, Arc::new(ComponentStore::new()))
    }

    /// Creates a context backed by custom component pools.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] if `config` fails validation.
    pub fn with_pools(config: EngineConfig, pools: Arc<dyn ComponentPools>) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(config, pools))
    }

    fn build(config: EngineConfig, pools: Arc<dyn ComponentPools>) -> Self {
        let reserve = config.initial_capacity;
        let entities = Entities {
            handles: HandleProvider::new(config.max_entities, reserve),
            registry: Arc::new(ComponentTypeRegistry::new(config.auto_register)),
            storage: Arc::new(EntityStorage::new(reserve)),
            pools,
            editors: DashMap::with_capacity(reserve),
        };
        tracing::debug!(
            "engine context up: {} reserved, max {} entities, auto_register={}",
            reserve,
            config.max_entities,
            config.auto_register
        );
        Self {
            entities: Arc::new(entities),
            systems: RwLock::new(HashMap::new()),
            resolving: Mutex::new(()),
            config,
        }
    }

    /// Returns the configuration this context was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the component type registry.
    #[must_use]
    pub fn registry(&self) -> &ComponentTypeRegistry {
        &self.entities.registry
    }

    /// Registers component type `T`, returning its descriptor.
    ///
    /// Registering an already known type returns the existing descriptor.
    pub fn register<T: Component>(&self) -> ComponentType {
        self.entities.registry.register::<T>()
    }

    /// Checks whether `entity` is a live handle.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.handles.is_alive(entity)
    }

    /// Returns the number of live handles, destroyed-but-unresolved included.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.handles.alive_count()
    }

    /// Returns the number of entities waiting for the next pass.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.entities.storage.pending()
    }

    /// Returns the number of systems with an aspect index.
    #[must_use]
    pub fn system_count(&self) -> usize {
        self.systems.read().len()
    }

    /// Returns the system context for `descriptor`, building its aspect index
    /// on first use.
    ///
    /// Indexes are cached by system name. A new index starts out tracking
    /// every existing entity that matches.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnregisteredComponentType`] if the aspect names a type
    /// that was never registered.
    pub fn context_for(&self, descriptor: &SystemDescriptor) -> EcsResult<SystemContext> {
        if let Some(index) = self.systems.read().get(descriptor.name()) {
            return Ok(self.system_context(descriptor, index));
        }

        let mut systems = self.systems.write();
        if let Some(index) = systems.get(descriptor.name()) {
            return Ok(self.system_context(descriptor, index));
        }

        let index = AspectIndex::compile(descriptor, &self.entities.registry)?;
        for record in self.entities.storage.snapshot() {
            index.resolve(&record);
        }
        let index = Arc::new(index);
        systems.insert(descriptor.name().to_owned(), Arc::clone(&index));

        Ok(SystemContext {
            index,
            entities: Arc::clone(&self.entities),
        })
    }

    fn system_context(&self, descriptor: &SystemDescriptor, index: &Arc<AspectIndex>) -> SystemContext {
        if index.aspect() != descriptor.aspect() {
            tracing::warn!(
                "system {} requested with a different aspect; keeping the first one",
                descriptor.name()
            );
        }
        SystemContext {
            index: Arc::clone(index),
            entities: Arc::clone(&self.entities),
        }
    }

    /// Runs one resolution pass.
    ///
    /// Every entity dirtied before the call is delivered to every aspect
    /// index exactly once. Destroyed entities then lose their cached editor
    /// and their handle is released for reuse.
    ///
    /// Producers must be quiescent while this runs.
    ///
    /// # Panics
    ///
    /// Panics if another resolution pass is already running on this context.
    pub fn resolve(&self) -> ResolveStats {
        let Some(_resolving) = self.resolving.try_lock() else {
            panic!("resolve() called while a resolution pass is running");
        };

        let indexes: Vec<Arc<AspectIndex>> = self.systems.read().values().cloned().collect();
        let entities = &self.entities;
        let mut destroyed = 0;

        let processed = entities.storage.resolve(|record| {
            for index in &indexes {
                index.resolve(record);
            }
            if !record.is_valid() {
                let entity = record.entity();
                entities.editors.remove(&entity);
                entities.handles.release(entity);
                destroyed += 1;
            }
        });

        let stats = ResolveStats {
            processed,
            destroyed,
            aspects: indexes.len(),
        };
        tracing::debug!(
            "resolved {} dirty entities across {} aspects, {} released",
            stats.processed,
            stats.aspects,
            stats.destroyed
        );
        stats
    }
}

impl Context for EngineContext {
    fn create(&self, blueprint: Option<&dyn Blueprint>) -> EcsResult<EntityEditor> {
        self.entities.create(blueprint)
    }

    fn manage(&self, entity: Entity) -> EcsResult<EntityEditor> {
        self.entities.manage(entity)
    }
}

/// A system's view: one aspect's membership plus entity creation and lookup.
#[derive(Clone)]
pub struct SystemContext {
    index: Arc<AspectIndex>,
    entities: Arc<Entities>,
}

impl std::fmt::Debug for SystemContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemContext")
            .field("name", &self.index.name())
            .field("tracked", &self.index.len())
            .finish_non_exhaustive()
    }
}

impl SystemContext {
    /// Returns the system's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.index.name()
    }

    /// Snapshots the entities currently matching the aspect, sorted.
    #[must_use]
    pub fn entities(&self) -> Vec<Entity> {
        self.index.entities()
    }

    /// Checks whether `entity` currently matches.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.index.contains(entity)
    }

    /// Returns the number of matching entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Checks if no entity matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the underlying aspect index.
    #[must_use]
    pub fn aspect_index(&self) -> &AspectIndex {
        &self.index
    }

    /// Checks whether both contexts read the same aspect index.
    #[must_use]
    pub fn shares_index_with(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.index, &other.index)
    }
}

impl Context for SystemContext {
    fn create(&self, blueprint: Option<&dyn Blueprint>) -> EcsResult<EntityEditor> {
        self.entities.create(blueprint)
    }

    fn manage(&self, entity: Entity) -> EcsResult<EntityEditor> {
        self.entities.manage(entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::Aspect;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }
    impl Component for Velocity {}

    #[derive(Clone, Debug, Default)]
    struct Frozen;
    impl Component for Frozen {}

    fn engine() -> EngineContext {
        let engine = EngineContext::new();
        engine.register::<Position>();
        engine.register::<Velocity>();
        engine.register::<Frozen>();
        engine
    }

    fn movers() -> SystemDescriptor {
        SystemDescriptor::new(
            "movers",
            Aspect::new()
                .include::<Position>()
                .include::<Velocity>()
                .exclude::<Frozen>(),
        )
    }

    #[test]
    fn test_manage_returns_cached_editor() {
        let engine = engine();
        let editor = engine.create(None).unwrap();
        let again = engine.manage(editor.entity()).unwrap();
        assert!(editor.same_as(&again));
    }

    #[test]
    fn test_manage_unknown_handle_is_stale() {
        let engine = engine();
        let never_issued = Entity::new(42, 0);
        assert_eq!(
            engine.manage(never_issued).unwrap_err(),
            EcsError::StaleEntityReference(never_issued)
        );
    }

    #[test]
    fn test_context_for_is_cached_by_name() {
        let engine = engine();
        let first = engine.context_for(&movers()).unwrap();
        let second = engine.context_for(&movers()).unwrap();
        assert!(first.shares_index_with(&second));

        // Same name, different aspect: the first index wins.
        let renamed = SystemDescriptor::new("movers", Aspect::new().include::<Frozen>());
        let third = engine.context_for(&renamed).unwrap();
        assert!(first.shares_index_with(&third));
        assert_eq!(engine.system_count(), 1);
    }

    #[test]
    fn test_exclusion_and_seeding() {
        let engine = engine();
        let a = engine.create(None).unwrap();
        a.add_default::<Position>()
            .and_then(|e| e.add_default::<Velocity>())
            .unwrap();
        engine.resolve();

        // Built after `a` already matches.
        let movers = engine.context_for(&movers()).unwrap();
        assert_eq!(movers.entities(), vec![a.entity()]);

        a.add_default::<Frozen>().unwrap();
        engine.resolve();
        assert!(movers.is_empty());

        a.remove::<Frozen>().unwrap();
        engine.resolve();
        assert!(movers.contains(a.entity()));
    }

    #[test]
    fn test_resolve_stats_and_release() {
        let engine = engine();
        let _movers = engine.context_for(&movers()).unwrap();
        let a = engine.create(None).unwrap();
        let b = engine.create(None).unwrap();

        let stats = engine.resolve();
        assert_eq!(
            stats,
            ResolveStats {
                processed: 2,
                destroyed: 0,
                aspects: 1
            }
        );

        b.destroy().unwrap();
        assert!(engine.is_alive(b.entity()));
        let stats = engine.resolve();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.destroyed, 1);
        assert!(!engine.is_alive(b.entity()));
        assert!(engine.is_alive(a.entity()));
        assert_eq!(engine.entity_count(), 1);
        assert_eq!(
            engine.manage(b.entity()).unwrap_err(),
            EcsError::StaleEntityReference(b.entity())
        );
    }

    #[test]
    fn test_blueprint_applies_components() {
        let engine = engine();
        let spawn = |e: &EntityEditor| -> EcsResult<()> {
            e.add::<Position, _>(|p| p.x = 3.0)?;
            e.add_default::<Velocity>()?;
            Ok(())
        };
        let editor = engine.create(Some(&spawn)).unwrap();
        assert_eq!(editor.get::<Position>().unwrap().x, 3.0);
        assert!(editor.contains::<Velocity>());
    }

    #[test]
    fn test_failed_blueprint_destroys_entity() {
        let engine = engine();
        let movers = engine.context_for(&movers()).unwrap();
        let broken = |e: &EntityEditor| -> EcsResult<()> {
            e.add_default::<Position>()?;
            e.add_default::<Velocity>()?;
            Err(EcsError::Blueprint("missing sprite".to_owned()))
        };

        let err = engine.create(Some(&broken)).unwrap_err();
        assert_eq!(err, EcsError::Blueprint("missing sprite".to_owned()));
        assert_eq!(engine.resolve().destroyed, 1);
        assert!(movers.is_empty());
        assert_eq!(engine.entity_count(), 0);
    }

    #[test]
    fn test_system_context_creates_entities() {
        let engine = engine();
        let movers = engine.context_for(&movers()).unwrap();
        let editor = movers.create(None).unwrap();
        editor
            .add_default::<Position>()
            .and_then(|e| e.add_default::<Velocity>())
            .unwrap();
        assert!(engine.manage(editor.entity()).unwrap().same_as(&editor));

        engine.resolve();
        assert_eq!(movers.len(), 1);
        assert_eq!(movers.name(), "movers");

        let index = movers.aspect_index();
        assert_eq!(index.entities(), movers.entities());
        assert!(index.matches(&editor.mask()));
        assert_eq!(index.aspect(), self::movers().aspect());
    }

    #[test]
    fn test_sealed_config_rejects_unknown_types() {
        let engine = EngineContext::with_config(EngineConfig::sealed()).unwrap();
        engine.register::<Position>();
        let editor = engine.create(None).unwrap();

        assert!(editor.add_default::<Position>().is_ok());
        assert!(matches!(
            editor.add_default::<Velocity>(),
            Err(EcsError::UnregisteredComponentType(_))
        ));
        assert!(matches!(
            engine.context_for(&movers()),
            Err(EcsError::UnregisteredComponentType(_))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = EngineConfig {
            max_entities: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            EngineContext::with_config(config),
            Err(EcsError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_handle_exhaustion() {
        let config = EngineConfig {
            initial_capacity: 1,
            max_entities: 1,
            auto_register: true,
        };
        let engine = EngineContext::with_config(config).unwrap();
        let only = engine.create(None).unwrap();
        assert_eq!(
            engine.create(None).unwrap_err(),
            EcsError::HandleSpaceExhausted { capacity: 1 }
        );

        only.destroy().unwrap();
        assert!(engine.create(None).is_err());
        engine.resolve();
        let reused = engine.create(None).unwrap();
        assert_eq!(reused.entity().index(), only.entity().index());
        assert_ne!(reused.entity(), only.entity());
    }
}
