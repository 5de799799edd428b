//! # Component Types
//!
//! Components are plain data attached to entities. Each distinct component
//! type is mapped, on registration, to a stable bit index used in
//! [`ComponentMask`](super::ComponentMask)s. Indices are append-only and
//! never reused.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{EcsError, EcsResult};

/// A type-erased component instance as handed around by pools.
pub type ComponentBox = Box<dyn Any + Send + Sync>;

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Default`: pools construct and reset instances from it
/// - `Send + Sync`: producers mutate entities from any thread
///
/// # Example
///
/// ```rust
/// use tessera_core::Component;
///
/// #[derive(Clone, Copy, Debug, Default)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// impl Component for Position {}
/// ```
pub trait Component: Default + Send + Sync + 'static {
    /// Human-readable name used in errors and logs.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Identifies a component type before it has a bit index.
///
/// Aspects are declared in terms of keys and compiled to masks later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentKey {
    type_id: TypeId,
    name: &'static str,
}

impl ComponentKey {
    /// Returns the key for component type `T`.
    #[must_use]
    pub fn of<T: Component>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: T::type_name(),
        }
    }

    /// Returns the component's name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }
}

/// A registered component type.
#[derive(Clone, Copy)]
pub struct ComponentType {
    index: u32,
    key: ComponentKey,
    construct: fn() -> ComponentBox,
    reset: fn(&mut (dyn Any + Send + Sync)),
}

fn construct<T: Component>() -> ComponentBox {
    Box::new(T::default())
}

fn reset<T: Component>(instance: &mut (dyn Any + Send + Sync)) {
    if let Some(value) = instance.downcast_mut::<T>() {
        *value = T::default();
    }
}

impl ComponentType {
    /// Returns the bit index of this type.
    #[inline]
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Returns the type's key.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> ComponentKey {
        self.key
    }

    /// Returns the type's name.
    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.key.name
    }

    /// Builds a fresh default instance.
    #[must_use]
    pub fn construct(&self) -> ComponentBox {
        (self.construct)()
    }

    /// Resets `instance` to the default value.
    pub fn reset(&self, instance: &mut (dyn Any + Send + Sync)) {
        (self.reset)(instance);
    }
}

impl std::fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentType")
            .field("index", &self.index)
            .field("name", &self.key.name)
            .finish()
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.key == other.key
    }
}

impl Eq for ComponentType {}

#[derive(Debug, Default)]
struct Mappings {
    by_type: HashMap<TypeId, ComponentType>,
    by_index: Vec<ComponentType>,
}

/// Assigns every component type a stable bit index.
///
/// With auto-registration on, [`index_of`](Self::index_of) assigns an index
/// the first time a type is seen. With it off, the registry only knows types
/// passed to [`register`](Self::register).
#[derive(Debug)]
pub struct ComponentTypeRegistry {
    mappings: RwLock<Mappings>,
    auto_register: bool,
}

impl ComponentTypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(auto_register: bool) -> Self {
        Self {
            mappings: RwLock::new(Mappings::default()),
            auto_register,
        }
    }

    /// Returns whether unknown types are registered on first use.
    #[must_use]
    pub const fn auto_register(&self) -> bool {
        self.auto_register
    }

    /// Registers `T`, or returns its existing registration.
    pub fn register<T: Component>(&self) -> ComponentType {
        if let Some(ty) = self.mappings.read().by_type.get(&TypeId::of::<T>()) {
            return *ty;
        }

        let mut mappings = self.mappings.write();
        // Another thread may have registered `T` between the two locks.
        if let Some(ty) = mappings.by_type.get(&TypeId::of::<T>()) {
            return *ty;
        }

        let index = u32::try_from(mappings.by_index.len())
            .unwrap_or_else(|_| panic!("component type index space exhausted"));
        let ty = ComponentType {
            index,
            key: ComponentKey::of::<T>(),
            construct: construct::<T>,
            reset: reset::<T>,
        };
        mappings.by_type.insert(TypeId::of::<T>(), ty);
        mappings.by_index.push(ty);
        tracing::debug!("registered component {} at index {}", ty.name(), index);
        ty
    }

    /// Returns the registration for `T`, assigning one first if
    /// auto-registration is on.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnregisteredComponentType`] if `T` is unknown and
    /// auto-registration is off.
    pub fn index_of<T: Component>(&self) -> EcsResult<ComponentType> {
        if self.auto_register {
            Ok(self.register::<T>())
        } else {
            self.lookup(ComponentKey::of::<T>())
        }
    }

    /// Returns the registration for `key` without ever assigning one.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnregisteredComponentType`] if the type is unknown.
    pub fn lookup(&self, key: ComponentKey) -> EcsResult<ComponentType> {
        self.find(key)
            .ok_or(EcsError::UnregisteredComponentType(key.name()))
    }

    /// Returns the registration for `key`, if any.
    #[must_use]
    pub fn find(&self, key: ComponentKey) -> Option<ComponentType> {
        self.mappings.read().by_type.get(&key.type_id).copied()
    }

    /// Returns the type registered at `index`.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<ComponentType> {
        self.mappings.read().by_index.get(index as usize).copied()
    }

    /// Returns the number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.read().by_index.len()
    }

    /// Checks if no type is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
