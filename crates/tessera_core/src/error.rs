//! # Engine Error Types
//!
//! All errors that can surface from entity and component bookkeeping.
//!
//! Every error is local and synchronous: it is returned at the call site of
//! the offending operation and never retried internally.

use thiserror::Error;

use crate::ecs::Entity;

/// Errors that can occur while mutating or querying the engine context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    /// `get`/`remove` on a component type the entity does not carry.
    #[error("component {component} not present on {entity}")]
    ComponentNotPresent {
        /// The entity that was queried.
        entity: Entity,
        /// Name of the missing component type.
        component: &'static str,
    },

    /// A component type was used before it was registered.
    #[error("component type not registered: {0}")]
    UnregisteredComponentType(&'static str),

    /// The entity was destroyed, or the handle belongs to a released slot.
    #[error("stale entity reference: {0}")]
    StaleEntityReference(Entity),

    /// No more entity handles can be issued.
    #[error("entity handle space exhausted: capacity {capacity}")]
    HandleSpaceExhausted {
        /// The configured handle capacity.
        capacity: u32,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A blueprint failed to apply its initial component set.
    #[error("blueprint failed: {0}")]
    Blueprint(String),
}

/// Result type for engine operations.
pub type EcsResult<T> = Result<T, EcsError>;
