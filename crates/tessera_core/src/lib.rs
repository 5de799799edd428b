//! # TESSERA Core Engine
//!
//! Entity bookkeeping for an Entity Component System with incremental aspect
//! matching:
//! - Generation-checked entity handles, reused only after full resolution
//! - One component bitmask per entity, one dirty flag, one queue
//! - Per-system aspect indexes updated from dirty entities only
//!
//! ## Architecture Rules
//!
//! 1. **Editors are the only mutation path** - one cached editor per entity
//! 2. **Mutations never touch aspect indexes** - they only mark dirty
//! 3. **`resolve()` is the single serialization point** - run it alone, once
//!    per cycle
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{Aspect, Component, Context, EngineContext, SystemDescriptor};
//!
//! #[derive(Clone, Default)]
//! struct Position { x: f32, y: f32 }
//! impl Component for Position {}
//!
//! #[derive(Clone, Default)]
//! struct Velocity { dx: f32, dy: f32 }
//! impl Component for Velocity {}
//!
//! let engine = EngineContext::new();
//! engine.register::<Position>();
//! engine.register::<Velocity>();
//!
//! let physics = engine
//!     .context_for(&SystemDescriptor::new(
//!         "physics",
//!         Aspect::new().include::<Position>().include::<Velocity>(),
//!     ))
//!     .unwrap();
//!
//! let ball = engine.create(None).unwrap();
//! ball.add::<Position, _>(|p| p.y = 10.0).unwrap();
//! ball.add::<Velocity, _>(|v| v.dy = -1.0).unwrap();
//! engine.resolve();
//!
//! for entity in physics.entities() {
//!     let editor = engine.manage(entity).unwrap();
//!     let velocity = editor.get::<Velocity>().unwrap();
//!     editor
//!         .update::<Position, _, _>(|p| {
//!             p.x += velocity.dx;
//!             p.y += velocity.dy;
//!         })
//!         .unwrap();
//! }
//! assert_eq!(ball.get::<Position>().unwrap().y, 9.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod context;
pub mod ecs;
pub mod error;
pub mod memory;

pub use config::EngineConfig;
pub use context::{Blueprint, Context, EngineContext, ResolveStats, SystemContext};
pub use ecs::{
    Aspect, AspectIndex, Component, ComponentBox, ComponentKey, ComponentMask, ComponentType,
    ComponentTypeRegistry, Entity, EntityEditor, EntityRecord, EntityStorage, HandleProvider,
    SystemDescriptor, Transition,
};
pub use error::{EcsError, EcsResult};
pub use memory::{ComponentPools, ComponentStore};
