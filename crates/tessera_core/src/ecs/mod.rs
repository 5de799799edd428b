//! # Entity Component System
//!
//! Entity bookkeeping with incremental aspect matching.
//!
//! ## Design Philosophy
//!
//! - Entity handles are slot indices with generation counters
//! - Component presence is a bitmask per entity, one bit per registered type
//! - Mutations only mark entities dirty; membership is recomputed for dirty
//!   entities once per cycle, never by scanning the whole population
//! - Component data lives behind the [`ComponentPools`](crate::ComponentPools)
//!   seam

mod aspect;
mod component;
mod editor;
mod entity;
mod mask;
mod storage;

pub use aspect::{Aspect, AspectIndex, SystemDescriptor, Transition};
pub use component::{Component, ComponentBox, ComponentKey, ComponentType, ComponentTypeRegistry};
pub use editor::EntityEditor;
pub use entity::{Entity, HandleProvider};
pub use mask::{ComponentMask, MaskIter};
pub use storage::{EntityRecord, EntityStorage};
