//! # Memory Management
//!
//! Component instance storage. The engine only talks to it through the
//! [`ComponentPools`] contract, so applications can bring their own layout;
//! [`ComponentStore`] is the default.

mod pool;

pub use pool::{ComponentPools, ComponentStore};
