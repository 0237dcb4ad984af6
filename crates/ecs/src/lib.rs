//! Sparse-set entity-component system: stable `(index, generation)` entity
//! identities, dense per-type component storage with swap-removal, type
//! registration frozen at finalize, and the built-in update systems
//! (transform, hierarchy, skin, object, light, script, animation).

mod aabb;
mod components;
mod entity;
mod library;
pub mod systems;

pub use aabb::Aabb;
pub use components::*;
pub use entity::Entity;
pub use library::{
    BuiltinKeys, ComponentDesc, ComponentLibrary, ComponentValue, EcsContext, EcsError,
    InternalData, TypeHooks, TypeKey,
};
