//! An archetype-based entity-component data store.
//!
//! Entities are plain 32-bit ids. Each carries a dynamic set of fixed-size
//! components (inline rows), variable-length typed arrays, and boolean tags;
//! entities sharing the same composition are packed together in chunks so
//! bulk traversal walks contiguous memory. The [`world::World`] façade owns
//! all state and exposes every operation; [`operation::Operation`] records
//! batched edits for later playback, and `World::save`/`World::load` give
//! the binary wire form.

pub mod arrays;
pub mod chunk;
pub mod entity;
pub mod error;
pub mod mask;
pub mod operation;
pub mod references;
pub mod schema;
pub mod slot;
pub mod world;

pub use chunk::Definition;
pub use entity::Entity;
pub use error::Error;
pub use mask::BitMask;
pub use operation::Operation;
pub use references::LocalRef;
pub use schema::{ArrayType, ComponentType, DataKind, DataType, Schema, TagType, TypeHash};
pub use world::World;
