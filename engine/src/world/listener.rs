//! World mutation listeners.
//!
//! Listeners are plain function pointers paired with a caller-supplied
//! `u64`, so no allocation or capture is involved at the core boundary.
//! They are invoked synchronously, after the mutation that triggered them
//! has fully committed, and receive the world by shared reference.

use crate::{entity::Entity, schema::DataType, world::World};

/// Called when an entity is created (`created == true`) or destroyed.
pub type EntityCallback = fn(world: &World, entity: Entity, created: bool, user_data: u64);

/// Called when an entity's parent changes.
pub type ParentCallback =
    fn(world: &World, entity: Entity, old_parent: Entity, new_parent: Entity, user_data: u64);

/// Called when a component, array, or tag is added (`added == true`) or
/// removed.
pub type DataCallback =
    fn(world: &World, entity: Entity, data_type: DataType, added: bool, user_data: u64);

/// The registered listener tables of a world.
#[derive(Debug, Default, Clone)]
pub(crate) struct Listeners {
    pub(crate) entity: Vec<(EntityCallback, u64)>,
    pub(crate) parent: Vec<(ParentCallback, u64)>,
    pub(crate) data: Vec<(DataCallback, u64)>,
}

/// Remove the first matching `(callback, user_data)` pair from a listener
/// table. Returns whether a pair was removed.
pub(crate) fn remove_pair<F: PartialEq>(table: &mut Vec<(F, u64)>, callback: F, user_data: u64) -> bool {
    if let Some(position) = table
        .iter()
        .position(|(f, d)| *f == callback && *d == user_data)
    {
        table.remove(position);
        true
    } else {
        false
    }
}
