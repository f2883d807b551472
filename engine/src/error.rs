//! Error taxonomy for the recoverable surfaces.
//!
//! Hot-path world operations treat precondition violations as programmer
//! errors and check them with debug assertions only. The surfaces that
//! consume external input (the binary world format and recorded operation
//! playback) return these errors instead.

use thiserror::Error;

use crate::{
    entity::Entity,
    schema::{ArrayType, ComponentType},
};

/// Errors surfaced by deserialization and operation playback.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Playback addressed an entity whose id is the none sentinel, out of
    /// range, or freed.
    #[error("{0} does not exist")]
    EntityMissing(Entity),

    /// Playback set or removed a component the entity does not carry.
    #[error("component {0:?} is not present")]
    ComponentMissing(ComponentType),

    /// Playback added a component the entity already carries.
    #[error("component {0:?} is already present")]
    ComponentAlreadyPresent(ComponentType),

    /// Playback resized or wrote an array the entity does not carry.
    #[error("array {0:?} is not present")]
    ArrayMissing(ArrayType),

    /// Playback created an array the entity already carries.
    #[error("array {0:?} is already present")]
    ArrayAlreadyPresent(ArrayType),

    /// Playback removed a reference at a local index that is zero or past
    /// the end of the entity's slice.
    #[error("{0} has no such reference")]
    ReferenceMissing(Entity),

    /// Playback parented an entity to itself.
    #[error("{0} cannot be made a parent of itself")]
    InvalidParent(Entity),

    /// Operation playback hit an instruction tag it does not know.
    #[error("unknown instruction tag {0:#04x}")]
    UnknownInstruction(u8),

    /// Operation playback referenced a type hash the target schema has not
    /// registered, or registered in a different namespace.
    #[error("unknown type hash {0:#x}")]
    UnknownTypeHash(i64),

    /// The serialized world header carries an unsupported version.
    #[error("unsupported format version {found} (expected {expected})")]
    VersionMismatch {
        /// The version this build reads and writes.
        expected: u32,
        /// The version found in the header.
        found: u32,
    },

    /// The input ended before the structure it promised.
    #[error("input truncated")]
    Truncated,

    /// The input decoded to something structurally impossible.
    #[error("corrupt input: {0}")]
    Corrupt(&'static str),
}

impl From<std::io::Error> for Error {
    fn from(_: std::io::Error) -> Self {
        // Readers here only ever fail by running out of bytes.
        Error::Truncated
    }
}
