//! Entity handles.
//!
//! An [`Entity`] is a plain 32-bit id into the world's slot table. Entities
//! own nothing themselves; every operation goes through the world that issued
//! the id. Id `0` is reserved as the "none" sentinel, so the first entity a
//! world hands out is always `1`.

use std::fmt;

/// A handle to an entity in a world.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u32);

impl Entity {
    /// The reserved "no entity" sentinel.
    pub const NONE: Self = Self(0);

    /// Construct an entity handle from a raw id value.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Get the index of this entity in id-indexed storage (e.g. the slot table).
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }

    /// Check whether this is the "no entity" sentinel.
    #[inline]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// Check whether this handle names an actual id.
    #[inline]
    pub const fn is_some(&self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for Entity {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "entity(none)")
        } else {
            write!(f, "entity({})", self.0)
        }
    }
}
