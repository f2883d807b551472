//! Entity-to-entity references.
//!
//! All reference targets live in one packed global vector, partitioned into
//! per-entity contiguous slices; each entity's slot names its slice with a
//! (start, count) range. Callers address references by 1-based local index
//! (`0` means none). Inserting or removing in one slice shifts the recorded
//! start of every slice behind it, which is O(number of entities) and fine
//! for this workload.
//!
//! Targets are plain entity ids. They are not tracked across destruction;
//! a caller that destroys a referenced entity keeps a dangling id.

use crate::{
    entity::Entity,
    slot::{ReferenceRange, SlotTable},
};

/// A 1-based local reference index on some entity. `0` is the none value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalRef(u32);

impl LocalRef {
    /// The "no reference" value.
    pub const NONE: Self = Self(0);

    /// Construct from a raw 1-based value.
    #[inline]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// The raw 1-based value.
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    /// Whether this is the none value.
    #[inline]
    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }

    /// The 0-based offset into the owning slice.
    #[inline]
    pub fn offset(&self) -> u32 {
        debug_assert!(self.0 != 0, "the none reference has no offset");
        self.0 - 1
    }
}

impl From<u32> for LocalRef {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// The packed table of all reference targets in a world.
#[derive(Debug, Default, Clone)]
pub struct ReferenceList {
    targets: Vec<Entity>,
}

impl ReferenceList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reference to `target` on `entity`. Returns the new 1-based
    /// local index, which is always `count` after the append.
    pub fn add(&mut self, slots: &mut SlotTable, entity: Entity, target: Entity) -> LocalRef {
        let range = slots.slot(entity).references;
        if range.is_empty() {
            // First reference: claim a fresh slice at the global end.
            let start = self.targets.len() as u32;
            self.targets.push(target);
            slots.slot_mut(entity).references = ReferenceRange { start, count: 1 };
            return LocalRef::new(1);
        }

        self.targets.insert(range.end() as usize, target);
        self.shift_after(slots, entity, range.start, 1);
        let slot = slots.slot_mut(entity);
        slot.references.count += 1;
        LocalRef::new(slot.references.count)
    }

    /// Remove the reference at 1-based local index `reference`. Returns the
    /// removed target.
    ///
    /// # Panics
    /// In debug builds, panics if the index is none or past the slice.
    pub fn remove(&mut self, slots: &mut SlotTable, entity: Entity, reference: LocalRef) -> Entity {
        let range = slots.slot(entity).references;
        debug_assert!(
            !reference.is_none() && reference.value() <= range.count,
            "{entity} has no reference {reference:?}"
        );
        let removed = self
            .targets
            .remove((range.start + reference.offset()) as usize);
        self.shift_after(slots, entity, range.start, -1);
        slots.slot_mut(entity).references.count -= 1;
        removed
    }

    /// Remove the first reference to `target`. Returns the local index it
    /// occupied, or none if the entity does not reference the target.
    pub fn remove_target(
        &mut self,
        slots: &mut SlotTable,
        entity: Entity,
        target: Entity,
    ) -> LocalRef {
        let found = self.find(slots, entity, target);
        if !found.is_none() {
            self.remove(slots, entity, found);
        }
        found
    }

    /// The target at 1-based local index `reference`.
    ///
    /// # Panics
    /// In debug builds, panics if the index is none or past the slice.
    pub fn get(&self, slots: &SlotTable, entity: Entity, reference: LocalRef) -> Entity {
        let range = slots.slot(entity).references;
        debug_assert!(
            !reference.is_none() && reference.value() <= range.count,
            "{entity} has no reference {reference:?}"
        );
        self.targets[(range.start + reference.offset()) as usize]
    }

    /// The 1-based local index of the first reference to `target`, or none.
    pub fn find(&self, slots: &SlotTable, entity: Entity, target: Entity) -> LocalRef {
        self.slice(slots, entity)
            .iter()
            .position(|candidate| *candidate == target)
            .map(|offset| LocalRef::new(offset as u32 + 1))
            .unwrap_or(LocalRef::NONE)
    }

    /// Whether the entity references `target`.
    pub fn contains(&self, slots: &SlotTable, entity: Entity, target: Entity) -> bool {
        !self.find(slots, entity, target).is_none()
    }

    /// Whether the 1-based local index addresses a reference of the entity.
    pub fn contains_index(&self, slots: &SlotTable, entity: Entity, reference: LocalRef) -> bool {
        !reference.is_none() && reference.value() <= slots.slot(entity).references.count
    }

    /// The number of references the entity owns.
    pub fn count(&self, slots: &SlotTable, entity: Entity) -> u32 {
        slots.slot(entity).references.count
    }

    /// The entity's slice of targets, in local-index order.
    pub fn slice(&self, slots: &SlotTable, entity: Entity) -> &[Entity] {
        let range = slots.slot(entity).references;
        &self.targets[range.start as usize..range.end() as usize]
    }

    /// Excise the entity's whole slice, shifting every slice behind it.
    /// Used when the entity is destroyed.
    pub fn clear(&mut self, slots: &mut SlotTable, entity: Entity) {
        let range = slots.slot(entity).references;
        if range.is_empty() {
            return;
        }
        self.targets
            .drain(range.start as usize..range.end() as usize);
        self.shift_after(slots, entity, range.start, -(range.count as i64));
        slots.slot_mut(entity).references = ReferenceRange::EMPTY;
    }

    /// The total number of stored targets, across all entities.
    pub fn total_len(&self) -> usize {
        self.targets.len()
    }

    /// Shift the start of every other live entity's slice that begins after
    /// `start` by `delta`.
    fn shift_after(&mut self, slots: &mut SlotTable, entity: Entity, start: u32, delta: i64) {
        for id in 1..=slots.max_id() {
            let other = Entity::new(id);
            if other == entity || !slots.is_live(other) {
                continue;
            }
            let range = &mut slots.slot_mut(other).references;
            if range.count > 0 && range.start > start {
                range.start = (i64::from(range.start) + delta) as u32;
            }
        }
    }
}
