//! Per-entity metadata and id allocation.
//!
//! Every entity id indexes a [`Slot`] carrying its hierarchy links, its
//! storage position (chunk id + row), its reference slice, and its enabled
//! state. Slot index 0 is permanently reserved so that id `0` can act as the
//! none sentinel. Destroyed ids go onto a stack and are reused immediately
//! on the next create.

use bitflags::bitflags;

use crate::{chunk, entity::Entity};

/// The lifecycle and enablement state of a slot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// The id is not allocated (or was destroyed and awaits reuse).
    #[default]
    Free,
    /// Live and enabled.
    Enabled,
    /// Live and locally disabled.
    Disabled,
    /// Live, locally enabled, but forced disabled by an ancestor.
    DisabledButLocallyEnabled,
}

impl State {
    /// Whether the entity is effectively enabled.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        matches!(self, State::Enabled)
    }

    /// Whether the entity itself asked to be enabled, regardless of what its
    /// ancestors force.
    #[inline]
    pub fn is_locally_enabled(&self) -> bool {
        matches!(self, State::Enabled | State::DisabledButLocallyEnabled)
    }

    /// Whether descendants of an entity in this state are forced disabled.
    #[inline]
    pub fn forces_disabled(&self) -> bool {
        matches!(self, State::Disabled | State::DisabledButLocallyEnabled)
    }

    /// The wire value of this state.
    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            State::Free => 0,
            State::Enabled => 1,
            State::Disabled => 2,
            State::DisabledButLocallyEnabled => 3,
        }
    }

    /// Decode a wire value.
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(State::Free),
            1 => Some(State::Enabled),
            2 => Some(State::Disabled),
            3 => Some(State::DisabledButLocallyEnabled),
            _ => None,
        }
    }
}

bitflags! {
    /// Bookkeeping flags carried by each slot.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        /// The entity owns at least one typed array.
        const CONTAINS_ARRAYS = 1 << 0;
        /// The entity has at least one child.
        const CONTAINS_CHILDREN = 1 << 1;
        /// The cached children information is stale; treat as a leaf when
        /// walking the hierarchy.
        const CHILDREN_OUTDATED = 1 << 2;
        /// The cached array information is stale.
        const ARRAYS_OUTDATED = 1 << 3;
        /// The slot was destroyed; any retained handle is dangling.
        const OUTDATED = 1 << 4;
    }
}

/// A contiguous slice of the global reference list owned by one entity.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceRange {
    /// First index of the slice in the global list.
    pub start: u32,
    /// Number of targets in the slice.
    pub count: u32,
}

impl ReferenceRange {
    /// An empty slice.
    pub const EMPTY: Self = Self { start: 0, count: 0 };

    /// One past the last index of the slice.
    #[inline]
    pub fn end(&self) -> u32 {
        self.start + self.count
    }

    /// Whether the slice holds no targets.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// The metadata record of one entity.
#[derive(Debug, Default, Clone, Copy)]
pub struct Slot {
    /// Parent entity, or none for roots.
    pub(crate) parent: Entity,
    /// Depth in the hierarchy; 0 for roots.
    pub(crate) depth: u16,
    /// Number of direct children.
    pub(crate) children_count: u32,
    /// The chunk holding this entity's row.
    pub(crate) chunk: chunk::Id,
    /// The row inside the chunk.
    pub(crate) row: chunk::Row,
    /// This entity's slice of the global reference list.
    pub(crate) references: ReferenceRange,
    /// Lifecycle and enablement state.
    pub(crate) state: State,
    /// Bookkeeping flags.
    pub(crate) flags: Flags,
}

impl Slot {
    /// Parent entity, or none for roots.
    #[inline]
    pub fn parent(&self) -> Entity {
        self.parent
    }

    /// Depth in the hierarchy.
    #[inline]
    pub fn depth(&self) -> u16 {
        self.depth
    }

    /// Number of direct children.
    #[inline]
    pub fn children_count(&self) -> u32 {
        self.children_count
    }

    /// Lifecycle and enablement state.
    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    /// Bookkeeping flags.
    #[inline]
    pub fn flags(&self) -> Flags {
        self.flags
    }
}

/// The table of all slots plus the free-id stack.
#[derive(Debug, Clone)]
pub struct SlotTable {
    /// Slots indexed by entity id. Index 0 is permanently reserved.
    slots: Vec<Slot>,
    /// Destroyed ids available for immediate reuse, last in first out.
    free: Vec<Entity>,
    /// High-water mark of hierarchy depth seen in this world.
    max_depth: u16,
}

impl Default for SlotTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotTable {
    /// Create a table holding only the reserved slot 0.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot::default()],
            free: Vec::new(),
            max_depth: 0,
        }
    }

    /// Allocate an id, reusing the most recently freed one if any. The slot
    /// comes back reset: enabled, root, no flags, no references. Storage
    /// placement is the caller's job.
    pub fn allocate(&mut self) -> Entity {
        let entity = self.free.pop().unwrap_or_else(|| {
            let id = self.slots.len() as u32;
            self.slots.push(Slot::default());
            Entity::new(id)
        });
        self.slots[entity.index()] = Slot {
            state: State::Enabled,
            ..Slot::default()
        };
        entity
    }

    /// Release an id back to the free stack. The slot keeps its `OUTDATED`
    /// flag so stale handles are recognizable in debug dumps.
    pub fn release(&mut self, entity: Entity) {
        debug_assert!(self.is_live(entity), "{entity} is not live");
        let slot = &mut self.slots[entity.index()];
        slot.state = State::Free;
        slot.flags = Flags::OUTDATED;
        slot.references = ReferenceRange::EMPTY;
        slot.parent = Entity::NONE;
        slot.children_count = 0;
        self.free.push(entity);
    }

    /// Whether the id names a live entity.
    #[inline]
    pub fn is_live(&self, entity: Entity) -> bool {
        entity.is_some()
            && entity.index() < self.slots.len()
            && self.slots[entity.index()].state != State::Free
    }

    /// The slot of a live entity.
    #[inline]
    pub fn slot(&self, entity: Entity) -> &Slot {
        debug_assert!(self.is_live(entity), "{entity} is not live");
        &self.slots[entity.index()]
    }

    /// The mutable slot of a live entity.
    #[inline]
    pub fn slot_mut(&mut self, entity: Entity) -> &mut Slot {
        debug_assert!(self.is_live(entity), "{entity} is not live");
        &mut self.slots[entity.index()]
    }

    /// Iterate over all live entities in ascending id order. The iterator is
    /// restartable: it holds only an index and revalidates each slot as it
    /// goes.
    pub fn live(&self) -> impl Iterator<Item = Entity> + '_ {
        (1..self.slots.len() as u32)
            .map(Entity::new)
            .filter(|entity| self.slots[entity.index()].state != State::Free)
    }

    /// Iterate over the direct children of an entity, discovered by scanning
    /// the table.
    pub fn children_of(&self, parent: Entity) -> impl Iterator<Item = Entity> + '_ {
        self.live()
            .filter(move |entity| self.slots[entity.index()].parent == parent)
    }

    /// The number of live entities.
    pub fn live_count(&self) -> usize {
        self.slots.len() - 1 - self.free.len()
    }

    /// The highest id value ever allocated.
    pub fn max_id(&self) -> u32 {
        self.slots.len() as u32 - 1
    }

    /// The high-water mark of hierarchy depth.
    #[inline]
    pub fn max_depth(&self) -> u16 {
        self.max_depth
    }

    /// Record a depth observation, raising the high-water mark if needed.
    #[inline]
    pub fn observe_depth(&mut self, depth: u16) {
        if depth > self.max_depth {
            self.max_depth = depth;
        }
    }

    /// The free-id stack, most recently freed last.
    pub fn free_ids(&self) -> &[Entity] {
        &self.free
    }
}
