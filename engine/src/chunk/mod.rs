//! Contiguous storage for one archetype.
//!
//! A [`Chunk`] holds every entity of one [`Definition`]: a packed vector of
//! entity ids and a packed byte vector of component rows. A row is one
//! entity's component data laid out back to back; each component type in the
//! definition begins at a fixed offset within every row, precomputed from
//! the schema's sizes when the chunk is created. Access to a component is
//! `row_index * stride + offset(component)`.
//!
//! Removal is swap-with-last so rows stay packed; every structural change
//! bumps the chunk's version so external iterators can detect staleness.

mod definition;
mod map;

pub use definition::Definition;
pub use map::Map;

use bytemuck::Pod;

use crate::{
    entity::Entity,
    schema::{ComponentType, Schema},
};

/// The identifier for a chunk in the chunk map.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(u32);

impl Id {
    /// Create a new Id with the given unique identifier.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Id(id)
    }

    /// Get the index for this Id.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A row index inside a chunk.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Row(u32);

impl Row {
    /// Construct a row from an index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the index used in the chunk's packed vectors.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Get the raw row value.
    #[inline]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Row {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Storage for all entities sharing one definition.
///
/// # Invariants
/// - `entities.len() * stride == rows.len()`
/// - the entity id at index `i` owns row bytes `[i * stride, (i + 1) * stride)`
#[derive(Debug, Clone)]
pub struct Chunk {
    /// The unique identifier of this chunk.
    id: Id,

    /// The archetype stored here.
    definition: Definition,

    /// Bytes per row: the sum of the definition's component sizes.
    stride: u32,

    /// Byte offset of each present component type within a row.
    offsets: Box<[u16; 256]>,

    /// Byte size of each present component type.
    sizes: Box<[u16; 256]>,

    /// The entities stored in this chunk (one per row).
    entities: Vec<Entity>,

    /// The packed row bytes.
    rows: Vec<u8>,

    /// Monotonic counter bumped on every structural change.
    version: u64,

    /// Cached id of the entity in the last row.
    last_entity: Entity,
}

impl Chunk {
    /// Create an empty chunk for the given definition, deriving the row
    /// layout from the schema's component sizes. Offsets are cumulative over
    /// the set bits in ascending order.
    pub fn new(id: Id, definition: Definition, schema: &Schema) -> Self {
        let mut offsets = Box::new([0u16; 256]);
        let mut sizes = Box::new([0u16; 256]);
        let mut stride = 0u32;
        for bit in definition.components().ones() {
            let size = schema.size(ComponentType::new(bit));
            offsets[bit as usize] = stride as u16;
            sizes[bit as usize] = size;
            stride += u32::from(size);
        }
        Self {
            id,
            definition,
            stride,
            offsets,
            sizes,
            entities: Vec::new(),
            rows: Vec::new(),
            version: 0,
            last_entity: Entity::NONE,
        }
    }

    /// Get the unique identifier of this chunk.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the definition stored in this chunk.
    #[inline]
    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Get the bytes per row.
    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Get the structural version counter.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Get the cached id of the entity in the last row.
    #[inline]
    pub fn last_entity(&self) -> Entity {
        self.last_entity
    }

    /// Get the number of entities (rows) in this chunk.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check whether the chunk holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get the entities stored in this chunk.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Get the entity stored at a specific row, if the row is occupied.
    #[inline]
    pub fn entity_at(&self, row: Row) -> Option<Entity> {
        self.entities.get(row.index()).copied()
    }

    /// Byte offset of a component type within every row of this chunk.
    ///
    /// # Panics
    /// In debug builds, panics if the component is not in the definition.
    #[inline]
    pub fn offset_of(&self, component: ComponentType) -> u16 {
        debug_assert!(
            self.definition.has_component(component),
            "component {component:?} is not in this chunk's definition"
        );
        self.offsets[component.index()]
    }

    /// Byte size of a component type in this chunk.
    #[inline]
    pub fn component_size(&self, component: ComponentType) -> u16 {
        debug_assert!(
            self.definition.has_component(component),
            "component {component:?} is not in this chunk's definition"
        );
        self.sizes[component.index()]
    }

    /// Append an entity with a zero-initialized row. Returns the new row.
    pub fn push(&mut self, entity: Entity) -> Row {
        let row = Row::new(self.entities.len() as u32);
        self.entities.push(entity);
        self.rows.resize(self.rows.len() + self.stride as usize, 0);
        self.last_entity = entity;
        self.version += 1;
        row
    }

    /// Remove the entity at `row` by swap-with-last: the last row's bytes
    /// and id move into `row`. Returns the entity that moved into the row,
    /// or `None` if the removed row was the last. The caller is responsible
    /// for re-pointing the moved entity's slot.
    ///
    /// # Panics
    /// In debug builds, panics if the row is out of bounds.
    pub fn swap_remove(&mut self, row: Row) -> Option<Entity> {
        let index = row.index();
        debug_assert!(index < self.entities.len(), "row index out of bounds");

        let last = self.entities.len() - 1;
        self.entities.swap_remove(index);

        let stride = self.stride as usize;
        if stride > 0 {
            if index != last {
                let (head, tail) = self.rows.split_at_mut(last * stride);
                head[index * stride..(index + 1) * stride].copy_from_slice(&tail[..stride]);
            }
            self.rows.truncate(last * stride);
        }

        self.last_entity = self.entities.last().copied().unwrap_or(Entity::NONE);
        self.version += 1;

        if index == last {
            None
        } else {
            Some(self.entities[index])
        }
    }

    /// The full byte span of one row.
    #[inline]
    pub fn row_bytes(&self, row: Row) -> &[u8] {
        let stride = self.stride as usize;
        &self.rows[row.index() * stride..(row.index() + 1) * stride]
    }

    /// The mutable byte span of one row.
    #[inline]
    pub fn row_bytes_mut(&mut self, row: Row) -> &mut [u8] {
        let stride = self.stride as usize;
        &mut self.rows[row.index() * stride..(row.index() + 1) * stride]
    }

    /// The bytes of one component within one row.
    #[inline]
    pub fn component_bytes(&self, row: Row, component: ComponentType) -> &[u8] {
        let offset = self.offset_of(component) as usize;
        let size = self.sizes[component.index()] as usize;
        let base = row.index() * self.stride as usize + offset;
        &self.rows[base..base + size]
    }

    /// The mutable bytes of one component within one row.
    #[inline]
    pub fn component_bytes_mut(&mut self, row: Row, component: ComponentType) -> &mut [u8] {
        let offset = self.offset_of(component) as usize;
        let size = self.sizes[component.index()] as usize;
        let base = row.index() * self.stride as usize + offset;
        &mut self.rows[base..base + size]
    }

    /// Overwrite the bytes of one component within one row.
    ///
    /// # Panics
    /// If `bytes.len()` does not match the component's size.
    #[inline]
    pub fn set_component_bytes(&mut self, row: Row, component: ComponentType, bytes: &[u8]) {
        self.component_bytes_mut(row, component).copy_from_slice(bytes);
    }

    /// A read view of one row.
    #[inline]
    pub fn row(&self, row: Row) -> RowRef<'_> {
        debug_assert!(row.index() < self.entities.len(), "row index out of bounds");
        RowRef { chunk: self, row }
    }

    /// A write view of one row.
    #[inline]
    pub fn row_mut(&mut self, row: Row) -> RowMut<'_> {
        debug_assert!(row.index() < self.entities.len(), "row index out of bounds");
        RowMut { chunk: self, row }
    }

    /// Verify that the packed vectors are consistent. Test and debug
    /// tooling only.
    ///
    /// # Panics
    /// Panics if any chunk invariant is violated.
    pub fn verify_invariants(&self) {
        assert_eq!(
            self.rows.len(),
            self.entities.len() * self.stride as usize,
            "row bytes out of sync with entity count"
        );
        assert_eq!(
            self.last_entity,
            self.entities.last().copied().unwrap_or(Entity::NONE),
            "stale last_entity cache"
        );
    }
}

/// A typed read view over one chunk row. Values are copied out rather than
/// borrowed because row bytes carry no alignment guarantee.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    chunk: &'a Chunk,
    row: Row,
}

impl<'a> RowRef<'a> {
    /// The entity owning this row.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.chunk.entities[self.row.index()]
    }

    /// The bytes of one component.
    #[inline]
    pub fn bytes(&self, component: ComponentType) -> &'a [u8] {
        self.chunk.component_bytes(self.row, component)
    }

    /// Read one component as a value.
    ///
    /// # Panics
    /// In debug builds, panics if the size of `T` does not match the
    /// component's registered size.
    #[inline]
    pub fn read<T: Pod>(&self, component: ComponentType) -> T {
        let bytes = self.bytes(component);
        debug_assert_eq!(
            bytes.len(),
            size_of::<T>(),
            "component size does not match {}",
            std::any::type_name::<T>()
        );
        bytemuck::pod_read_unaligned(bytes)
    }
}

/// A typed write view over one chunk row.
pub struct RowMut<'a> {
    chunk: &'a mut Chunk,
    row: Row,
}

impl RowMut<'_> {
    /// The entity owning this row.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.chunk.entities[self.row.index()]
    }

    /// The mutable bytes of one component.
    #[inline]
    pub fn bytes_mut(&mut self, component: ComponentType) -> &mut [u8] {
        self.chunk.component_bytes_mut(self.row, component)
    }

    /// Overwrite one component with a value.
    ///
    /// # Panics
    /// In debug builds, panics if the size of `T` does not match the
    /// component's registered size.
    #[inline]
    pub fn write<T: Pod>(&mut self, component: ComponentType, value: T) {
        let bytes = self.bytes_mut(component);
        debug_assert_eq!(
            bytes.len(),
            size_of::<T>(),
            "component size does not match {}",
            std::any::type_name::<T>()
        );
        bytes.copy_from_slice(bytemuck::bytes_of(&value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    fn test_schema() -> (Schema, ComponentType, ComponentType) {
        let schema = Schema::new();
        let a = schema.register_component("a", 4);
        let b = schema.register_component("b", 8);
        (schema, a, b)
    }

    #[test]
    fn chunk_layout_is_cumulative() {
        // Given
        let (schema, a, b) = test_schema();
        let def = Definition::EMPTY.with_component(a).with_component(b);

        // When
        let chunk = Chunk::new(Id::new(0), def, &schema);

        // Then
        assert_eq!(chunk.stride(), 12);
        assert_eq!(chunk.offset_of(a), 0);
        assert_eq!(chunk.offset_of(b), 4);
        assert_eq!(chunk.component_size(b), 8);
    }

    #[test]
    fn chunk_push_zero_initializes() {
        // Given
        let (schema, a, _) = test_schema();
        let def = Definition::EMPTY.with_component(a);
        let mut chunk = Chunk::new(Id::new(0), def, &schema);

        // When
        let row = chunk.push(Entity::new(1));

        // Then
        assert_eq!(row, Row::new(0));
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.row_bytes(row), &[0, 0, 0, 0]);
        assert_eq!(chunk.last_entity(), Entity::new(1));
        assert_eq!(chunk.version(), 1);
    }

    #[test]
    fn chunk_component_bytes_round_trip() {
        // Given
        let (schema, a, b) = test_schema();
        let def = Definition::EMPTY.with_component(a).with_component(b);
        let mut chunk = Chunk::new(Id::new(0), def, &schema);
        let row = chunk.push(Entity::new(1));

        // When
        chunk.set_component_bytes(row, a, &[1, 2, 3, 4]);
        chunk.set_component_bytes(row, b, &[5, 6, 7, 8, 9, 10, 11, 12]);

        // Then
        assert_eq!(chunk.component_bytes(row, a), &[1, 2, 3, 4]);
        assert_eq!(chunk.component_bytes(row, b), &[5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(chunk.row_bytes(row), &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    }

    #[test]
    fn chunk_swap_remove_moves_last_row() {
        // Given
        let (schema, a, _) = test_schema();
        let def = Definition::EMPTY.with_component(a);
        let mut chunk = Chunk::new(Id::new(0), def, &schema);
        let r0 = chunk.push(Entity::new(1));
        let r1 = chunk.push(Entity::new(2));
        let r2 = chunk.push(Entity::new(3));
        chunk.set_component_bytes(r0, a, &[1, 0, 0, 0]);
        chunk.set_component_bytes(r1, a, &[2, 0, 0, 0]);
        chunk.set_component_bytes(r2, a, &[3, 0, 0, 0]);

        // When - remove the middle row
        let moved = chunk.swap_remove(r1);

        // Then - the last entity and its bytes moved into the hole
        assert_eq!(moved, Some(Entity::new(3)));
        assert_eq!(chunk.len(), 2);
        assert_eq!(chunk.entities(), &[Entity::new(1), Entity::new(3)]);
        assert_eq!(chunk.component_bytes(r1, a), &[3, 0, 0, 0]);
        assert_eq!(chunk.last_entity(), Entity::new(3));

        #[cfg(debug_assertions)]
        chunk.verify_invariants();

        // When - remove the last row
        let moved = chunk.swap_remove(Row::new(1));

        // Then - nothing moved
        assert_eq!(moved, None);
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.last_entity(), Entity::new(1));

        #[cfg(debug_assertions)]
        chunk.verify_invariants();
    }

    #[test]
    fn chunk_swap_remove_with_zero_stride() {
        // Given - a composition with no components still stores entities
        let schema = Schema::new();
        let mut chunk = Chunk::new(Id::new(0), Definition::EMPTY, &schema);
        chunk.push(Entity::new(1));
        chunk.push(Entity::new(2));

        // When
        let moved = chunk.swap_remove(Row::new(0));

        // Then
        assert_eq!(moved, Some(Entity::new(2)));
        assert_eq!(chunk.len(), 1);

        #[cfg(debug_assertions)]
        chunk.verify_invariants();
    }

    #[test]
    fn chunk_typed_row_views() {
        // Given
        #[repr(C)]
        #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
        struct Position {
            x: f32,
            y: f32,
            z: f32,
        }

        let schema = Schema::new();
        let position = schema.register_component_of::<Position>("position");
        let def = Definition::EMPTY.with_component(position);
        let mut chunk = Chunk::new(Id::new(0), def, &schema);
        let row = chunk.push(Entity::new(1));

        // When
        chunk.row_mut(row).write(
            position,
            Position {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
        );

        // Then
        let read: Position = chunk.row(row).read(position);
        assert_eq!(
            read,
            Position {
                x: 1.0,
                y: 2.0,
                z: 3.0
            }
        );
        assert_eq!(chunk.row(row).entity(), Entity::new(1));
    }

    #[test]
    fn chunk_version_counts_structural_changes() {
        // Given
        let (schema, a, _) = test_schema();
        let mut chunk = Chunk::new(Id::new(0), Definition::EMPTY.with_component(a), &schema);

        // When
        let row = chunk.push(Entity::new(1));
        chunk.push(Entity::new(2));
        chunk.swap_remove(row);

        // Then - data writes do not bump the version, structure does
        assert_eq!(chunk.version(), 3);
        chunk.set_component_bytes(Row::new(0), a, &[9, 9, 9, 9]);
        assert_eq!(chunk.version(), 3);
    }
}
