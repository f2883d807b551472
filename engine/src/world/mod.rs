//! The world: the public façade over every subsystem.
//!
//! A `World` owns the slot table, the chunk map, the per-entity arrays, the
//! reference list, and the listener tables. Entities are plain ids; every
//! operation takes the world plus an id. All mutation is single-threaded
//! and synchronous: a mutation fully commits (chunk migration, slot fixups)
//! before its listeners fire and before the call returns.
//!
//! Structural mutations all funnel through one pivotal routine,
//! [`World::migrate`], which moves an entity between the chunks of its old
//! and new definition while preserving the bytes of every component present
//! in both.
//!
//! Precondition violations (missing entities, duplicate components, and the
//! like) are programmer errors checked by debug assertions; the hot path
//! does not pay for them in release builds.

mod listener;
mod serialize;

pub use listener::{DataCallback, EntityCallback, ParentCallback};

use bytemuck::Pod;
use log::warn;

use crate::{
    arrays::{ArraysTable, TypedArray},
    chunk::{self, Chunk, Definition},
    entity::Entity,
    mask::BitMask,
    references::{LocalRef, ReferenceList},
    schema::{ArrayType, ComponentType, DataType, Schema, TagType},
    slot::{Flags, SlotTable, State},
};

/// The central container for entities and their data.
#[derive(Clone)]
pub struct World {
    /// The type registry this world stores data against.
    schema: Schema,

    /// Per-entity metadata and the id free-list.
    slots: SlotTable,

    /// The definition-to-chunk map.
    chunks: chunk::Map,

    /// Per-entity variable-length arrays.
    arrays: ArraysTable,

    /// The packed entity-to-entity reference table.
    references: ReferenceList,

    /// Registered mutation listeners.
    listeners: listener::Listeners,
}

impl World {
    /// Create an empty world over the given schema.
    pub fn new(schema: Schema) -> Self {
        let chunks = chunk::Map::new(&schema);
        Self {
            schema,
            slots: SlotTable::new(),
            chunks,
            arrays: ArraysTable::new(),
            references: ReferenceList::new(),
            listeners: listener::Listeners::default(),
        }
    }

    /// The schema this world stores data against.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // ------------------------------------------------------------------
    // Entity lifecycle
    // ------------------------------------------------------------------

    /// Create an entity with the empty composition.
    pub fn create(&mut self) -> Entity {
        self.create_with(Definition::EMPTY)
    }

    /// Create an entity with the given composition. Component bytes start
    /// zeroed; array types start as zero-length arrays.
    ///
    /// Ids are reused immediately: creating after a destroy hands back the
    /// most recently destroyed id.
    pub fn create_with(&mut self, definition: Definition) -> Entity {
        debug_assert!(
            !definition.is_disabled(),
            "entities are created enabled; use set_enabled to disable"
        );
        let entity = self.slots.allocate();
        let chunk_id = self.chunks.get_or_create(definition, &self.schema);
        let row = self.chunks.get_mut(chunk_id).push(entity);
        {
            let slot = self.slots.slot_mut(entity);
            slot.chunk = chunk_id;
            slot.row = row;
        }
        for bit in definition.arrays().ones() {
            let stride = self.schema.array_size(ArrayType::new(bit));
            self.arrays.create(entity, bit, 0, stride);
        }
        if !definition.arrays().is_empty() {
            self.slots.slot_mut(entity).flags.insert(Flags::CONTAINS_ARRAYS);
        }
        self.fire_entity(entity, true);
        entity
    }

    /// Destroy an entity. When `destroy_children` is true the whole subtree
    /// goes with it; otherwise direct children become roots.
    ///
    /// The entity's row is swap-removed from its chunk, its arrays and its
    /// reference slice are released, and its id is pushed onto the free
    /// stack for immediate reuse.
    pub fn destroy(&mut self, entity: Entity, destroy_children: bool) {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");

        let children: Vec<Entity> = self.slots.children_of(entity).collect();
        for child in children {
            if destroy_children {
                self.destroy(child, true);
            } else {
                self.set_parent(child, Entity::NONE);
            }
        }

        let parent = self.slots.slot(entity).parent;
        if self.slots.is_live(parent) {
            let parent_slot = self.slots.slot_mut(parent);
            parent_slot.children_count -= 1;
            if parent_slot.children_count == 0 {
                parent_slot.flags.remove(Flags::CONTAINS_CHILDREN);
            }
        }

        self.remove_from_chunk(entity);
        self.references.clear(&mut self.slots, entity);
        self.arrays.destroy_all(entity);
        self.slots.release(entity);
        self.fire_entity(entity, false);
    }

    /// Whether the id names a live entity of this world.
    #[inline]
    pub fn contains_entity(&self, entity: Entity) -> bool {
        self.slots.is_live(entity)
    }

    /// The number of live entities.
    #[inline]
    pub fn entity_count(&self) -> usize {
        self.slots.live_count()
    }

    /// The highest id value this world has ever allocated.
    #[inline]
    pub fn max_entity_value(&self) -> u32 {
        self.slots.max_id()
    }

    /// Iterate over all live entities in ascending id order. The iterator
    /// scans the slot table and revalidates each slot, so it can be
    /// restarted at any time.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.slots.live()
    }

    // ------------------------------------------------------------------
    // Archetype access
    // ------------------------------------------------------------------

    /// The definition (archetype key) of an entity.
    #[inline]
    pub fn definition(&self, entity: Entity) -> &Definition {
        self.chunk_of(entity).definition()
    }

    /// Whether the entity's definition contains every bit of `definition`.
    pub fn is(&self, entity: Entity, definition: &Definition) -> bool {
        self.definition(entity).contains_all(definition)
    }

    /// Add, one bit at a time, whatever `definition` names that the entity
    /// does not yet carry. Added components are zeroed, added arrays are
    /// zero-length. One chunk move per added bit: simple and predictable.
    pub fn conform(&mut self, entity: Entity, definition: &Definition) {
        debug_assert!(
            !definition.is_disabled(),
            "conform does not drive enablement; use set_enabled"
        );
        for bit in definition.components().ones() {
            let component = ComponentType::new(bit);
            if !self.contains_component(entity, component) {
                self.add_component(entity, component);
            }
        }
        for bit in definition.arrays().ones() {
            let array = ArrayType::new(bit);
            if !self.contains_array(entity, array) {
                self.create_array(entity, array, 0);
            }
        }
        for bit in definition.tags().ones() {
            let tag = TagType::new(bit);
            if !self.has_tag(entity, tag) {
                self.add_tag(entity, tag);
            }
        }
    }

    /// The chunk an entity currently lives in, for external iterators that
    /// cache `(chunk id, version)` and revalidate after mutations.
    #[inline]
    pub fn chunk_id(&self, entity: Entity) -> chunk::Id {
        self.slots.slot(entity).chunk
    }

    /// A chunk by id.
    #[inline]
    pub fn chunk(&self, id: chunk::Id) -> &Chunk {
        self.chunks.get(id)
    }

    /// Iterate over all chunks in creation order.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Add a component with zeroed bytes.
    ///
    /// # Panics
    /// In debug builds, panics if the entity is missing or already carries
    /// the component.
    pub fn add_component(&mut self, entity: Entity, component: ComponentType) {
        debug_assert!(
            !self.contains_component(entity, component),
            "component {component:?} is already present on {entity}"
        );
        let definition = self.definition(entity).with_component(component);
        self.migrate(entity, definition);
        self.fire_data(entity, DataType::Component(component), true);
    }

    /// Add a component initialized from raw bytes.
    pub fn add_component_bytes(&mut self, entity: Entity, component: ComponentType, bytes: &[u8]) {
        self.add_component(entity, component);
        self.set_component_bytes(entity, component, bytes);
    }

    /// Overwrite a present component with raw bytes.
    ///
    /// # Panics
    /// In debug builds, panics if the component is absent. Panics if the
    /// byte length does not match the component size.
    pub fn set_component_bytes(&mut self, entity: Entity, component: ComponentType, bytes: &[u8]) {
        debug_assert!(
            self.contains_component(entity, component),
            "component {component:?} is not present on {entity}"
        );
        let (chunk_id, row) = self.location(entity);
        self.chunks
            .get_mut(chunk_id)
            .set_component_bytes(row, component, bytes);
    }

    /// The raw bytes of a present component.
    pub fn component_bytes(&self, entity: Entity, component: ComponentType) -> &[u8] {
        debug_assert!(
            self.contains_component(entity, component),
            "component {component:?} is not present on {entity}"
        );
        let (chunk_id, row) = self.location(entity);
        self.chunks.get(chunk_id).component_bytes(row, component)
    }

    /// Remove a component, dropping its bytes.
    ///
    /// # Panics
    /// In debug builds, panics if the component is absent.
    pub fn remove_component(&mut self, entity: Entity, component: ComponentType) {
        debug_assert!(
            self.contains_component(entity, component),
            "component {component:?} is not present on {entity}"
        );
        let definition = self.definition(entity).without_component(component);
        self.migrate(entity, definition);
        self.fire_data(entity, DataType::Component(component), false);
    }

    /// Whether the entity carries the component.
    #[inline]
    pub fn contains_component(&self, entity: Entity, component: ComponentType) -> bool {
        self.definition(entity).has_component(component)
    }

    /// Add every component in `mask` that the entity does not already
    /// carry, in a single chunk move. Bits that are already present
    /// coalesce silently. Newly added components are zeroed.
    pub fn add_component_types(&mut self, entity: Entity, mask: &BitMask) {
        let current = *self.definition(entity);
        let added = mask.difference(current.components());
        if added.is_empty() {
            return;
        }
        self.migrate(entity, current.with_components(mask));
        for bit in added.ones() {
            self.fire_data(entity, DataType::Component(ComponentType::new(bit)), true);
        }
    }

    /// Remove every component in `mask` that the entity carries, in a
    /// single chunk move. Absent bits are ignored.
    pub fn remove_component_types(&mut self, entity: Entity, mask: &BitMask) {
        let current = *self.definition(entity);
        let removed = mask.intersection(current.components());
        if removed.is_empty() {
            return;
        }
        self.migrate(entity, current.without_components(mask));
        for bit in removed.ones() {
            self.fire_data(entity, DataType::Component(ComponentType::new(bit)), false);
        }
    }

    /// Add a component from a typed value. The type must have been bound
    /// via [`Schema::register_component_of`].
    pub fn add<T: Pod>(&mut self, entity: Entity, value: T) {
        let component = self.schema.component_of::<T>();
        self.add_component(entity, component);
        self.set_component_bytes(entity, component, bytemuck::bytes_of(&value));
    }

    /// Overwrite a present component from a typed value.
    pub fn set<T: Pod>(&mut self, entity: Entity, value: T) {
        let component = self.schema.component_of::<T>();
        debug_assert!(
            self.contains_component(entity, component),
            "component {component:?} is not present on {entity}"
        );
        let (chunk_id, row) = self.location(entity);
        self.chunks.get_mut(chunk_id).row_mut(row).write(component, value);
    }

    /// Read a present component as a typed value.
    pub fn get<T: Pod>(&self, entity: Entity) -> T {
        let component = self.schema.component_of::<T>();
        debug_assert!(
            self.contains_component(entity, component),
            "component {component:?} is not present on {entity}"
        );
        let (chunk_id, row) = self.location(entity);
        self.chunks.get(chunk_id).row(row).read(component)
    }

    /// Remove a component by its bound type.
    pub fn remove<T: Pod>(&mut self, entity: Entity) {
        let component = self.schema.component_of::<T>();
        self.remove_component(entity, component);
    }

    /// Whether the entity carries the component bound to `T`.
    pub fn contains<T: 'static>(&self, entity: Entity) -> bool {
        self.contains_component(entity, self.schema.component_of::<T>())
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    /// Add a tag.
    ///
    /// # Panics
    /// In debug builds, panics if the tag is already present or is the
    /// reserved Disabled tag.
    pub fn add_tag(&mut self, entity: Entity, tag: TagType) {
        debug_assert!(
            tag != TagType::DISABLED,
            "the Disabled tag is driven by set_enabled"
        );
        debug_assert!(
            !self.has_tag(entity, tag),
            "tag {tag:?} is already present on {entity}"
        );
        let definition = self.definition(entity).with_tag(tag);
        self.migrate(entity, definition);
        self.fire_data(entity, DataType::Tag(tag), true);
    }

    /// Remove a tag.
    ///
    /// # Panics
    /// In debug builds, panics if the tag is absent.
    pub fn remove_tag(&mut self, entity: Entity, tag: TagType) {
        debug_assert!(
            tag != TagType::DISABLED,
            "the Disabled tag is driven by set_enabled"
        );
        debug_assert!(
            self.has_tag(entity, tag),
            "tag {tag:?} is not present on {entity}"
        );
        let definition = self.definition(entity).without_tag(tag);
        self.migrate(entity, definition);
        self.fire_data(entity, DataType::Tag(tag), false);
    }

    /// Whether the entity carries the tag.
    #[inline]
    pub fn has_tag(&self, entity: Entity, tag: TagType) -> bool {
        self.definition(entity).has_tag(tag)
    }

    // ------------------------------------------------------------------
    // Arrays
    // ------------------------------------------------------------------

    /// Create a zero-initialized array of `length` elements.
    ///
    /// # Panics
    /// In debug builds, panics if the entity already carries the array type.
    pub fn create_array(&mut self, entity: Entity, array: ArrayType, length: u32) {
        debug_assert!(
            !self.contains_array(entity, array),
            "array {array:?} is already present on {entity}"
        );
        let definition = self.definition(entity).with_array(array);
        self.migrate(entity, definition);
        let stride = self.schema.array_size(array);
        self.arrays.create(entity, array.bit(), length, stride);
        self.slots.slot_mut(entity).flags.insert(Flags::CONTAINS_ARRAYS);
        self.fire_data(entity, DataType::Array(array), true);
    }

    /// Create an array initialized from packed element bytes.
    pub fn create_array_with(&mut self, entity: Entity, array: ArrayType, bytes: &[u8]) {
        let stride = self.schema.array_size(array);
        debug_assert!(
            stride == 0 || bytes.len() % stride as usize == 0,
            "byte length is not a whole number of elements"
        );
        let length = if stride == 0 {
            0
        } else {
            (bytes.len() / stride as usize) as u32
        };
        self.create_array(entity, array, length);
        self.array_mut(entity, array).bytes_mut().copy_from_slice(bytes);
    }

    /// Destroy an array, dropping its buffer.
    ///
    /// # Panics
    /// In debug builds, panics if the array is absent.
    pub fn destroy_array(&mut self, entity: Entity, array: ArrayType) {
        debug_assert!(
            self.contains_array(entity, array),
            "array {array:?} is not present on {entity}"
        );
        let definition = self.definition(entity).without_array(array);
        self.migrate(entity, definition);
        self.arrays.destroy(entity, array.bit());
        if !self.arrays.has_any(entity) {
            self.slots.slot_mut(entity).flags.remove(Flags::CONTAINS_ARRAYS);
        }
        self.fire_data(entity, DataType::Array(array), false);
    }

    /// Whether the entity carries the array type.
    #[inline]
    pub fn contains_array(&self, entity: Entity, array: ArrayType) -> bool {
        self.definition(entity).has_array(array)
    }

    /// A present array.
    pub fn array(&self, entity: Entity, array: ArrayType) -> &TypedArray {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        self.arrays
            .get(entity, array.bit())
            .unwrap_or_else(|| panic!("array {array:?} is not present on {entity}"))
    }

    /// A present array, mutably. Length changes here do not move the entity
    /// between chunks.
    pub fn array_mut(&mut self, entity: Entity, array: ArrayType) -> &mut TypedArray {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        self.arrays
            .get_mut(entity, array.bit())
            .unwrap_or_else(|| panic!("array {array:?} is not present on {entity}"))
    }

    /// The element count of a present array.
    pub fn array_len(&self, entity: Entity, array: ArrayType) -> u32 {
        self.array(entity, array).len()
    }

    /// Grow or shrink a present array. New elements are zeroed.
    pub fn resize_array(&mut self, entity: Entity, array: ArrayType, length: u32) {
        self.array_mut(entity, array).resize(length);
    }

    /// Overwrite elements of a present array starting at `index`.
    pub fn set_array_elements(
        &mut self,
        entity: Entity,
        array: ArrayType,
        index: u32,
        bytes: &[u8],
    ) {
        self.array_mut(entity, array).write_elements(index, bytes);
    }

    // ------------------------------------------------------------------
    // Hierarchy
    // ------------------------------------------------------------------

    /// The parent of an entity, or none for roots.
    #[inline]
    pub fn parent(&self, entity: Entity) -> Entity {
        self.slots.slot(entity).parent
    }

    /// The direct children of an entity, discovered by scanning the slot
    /// table.
    pub fn children(&self, entity: Entity) -> Vec<Entity> {
        self.slots.children_of(entity).collect()
    }

    /// The number of direct children.
    #[inline]
    pub fn child_count(&self, entity: Entity) -> u32 {
        self.slots.slot(entity).children_count
    }

    /// The hierarchy depth of an entity; 0 for roots.
    #[inline]
    pub fn depth(&self, entity: Entity) -> u16 {
        self.slots.slot(entity).depth
    }

    /// The high-water mark of hierarchy depth across this world.
    #[inline]
    pub fn max_depth(&self) -> u16 {
        self.slots.max_depth()
    }

    /// Reparent an entity. A missing or destroyed `new_parent` is treated
    /// as none (the entity becomes a root). Depths are recomputed for the
    /// whole subtree, and the subtree's effective enablement is re-resolved
    /// against the new ancestor chain.
    ///
    /// # Panics
    /// In debug builds, panics on self-parenting or on a parent chain that
    /// would contain a cycle.
    pub fn set_parent(&mut self, entity: Entity, new_parent: Entity) {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        debug_assert!(entity != new_parent, "{entity} cannot be its own parent");

        let new_parent = if self.slots.is_live(new_parent) {
            new_parent
        } else {
            if new_parent.is_some() {
                warn!("attempted to parent {entity} to missing {new_parent}");
            }
            Entity::NONE
        };

        #[cfg(debug_assertions)]
        {
            let mut ancestor = new_parent;
            while ancestor.is_some() {
                assert!(
                    ancestor != entity,
                    "{entity} cannot be parented into its own subtree"
                );
                ancestor = self.slots.slot(ancestor).parent;
            }
        }

        let old_parent = self.slots.slot(entity).parent;
        if old_parent == new_parent {
            return;
        }

        if self.slots.is_live(old_parent) {
            let slot = self.slots.slot_mut(old_parent);
            slot.children_count -= 1;
            if slot.children_count == 0 {
                slot.flags.remove(Flags::CONTAINS_CHILDREN);
            }
        }
        if new_parent.is_some() {
            let slot = self.slots.slot_mut(new_parent);
            slot.children_count += 1;
            slot.flags.insert(Flags::CONTAINS_CHILDREN);
        }
        self.slots.slot_mut(entity).parent = new_parent;

        let base_depth = if new_parent.is_some() {
            self.slots.slot(new_parent).depth + 1
        } else {
            0
        };
        self.update_depths(entity, base_depth);

        // Re-resolve enablement under the new ancestor chain: moving under a
        // disabled parent demotes, moving out from under one promotes.
        let forced = new_parent.is_some() && self.slots.slot(new_parent).state.forces_disabled();
        let state = self.slots.slot(entity).state;
        let target = Self::resolve_state(state, forced);
        if target != state {
            self.apply_state(entity, target);
            self.propagate_state(entity);
        }

        self.fire_parent(entity, old_parent, new_parent);
    }

    // ------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------

    /// Whether the entity is effectively enabled.
    #[inline]
    pub fn is_enabled(&self, entity: Entity) -> bool {
        self.slots.slot(entity).state.is_enabled()
    }

    /// Whether the entity itself asked to be enabled, regardless of what
    /// its ancestors force.
    #[inline]
    pub fn is_locally_enabled(&self, entity: Entity) -> bool {
        self.slots.slot(entity).state.is_locally_enabled()
    }

    /// Enable or disable an entity.
    ///
    /// Disabling moves the entity (and every effectively-enabled
    /// descendant) into the chunks carrying the Disabled tag bit, so
    /// iteration over enabled archetypes never sees them. A descendant that
    /// was itself disabled keeps its own state. Enabling restores
    /// descendants that are only disabled because of this ancestor.
    pub fn set_enabled(&mut self, entity: Entity, enabled: bool) {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        let parent = self.slots.slot(entity).parent;
        let forced = parent.is_some()
            && self.slots.is_live(parent)
            && self.slots.slot(parent).state.forces_disabled();
        let target = if enabled {
            if forced {
                State::DisabledButLocallyEnabled
            } else {
                State::Enabled
            }
        } else {
            State::Disabled
        };
        self.apply_state(entity, target);
        self.propagate_state(entity);
    }

    // ------------------------------------------------------------------
    // References
    // ------------------------------------------------------------------

    /// Append a reference to `target`. Returns the new 1-based local index.
    pub fn add_reference(&mut self, entity: Entity, target: Entity) -> LocalRef {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        debug_assert!(self.slots.is_live(target), "{target} does not exist");
        self.references.add(&mut self.slots, entity, target)
    }

    /// Remove the reference at a 1-based local index. Returns the removed
    /// target.
    pub fn remove_reference(&mut self, entity: Entity, reference: LocalRef) -> Entity {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        self.references.remove(&mut self.slots, entity, reference)
    }

    /// Remove the first reference to `target`. Returns the local index it
    /// occupied, or none.
    pub fn remove_reference_target(&mut self, entity: Entity, target: Entity) -> LocalRef {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        self.references.remove_target(&mut self.slots, entity, target)
    }

    /// The target at a 1-based local index.
    pub fn get_reference(&self, entity: Entity, reference: LocalRef) -> Entity {
        self.references.get(&self.slots, entity, reference)
    }

    /// The 1-based local index of the first reference to `target`, or none.
    pub fn find_reference(&self, entity: Entity, target: Entity) -> LocalRef {
        self.references.find(&self.slots, entity, target)
    }

    /// Whether the entity references `target`.
    pub fn contains_reference(&self, entity: Entity, target: Entity) -> bool {
        self.references.contains(&self.slots, entity, target)
    }

    /// Whether the 1-based local index addresses one of the entity's
    /// references.
    pub fn contains_reference_index(&self, entity: Entity, reference: LocalRef) -> bool {
        self.references.contains_index(&self.slots, entity, reference)
    }

    /// The number of references the entity owns.
    pub fn reference_count(&self, entity: Entity) -> u32 {
        self.references.count(&self.slots, entity)
    }

    /// The entity's reference targets in local-index order.
    pub fn references(&self, entity: Entity) -> &[Entity] {
        self.references.slice(&self.slots, entity)
    }

    // ------------------------------------------------------------------
    // Clone / append
    // ------------------------------------------------------------------

    /// Create a new entity carrying copies of `entity`'s components,
    /// arrays, tags, and references (target ids verbatim, in order). The
    /// clone is a root and starts enabled; hierarchy and enablement are not
    /// copied.
    pub fn clone_entity(&mut self, entity: Entity) -> Entity {
        debug_assert!(self.slots.is_live(entity), "{entity} does not exist");
        let definition = *self.definition(entity);
        let clone = self.create();

        for bit in definition.components().ones() {
            let component = ComponentType::new(bit);
            let bytes = self.component_bytes(entity, component).to_vec();
            self.add_component_bytes(clone, component, &bytes);
        }
        for bit in definition.arrays().ones() {
            let array = ArrayType::new(bit);
            let bytes = self.array(entity, array).bytes().to_vec();
            self.create_array_with(clone, array, &bytes);
        }
        for bit in definition.tags().ones() {
            let tag = TagType::new(bit);
            if tag != TagType::DISABLED {
                self.add_tag(clone, tag);
            }
        }
        let targets = self.references.slice(&self.slots, entity).to_vec();
        for target in targets {
            // Targets are copied verbatim, live or dangling.
            self.references.add(&mut self.slots, clone, target);
        }
        clone
    }

    /// Create a local copy of every live entity in `other`, carrying the
    /// same composition and data. Parent and reference relationships are
    /// not remapped; callers that need graph fidelity go through the
    /// serialization path. Both worlds must share a matching schema.
    pub fn append(&mut self, other: &World) {
        debug_assert!(
            self.schema.matches(&other.schema),
            "appending between mismatched schemas"
        );
        for source in other.entities() {
            let definition = other.definition(source).with_disabled(false);
            let entity = self.create_with(definition);
            for bit in definition.components().ones() {
                let component = ComponentType::new(bit);
                let bytes = other.component_bytes(source, component).to_vec();
                self.set_component_bytes(entity, component, &bytes);
            }
            for bit in definition.arrays().ones() {
                let array = ArrayType::new(bit);
                let source_array = other.array(source, array);
                let length = source_array.len();
                self.resize_array(entity, array, length);
                self.array_mut(entity, array)
                    .bytes_mut()
                    .copy_from_slice(source_array.bytes());
            }
            if !other.is_locally_enabled(source) {
                self.set_enabled(entity, false);
            }
        }
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    /// Register a callback for entity creation and destruction.
    pub fn add_entity_listener(&mut self, callback: EntityCallback, user_data: u64) {
        self.listeners.entity.push((callback, user_data));
    }

    /// Unregister a previously registered entity callback.
    pub fn remove_entity_listener(&mut self, callback: EntityCallback, user_data: u64) -> bool {
        listener::remove_pair(&mut self.listeners.entity, callback, user_data)
    }

    /// Register a callback for parent changes.
    pub fn add_parent_listener(&mut self, callback: ParentCallback, user_data: u64) {
        self.listeners.parent.push((callback, user_data));
    }

    /// Unregister a previously registered parent callback.
    pub fn remove_parent_listener(&mut self, callback: ParentCallback, user_data: u64) -> bool {
        listener::remove_pair(&mut self.listeners.parent, callback, user_data)
    }

    /// Register a callback for component, array, and tag changes.
    pub fn add_data_listener(&mut self, callback: DataCallback, user_data: u64) {
        self.listeners.data.push((callback, user_data));
    }

    /// Unregister a previously registered data callback.
    pub fn remove_data_listener(&mut self, callback: DataCallback, user_data: u64) -> bool {
        listener::remove_pair(&mut self.listeners.data, callback, user_data)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    #[inline]
    fn location(&self, entity: Entity) -> (chunk::Id, chunk::Row) {
        let slot = self.slots.slot(entity);
        (slot.chunk, slot.row)
    }

    fn chunk_of(&self, entity: Entity) -> &Chunk {
        self.chunks.get(self.slots.slot(entity).chunk)
    }

    /// Move an entity to the chunk of `definition`, preserving the bytes of
    /// every component present in both the old and the new definition.
    /// Moving to the current chunk is a no-op.
    fn migrate(&mut self, entity: Entity, definition: Definition) {
        let (from_id, from_row) = self.location(entity);
        let to_id = self.chunks.get_or_create(definition, &self.schema);
        if from_id == to_id {
            return;
        }

        let (from, to) = self.chunks.pair_mut(from_id, to_id);
        let to_row = to.push(entity);
        let retained = from
            .definition()
            .components()
            .intersection(to.definition().components());
        for bit in retained.ones() {
            let component = ComponentType::new(bit);
            to.component_bytes_mut(to_row, component)
                .copy_from_slice(from.component_bytes(from_row, component));
        }
        if let Some(moved) = from.swap_remove(from_row) {
            self.slots.slot_mut(moved).row = from_row;
        }

        let slot = self.slots.slot_mut(entity);
        slot.chunk = to_id;
        slot.row = to_row;
    }

    /// Swap-remove an entity's row from its chunk, re-pointing whichever
    /// entity was moved into the hole.
    fn remove_from_chunk(&mut self, entity: Entity) {
        let (chunk_id, row) = self.location(entity);
        if let Some(moved) = self.chunks.get_mut(chunk_id).swap_remove(row) {
            self.slots.slot_mut(moved).row = row;
        }
    }

    /// Recompute depths for an entity and its whole subtree, updating the
    /// world high-water mark.
    fn update_depths(&mut self, entity: Entity, depth: u16) {
        let mut stack = vec![(entity, depth)];
        while let Some((current, depth)) = stack.pop() {
            self.slots.slot_mut(current).depth = depth;
            self.slots.observe_depth(depth);
            for child in self.slots.children_of(current).collect::<Vec<_>>() {
                stack.push((child, depth + 1));
            }
        }
    }

    /// The effective state of a slot whose local intent is `state`, under a
    /// parent that does (`forced`) or does not force disablement.
    fn resolve_state(state: State, forced: bool) -> State {
        match state {
            State::Enabled | State::DisabledButLocallyEnabled => {
                if forced {
                    State::DisabledButLocallyEnabled
                } else {
                    State::Enabled
                }
            }
            other => other,
        }
    }

    /// Set a slot's state and move its row between the enabled and disabled
    /// variants of its chunk when the Disabled tag bit flips.
    fn apply_state(&mut self, entity: Entity, state: State) {
        self.slots.slot_mut(entity).state = state;
        let disabled = !state.is_enabled();
        let definition = *self.definition(entity);
        if definition.is_disabled() != disabled {
            self.migrate(entity, definition.with_disabled(disabled));
        }
    }

    /// Re-resolve the effective state of every descendant of `root` after
    /// `root`'s own state changed. A descendant whose state is unchanged
    /// bounds the walk, as does one whose children cache is stale.
    fn propagate_state(&mut self, root: Entity) {
        let mut stack: Vec<Entity> = self.slots.children_of(root).collect();
        while let Some(entity) = stack.pop() {
            let parent = self.slots.slot(entity).parent;
            let forced = self.slots.slot(parent).state.forces_disabled();
            let state = self.slots.slot(entity).state;
            let target = Self::resolve_state(state, forced);
            if target == state {
                continue;
            }
            self.apply_state(entity, target);
            if self.slots.slot(entity).flags.contains(Flags::CHILDREN_OUTDATED) {
                continue;
            }
            stack.extend(self.slots.children_of(entity));
        }
    }

    fn fire_entity(&self, entity: Entity, created: bool) {
        for (callback, user_data) in &self.listeners.entity {
            callback(self, entity, created, *user_data);
        }
    }

    fn fire_parent(&self, entity: Entity, old_parent: Entity, new_parent: Entity) {
        for (callback, user_data) in &self.listeners.parent {
            callback(self, entity, old_parent, new_parent, *user_data);
        }
    }

    fn fire_data(&self, entity: Entity, data_type: DataType, added: bool) {
        for (callback, user_data) in &self.listeners.data {
            callback(self, entity, data_type, added, *user_data);
        }
    }

    /// Check every world invariant reachable from the public API. Test and
    /// debug tooling only.
    ///
    /// # Panics
    /// Panics if any invariant is violated.
    pub fn verify_invariants(&self) {
        use std::collections::HashSet;

        // Chunk-local invariants plus row layout against the schema.
        for chunk in self.chunks.iter() {
            chunk.verify_invariants();
            let mut offset = 0u16;
            for bit in chunk.definition().components().ones() {
                let component = ComponentType::new(bit);
                assert_eq!(
                    chunk.offset_of(component),
                    offset,
                    "chunk offset out of sync with schema"
                );
                offset += self.schema.size(component);
            }
            assert_eq!(u32::from(offset), chunk.stride(), "stride out of sync");
        }

        let mut ranges = Vec::new();
        for entity in self.slots.live() {
            let slot = self.slots.slot(entity);

            // Slot and chunk agree about where the entity lives.
            assert_eq!(
                self.chunks.get(slot.chunk).entity_at(slot.row),
                Some(entity),
                "{entity} slot points at a row it does not own"
            );

            // The Disabled tag bit mirrors the state.
            assert_eq!(
                self.chunks.get(slot.chunk).definition().is_disabled(),
                !slot.state.is_enabled(),
                "{entity} disabled tag out of sync with state"
            );

            // Children counters are exact while the cache is fresh.
            if !slot.flags.contains(Flags::CHILDREN_OUTDATED) {
                assert_eq!(
                    slot.children_count as usize,
                    self.slots.children_of(entity).count(),
                    "{entity} children count out of sync"
                );
            }

            // A forced-disabled entity has a forcing ancestor.
            if slot.state == State::DisabledButLocallyEnabled {
                let mut ancestor = slot.parent;
                let mut found = false;
                while ancestor.is_some() && self.slots.is_live(ancestor) {
                    if self.slots.slot(ancestor).state.forces_disabled() {
                        found = true;
                        break;
                    }
                    ancestor = self.slots.slot(ancestor).parent;
                }
                assert!(found, "{entity} is forced disabled by no ancestor");
            }

            if slot.references.count > 0 {
                ranges.push(slot.references);
            }
        }

        // Reference slices tile the global list exactly.
        ranges.sort_by_key(|range| range.start);
        let mut cursor = 0u32;
        for range in &ranges {
            assert_eq!(range.start, cursor, "reference slices overlap or leak");
            cursor = range.end();
        }
        assert_eq!(
            cursor as usize,
            self.references.total_len(),
            "reference list holds unowned targets"
        );

        // The free stack holds unique, genuinely free ids.
        let mut seen = HashSet::new();
        for free in self.slots.free_ids() {
            assert!(seen.insert(*free), "duplicate id on the free stack");
            assert!(!self.slots.is_live(*free), "live id on the free stack");
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entity_count())
            .field("chunks", &self.chunks.len())
            .field("schema", &self.schema)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Position {
        x: f32,
        y: f32,
        z: f32,
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct Health {
        value: i32,
    }

    fn test_world() -> World {
        let schema = Schema::new();
        schema.register_component_of::<Position>("position");
        schema.register_component_of::<Health>("health");
        schema.register_array_of::<u32>("waypoints");
        schema.register_tag("boss");
        World::new(schema)
    }

    #[test]
    fn world_basic_lifecycle() {
        // Given
        let mut world = test_world();

        // When - the first entity gets id 1
        let e1 = world.create();

        // Then
        assert_eq!(e1, Entity::new(1));
        assert!(world.contains_entity(e1));

        // When - component round trip
        world.add(
            e1,
            Position {
                x: 1.0,
                y: 2.0,
                z: 3.0,
            },
        );

        // Then
        assert_eq!(
            world.get::<Position>(e1),
            Position {
                x: 1.0,
                y: 2.0,
                z: 3.0
            }
        );

        // When - destroy and create again
        world.destroy(e1, true);
        let e2 = world.create();

        // Then - the id is reused immediately
        assert_eq!(e2, Entity::new(1));
        assert_eq!(world.entity_count(), 1);
        world.verify_invariants();
    }

    #[test]
    fn world_archetype_migration_preserves_bytes() {
        // Given
        let mut world = test_world();
        let position = world.schema().component_of::<Position>();
        let health = world.schema().component_of::<Health>();
        let entity = world.create();

        // When - grow the composition one component at a time
        world.add(entity, Position { x: 0.0, y: 0.0, z: 0.0 });
        world.add(entity, Health { value: 99 });

        // Then
        let def = world.definition(entity);
        assert!(def.has_component(position));
        assert!(def.has_component(health));

        // When - drop the first component
        world.remove::<Position>(entity);

        // Then - the other component's value survived both moves
        assert!(!world.contains_component(entity, position));
        assert_eq!(world.get::<Health>(entity), Health { value: 99 });
        world.verify_invariants();
    }

    #[test]
    fn world_migration_repoints_swapped_entity() {
        // Given - three entities sharing a chunk
        let mut world = test_world();
        let a = world.create();
        let b = world.create();
        let c = world.create();
        world.add(a, Health { value: 1 });
        world.add(b, Health { value: 2 });
        world.add(c, Health { value: 3 });

        // When - the first one leaves the chunk, the last is swapped into
        // its row
        world.add(a, Position { x: 0.0, y: 0.0, z: 0.0 });

        // Then - everyone still reads their own value
        assert_eq!(world.get::<Health>(a), Health { value: 1 });
        assert_eq!(world.get::<Health>(b), Health { value: 2 });
        assert_eq!(world.get::<Health>(c), Health { value: 3 });
        world.verify_invariants();
    }

    #[test]
    fn world_bulk_component_mask_coalesces() {
        // Given
        let mut world = test_world();
        let position = world.schema().component_of::<Position>();
        let health = world.schema().component_of::<Health>();
        let entity = world.create();
        world.add(entity, Health { value: 10 });

        // When - the mask includes a bit that is already present
        let mask = BitMask::new().with(position.bit()).with(health.bit());
        world.add_component_types(entity, &mask);

        // Then - present bits coalesce, new ones arrive zeroed, data kept
        assert!(world.contains_component(entity, position));
        assert_eq!(world.get::<Health>(entity), Health { value: 10 });
        assert_eq!(
            world.get::<Position>(entity),
            Position { x: 0.0, y: 0.0, z: 0.0 }
        );

        // When - bulk removal ignores absent bits too
        world.remove_component_types(entity, &mask);

        // Then
        assert!(world.definition(entity).components().is_empty());
        world.verify_invariants();
    }

    #[test]
    fn world_tags_participate_in_archetype() {
        // Given
        let mut world = test_world();
        let boss = world.schema().register_tag("boss");
        let entity = world.create();
        let plain_chunk = world.chunk_id(entity);

        // When
        world.add_tag(entity, boss);

        // Then - the tag moved the entity to a different chunk
        assert!(world.has_tag(entity, boss));
        assert_ne!(world.chunk_id(entity), plain_chunk);

        // When
        world.remove_tag(entity, boss);

        // Then
        assert!(!world.has_tag(entity, boss));
        assert_eq!(world.chunk_id(entity), plain_chunk);
        world.verify_invariants();
    }

    #[test]
    fn world_array_lifecycle() {
        // Given
        let mut world = test_world();
        let waypoints = world.schema().array_of::<u32>();
        let entity = world.create();

        // When
        world.create_array(entity, waypoints, 3);
        world.array_mut(entity, waypoints).write::<u32>(1, 42);

        // Then
        assert!(world.contains_array(entity, waypoints));
        assert_eq!(world.array_len(entity, waypoints), 3);
        assert_eq!(world.array(entity, waypoints).read::<u32>(1), 42);

        // When - resizing does not move the entity between chunks
        let chunk_before = world.chunk_id(entity);
        world.resize_array(entity, waypoints, 5);

        // Then
        assert_eq!(world.chunk_id(entity), chunk_before);
        assert_eq!(world.array_len(entity, waypoints), 5);
        assert_eq!(world.array(entity, waypoints).read::<u32>(1), 42);
        assert_eq!(world.array(entity, waypoints).read::<u32>(4), 0);

        // When
        world.destroy_array(entity, waypoints);

        // Then
        assert!(!world.contains_array(entity, waypoints));
        world.verify_invariants();
    }

    #[test]
    fn world_create_with_definition_allocates_arrays() {
        // Given
        let mut world = test_world();
        let waypoints = world.schema().array_of::<u32>();
        let position = world.schema().component_of::<Position>();
        let def = Definition::EMPTY
            .with_component(position)
            .with_array(waypoints);

        // When
        let entity = world.create_with(def);

        // Then - arrays exist zero-length, components zeroed
        assert_eq!(world.array_len(entity, waypoints), 0);
        assert_eq!(
            world.get::<Position>(entity),
            Position { x: 0.0, y: 0.0, z: 0.0 }
        );
        world.verify_invariants();
    }

    #[test]
    fn world_enable_disable_propagates() {
        // Given - a parent with one child
        let mut world = test_world();
        let parent = world.create();
        let child = world.create();
        world.set_parent(child, parent);

        // When
        world.set_enabled(parent, false);

        // Then - both land in disabled chunks
        assert!(!world.is_enabled(parent));
        assert!(!world.is_enabled(child));
        assert!(world.is_locally_enabled(child));
        assert!(!world.is_locally_enabled(parent));
        assert!(world.definition(parent).is_disabled());
        assert!(world.definition(child).is_disabled());
        world.verify_invariants();

        // When
        world.set_enabled(parent, true);

        // Then - both restored
        assert!(world.is_enabled(parent));
        assert!(world.is_enabled(child));
        assert!(!world.definition(child).is_disabled());
        world.verify_invariants();
    }

    #[test]
    fn world_locally_disabled_child_keeps_its_state() {
        // Given
        let mut world = test_world();
        let parent = world.create();
        let child = world.create();
        let grandchild = world.create();
        world.set_parent(child, parent);
        world.set_parent(grandchild, child);
        world.set_enabled(child, false);

        // When - disabling and re-enabling the root
        world.set_enabled(parent, false);
        world.set_enabled(parent, true);

        // Then - the locally disabled child stays disabled, and keeps its
        // own subtree forced
        assert!(world.is_enabled(parent));
        assert!(!world.is_enabled(child));
        assert!(!world.is_locally_enabled(child));
        assert!(!world.is_enabled(grandchild));
        assert!(world.is_locally_enabled(grandchild));
        world.verify_invariants();

        // When - the child is enabled again
        world.set_enabled(child, true);

        // Then - the subtree follows
        assert!(world.is_enabled(child));
        assert!(world.is_enabled(grandchild));
        world.verify_invariants();
    }

    #[test]
    fn world_set_parent_under_disabled_demotes() {
        // Given
        let mut world = test_world();
        let parent = world.create();
        let child = world.create();
        world.set_enabled(parent, false);

        // When
        world.set_parent(child, parent);

        // Then
        assert!(!world.is_enabled(child));
        assert!(world.is_locally_enabled(child));
        world.verify_invariants();

        // When - reparenting to the root promotes again
        world.set_parent(child, Entity::NONE);

        // Then
        assert!(world.is_enabled(child));
        world.verify_invariants();
    }

    #[test]
    fn world_set_parent_maintains_depths() {
        // Given
        let mut world = test_world();
        let root = world.create();
        let mid = world.create();
        let leaf = world.create();
        world.set_parent(mid, root);
        world.set_parent(leaf, mid);

        // Then
        assert_eq!(world.depth(root), 0);
        assert_eq!(world.depth(mid), 1);
        assert_eq!(world.depth(leaf), 2);
        assert_eq!(world.max_depth(), 2);
        assert_eq!(world.child_count(root), 1);
        assert_eq!(world.children(mid), vec![leaf]);

        // When - the middle moves to the root level
        world.set_parent(mid, Entity::NONE);

        // Then - the subtree's depths follow
        assert_eq!(world.depth(mid), 0);
        assert_eq!(world.depth(leaf), 1);
        assert_eq!(world.child_count(root), 0);
        world.verify_invariants();
    }

    #[test]
    fn world_set_parent_treats_dead_parent_as_none() {
        // Given
        let mut world = test_world();
        let parent = world.create();
        let child = world.create();
        world.destroy(parent, true);

        // When
        world.set_parent(child, parent);

        // Then
        assert_eq!(world.parent(child), Entity::NONE);
        world.verify_invariants();
    }

    #[test]
    fn world_destroy_children_recursively() {
        // Given
        let mut world = test_world();
        let root = world.create();
        let child = world.create();
        let grandchild = world.create();
        world.set_parent(child, root);
        world.set_parent(grandchild, child);

        // When
        world.destroy(root, true);

        // Then
        assert_eq!(world.entity_count(), 0);
        world.verify_invariants();
    }

    #[test]
    fn world_destroy_orphans_children() {
        // Given
        let mut world = test_world();
        let root = world.create();
        let child = world.create();
        world.set_parent(child, root);
        world.set_enabled(root, false);

        // When
        world.destroy(root, false);

        // Then - the child survives as an enabled root
        assert!(world.contains_entity(child));
        assert_eq!(world.parent(child), Entity::NONE);
        assert_eq!(world.depth(child), 0);
        assert!(world.is_enabled(child));
        world.verify_invariants();
    }

    #[test]
    fn world_references_scenario() {
        // Given
        let mut world = test_world();
        let entity = world.create();
        let t1 = world.create();
        let t2 = world.create();

        // When
        let r1 = world.add_reference(entity, t1);
        let r2 = world.add_reference(entity, t2);

        // Then
        assert_eq!(r1.value(), 1);
        assert_eq!(r2.value(), 2);

        // When
        world.remove_reference(entity, r1);

        // Then - the remaining reference shifts to local index 1
        assert_eq!(world.get_reference(entity, LocalRef::new(1)), t2);
        assert_eq!(world.reference_count(entity), 1);
        assert!(world.contains_reference(entity, t2));
        assert!(!world.contains_reference(entity, t1));
        world.verify_invariants();
    }

    #[test]
    fn world_is_and_conform() {
        // Given
        let mut world = test_world();
        let position = world.schema().component_of::<Position>();
        let waypoints = world.schema().array_of::<u32>();
        let boss = world.schema().register_tag("boss");
        let shape = Definition::EMPTY
            .with_component(position)
            .with_array(waypoints)
            .with_tag(boss);
        let entity = world.create();
        world.add(entity, Position { x: 1.0, y: 1.0, z: 1.0 });

        // Then
        assert!(!world.is(entity, &shape));

        // When
        world.conform(entity, &shape);

        // Then - missing pieces added, existing data untouched
        assert!(world.is(entity, &shape));
        assert_eq!(
            world.get::<Position>(entity),
            Position { x: 1.0, y: 1.0, z: 1.0 }
        );
        assert_eq!(world.array_len(entity, waypoints), 0);
        world.verify_invariants();
    }

    #[test]
    fn world_clone_entity_copies_everything() {
        // Given
        let mut world = test_world();
        let waypoints = world.schema().array_of::<u32>();
        let boss = world.schema().register_tag("boss");
        let target = world.create();
        let source = world.create();
        world.add(source, Health { value: 55 });
        world.create_array_with(source, waypoints, bytemuck::cast_slice(&[7u32, 8, 9]));
        world.add_tag(source, boss);
        world.add_reference(source, target);

        // When
        let clone = world.clone_entity(source);

        // Then
        assert_ne!(clone, source);
        assert_eq!(world.get::<Health>(clone), Health { value: 55 });
        assert_eq!(world.array(clone, waypoints).read::<u32>(2), 9);
        assert!(world.has_tag(clone, boss));
        assert_eq!(world.references(clone), &[target]);
        world.verify_invariants();
    }

    #[test]
    fn world_append_copies_composition_and_data() {
        // Given
        let schema = Schema::new();
        schema.register_component_of::<Health>("health");
        schema.register_array_of::<u32>("waypoints");
        let waypoints = schema.array_of::<u32>();
        let mut source = World::new(schema.clone());
        let a = source.create();
        source.add(a, Health { value: 1 });
        let b = source.create();
        source.create_array_with(b, waypoints, bytemuck::cast_slice(&[4u32, 5]));
        source.set_enabled(b, false);

        let mut world = World::new(schema);
        let existing = world.create();
        world.add(existing, Health { value: 100 });

        // When
        world.append(&source);

        // Then - two new entities carrying the source's data
        assert_eq!(world.entity_count(), 3);
        let imported: Vec<Entity> = world.entities().skip(1).collect();
        assert_eq!(world.get::<Health>(imported[0]), Health { value: 1 });
        assert_eq!(world.array(imported[1], waypoints).read::<u32>(1), 5);
        assert!(!world.is_enabled(imported[1]));
        world.verify_invariants();
    }

    static ENTITY_EVENTS: AtomicU64 = AtomicU64::new(0);
    static PARENT_EVENTS: AtomicU64 = AtomicU64::new(0);
    static DATA_EVENTS: AtomicU64 = AtomicU64::new(0);

    fn count_entity(_world: &World, _entity: Entity, created: bool, user_data: u64) {
        ENTITY_EVENTS.fetch_add(if created { user_data } else { 1 }, Ordering::SeqCst);
    }

    fn count_parent(
        world: &World,
        entity: Entity,
        _old_parent: Entity,
        new_parent: Entity,
        _user_data: u64,
    ) {
        // The mutation has fully committed by the time the listener runs.
        assert_eq!(world.parent(entity), new_parent);
        PARENT_EVENTS.fetch_add(1, Ordering::SeqCst);
    }

    fn count_data(_world: &World, _entity: Entity, _data_type: DataType, added: bool, _user: u64) {
        DATA_EVENTS.fetch_add(if added { 1 } else { 10 }, Ordering::SeqCst);
    }

    #[test]
    fn world_listeners_fire_inline() {
        // Given
        let mut world = test_world();
        world.add_entity_listener(count_entity, 100);
        world.add_parent_listener(count_parent, 0);
        world.add_data_listener(count_data, 0);
        ENTITY_EVENTS.store(0, Ordering::SeqCst);
        PARENT_EVENTS.store(0, Ordering::SeqCst);
        DATA_EVENTS.store(0, Ordering::SeqCst);

        // When
        let parent = world.create();
        let child = world.create();
        world.set_parent(child, parent);
        world.add(child, Health { value: 1 });
        world.remove::<Health>(child);
        world.destroy(child, true);

        // Then - 2 creates at weight 100, 1 destroy at weight 1
        assert_eq!(ENTITY_EVENTS.load(Ordering::SeqCst), 201);
        assert_eq!(PARENT_EVENTS.load(Ordering::SeqCst), 1);
        // One add at weight 1, one remove at weight 10.
        assert_eq!(DATA_EVENTS.load(Ordering::SeqCst), 11);

        // When - unregistered listeners stay quiet
        assert!(world.remove_entity_listener(count_entity, 100));
        assert!(!world.remove_entity_listener(count_entity, 100));
        world.create();

        // Then
        assert_eq!(ENTITY_EVENTS.load(Ordering::SeqCst), 201);
    }

    #[test]
    fn world_chunk_version_invalidates_iterators() {
        // Given
        let mut world = test_world();
        let entity = world.create();
        world.add(entity, Health { value: 5 });
        let chunk_id = world.chunk_id(entity);
        let version = world.chunk(chunk_id).version();

        // When - a structural mutation in that chunk
        let other = world.create();
        world.add(other, Health { value: 6 });

        // Then - a cached (chunk, version) pair no longer validates
        assert_ne!(world.chunk(chunk_id).version(), version);
    }

    #[test]
    fn world_entities_iterator_is_restartable() {
        // Given
        let mut world = test_world();
        let a = world.create();
        let b = world.create();
        let c = world.create();
        world.destroy(b, true);

        // When / Then - both passes see the same live set
        assert_eq!(world.entities().collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(world.entities().collect::<Vec<_>>(), vec![a, c]);
    }
}
