//! The binary world format, version 1.
//!
//! Layout (all integers little-endian):
//!
//! 1. `version: u32`
//! 2. the embedded schema (see [`Schema::save`])
//! 3. `entity_count: i32`, `max_entity_value: i32`
//! 4. one record per live entity, in ascending id order:
//!    `id: u32, state: u8, parent: u32`, then the component list
//!    (`count: u8`, then `type: u8` + value bytes each), the array list
//!    (`count: u8`, then `type: u8, len: i32` + element bytes each), and
//!    the tag list (`count: u8`, then `type: u8` each). The reserved
//!    Disabled tag is not listed; the state byte carries it.
//! 5. one reference record per live entity, in the same order:
//!    `count: i32`, then the target entity ids as `u32` each.
//!
//! Ids are not stable across a round trip: loading creates entities in
//! record order against a fresh id space and remaps parent and reference
//! targets through the old-to-new table. A reference target that was not
//! serialized (a dangling id) loads as the none entity.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::{
    chunk::Definition,
    entity::Entity,
    error::Error,
    schema::{ArrayType, ComponentType, DataKind, Schema, TagType, TypeMeta},
    slot::State,
    world::World,
};

/// The format version this build reads and writes.
pub const FORMAT_VERSION: u32 = 1;

impl World {
    /// Serialize the world, including its schema, to a byte vector.
    pub fn save(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        self.schema()
            .save(&mut out)
            .expect("writing to a vec cannot fail");
        out.extend_from_slice(&(self.entity_count() as i32).to_le_bytes());
        out.extend_from_slice(&(self.max_entity_value() as i32).to_le_bytes());

        for entity in self.entities() {
            let definition = *self.definition(entity);
            out.extend_from_slice(&entity.value().to_le_bytes());
            out.push(self.slots.slot(entity).state().to_u8());
            out.extend_from_slice(&self.parent(entity).value().to_le_bytes());

            out.push(definition.components().count_ones() as u8);
            for bit in definition.components().ones() {
                out.push(bit);
                out.extend_from_slice(self.component_bytes(entity, ComponentType::new(bit)));
            }

            out.push(definition.arrays().count_ones() as u8);
            for bit in definition.arrays().ones() {
                let array = self.array(entity, ArrayType::new(bit));
                out.push(bit);
                out.extend_from_slice(&(array.len() as i32).to_le_bytes());
                out.extend_from_slice(array.bytes());
            }

            let tags: Vec<u8> = definition
                .tags()
                .ones()
                .filter(|bit| *bit != TagType::DISABLED.bit())
                .collect();
            out.push(tags.len() as u8);
            out.extend_from_slice(&tags);
        }

        for entity in self.entities() {
            let targets = self.references(entity);
            out.extend_from_slice(&(targets.len() as i32).to_le_bytes());
            for target in targets {
                out.extend_from_slice(&target.value().to_le_bytes());
            }
        }

        out
    }

    /// Deserialize a world from bytes produced by [`World::save`].
    pub fn load(bytes: &[u8]) -> Result<World, Error> {
        Self::load_with(bytes, crate::schema::keep_meta)
    }

    /// Deserialize a world, routing every schema type through `process`
    /// before registration. This is the seam for adapting foreign schemas.
    pub fn load_with(
        bytes: &[u8],
        process: impl FnMut(TypeMeta, DataKind) -> TypeMeta,
    ) -> Result<World, Error> {
        let mut input = Cursor::new(bytes);

        let version = input.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(Error::VersionMismatch {
                expected: FORMAT_VERSION,
                found: version,
            });
        }

        let schema = Schema::load(&mut input, process)?;
        let mut world = World::new(schema);

        let entity_count = input.read_i32::<LittleEndian>()?;
        let _max_entity_value = input.read_i32::<LittleEndian>()?;
        if entity_count < 0 {
            return Err(Error::Corrupt("negative entity count"));
        }

        let mut remap: HashMap<u32, Entity> = HashMap::new();
        let mut created: Vec<(Entity, u32, State)> = Vec::new();

        for _ in 0..entity_count {
            let old_id = input.read_u32::<LittleEndian>()?;
            let state = State::from_u8(read_u8(&mut input)?)
                .ok_or(Error::Corrupt("unknown entity state"))?;
            let old_parent = input.read_u32::<LittleEndian>()?;

            let ncomp = read_u8(&mut input)?;
            let mut components = Vec::with_capacity(ncomp as usize);
            let mut definition = Definition::EMPTY;
            for _ in 0..ncomp {
                let bit = read_u8(&mut input)?;
                let component = ComponentType::new(bit);
                if component.index() >= world.schema().component_count() {
                    return Err(Error::Corrupt("component type out of range"));
                }
                let mut bytes = vec![0u8; world.schema().size(component) as usize];
                input.read_exact(&mut bytes)?;
                definition = definition.with_component(component);
                components.push((component, bytes));
            }

            let narr = read_u8(&mut input)?;
            let mut arrays = Vec::with_capacity(narr as usize);
            for _ in 0..narr {
                let bit = read_u8(&mut input)?;
                let array = ArrayType::new(bit);
                if array.index() >= world.schema().array_count() {
                    return Err(Error::Corrupt("array type out of range"));
                }
                let length = input.read_i32::<LittleEndian>()?;
                if length < 0 {
                    return Err(Error::Corrupt("negative array length"));
                }
                let stride = world.schema().array_size(array) as usize;
                let mut bytes = vec![0u8; length as usize * stride];
                input.read_exact(&mut bytes)?;
                definition = definition.with_array(array);
                arrays.push((array, bytes));
            }

            let ntag = read_u8(&mut input)?;
            for _ in 0..ntag {
                let bit = read_u8(&mut input)?;
                let tag = TagType::new(bit);
                if tag.index() >= world.schema().tag_count() {
                    return Err(Error::Corrupt("tag type out of range"));
                }
                definition = definition.with_tag(tag);
            }

            let entity = world.create_with(definition);
            for (component, bytes) in components {
                world.set_component_bytes(entity, component, &bytes);
            }
            for (array, bytes) in arrays {
                let stride = world.schema().array_size(array) as usize;
                let length = if stride == 0 {
                    0
                } else {
                    (bytes.len() / stride) as u32
                };
                world.resize_array(entity, array, length);
                world
                    .array_mut(entity, array)
                    .bytes_mut()
                    .copy_from_slice(&bytes);
            }

            remap.insert(old_id, entity);
            created.push((entity, old_parent, state));
        }

        // Hierarchy next: every serialized parent is itself serialized, so
        // the remap table resolves all of them.
        for (entity, old_parent, _) in &created {
            if *old_parent != 0 {
                let parent = remap
                    .get(old_parent)
                    .copied()
                    .ok_or(Error::Corrupt("parent id not in file"))?;
                world.set_parent(*entity, parent);
            }
        }

        // Enablement last: disabling the locally disabled entities rebuilds
        // the forced-disabled states of their subtrees.
        for (entity, _, state) in &created {
            if *state == State::Disabled {
                world.set_enabled(*entity, false);
            }
        }

        for (entity, _, _) in &created {
            let count = input.read_i32::<LittleEndian>()?;
            if count < 0 {
                return Err(Error::Corrupt("negative reference count"));
            }
            for _ in 0..count {
                let old_target = input.read_u32::<LittleEndian>()?;
                // Dangling targets (destroyed before saving) load as none.
                let target = remap.get(&old_target).copied().unwrap_or(Entity::NONE);
                world.references.add(&mut world.slots, *entity, target);
            }
        }

        Ok(world)
    }
}

fn read_u8<R: Read>(input: &mut R) -> Result<u8, Error> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte)?;
    Ok(byte[0])
}
