//! Recorded operations: batched structural edits replayed against a world.
//!
//! An [`Operation`] is a value object: an owned, append-only byte buffer of
//! tag-prefixed instructions. Recording never touches a world; types are
//! referred to by their schema-stable hash and resolved against the target
//! world's schema only when [`Operation::perform`] runs.
//!
//! Playback keeps two scratch lists:
//!
//! - `history`: every entity created by the operation so far, in order.
//!   Instructions ending in "prev created" index it from the back
//!   (`ago == 0` is the most recent).
//! - `selection`: the entities the next data instruction applies to.
//!   Creating with `select` replaces the selection with the new entities;
//!   explicit select instructions append.
//!
//! Array payloads carry byte lengths, not element counts: the recorder does
//! not know element strides, only the target world's schema does.
//!
//! A recorded buffer is untrusted input: nothing ties it to the world it is
//! eventually performed against. Playback therefore validates every
//! instruction's preconditions (entity liveness, component/array presence,
//! reference bounds, self-parenting) and fails with the matching error
//! instead of tripping the world's debug assertions. Playback fails fast:
//! instructions before the failing one stay applied.

use std::io::{Cursor, Read};

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;

use crate::{
    entity::Entity,
    error::Error,
    references::LocalRef,
    schema::{ArrayType, ComponentType, DataType, TypeHash},
    world::World,
};

/// The instruction tags understood by playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Instruction {
    CreateEntities = 0,
    DestroySelected = 1,
    SelectEntities = 2,
    SelectPrevCreated = 3,
    ClearSelection = 4,
    SetParent = 5,
    SetParentToPrevCreated = 6,
    AddComponent = 7,
    SetComponent = 8,
    AddOrSetComponent = 9,
    RemoveComponent = 10,
    CreateArray = 11,
    CreateAndInitializeArray = 12,
    ResizeArray = 13,
    SetArrayElements = 14,
    SetArray = 15,
    CreateOrSetArray = 16,
    RemoveReference = 17,
    AddReferenceToPrevCreated = 18,
}

impl Instruction {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::CreateEntities),
            1 => Some(Self::DestroySelected),
            2 => Some(Self::SelectEntities),
            3 => Some(Self::SelectPrevCreated),
            4 => Some(Self::ClearSelection),
            5 => Some(Self::SetParent),
            6 => Some(Self::SetParentToPrevCreated),
            7 => Some(Self::AddComponent),
            8 => Some(Self::SetComponent),
            9 => Some(Self::AddOrSetComponent),
            10 => Some(Self::RemoveComponent),
            11 => Some(Self::CreateArray),
            12 => Some(Self::CreateAndInitializeArray),
            13 => Some(Self::ResizeArray),
            14 => Some(Self::SetArrayElements),
            15 => Some(Self::SetArray),
            16 => Some(Self::CreateOrSetArray),
            17 => Some(Self::RemoveReference),
            18 => Some(Self::AddReferenceToPrevCreated),
            _ => None,
        }
    }
}

/// A recorded batch of structural edits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Number of recorded instructions.
    count: u32,
    /// The instruction bytes.
    buffer: Vec<u8>,
}

impl Operation {
    /// Create an empty operation.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of recorded instructions.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// The number of used instruction bytes.
    #[inline]
    pub fn used(&self) -> usize {
        self.buffer.len()
    }

    /// Whether nothing has been recorded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Drop every recorded instruction, keeping the allocation.
    pub fn clear(&mut self) {
        self.count = 0;
        self.buffer.clear();
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    /// Record: create `count` entities. When `select` is true the new
    /// entities replace the selection.
    pub fn create_entities(&mut self, count: i32, select: bool) {
        self.begin(Instruction::CreateEntities, 5);
        self.write_i32(count);
        self.buffer.push(select as u8);
    }

    /// Record: destroy every selected entity (with its children), then
    /// clear the selection.
    pub fn destroy_selected(&mut self) {
        self.begin(Instruction::DestroySelected, 0);
    }

    /// Record: append the given entities to the selection.
    pub fn select_entities(&mut self, entities: &[Entity]) {
        self.begin(Instruction::SelectEntities, 4 + entities.len() * 4);
        self.write_i32(entities.len() as i32);
        for entity in entities {
            self.write_u32(entity.value());
        }
    }

    /// Record: append the entity created `ago` creations back (`0` is the
    /// most recent) to the selection.
    pub fn select_prev_created(&mut self, ago: u32) {
        self.begin(Instruction::SelectPrevCreated, 4);
        self.write_u32(ago);
    }

    /// Record: empty the selection.
    pub fn clear_selection(&mut self) {
        self.begin(Instruction::ClearSelection, 0);
    }

    /// Record: parent every selected entity to the given id of the target
    /// world.
    pub fn set_parent(&mut self, parent: Entity) {
        self.begin(Instruction::SetParent, 4);
        self.write_u32(parent.value());
    }

    /// Record: parent every selected entity to the entity created `ago`
    /// creations back.
    pub fn set_parent_to_prev_created(&mut self, ago: i32) {
        self.begin(Instruction::SetParentToPrevCreated, 4);
        self.write_i32(ago);
    }

    /// Record: add a component, initialized from `bytes`, to every selected
    /// entity.
    pub fn add_component(&mut self, hash: TypeHash, bytes: &[u8]) {
        self.component_instruction(Instruction::AddComponent, hash, bytes);
    }

    /// Record: overwrite a present component on every selected entity.
    pub fn set_component(&mut self, hash: TypeHash, bytes: &[u8]) {
        self.component_instruction(Instruction::SetComponent, hash, bytes);
    }

    /// Record: add or overwrite a component on every selected entity,
    /// depending on whether it is present at playback time.
    pub fn add_or_set_component(&mut self, hash: TypeHash, bytes: &[u8]) {
        self.component_instruction(Instruction::AddOrSetComponent, hash, bytes);
    }

    /// Record: remove a component from every selected entity.
    pub fn remove_component(&mut self, hash: TypeHash) {
        self.begin(Instruction::RemoveComponent, 8);
        self.write_i64(hash.raw());
    }

    /// Record: create a zero-initialized array of `length` elements on
    /// every selected entity.
    pub fn create_array(&mut self, hash: TypeHash, length: i32) {
        self.begin(Instruction::CreateArray, 12);
        self.write_i64(hash.raw());
        self.write_i32(length);
    }

    /// Record: create an array initialized from packed element bytes on
    /// every selected entity.
    pub fn create_and_initialize_array(&mut self, hash: TypeHash, bytes: &[u8]) {
        self.array_bytes_instruction(Instruction::CreateAndInitializeArray, hash, bytes);
    }

    /// Record: resize a present array on every selected entity.
    pub fn resize_array(&mut self, hash: TypeHash, length: i32) {
        self.begin(Instruction::ResizeArray, 12);
        self.write_i64(hash.raw());
        self.write_i32(length);
    }

    /// Record: overwrite elements of a present array, starting at element
    /// `index`, on every selected entity.
    pub fn set_array_elements(&mut self, hash: TypeHash, index: i32, bytes: &[u8]) {
        self.begin(Instruction::SetArrayElements, 16 + bytes.len());
        self.write_i64(hash.raw());
        self.write_i32(index);
        self.write_i32(bytes.len() as i32);
        self.buffer.extend_from_slice(bytes);
    }

    /// Record: resize a present array to fit `bytes` and overwrite it, on
    /// every selected entity.
    pub fn set_array(&mut self, hash: TypeHash, bytes: &[u8]) {
        self.array_bytes_instruction(Instruction::SetArray, hash, bytes);
    }

    /// Record: create-or-overwrite an array from packed element bytes,
    /// depending on presence at playback time.
    pub fn create_or_set_array(&mut self, hash: TypeHash, bytes: &[u8]) {
        self.array_bytes_instruction(Instruction::CreateOrSetArray, hash, bytes);
    }

    /// Record: remove the reference at a 1-based local index from every
    /// selected entity.
    pub fn remove_reference(&mut self, reference: LocalRef) {
        self.begin(Instruction::RemoveReference, 4);
        self.write_u32(reference.value());
    }

    /// Record: add a reference to the entity created `ago` creations back,
    /// on every selected entity.
    pub fn add_reference_to_prev_created(&mut self, ago: i32) {
        self.begin(Instruction::AddReferenceToPrevCreated, 4);
        self.write_i32(ago);
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Apply the recorded instructions, in order, to `world`.
    ///
    /// Entities named by "prev created" instructions are the ones this
    /// playback created, so replaying the same operation against different
    /// worlds produces isomorphic results regardless of their free lists.
    pub fn perform(&self, world: &mut World) -> Result<(), Error> {
        let mut input = Cursor::new(self.buffer.as_slice());
        let mut history: Vec<Entity> = Vec::new();
        let mut selection: Vec<Entity> = Vec::new();

        while (input.position() as usize) < self.buffer.len() {
            let tag = read_u8(&mut input)?;
            let instruction =
                Instruction::from_u8(tag).ok_or(Error::UnknownInstruction(tag))?;
            match instruction {
                Instruction::CreateEntities => {
                    let count = input.read_i32::<LittleEndian>()?;
                    let select = read_u8(&mut input)? != 0;
                    if select {
                        selection.clear();
                    }
                    for _ in 0..count.max(0) {
                        let entity = world.create();
                        history.push(entity);
                        if select {
                            selection.push(entity);
                        }
                    }
                }
                Instruction::DestroySelected => {
                    for entity in selection.drain(..) {
                        // A selected entity may already be gone as a child
                        // of an earlier destroy.
                        if world.contains_entity(entity) {
                            world.destroy(entity, true);
                        } else {
                            trace!("destroy skipped, {entity} already gone");
                        }
                        history.retain(|created| *created != entity);
                    }
                }
                Instruction::SelectEntities => {
                    let count = input.read_i32::<LittleEndian>()?;
                    for _ in 0..count.max(0) {
                        selection.push(Entity::new(input.read_u32::<LittleEndian>()?));
                    }
                }
                Instruction::SelectPrevCreated => {
                    let ago = input.read_u32::<LittleEndian>()?;
                    selection.push(prev_created(&history, ago as i64)?);
                }
                Instruction::ClearSelection => {
                    selection.clear();
                }
                Instruction::SetParent => {
                    let parent = Entity::new(input.read_u32::<LittleEndian>()?);
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if *entity == parent {
                            return Err(Error::InvalidParent(*entity));
                        }
                        world.set_parent(*entity, parent);
                    }
                }
                Instruction::SetParentToPrevCreated => {
                    let ago = input.read_i32::<LittleEndian>()?;
                    let parent = prev_created(&history, i64::from(ago))?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if *entity == parent {
                            return Err(Error::InvalidParent(*entity));
                        }
                        world.set_parent(*entity, parent);
                    }
                }
                Instruction::AddComponent => {
                    let (component, bytes) = read_component(world, &mut input)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if world.contains_component(*entity, component) {
                            return Err(Error::ComponentAlreadyPresent(component));
                        }
                        world.add_component_bytes(*entity, component, &bytes);
                    }
                }
                Instruction::SetComponent => {
                    let (component, bytes) = read_component(world, &mut input)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if !world.contains_component(*entity, component) {
                            return Err(Error::ComponentMissing(component));
                        }
                        world.set_component_bytes(*entity, component, &bytes);
                    }
                }
                Instruction::AddOrSetComponent => {
                    let (component, bytes) = read_component(world, &mut input)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if world.contains_component(*entity, component) {
                            world.set_component_bytes(*entity, component, &bytes);
                        } else {
                            world.add_component_bytes(*entity, component, &bytes);
                        }
                    }
                }
                Instruction::RemoveComponent => {
                    let component = resolve_component(world, read_hash(&mut input)?)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if !world.contains_component(*entity, component) {
                            return Err(Error::ComponentMissing(component));
                        }
                        world.remove_component(*entity, component);
                    }
                }
                Instruction::CreateArray => {
                    let array = resolve_array(world, read_hash(&mut input)?)?;
                    let length = input.read_i32::<LittleEndian>()?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if world.contains_array(*entity, array) {
                            return Err(Error::ArrayAlreadyPresent(array));
                        }
                        world.create_array(*entity, array, length.max(0) as u32);
                    }
                }
                Instruction::CreateAndInitializeArray => {
                    let (array, bytes) = read_array_bytes(world, &mut input)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if world.contains_array(*entity, array) {
                            return Err(Error::ArrayAlreadyPresent(array));
                        }
                        world.create_array_with(*entity, array, &bytes);
                    }
                }
                Instruction::ResizeArray => {
                    let array = resolve_array(world, read_hash(&mut input)?)?;
                    let length = input.read_i32::<LittleEndian>()?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if !world.contains_array(*entity, array) {
                            return Err(Error::ArrayMissing(array));
                        }
                        world.resize_array(*entity, array, length.max(0) as u32);
                    }
                }
                Instruction::SetArrayElements => {
                    let array = resolve_array(world, read_hash(&mut input)?)?;
                    let index = input.read_i32::<LittleEndian>()?;
                    let bytes = read_bytes(&mut input)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if !world.contains_array(*entity, array) {
                            return Err(Error::ArrayMissing(array));
                        }
                        world.set_array_elements(*entity, array, index.max(0) as u32, &bytes);
                    }
                }
                Instruction::SetArray => {
                    let (array, bytes) = read_array_bytes(world, &mut input)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if !world.contains_array(*entity, array) {
                            return Err(Error::ArrayMissing(array));
                        }
                        overwrite_array(world, *entity, array, &bytes);
                    }
                }
                Instruction::CreateOrSetArray => {
                    let (array, bytes) = read_array_bytes(world, &mut input)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if world.contains_array(*entity, array) {
                            overwrite_array(world, *entity, array, &bytes);
                        } else {
                            world.create_array_with(*entity, array, &bytes);
                        }
                    }
                }
                Instruction::RemoveReference => {
                    let reference = LocalRef::new(input.read_u32::<LittleEndian>()?);
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        if !world.contains_reference_index(*entity, reference) {
                            return Err(Error::ReferenceMissing(*entity));
                        }
                        world.remove_reference(*entity, reference);
                    }
                }
                Instruction::AddReferenceToPrevCreated => {
                    let ago = input.read_i32::<LittleEndian>()?;
                    let target = prev_created(&history, i64::from(ago))?;
                    ensure_live(world, target)?;
                    for entity in &selection {
                        ensure_live(world, *entity)?;
                        world.add_reference(*entity, target);
                    }
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Wire form
    // ------------------------------------------------------------------

    /// Serialize as `count: i32, used: i32, capacity: i32, bytes[used]`
    /// (little-endian).
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + self.buffer.len());
        out.extend_from_slice(&(self.count as i32).to_le_bytes());
        out.extend_from_slice(&(self.buffer.len() as i32).to_le_bytes());
        out.extend_from_slice(&(self.buffer.capacity() as i32).to_le_bytes());
        out.extend_from_slice(&self.buffer);
        out
    }

    /// Deserialize an operation from its wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut input = Cursor::new(bytes);
        let count = input.read_i32::<LittleEndian>()?;
        let used = input.read_i32::<LittleEndian>()?;
        let capacity = input.read_i32::<LittleEndian>()?;
        if count < 0 || used < 0 || capacity < used {
            return Err(Error::Corrupt("implausible operation header"));
        }
        let mut buffer = Vec::with_capacity(capacity as usize);
        buffer.resize(used as usize, 0);
        input.read_exact(&mut buffer)?;
        Ok(Self {
            count: count as u32,
            buffer,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Start an instruction: grow the buffer to the next power of two when
    /// needed, then write the tag byte.
    fn begin(&mut self, instruction: Instruction, payload: usize) {
        let required = self.buffer.len() + 1 + payload;
        if required > self.buffer.capacity() {
            self.buffer
                .reserve_exact(required.next_power_of_two() - self.buffer.len());
        }
        self.buffer.push(instruction as u8);
        self.count += 1;
    }

    fn component_instruction(&mut self, instruction: Instruction, hash: TypeHash, bytes: &[u8]) {
        self.begin(instruction, 8 + bytes.len());
        self.write_i64(hash.raw());
        self.buffer.extend_from_slice(bytes);
    }

    fn array_bytes_instruction(&mut self, instruction: Instruction, hash: TypeHash, bytes: &[u8]) {
        self.begin(instruction, 12 + bytes.len());
        self.write_i64(hash.raw());
        self.write_i32(bytes.len() as i32);
        self.buffer.extend_from_slice(bytes);
    }

    fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

}

/// Read a component payload: the hash, then exactly the component's size in
/// bytes according to the target schema.
fn read_component(
    world: &World,
    input: &mut Cursor<&[u8]>,
) -> Result<(ComponentType, Vec<u8>), Error> {
    let component = resolve_component(world, read_hash(input)?)?;
    let mut bytes = vec![0u8; world.schema().size(component) as usize];
    input.read_exact(&mut bytes)?;
    Ok((component, bytes))
}

/// Read an array payload: the hash, then a byte length and that many
/// element bytes.
fn read_array_bytes(
    world: &World,
    input: &mut Cursor<&[u8]>,
) -> Result<(ArrayType, Vec<u8>), Error> {
    let array = resolve_array(world, read_hash(input)?)?;
    let bytes = read_bytes(input)?;
    let stride = world.schema().array_size(array) as usize;
    if stride != 0 && bytes.len() % stride != 0 {
        return Err(Error::Corrupt("array payload is not whole elements"));
    }
    Ok((array, bytes))
}

fn ensure_live(world: &World, entity: Entity) -> Result<(), Error> {
    if world.contains_entity(entity) {
        Ok(())
    } else {
        Err(Error::EntityMissing(entity))
    }
}

fn prev_created(history: &[Entity], ago: i64) -> Result<Entity, Error> {
    let index = history.len() as i64 - 1 - ago;
    if ago < 0 || index < 0 {
        return Err(Error::Corrupt("creation history index out of range"));
    }
    Ok(history[index as usize])
}

fn resolve_component(world: &World, hash: TypeHash) -> Result<ComponentType, Error> {
    match world.schema().type_by_hash(hash) {
        Some(DataType::Component(component)) => Ok(component),
        _ => Err(Error::UnknownTypeHash(hash.raw())),
    }
}

fn resolve_array(world: &World, hash: TypeHash) -> Result<ArrayType, Error> {
    match world.schema().type_by_hash(hash) {
        Some(DataType::Array(array)) => Ok(array),
        _ => Err(Error::UnknownTypeHash(hash.raw())),
    }
}

fn overwrite_array(world: &mut World, entity: Entity, array: ArrayType, bytes: &[u8]) {
    let stride = world.schema().array_size(array) as usize;
    let length = if stride == 0 { 0 } else { (bytes.len() / stride) as u32 };
    world.resize_array(entity, array, length);
    world
        .array_mut(entity, array)
        .bytes_mut()
        .copy_from_slice(bytes);
}

fn read_hash(input: &mut Cursor<&[u8]>) -> Result<TypeHash, Error> {
    Ok(TypeHash::from_raw(input.read_i64::<LittleEndian>()?))
}

fn read_bytes(input: &mut Cursor<&[u8]>) -> Result<Vec<u8>, Error> {
    let length = input.read_i32::<LittleEndian>()?;
    if length < 0 {
        return Err(Error::Corrupt("negative payload length"));
    }
    let mut bytes = vec![0u8; length as usize];
    input.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn read_u8(input: &mut Cursor<&[u8]>) -> Result<u8, Error> {
    let mut byte = [0u8; 1];
    input.read_exact(&mut byte)?;
    Ok(byte[0])
}
