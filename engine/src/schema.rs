//! The type registry consumed by the world.
//!
//! A [`Schema`] assigns stable small indices to three disjoint namespaces of
//! data types: components (fixed-size inline records), arrays (variable
//! length per-entity buffers), and tags (presence-only booleans). Each
//! namespace addresses at most 256 values, matching the bit capacity of the
//! archetype masks.
//!
//! Every registered type also carries a schema-stable 64-bit [`TypeHash`]
//! derived from its registered name. Hashes, not indices, are what recorded
//! operations and serialized worlds refer to, so two schemas that registered
//! the same names in a different order still interoperate.
//!
//! Registration takes `&self`: hash and Rust-type lookups go through a
//! sharded concurrent map, and the per-namespace tables sit behind a
//! read-write lock that is only write-held while registering.

use std::{any::TypeId as StdTypeId, fmt, io, mem, sync::RwLock};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dashmap::DashMap;

/// A component type index. Addresses one bit of a definition's component mask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentType(u8);

/// An array type index. Addresses one bit of a definition's array mask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArrayType(u8);

/// A tag type index. Addresses one bit of a definition's tag mask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TagType(u8);

macro_rules! type_index_impl {
    ($name:ident) => {
        impl $name {
            /// Construct from a raw namespace index.
            #[inline]
            pub const fn new(index: u8) -> Self {
                Self(index)
            }

            /// The bit this type occupies in its mask.
            #[inline]
            pub const fn bit(&self) -> u8 {
                self.0
            }

            /// The index of this type in namespace-indexed storage.
            #[inline]
            pub const fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl From<u8> for $name {
            #[inline]
            fn from(value: u8) -> Self {
                Self(value)
            }
        }
    };
}

type_index_impl!(ComponentType);
type_index_impl!(ArrayType);
type_index_impl!(TagType);

impl TagType {
    /// The reserved Disabled tag. It occupies the highest tag bit so that
    /// enabled and disabled copies of the same composition live in distinct
    /// chunks. It is never handed out by registration.
    pub const DISABLED: Self = Self(255);
}

/// The namespace a data type belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Fixed-size inline record stored in chunk rows.
    Component,
    /// Variable-length per-entity buffer.
    Array,
    /// Presence-only boolean.
    Tag,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataKind::Component => write!(f, "component"),
            DataKind::Array => write!(f, "array"),
            DataKind::Tag => write!(f, "tag"),
        }
    }
}

/// A resolved data type: namespace plus index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// A component type.
    Component(ComponentType),
    /// An array type.
    Array(ArrayType),
    /// A tag type.
    Tag(TagType),
}

impl DataType {
    /// The namespace of this data type.
    #[inline]
    pub fn kind(&self) -> DataKind {
        match self {
            DataType::Component(_) => DataKind::Component,
            DataType::Array(_) => DataKind::Array,
            DataType::Tag(_) => DataKind::Tag,
        }
    }

    /// The index within the namespace.
    #[inline]
    pub fn index(&self) -> u8 {
        match self {
            DataType::Component(t) => t.bit(),
            DataType::Array(t) => t.bit(),
            DataType::Tag(t) => t.bit(),
        }
    }
}

/// A schema-stable 64-bit type identity, derived from the registered name.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeHash(i64);

impl TypeHash {
    /// Hash a type name (FNV-1a over the UTF-8 bytes).
    pub fn of_name(name: &str) -> Self {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let mut hash = OFFSET;
        for byte in name.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        Self(hash as i64)
    }

    /// Construct from a raw hash value.
    #[inline]
    pub const fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// The raw hash value.
    #[inline]
    pub const fn raw(&self) -> i64 {
        self.0
    }
}

/// The wire-visible description of a registered type: identity plus byte
/// size (element size for arrays, zero for tags).
///
/// Deserialization routes every `TypeMeta` it reads through a caller
/// supplied hook before registration, which is the seam for adapting a
/// foreign schema to local naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMeta {
    /// The schema-stable identity.
    pub hash: TypeHash,
    /// Byte size of one value (component) or one element (array).
    pub size: u16,
}

/// The identity hook used when no adaptation is wanted.
pub fn keep_meta(meta: TypeMeta, _kind: DataKind) -> TypeMeta {
    meta
}

/// The registry of component, array, and tag types backing one or more
/// worlds.
pub struct Schema {
    /// Component metadata, indexed by `ComponentType`.
    components: RwLock<Vec<TypeMeta>>,

    /// Array metadata, indexed by `ArrayType`. `size` is the element stride.
    arrays: RwLock<Vec<TypeMeta>>,

    /// Tag identities, indexed by `TagType`.
    tags: RwLock<Vec<TypeHash>>,

    /// Hash to resolved type. Lock-free reads via sharded concurrent map.
    by_hash: DashMap<i64, DataType>,

    /// Rust type to resolved type, for the typed access layer.
    by_rust_type: DashMap<StdTypeId, DataType>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new()
    }
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self {
            components: RwLock::new(Vec::new()),
            arrays: RwLock::new(Vec::new()),
            tags: RwLock::new(Vec::new()),
            by_hash: DashMap::new(),
            by_rust_type: DashMap::new(),
        }
    }

    /// Register a component type by name and byte size.
    ///
    /// Registering the same name twice returns the existing index (the size
    /// must match).
    ///
    /// # Panics
    /// - If the name is already registered in a different namespace.
    /// - If the component namespace is exhausted (256 types).
    pub fn register_component(&self, name: &str, size: u16) -> ComponentType {
        self.register_component_meta(TypeMeta {
            hash: TypeHash::of_name(name),
            size,
        })
    }

    /// Register a component type backed by a Rust value type.
    ///
    /// Binds `T` so that the typed world accessors can resolve the index
    /// without naming it.
    pub fn register_component_of<T: bytemuck::Pod>(&self, name: &str) -> ComponentType {
        let index = self.register_component(name, mem::size_of::<T>() as u16);
        self.by_rust_type
            .insert(StdTypeId::of::<T>(), DataType::Component(index));
        index
    }

    /// Register a component type from wire metadata. Used by deserialization.
    pub fn register_component_meta(&self, meta: TypeMeta) -> ComponentType {
        if let Some(existing) = self.by_hash.get(&meta.hash.raw()) {
            return match *existing {
                DataType::Component(index) => {
                    debug_assert_eq!(
                        self.size(index),
                        meta.size,
                        "component re-registered with a different size"
                    );
                    index
                }
                other => panic!(
                    "type {:#x} is already registered as a {}, cannot register as component",
                    meta.hash.raw(),
                    other.kind()
                ),
            };
        }
        let mut components = self.components.write().unwrap();
        assert!(
            components.len() < 256,
            "component type namespace exhausted"
        );
        let index = ComponentType(components.len() as u8);
        components.push(meta);
        self.by_hash
            .insert(meta.hash.raw(), DataType::Component(index));
        index
    }

    /// Register an array type by name and element byte size.
    ///
    /// # Panics
    /// - If the name is already registered in a different namespace.
    /// - If the array namespace is exhausted (256 types).
    pub fn register_array(&self, name: &str, element_size: u16) -> ArrayType {
        self.register_array_meta(TypeMeta {
            hash: TypeHash::of_name(name),
            size: element_size,
        })
    }

    /// Register an array type backed by a Rust element type.
    pub fn register_array_of<T: bytemuck::Pod>(&self, name: &str) -> ArrayType {
        let index = self.register_array(name, mem::size_of::<T>() as u16);
        self.by_rust_type
            .insert(StdTypeId::of::<T>(), DataType::Array(index));
        index
    }

    /// Register an array type from wire metadata. Used by deserialization.
    pub fn register_array_meta(&self, meta: TypeMeta) -> ArrayType {
        if let Some(existing) = self.by_hash.get(&meta.hash.raw()) {
            return match *existing {
                DataType::Array(index) => {
                    debug_assert_eq!(
                        self.array_size(index),
                        meta.size,
                        "array re-registered with a different element size"
                    );
                    index
                }
                other => panic!(
                    "type {:#x} is already registered as a {}, cannot register as array",
                    meta.hash.raw(),
                    other.kind()
                ),
            };
        }
        let mut arrays = self.arrays.write().unwrap();
        assert!(arrays.len() < 256, "array type namespace exhausted");
        let index = ArrayType(arrays.len() as u8);
        arrays.push(meta);
        self.by_hash.insert(meta.hash.raw(), DataType::Array(index));
        index
    }

    /// Register a tag type by name.
    ///
    /// # Panics
    /// - If the name is already registered in a different namespace.
    /// - If the tag namespace is exhausted (255 types; the highest bit is
    ///   reserved for the Disabled tag).
    pub fn register_tag(&self, name: &str) -> TagType {
        self.register_tag_hash(TypeHash::of_name(name))
    }

    /// Register a tag type from its wire identity. Used by deserialization.
    pub fn register_tag_hash(&self, hash: TypeHash) -> TagType {
        if let Some(existing) = self.by_hash.get(&hash.raw()) {
            return match *existing {
                DataType::Tag(index) => index,
                other => panic!(
                    "type {:#x} is already registered as a {}, cannot register as tag",
                    hash.raw(),
                    other.kind()
                ),
            };
        }
        let mut tags = self.tags.write().unwrap();
        assert!(
            tags.len() < TagType::DISABLED.index(),
            "tag type namespace exhausted"
        );
        let index = TagType(tags.len() as u8);
        tags.push(hash);
        self.by_hash.insert(hash.raw(), DataType::Tag(index));
        index
    }

    /// The byte size of one component value.
    #[inline]
    pub fn size(&self, component: ComponentType) -> u16 {
        self.components.read().unwrap()[component.index()].size
    }

    /// The byte size of one array element.
    #[inline]
    pub fn array_size(&self, array: ArrayType) -> u16 {
        self.arrays.read().unwrap()[array.index()].size
    }

    /// The stable identity of a component type.
    #[inline]
    pub fn component_hash(&self, component: ComponentType) -> TypeHash {
        self.components.read().unwrap()[component.index()].hash
    }

    /// The stable identity of an array type.
    #[inline]
    pub fn array_hash(&self, array: ArrayType) -> TypeHash {
        self.arrays.read().unwrap()[array.index()].hash
    }

    /// The stable identity of a tag type.
    #[inline]
    pub fn tag_hash(&self, tag: TagType) -> TypeHash {
        self.tags.read().unwrap()[tag.index()]
    }

    /// Resolve a stable hash to the local type, if registered.
    #[inline]
    pub fn type_by_hash(&self, hash: TypeHash) -> Option<DataType> {
        self.by_hash.get(&hash.raw()).map(|entry| *entry)
    }

    /// Resolve a bound Rust type to the local type, if registered.
    #[inline]
    pub fn type_of<T: 'static>(&self) -> Option<DataType> {
        self.by_rust_type
            .get(&StdTypeId::of::<T>())
            .map(|entry| *entry)
    }

    /// Resolve a bound Rust type to its component index.
    ///
    /// # Panics
    /// - If `T` was not registered as a component.
    pub fn component_of<T: 'static>(&self) -> ComponentType {
        match self.type_of::<T>() {
            Some(DataType::Component(index)) => index,
            _ => panic!(
                "{} is not registered as a component",
                std::any::type_name::<T>()
            ),
        }
    }

    /// Resolve a bound Rust type to its array index.
    ///
    /// # Panics
    /// - If `T` was not registered as an array element.
    pub fn array_of<T: 'static>(&self) -> ArrayType {
        match self.type_of::<T>() {
            Some(DataType::Array(index)) => index,
            _ => panic!(
                "{} is not registered as an array element",
                std::any::type_name::<T>()
            ),
        }
    }

    /// The number of registered component types.
    pub fn component_count(&self) -> usize {
        self.components.read().unwrap().len()
    }

    /// The number of registered array types.
    pub fn array_count(&self) -> usize {
        self.arrays.read().unwrap().len()
    }

    /// The number of registered tag types.
    pub fn tag_count(&self) -> usize {
        self.tags.read().unwrap().len()
    }

    /// Check whether two schemas assign identical metadata to every index of
    /// every namespace. Worlds can only exchange raw data when this holds.
    pub fn matches(&self, other: &Schema) -> bool {
        *self.components.read().unwrap() == *other.components.read().unwrap()
            && *self.arrays.read().unwrap() == *other.arrays.read().unwrap()
            && *self.tags.read().unwrap() == *other.tags.read().unwrap()
    }

    /// Write the registry to the wire (little-endian).
    pub fn save<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        let components = self.components.read().unwrap();
        out.write_u16::<LittleEndian>(components.len() as u16)?;
        for meta in components.iter() {
            out.write_i64::<LittleEndian>(meta.hash.raw())?;
            out.write_u16::<LittleEndian>(meta.size)?;
        }
        let arrays = self.arrays.read().unwrap();
        out.write_u16::<LittleEndian>(arrays.len() as u16)?;
        for meta in arrays.iter() {
            out.write_i64::<LittleEndian>(meta.hash.raw())?;
            out.write_u16::<LittleEndian>(meta.size)?;
        }
        let tags = self.tags.read().unwrap();
        out.write_u16::<LittleEndian>(tags.len() as u16)?;
        for hash in tags.iter() {
            out.write_i64::<LittleEndian>(hash.raw())?;
        }
        Ok(())
    }

    /// Read a registry from the wire, routing every type through `process`
    /// before registration.
    pub fn load<R: io::Read>(
        input: &mut R,
        mut process: impl FnMut(TypeMeta, DataKind) -> TypeMeta,
    ) -> io::Result<Self> {
        let schema = Self::new();
        let ncomp = input.read_u16::<LittleEndian>()?;
        for _ in 0..ncomp {
            let meta = TypeMeta {
                hash: TypeHash::from_raw(input.read_i64::<LittleEndian>()?),
                size: input.read_u16::<LittleEndian>()?,
            };
            schema.register_component_meta(process(meta, DataKind::Component));
        }
        let narr = input.read_u16::<LittleEndian>()?;
        for _ in 0..narr {
            let meta = TypeMeta {
                hash: TypeHash::from_raw(input.read_i64::<LittleEndian>()?),
                size: input.read_u16::<LittleEndian>()?,
            };
            schema.register_array_meta(process(meta, DataKind::Array));
        }
        let ntag = input.read_u16::<LittleEndian>()?;
        for _ in 0..ntag {
            let hash = TypeHash::from_raw(input.read_i64::<LittleEndian>()?);
            let meta = process(TypeMeta { hash, size: 0 }, DataKind::Tag);
            schema.register_tag_hash(meta.hash);
        }
        Ok(schema)
    }
}

impl Clone for Schema {
    fn clone(&self) -> Self {
        let clone = Self::new();
        for meta in self.components.read().unwrap().iter() {
            clone.register_component_meta(*meta);
        }
        for meta in self.arrays.read().unwrap().iter() {
            clone.register_array_meta(*meta);
        }
        for hash in self.tags.read().unwrap().iter() {
            clone.register_tag_hash(*hash);
        }
        for entry in self.by_rust_type.iter() {
            clone.by_rust_type.insert(*entry.key(), *entry.value());
        }
        clone
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("components", &self.component_count())
            .field("arrays", &self.array_count())
            .field("tags", &self.tag_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_register_components() {
        // Given
        let schema = Schema::new();

        // When
        let position = schema.register_component("position", 12);
        let velocity = schema.register_component("velocity", 12);

        // Then
        assert_eq!(position.index(), 0);
        assert_eq!(velocity.index(), 1);
        assert_eq!(schema.size(position), 12);
        assert_eq!(schema.component_count(), 2);

        // When - registering the same name again
        let again = schema.register_component("position", 12);

        // Then - the existing index comes back
        assert_eq!(again, position);
        assert_eq!(schema.component_count(), 2);
    }

    #[test]
    fn schema_namespaces_are_disjoint() {
        // Given
        let schema = Schema::new();

        // When
        let comp = schema.register_component("health", 4);
        let array = schema.register_array("waypoints", 8);
        let tag = schema.register_tag("boss");

        // Then - indices start at zero independently per namespace
        assert_eq!(comp.index(), 0);
        assert_eq!(array.index(), 0);
        assert_eq!(tag.index(), 0);
        assert_eq!(schema.array_size(array), 8);
    }

    #[test]
    #[should_panic(expected = "already registered as a component")]
    fn schema_kind_conflict_panics() {
        // Given
        let schema = Schema::new();
        schema.register_component("speed", 4);

        // When - same name in a different namespace
        schema.register_array("speed", 4);
    }

    #[test]
    fn schema_hash_resolution() {
        // Given
        let schema = Schema::new();
        let comp = schema.register_component("position", 12);
        let tag = schema.register_tag("static");

        // When / Then
        assert_eq!(
            schema.type_by_hash(TypeHash::of_name("position")),
            Some(DataType::Component(comp))
        );
        assert_eq!(
            schema.type_by_hash(TypeHash::of_name("static")),
            Some(DataType::Tag(tag))
        );
        assert_eq!(schema.type_by_hash(TypeHash::of_name("missing")), None);
    }

    #[test]
    fn schema_typed_binding() {
        // Given
        #[repr(C)]
        #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
        struct Health {
            value: i32,
        }

        let schema = Schema::new();

        // When
        let index = schema.register_component_of::<Health>("health");

        // Then
        assert_eq!(schema.component_of::<Health>(), index);
        assert_eq!(schema.size(index), 4);
    }

    #[test]
    #[should_panic(expected = "not registered as a component")]
    fn schema_unbound_type_panics() {
        // Given
        struct Unbound;
        let schema = Schema::new();

        // When
        schema.component_of::<Unbound>();
    }

    #[test]
    fn schema_disabled_tag_is_reserved() {
        // Given
        let schema = Schema::new();

        // When - registering a tag never hands out the reserved bit
        let tag = schema.register_tag("anything");

        // Then
        assert_ne!(tag, TagType::DISABLED);
        assert_eq!(TagType::DISABLED.bit(), 255);
    }

    #[test]
    fn schema_save_load_round_trip() {
        // Given
        let schema = Schema::new();
        schema.register_component("position", 12);
        schema.register_component("health", 4);
        schema.register_array("path", 8);
        schema.register_tag("boss");

        // When
        let mut bytes = Vec::new();
        schema.save(&mut bytes).unwrap();
        let loaded = Schema::load(&mut bytes.as_slice(), keep_meta).unwrap();

        // Then
        assert!(schema.matches(&loaded));
        assert_eq!(loaded.component_count(), 2);
        assert_eq!(loaded.array_count(), 1);
        assert_eq!(loaded.tag_count(), 1);
        assert_eq!(
            loaded.type_by_hash(TypeHash::of_name("health")),
            Some(DataType::Component(ComponentType::new(1)))
        );
    }

    #[test]
    fn schema_load_process_hook_rewrites_types() {
        // Given - a schema whose component should be renamed on import
        let schema = Schema::new();
        schema.register_component("legacy_position", 12);
        let mut bytes = Vec::new();
        schema.save(&mut bytes).unwrap();

        // When - the hook maps the foreign hash onto the local name
        let loaded = Schema::load(&mut bytes.as_slice(), |meta, kind| {
            assert_eq!(kind, DataKind::Component);
            if meta.hash == TypeHash::of_name("legacy_position") {
                TypeMeta {
                    hash: TypeHash::of_name("position"),
                    ..meta
                }
            } else {
                meta
            }
        })
        .unwrap();

        // Then
        assert!(
            loaded
                .type_by_hash(TypeHash::of_name("position"))
                .is_some()
        );
        assert!(
            loaded
                .type_by_hash(TypeHash::of_name("legacy_position"))
                .is_none()
        );
    }

    #[test]
    fn schema_clone_matches() {
        // Given
        let schema = Schema::new();
        schema.register_component("a", 4);
        schema.register_array("b", 2);
        schema.register_tag("c");

        // When
        let clone = schema.clone();

        // Then
        assert!(schema.matches(&clone));
    }
}
