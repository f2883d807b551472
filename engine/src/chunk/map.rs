//! The definition-to-chunk map.

use std::collections::HashMap;

use crate::{
    chunk::{Chunk, Definition, Id},
    schema::Schema,
};

/// Canonical mapping from [`Definition`] to [`Chunk`].
///
/// Chunks are created lazily on first demand for a definition and live until
/// the world is torn down. The empty-composition chunk is created eagerly so
/// every world has a default home for bare entities.
#[derive(Debug, Clone)]
pub struct Map {
    /// The chunks, indexed by their id.
    chunks: Vec<Chunk>,

    /// The chunk ids indexed by their definition.
    by_definition: HashMap<Definition, Id>,
}

impl Map {
    /// Create a map holding only the default (empty-composition) chunk.
    pub fn new(schema: &Schema) -> Self {
        let mut map = Self {
            chunks: Vec::new(),
            by_definition: HashMap::new(),
        };
        map.get_or_create(Definition::EMPTY, schema);
        map
    }

    /// The id of the default (empty-composition) chunk.
    #[inline]
    pub fn default_id(&self) -> Id {
        Id::new(0)
    }

    /// Get the canonical chunk for a definition, creating it on demand with
    /// a row layout derived from the schema.
    pub fn get_or_create(&mut self, definition: Definition, schema: &Schema) -> Id {
        if let Some(id) = self.by_definition.get(&definition) {
            return *id;
        }
        let id = Id::new(self.chunks.len() as u32);
        self.by_definition.insert(definition, id);
        self.chunks.push(Chunk::new(id, definition, schema));
        id
    }

    /// Look up the chunk for a definition, if one exists.
    #[inline]
    pub fn find(&self, definition: &Definition) -> Option<Id> {
        self.by_definition.get(definition).copied()
    }

    /// Get an existing chunk by id.
    ///
    /// # Panics
    /// - if the id is out of bounds
    #[inline]
    pub fn get(&self, id: Id) -> &Chunk {
        assert!(id.index() < self.chunks.len(), "chunk id out of bounds");
        &self.chunks[id.index()]
    }

    /// Get an existing mutable chunk by id.
    ///
    /// # Panics
    /// - if the id is out of bounds
    #[inline]
    pub fn get_mut(&mut self, id: Id) -> &mut Chunk {
        assert!(id.index() < self.chunks.len(), "chunk id out of bounds");
        &mut self.chunks[id.index()]
    }

    /// Get mutable references to two distinct chunks at once. Used by entity
    /// migration to copy row bytes between the source and destination.
    ///
    /// # Panics
    /// - if the ids are equal or out of bounds
    pub fn pair_mut(&mut self, a: Id, b: Id) -> (&mut Chunk, &mut Chunk) {
        assert_ne!(a, b, "cannot split-borrow the same chunk");
        assert!(
            a.index() < self.chunks.len() && b.index() < self.chunks.len(),
            "chunk id out of bounds"
        );
        if a.index() < b.index() {
            let (head, tail) = self.chunks.split_at_mut(b.index());
            (&mut head[a.index()], &mut tail[0])
        } else {
            let (head, tail) = self.chunks.split_at_mut(a.index());
            let chunk_a = &mut tail[0];
            (chunk_a, &mut head[b.index()])
        }
    }

    /// Iterate over all chunks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter()
    }

    /// The number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunk exists. Never true: the default chunk always does.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}
