//! Two independent vector spaces: one for text embeddings, one for image
//! embeddings. Each space has its own dimensions, backing files and encoder
//! model id; distances from different spaces are never comparable.

use std::fmt::Display;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::semantic::embeddings::model_id_hash;
use crate::semantic::index::{IndexError, SearchResult, VectorIndex};
use crate::semantic::storage::{VectorStorage, VectorStorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorSpace {
    Text,
    Image,
}

impl VectorSpace {
    pub const ALL: [VectorSpace; 2] = [VectorSpace::Text, VectorSpace::Image];

    /// File name prefix for the space's backing files.
    pub fn name(&self) -> &'static str {
        match self {
            VectorSpace::Text => "text",
            VectorSpace::Image => "image",
        }
    }
}

impl Display for VectorSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// What a space is expected to contain.
#[derive(Debug, Clone)]
pub struct SpaceSpec {
    pub dimensions: usize,
    /// Name of the encoder model that produces this space's vectors
    pub model: String,
}

struct Space {
    index: VectorIndex,
    storage: VectorStorage,
    model_id: [u8; 32],
}

impl Space {
    fn open(dir: &Path, space: VectorSpace, spec: &SpaceSpec) -> Result<Self, VectorStorageError> {
        let storage = VectorStorage::new(dir, space.name());
        let model_id = model_id_hash(&spec.model);

        let index = if storage.exists() {
            let index = storage.load(&model_id, spec.dimensions)?;
            log::info!("space={space} loaded {} vectors", index.len());
            index
        } else {
            if storage.is_partial() {
                log::warn!("space={space} has only one of its backing files, starting fresh");
            } else {
                log::info!("space={space} no existing index, starting fresh");
            }
            VectorIndex::new(spec.dimensions)
        };

        Ok(Self {
            index,
            storage,
            model_id,
        })
    }

    fn empty(dir: &Path, space: VectorSpace, spec: &SpaceSpec) -> Self {
        Self {
            index: VectorIndex::new(spec.dimensions),
            storage: VectorStorage::new(dir, space.name()),
            model_id: model_id_hash(&spec.model),
        }
    }
}

/// Vector counts per space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub text_vectors: usize,
    pub image_vectors: usize,
    /// Distinct item ids referenced by either space
    pub total_items: usize,
}

/// Owns the text and image spaces.
pub struct DualVectorStore {
    text: Space,
    image: Space,
}

impl DualVectorStore {
    /// Load both spaces from `dir`, creating empty ones where no files exist.
    ///
    /// Fails when a stored space disagrees with its spec (dimensions or model).
    pub fn open(dir: &Path, text: &SpaceSpec, image: &SpaceSpec) -> Result<Self, VectorStorageError> {
        std::fs::create_dir_all(dir)?;

        Ok(Self {
            text: Space::open(dir, VectorSpace::Text, text)?,
            image: Space::open(dir, VectorSpace::Image, image)?,
        })
    }

    /// Fresh empty spaces backed by `dir`, ignoring anything already on disk.
    /// The next `save()` overwrites the old files.
    pub fn empty(dir: &Path, text: &SpaceSpec, image: &SpaceSpec) -> Result<Self, VectorStorageError> {
        std::fs::create_dir_all(dir)?;

        Ok(Self {
            text: Space::empty(dir, VectorSpace::Text, text),
            image: Space::empty(dir, VectorSpace::Image, image),
        })
    }

    fn space(&self, space: VectorSpace) -> &Space {
        match space {
            VectorSpace::Text => &self.text,
            VectorSpace::Image => &self.image,
        }
    }

    fn space_mut(&mut self, space: VectorSpace) -> &mut Space {
        match space {
            VectorSpace::Text => &mut self.text,
            VectorSpace::Image => &mut self.image,
        }
    }

    pub fn dimensions(&self, space: VectorSpace) -> usize {
        self.space(space).index.dimensions()
    }

    pub fn len(&self, space: VectorSpace) -> usize {
        self.space(space).index.len()
    }

    pub fn add(&mut self, space: VectorSpace, vector: &[f32], item_id: u64) -> Result<usize, IndexError> {
        self.space_mut(space).index.add(vector, item_id)
    }

    pub fn search(
        &self,
        space: VectorSpace,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SearchResult>, IndexError> {
        self.space(space).index.search(query, k)
    }

    /// Persist one space.
    pub fn save_space(&self, space: VectorSpace) -> Result<(), VectorStorageError> {
        let space = self.space(space);
        space.storage.save(&space.index, &space.model_id)
    }

    /// Persist both spaces. Full rewrite, not an append.
    pub fn save(&self) -> Result<(), VectorStorageError> {
        for space in VectorSpace::ALL {
            self.save_space(space)?;
        }
        Ok(())
    }

    /// Empty both spaces in memory.
    pub fn clear(&mut self) {
        self.text.index.clear();
        self.image.index.clear();
    }

    pub fn stats(&self) -> IndexStats {
        let mut ids = self.text.index.item_ids();
        ids.extend(self.image.index.item_ids());

        IndexStats {
            text_vectors: self.text.index.len(),
            image_vectors: self.image.index.len(),
            total_items: ids.len(),
        }
    }
}
