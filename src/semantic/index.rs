//! Flat in-memory vector index with exact squared-L2 search.
//!
//! Vectors are stored row-major in a single contiguous buffer. Each row has a
//! dense, zero-based position assigned at insertion time; `id_map[position]`
//! holds the item id that row belongs to. Positions are never reused or
//! compacted: deleting an item elsewhere leaves its row here as a stale slot
//! until the index is rebuilt from scratch.

use std::collections::HashSet;

/// A single hit from [`VectorIndex::search`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    /// Slot the vector occupies in the index
    pub position: usize,
    /// Squared Euclidean distance to the query
    pub distance: f32,
    /// Item id the slot maps to
    pub item_id: u64,
}

/// Append-only exhaustive nearest-neighbor index.
pub struct VectorIndex {
    /// Row-major vector data, `len() * dimensions` floats
    data: Vec<f32>,
    /// Position -> item id
    id_map: Vec<u64>,
    /// Expected vector dimensions
    dimensions: usize,
}

impl VectorIndex {
    /// Create a new empty vector index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            data: Vec::new(),
            id_map: Vec::new(),
            dimensions,
        }
    }

    /// Rebuild an index from raw parts read off disk.
    pub(crate) fn from_parts(
        dimensions: usize,
        data: Vec<f32>,
        id_map: Vec<u64>,
    ) -> Result<Self, IndexError> {
        if data.len() != id_map.len() * dimensions {
            return Err(IndexError::InvalidDimension {
                expected: id_map.len() * dimensions,
                got: data.len(),
            });
        }

        Ok(Self {
            data,
            id_map,
            dimensions,
        })
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of occupied slots, stale ones included.
    pub fn len(&self) -> usize {
        self.id_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_map.is_empty()
    }

    /// Raw row-major vector buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Position -> item id map.
    pub fn id_map(&self) -> &[u64] {
        &self.id_map
    }

    /// Distinct item ids referenced by any slot.
    pub fn item_ids(&self) -> HashSet<u64> {
        self.id_map.iter().copied().collect()
    }

    /// Vector stored at `position`, if any.
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        if position >= self.len() {
            return None;
        }
        let start = position * self.dimensions;
        Some(&self.data[start..start + self.dimensions])
    }

    /// Append one vector for `item_id` and return its position.
    pub fn add(&mut self, vector: &[f32], item_id: u64) -> Result<usize, IndexError> {
        self.check_dimensions(vector.len())?;

        let position = self.id_map.len();
        self.data.extend_from_slice(vector);
        self.id_map.push(item_id);

        Ok(position)
    }

    /// Append a row-major batch of vectors, one per id.
    ///
    /// Nothing is appended when the batch is malformed.
    pub fn add_batch(&mut self, rows: &[f32], item_ids: &[u64]) -> Result<(), IndexError> {
        if rows.len() != item_ids.len() * self.dimensions {
            return Err(IndexError::InvalidDimension {
                expected: item_ids.len() * self.dimensions,
                got: rows.len(),
            });
        }

        self.data.extend_from_slice(rows);
        self.id_map.extend_from_slice(item_ids);
        Ok(())
    }

    /// Return up to `k` nearest slots ordered by ascending squared distance.
    ///
    /// Ties are broken by position so results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>, IndexError> {
        self.check_dimensions(query.len())?;

        if k == 0 || self.is_empty() {
            return Ok(vec![]);
        }

        let mut results: Vec<SearchResult> = self
            .data
            .chunks_exact(self.dimensions)
            .zip(self.id_map.iter())
            .enumerate()
            .map(|(position, (row, &item_id))| SearchResult {
                position,
                distance: squared_l2(query, row),
                item_id,
            })
            .collect();

        results.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });
        results.truncate(k);

        Ok(results)
    }

    /// Drop every slot. Only used when rebuilding from the record store.
    pub fn clear(&mut self) {
        self.data.clear();
        self.id_map.clear();
    }

    fn check_dimensions(&self, got: usize) -> Result<(), IndexError> {
        if got != self.dimensions {
            return Err(IndexError::InvalidDimension {
                expected: self.dimensions,
                got,
            });
        }
        Ok(())
    }
}

/// Squared Euclidean distance between two equal-length vectors.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Invalid dimension: expected {expected}, got {got}")]
    InvalidDimension { expected: usize, got: usize },
}
