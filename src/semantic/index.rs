//! In-memory chunk index with owner-filtered cosine-distance search.
//!
//! Stores one embedding per note paragraph, keyed by (note, sequence).
//! The whole table lives in memory; persistence is handled by
//! `semantic::storage`.

use std::collections::HashMap;
use std::fmt;

/// Identity of a chunk: its parent note and 0-based paragraph position.
///
/// Rendered as `"{note_id}_{seq}"` in the storage layer and in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId {
    pub note_id: u64,
    pub seq: u32,
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.note_id, self.seq)
    }
}

/// A stored chunk: embedding plus the metadata every query needs.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub note_id: u64,
    /// 0-based position of the chunk within its note's chunking pass
    pub seq: u32,
    /// Owner of the parent note; mandatory filter on every query
    pub user_id: u64,
    /// Raw paragraph text, returned as the snippet
    pub text: String,
    pub embedding: Vec<f32>,
}

impl ChunkRecord {
    pub fn id(&self) -> ChunkId {
        ChunkId {
            note_id: self.note_id,
            seq: self.seq,
        }
    }
}

/// A raw nearest-chunk result, before note collapsing.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub note_id: u64,
    pub seq: u32,
    pub text: String,
    /// Cosine distance to the query (lower is closer)
    pub distance: f32,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

/// In-memory chunk index.
pub struct ChunkIndex {
    entries: HashMap<ChunkId, ChunkRecord>,
    /// Expected embedding dimensions
    dimensions: usize,
}

impl ChunkIndex {
    /// Create a new empty index with specified dimensions.
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: HashMap::new(),
            dimensions,
        }
    }

    /// Create an index with pre-allocated capacity.
    pub fn with_capacity(dimensions: usize, capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            dimensions,
        }
    }

    /// Get the expected embedding dimensions.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Total number of stored chunks, across all notes and users.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace a single chunk.
    ///
    /// Returns an error on dimension mismatch or a zero-norm embedding.
    pub fn insert(&mut self, record: ChunkRecord) -> Result<(), IndexError> {
        Self::validate(&record.embedding, self.dimensions)?;
        self.entries.insert(record.id(), record);
        Ok(())
    }

    /// Insert a batch of chunks, validating every embedding up front.
    ///
    /// Validation happens before any insert, so a bad vector cannot leave a
    /// partial chunk set behind.
    pub fn upsert_chunks(&mut self, records: Vec<ChunkRecord>) -> Result<(), IndexError> {
        for record in &records {
            Self::validate(&record.embedding, self.dimensions)?;
        }
        for record in records {
            self.entries.insert(record.id(), record);
        }
        Ok(())
    }

    /// Remove every chunk belonging to `note_id`. Returns the number removed.
    ///
    /// Removing a note with no stored chunks is a no-op.
    pub fn delete_note(&mut self, note_id: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, _| id.note_id != note_id);
        before - self.entries.len()
    }

    /// Chunk ids currently stored for a note, ordered by sequence.
    pub fn note_chunks(&self, note_id: u64) -> Vec<ChunkId> {
        let mut ids: Vec<ChunkId> = self
            .entries
            .keys()
            .filter(|id| id.note_id == note_id)
            .copied()
            .collect();
        ids.sort_by_key(|id| id.seq);
        ids
    }

    /// Find the `top_n` chunks closest to `query`, owned by `owner_user_id`.
    ///
    /// The owner filter is applied before ranking; chunks of other users
    /// never appear in the result no matter how close their vectors are.
    /// Results are sorted by cosine distance ascending.
    pub fn query(
        &self,
        query: &[f32],
        owner_user_id: u64,
        top_n: usize,
    ) -> Result<Vec<ChunkHit>, IndexError> {
        Self::validate(query, self.dimensions)?;
        let query_norm = Self::l2_norm(query);

        let mut hits: Vec<ChunkHit> = self
            .entries
            .values()
            .filter(|record| record.user_id == owner_user_id)
            .map(|record| ChunkHit {
                note_id: record.note_id,
                seq: record.seq,
                text: record.text.clone(),
                distance: Self::cosine_distance(query, &record.embedding, query_norm),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_n);

        Ok(hits)
    }

    /// Iterate over all stored chunks.
    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.entries.values()
    }

    /// Clear all entries from the index.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn validate(embedding: &[f32], dimensions: usize) -> Result<(), IndexError> {
        if embedding.len() != dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: dimensions,
                got: embedding.len(),
            });
        }
        if Self::l2_norm(embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }
        Ok(())
    }

    /// Compute L2 norm of a vector.
    fn l2_norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    /// Cosine distance between query and target; query_norm is precomputed.
    fn cosine_distance(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
        let target_norm = Self::l2_norm(target);
        if target_norm < f32::EPSILON {
            return 1.0;
        }

        let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
        1.0 - dot_product / (query_norm * target_norm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(note_id: u64, seq: u32, user_id: u64, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            note_id,
            seq,
            user_id,
            text: format!("chunk {note_id}_{seq}"),
            embedding,
        }
    }

    #[test]
    fn test_new_index() {
        let index = ChunkIndex::new(384);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_chunk_id_display() {
        let id = ChunkId { note_id: 42, seq: 3 };
        assert_eq!(id.to_string(), "42_3");
    }

    #[test]
    fn test_insert_dimension_mismatch() {
        let mut index = ChunkIndex::new(3);
        let result = index.insert(record(1, 0, 7, vec![1.0, 0.0, 0.0, 0.0]));
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_insert_zero_norm_rejected() {
        let mut index = ChunkIndex::new(3);
        let result = index.insert(record(1, 0, 7, vec![0.0, 0.0, 0.0]));
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_upsert_validates_before_inserting() {
        let mut index = ChunkIndex::new(3);
        let result = index.upsert_chunks(vec![
            record(1, 0, 7, vec![1.0, 0.0, 0.0]),
            record(1, 1, 7, vec![0.0, 0.0, 0.0]),
        ]);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
        // nothing from the failed batch landed
        assert!(index.is_empty());
    }

    #[test]
    fn test_delete_note_removes_all_sequences() {
        let mut index = ChunkIndex::new(3);
        index
            .upsert_chunks(vec![
                record(1, 0, 7, vec![1.0, 0.0, 0.0]),
                record(1, 1, 7, vec![0.0, 1.0, 0.0]),
                record(2, 0, 7, vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();

        assert_eq!(index.delete_note(1), 2);
        assert_eq!(index.len(), 1);
        assert!(index.note_chunks(1).is_empty());
        assert_eq!(index.note_chunks(2).len(), 1);

        // deleting again is a no-op
        assert_eq!(index.delete_note(1), 0);
    }

    #[test]
    fn test_note_chunks_ordered_by_seq() {
        let mut index = ChunkIndex::new(3);
        index
            .upsert_chunks(vec![
                record(5, 2, 7, vec![1.0, 0.0, 0.0]),
                record(5, 0, 7, vec![0.0, 1.0, 0.0]),
                record(5, 1, 7, vec![0.0, 0.0, 1.0]),
            ])
            .unwrap();

        let seqs: Vec<u32> = index.note_chunks(5).iter().map(|id| id.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_query_ranks_by_distance() {
        let mut index = ChunkIndex::new(3);
        index
            .upsert_chunks(vec![
                record(1, 0, 7, vec![1.0, 0.0, 0.0]),
                record(2, 0, 7, vec![0.0, 1.0, 0.0]),
            ])
            .unwrap();

        let hits = index.query(&[1.0, 0.1, 0.0], 7, 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].note_id, 1);
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn test_query_owner_filter_is_mandatory() {
        let mut index = ChunkIndex::new(3);
        index
            .upsert_chunks(vec![
                record(1, 0, 7, vec![1.0, 0.0, 0.0]),
                record(2, 0, 8, vec![1.0, 0.0, 0.0]),
            ])
            .unwrap();

        // identical vectors, but user 7 only ever sees their own chunk
        let hits = index.query(&[1.0, 0.0, 0.0], 7, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_id, 1);

        let hits = index.query(&[1.0, 0.0, 0.0], 9, 10).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_query_truncates_to_top_n() {
        let mut index = ChunkIndex::new(3);
        for i in 0..10 {
            index
                .insert(record(i, 0, 7, vec![1.0, i as f32 * 0.1, 0.0]))
                .unwrap();
        }

        let hits = index.query(&[1.0, 0.0, 0.0], 7, 3).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_query_zero_norm_rejected() {
        let index = ChunkIndex::new(3);
        let result = index.query(&[0.0, 0.0, 0.0], 7, 10);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_insert_replaces_same_chunk_id() {
        let mut index = ChunkIndex::new(3);
        index.insert(record(1, 0, 7, vec![1.0, 0.0, 0.0])).unwrap();
        index.insert(record(1, 0, 7, vec![0.0, 1.0, 0.0])).unwrap();

        assert_eq!(index.len(), 1);
        let hits = index.query(&[0.0, 1.0, 0.0], 7, 1).unwrap();
        assert!(hits[0].distance < 0.01);
    }
}
