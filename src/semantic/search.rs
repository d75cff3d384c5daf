//! Search-result assembly: threshold filtering, per-note collapsing, ranking.
//!
//! The index returns raw chunk hits; several chunks of one note can land in
//! the same top-N. Callers want notes, so the hits are collapsed to the best
//! chunk per note before ranking.

use std::collections::HashMap;

use crate::semantic::index::ChunkHit;

/// A ranked search result for one note.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub note_id: u64,
    /// Text of the best-matching chunk
    pub snippet: String,
    /// `1 - cosine_distance`; higher is better
    pub relevance: f32,
}

/// Collapse raw chunk hits into ranked per-note results.
///
/// Hits at or beyond `distance_threshold` are dropped. When several chunks
/// share a note, the one with the lowest distance wins; on an exact tie the
/// earlier hit in index order is kept. The final order is relevance
/// descending, with index order preserved between equal scores.
pub(crate) fn assemble_hits(raw: Vec<ChunkHit>, distance_threshold: f32) -> Vec<SearchHit> {
    let mut order: Vec<u64> = Vec::new();
    let mut best: HashMap<u64, SearchHit> = HashMap::new();

    for hit in raw {
        if hit.distance >= distance_threshold {
            continue;
        }
        let relevance = 1.0 - hit.distance;
        match best.get_mut(&hit.note_id) {
            Some(existing) if existing.relevance >= relevance => {}
            Some(existing) => {
                existing.relevance = relevance;
                existing.snippet = hit.text;
            }
            None => {
                order.push(hit.note_id);
                best.insert(
                    hit.note_id,
                    SearchHit {
                        note_id: hit.note_id,
                        snippet: hit.text,
                        relevance,
                    },
                );
            }
        }
    }

    let mut hits: Vec<SearchHit> = order
        .into_iter()
        .filter_map(|note_id| best.remove(&note_id))
        .collect();

    // stable sort: ties keep the index store's order
    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(note_id: u64, seq: u32, distance: f32) -> ChunkHit {
        ChunkHit {
            note_id,
            seq,
            text: format!("chunk {note_id}_{seq}"),
            distance,
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(assemble_hits(vec![], 0.5).is_empty());
    }

    #[test]
    fn test_threshold_is_exclusive_at_boundary() {
        let hits = assemble_hits(vec![hit(1, 0, 0.5), hit(2, 0, 0.49)], 0.5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].note_id, 2);
    }

    #[test]
    fn test_relevance_is_one_minus_distance() {
        let hits = assemble_hits(vec![hit(1, 0, 0.2)], 0.5);
        assert!((hits[0].relevance - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_collapses_to_best_chunk_per_note() {
        let hits = assemble_hits(
            vec![hit(1, 0, 0.3), hit(1, 1, 0.1), hit(2, 0, 0.2)],
            0.5,
        );

        assert_eq!(hits.len(), 2);
        // note 1's best chunk (seq 1, distance 0.1) wins overall
        assert_eq!(hits[0].note_id, 1);
        assert_eq!(hits[0].snippet, "chunk 1_1");
        assert!((hits[0].relevance - 0.9).abs() < f32::EPSILON);
        assert_eq!(hits[1].note_id, 2);
    }

    #[test]
    fn test_collapse_tie_keeps_earlier_chunk() {
        let hits = assemble_hits(vec![hit(1, 0, 0.2), hit(1, 1, 0.2)], 0.5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet, "chunk 1_0");
    }

    #[test]
    fn test_equal_relevance_preserves_store_order() {
        let hits = assemble_hits(vec![hit(3, 0, 0.2), hit(1, 0, 0.2), hit(2, 0, 0.2)], 0.5);
        let ids: Vec<u64> = hits.iter().map(|h| h.note_id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn test_sorted_by_relevance_descending() {
        let hits = assemble_hits(vec![hit(1, 0, 0.4), hit(2, 0, 0.1), hit(3, 0, 0.3)], 0.5);
        let ids: Vec<u64> = hits.iter().map(|h| h.note_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
