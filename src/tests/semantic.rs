//! Engine-level tests for the semantic index service, using the
//! deterministic bag-of-words embedder.

use std::path::Path;
use std::sync::Arc;

use crate::config::SemanticIndexConfig;
use crate::semantic::{SemanticIndexError, SemanticIndexService};
use crate::tests::BagOfWordsEmbedder;

const ML: &str =
    "Machine learning models are trained on large datasets to recognize patterns.";
const GARDENING: &str =
    "Tomato seedlings need regular watering and plenty of direct sunlight to thrive.";
const MEETING: &str =
    "The quarterly budget review meeting is scheduled for Friday afternoon.";

fn service(base_path: &Path) -> SemanticIndexService {
    service_with(base_path, Arc::new(BagOfWordsEmbedder::new()))
}

fn service_with(base_path: &Path, embedder: Arc<BagOfWordsEmbedder>) -> SemanticIndexService {
    SemanticIndexService::with_embedder(
        SemanticIndexConfig::default(),
        base_path.to_path_buf(),
        embedder,
    )
}

#[test]
fn test_reindex_replaces_never_accumulates() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    let three_paragraphs = format!("{ML}\n\n{GARDENING}\n\n{MEETING}");
    assert_eq!(service.reindex_note(1, 7, &three_paragraphs).unwrap(), 3);
    assert_eq!(service.indexed_chunks(), 3);

    // reindexing with one paragraph leaves exactly one chunk, not four
    assert_eq!(service.reindex_note(1, 7, ML).unwrap(), 1);
    assert_eq!(service.indexed_chunks(), 1);
}

#[test]
fn test_empty_text_leaves_zero_chunks_idempotently() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    assert_eq!(service.reindex_note(1, 7, "").unwrap(), 0);
    assert_eq!(service.reindex_note(1, 7, "   \n\n \t ").unwrap(), 0);
    assert_eq!(service.indexed_chunks(), 0);

    // existing chunks are removed when the text empties out
    assert_eq!(service.reindex_note(1, 7, ML).unwrap(), 1);
    assert_eq!(service.reindex_note(1, 7, "").unwrap(), 0);
    assert_eq!(service.indexed_chunks(), 0);
}

#[test]
fn test_text_below_cutoff_yields_zero_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    assert_eq!(service.reindex_note(1, 7, "short note\n\nalso short").unwrap(), 0);
    assert_eq!(service.indexed_chunks(), 0);
}

#[test]
fn test_user_isolation() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    // near-identical content for two different users
    service.reindex_note(1, 1, MEETING).unwrap();
    service.reindex_note(2, 2, MEETING).unwrap();

    let query = "when is the quarterly budget review meeting";

    let hits = service.search(1, query, None, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].note_id, 1);

    let hits = service.search(2, query, None, None).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].note_id, 2);

    // a user with no notes sees nothing
    assert!(service.search(3, query, None, None).unwrap().is_empty());
}

#[test]
fn test_dedup_collapses_to_best_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    let first = "Boil the spaghetti pasta in salted water for nine minutes until al dente.";
    let second = "Taste the spaghetti pasta before draining the salted water from the pot.";
    service
        .reindex_note(3, 7, &format!("{first}\n\n{second}"))
        .unwrap();

    // both chunks match the query, but the result carries one entry for the
    // note, with the closer chunk as its snippet
    let hits = service
        .search(7, "boil the spaghetti pasta in salted water", None, None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].note_id, 3);
    assert_eq!(hits[0].snippet, first);
    assert!(hits[0].relevance > 0.7);
}

#[test]
fn test_threshold_filters_weak_matches() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    service.reindex_note(1, 7, ML).unwrap();
    service.reindex_note(2, 7, GARDENING).unwrap();

    // the gardening note shares no words with the query; it falls beyond
    // the 0.5 distance cutoff even though top-N would have room for it
    let hits = service
        .search(7, "how are machine learning models trained", None, None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].note_id, 1);

    // widening the cutoff to 1.0 lets weak matches through
    let hits = service
        .search(7, "how are machine learning models trained", None, Some(1.0))
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].note_id, 1);
}

#[test]
fn test_results_ranked_by_relevance() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    service.reindex_note(1, 7, ML).unwrap();
    service
        .reindex_note(2, 7, "Neural network models are trained on huge labeled datasets.")
        .unwrap();

    let hits = service
        .search(7, "how are machine learning models trained on datasets", None, None)
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].note_id, 1);
    assert_eq!(hits[1].note_id, 2);
    assert!(hits[0].relevance > hits[1].relevance);
}

#[test]
fn test_end_to_end_eiffel_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    let text = "Paris is the capital of France.\n\nThe Eiffel Tower was completed in 1889 and is 330 meters tall.";
    service.reindex_note(42, 7, text).unwrap();

    let hits = service
        .search(7, "How tall is the Eiffel Tower?", None, None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].note_id, 42);
    assert_eq!(
        hits[0].snippet,
        "The Eiffel Tower was completed in 1889 and is 330 meters tall."
    );
    assert!(hits[0].relevance > 0.5);

    // a different user never sees it
    assert!(service
        .search(8, "How tall is the Eiffel Tower?", None, None)
        .unwrap()
        .is_empty());
}

#[test]
fn test_remove_note_drops_it_from_search() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    let text = "The Eiffel Tower was completed in 1889 and is 330 meters tall.";
    service.reindex_note(42, 7, text).unwrap();
    assert_eq!(
        service
            .search(7, "How tall is the Eiffel Tower?", None, None)
            .unwrap()
            .len(),
        1
    );

    assert_eq!(service.remove_note(42).unwrap(), 1);
    assert!(service
        .search(7, "How tall is the Eiffel Tower?", None, None)
        .unwrap()
        .is_empty());

    // removing again is a no-op
    assert_eq!(service.remove_note(42).unwrap(), 0);
}

#[test]
fn test_empty_query_returns_empty_without_embedding() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(BagOfWordsEmbedder::new());
    let service = service_with(dir.path(), embedder.clone());

    service.reindex_note(1, 7, MEETING).unwrap();

    // a failing embedder proves the query path never embeds empty input
    embedder.set_failing(true);
    assert!(service.search(7, "", None, None).unwrap().is_empty());
    assert!(service.search(7, "   \n ", None, None).unwrap().is_empty());
}

#[test]
fn test_index_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let service = service(dir.path());
        service.reindex_note(5, 2, MEETING).unwrap();
    }

    // a fresh service instance loads vectors.bin from disk
    let service = service(dir.path());
    let hits = service
        .search(2, "when is the quarterly budget review meeting", None, None)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].note_id, 5);
}

#[test]
fn test_failed_reindex_leaves_note_unindexed() {
    let dir = tempfile::tempdir().unwrap();
    let embedder = Arc::new(BagOfWordsEmbedder::new());
    let service = service_with(dir.path(), embedder.clone());

    service.reindex_note(5, 2, MEETING).unwrap();

    embedder.set_failing(true);
    let result = service.reindex_note(5, 2, ML);
    assert!(matches!(result, Err(SemanticIndexError::Embedding(_))));

    // stale chunks were dropped before embedding, so the note is simply
    // unsearchable until the next successful reindex
    embedder.set_failing(false);
    assert_eq!(service.indexed_chunks(), 0);
    assert!(service
        .search(2, "when is the quarterly budget review meeting", None, None)
        .unwrap()
        .is_empty());

    service.reindex_note(5, 2, MEETING).unwrap();
    assert_eq!(
        service
            .search(2, "when is the quarterly budget review meeting", None, None)
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn test_clear_empties_the_index() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(dir.path());

    service.reindex_note(1, 7, ML).unwrap();
    service.reindex_note(2, 7, MEETING).unwrap();
    assert_eq!(service.indexed_chunks(), 2);

    service.clear().unwrap();
    assert_eq!(service.indexed_chunks(), 0);
    assert!(service
        .search(7, "how are machine learning models trained", None, None)
        .unwrap()
        .is_empty());
}
