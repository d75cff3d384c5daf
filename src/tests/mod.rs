//! Integration tests and shared test fixtures.
//!
//! The engine tests run against a deterministic bag-of-words embedder so
//! they need no model download; fastembed-backed tests live next to the
//! embeddings module and are `#[ignore]`d.

mod semantic;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::semantic::{Embedder, EmbeddingError};

pub(crate) const MOCK_DIMS: usize = 4096;

/// Deterministic embedder: hashed bag-of-words counts.
///
/// Texts sharing words land close in cosine distance, which is enough to
/// exercise ranking, thresholding and isolation without a real model.
/// Can be switched into a failing mode to simulate an unavailable embedder.
pub(crate) struct BagOfWordsEmbedder {
    dimensions: usize,
    failing: AtomicBool,
}

impl BagOfWordsEmbedder {
    pub fn new() -> Self {
        Self {
            dimensions: MOCK_DIMS,
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), EmbeddingError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(EmbeddingError::EmbeddingFailed("embedder offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn fnv1a(word: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in word.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let dim = (Self::fnv1a(word) % self.dimensions as u64) as usize;
            vector[dim] += 1.0;
        }
        vector
    }
}

impl Embedder for BagOfWordsEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id_hash(&self) -> [u8; 32] {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(format!("bag-of-words-{}", self.dimensions).as_bytes());
        hasher.finalize().into()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.check_available()?;
        Ok(self.vectorize(text))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.check_available()?;
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}
