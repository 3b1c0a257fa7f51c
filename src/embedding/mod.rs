//! Text vectorization
//!
//! Provides:
//! - Fixed tokenization shared by fitting, indexing and querying
//! - Sparse feature vectors and cosine similarity
//! - The fitted TF-IDF vectorizer used by the corpus index
//!
//! The [`Vectorizer`] trait is the seam for alternative feature mappings; any
//! deterministic, frequency-weighted implementation can back the index.

mod vectorizer;

pub use vectorizer::{TfIdfVectorizer, VocabularyState};

use serde::Serialize;

use crate::error::{ChimeraError, Result};
use crate::types::EngineConfig;

/// Trait for fit/transform feature mappings
pub trait Vectorizer: Send + Sync {
    /// Learn a vocabulary from the given corpus
    fn fit(&self, texts: &[&str]) -> VocabularyState;

    /// Map text into the feature space of `state`; unknown terms are ignored
    fn transform(&self, text: &str, state: &VocabularyState) -> SparseVector;

    /// Upper bound on vocabulary size and vector width
    fn max_features(&self) -> usize;

    /// Get model name
    fn model_name(&self) -> &str;
}

/// Tokenize text into lowercase alphanumeric terms of two or more characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() > 1)
        .map(String::from)
        .collect()
}

/// Sparse vector with entries sorted by feature index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SparseVector {
    dim: usize,
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    pub fn empty(dim: usize) -> Self {
        Self {
            dim,
            entries: Vec::new(),
        }
    }

    /// Build from unordered (index, value) pairs, dropping zeros and
    /// out-of-range indices
    pub fn from_unsorted(dim: usize, mut entries: Vec<(u32, f32)>) -> Self {
        entries.retain(|&(i, v)| (i as usize) < dim && v != 0.0);
        entries.sort_by_key(|&(i, _)| i);
        entries.dedup_by_key(|&mut (i, _)| i);
        Self { dim, entries }
    }

    /// Declared width (the vocabulary's max_features)
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of non-zero entries
    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn norm(&self) -> f32 {
        self.entries.iter().map(|(_, v)| v * v).sum::<f32>().sqrt()
    }

    /// L2 normalize; the zero vector stays zero
    pub fn normalized(mut self) -> Self {
        let norm = self.norm();
        if norm > 0.0 {
            for (_, v) in &mut self.entries {
                *v /= norm;
            }
        }
        self
    }

    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (mut i, mut j) = (0, 0);
        let mut sum = 0.0;
        while i < self.entries.len() && j < other.entries.len() {
            let (a_idx, a_val) = self.entries[i];
            let (b_idx, b_val) = other.entries[j];
            match a_idx.cmp(&b_idx) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    sum += a_val * b_val;
                    i += 1;
                    j += 1;
                }
            }
        }
        sum
    }
}

/// Cosine similarity; 0.0 when either side is empty or zero
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.dot(b) / (norm_a * norm_b)
}

/// Create a vectorizer from configuration
pub fn create_vectorizer(config: &EngineConfig) -> Result<Box<dyn Vectorizer>> {
    if config.max_features == 0 {
        return Err(ChimeraError::Config(
            "max_features must be positive".to_string(),
        ));
    }
    Ok(Box::new(TfIdfVectorizer::new(config.max_features)))
}
