//! Fitted TF-IDF vectorizer over a bounded vocabulary
//!
//! Unlike a hashing embedder, the feature space here is learned: `fit` picks
//! the most frequent terms of the corpus and records their inverse document
//! frequency, and `transform` only ever looks terms up. The fitted
//! [`VocabularyState`] is immutable and replaced wholesale on refit.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{tokenize, SparseVector, Vectorizer};

/// A fitted vocabulary: term -> feature index plus per-feature IDF
#[derive(Debug, Clone, Serialize)]
pub struct VocabularyState {
    /// Feature names, ordered by feature index
    features: Vec<String>,
    /// Reverse lookup, term -> feature index
    #[serde(skip)]
    lookup: HashMap<String, u32>,
    /// Smoothed inverse document frequency per feature
    idf: Vec<f32>,
    /// Vector width for every transform under this vocabulary
    max_features: usize,
    /// Number of documents seen at fit time
    document_count: usize,
    fitted_at: DateTime<Utc>,
    generation: u64,
}

impl VocabularyState {
    fn new(features: Vec<String>, idf: Vec<f32>, max_features: usize, document_count: usize) -> Self {
        let lookup = features
            .iter()
            .enumerate()
            .map(|(i, term)| (term.clone(), i as u32))
            .collect();
        Self {
            features,
            lookup,
            idf,
            max_features,
            document_count,
            fitted_at: Utc::now(),
            generation: 0,
        }
    }

    /// Stamp the generation this vocabulary belongs to
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn fitted_at(&self) -> DateTime<Utc> {
        self.fitted_at
    }

    pub fn max_features(&self) -> usize {
        self.max_features
    }

    pub fn document_count(&self) -> usize {
        self.document_count
    }

    /// Number of terms actually selected (<= max_features)
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature_index(&self, term: &str) -> Option<u32> {
        self.lookup.get(term).copied()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.features
    }

    pub fn idf(&self, index: u32) -> f32 {
        self.idf.get(index as usize).copied().unwrap_or(0.0)
    }

    /// Same terms and weights, ignoring timestamps and generation
    pub fn same_features(&self, other: &VocabularyState) -> bool {
        self.max_features == other.max_features
            && self.features == other.features
            && self.idf == other.idf
    }
}

/// TF-IDF vectorizer with a `max_features` bound
#[derive(Debug, Clone)]
pub struct TfIdfVectorizer {
    max_features: usize,
}

impl TfIdfVectorizer {
    pub fn new(max_features: usize) -> Self {
        Self { max_features }
    }
}

impl Vectorizer for TfIdfVectorizer {
    fn fit(&self, texts: &[&str]) -> VocabularyState {
        let mut term_counts: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for text in texts {
            let mut seen: HashSet<&str> = HashSet::new();
            let tokens = tokenize(text);
            for token in &tokens {
                *term_counts.entry(token.clone()).or_insert(0) += 1;
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        // Most frequent first; equal counts fall back to lexicographic order so
        // the cut at max_features never depends on hash iteration order.
        let mut ranked: Vec<(String, usize)> = term_counts.into_iter().collect();
        ranked.sort_by(|(a_term, a_count), (b_term, b_count)| {
            b_count.cmp(a_count).then_with(|| a_term.cmp(b_term))
        });
        ranked.truncate(self.max_features);

        let mut features: Vec<String> = ranked.into_iter().map(|(term, _)| term).collect();
        features.sort();

        let n = texts.len() as f32;
        let idf = features
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f32;
                ((1.0 + n) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        VocabularyState::new(features, idf, self.max_features, texts.len())
    }

    fn transform(&self, text: &str, state: &VocabularyState) -> SparseVector {
        if state.is_empty() {
            return SparseVector::empty(state.max_features());
        }

        let mut counts: HashMap<u32, f32> = HashMap::new();
        for token in tokenize(text) {
            if let Some(index) = state.feature_index(&token) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let weighted = counts
            .into_iter()
            .map(|(index, tf)| (index, tf * state.idf(index)))
            .collect();

        SparseVector::from_unsorted(state.max_features(), weighted).normalized()
    }

    fn max_features(&self) -> usize {
        self.max_features
    }

    fn model_name(&self) -> &str {
        "tfidf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    fn corpus() -> Vec<&'static str> {
        vec![
            "I prefer dark mode",
            "Team uses UTC",
            "Lunch is at noon",
        ]
    }

    #[test]
    fn test_fit_basic() {
        let vectorizer = TfIdfVectorizer::new(50);
        let state = vectorizer.fit(&corpus());

        // "i" is dropped (too short); everything else fits under 50
        assert_eq!(state.len(), 10);
        assert_eq!(state.max_features(), 50);
        assert_eq!(state.document_count(), 3);
        assert!(state.feature_index("dark").is_some());
        assert!(state.feature_index("i").is_none());
    }

    #[test]
    fn test_fit_respects_max_features_with_lexicographic_ties() {
        let vectorizer = TfIdfVectorizer::new(2);
        let state = vectorizer.fit(&["gamma beta alpha", "delta"]);

        // all terms tie at frequency 1: alpha and beta win
        assert_eq!(state.feature_names(), &["alpha".to_string(), "beta".to_string()]);
    }

    #[test]
    fn test_fit_prefers_frequent_terms() {
        let vectorizer = TfIdfVectorizer::new(1);
        let state = vectorizer.fit(&["zulu zulu", "alpha", "zulu"]);
        assert_eq!(state.feature_names(), &["zulu".to_string()]);
    }

    #[test]
    fn test_fit_is_order_independent() {
        let vectorizer = TfIdfVectorizer::new(4);
        let mut texts = corpus();
        let a = vectorizer.fit(&texts);
        texts.reverse();
        let b = vectorizer.fit(&texts);
        assert!(a.same_features(&b));
    }

    #[test]
    fn test_transform_ignores_unknown_terms() {
        let vectorizer = TfIdfVectorizer::new(50);
        let state = vectorizer.fit(&corpus());

        let v = vectorizer.transform("quantum thermodynamics", &state);
        assert!(v.is_empty());
        assert_eq!(v.dim(), 50);

        let v = vectorizer.transform("dark quantum", &state);
        assert_eq!(v.nnz(), 1);
    }

    #[test]
    fn test_transform_normalized() {
        let vectorizer = TfIdfVectorizer::new(50);
        let state = vectorizer.fit(&corpus());
        let v = vectorizer.transform("prefer dark mode at noon", &state);
        assert!((v.norm() - 1.0).abs() < 1e-5, "vector should be L2 normalized");
    }

    #[test]
    fn test_similarity_ranks_overlap() {
        let vectorizer = TfIdfVectorizer::new(50);
        let state = vectorizer.fit(&corpus());

        let query = vectorizer.transform("dark mode", &state);
        let dark = vectorizer.transform(corpus()[0], &state);
        let utc = vectorizer.transform(corpus()[1], &state);

        assert!(cosine_similarity(&query, &dark) > 0.0);
        assert_eq!(cosine_similarity(&query, &utc), 0.0);
    }

    #[test]
    fn test_empty_corpus() {
        let vectorizer = TfIdfVectorizer::new(50);
        let state = vectorizer.fit(&[]);
        assert!(state.is_empty());

        let v = vectorizer.transform("anything at all", &state);
        assert!(v.is_empty());
        assert_eq!(v.dim(), 50);
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let vectorizer = TfIdfVectorizer::new(50);
        let state = vectorizer.fit(&["shared rare", "shared other", "shared third"]);
        let shared = state.feature_index("shared").unwrap();
        let rare = state.feature_index("rare").unwrap();
        assert!(state.idf(rare) > state.idf(shared));
    }
}
