//! Scope-aware similarity retrieval
//!
//! The coordinator turns a conversation id into a [`ScopeFilter`], clamps the
//! requested hit count and delegates ranking to the [`CorpusIndex`]. It never
//! propagates errors: a search that cannot rank returns no hits and a
//! [`SearchDiagnostic`] saying why.

use std::sync::Arc;

use tracing::debug;

use crate::error::ChimeraError;
use crate::index::{CorpusIndex, IndexHits, ScopeFilter};
use crate::types::{EngineConfig, SearchDiagnostic, SearchHit, SearchOutcome};

/// Ranked similarity search over the corpus index
pub struct RetrievalCoordinator {
    index: Arc<CorpusIndex>,
    default_top_k: usize,
    max_top_k: usize,
}

impl RetrievalCoordinator {
    pub fn new(index: Arc<CorpusIndex>, config: &EngineConfig) -> Self {
        Self {
            index,
            default_top_k: config.default_top_k,
            max_top_k: config.max_top_k,
        }
    }

    /// Requested hit count capped to `[1, max_top_k]`
    pub fn clamp_top_k(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_top_k)
            .clamp(1, self.max_top_k.max(1))
    }

    /// Rank records of `conversation_id` and team-global records against `query`
    pub fn similarity_search(
        &self,
        query: &str,
        top_k: Option<usize>,
        conversation_id: &str,
    ) -> SearchOutcome {
        let filter = ScopeFilter::conversation_or_global(conversation_id.trim());
        self.search_with_filter(query, top_k, &filter)
    }

    /// Rank team-global records only
    pub fn global_search(&self, query: &str, top_k: Option<usize>) -> SearchOutcome {
        self.search_with_filter(query, top_k, &ScopeFilter::global_only())
    }

    pub fn search_with_filter(
        &self,
        query: &str,
        top_k: Option<usize>,
        filter: &ScopeFilter,
    ) -> SearchOutcome {
        if query.trim().is_empty() {
            return SearchOutcome::empty(SearchDiagnostic::EmptyQuery);
        }

        let top_k = self.clamp_top_k(top_k);
        match self.index.search(query, top_k, filter) {
            Ok(hits) if hits.known_terms == 0 => {
                debug!(query, "No query terms in vocabulary");
                SearchOutcome::empty(SearchDiagnostic::NoKnownTerms)
            }
            Ok(hits) => {
                debug!(
                    query,
                    top_k,
                    generation = hits.generation,
                    hits = hits.entries.len(),
                    "Similarity search"
                );
                SearchOutcome {
                    hits: to_search_hits(hits),
                    diagnostic: None,
                }
            }
            Err(ChimeraError::IndexUnfit) => SearchOutcome::empty(SearchDiagnostic::IndexUnfit),
            Err(e) => {
                debug!(error = %e, "Similarity search failed");
                SearchOutcome::empty(SearchDiagnostic::Failed(e.to_string()))
            }
        }
    }
}

fn to_search_hits(hits: IndexHits) -> Vec<SearchHit> {
    hits.entries
        .into_iter()
        .map(|scored| {
            let entry = scored.entry;
            SearchHit {
                id: entry.record_id,
                text: entry.text.clone(),
                tags: entry.tags.clone(),
                scope: entry.scope,
                conversation_id: entry.conversation_id.clone(),
                score: scored.score,
                created_at: entry.created_at,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TfIdfVectorizer;
    use crate::storage::{MemoryStore, SqliteStore};
    use crate::types::{MemoryScope, NewMemory};

    fn coordinator(config: &EngineConfig) -> (Arc<CorpusIndex>, RetrievalCoordinator) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .create(NewMemory::new("I prefer dark mode in the editor", "A"))
            .unwrap();
        store
            .create(NewMemory::new("Team uses UTC for all timestamps", "B").with_scope(MemoryScope::TeamGlobal))
            .unwrap();
        store
            .create(NewMemory::new("Lunch is at noon on Fridays", "B"))
            .unwrap();
        for i in 0..8 {
            store
                .create(NewMemory::new(format!("deploy checklist step {}", i), "A"))
                .unwrap();
        }

        let index = Arc::new(CorpusIndex::new(
            store,
            Box::new(TfIdfVectorizer::new(config.max_features)),
        ));
        let coordinator = RetrievalCoordinator::new(index.clone(), config);
        (index, coordinator)
    }

    #[test]
    fn test_unfit_index_degrades() {
        let (_index, coordinator) = coordinator(&EngineConfig::default());
        let outcome = coordinator.similarity_search("dark mode", None, "A");
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.diagnostic, Some(SearchDiagnostic::IndexUnfit));
    }

    #[test]
    fn test_empty_query() {
        let (index, coordinator) = coordinator(&EngineConfig::default());
        index.rebuild().unwrap();
        let outcome = coordinator.similarity_search("   ", None, "A");
        assert_eq!(outcome.diagnostic, Some(SearchDiagnostic::EmptyQuery));
    }

    #[test]
    fn test_unknown_terms() {
        let (index, coordinator) = coordinator(&EngineConfig::default());
        index.rebuild().unwrap();
        let outcome = coordinator.similarity_search("zebra xylophone", None, "A");
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.diagnostic, Some(SearchDiagnostic::NoKnownTerms));
    }

    #[test]
    fn test_default_and_clamped_top_k() {
        let config = EngineConfig {
            max_top_k: 6,
            ..Default::default()
        };
        let (index, coordinator) = coordinator(&config);
        index.rebuild().unwrap();

        assert_eq!(coordinator.clamp_top_k(None), 5);
        assert_eq!(coordinator.clamp_top_k(Some(0)), 1);
        assert_eq!(coordinator.clamp_top_k(Some(500)), 6);

        let outcome = coordinator.similarity_search("deploy checklist", None, "A");
        assert_eq!(outcome.hits.len(), 5);
        let outcome = coordinator.similarity_search("deploy checklist", Some(100), "A");
        assert_eq!(outcome.hits.len(), 6);
        assert!(outcome
            .hits
            .windows(2)
            .all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_other_conversation_hidden() {
        let (index, coordinator) = coordinator(&EngineConfig::default());
        index.rebuild().unwrap();

        let outcome = coordinator.similarity_search("lunch noon fridays", None, "A");
        assert!(outcome.hits.is_empty());
        assert_eq!(outcome.diagnostic, None);

        let outcome = coordinator.similarity_search("lunch noon fridays", None, "B");
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].conversation_id, "B");
    }

    #[test]
    fn test_global_search() {
        let (index, coordinator) = coordinator(&EngineConfig::default());
        index.rebuild().unwrap();

        let outcome = coordinator.global_search("utc timestamps dark mode", None);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].scope, MemoryScope::TeamGlobal);
    }
}
