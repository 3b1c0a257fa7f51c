//! Memory engine facade
//!
//! [`MemoryEngine`] is the owned service instance the calling layer talks to.
//! It wires the record store, the corpus index, the retrieval coordinator,
//! the context assembler and the fact extractor together, and keeps the
//! index in step with every store mutation it performs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::embedding::create_vectorizer;
use crate::error::{ChimeraError, Result};
use crate::index::CorpusIndex;
use crate::intelligence::{ContextAssembler, ExtractionReport, FactExtractor, InjectedContext};
use crate::search::RetrievalCoordinator;
use crate::storage::{MemoryStore, SqliteStore};
use crate::types::{
    normalize_conversation_id, BatchRememberResult, ConversationMemoryStats, EngineConfig,
    IndexHealth, IndexStatus, MemoryId, MemoryPage, MemoryRecord, NewMemory, RebuildSummary,
    RememberInput, SearchOutcome, StoreConfig, VectorizerConfig,
};

/// One user/assistant exchange to record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatTurn {
    pub conversation_id: String,
    pub user_message: String,
    pub assistant_reply: String,
    /// Label of the model that produced the reply
    pub model_used: String,
}

/// Memories written for a chat turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMemories {
    pub user: MemoryRecord,
    pub assistant: MemoryRecord,
    pub facts: ExtractionReport,
    /// Set when extraction failed outright; the turn itself is still stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_error: Option<String>,
}

/// The memory indexing and retrieval engine
pub struct MemoryEngine {
    config: EngineConfig,
    store: Arc<dyn MemoryStore>,
    index: Arc<CorpusIndex>,
    retrieval: RetrievalCoordinator,
    context: ContextAssembler,
    extractor: FactExtractor,
}

impl MemoryEngine {
    /// Build an engine over an existing store
    ///
    /// With `rebuild_on_open` the index is fit immediately. A store failure
    /// during that first fit leaves the engine usable with an unfit, stale
    /// index.
    pub fn new(store: Arc<dyn MemoryStore>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let vectorizer = create_vectorizer(&config)?;
        let index = Arc::new(CorpusIndex::new(store.clone(), vectorizer));
        let retrieval = RetrievalCoordinator::new(index.clone(), &config);
        let context = ContextAssembler::new(store.clone(), &config);
        let extractor = FactExtractor::new(store.clone(), index.clone(), config.extraction.clone());

        let engine = Self {
            config,
            store,
            index,
            retrieval,
            context,
            extractor,
        };

        if engine.config.rebuild_on_open {
            if let Err(e) = engine.index.rebuild() {
                warn!(error = %e, "Initial index build failed");
            }
        }

        info!(
            max_features = engine.config.max_features,
            indexed = engine.index.len(),
            "Memory engine ready"
        );
        Ok(engine)
    }

    /// Open a SQLite-backed engine
    pub fn open(store_config: StoreConfig, config: EngineConfig) -> Result<Self> {
        let store = SqliteStore::open(store_config)?;
        Self::new(Arc::new(store), config)
    }

    /// Ephemeral engine with default settings
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::default(), EngineConfig::default())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn record_store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn index(&self) -> &Arc<CorpusIndex> {
        &self.index
    }

    // --- Index maintenance ---

    /// Index `text` for the stored record `id`
    ///
    /// Scope, conversation and timestamp come from the stored record.
    /// Returns `false` when the index has not been fit yet.
    pub fn store(&self, text: &str, id: MemoryId) -> Result<bool> {
        if text.trim().is_empty() {
            return Err(ChimeraError::Validation("text is required".to_string()));
        }
        let mut record = self.store.get(id)?;
        record.text = text.to_string();
        Ok(self.index.add(&record))
    }

    pub fn rebuild_index(&self) -> Result<RebuildSummary> {
        self.index.rebuild()
    }

    /// Rebuild on the blocking pool
    pub async fn rebuild_index_async(&self) -> Result<RebuildSummary> {
        let index = self.index.clone();
        tokio::task::spawn_blocking(move || index.rebuild())
            .await
            .map_err(|e| ChimeraError::Internal(e.to_string()))?
    }

    /// Rebuild unless the index already reports healthy
    pub fn rebuild_if_needed(&self) -> Result<Option<RebuildSummary>> {
        let status = self.index_status()?;
        if status.health == IndexHealth::Healthy {
            return Ok(None);
        }
        debug!(health = %status.health, "Index needs rebuild");
        self.index.rebuild().map(Some)
    }

    pub fn index_status(&self) -> Result<IndexStatus> {
        let total_records = self.store.count()?;
        let snapshot = self.index.snapshot();

        Ok(IndexStatus {
            total_records,
            indexed_count: snapshot.indexed_count,
            generation: snapshot.generation,
            vocabulary_size: snapshot.vocabulary_size,
            fitted_at: snapshot.fitted_at,
            health: snapshot.health(total_records),
            last_error: snapshot.last_error,
        })
    }

    pub fn vectorizer_config(&self) -> VectorizerConfig {
        VectorizerConfig {
            max_features: self.index.max_features(),
        }
    }

    // --- Retrieval ---

    /// Similarity search; without a conversation only team-global records match
    pub fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        conversation_id: Option<&str>,
    ) -> SearchOutcome {
        match conversation_id {
            Some(conversation_id) => self
                .retrieval
                .similarity_search(query, top_k, conversation_id),
            None => self.retrieval.global_search(query, top_k),
        }
    }

    pub fn inject_context(
        &self,
        conversation_id: &str,
        max_memories: Option<usize>,
    ) -> Result<InjectedContext> {
        self.context.inject(conversation_id, max_memories)
    }

    /// Headed context block to prepend to an LLM prompt
    pub fn prompt_context(&self, conversation_id: &str) -> Result<String> {
        self.context.prompt_block(conversation_id)
    }

    // --- Writes ---

    pub fn extract_facts(
        &self,
        user_message: &str,
        assistant_reply: &str,
        conversation_id: &str,
        model_label: &str,
    ) -> Result<ExtractionReport> {
        self.extractor
            .extract(user_message, assistant_reply, conversation_id, model_label)
    }

    /// Validate, persist and index a memory
    pub fn remember(&self, input: RememberInput) -> Result<MemoryRecord> {
        let input = input.into_new_memory()?;
        self.create_and_index(input)
    }

    /// Remember many memories; invalid items are reported by position and skipped
    pub fn batch_remember(&self, inputs: Vec<RememberInput>) -> BatchRememberResult {
        let mut result = BatchRememberResult::default();

        for (i, input) in inputs.into_iter().enumerate() {
            match self.remember(input) {
                Ok(record) => result.created.push(record.summary()),
                Err(e) => {
                    debug!(position = i, error = %e, "Batch item rejected");
                    result.failed.push((i, e.to_string()));
                }
            }
        }

        result
    }

    pub fn delete_memory(&self, id: MemoryId) -> Result<()> {
        self.store.delete(id)?;
        self.index.remove(id);
        Ok(())
    }

    /// Delete every memory of a conversation, whatever its scope
    pub fn clear_conversation(&self, conversation_id: &str) -> Result<usize> {
        let conversation_id = normalize_conversation_id(conversation_id)?;
        let deleted = self.store.delete_by_conversation(&conversation_id)?;
        self.index.remove_conversation(&conversation_id);
        info!(conversation_id = %conversation_id, deleted, "Cleared conversation memories");
        Ok(deleted)
    }

    pub fn list_memories(
        &self,
        conversation_id: &str,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<MemoryPage> {
        let conversation_id = normalize_conversation_id(conversation_id)?;
        let limit = limit.unwrap_or(self.config.default_list_limit).max(1);
        self.store
            .list_by_conversation(&conversation_id, limit, offset.unwrap_or(0))
    }

    pub fn conversation_stats(&self, conversation_id: &str) -> Result<ConversationMemoryStats> {
        let conversation_id = normalize_conversation_id(conversation_id)?;
        self.store.conversation_stats(&conversation_id)
    }

    /// Store both sides of a chat turn and mine it for facts
    pub fn record_chat_turn(&self, turn: ChatTurn) -> Result<TurnMemories> {
        let user = self.create_and_index(
            NewMemory::new(format!("User: {}", turn.user_message), turn.conversation_id.as_str())
                .with_tags(["chat", "user_message"])
                .with_metadata("model_used", turn.model_used.as_str()),
        )?;
        let assistant = self.create_and_index(
            NewMemory::new(
                format!("Assistant ({}): {}", turn.model_used, turn.assistant_reply),
                turn.conversation_id.as_str(),
            )
            .with_tags(["chat", "assistant_response"])
            .with_metadata("model_used", turn.model_used.as_str()),
        )?;

        let (facts, extraction_error) = match self.extractor.extract(
            &turn.user_message,
            &turn.assistant_reply,
            &turn.conversation_id,
            &turn.model_used,
        ) {
            Ok(report) => (report, None),
            Err(e) => {
                warn!(error = %e, "Fact extraction failed for chat turn");
                (ExtractionReport::default(), Some(e.to_string()))
            }
        };

        Ok(TurnMemories {
            user,
            assistant,
            facts,
            extraction_error,
        })
    }

    fn create_and_index(&self, input: NewMemory) -> Result<MemoryRecord> {
        let record = self.store.create(input)?;
        let indexed = self.index.add_persisted(&record);
        debug!(memory_id = record.id, indexed, "Remembered");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MemoryScope, SearchDiagnostic};
    use pretty_assertions::assert_eq;

    fn engine() -> MemoryEngine {
        MemoryEngine::open_in_memory().unwrap()
    }

    #[test]
    fn test_remember_is_searchable_after_fit() {
        let engine = engine();
        // Empty corpus: fit yields an empty vocabulary, so nothing is known yet
        engine
            .remember(RememberInput::new("Deploys happen every Tuesday", "A"))
            .unwrap();
        let outcome = engine.search("tuesday deploys", None, Some("A"));
        assert_eq!(outcome.diagnostic, Some(SearchDiagnostic::NoKnownTerms));

        engine.rebuild_index().unwrap();
        let outcome = engine.search("tuesday deploys", None, Some("A"));
        assert_eq!(outcome.hits.len(), 1);
    }

    #[test]
    fn test_store_requires_existing_record() {
        let engine = engine();
        assert!(matches!(
            engine.store("some text", 42),
            Err(ChimeraError::NotFound(42))
        ));
        assert!(matches!(
            engine.store("  ", 42),
            Err(ChimeraError::Validation(_))
        ));
    }

    #[test]
    fn test_store_reindexes_supplied_text() {
        let engine = engine();
        let record = engine
            .remember(RememberInput::new("initial words here", "A"))
            .unwrap();
        engine.rebuild_index().unwrap();

        assert!(engine.store("initial here", record.id).unwrap());
        let outcome = engine.search("words", None, Some("A"));
        assert!(outcome.hits.is_empty());
    }

    #[test]
    fn test_delete_memory() {
        let engine = engine();
        let record = engine
            .remember(RememberInput::new("Staging database is read only", "A"))
            .unwrap();
        engine.rebuild_index().unwrap();

        engine.delete_memory(record.id).unwrap();
        assert!(!engine.index().contains(record.id));
        assert!(matches!(
            engine.delete_memory(record.id),
            Err(ChimeraError::NotFound(_))
        ));
    }

    #[test]
    fn test_search_without_conversation_is_global_only() {
        let engine = engine();
        engine
            .remember(RememberInput::new("Release train leaves Friday", "A"))
            .unwrap();
        let mut global = RememberInput::new("Release notes live in the wiki", "B");
        global.scope = Some("team-global".to_string());
        engine.remember(global).unwrap();
        engine.rebuild_index().unwrap();

        let outcome = engine.search("release", Some(10), None);
        assert_eq!(outcome.hits.len(), 1);
        assert_eq!(outcome.hits[0].scope, MemoryScope::TeamGlobal);
    }

    #[test]
    fn test_index_status_health() {
        let engine = engine();
        let status = engine.index_status().unwrap();
        assert_eq!(status.health, IndexHealth::Healthy);
        assert_eq!(status.generation, 1);

        // Remembered after fit with an empty vocabulary: indexed but unscorable
        engine
            .remember(RememberInput::new("Backups run nightly", "A"))
            .unwrap();
        let status = engine.index_status().unwrap();
        assert_eq!(status.indexed_count, 1);
        assert_eq!(status.health, IndexHealth::NeedsRebuild);
        let before = engine.search("backups", None, Some("A"));
        assert!(before.hits.is_empty());

        let summary = engine.rebuild_if_needed().unwrap().unwrap();
        assert_eq!(summary.indexed_count, 1);
        assert_eq!(engine.index_status().unwrap().health, IndexHealth::Healthy);
        assert!(engine.rebuild_if_needed().unwrap().is_none());

        let after = engine.search("backups", None, Some("A"));
        assert_eq!(after.hits.len(), 1);
    }

    #[test]
    fn test_unscorable_corpus_stays_healthy_after_rebuild() {
        let engine = engine();
        engine.remember(RememberInput::new("!!! ??? ...", "A")).unwrap();
        assert_eq!(
            engine.index_status().unwrap().health,
            IndexHealth::NeedsRebuild
        );

        engine.rebuild_index().unwrap();
        let status = engine.index_status().unwrap();
        assert_eq!(status.vocabulary_size, 0);
        assert_eq!(status.health, IndexHealth::Healthy);
    }

    #[test]
    fn test_vectorizer_config() {
        let engine = engine();
        assert_eq!(engine.vectorizer_config().max_features, 1000);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_top_k: 0,
            ..Default::default()
        };
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        assert!(matches!(
            MemoryEngine::new(store, config),
            Err(ChimeraError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_rebuild_index_async() {
        let engine = engine();
        engine
            .remember(RememberInput::new("Async rebuild picks this up", "A"))
            .unwrap();
        let summary = engine.rebuild_index_async().await.unwrap();
        assert_eq!(summary.indexed_count, 1);
        assert_eq!(summary.generation, 2);
    }
}
