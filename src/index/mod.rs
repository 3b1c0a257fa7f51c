//! In-memory corpus index over the record store
//!
//! The index is a derived cache: a generation of vectorized entries fitted
//! from the store's full record set. Features:
//! - Lock-free scans: searches clone the active `Arc<Generation>` and score
//!   outside any lock, so they never wait on each other or on a rebuild
//! - Incremental add/remove, serialized by a writer mutex and applied
//!   copy-on-write to the active generation
//! - Atomic rebuild: the replacement generation is built off to the side and
//!   published with a single pointer swap; writes that land mid-rebuild are
//!   journaled and replayed onto the new generation before the swap
//! - Staleness tracking: a failed rebuild keeps the previous generation and
//!   is surfaced through [`IndexSnapshot::last_error`]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::embedding::{cosine_similarity, SparseVector, Vectorizer, VocabularyState};
use crate::error::{ChimeraError, Result};
use crate::storage::MemoryStore;
use crate::types::{IndexHealth, MemoryId, MemoryRecord, MemoryScope, RebuildSummary};

/// A vectorized record owned by the index
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub record_id: MemoryId,
    pub vector: SparseVector,
    /// Generation of the vocabulary that produced `vector`
    pub generation: u64,
    pub text: String,
    pub tags: Vec<String>,
    pub conversation_id: String,
    pub scope: MemoryScope,
    pub created_at: DateTime<Utc>,
}

/// An entry with its similarity to a query
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub entry: Arc<CorpusEntry>,
    pub score: f32,
}

/// Raw output of an index query
#[derive(Debug, Clone, Default)]
pub struct IndexHits {
    /// Ranked entries, best first
    pub entries: Vec<ScoredEntry>,
    /// Generation the query ran against
    pub generation: u64,
    /// Query terms present in the active vocabulary
    pub known_terms: usize,
}

/// Which scopes a search may return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeFilter {
    conversations: HashSet<String>,
    include_global: bool,
}

impl ScopeFilter {
    /// `{conversation_id} ∪ {team-global}`
    pub fn conversation_or_global(conversation_id: impl Into<String>) -> Self {
        Self {
            conversations: HashSet::from([conversation_id.into()]),
            include_global: true,
        }
    }

    /// Team-global records only
    pub fn global_only() -> Self {
        Self {
            conversations: HashSet::new(),
            include_global: true,
        }
    }

    /// Conversation-scoped records of the given conversations only
    pub fn conversations<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            conversations: ids.into_iter().map(Into::into).collect(),
            include_global: false,
        }
    }

    pub fn with_global(mut self, include_global: bool) -> Self {
        self.include_global = include_global;
        self
    }

    pub fn matches(&self, scope: MemoryScope, conversation_id: &str) -> bool {
        match scope {
            MemoryScope::TeamGlobal => self.include_global,
            MemoryScope::Conversation => self.conversations.contains(conversation_id),
        }
    }
}

/// Point-in-time view of index state for diagnostics
#[derive(Debug, Clone)]
pub struct IndexSnapshot {
    pub indexed_count: usize,
    pub generation: u64,
    pub vocabulary_size: usize,
    pub max_features: usize,
    pub fitted_at: Option<DateTime<Utc>>,
    /// Records the active vocabulary was fit over
    pub fitted_documents: usize,
    pub is_fit: bool,
    /// Reason the most recent rebuild failed, cleared by the next success
    pub last_error: Option<String>,
}

impl IndexSnapshot {
    /// Best-effort health against a store count read at a different instant
    pub fn health(&self, total_records: usize) -> IndexHealth {
        if self.last_error.is_some() {
            IndexHealth::Stale
        } else if !self.is_fit && total_records > 0 {
            IndexHealth::NeedsRebuild
        } else if self.vocabulary_size == 0 && self.indexed_count > self.fitted_documents {
            // Entries added after an empty fit carry empty vectors
            IndexHealth::NeedsRebuild
        } else if self.indexed_count == total_records {
            IndexHealth::Healthy
        } else {
            IndexHealth::NeedsRebuild
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Generation {
    id: u64,
    vocabulary: Option<Arc<VocabularyState>>,
    entries: HashMap<MemoryId, Arc<CorpusEntry>>,
}

/// Incremental write recorded while a rebuild is in flight
#[derive(Debug, Clone)]
enum PendingOp {
    Upsert(MemoryRecord),
    Remove(MemoryId),
    RemoveConversation(String),
}

#[derive(Debug, Default)]
struct WriterState {
    /// `Some` while a rebuild is building its replacement generation
    journal: Option<Vec<PendingOp>>,
}

impl WriterState {
    fn record(&mut self, op: PendingOp) {
        if let Some(journal) = self.journal.as_mut() {
            journal.push(op);
        }
    }
}

/// Similarity index over the memory corpus
pub struct CorpusIndex {
    store: Arc<dyn MemoryStore>,
    vectorizer: Box<dyn Vectorizer>,
    active: RwLock<Arc<Generation>>,
    writer: Mutex<WriterState>,
    /// Held for the whole of a rebuild so rebuilds never interleave
    rebuild_lock: Mutex<()>,
    generation_counter: AtomicU64,
    last_error: RwLock<Option<String>>,
}

impl CorpusIndex {
    /// Create an unfit index; nothing is searchable until the first rebuild
    pub fn new(store: Arc<dyn MemoryStore>, vectorizer: Box<dyn Vectorizer>) -> Self {
        Self {
            store,
            vectorizer,
            active: RwLock::new(Arc::new(Generation::default())),
            writer: Mutex::new(WriterState::default()),
            rebuild_lock: Mutex::new(()),
            generation_counter: AtomicU64::new(0),
            last_error: RwLock::new(None),
        }
    }

    fn snapshot_generation(&self) -> Arc<Generation> {
        self.active.read().clone()
    }

    fn build_entry(&self, record: &MemoryRecord, vocabulary: &VocabularyState) -> CorpusEntry {
        let vector = self.vectorizer.transform(&record.text, vocabulary);
        debug_assert_eq!(vector.dim(), vocabulary.max_features());

        CorpusEntry {
            record_id: record.id,
            vector,
            generation: vocabulary.generation(),
            text: record.text.clone(),
            tags: record.tags.clone(),
            conversation_id: record.conversation_id.clone(),
            scope: record.scope,
            created_at: record.created_at,
        }
    }

    /// Index or re-index a record under the current generation
    ///
    /// Returns `false` when no vocabulary has been fit yet; the record is
    /// picked up by the first rebuild instead.
    pub fn add(&self, record: &MemoryRecord) -> bool {
        let mut writer = self.writer.lock();

        // Stable while we hold the writer lock: swaps also take it.
        let vocabulary = self.active.read().vocabulary.clone();
        let applied = match vocabulary {
            Some(vocabulary) => {
                let entry = Arc::new(self.build_entry(record, &vocabulary));
                let mut active = self.active.write();
                Arc::make_mut(&mut *active)
                    .entries
                    .insert(record.id, entry);
                true
            }
            None => false,
        };

        writer.record(PendingOp::Upsert(record.clone()));
        debug!(memory_id = record.id, applied, "Index add");
        applied
    }

    /// Drop a record's entry; returns whether one existed
    pub fn remove(&self, id: MemoryId) -> bool {
        let mut writer = self.writer.lock();

        let present = self.active.read().entries.contains_key(&id);
        if present {
            let mut active = self.active.write();
            Arc::make_mut(&mut *active).entries.remove(&id);
        }

        writer.record(PendingOp::Remove(id));
        debug!(memory_id = id, present, "Index remove");
        present
    }

    /// Drop every entry belonging to a conversation, regardless of scope
    pub fn remove_conversation(&self, conversation_id: &str) -> usize {
        let mut writer = self.writer.lock();

        let ids: Vec<MemoryId> = self
            .active
            .read()
            .entries
            .values()
            .filter(|e| e.conversation_id == conversation_id)
            .map(|e| e.record_id)
            .collect();
        if !ids.is_empty() {
            let mut active = self.active.write();
            let generation = Arc::make_mut(&mut *active);
            for id in &ids {
                generation.entries.remove(id);
            }
        }

        writer.record(PendingOp::RemoveConversation(conversation_id.to_string()));
        debug!(conversation_id, removed = ids.len(), "Index remove conversation");
        ids.len()
    }

    /// `add` a record just written to the store, then confirm it is still there
    ///
    /// A conversation cleared between the store write and the add would
    /// otherwise leave a searchable entry for a deleted record. Unlike `add`,
    /// this reads the store once.
    pub fn add_persisted(&self, record: &MemoryRecord) -> bool {
        let applied = self.add(record);
        match self.store.get(record.id) {
            Ok(_) => applied,
            Err(ChimeraError::NotFound(_)) => {
                self.remove(record.id);
                debug!(memory_id = record.id, "Record deleted before indexing settled");
                false
            }
            Err(e) => {
                warn!(memory_id = record.id, error = %e, "Could not confirm indexed record");
                applied
            }
        }
    }

    /// Refit the vocabulary from the store and swap in a new generation
    ///
    /// On store failure the active generation is left untouched and the
    /// index reports itself stale until a rebuild succeeds.
    #[instrument(skip(self))]
    pub fn rebuild(&self) -> Result<RebuildSummary> {
        let _rebuilding = self.rebuild_lock.lock();
        let started = Instant::now();

        self.writer.lock().journal = Some(Vec::new());

        let records = match self.store.list_all() {
            Ok(records) => records,
            Err(e) => {
                self.writer.lock().journal = None;
                let reason = e.to_string();
                warn!(error = %reason, "Index rebuild aborted, keeping previous generation");
                *self.last_error.write() = Some(reason.clone());
                return Err(ChimeraError::StoreUnavailable(reason));
            }
        };

        let generation_id = self.generation_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let vocabulary = Arc::new(self.vectorizer.fit(&texts).with_generation(generation_id));

        let entries = records
            .iter()
            .map(|record| (record.id, Arc::new(self.build_entry(record, &vocabulary))))
            .collect();
        let mut next = Generation {
            id: generation_id,
            vocabulary: Some(vocabulary.clone()),
            entries,
        };

        let mut writer = self.writer.lock();
        let journal = writer.journal.take().unwrap_or_default();
        let replayed = journal.len();
        for op in journal {
            match op {
                PendingOp::Upsert(record) => {
                    let entry = Arc::new(self.build_entry(&record, &vocabulary));
                    next.entries.insert(record.id, entry);
                }
                PendingOp::Remove(id) => {
                    next.entries.remove(&id);
                }
                PendingOp::RemoveConversation(conversation_id) => {
                    next.entries
                        .retain(|_, e| e.conversation_id != conversation_id);
                }
            }
        }

        let indexed_count = next.entries.len();
        *self.active.write() = Arc::new(next);
        *self.last_error.write() = None;
        drop(writer);

        let summary = RebuildSummary {
            generation: generation_id,
            indexed_count,
            vocabulary_size: vocabulary.len(),
            elapsed_ms: started.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            generation = summary.generation,
            indexed = summary.indexed_count,
            vocabulary = summary.vocabulary_size,
            replayed,
            elapsed_ms = summary.elapsed_ms,
            "Index rebuilt"
        );
        Ok(summary)
    }

    /// Rank entries passing `filter` by cosine similarity to `query`
    ///
    /// Ties are broken by newer `created_at`, then higher id. Zero-similarity
    /// entries are never returned.
    pub fn search(&self, query: &str, top_k: usize, filter: &ScopeFilter) -> Result<IndexHits> {
        let generation = self.snapshot_generation();
        let vocabulary = generation
            .vocabulary
            .as_ref()
            .ok_or(ChimeraError::IndexUnfit)?;

        let query_vector = self.vectorizer.transform(query, vocabulary);
        let mut hits = IndexHits {
            entries: Vec::new(),
            generation: generation.id,
            known_terms: query_vector.nnz(),
        };
        if query_vector.is_empty() || top_k == 0 {
            return Ok(hits);
        }

        let mut scored: Vec<ScoredEntry> = generation
            .entries
            .values()
            .filter(|e| e.generation == generation.id)
            .filter(|e| filter.matches(e.scope, &e.conversation_id))
            .filter_map(|e| {
                let score = cosine_similarity(&query_vector, &e.vector);
                (score > 0.0).then(|| ScoredEntry {
                    entry: Arc::clone(e),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
                .then_with(|| b.entry.record_id.cmp(&a.entry.record_id))
        });
        scored.truncate(top_k);

        hits.entries = scored;
        Ok(hits)
    }

    /// Whether an entry for `id` is in the active generation
    pub fn contains(&self, id: MemoryId) -> bool {
        self.active.read().entries.contains_key(&id)
    }

    /// Number of entries in the active generation
    pub fn len(&self) -> usize {
        self.active.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_fit(&self) -> bool {
        self.active.read().vocabulary.is_some()
    }

    /// The active vocabulary, if any
    pub fn vocabulary(&self) -> Option<Arc<VocabularyState>> {
        self.active.read().vocabulary.clone()
    }

    pub fn max_features(&self) -> usize {
        self.vectorizer.max_features()
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let generation = self.snapshot_generation();
        IndexSnapshot {
            indexed_count: generation.entries.len(),
            generation: generation.id,
            vocabulary_size: generation.vocabulary.as_ref().map_or(0, |v| v.len()),
            max_features: self.vectorizer.max_features(),
            fitted_at: generation.vocabulary.as_ref().map(|v| v.fitted_at()),
            fitted_documents: generation
                .vocabulary
                .as_ref()
                .map_or(0, |v| v.document_count()),
            is_fit: generation.vocabulary.is_some(),
            last_error: self.last_error.read().clone(),
        }
    }
}
