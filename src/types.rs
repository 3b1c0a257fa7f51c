//! Core types for Chimera

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ChimeraError, Result};
use crate::intelligence::extraction::ExtractionConfig;

/// Unique identifier for a memory
pub type MemoryId = i64;

/// Maximum conversation id length accepted at the boundary
pub const MAX_CONVERSATION_ID_LENGTH: usize = 128;

/// Maximum number of tags on a single memory
pub const MAX_TAGS: usize = 32;

/// Maximum length of a single tag
pub const MAX_TAG_LENGTH: usize = 64;

/// Maximum memory text length in characters
pub const MAX_TEXT_LENGTH: usize = 20_000;

/// Visibility class of a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MemoryScope {
    /// Visible only inside the conversation that produced it
    #[default]
    #[serde(rename = "conversation")]
    Conversation,
    /// Visible from every conversation of the team
    #[serde(rename = "team-global")]
    TeamGlobal,
}

impl MemoryScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryScope::Conversation => "conversation",
            MemoryScope::TeamGlobal => "team-global",
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, MemoryScope::TeamGlobal)
    }
}

impl std::fmt::Display for MemoryScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryScope {
    type Err = ChimeraError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "conversation" => Ok(MemoryScope::Conversation),
            "team-global" => Ok(MemoryScope::TeamGlobal),
            _ => Err(ChimeraError::Validation(format!(
                "Unknown scope '{}': expected 'conversation' or 'team-global'",
                s
            ))),
        }
    }
}

/// Primitive metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::String(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::String(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl TryFrom<serde_json::Value> for MetadataValue {
    type Error = ChimeraError;

    fn try_from(value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(MetadataValue::Null),
            Value::Bool(b) => Ok(MetadataValue::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(MetadataValue::Int(i)),
                None => n.as_f64().map(MetadataValue::Float).ok_or_else(|| {
                    ChimeraError::Validation(format!("Unrepresentable number: {}", n))
                }),
            },
            Value::String(s) => Ok(MetadataValue::String(s)),
            Value::Array(_) | Value::Object(_) => Err(ChimeraError::Validation(
                "Metadata values must be primitives (null, bool, number, string)".to_string(),
            )),
        }
    }
}

/// Open string-keyed map of primitive values
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Validate an untyped JSON blob into [`Metadata`]
///
/// `null` is treated as an empty map. Anything other than a flat object of
/// primitives is rejected.
pub fn metadata_from_json(value: serde_json::Value) -> Result<Metadata> {
    match value {
        serde_json::Value::Null => Ok(Metadata::new()),
        serde_json::Value::Object(map) => {
            let mut metadata = Metadata::new();
            for (key, value) in map {
                if key.trim().is_empty() {
                    return Err(ChimeraError::Validation(
                        "Metadata keys cannot be empty".to_string(),
                    ));
                }
                let value = MetadataValue::try_from(value).map_err(|e| {
                    ChimeraError::Validation(format!("Metadata key '{}': {}", key, e))
                })?;
                metadata.insert(key, value);
            }
            Ok(metadata)
        }
        other => Err(ChimeraError::Validation(format!(
            "Metadata must be an object, got {}",
            other
        ))),
    }
}

/// A persisted memory fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique identifier assigned by the store
    pub id: MemoryId,
    /// Memory content (immutable after creation)
    pub text: String,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Conversation that produced the memory
    pub conversation_id: String,
    /// Visibility class
    #[serde(default)]
    pub scope: MemoryScope,
    /// Primitive metadata (model_used, source, ...)
    #[serde(default)]
    pub metadata: Metadata,
    /// When the memory was created
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Whether a search or injection for `conversation_id` may see this record
    pub fn visible_to(&self, conversation_id: &str) -> bool {
        self.scope.is_global() || self.conversation_id == conversation_id
    }

    pub fn summary(&self) -> MemorySummary {
        MemorySummary {
            id: self.id,
            text: preview(&self.text, 50),
            scope: self.scope,
            created_at: self.created_at,
        }
    }
}

/// Validated input for creating a memory in the store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMemory {
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub conversation_id: String,
    #[serde(default)]
    pub scope: MemoryScope,
    #[serde(default)]
    pub metadata: Metadata,
    /// Override the creation timestamp (imports, fixtures)
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMemory {
    pub fn new(text: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Check required fields and normalize tags
    ///
    /// Runs before any state mutation; a failure leaves store and index untouched.
    pub fn validate(mut self) -> Result<Self> {
        if self.text.trim().is_empty() {
            return Err(ChimeraError::Validation("text is required".to_string()));
        }
        if self.text.chars().count() > MAX_TEXT_LENGTH {
            return Err(ChimeraError::Validation(format!(
                "text exceeds {} characters",
                MAX_TEXT_LENGTH
            )));
        }

        self.conversation_id = normalize_conversation_id(&self.conversation_id)?;

        let mut tags: Vec<String> = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            let tag = tag.trim();
            if tag.is_empty() {
                continue;
            }
            if tag.chars().count() > MAX_TAG_LENGTH {
                return Err(ChimeraError::Validation(format!(
                    "tag '{}' exceeds {} characters",
                    tag, MAX_TAG_LENGTH
                )));
            }
            if !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        if tags.len() > MAX_TAGS {
            return Err(ChimeraError::Validation(format!(
                "at most {} tags are allowed",
                MAX_TAGS
            )));
        }
        self.tags = tags;

        Ok(self)
    }
}

/// Trim and bound a conversation id
pub fn normalize_conversation_id(conversation_id: &str) -> Result<String> {
    let trimmed = conversation_id.trim();
    if trimmed.is_empty() {
        return Err(ChimeraError::Validation(
            "conversation_id is required".to_string(),
        ));
    }
    if trimmed.len() > MAX_CONVERSATION_ID_LENGTH {
        return Err(ChimeraError::Validation(format!(
            "conversation_id exceeds {} characters",
            MAX_CONVERSATION_ID_LENGTH
        )));
    }
    Ok(trimmed.to_string())
}

/// Loosely typed "remember" request as received from the calling layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RememberInput {
    pub text: String,
    pub conversation_id: String,
    /// "conversation" (default) or "team-global"
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl RememberInput {
    pub fn new(text: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            conversation_id: conversation_id.into(),
            ..Default::default()
        }
    }

    /// Convert into a validated [`NewMemory`]
    pub fn into_new_memory(self) -> Result<NewMemory> {
        let scope = match self.scope.as_deref() {
            None => MemoryScope::Conversation,
            Some(s) => s.parse()?,
        };
        let metadata = match self.metadata {
            Some(value) => metadata_from_json(value)?,
            None => Metadata::new(),
        };

        NewMemory {
            text: self.text,
            tags: self.tags,
            conversation_id: self.conversation_id,
            scope,
            metadata,
            created_at: None,
        }
        .validate()
    }
}

/// Short form of a memory returned by create-style operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub id: MemoryId,
    pub text: String,
    pub scope: MemoryScope,
    pub created_at: DateTime<Utc>,
}

/// Result of a batch remember operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRememberResult {
    /// Successfully created memories
    pub created: Vec<MemorySummary>,
    /// Indices of inputs that failed (with error messages)
    pub failed: Vec<(usize, String)>,
}

/// A page of memories for a single conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPage {
    pub memories: Vec<MemoryRecord>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// Memory counts for a conversation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMemoryStats {
    pub conversation_id: String,
    pub total: usize,
    pub conversation_scoped: usize,
    pub team_global: usize,
}

/// A ranked similarity hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: MemoryId,
    pub text: String,
    pub tags: Vec<String>,
    pub scope: MemoryScope,
    pub conversation_id: String,
    pub score: f32,
    pub created_at: DateTime<Utc>,
}

/// Why a search produced no ranking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SearchDiagnostic {
    /// No vocabulary has been fit yet
    IndexUnfit,
    /// The query was blank
    EmptyQuery,
    /// None of the query terms are in the active vocabulary
    NoKnownTerms,
    /// The search failed; the reason is for operators, not end users
    Failed(String),
}

/// Result of a similarity search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<SearchDiagnostic>,
}

impl SearchOutcome {
    pub fn empty(diagnostic: SearchDiagnostic) -> Self {
        Self {
            hits: Vec::new(),
            diagnostic: Some(diagnostic),
        }
    }
}

/// Health of the search index relative to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexHealth {
    Healthy,
    NeedsRebuild,
    /// The last rebuild failed; results come from an older generation
    Stale,
}

impl std::fmt::Display for IndexHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexHealth::Healthy => write!(f, "healthy"),
            IndexHealth::NeedsRebuild => write!(f, "needs_rebuild"),
            IndexHealth::Stale => write!(f, "stale"),
        }
    }
}

/// Operator-facing index diagnostics
///
/// `total_records` and `indexed_count` are read at different instants, so
/// `health` is best-effort under concurrent writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStatus {
    pub total_records: usize,
    pub indexed_count: usize,
    pub generation: u64,
    pub vocabulary_size: usize,
    pub fitted_at: Option<DateTime<Utc>>,
    pub health: IndexHealth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Vectorizer settings exposed to operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorizerConfig {
    pub max_features: usize,
}

/// Outcome of a completed rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebuildSummary {
    pub generation: u64,
    pub indexed_count: usize,
    pub vocabulary_size: usize,
    pub elapsed_ms: f64,
}

/// Configuration for the memory engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Vocabulary bound (vector width)
    #[serde(default = "default_max_features")]
    pub max_features: usize,
    /// Hits returned when the caller does not ask for a count
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Upper clamp on requested hits
    #[serde(default = "default_max_top_k")]
    pub max_top_k: usize,
    /// Memories injected when the caller does not ask for a count
    #[serde(default = "default_inject_memories")]
    pub default_inject_memories: usize,
    /// Upper clamp on injected memories
    #[serde(default = "default_max_inject_memories")]
    pub max_inject_memories: usize,
    /// Page size for listing memories
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
    /// Fit the index from the store when the engine opens
    #[serde(default = "default_true")]
    pub rebuild_on_open: bool,
    /// Auto-extraction settings
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

fn default_max_features() -> usize {
    1000
}

fn default_top_k() -> usize {
    5
}

fn default_max_top_k() -> usize {
    50
}

fn default_inject_memories() -> usize {
    10
}

fn default_max_inject_memories() -> usize {
    100
}

fn default_list_limit() -> usize {
    20
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_features: default_max_features(),
            default_top_k: default_top_k(),
            max_top_k: default_max_top_k(),
            default_inject_memories: default_inject_memories(),
            max_inject_memories: default_max_inject_memories(),
            default_list_limit: default_list_limit(),
            rebuild_on_open: true,
            extraction: ExtractionConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("max_features", self.max_features),
            ("default_top_k", self.default_top_k),
            ("max_top_k", self.max_top_k),
            ("default_inject_memories", self.default_inject_memories),
            ("max_inject_memories", self.max_inject_memories),
            ("default_list_limit", self.default_list_limit),
        ];
        for (name, value) in bounds {
            if value == 0 {
                return Err(ChimeraError::Config(format!("{} must be positive", name)));
            }
        }
        if self.extraction.min_span_chars > self.extraction.max_span_chars {
            return Err(ChimeraError::Config(
                "extraction.min_span_chars exceeds max_span_chars".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration for the SQLite record store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path to SQLite database (":memory:" for an ephemeral store)
    pub db_path: String,
    #[serde(default)]
    pub storage_mode: StorageMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            storage_mode: StorageMode::Local,
        }
    }
}

/// Journal mode for SQLite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageMode {
    #[default]
    Local,
    CloudSafe,
}

/// Truncate to `max_chars` characters, appending "..." when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        text.to_string()
    }
}
