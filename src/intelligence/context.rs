//! Recency-ranked context for prompt injection
//!
//! Reads straight from the record store and never consults the corpus index,
//! so injection keeps working while the index is unfit or stale.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::storage::MemoryStore;
use crate::types::{normalize_conversation_id, EngineConfig, MemoryRecord, MemoryScope};

/// Text returned when a conversation has nothing to inject
pub const NO_MEMORIES_TEXT: &str = "No previous memories found.";

/// Header of the block prepended to LLM prompts
pub const CONTEXT_HEADER: &str = "=== Relevant Context ===";

/// Marker rendered in front of team-global memories
pub const GLOBAL_MARKER: &str = "[GLOBAL]";

/// Rendered context plus the records it was built from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjectedContext {
    pub context_text: String,
    pub count: usize,
    pub records: Vec<MemoryRecord>,
}

/// Selects the newest visible memories of a conversation and renders them
pub struct ContextAssembler {
    store: Arc<dyn MemoryStore>,
    default_max: usize,
    max_max: usize,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn MemoryStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            default_max: config.default_inject_memories,
            max_max: config.max_inject_memories,
        }
    }

    /// Requested memory count capped to `[1, max_inject_memories]`
    pub fn clamp_max_memories(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_max)
            .clamp(1, self.max_max.max(1))
    }

    /// The newest `max_memories` records visible to `conversation_id`
    pub fn select(
        &self,
        conversation_id: &str,
        max_memories: Option<usize>,
    ) -> Result<Vec<MemoryRecord>> {
        let conversation_id = normalize_conversation_id(conversation_id)?;
        let limit = self.clamp_max_memories(max_memories);

        let mut records = self.store.list_by_conversation_or_global(&conversation_id)?;
        records.retain(|r| r.visible_to(&conversation_id));
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        records.truncate(limit);
        Ok(records)
    }

    pub fn inject(
        &self,
        conversation_id: &str,
        max_memories: Option<usize>,
    ) -> Result<InjectedContext> {
        let records = self.select(conversation_id, max_memories)?;

        let context_text = if records.is_empty() {
            NO_MEMORIES_TEXT.to_string()
        } else {
            render_lines(&records)
        };

        Ok(InjectedContext {
            context_text,
            count: records.len(),
            records,
        })
    }

    /// Headed context block for an LLM prompt; empty when nothing is visible
    pub fn prompt_block(&self, conversation_id: &str) -> Result<String> {
        let records = self.select(conversation_id, None)?;
        if records.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("{}\n{}", CONTEXT_HEADER, render_lines(&records)))
    }
}

/// One bullet line per memory
pub fn render_line(record: &MemoryRecord) -> String {
    match record.scope {
        MemoryScope::TeamGlobal => format!("- {} {}", GLOBAL_MARKER, record.text),
        MemoryScope::Conversation => format!("- {}", record.text),
    }
}

fn render_lines(records: &[MemoryRecord]) -> String {
    records
        .iter()
        .map(render_line)
        .collect::<Vec<_>>()
        .join("\n")
}
