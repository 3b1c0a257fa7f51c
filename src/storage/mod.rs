//! Record store abstraction
//!
//! The durable store is the source of truth for memories; the corpus index is
//! a derived cache rebuilt from it. Everything in the engine talks to the
//! store through [`MemoryStore`], so deployments can back it with any
//! database. [`SqliteStore`] is the bundled implementation.
//!
//! # Design Principles
//!
//! 1. **Sync Interface**: All methods are synchronous. Async callers offload
//!    with `tokio::task::spawn_blocking`.
//!
//! 2. **Immutable Self**: Methods take `&self`; implementations handle their
//!    own concurrency.
//!
//! 3. **No index coupling**: stores never call back into the index.

mod migrations;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::{ConversationMemoryStats, MemoryId, MemoryPage, MemoryRecord, NewMemory};

/// The durable record store consumed by the engine
pub trait MemoryStore: Send + Sync {
    /// Every record, newest first
    fn list_all(&self) -> Result<Vec<MemoryRecord>>;

    /// Records of `conversation_id` plus all team-global records, newest first
    fn list_by_conversation_or_global(&self, conversation_id: &str) -> Result<Vec<MemoryRecord>>;

    /// Persist a validated memory and return it with its assigned id
    fn create(&self, input: NewMemory) -> Result<MemoryRecord>;

    /// Delete a memory; `NotFound` if the id is unknown
    fn delete(&self, id: MemoryId) -> Result<()>;

    /// Delete every memory of a conversation (any scope), returning the count
    fn delete_by_conversation(&self, conversation_id: &str) -> Result<usize>;

    /// Fetch a single memory; `NotFound` if the id is unknown
    fn get(&self, id: MemoryId) -> Result<MemoryRecord>;

    /// Total number of memories
    fn count(&self) -> Result<usize>;

    /// Page through a single conversation's memories, newest first
    fn list_by_conversation(
        &self,
        conversation_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<MemoryPage>;

    /// Memory counts by scope for a conversation
    fn conversation_stats(&self, conversation_id: &str) -> Result<ConversationMemoryStats>;
}
