//! Chimera - conversation memory engine
//!
//! Durable memory fragments for chat conversations with scope-aware
//! similarity search, recency-ranked context injection and heuristic
//! fact extraction.

pub mod embedding;
pub mod engine;
pub mod error;
pub mod index;
pub mod intelligence;
pub mod search;
pub mod storage;
pub mod types;

pub use engine::{ChatTurn, MemoryEngine, TurnMemories};
pub use error::{ChimeraError, Result};
pub use storage::{MemoryStore, SqliteStore};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
