//! Context assembly and fact extraction
//!
//! Provides:
//! - Recency-ranked context blocks for prompt injection
//! - Heuristic auto-extraction of facts from chat turns

pub mod context;
pub mod extraction;

pub use context::{ContextAssembler, InjectedContext, CONTEXT_HEADER, NO_MEMORIES_TEXT};
pub use extraction::{
    default_triggers, extract_candidates, extract_candidates_with, ExtractedFact,
    ExtractionConfig, ExtractionReport, FactCandidate, FactExtractor, FactKind, FactTrigger,
    KeywordTrigger, PatternTrigger, SpeakerRole,
};
