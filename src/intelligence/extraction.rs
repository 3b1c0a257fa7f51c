//! Heuristic fact extraction from chat turns
//!
//! Detects durable facts worth remembering in a user/assistant exchange:
//! - Preferences ("I prefer tabs over spaces")
//! - Identity and team context ("Our team owns the billing service")
//! - Decisions ("From now on we deploy on Tuesdays")
//! - Reminders and deadlines ("The report is due by Friday")
//! - Key facts with concrete details ("The standup is at 9am")
//!
//! Detection is a pure function of the turn text ([`extract_candidates`]).
//! [`FactExtractor`] persists the candidates and indexes them.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::{ChimeraError, Result};
use crate::index::CorpusIndex;
use crate::storage::MemoryStore;
use crate::types::{MemoryId, MemoryScope, NewMemory};

/// Tag applied to every auto-extracted memory
pub const AUTO_EXTRACTED_TAG: &str = "auto-extracted";

/// `source` metadata value of auto-extracted memories
pub const AUTO_EXTRACT_SOURCE: &str = "auto_extract";

/// Configuration for fact extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Enable extraction on chat turns
    pub enabled: bool,
    /// Shortest span considered, in characters
    pub min_span_chars: usize,
    /// Longest span considered, in characters
    pub max_span_chars: usize,
    /// Maximum facts persisted per turn
    pub max_facts_per_turn: usize,
    /// Also mine the assistant's reply
    pub include_assistant: bool,
    /// Ignore spans ending in a question mark
    pub skip_questions: bool,
    /// Spans that are pure small talk (compared after normalization)
    pub small_talk: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_span_chars: 12,
            max_span_chars: 280,
            max_facts_per_turn: 5,
            include_assistant: true,
            skip_questions: true,
            small_talk: [
                "hello",
                "hi there",
                "hey there",
                "thanks",
                "thank you",
                "thank you so much",
                "thanks a lot",
                "you're welcome",
                "no problem",
                "sounds good",
                "got it",
                "okay",
                "sure thing",
                "goodbye",
                "have a nice day",
                "have a great day",
                "let me know if you need anything else",
                "happy to help",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Category of an extracted fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactKind {
    Preference,
    Identity,
    Decision,
    Reminder,
    KeyFact,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Preference => "preference",
            FactKind::Identity => "identity",
            FactKind::Decision => "decision",
            FactKind::Reminder => "reminder",
            FactKind::KeyFact => "key_fact",
        }
    }

    /// Tag recorded on persisted facts of this kind
    pub fn tag(&self) -> String {
        format!("fact:{}", self.as_str())
    }
}

impl std::fmt::Display for FactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of the turn a span came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    User,
    Assistant,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::User => "user",
            SpeakerRole::Assistant => "assistant",
        }
    }
}

/// A detector for one kind of fact
///
/// Triggers run in order and the first to fire claims the span.
pub trait FactTrigger: Send + Sync {
    fn kind(&self) -> FactKind;

    /// Returns the label of whatever fired, or `None`
    ///
    /// `lowered` is `span` lowercased with typographic apostrophes folded.
    fn fire(&self, span: &str, lowered: &str) -> Option<String>;
}

/// Fires when the span contains one of its phrases at a word start
#[derive(Debug, Clone)]
pub struct KeywordTrigger {
    kind: FactKind,
    phrases: Vec<String>,
}

impl KeywordTrigger {
    pub fn new<I, S>(kind: FactKind, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            kind,
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl FactTrigger for KeywordTrigger {
    fn kind(&self) -> FactKind {
        self.kind
    }

    fn fire(&self, _span: &str, lowered: &str) -> Option<String> {
        self.phrases
            .iter()
            .find(|phrase| contains_phrase(lowered, phrase))
            .cloned()
    }
}

/// Fires when every one of its patterns matches the span
#[derive(Debug, Clone)]
pub struct PatternTrigger {
    kind: FactKind,
    name: String,
    patterns: Vec<Regex>,
}

impl PatternTrigger {
    pub fn new(kind: FactKind, name: impl Into<String>, patterns: Vec<Regex>) -> Self {
        Self {
            kind,
            name: name.into(),
            patterns,
        }
    }
}

impl FactTrigger for PatternTrigger {
    fn kind(&self) -> FactKind {
        self.kind
    }

    fn fire(&self, span: &str, _lowered: &str) -> Option<String> {
        if !self.patterns.is_empty() && self.patterns.iter().all(|p| p.is_match(span)) {
            Some(self.name.clone())
        } else {
            None
        }
    }
}

// "X is/are Y" with a short subject
static COPULA_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?xi)
        ^(?:the\s+|our\s+|my\s+|your\s+)?
        [a-z][\w'-]*(?:\s+[\w'-]+){0,4}
        \s+(?:is|are|was|were|will\s+be)\s+\S",
    )
    .unwrap()
});

// A concrete detail: digit, day, month, time word, or a capitalized word mid-sentence
static SPECIFIC_DETAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        \d
        | \b(?i:monday|tuesday|wednesday|thursday|friday|saturday|sunday
              |january|february|april|june|july|august|september|october|november|december
              |noon|midnight|today|tonight|tomorrow)\b
        | \s[A-Z][a-z]+",
    )
    .unwrap()
});

/// The built-in trigger set, in priority order
pub fn default_triggers() -> Vec<Box<dyn FactTrigger>> {
    vec![
        Box::new(KeywordTrigger::new(
            FactKind::Preference,
            [
                "i prefer",
                "i like",
                "i love",
                "i hate",
                "i don't like",
                "my favorite",
                "always use",
                "never use",
            ],
        )),
        Box::new(KeywordTrigger::new(
            FactKind::Identity,
            [
                "my name is",
                "i am a",
                "i'm a",
                "i work",
                "i live",
                "our team",
                "we use",
            ],
        )),
        Box::new(KeywordTrigger::new(
            FactKind::Decision,
            [
                "we decided",
                "decided to",
                "let's use",
                "we'll go with",
                "from now on",
                "going forward",
            ],
        )),
        Box::new(KeywordTrigger::new(
            FactKind::Reminder,
            [
                "remember that",
                "don't forget",
                "note that",
                "important:",
                "deadline",
                "due on",
                "due by",
            ],
        )),
        Box::new(PatternTrigger::new(
            FactKind::KeyFact,
            "key_fact",
            vec![COPULA_PATTERN.clone(), SPECIFIC_DETAIL_PATTERN.clone()],
        )),
    ]
}

/// A span a trigger fired on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactCandidate {
    pub text: String,
    pub kind: FactKind,
    pub trigger: String,
    pub role: SpeakerRole,
}

/// Candidate facts in a turn, using the built-in triggers
pub fn extract_candidates(
    user_message: &str,
    assistant_reply: &str,
    config: &ExtractionConfig,
) -> Vec<FactCandidate> {
    extract_candidates_with(user_message, assistant_reply, config, &default_triggers())
}

/// Candidate facts in a turn
///
/// User spans come first, duplicates (after normalization) are dropped and
/// the result is capped at `max_facts_per_turn`.
pub fn extract_candidates_with(
    user_message: &str,
    assistant_reply: &str,
    config: &ExtractionConfig,
    triggers: &[Box<dyn FactTrigger>],
) -> Vec<FactCandidate> {
    let mut candidates = Vec::new();
    if !config.enabled || config.max_facts_per_turn == 0 {
        return candidates;
    }

    let mut seen = HashSet::new();
    let sides = [
        (SpeakerRole::User, user_message),
        (SpeakerRole::Assistant, assistant_reply),
    ];

    for (role, text) in sides {
        if role == SpeakerRole::Assistant && !config.include_assistant {
            continue;
        }

        for span in split_spans(text) {
            let length = span.chars().count();
            if length < config.min_span_chars || length > config.max_span_chars {
                continue;
            }
            if config.skip_questions && span.ends_with('?') {
                continue;
            }

            let normalized = normalize_span(span);
            if config.small_talk.iter().any(|s| s == &normalized) {
                continue;
            }

            let lowered = span.to_lowercase().replace('\u{2019}', "'");
            let Some((kind, trigger)) = triggers
                .iter()
                .find_map(|t| t.fire(span, &lowered).map(|label| (t.kind(), label)))
            else {
                continue;
            };

            if !seen.insert(normalized) {
                continue;
            }

            candidates.push(FactCandidate {
                text: span.to_string(),
                kind,
                trigger,
                role,
            });
            if candidates.len() >= config.max_facts_per_turn {
                return candidates;
            }
        }
    }

    candidates
}

/// Split text into trimmed sentence spans, dropping list bullets
fn split_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        let boundary = match c {
            '\n' | '\r' => true,
            '.' | '!' | '?' => chars.peek().map_or(true, |&(_, next)| next.is_whitespace()),
            _ => false,
        };
        if boundary {
            let end = i + c.len_utf8();
            spans.push(&text[start..end]);
            start = end;
        }
    }
    if start < text.len() {
        spans.push(&text[start..]);
    }

    spans
        .into_iter()
        .map(|s| s.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '*' | '\u{2022}')))
        .map(str::trim_end)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lowercase, collapse whitespace, strip trailing punctuation
fn normalize_span(span: &str) -> String {
    let lowered = span.to_lowercase().replace('\u{2019}', "'");
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .to_string()
}

/// Whether `phrase` occurs in `haystack` as whole words
///
/// A phrase ending in punctuation (`important:`) needs no boundary after it.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let open_ended = phrase.chars().next_back().map_or(true, |c| !c.is_alphanumeric());
    haystack.match_indices(phrase).any(|(i, _)| {
        let starts_word = haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let ends_word = open_ended
            || haystack[i + phrase.len()..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
        starts_word && ends_word
    })
}

/// A persisted fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub id: MemoryId,
    pub text: String,
    pub kind: FactKind,
    pub trigger: String,
    pub role: SpeakerRole,
    /// Whether the index picked the record up immediately
    pub indexed: bool,
}

/// Outcome of persisting a turn's facts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub created: Vec<ExtractedFact>,
    /// Candidate text and the reason it could not be stored
    pub failed: Vec<(String, String)>,
}

impl ExtractionReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.failed.is_empty()
    }
}

/// Persists and indexes facts detected in chat turns
pub struct FactExtractor {
    store: Arc<dyn MemoryStore>,
    index: Arc<CorpusIndex>,
    config: ExtractionConfig,
    triggers: Vec<Box<dyn FactTrigger>>,
}

impl FactExtractor {
    pub fn new(
        store: Arc<dyn MemoryStore>,
        index: Arc<CorpusIndex>,
        config: ExtractionConfig,
    ) -> Self {
        Self {
            store,
            index,
            config,
            triggers: default_triggers(),
        }
    }

    /// Replace the trigger set
    pub fn with_triggers(mut self, triggers: Vec<Box<dyn FactTrigger>>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn candidates(&self, user_message: &str, assistant_reply: &str) -> Vec<FactCandidate> {
        extract_candidates_with(user_message, assistant_reply, &self.config, &self.triggers)
    }

    /// Detect facts in a turn, store each as a conversation-scoped memory and
    /// index it
    ///
    /// Per-record failures are collected in the report; an error is returned
    /// only when every candidate failed.
    #[instrument(skip(self, user_message, assistant_reply))]
    pub fn extract(
        &self,
        user_message: &str,
        assistant_reply: &str,
        conversation_id: &str,
        model_label: &str,
    ) -> Result<ExtractionReport> {
        let candidates = self.candidates(user_message, assistant_reply);
        let mut report = ExtractionReport::default();
        if candidates.is_empty() {
            debug!("No facts detected in turn");
            return Ok(report);
        }

        let mut first_error: Option<ChimeraError> = None;
        for candidate in candidates {
            let input = NewMemory::new(candidate.text.clone(), conversation_id)
                .with_scope(MemoryScope::Conversation)
                .with_tags([
                    AUTO_EXTRACTED_TAG.to_string(),
                    candidate.kind.tag(),
                    format!("from:{}", candidate.role.as_str()),
                ])
                .with_metadata("source", AUTO_EXTRACT_SOURCE)
                .with_metadata("model_used", model_label)
                .with_metadata("trigger", candidate.trigger.clone())
                .with_metadata("role", candidate.role.as_str());

            match self.store.create(input) {
                Ok(record) => {
                    let indexed = self.index.add_persisted(&record);
                    report.created.push(ExtractedFact {
                        id: record.id,
                        text: candidate.text,
                        kind: candidate.kind,
                        trigger: candidate.trigger,
                        role: candidate.role,
                        indexed,
                    });
                }
                Err(e) => {
                    warn!(error = %e, kind = %candidate.kind, "Failed to store extracted fact");
                    report.failed.push((candidate.text, e.to_string()));
                    first_error.get_or_insert(e);
                }
            }
        }

        if report.created.is_empty() {
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        debug!(
            created = report.created.len(),
            failed = report.failed.len(),
            "Extracted facts from turn"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::TfIdfVectorizer;
    use crate::storage::SqliteStore;
    use crate::types::{ConversationMemoryStats, MemoryPage, MemoryRecord, MetadataValue};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Store wrapper whose `create` fails on one chosen call (1-based)
    struct FailingNthStore {
        inner: SqliteStore,
        calls: AtomicUsize,
        fail_on: usize,
    }

    impl MemoryStore for FailingNthStore {
        fn list_all(&self) -> Result<Vec<MemoryRecord>> {
            self.inner.list_all()
        }
        fn list_by_conversation_or_global(&self, c: &str) -> Result<Vec<MemoryRecord>> {
            self.inner.list_by_conversation_or_global(c)
        }
        fn create(&self, input: NewMemory) -> Result<MemoryRecord> {
            if self.calls.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
                return Err(ChimeraError::StoreUnavailable("disk full".into()));
            }
            self.inner.create(input)
        }
        fn delete(&self, id: MemoryId) -> Result<()> {
            self.inner.delete(id)
        }
        fn delete_by_conversation(&self, c: &str) -> Result<usize> {
            self.inner.delete_by_conversation(c)
        }
        fn get(&self, id: MemoryId) -> Result<MemoryRecord> {
            self.inner.get(id)
        }
        fn count(&self) -> Result<usize> {
            self.inner.count()
        }
        fn list_by_conversation(&self, c: &str, l: usize, o: usize) -> Result<MemoryPage> {
            self.inner.list_by_conversation(c, l, o)
        }
        fn conversation_stats(&self, c: &str) -> Result<ConversationMemoryStats> {
            self.inner.conversation_stats(c)
        }
    }

    fn extract(user: &str, assistant: &str) -> Vec<FactCandidate> {
        extract_candidates(user, assistant, &ExtractionConfig::default())
    }

    #[test]
    fn test_preference_detected() {
        let candidates = extract("I prefer dark mode in every editor.", "");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].kind, FactKind::Preference);
        assert_eq!(candidates[0].trigger, "i prefer");
        assert_eq!(candidates[0].role, SpeakerRole::User);
        assert_eq!(candidates[0].text, "I prefer dark mode in every editor.");
    }

    #[test]
    fn test_each_kind() {
        let user = "My name is Dana and I run the platform team. \
                    We decided to ship on Tuesdays. \
                    Don't forget the audit deadline next month. \
                    The standup is at 9am.";
        let kinds: Vec<_> = extract(user, "").iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FactKind::Identity,
                FactKind::Decision,
                FactKind::Reminder,
                FactKind::KeyFact
            ]
        );
    }

    #[test]
    fn test_no_trigger_is_empty() {
        assert!(extract("Can you summarize this article for me", "Sure thing.").is_empty());
        assert!(extract("", "").is_empty());
        assert!(extract("thanks", "You're welcome!").is_empty());
    }

    #[test]
    fn test_questions_and_short_spans_skipped() {
        assert!(extract("What is the deadline for the report?", "").is_empty());
        assert!(extract("I like it.", "").is_empty());
    }

    #[test]
    fn test_phrase_needs_whole_words() {
        // "wifi works" contains "i work" mid-word
        assert!(extract("The wifi works fine upstairs now", "").is_empty());
        assert!(extract("I am almost done with the quarterly report", "").is_empty());
        assert!(extract("I likely forgot where the keys went", "").is_empty());
    }

    #[test]
    fn test_punctuated_phrase_needs_no_trailing_boundary() {
        let candidates = extract("Important:backups must run before the migration", "");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].trigger, "important:");

        assert!(contains_phrase("i like tea", "i like"));
        assert!(contains_phrase("i like", "i like"));
        assert!(!contains_phrase("i likely do", "i like"));
        assert!(!contains_phrase("wifi like", "i like"));
    }

    #[test]
    fn test_user_first_and_deduplicated() {
        let candidates = extract(
            "We use Postgres for everything.",
            "We use postgres for everything! Going forward I will suggest SQL examples.",
        );
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].role, SpeakerRole::User);
        assert_eq!(candidates[1].kind, FactKind::Decision);
        assert_eq!(candidates[1].role, SpeakerRole::Assistant);
    }

    #[test]
    fn test_assistant_excluded_when_disabled() {
        let config = ExtractionConfig {
            include_assistant: false,
            ..Default::default()
        };
        let candidates = extract_candidates("", "From now on I will answer in French.", &config);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_capped_per_turn() {
        let config = ExtractionConfig {
            max_facts_per_turn: 2,
            ..Default::default()
        };
        let user = "I prefer tea over coffee.\nI love long walks outside.\nI hate cold weather a lot.";
        assert_eq!(extract_candidates(user, "", &config).len(), 2);
    }

    #[test]
    fn test_bullets_are_spans() {
        let reply = "Here is the plan:\n- Let's use Redis for caching\n- The launch is on March 3rd";
        let candidates = extract("", reply);
        let texts: Vec<_> = candidates.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["Let's use Redis for caching", "The launch is on March 3rd"]
        );
    }

    #[test]
    fn test_custom_trigger_set() {
        let triggers: Vec<Box<dyn FactTrigger>> = vec![Box::new(KeywordTrigger::new(
            FactKind::Reminder,
            ["ticket"],
        ))];
        let candidates = extract_candidates_with(
            "Ticket OPS-12 tracks the migration work",
            "",
            &ExtractionConfig::default(),
            &triggers,
        );
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].trigger, "ticket");
    }

    fn extractor() -> (Arc<SqliteStore>, Arc<CorpusIndex>, FactExtractor) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let index = Arc::new(CorpusIndex::new(
            store.clone(),
            Box::new(TfIdfVectorizer::new(100)),
        ));
        let extractor = FactExtractor::new(store.clone(), index.clone(), ExtractionConfig::default());
        (store, index, extractor)
    }

    #[test]
    fn test_extract_persists_and_indexes() {
        let (store, index, extractor) = extractor();
        store
            .create(NewMemory::new("seed memory about editors and themes", "A"))
            .unwrap();
        index.rebuild().unwrap();

        let report = extractor
            .extract("I prefer dark mode in the editor.", "", "A", "gpt-test")
            .unwrap();
        assert_eq!(report.created.len(), 1);
        assert!(report.failed.is_empty());

        let fact = &report.created[0];
        assert!(fact.indexed);
        assert!(index.contains(fact.id));

        let record = store.get(fact.id).unwrap();
        assert_eq!(record.scope, MemoryScope::Conversation);
        assert_eq!(
            record.tags,
            vec!["auto-extracted", "fact:preference", "from:user"]
        );
        assert_eq!(
            record.metadata.get("source"),
            Some(&MetadataValue::String("auto_extract".to_string()))
        );
        assert_eq!(
            record.metadata.get("model_used"),
            Some(&MetadataValue::String("gpt-test".to_string()))
        );
    }

    #[test]
    fn test_extract_without_trigger_writes_nothing() {
        let (store, _index, extractor) = extractor();
        let report = extractor
            .extract("Can you summarize this for me", "Sure thing.", "A", "m")
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_extract_all_failed_errors() {
        let (store, _index, extractor) = extractor();
        let result = extractor.extract("I prefer dark mode in the editor.", "", "   ", "m");
        assert!(matches!(result, Err(ChimeraError::Validation(_))));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_extract_partial_failure_continues() {
        let store = Arc::new(FailingNthStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            calls: AtomicUsize::new(0),
            fail_on: 2,
        });
        let index = Arc::new(CorpusIndex::new(
            store.clone(),
            Box::new(TfIdfVectorizer::new(100)),
        ));
        let extractor = FactExtractor::new(store.clone(), index, ExtractionConfig::default());

        let user = "I prefer tea over coffee.\nI love long walks outside.\nI hate cold weather a lot.";
        let report = extractor.extract(user, "", "A", "m").unwrap();

        let created: Vec<_> = report.created.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(
            created,
            vec!["I prefer tea over coffee.", "I hate cold weather a lot."]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "I love long walks outside.");
        assert!(report.failed[0].1.contains("disk full"));
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_extract_before_fit_defers_indexing() {
        let (_store, index, extractor) = extractor();
        let report = extractor
            .extract("Remember that the demo moved to Thursday.", "", "A", "m")
            .unwrap();
        assert_eq!(report.created.len(), 1);
        assert!(!report.created[0].indexed);
        assert!(index.is_empty());
    }
}
