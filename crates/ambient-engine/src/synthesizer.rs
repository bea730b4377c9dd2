//! Memory Synthesizer: folds a closed session's transcript into the memory
//! documents as one all-or-nothing batch.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ambient_core::{Clock, CompletionService, DocumentName, MemorySnapshot, Transcript};
use ambient_store::MemoryStore;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::config::SynthesisConfig;
use crate::error::EngineError;
use crate::{json, prompts};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SynthesisOutcome {
    pub updated: Vec<DocumentName>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSynthesis {
    #[serde(default)]
    updates: HashMap<String, Option<String>>,
    #[serde(default)]
    reasoning: Option<String>,
}

/// Turn a synthesis completion into the documents to replace.
///
/// Identity is never written and unknown keys are ignored. Null or blank
/// contents mean "unchanged".
pub fn parse_updates(text: &str) -> Result<(BTreeMap<DocumentName, String>, Option<String>), EngineError> {
    let raw: RawSynthesis = json::parse_embedded(text)?;
    let mut updates = BTreeMap::new();
    for (key, content) in raw.updates {
        let Ok(name) = key.parse::<DocumentName>() else {
            debug!(document = %key, "ignoring update for unknown document");
            continue;
        };
        if name == DocumentName::Identity {
            warn!(document = %name, "synthesis proposed an identity rewrite, dropping it");
            continue;
        }
        match content {
            Some(c) if !c.trim().is_empty() => {
                updates.insert(name, c);
            }
            _ => {}
        }
    }
    Ok((updates, raw.reasoning))
}

pub struct MemorySynthesizer {
    completion: Arc<dyn CompletionService>,
    store: MemoryStore,
    clock: Arc<dyn Clock>,
    config: SynthesisConfig,
}

impl MemorySynthesizer {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        store: MemoryStore,
        clock: Arc<dyn Clock>,
        config: SynthesisConfig,
    ) -> Self {
        Self {
            completion,
            store,
            clock,
            config,
        }
    }

    /// Compute updated contents for `current` from `transcript` without writing.
    pub async fn plan(
        &self,
        transcript: &Transcript,
        current: &MemorySnapshot,
    ) -> Result<(BTreeMap<DocumentName, String>, Option<String>), EngineError> {
        let request = prompts::synthesis(
            self.config.tier,
            current,
            transcript,
            self.clock.now(),
            self.config.summary_window_days,
        );
        let text = self.completion.complete(&request).await?;
        parse_updates(&text)
    }

    /// Read every document, ask for updates, and commit them atomically.
    /// On any failure nothing is written.
    #[instrument(skip_all, fields(session_id = %transcript.session_id, turns = transcript.len()))]
    pub async fn synthesize(&self, transcript: &Transcript) -> Result<SynthesisOutcome, EngineError> {
        if transcript.is_empty() {
            return Ok(SynthesisOutcome::default());
        }

        let current = self.store.read_all()?;
        let (updates, reasoning) = self.plan(transcript, &current).await?;

        // Skip rewrites that would not change anything.
        let updates: BTreeMap<_, _> = updates
            .into_iter()
            .filter(|(name, content)| current.get(*name) != content.as_str())
            .collect();

        if updates.is_empty() {
            info!(reasoning = reasoning.as_deref().unwrap_or(""), "synthesis found nothing to update");
            return Ok(SynthesisOutcome {
                updated: Vec::new(),
                reasoning,
            });
        }

        self.store.replace_batch(&updates, self.clock.now())?;
        let updated: Vec<_> = updates.into_keys().collect();
        info!(documents = ?updated, "memory synthesized");
        Ok(SynthesisOutcome { updated, reasoning })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ambient_core::{CompletionError, ManualClock, SessionId, Turn};
    use ambient_llm::mock::{MockCompletion, MockReply};
    use chrono::{TimeZone, Utc};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 2, 1, 18, 0, 0).unwrap()))
    }

    fn transcript() -> Transcript {
        let at = Utc.with_ymd_and_hms(2024, 2, 1, 17, 40, 0).unwrap();
        Transcript {
            session_id: SessionId::new(),
            started_at: at,
            turns: vec![Turn::user("my sister's wedding is in May", at)],
        }
    }

    fn synthesizer(mock: Arc<MockCompletion>, store: MemoryStore) -> MemorySynthesizer {
        MemorySynthesizer::new(mock, store, clock(), SynthesisConfig::default())
    }

    #[test]
    fn parse_drops_identity_and_unknown_keys() {
        let (updates, reasoning) = parse_updates(
            r#"```json
            {"updates": {"identity.md": "I am new", "user_context.md": "Has a sister.",
                         "diary.md": "x", "queue.md": null, "active_threads": ""},
             "reasoning": "family"}
            ```"#,
        )
        .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[&DocumentName::UserContext], "Has a sister.");
        assert_eq!(reasoning.as_deref(), Some("family"));
    }

    #[tokio::test]
    async fn applies_updates_in_one_batch() {
        let store = MemoryStore::in_memory(clock().now()).unwrap();
        let mock = Arc::new(MockCompletion::new(vec![MockReply::text(
            r#"{"updates": {"user_context.md": "Sister's wedding in May.", "queue.md": "- ask about the wedding"}, "reasoning": "r"}"#,
        )]));
        let outcome = synthesizer(mock.clone(), store.clone())
            .synthesize(&transcript())
            .await
            .unwrap();

        assert_eq!(outcome.updated, vec![DocumentName::UserContext, DocumentName::Queue]);
        assert_eq!(store.read(DocumentName::UserContext).unwrap(), "Sister's wedding in May.");
        assert_eq!(store.read(DocumentName::Queue).unwrap(), "- ask about the wedding");
        assert!(mock.requests()[0].prompt.contains("my sister's wedding is in May"));
    }

    #[tokio::test]
    async fn completion_failure_leaves_memory_untouched() {
        let store = MemoryStore::in_memory(clock().now()).unwrap();
        let before = store.read_all().unwrap();
        let mock = Arc::new(MockCompletion::new(vec![MockReply::Error(CompletionError::Timeout(
            std::time::Duration::from_secs(60),
        ))]));

        let err = synthesizer(mock, store.clone()).synthesize(&transcript()).await.unwrap_err();
        assert!(matches!(err, EngineError::Completion(CompletionError::Timeout(_))));
        assert_eq!(store.read_all().unwrap(), before);
    }

    #[tokio::test]
    async fn malformed_response_writes_nothing() {
        let store = MemoryStore::in_memory(clock().now()).unwrap();
        let before = store.read_all().unwrap();
        let mock = Arc::new(MockCompletion::new(vec![MockReply::text("Sure, I updated the files!")]));

        let err = synthesizer(mock, store.clone()).synthesize(&transcript()).await.unwrap_err();
        assert!(matches!(err, EngineError::Completion(CompletionError::MalformedResponse(_))));
        assert_eq!(store.read_all().unwrap(), before);
    }

    #[tokio::test]
    async fn empty_transcript_skips_completion() {
        let store = MemoryStore::in_memory(clock().now()).unwrap();
        let mock = Arc::new(MockCompletion::new(vec![]));
        let mut empty = transcript();
        empty.turns.clear();

        let outcome = synthesizer(mock.clone(), store).synthesize(&empty).await.unwrap();
        assert!(outcome.updated.is_empty());
        assert_eq!(mock.call_count(), 0);
    }
}
