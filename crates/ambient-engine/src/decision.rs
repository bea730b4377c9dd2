//! The think step's verdict.

use serde::Deserialize;

use ambient_core::CompletionError;

use crate::json;

/// What the cycle should do after thinking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThinkDecision {
    /// Compose a proactive message (subject to the gate).
    Message { reason: String },
    /// Update notes only.
    JournalOnly,
    Noop,
}

impl ThinkDecision {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::JournalOnly => "journal_only",
            Self::Noop => "noop",
        }
    }
}

/// Parsed think response: the decision plus any note updates that came with it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThinkOutcome {
    pub decision: ThinkDecision,
    pub rationale: String,
    pub journal_entry: Option<String>,
    /// Full replacement content for the queue document.
    pub queue_update: Option<String>,
    /// Full replacement content for the active-threads document.
    pub threads_update: Option<String>,
}

impl ThinkOutcome {
    pub fn has_note_updates(&self) -> bool {
        self.journal_entry.is_some() || self.queue_update.is_some() || self.threads_update.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct RawThink {
    #[serde(default)]
    decision: Option<String>,
    /// Older boolean shape.
    #[serde(default)]
    should_message: Option<bool>,
    #[serde(default, alias = "reasoning")]
    rationale: Option<String>,
    #[serde(default)]
    message_reason: Option<String>,
    #[serde(default)]
    journal_entry: Option<String>,
    #[serde(default, alias = "queue_updates")]
    queue_update: Option<String>,
    #[serde(default, alias = "threads_updates")]
    threads_update: Option<String>,
}

fn non_blank(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse a think completion. Anything unparseable is a failure, so the cycle
/// takes no action on it.
pub fn parse_think(text: &str) -> Result<ThinkOutcome, CompletionError> {
    let raw: RawThink = json::parse_embedded(text)?;

    let journal_entry = non_blank(raw.journal_entry);
    let queue_update = non_blank(raw.queue_update);
    let threads_update = non_blank(raw.threads_update);
    let message_reason = non_blank(raw.message_reason);
    let has_notes = journal_entry.is_some() || queue_update.is_some() || threads_update.is_some();

    let decision = match (raw.decision.as_deref().map(str::trim), raw.should_message) {
        (Some("message"), _) => ThinkDecision::Message {
            reason: message_reason.unwrap_or_else(|| "autonomy cycle".into()),
        },
        (Some("journal_only"), _) => ThinkDecision::JournalOnly,
        (Some("noop"), _) => ThinkDecision::Noop,
        (Some(other), _) => {
            return Err(CompletionError::MalformedResponse(format!(
                "unknown think decision: {other}"
            )))
        }
        (None, Some(true)) => ThinkDecision::Message {
            reason: message_reason.unwrap_or_else(|| "autonomy cycle".into()),
        },
        (None, Some(false)) if has_notes => ThinkDecision::JournalOnly,
        (None, Some(false)) => ThinkDecision::Noop,
        (None, None) => {
            return Err(CompletionError::MalformedResponse(
                "think response has neither decision nor should_message".into(),
            ))
        }
    };

    Ok(ThinkOutcome {
        decision,
        rationale: non_blank(raw.rationale).unwrap_or_default(),
        journal_entry,
        queue_update,
        threads_update,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_decisions() {
        let out = parse_think(
            r#"{"decision": "message", "rationale": "deadline tomorrow", "message_reason": "check on the talk"}"#,
        )
        .unwrap();
        assert_eq!(
            out.decision,
            ThinkDecision::Message {
                reason: "check on the talk".into()
            }
        );
        assert_eq!(out.rationale, "deadline tomorrow");

        let out = parse_think(
            "```json\n{\"decision\": \"journal_only\", \"journal_entry\": \"quiet day\", \"queue_update\": \"# Queue\"}\n```",
        )
        .unwrap();
        assert_eq!(out.decision, ThinkDecision::JournalOnly);
        assert_eq!(out.journal_entry.as_deref(), Some("quiet day"));
        assert_eq!(out.queue_update.as_deref(), Some("# Queue"));

        let out = parse_think(r#"{"decision": "noop"}"#).unwrap();
        assert_eq!(out.decision, ThinkDecision::Noop);
        assert!(!out.has_note_updates());
    }

    #[test]
    fn legacy_boolean_shape() {
        let out = parse_think(
            r#"{"should_message": true, "message_reason": null, "journal_entry": null, "queue_updates": null, "reasoning": "been a while"}"#,
        )
        .unwrap();
        assert_eq!(
            out.decision,
            ThinkDecision::Message {
                reason: "autonomy cycle".into()
            }
        );
        assert_eq!(out.rationale, "been a while");

        let out = parse_think(r#"{"should_message": false, "journal_entry": "noted"}"#).unwrap();
        assert_eq!(out.decision, ThinkDecision::JournalOnly);

        let out = parse_think(r#"{"should_message": false, "journal_entry": "  "}"#).unwrap();
        assert_eq!(out.decision, ThinkDecision::Noop);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_think("I think we should message").is_err());
        assert!(parse_think(r#"{"decision": "shout"}"#).is_err());
        assert!(parse_think(r#"{"rationale": "?"}"#).is_err());
    }
}
