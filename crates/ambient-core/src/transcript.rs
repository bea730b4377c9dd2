use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::SessionId;

/// One inbound user message and, once composed, the companion's reply.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub at: DateTime<Utc>,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
}

impl Turn {
    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            at,
            text: text.into(),
            reply: None,
        }
    }
}

/// The ordered turns of a closed (or live) session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: SessionId,
    pub started_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

impl Transcript {
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Plain-text rendering used in prompts.
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.turns.len() * 2);
        for turn in &self.turns {
            lines.push(format!("User: {}", turn.text));
            if let Some(reply) = &turn.reply {
                lines.push(format!("Companion: {reply}"));
            }
        }
        lines.join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn render_interleaves_replies() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut first = Turn::user("hi", at);
        first.reply = Some("hello!".into());
        let transcript = Transcript {
            session_id: SessionId::from_raw("sess_t"),
            started_at: at,
            turns: vec![first, Turn::user("still there?", at)],
        };

        assert_eq!(transcript.len(), 2);
        assert_eq!(
            transcript.render(),
            "User: hi\n\nCompanion: hello!\n\nUser: still there?"
        );
    }
}
