//! The companion: inbound chat handling, commands and greetings, wired to
//! the same conversation the autonomy cycle settles.

use std::sync::Arc;

use ambient_core::{Clock, CompletionService, DocumentName, Messenger, SessionId, UserId};
use ambient_settings::TelegramSettings;
use ambient_store::MemoryStore;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::autonomy::{AutonomyDeps, AutonomyEngine};
use crate::config::EngineConfig;
use crate::conversation::Conversation;
use crate::error::EngineError;
use crate::prompts;
use crate::synthesizer::MemorySynthesizer;

/// Sent when a reply could not be composed.
pub const FALLBACK_REPLY: &str = "I'm having trouble thinking right now. Give me a moment and try again.";

const PREVIEW_LINES: usize = 5;

/// Which users may talk to the companion. An empty list allows everyone.
#[derive(Clone, Debug, Default)]
pub struct AccessPolicy {
    allowed: Vec<UserId>,
}

impl AccessPolicy {
    pub fn new(allowed: Vec<UserId>) -> Self {
        Self { allowed }
    }

    pub fn is_allowed(&self, user_id: UserId) -> bool {
        self.allowed.is_empty() || self.allowed.contains(&user_id)
    }

    /// Recipient of proactive messages.
    pub fn primary(&self) -> Option<UserId> {
        self.allowed.first().copied()
    }

    pub fn users(&self) -> &[UserId] {
        &self.allowed
    }
}

impl From<&TelegramSettings> for AccessPolicy {
    fn from(t: &TelegramSettings) -> Self {
        Self::new(t.allowed_user_ids.clone())
    }
}

pub struct CompanionDeps {
    pub completion: Arc<dyn CompletionService>,
    pub store: MemoryStore,
    pub messenger: Arc<dyn Messenger>,
    pub clock: Arc<dyn Clock>,
}

pub struct Companion {
    conversation: Arc<Conversation>,
    autonomy: Arc<AutonomyEngine>,
    completion: Arc<dyn CompletionService>,
    store: MemoryStore,
    messenger: Arc<dyn Messenger>,
    clock: Arc<dyn Clock>,
    access: AccessPolicy,
    synthesis_tasks: TaskTracker,
}

impl Companion {
    pub fn new(deps: CompanionDeps, config: EngineConfig, access: AccessPolicy) -> Result<Self, EngineError> {
        let synthesizer = MemorySynthesizer::new(
            deps.completion.clone(),
            deps.store.clone(),
            deps.clock.clone(),
            config.synthesis,
        );
        let conversation = Arc::new(Conversation::new(config.session, synthesizer, deps.clock.clone()));
        let autonomy = Arc::new(AutonomyEngine::new(
            AutonomyDeps {
                conversation: conversation.clone(),
                completion: deps.completion.clone(),
                store: deps.store.clone(),
                messenger: deps.messenger.clone(),
                clock: deps.clock.clone(),
            },
            config.gate,
            config.autonomy,
            access.primary(),
        )?);

        Ok(Self {
            conversation,
            autonomy,
            completion: deps.completion,
            store: deps.store,
            messenger: deps.messenger,
            clock: deps.clock,
            access,
            synthesis_tasks: TaskTracker::new(),
        })
    }

    pub fn autonomy(&self) -> Arc<AutonomyEngine> {
        self.autonomy.clone()
    }

    pub fn conversation(&self) -> &Arc<Conversation> {
        &self.conversation
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    /// Handle one inbound message and return the reply to send, if any.
    ///
    /// Messages from users outside the allow-list get no reply. Sessions the
    /// message closed are synthesized in the background; see
    /// [`Companion::wait_for_synthesis`].
    pub async fn handle_inbound(&self, user_id: UserId, text: &str) -> Result<Option<String>, EngineError> {
        if !self.access.is_allowed(user_id) {
            debug!(user_id, "ignoring message from user outside the allow-list");
            return Ok(None);
        }

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        match text {
            "/start" => return self.greeting().await.map(Some),
            "/memory" => return self.memory_preview().map(Some),
            "/forget" => {
                let reply = match self.forget().await {
                    Some(_) => "Forgot our current conversation.",
                    None => "There's no conversation in progress.",
                };
                return Ok(Some(reply.to_string()));
            }
            _ => {}
        }

        let mut inbound = self.conversation.receive(text).await?;
        let reply = match self.compose_reply(&inbound.context).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    session_id = %inbound.session_id,
                    error = %e,
                    error_kind = e.kind(),
                    "reply failed, sending fallback"
                );
                FALLBACK_REPLY.to_string()
            }
        };

        if inbound.closed_by_count {
            if let Some(turn) = inbound.context.turns.get_mut(inbound.turn_index) {
                turn.reply = Some(reply.clone());
            }
        } else {
            self.conversation
                .attach_reply(&inbound.session_id, inbound.turn_index, &reply)
                .await;
        }

        let closed = inbound.into_closed();
        if !closed.is_empty() {
            let conversation = self.conversation.clone();
            self.synthesis_tasks.spawn(async move {
                // Failures are logged and kept for retry by the conversation.
                let _ = conversation.hand_off(closed).await;
            });
        }
        Ok(Some(reply))
    }

    async fn compose_reply(&self, live: &ambient_core::Transcript) -> Result<String, EngineError> {
        let snapshot = self.store.read_all()?;
        let request = prompts::reply(&snapshot, live, self.clock.now());
        let text = self.completion.complete(&request).await?;
        Ok(text.trim().to_string())
    }

    /// Wait for background synthesis started by [`Companion::handle_inbound`].
    pub async fn wait_for_synthesis(&self) {
        self.synthesis_tasks.close();
        self.synthesis_tasks.wait().await;
        self.synthesis_tasks.reopen();
    }

    /// Drop the live session without synthesizing it.
    pub async fn forget(&self) -> Option<SessionId> {
        let forgotten = self.conversation.forget().await;
        if let Some(id) = &forgotten {
            info!(session_id = %id, "session forgotten without synthesis");
        }
        forgotten
    }

    /// Plain-text preview of every memory document.
    pub fn memory_preview(&self) -> Result<String, EngineError> {
        let snapshot = self.store.read_all()?;
        let sections: Vec<String> = DocumentName::ALL
            .iter()
            .map(|name| preview_document(name.file_name(), snapshot.get(*name)))
            .collect();
        Ok(sections.join("\n\n"))
    }

    pub async fn greeting(&self) -> Result<String, EngineError> {
        let snapshot = self.store.read_all()?;
        let request = prompts::greeting(&snapshot, self.clock.now());
        let text = self.completion.complete(&request).await?;
        Ok(text.trim().to_string())
    }

    /// Greet every allow-listed user. Returns how many greetings went out.
    pub async fn startup_greeting(&self) -> usize {
        if self.access.users().is_empty() {
            info!("no allow-listed users, skipping startup greeting");
            return 0;
        }
        let text = match self.greeting().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, error_kind = e.kind(), "startup greeting failed");
                return 0;
            }
        };
        let mut sent = 0;
        for &user_id in self.access.users() {
            match self.messenger.send(user_id, &text).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(user_id, error = %e, "startup greeting not delivered"),
            }
        }
        info!(sent, "startup greeting sent");
        sent
    }
}

fn preview_document(file_name: &str, content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = format!("{file_name} ({} chars)", content.chars().count());
    for line in lines.iter().take(PREVIEW_LINES) {
        out.push('\n');
        out.push_str(line);
    }
    if lines.len() > PREVIEW_LINES {
        out.push_str(&format!("\n... ({} more lines)", lines.len() - PREVIEW_LINES));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::testing::RecordingMessenger;
    use ambient_core::{CompletionError, ManualClock, ModelTier};
    use ambient_llm::mock::{MockCompletion, MockReply};
    use chrono::{TimeZone, Utc};

    fn companion(replies: Vec<MockReply>, allowed: Vec<UserId>) -> (Arc<MockCompletion>, Arc<RecordingMessenger>, Companion) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 10, 14, 0, 0).unwrap()));
        let mock = Arc::new(MockCompletion::new(replies));
        let messenger = Arc::new(RecordingMessenger::default());
        let store = MemoryStore::in_memory(clock.now()).unwrap();
        let config = EngineConfig {
            session: SessionConfig {
                message_threshold: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let companion = Companion::new(
            CompanionDeps {
                completion: mock.clone(),
                store,
                messenger: messenger.clone(),
                clock,
            },
            config,
            AccessPolicy::new(allowed),
        )
        .unwrap();
        (mock, messenger, companion)
    }

    #[test]
    fn access_policy() {
        let open = AccessPolicy::default();
        assert!(open.is_allowed(1));
        assert_eq!(open.primary(), None);

        let closed = AccessPolicy::new(vec![5, 6]);
        assert!(!closed.is_allowed(1));
        assert_eq!(closed.primary(), Some(5));
    }

    #[tokio::test]
    async fn disallowed_user_is_ignored() {
        let (mock, _, companion) = companion(vec![], vec![7]);
        assert_eq!(companion.handle_inbound(8, "hello").await.unwrap(), None);
        assert_eq!(mock.call_count(), 0);
        assert!(companion.conversation().live().await.is_none());
    }

    #[tokio::test]
    async fn reply_is_attached_to_live_turn() {
        let (mock, _, companion) = companion(vec![MockReply::text("  Hey! How was the hike?  ")], vec![]);
        let reply = companion.handle_inbound(1, "back from the hike").await.unwrap();
        assert_eq!(reply.as_deref(), Some("Hey! How was the hike?"));
        assert_eq!(mock.tiers(), vec![ModelTier::Quality]);

        let live = companion.conversation().live().await.unwrap();
        assert_eq!(live.turns[0].reply.as_deref(), Some("Hey! How was the hike?"));
    }

    #[tokio::test]
    async fn completion_failure_falls_back() {
        let (_, _, companion) = companion(vec![MockReply::Error(CompletionError::Overloaded)], vec![]);
        let reply = companion.handle_inbound(1, "are you there?").await.unwrap();
        assert_eq!(reply.as_deref(), Some(FALLBACK_REPLY));
    }

    #[tokio::test]
    async fn closing_message_reply_reaches_synthesis() {
        let (mock, _, companion) = companion(
            vec![
                MockReply::text("nice"),
                MockReply::text("good luck!"),
                MockReply::text(r#"{"updates": {"queue.md": "- ask how the exam went"}}"#),
            ],
            vec![],
        );
        companion.handle_inbound(1, "studying today").await.unwrap();
        companion.handle_inbound(1, "exam tomorrow").await.unwrap();
        companion.wait_for_synthesis().await;

        assert_eq!(mock.call_count(), 3);
        let synthesis_prompt = &mock.requests()[2].prompt;
        assert!(synthesis_prompt.contains("Companion: good luck!"));
        assert_eq!(companion.store().read(DocumentName::Queue).unwrap(), "- ask how the exam went");
    }

    #[tokio::test]
    async fn forget_discards_without_synthesis() {
        let (mock, _, companion) = companion(vec![MockReply::text("ok")], vec![]);
        companion.handle_inbound(1, "something private").await.unwrap();
        let reply = companion.handle_inbound(1, "/forget").await.unwrap().unwrap();
        assert!(reply.starts_with("Forgot"));
        assert!(companion.conversation().live().await.is_none());
        companion.conversation().settle().await.unwrap();
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn memory_command_previews_documents() {
        let (mock, _, companion) = companion(vec![], vec![]);
        let preview = companion.handle_inbound(1, "/memory").await.unwrap().unwrap();
        assert!(preview.starts_with("identity.md ("));
        assert!(preview.contains("queue.md ("));
        assert!(preview.contains("more lines)"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn startup_greeting_goes_to_every_allowed_user() {
        let (_, messenger, companion) = companion(vec![MockReply::text("Morning!")], vec![3, 4]);
        assert_eq!(companion.startup_greeting().await, 2);
        assert_eq!(messenger.sent(), vec![(3, "Morning!".to_string()), (4, "Morning!".to_string())]);
    }

    #[test]
    fn preview_truncates_long_documents() {
        let preview = preview_document("queue.md", "a\nb\nc\nd\ne\nf\ng");
        assert_eq!(preview, "queue.md (13 chars)\na\nb\nc\nd\ne\n... (2 more lines)");
        assert_eq!(preview_document("x.md", "one"), "x.md (3 chars)\none");
    }
}
