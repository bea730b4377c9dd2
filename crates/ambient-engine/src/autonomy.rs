//! Autonomy Cycle Engine.
//!
//! One cycle runs four steps in order:
//! 1. **Timeout check**: close an idle session and synthesize it first
//! 2. **Think**: cheap-tier decision over the lightweight context
//! 3. **Act**: `journal_only` writes notes; `message` composes on the
//!    quality tier and asks the [`ProactiveGate`] before dispatch
//! 4. **Finish**: `last_cycle_at` is stamped no matter how the cycle went
//!
//! Think and act run under the conversation's memory lock, so a synthesis
//! started meanwhile waits and then reads what the cycle wrote.
//!
//! A failure in any step is logged and ends that step's branch. The cycle
//! itself never fails; the next tick is the retry.

use std::sync::Arc;

use ambient_core::{Clock, CompletionService, CycleId, DocumentName, Messenger, UserId};
use ambient_store::{AutonomyState, MemoryBatch, MemoryStore};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::{AutonomyConfig, GateConfig};
use crate::conversation::Conversation;
use crate::decision::{parse_think, ThinkDecision, ThinkOutcome};
use crate::error::EngineError;
use crate::gate::{effective_count, DenyReason, GateInput, GateVerdict, ProactiveGate};
use crate::prompts;

/// What a cycle ended up doing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleAction {
    Noop,
    Journaled,
    Sent { user_id: UserId },
    /// Gate denied; the composed message was kept in the queue and journal.
    Deferred(DenyReason),
    /// Gate denied; the composed message was dropped.
    Discarded(DenyReason),
    /// Gate allowed but nobody is configured to receive proactive messages.
    NoRecipient,
    Failed { step: &'static str },
}

#[derive(Clone, Debug)]
pub struct CycleReport {
    pub cycle_id: CycleId,
    pub started_at: DateTime<Utc>,
    pub synthesized: usize,
    pub decision: Option<ThinkDecision>,
    pub action: CycleAction,
}

/// Collaborators of the cycle engine.
pub struct AutonomyDeps {
    pub conversation: Arc<Conversation>,
    pub completion: Arc<dyn CompletionService>,
    pub store: MemoryStore,
    pub messenger: Arc<dyn Messenger>,
    pub clock: Arc<dyn Clock>,
}

/// Reset the daily count the first time `now` falls on a later UTC day.
/// Returns whether anything changed.
pub fn roll_over(state: &mut AutonomyState, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    if state.count_date == Some(today) {
        return false;
    }
    let reset = state.proactive_count_today != 0;
    state.proactive_count_today = 0;
    state.count_date = Some(today);
    if reset {
        info!(%today, "proactive count reset for new UTC day");
    }
    true
}

pub struct AutonomyEngine {
    deps: AutonomyDeps,
    gate: ProactiveGate,
    config: AutonomyConfig,
    recipient: Option<UserId>,
    state: AsyncMutex<AutonomyState>,
    running: AsyncMutex<()>,
}

impl AutonomyEngine {
    /// Build the engine, reloading persisted autonomy state.
    pub fn new(
        deps: AutonomyDeps,
        gate: GateConfig,
        config: AutonomyConfig,
        recipient: Option<UserId>,
    ) -> Result<Self, EngineError> {
        let state = deps.store.load_autonomy()?;
        debug!(?state, "autonomy state loaded");
        Ok(Self {
            deps,
            gate: ProactiveGate::new(gate),
            config,
            recipient,
            state: AsyncMutex::new(state),
            running: AsyncMutex::new(()),
        })
    }

    pub fn config(&self) -> &AutonomyConfig {
        &self.config
    }

    pub async fn state(&self) -> AutonomyState {
        self.state.lock().await.clone()
    }

    /// The count the gate would use right now.
    pub async fn proactive_count_today(&self) -> u32 {
        let now = self.deps.clock.now();
        let state = self.state.lock().await;
        effective_count(state.proactive_count_today, state.count_date, now.date_naive())
    }

    /// Run one cycle. Returns `None` without doing anything if a cycle is
    /// already in progress.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("cycle overrun: previous cycle still running, skipping tick");
            return None;
        };
        let cycle_id = CycleId::new();
        let span = info_span!("cycle", cycle_id = %cycle_id);
        Some(self.cycle(cycle_id).instrument(span).await)
    }

    async fn cycle(&self, cycle_id: CycleId) -> CycleReport {
        let started_at = self.deps.clock.now();
        info!("autonomy cycle starting");

        let synthesized = match self.deps.conversation.settle().await {
            Ok(outcomes) => outcomes.len(),
            Err(e) => {
                warn!(step = "timeout_check", error = %e, error_kind = e.kind(), "synthesis during cycle failed");
                0
            }
        };

        let memory = self.deps.conversation.lock_memory().await;
        let (decision, action) = match self.think().await {
            Ok(outcome) => {
                info!(
                    step = "think",
                    decision = outcome.decision.label(),
                    rationale = %outcome.rationale,
                    "think complete"
                );
                let action = self.act(&outcome).await;
                (Some(outcome.decision), action)
            }
            Err(e) => {
                warn!(step = "think", error = %e, error_kind = e.kind(), "think step failed");
                (None, CycleAction::Failed { step: "think" })
            }
        };
        drop(memory);

        self.finish().await;
        info!(?action, synthesized, "autonomy cycle complete");

        CycleReport {
            cycle_id,
            started_at,
            synthesized,
            decision,
            action,
        }
    }

    async fn think(&self) -> Result<ThinkOutcome, EngineError> {
        let now = self.deps.clock.now();
        let snapshot = self.deps.store.read_many(&DocumentName::LIGHTWEIGHT)?;
        let journal = self.deps.store.recent_journal(now, self.config.journal_window_days)?;

        let (hours_since, count_today) = {
            let mut state = self.state.lock().await;
            if roll_over(&mut state, now) {
                self.save_state(&state);
            }
            let hours = state
                .last_proactive_at
                .map(|t| (now - t).num_minutes() as f64 / 60.0);
            (hours, state.proactive_count_today)
        };

        let request = prompts::think(&snapshot, &journal, now, hours_since, count_today);
        let text = self.deps.completion.complete(&request).await?;
        Ok(parse_think(&text)?)
    }

    async fn act(&self, outcome: &ThinkOutcome) -> CycleAction {
        match &outcome.decision {
            ThinkDecision::Noop => {
                if outcome.has_note_updates() {
                    debug!("noop decision carried note updates, ignoring them");
                }
                CycleAction::Noop
            }
            ThinkDecision::JournalOnly => match self.write_notes(outcome) {
                Ok(true) => CycleAction::Journaled,
                Ok(false) => CycleAction::Noop,
                Err(e) => {
                    error!(step = "journal", error = %e, error_kind = e.kind(), "writing notes failed");
                    CycleAction::Failed { step: "journal" }
                }
            },
            ThinkDecision::Message { reason } => {
                if let Err(e) = self.write_notes(outcome) {
                    error!(step = "journal", error = %e, error_kind = e.kind(), "writing notes failed");
                }
                self.message(reason).await
            }
        }
    }

    /// Commit the think step's journal entry and document rewrites as one batch.
    fn write_notes(&self, outcome: &ThinkOutcome) -> Result<bool, EngineError> {
        let mut batch = MemoryBatch::new();
        if let Some(entry) = &outcome.journal_entry {
            batch = batch.journal(entry.clone());
        }
        if let Some(queue) = &outcome.queue_update {
            batch = batch.replace(DocumentName::Queue, queue.clone());
        }
        if let Some(threads) = &outcome.threads_update {
            batch = batch.replace(DocumentName::ActiveThreads, threads.clone());
        }
        if batch.is_empty() {
            return Ok(false);
        }
        self.deps.store.commit(&batch, self.deps.clock.now())?;
        info!(
            step = "journal",
            documents = ?batch.documents.keys().collect::<Vec<_>>(),
            journal_entries = batch.journal.len(),
            "notes written"
        );
        Ok(true)
    }

    async fn message(&self, reason: &str) -> CycleAction {
        let content = match self.compose(reason).await {
            Ok(content) => content,
            Err(e) => {
                warn!(step = "compose", error = %e, error_kind = e.kind(), "compose failed");
                return CycleAction::Failed { step: "compose" };
            }
        };

        let now = self.deps.clock.now();
        let mut state = self.state.lock().await;
        roll_over(&mut state, now);
        let verdict = self.gate.evaluate(&GateInput {
            now,
            last_proactive_at: state.last_proactive_at,
            proactive_count_today: state.proactive_count_today,
            count_date: state.count_date,
        });

        match verdict {
            GateVerdict::Deny(deny) => {
                drop(state);
                info!(step = "gate", gate = deny.gate(), reason = %deny, "proactive message denied");
                self.handle_denied(reason, &content, deny, now)
            }
            GateVerdict::Allow => {
                let Some(user_id) = self.recipient else {
                    warn!(step = "dispatch", "gate allowed a message but no recipient is configured");
                    return CycleAction::NoRecipient;
                };
                if let Err(e) = self.deps.messenger.send(user_id, &content).await {
                    let e = EngineError::from(e);
                    error!(step = "dispatch", user_id, error = %e, "proactive send failed");
                    return CycleAction::Failed { step: "dispatch" };
                }

                state.last_proactive_at = Some(now);
                state.proactive_count_today += 1;
                state.count_date = Some(now.date_naive());
                self.save_state(&state);
                drop(state);
                info!(
                    step = "dispatch",
                    user_id,
                    reason,
                    chars = content.len(),
                    "proactive message sent"
                );

                let entry = format!("Reached out ({reason}):\n\n{content}");
                if let Err(e) = self.deps.journal_entry(&entry, now) {
                    warn!(step = "journal", error = %e, "recording sent message failed");
                }
                CycleAction::Sent { user_id }
            }
        }
    }

    async fn compose(&self, reason: &str) -> Result<String, EngineError> {
        let snapshot = self.deps.store.read_all()?;
        let request = prompts::compose_proactive(&snapshot, reason, self.deps.clock.now());
        let text = self.deps.completion.complete(&request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(ambient_core::CompletionError::MalformedResponse("empty message".into()).into());
        }
        Ok(text.to_string())
    }

    fn handle_denied(&self, reason: &str, content: &str, deny: DenyReason, now: DateTime<Utc>) -> CycleAction {
        if !self.config.persist_denied_messages {
            info!(step = "gate", gate = deny.gate(), "denied message discarded");
            return CycleAction::Discarded(deny);
        }

        let stamp = now.format("%Y-%m-%d %H:%M UTC");
        let result = self.deps.store.read(DocumentName::Queue).and_then(|queue| {
            let queue = format!(
                "{}\n\n## Deferred message ({stamp})\nReason: {reason}\nHeld back: {deny}\n\n{content}\n",
                queue.trim_end()
            );
            let batch = MemoryBatch::new()
                .replace(DocumentName::Queue, queue)
                .journal(format!("Wanted to reach out ({reason}) but held back: {deny}.\n\n{content}"));
            self.deps.store.commit(&batch, now)
        });

        match result {
            Ok(_) => CycleAction::Deferred(deny),
            Err(e) => {
                error!(step = "journal", error = %e, "persisting deferred message failed");
                CycleAction::Failed { step: "journal" }
            }
        }
    }

    async fn finish(&self) {
        let mut state = self.state.lock().await;
        state.last_cycle_at = Some(self.deps.clock.now());
        self.save_state(&state);
    }

    fn save_state(&self, state: &AutonomyState) {
        if let Err(e) = self.deps.store.save_autonomy(state) {
            error!(step = "state", error = %e, "persisting autonomy state failed");
        }
    }
}

impl AutonomyDeps {
    fn journal_entry(&self, entry: &str, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.store.journal().add(entry, at)?;
        Ok(())
    }
}
