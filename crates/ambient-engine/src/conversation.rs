//! The live conversation shared by inbound traffic and the autonomy cycle.
//!
//! Every session mutation (record, timeout check, close, reply attach,
//! forget) runs under one async mutex. Closed transcripts leave that
//! critical section by value and are synthesized one at a time under a
//! second lock, the memory lock. Anything else that reads memory to decide
//! a write (the autonomy cycle's think and act steps) holds the same lock,
//! so no writer ever commits content computed from documents another writer
//! has since replaced.

use std::sync::Arc;

use ambient_core::{Clock, SessionId, Transcript};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{error, warn};

use crate::config::SessionConfig;
use crate::error::EngineError;
use crate::session::{RecordOutcome, SessionTracker, TimeoutCheck};
use crate::synthesizer::{MemorySynthesizer, SynthesisOutcome};

/// Transcripts kept for retry after a failed synthesis.
const MAX_PENDING: usize = 5;

/// One inbound message after it has been recorded.
#[derive(Clone, Debug)]
pub struct Inbound {
    pub session_id: SessionId,
    pub turn_index: usize,
    /// The session as of this message (the closed transcript when this
    /// message reached the threshold).
    pub context: Transcript,
    /// The previous session, closed because it went idle before this message.
    pub timed_out: Option<Transcript>,
    /// Whether this message closed its own session.
    pub closed_by_count: bool,
}

impl Inbound {
    /// Transcripts this message closed, oldest first. The reply belongs in
    /// the count-closed one, so attach it before handing off.
    pub fn into_closed(self) -> Vec<Transcript> {
        let mut closed = Vec::new();
        closed.extend(self.timed_out);
        if self.closed_by_count {
            closed.push(self.context);
        }
        closed
    }
}

pub struct Conversation {
    tracker: AsyncMutex<SessionTracker>,
    synthesizer: MemorySynthesizer,
    memory_lock: AsyncMutex<()>,
    pending: Mutex<Vec<Transcript>>,
    clock: Arc<dyn Clock>,
}

impl Conversation {
    pub fn new(config: SessionConfig, synthesizer: MemorySynthesizer, clock: Arc<dyn Clock>) -> Self {
        Self {
            tracker: AsyncMutex::new(SessionTracker::new(config)),
            synthesizer,
            memory_lock: AsyncMutex::new(()),
            pending: Mutex::new(Vec::new()),
            clock,
        }
    }

    /// Record an inbound message, closing an idle session first.
    pub async fn receive(&self, text: &str) -> Result<Inbound, EngineError> {
        let mut tracker = self.tracker.lock().await;
        let ingested = tracker.ingest(text, self.clock.now())?;
        let (session_id, context, closed_by_count) = match ingested.outcome {
            RecordOutcome::Continuing { session_id, .. } => {
                let context = tracker
                    .current()
                    .map(|s| s.transcript())
                    .ok_or_else(|| EngineError::ConcurrentSessionConflict("live session missing after record".into()))?;
                (session_id, context, false)
            }
            RecordOutcome::ClosedByCount(transcript) => (transcript.session_id.clone(), transcript, true),
        };
        Ok(Inbound {
            session_id,
            turn_index: ingested.turn_index,
            context,
            timed_out: ingested.timed_out,
            closed_by_count,
        })
    }

    /// Attach a reply to the live session's turn. Replies for closed sessions
    /// are set on the [`Inbound`] itself by the caller.
    pub async fn attach_reply(&self, session_id: &SessionId, turn_index: usize, reply: &str) -> bool {
        self.tracker.lock().await.attach_reply(session_id, turn_index, reply)
    }

    /// Close the live session if idle, then synthesize whatever is waiting.
    /// Always waits for in-flight synthesis before returning.
    pub async fn settle(&self) -> Result<Vec<SynthesisOutcome>, EngineError> {
        let closed = match self.tracker.lock().await.check_timeout(self.clock.now()) {
            TimeoutCheck::ClosedByTimeout(t) => vec![t],
            TimeoutCheck::NoSession | TimeoutCheck::Continuing => Vec::new(),
        };
        self.hand_off(closed).await
    }

    /// Synthesize closed transcripts in order, retrying earlier failures first.
    /// Transcripts that fail are kept for the next trigger.
    pub async fn hand_off(&self, closed: Vec<Transcript>) -> Result<Vec<SynthesisOutcome>, EngineError> {
        let _memory = self.memory_lock.lock().await;

        let mut queue = std::mem::take(&mut *self.pending.lock());
        queue.extend(closed);

        let mut outcomes = Vec::new();
        let mut first_error = None;
        let mut failed = Vec::new();
        for transcript in queue {
            if first_error.is_some() {
                failed.push(transcript);
                continue;
            }
            match self.synthesizer.synthesize(&transcript).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(
                        session_id = %transcript.session_id,
                        step = "synthesis",
                        error = %e,
                        error_kind = e.kind(),
                        "synthesis failed, transcript kept for retry"
                    );
                    failed.push(transcript);
                    first_error = Some(e);
                }
            }
        }

        if !failed.is_empty() {
            let mut pending = self.pending.lock();
            pending.extend(failed);
            if pending.len() > MAX_PENDING {
                let dropped = pending.len() - MAX_PENDING;
                warn!(dropped, "dropping oldest unsynthesized transcripts");
                pending.drain(..dropped);
            }
        }

        match first_error {
            Some(e) if outcomes.is_empty() => Err(e),
            _ => Ok(outcomes),
        }
    }

    /// Hold off synthesis while the caller reads memory and writes back
    /// content derived from it.
    pub async fn lock_memory(&self) -> MutexGuard<'_, ()> {
        self.memory_lock.lock().await
    }

    /// Drop the live session without synthesis.
    pub async fn forget(&self) -> Option<SessionId> {
        self.tracker.lock().await.forget()
    }

    pub async fn live(&self) -> Option<Transcript> {
        self.tracker.lock().await.current().map(|s| s.transcript())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
