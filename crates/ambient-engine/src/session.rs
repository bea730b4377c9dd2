//! Session Tracker.
//!
//! Owns the single live conversation. A session closes when it reaches the
//! message threshold or when a check observes it has been idle for at least
//! the idle timeout. Closing moves the transcript out of the tracker, so each
//! transcript can be handed off exactly once and a later message always
//! starts a new session.
//!
//! The tracker is plain `&mut self` state; callers serialize access by
//! holding it behind one mutex (see [`crate::conversation::Conversation`]).

use ambient_core::{SessionId, Transcript, Turn};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::SessionConfig;
use crate::error::EngineError;

/// The live conversation.
#[derive(Clone, Debug)]
pub struct Session {
    pub id: SessionId,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub message_count: u32,
    pub turns: Vec<Turn>,
}

impl Session {
    fn start(at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            started_at: at,
            last_activity_at: at,
            message_count: 0,
            turns: Vec::new(),
        }
    }

    fn into_transcript(self) -> Transcript {
        Transcript {
            session_id: self.id,
            started_at: self.started_at,
            turns: self.turns,
        }
    }

    pub fn transcript(&self) -> Transcript {
        self.clone().into_transcript()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOutcome {
    Continuing {
        session_id: SessionId,
        message_count: u32,
    },
    ClosedByCount(Transcript),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeoutCheck {
    NoSession,
    Continuing,
    ClosedByTimeout(Transcript),
}

/// Result of a timeout check followed by a record, done in one critical section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ingested {
    /// The previous session, if it had gone idle before this message.
    pub timed_out: Option<Transcript>,
    pub outcome: RecordOutcome,
    /// Index of the new turn within its session.
    pub turn_index: usize,
}

pub struct SessionTracker {
    config: SessionConfig,
    current: Option<Session>,
}

impl SessionTracker {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    /// Append a message to the live session, starting one if needed.
    ///
    /// Callers are expected to run [`check_timeout`](Self::check_timeout)
    /// first; [`ingest`](Self::ingest) does both.
    pub fn record_message(&mut self, text: &str, at: DateTime<Utc>) -> Result<RecordOutcome, EngineError> {
        let threshold = self.config.message_threshold.max(1);
        let session = self.current.get_or_insert_with(|| {
            let session = Session::start(at);
            debug!(session_id = %session.id, "session started");
            session
        });

        if session.message_count >= threshold {
            let msg = format!(
                "session {} already holds {} messages (threshold {threshold}) but was never closed",
                session.id, session.message_count
            );
            error!(session_id = %session.id, "{msg}");
            return Err(EngineError::ConcurrentSessionConflict(msg));
        }

        session.turns.push(Turn::user(text, at));
        session.message_count += 1;
        session.last_activity_at = at;

        if session.message_count < threshold {
            return Ok(RecordOutcome::Continuing {
                session_id: session.id.clone(),
                message_count: session.message_count,
            });
        }

        let closed = self
            .current
            .take()
            .map(Session::into_transcript)
            .ok_or_else(|| EngineError::ConcurrentSessionConflict("session vanished while closing".into()))?;
        info!(session_id = %closed.session_id, turns = closed.len(), "session closed by message count");
        Ok(RecordOutcome::ClosedByCount(closed))
    }

    /// Close the live session if it has been idle for at least the idle timeout.
    pub fn check_timeout(&mut self, now: DateTime<Utc>) -> TimeoutCheck {
        let Some(session) = &self.current else {
            return TimeoutCheck::NoSession;
        };
        if now - session.last_activity_at < self.config.idle_timeout {
            return TimeoutCheck::Continuing;
        }
        match self.current.take() {
            Some(session) => {
                let idle_secs = (now - session.last_activity_at).num_seconds();
                let transcript = session.into_transcript();
                info!(
                    session_id = %transcript.session_id,
                    turns = transcript.len(),
                    idle_secs,
                    "session closed by idle timeout"
                );
                TimeoutCheck::ClosedByTimeout(transcript)
            }
            None => TimeoutCheck::NoSession,
        }
    }

    /// Timeout check plus record. A message that arrives after its session
    /// went idle becomes the first message of a fresh session.
    pub fn ingest(&mut self, text: &str, at: DateTime<Utc>) -> Result<Ingested, EngineError> {
        let timed_out = match self.check_timeout(at) {
            TimeoutCheck::ClosedByTimeout(t) => Some(t),
            TimeoutCheck::NoSession | TimeoutCheck::Continuing => None,
        };
        let outcome = self.record_message(text, at)?;
        let turn_index = match &outcome {
            RecordOutcome::Continuing { message_count, .. } => *message_count as usize - 1,
            RecordOutcome::ClosedByCount(t) => t.len() - 1,
        };
        Ok(Ingested {
            timed_out,
            outcome,
            turn_index,
        })
    }

    /// Attach the companion's reply to a turn of the live session. Returns
    /// false if that session has since closed.
    pub fn attach_reply(&mut self, session_id: &SessionId, turn_index: usize, reply: &str) -> bool {
        match self.current.as_mut() {
            Some(session) if &session.id == session_id => match session.turns.get_mut(turn_index) {
                Some(turn) => {
                    turn.reply = Some(reply.to_string());
                    true
                }
                None => false,
            },
            _ => false,
        }
    }

    /// Drop the live session without synthesis.
    pub fn forget(&mut self) -> Option<SessionId> {
        let dropped = self.current.take().map(|s| s.id);
        if let Some(id) = &dropped {
            info!(session_id = %id, "session forgotten");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
    }

    fn tracker(threshold: u32) -> SessionTracker {
        SessionTracker::new(SessionConfig {
            idle_timeout: Duration::minutes(30),
            message_threshold: threshold,
        })
    }

    #[test]
    fn messages_within_timeout_never_close_early() {
        let mut tracker = tracker(10);
        for i in 0..9 {
            let at = t0() + Duration::minutes(29 * i);
            assert_eq!(tracker.check_timeout(at), if i == 0 { TimeoutCheck::NoSession } else { TimeoutCheck::Continuing });
            match tracker.record_message(&format!("m{i}"), at).unwrap() {
                RecordOutcome::Continuing { message_count, .. } => assert_eq!(message_count, i as u32 + 1),
                other => panic!("closed early: {other:?}"),
            }
        }
    }

    #[test]
    fn closes_exactly_at_threshold() {
        let mut tracker = tracker(3);
        tracker.record_message("a", t0()).unwrap();
        tracker.record_message("b", t0()).unwrap();
        let RecordOutcome::ClosedByCount(transcript) = tracker.record_message("c", t0()).unwrap() else {
            panic!("expected close by count");
        };
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.turns[2].text, "c");
        assert!(tracker.current().is_none());

        match tracker.record_message("d", t0()).unwrap() {
            RecordOutcome::Continuing { session_id, message_count } => {
                assert_eq!(message_count, 1);
                assert_ne!(session_id, transcript.session_id);
            }
            other => panic!("expected fresh session: {other:?}"),
        }
    }

    #[test]
    fn idle_timeout_is_inclusive_and_closes_once() {
        let mut tracker = tracker(10);
        tracker.record_message("hi", t0()).unwrap();

        assert_eq!(tracker.check_timeout(t0() + Duration::minutes(29)), TimeoutCheck::Continuing);
        let TimeoutCheck::ClosedByTimeout(transcript) = tracker.check_timeout(t0() + Duration::minutes(30)) else {
            panic!("expected timeout close");
        };
        assert_eq!(transcript.len(), 1);
        assert_eq!(tracker.check_timeout(t0() + Duration::hours(5)), TimeoutCheck::NoSession);
    }

    #[test]
    fn message_after_idle_starts_new_session() {
        let mut tracker = tracker(10);
        tracker.record_message("old", t0()).unwrap();
        let old_id = tracker.current().unwrap().id.clone();

        let ingested = tracker.ingest("new", t0() + Duration::minutes(45)).unwrap();
        let timed_out = ingested.timed_out.unwrap();
        assert_eq!(timed_out.session_id, old_id);
        assert_eq!(timed_out.turns.len(), 1);
        assert_eq!(timed_out.turns[0].text, "old");

        let session = tracker.current().unwrap();
        assert_ne!(session.id, old_id);
        assert_eq!(session.message_count, 1);
        assert_eq!(ingested.turn_index, 0);
    }

    #[test]
    fn attach_reply_only_to_live_session() {
        let mut tracker = tracker(10);
        let ingested = tracker.ingest("hello", t0()).unwrap();
        let RecordOutcome::Continuing { session_id, .. } = ingested.outcome else {
            panic!("expected continuing");
        };
        assert!(tracker.attach_reply(&session_id, ingested.turn_index, "hi!"));
        assert_eq!(tracker.current().unwrap().turns[0].reply.as_deref(), Some("hi!"));

        tracker.forget();
        assert!(!tracker.attach_reply(&session_id, 0, "late"));
    }

    #[test]
    fn forget_discards_without_handoff() {
        let mut tracker = tracker(10);
        assert!(tracker.forget().is_none());
        tracker.record_message("secret", t0()).unwrap();
        assert!(tracker.forget().is_some());
        assert_eq!(tracker.check_timeout(t0() + Duration::hours(1)), TimeoutCheck::NoSession);
    }
}
