//! # ambient-engine
//!
//! The companion's behavior on top of the store and completion boundaries:
//!
//! - [`session`]: the single live conversation and its close rules
//! - [`synthesizer`]: folds closed transcripts into memory documents
//! - [`conversation`]: serializes session mutation and synthesis between
//!   inbound traffic and the autonomy cycle
//! - [`gate`]: pure allow/deny for proactive messages
//! - [`autonomy`] and [`scheduler`]: the periodic think/act cycle
//! - [`companion`]: inbound chat, commands and greetings

pub mod autonomy;
pub mod companion;
pub mod config;
pub mod conversation;
pub mod decision;
pub mod error;
pub mod gate;
mod json;
pub mod prompts;
pub mod scheduler;
pub mod session;
pub mod synthesizer;
pub mod testing;

pub use autonomy::{AutonomyDeps, AutonomyEngine, CycleAction, CycleReport};
pub use companion::{AccessPolicy, Companion, CompanionDeps, FALLBACK_REPLY};
pub use config::{AutonomyConfig, EngineConfig, GateConfig, SessionConfig, SynthesisConfig};
pub use conversation::{Conversation, Inbound};
pub use decision::{ThinkDecision, ThinkOutcome};
pub use error::EngineError;
pub use gate::{DenyReason, GateInput, GateVerdict, ProactiveGate};
pub use scheduler::CycleScheduler;
pub use session::SessionTracker;
pub use synthesizer::{MemorySynthesizer, SynthesisOutcome};
