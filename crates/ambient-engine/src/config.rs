//! Engine-facing configuration, derived from [`AmbientSettings`].

use std::time::Duration as StdDuration;

use ambient_core::ModelTier;
use ambient_settings::AmbientSettings;
use chrono::Duration;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub idle_timeout: Duration,
    pub message_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::minutes(30),
            message_threshold: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GateConfig {
    /// UTC hour quiet hours begin (inclusive).
    pub quiet_hours_start: u32,
    /// UTC hour quiet hours end (exclusive).
    pub quiet_hours_end: u32,
    pub cooldown: Duration,
    pub daily_limit: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            quiet_hours_start: 23,
            quiet_hours_end: 8,
            cooldown: Duration::hours(2),
            daily_limit: 3,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SynthesisConfig {
    pub tier: ModelTier,
    pub summary_window_days: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            tier: ModelTier::Cheap,
            summary_window_days: 7,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AutonomyConfig {
    pub cycle_interval: StdDuration,
    pub first_cycle_delay: StdDuration,
    pub shutdown_grace: StdDuration,
    /// Record composed-but-denied messages in the queue and journal.
    pub persist_denied_messages: bool,
    /// How many days of journal the think step sees.
    pub journal_window_days: i64,
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            cycle_interval: StdDuration::from_secs(3600),
            first_cycle_delay: StdDuration::from_secs(3600),
            shutdown_grace: StdDuration::from_secs(30),
            persist_denied_messages: true,
            journal_window_days: 7,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub gate: GateConfig,
    pub synthesis: SynthesisConfig,
    pub autonomy: AutonomyConfig,
}

impl From<&AmbientSettings> for EngineConfig {
    fn from(s: &AmbientSettings) -> Self {
        Self {
            session: SessionConfig {
                idle_timeout: Duration::seconds(s.session.idle_timeout_secs as i64),
                message_threshold: s.session.message_threshold,
            },
            gate: GateConfig {
                quiet_hours_start: s.autonomy.quiet_hours_start,
                quiet_hours_end: s.autonomy.quiet_hours_end,
                cooldown: Duration::seconds(s.autonomy.cooldown_secs as i64),
                daily_limit: s.autonomy.daily_limit,
            },
            synthesis: SynthesisConfig {
                tier: s.synthesis.tier,
                summary_window_days: s.synthesis.summary_window_days,
            },
            autonomy: AutonomyConfig {
                cycle_interval: s.autonomy.cycle_interval(),
                first_cycle_delay: s.autonomy.first_cycle_delay(),
                shutdown_grace: s.autonomy.shutdown_grace(),
                persist_denied_messages: s.autonomy.persist_denied_messages,
                journal_window_days: 7,
            },
        }
    }
}
