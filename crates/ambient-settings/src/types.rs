//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may specify any subset of fields; everything else keeps its
//! compiled default.

use std::path::PathBuf;
use std::time::Duration;

use ambient_core::ModelTier;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AmbientSettings {
    /// Conversation session thresholds.
    pub session: SessionSettings,
    /// Autonomy cycle timing and proactive gates.
    pub autonomy: AutonomySettings,
    /// Memory synthesis behavior.
    pub synthesis: SynthesisSettings,
    /// Completion service models and transport.
    pub models: ModelSettings,
    /// HTTP surface.
    pub server: ServerSettings,
    /// Chat platform settings.
    pub telegram: TelegramSettings,
    /// Where durable state lives.
    pub storage: StorageSettings,
    /// Log level and persistence.
    pub logging: LoggingSettings,
    /// Secrets. Never read from or written to the settings file.
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Idle gap after which a session closes.
    pub idle_timeout_secs: u64,
    /// Number of inbound messages that closes a session.
    pub message_threshold: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30 * 60,
            message_threshold: 10,
        }
    }
}

impl SessionSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AutonomySettings {
    pub cycle_interval_secs: u64,
    /// Delay before the first cycle. `None` means one full interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_cycle_delay_secs: Option<u64>,
    /// UTC hour at which quiet hours begin (inclusive).
    pub quiet_hours_start: u32,
    /// UTC hour at which quiet hours end (exclusive).
    pub quiet_hours_end: u32,
    pub cooldown_secs: u64,
    pub daily_limit: u32,
    /// Keep composed content in the queue when the gate denies it.
    pub persist_denied_messages: bool,
    /// How long an in-flight cycle may keep running after shutdown is requested.
    pub shutdown_grace_secs: u64,
    /// Greet allow-listed users when the process starts.
    pub startup_greeting: bool,
}

impl Default for AutonomySettings {
    fn default() -> Self {
        Self {
            cycle_interval_secs: 60 * 60,
            first_cycle_delay_secs: None,
            quiet_hours_start: 23,
            quiet_hours_end: 8,
            cooldown_secs: 2 * 60 * 60,
            daily_limit: 3,
            persist_denied_messages: true,
            shutdown_grace_secs: 30,
            startup_greeting: false,
        }
    }
}

impl AutonomySettings {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn first_cycle_delay(&self) -> Duration {
        Duration::from_secs(self.first_cycle_delay_secs.unwrap_or(self.cycle_interval_secs))
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SynthesisSettings {
    pub tier: ModelTier,
    /// Rolling window the conversation summary is pruned to.
    pub summary_window_days: u32,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            tier: ModelTier::Cheap,
            summary_window_days: 7,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelSettings {
    pub cheap: String,
    pub quality: String,
    /// OpenAI-compatible chat completions endpoint base.
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            cheap: "anthropic/claude-haiku-4-5".to_string(),
            quality: "anthropic/claude-sonnet-4-5".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            request_timeout_secs: 60,
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl ModelSettings {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Cheap => &self.cheap,
            ModelTier::Quality => &self.quality,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Path the chat platform posts webhook updates to.
    pub webhook_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            webhook_path: "/telegram".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TelegramSettings {
    /// Users allowed to talk to the companion. Empty allows everyone.
    pub allowed_user_ids: Vec<i64>,
    pub api_base: Option<String>,
}

impl TelegramSettings {
    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_user_ids.is_empty() || self.allowed_user_ids.contains(&user_id)
    }

    /// Recipient of proactive messages.
    pub fn primary_user(&self) -> Option<i64> {
        self.allowed_user_ids.first().copied()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/data"),
        }
    }
}

impl StorageSettings {
    pub fn memory_db_path(&self) -> PathBuf {
        self.data_dir.join("memory.db")
    }

    pub fn log_db_path(&self) -> PathBuf {
        self.data_dir.join("logs.db")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub log_to_sqlite: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_sqlite: true,
        }
    }
}

/// API key or token, redacted in Debug.
#[derive(Clone)]
pub struct Secret(pub SecretString);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

#[derive(Clone, Debug, Default)]
pub struct Credentials {
    pub completion_api_key: Option<Secret>,
    pub telegram_bot_token: Option<Secret>,
}
