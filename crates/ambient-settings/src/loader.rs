//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AmbientSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `AMBIENT_*` environment overrides (highest priority)
//! 4. Read secrets from the environment
//! 5. Validate

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{AmbientSettings, Secret};

/// Resolve the settings file path (`$AMBIENT_SETTINGS` or `<data dir>/settings.json`).
pub fn settings_path() -> PathBuf {
    if let Some(p) = read_env_string("AMBIENT_SETTINGS") {
        return PathBuf::from(p);
    }
    let data_dir = read_env_string("AMBIENT_DATA_DIR").unwrap_or_else(|| "/data".to_string());
    PathBuf::from(data_dir).join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<AmbientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; a malformed file is an error.
pub fn load_settings_from_path(path: &Path) -> Result<AmbientSettings> {
    let defaults = serde_json::to_value(AmbientSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: AmbientSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    load_credentials(&mut settings);
    validate(&settings)?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// Objects merge per key, everything else is replaced by `source`, and nulls
/// in `source` are skipped.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides. Invalid values are ignored with a warning.
pub fn apply_env_overrides(settings: &mut AmbientSettings) {
    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("AMBIENT_IDLE_TIMEOUT_SECS", 1, 86_400) {
        settings.session.idle_timeout_secs = v;
    }
    if let Some(v) = read_env_u32("AMBIENT_MESSAGE_THRESHOLD", 1, 10_000) {
        settings.session.message_threshold = v;
    }

    // ── Autonomy ────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("AMBIENT_CYCLE_INTERVAL_SECS", 1, 86_400) {
        settings.autonomy.cycle_interval_secs = v;
    }
    if let Some(v) = read_env_u32("AMBIENT_QUIET_HOURS_START", 0, 23) {
        settings.autonomy.quiet_hours_start = v;
    }
    if let Some(v) = read_env_u32("AMBIENT_QUIET_HOURS_END", 0, 23) {
        settings.autonomy.quiet_hours_end = v;
    }
    if let Some(v) = read_env_u64("AMBIENT_COOLDOWN_SECS", 0, 7 * 86_400) {
        settings.autonomy.cooldown_secs = v;
    }
    if let Some(v) = read_env_u32("AMBIENT_DAILY_LIMIT", 0, 1_000) {
        settings.autonomy.daily_limit = v;
    }
    if let Some(v) = read_env_bool("AMBIENT_PERSIST_DENIED_MESSAGES") {
        settings.autonomy.persist_denied_messages = v;
    }

    // ── Models ──────────────────────────────────────────────────────
    if let Some(v) = read_env_string("AMBIENT_CHEAP_MODEL") {
        settings.models.cheap = v;
    }
    if let Some(v) = read_env_string("AMBIENT_QUALITY_MODEL") {
        settings.models.quality = v;
    }
    if let Some(v) = read_env_string("AMBIENT_COMPLETION_BASE_URL") {
        settings.models.base_url = v;
    }

    // ── Server / platform / storage ─────────────────────────────────
    if let Some(v) = read_env_u64("PORT", 1, 65_535) {
        settings.server.port = v as u16;
    }
    if let Some(v) = read_env_string("AMBIENT_ALLOWED_USER_IDS") {
        settings.telegram.allowed_user_ids = parse_id_list(&v);
    }
    if let Some(v) = read_env_string("AMBIENT_DATA_DIR") {
        settings.storage.data_dir = PathBuf::from(v);
    }
    if let Some(v) = read_env_string("AMBIENT_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

fn load_credentials(settings: &mut AmbientSettings) {
    if let Some(v) = read_env_string("AMBIENT_COMPLETION_API_KEY")
        .or_else(|| read_env_string("OPENROUTER_API_KEY"))
    {
        settings.credentials.completion_api_key = Some(Secret::new(v));
    }
    if let Some(v) = read_env_string("TELEGRAM_BOT_TOKEN") {
        settings.credentials.telegram_bot_token = Some(Secret::new(v));
    }
}

/// Reject configurations the engine cannot run with.
pub fn validate(settings: &AmbientSettings) -> Result<()> {
    if settings.session.message_threshold == 0 {
        return Err(SettingsError::InvalidValue(
            "session.messageThreshold must be at least 1".into(),
        ));
    }
    if settings.session.idle_timeout_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "session.idleTimeoutSecs must be positive".into(),
        ));
    }
    if settings.autonomy.cycle_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "autonomy.cycleIntervalSecs must be positive".into(),
        ));
    }
    for (field, hour) in [
        ("quietHoursStart", settings.autonomy.quiet_hours_start),
        ("quietHoursEnd", settings.autonomy.quiet_hours_end),
    ] {
        if hour > 23 {
            return Err(SettingsError::InvalidValue(format!(
                "autonomy.{field} must be a UTC hour (0-23), got {hour}"
            )));
        }
    }
    if settings.autonomy.cycle_interval_secs > settings.session.idle_timeout_secs * 4 {
        tracing::warn!(
            cycle_interval_secs = settings.autonomy.cycle_interval_secs,
            idle_timeout_secs = settings.session.idle_timeout_secs,
            "cycle interval is long relative to the idle timeout; idle sessions may stay open well past their deadline"
        );
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Accepts (case-insensitive) `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

pub fn parse_u32_range(val: &str, min: u32, max: u32) -> Option<u32> {
    let n: u32 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Comma-separated user ids; unparseable entries are dropped.
pub fn parse_id_list(val: &str) -> Vec<i64> {
    val.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect()
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_u32(name: &str, min: u32, max: u32) -> Option<u32> {
    let val = std::env::var(name).ok()?;
    let result = parse_u32_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u32 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_file(contents: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ambient-settings-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn deep_merge_nested_objects() {
        let target = json!({"autonomy": {"dailyLimit": 3, "cooldownSecs": 7200}});
        let source = json!({"autonomy": {"dailyLimit": 1}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["autonomy"]["dailyLimit"], 1);
        assert_eq!(merged["autonomy"]["cooldownSecs"], 7200);
    }

    #[test]
    fn deep_merge_skips_null_and_replaces_arrays() {
        let target = json!({"a": 1, "ids": [1, 2]});
        let source = json!({"a": null, "ids": [3]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["ids"], json!([3]));
    }

    #[test]
    fn missing_file_gives_defaults() {
        let path = std::env::temp_dir().join("ambient-settings-does-not-exist.json");
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.session.message_threshold, 10);
    }

    #[test]
    fn file_values_override_defaults() {
        let path = temp_file(r#"{"session": {"messageThreshold": 4}, "autonomy": {"quietHoursStart": 22}}"#);
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.session.message_threshold, 4);
        assert_eq!(settings.autonomy.quiet_hours_start, 22);
        assert_eq!(settings.autonomy.quiet_hours_end, 8);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = temp_file("{not json");
        assert!(matches!(load_settings_from_path(&path), Err(SettingsError::Json(_))));
    }

    #[test]
    fn zero_threshold_rejected() {
        let path = temp_file(r#"{"session": {"messageThreshold": 0}}"#);
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn out_of_range_hour_rejected() {
        let mut settings = AmbientSettings::default();
        settings.autonomy.quiet_hours_end = 24;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn parsers() {
        assert_eq!(parse_bool("Yes"), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_u64_range("60", 1, 100), Some(60));
        assert_eq!(parse_u64_range("0", 1, 100), None);
        assert_eq!(parse_u32_range("24", 0, 23), None);
        assert_eq!(parse_id_list("12, 34,,x,56"), vec![12, 34, 56]);
    }
}
