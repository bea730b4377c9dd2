//! # ambient-settings
//!
//! Configuration for the ambient companion, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`AmbientSettings::default()`]
//! 2. **Settings file**: `<data dir>/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `AMBIENT_*` overrides
//!
//! Secrets (completion API key, bot token) only ever come from the environment.

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::*;
