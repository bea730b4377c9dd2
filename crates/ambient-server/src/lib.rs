//! HTTP surface of the companion: health, direct messages, the Telegram
//! webhook and memory inspection, plus the Telegram messenger.

pub mod server;
pub mod split;
pub mod telegram;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
pub use telegram::{DisabledMessenger, TelegramMessenger};
