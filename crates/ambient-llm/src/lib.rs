pub mod mock;
pub mod openrouter;
pub mod reliable;

pub use openrouter::{OpenRouterClient, OpenRouterConfig};
pub use reliable::{ReliableCompletion, ReliableConfig};
