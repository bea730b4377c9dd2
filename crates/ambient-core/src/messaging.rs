use async_trait::async_trait;

use crate::errors::MessagingError;

/// Chat-platform user identifier.
pub type UserId = i64;

/// Outbound message delivery.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send(&self, user_id: UserId, text: &str) -> Result<(), MessagingError>;
}
