//! In-process collaborators for tests.

use std::sync::atomic::{AtomicBool, Ordering};

use ambient_core::{Messenger, MessagingError, UserId};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Messenger that records deliveries instead of sending them.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(UserId, String)>>,
    fail_next: AtomicBool,
}

impl RecordingMessenger {
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().clone()
    }

    /// Make the next send fail with a network error.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, user_id: UserId, text: &str) -> Result<(), MessagingError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MessagingError::Network("connection reset".into()));
        }
        self.sent.lock().push((user_id, text.to_string()));
        Ok(())
    }
}
