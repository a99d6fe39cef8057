//! Outbound message seam.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

/// Errors reported by a sink. The notifier never retries; a failed user
/// simply stays eligible for the next cycle.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Recipient {0} blocked the bot or no longer exists")]
    RecipientUnreachable(i64),

    #[error("Delivery failed: {0}")]
    Delivery(String),
}

/// Delivers a text message to a recipient handle (a Telegram chat ID).
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, recipient: i64, message: &str) -> Result<(), SinkError>;
}

/// Operator chat that receives failure alerts from background tasks.
#[derive(Clone)]
pub struct OperatorChannel {
    sink: Arc<dyn NotificationSink>,
    chat_id: i64,
}

impl OperatorChannel {
    #[must_use]
    pub fn new(sink: Arc<dyn NotificationSink>, chat_id: i64) -> Self {
        Self { sink, chat_id }
    }

    /// Sends an alert. Delivery problems are logged and swallowed.
    pub async fn alert(&self, text: &str) {
        match self.sink.send(self.chat_id, text).await {
            Ok(()) => info!(chat_id = self.chat_id, "Operator alert sent"),
            Err(e) => warn!(chat_id = self.chat_id, "Failed to send operator alert: {}", e),
        }
    }
}

impl std::fmt::Debug for OperatorChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorChannel")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}
