//! Bot API delivery of notifications and alerts.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::{ApiError, RequestError};
use tracing::warn;

use super::RateLimiter;
use crate::notifier::{NotificationSink, SinkError};

/// Sends plain-text messages through the Bot API, spaced by a shared
/// [`RateLimiter`].
#[derive(Clone)]
pub struct TelegramSink {
    bot: Bot,
    limiter: Arc<RateLimiter>,
}

impl TelegramSink {
    #[must_use]
    pub fn new(bot: Bot, limiter: Arc<RateLimiter>) -> Self {
        Self { bot, limiter }
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn send(&self, recipient: i64, message: &str) -> Result<(), SinkError> {
        self.limiter.wait_and_acquire().await;

        match self.bot.send_message(ChatId(recipient), message).await {
            Ok(_) => Ok(()),
            Err(RequestError::RetryAfter(seconds)) => {
                let pause = seconds.duration();
                warn!(recipient, "Flood wait from Telegram: {:?}", pause);
                self.limiter.pause_for(pause).await;
                Err(SinkError::Delivery(format!("flood wait of {pause:?}")))
            }
            Err(RequestError::Api(
                ApiError::BotBlocked | ApiError::ChatNotFound | ApiError::UserDeactivated,
            )) => Err(SinkError::RecipientUnreachable(recipient)),
            Err(e) => Err(SinkError::Delivery(e.to_string())),
        }
    }
}

impl std::fmt::Debug for TelegramSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSink")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
