//! Telegram Bot API adapter.
//!
//! Provides the outbound [`TelegramSink`] used for notifications and
//! operator alerts, and the inbound update loop that feeds the command
//! handler.

mod bot;
mod rate_limiter;
mod sink;

pub use bot::run_bot;
pub use rate_limiter::RateLimiter;
pub use sink::TelegramSink;
pub use teloxide::Bot;
