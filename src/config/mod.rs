//! Configuration module for the storage watch bot.
//!
//! Settings come from environment variables (optionally seeded from a
//! `.env` file) and are validated once at startup.

mod settings;

pub use settings::{
    AppSettings, ConfigError, Environment, NotifySettings, ScrapeSettings, TelegramConfig,
};
