//! Storage Watch Bot Library
//!
//! A Telegram bot that watches a storage rental listing and tells
//! subscribers when a unit they are interested in becomes available.
//!
//! This crate provides the core functionality for:
//! - Scraping the listing page into a unit catalog
//! - Persisting units, users and subscriptions in SQLite
//! - Matching subscriptions and sending cooldown-limited notifications
//! - Running both cycles on a cancellable schedule
//! - Handling the subscription dialog via chat messages

pub mod commands;
pub mod config;
pub mod notifier;
pub mod scheduler;
pub mod scraper;
pub mod store;
pub mod telegram;
