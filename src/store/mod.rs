//! Persistence seams for units, users and subscriptions.
//!
//! The scraper, notifier and bot front-end only see the [`UnitCatalog`]
//! and [`SubscriptionStore`] traits. [`SqliteStore`] backs both in
//! production; [`MemoryStore`] backs both in tests.

mod memory;
mod models;
mod schema;
mod sqlite;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use memory::MemoryStore;
pub use models::{
    NewUser, Subscription, SubscriptionStatus, Unit, UnitKey, UnitRecord, UnknownStatus, User,
};
pub use sqlite::{DbPool, SqliteStore};

/// Errors raised by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("{0}")]
    Unavailable(String),
}

/// Latest known state of storage units, keyed by [`UnitKey`].
#[async_trait]
pub trait UnitCatalog: Send + Sync {
    /// Inserts the unit or overwrites the mutable fields of the unit with the
    /// same key. The catalog ID of an existing unit is preserved.
    async fn upsert_unit(&self, record: UnitRecord) -> Result<Unit, StoreError>;

    /// Looks a unit up by its natural key.
    async fn find_unit(&self, key: &UnitKey) -> Result<Option<Unit>, StoreError>;

    /// Every unit in the catalog.
    async fn all_units(&self) -> Result<Vec<Unit>, StoreError>;

    /// Distinct cities, sorted.
    async fn cities(&self) -> Result<Vec<String>, StoreError> {
        let units = self.all_units().await?;
        Ok(distinct(units.into_iter().map(|u| u.key.city)))
    }

    /// Distinct storage names within a city, sorted.
    async fn storages_in(&self, city: &str) -> Result<Vec<String>, StoreError> {
        let units = self.all_units().await?;
        Ok(distinct(
            units
                .into_iter()
                .filter(|u| u.key.city == city)
                .map(|u| u.key.storage_name),
        ))
    }

    /// Distinct unit sizes offered by one storage, sorted.
    async fn sizes_in(&self, city: &str, storage_name: &str) -> Result<Vec<String>, StoreError> {
        let units = self.all_units().await?;
        Ok(distinct(
            units
                .into_iter()
                .filter(|u| u.key.city == city && u.key.storage_name == storage_name)
                .map(|u| u.key.size),
        ))
    }
}

/// Users, their subscriptions and their notification bookkeeping.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// All subscriptions with [`SubscriptionStatus::Active`].
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError>;

    /// Fetches a user by internal ID.
    async fn get_user(&self, id: i64) -> Result<User, StoreError>;

    /// Records that the user was notified at `at`.
    async fn update_user_last_notified(&self, id: i64, at: DateTime<Utc>)
    -> Result<(), StoreError>;

    async fn find_user_by_telegram_id(&self, telegram_id: i64)
    -> Result<Option<User>, StoreError>;

    /// Creates the user on first contact, or refreshes the display fields of
    /// an existing one. `last_notified` is never touched.
    async fn register_user(&self, user: NewUser) -> Result<User, StoreError>;

    /// Stores an active subscription. Subscribing again to the same criteria
    /// reactivates the existing row.
    async fn subscribe(&self, user_id: i64, criteria: UnitKey)
    -> Result<Subscription, StoreError>;

    /// Active subscriptions of one user, oldest first.
    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError>;

    /// Marks one of the user's subscriptions inactive. Returns `false` when
    /// the user owns no active subscription with that ID.
    async fn deactivate_subscription(
        &self,
        user_id: i64,
        subscription_id: i64,
    ) -> Result<bool, StoreError>;
}

fn distinct(values: impl Iterator<Item = String>) -> Vec<String> {
    values.collect::<BTreeSet<_>>().into_iter().collect()
}
