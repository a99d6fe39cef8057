//! Common test utilities
//!
//! Fakes shared across the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use storage_watch_bot::notifier::{NotificationSink, SinkError};
use storage_watch_bot::store::{
    MemoryStore, NewUser, StoreError, SubscriptionStore, Unit, UnitCatalog, UnitKey, UnitRecord,
    User,
};

/// Records every message; fails sends to the recipients in `unreachable`.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<(i64, String)>>,
    unreachable: HashSet<i64>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(recipients: &[i64]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            unreachable: recipients.iter().copied().collect(),
        }
    }

    pub async fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, recipient: i64) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|(to, _)| *to == recipient)
            .map(|(_, text)| text.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, recipient: i64, message: &str) -> Result<(), SinkError> {
        if self.unreachable.contains(&recipient) {
            return Err(SinkError::RecipientUnreachable(recipient));
        }
        self.sent.lock().await.push((recipient, message.to_owned()));
        Ok(())
    }
}

/// Catalog wrapper whose upserts fail for selected keys.
pub struct FlakyCatalog {
    inner: Arc<MemoryStore>,
    failing: HashSet<UnitKey>,
}

impl FlakyCatalog {
    pub fn new(inner: Arc<MemoryStore>, failing: impl IntoIterator<Item = UnitKey>) -> Self {
        Self {
            inner,
            failing: failing.into_iter().collect(),
        }
    }
}

#[async_trait]
impl UnitCatalog for FlakyCatalog {
    async fn upsert_unit(&self, record: UnitRecord) -> Result<Unit, StoreError> {
        if self.failing.contains(&record.key) {
            return Err(StoreError::Unavailable(format!("refusing {}", record.key)));
        }
        self.inner.upsert_unit(record).await
    }

    async fn find_unit(&self, key: &UnitKey) -> Result<Option<Unit>, StoreError> {
        self.inner.find_unit(key).await
    }

    async fn all_units(&self) -> Result<Vec<Unit>, StoreError> {
        self.inner.all_units().await
    }
}

pub fn record(city: &str, storage: &str, size: &str, available: bool) -> UnitRecord {
    UnitRecord {
        key: UnitKey::new(city, storage, size),
        dimension: "2x3 m".to_owned(),
        price: Some(4500.0),
        available,
        description: "Heated, 24/7 access".to_owned(),
    }
}

/// Registers a user and optionally stamps a previous notification time.
pub async fn user(
    store: &MemoryStore,
    telegram_id: i64,
    last_notified: Option<DateTime<Utc>>,
) -> User {
    let user = store
        .register_user(NewUser {
            telegram_id,
            first_name: Some(format!("User{telegram_id}")),
            ..NewUser::default()
        })
        .await
        .unwrap();
    if let Some(at) = last_notified {
        store.update_user_last_notified(user.id, at).await.unwrap();
    }
    store.get_user(user.id).await.unwrap()
}
