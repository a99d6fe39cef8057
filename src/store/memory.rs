//! In-memory store used by tests and local experiments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    NewUser, StoreError, Subscription, SubscriptionStatus, SubscriptionStore, Unit, UnitCatalog,
    UnitKey, UnitRecord, User,
};

#[derive(Debug, Default)]
struct Tables {
    units: BTreeMap<UnitKey, Unit>,
    users: BTreeMap<i64, User>,
    subscriptions: BTreeMap<i64, Subscription>,
    next_unit_id: i64,
    next_user_id: i64,
    next_subscription_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Implements both store traits over a single lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of units in the catalog.
    pub async fn unit_count(&self) -> usize {
        self.tables.read().await.units.len()
    }
}

#[async_trait]
impl UnitCatalog for MemoryStore {
    async fn upsert_unit(&self, record: UnitRecord) -> Result<Unit, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(unit) = tables.units.get_mut(&record.key) {
            unit.apply(record, now);
            return Ok(unit.clone());
        }

        let id = next_id(&mut tables.next_unit_id);
        let unit = Unit::from_record(id, record, now);
        tables.units.insert(unit.key.clone(), unit.clone());
        Ok(unit)
    }

    async fn find_unit(&self, key: &UnitKey) -> Result<Option<Unit>, StoreError> {
        Ok(self.tables.read().await.units.get(key).cloned())
    }

    async fn all_units(&self) -> Result<Vec<Unit>, StoreError> {
        Ok(self.tables.read().await.units.values().cloned().collect())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn active_subscriptions(&self) -> Result<Vec<Subscription>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect())
    }

    async fn get_user(&self, id: i64) -> Result<User, StoreError> {
        self.tables
            .read()
            .await
            .users
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "user", id })
    }

    async fn update_user_last_notified(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "user", id })?;
        user.last_notified = Some(at);
        user.updated_at = Utc::now();
        Ok(())
    }

    async fn find_user_by_telegram_id(
        &self,
        telegram_id: i64,
    ) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.telegram_id == telegram_id)
            .cloned())
    }

    async fn register_user(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(user) = tables
            .users
            .values_mut()
            .find(|u| u.telegram_id == new_user.telegram_id)
        {
            user.username = new_user.username;
            user.first_name = new_user.first_name;
            user.last_name = new_user.last_name;
            user.updated_at = now;
            return Ok(user.clone());
        }

        let id = next_id(&mut tables.next_user_id);
        let user = User {
            id,
            telegram_id: new_user.telegram_id,
            username: new_user.username,
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            created_at: now,
            updated_at: now,
            last_notified: None,
        };
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn subscribe(
        &self,
        user_id: i64,
        criteria: UnitKey,
    ) -> Result<Subscription, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::NotFound {
                entity: "user",
                id: user_id,
            });
        }
        let now = Utc::now();

        if let Some(existing) = tables
            .subscriptions
            .values_mut()
            .find(|s| s.user_id == user_id && s.criteria == criteria)
        {
            existing.status = SubscriptionStatus::Active;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let id = next_id(&mut tables.next_subscription_id);
        let subscription = Subscription {
            id,
            user_id,
            criteria,
            status: SubscriptionStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<Subscription>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.is_active())
            .cloned()
            .collect())
    }

    async fn deactivate_subscription(
        &self,
        user_id: i64,
        subscription_id: i64,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        match tables.subscriptions.get_mut(&subscription_id) {
            Some(sub) if sub.user_id == user_id && sub.is_active() => {
                sub.status = SubscriptionStatus::Inactive;
                sub.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
