//! Joins active subscriptions against the unit catalog.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::store::{Subscription, Unit, UnitCatalog, UnitKey};

/// A subscription whose criteria are satisfied by an available unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub subscription: Subscription,
    pub unit: Unit,
}

/// Matches grouped by owning user, in user ID order.
pub type MatchesByUser = BTreeMap<i64, Vec<Match>>;

/// Finds the satisfied subscriptions among `subscriptions`.
///
/// Inactive subscriptions are ignored. Each distinct key is looked up once
/// per call. A failed lookup is logged and only affects the subscriptions
/// with that key.
pub async fn collect_matches(
    subscriptions: Vec<Subscription>,
    catalog: &dyn UnitCatalog,
) -> MatchesByUser {
    let mut lookups: HashMap<UnitKey, Option<Unit>> = HashMap::new();
    let mut matches = MatchesByUser::new();

    for subscription in subscriptions {
        if !subscription.is_active() {
            continue;
        }

        let unit = match lookups.get(&subscription.criteria) {
            Some(cached) => cached.clone(),
            None => match catalog.find_unit(&subscription.criteria).await {
                Ok(found) => {
                    lookups.insert(subscription.criteria.clone(), found.clone());
                    found
                }
                Err(e) => {
                    warn!(
                        subscription_id = subscription.id,
                        unit = %subscription.criteria,
                        "Failed to look up unit: {}", e
                    );
                    continue;
                }
            },
        };

        match unit {
            Some(unit) if unit.available => {
                debug!(
                    subscription_id = subscription.id,
                    user_id = subscription.user_id,
                    unit_id = unit.id,
                    "Subscription satisfied"
                );
                matches
                    .entry(subscription.user_id)
                    .or_default()
                    .push(Match { subscription, unit });
            }
            _ => {}
        }
    }

    matches
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::{MemoryStore, SubscriptionStatus, UnitRecord};

    fn subscription(id: i64, user_id: i64, size: &str, status: SubscriptionStatus) -> Subscription {
        let now = Utc::now();
        Subscription {
            id,
            user_id,
            criteria: UnitKey::new("Moscow", "StorageA", size),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    async fn catalog() -> MemoryStore {
        let store = MemoryStore::new();
        for (size, available) in [("Medium", true), ("Large", false), ("Small", true)] {
            store
                .upsert_unit(UnitRecord {
                    key: UnitKey::new("Moscow", "StorageA", size),
                    dimension: String::new(),
                    price: None,
                    available,
                    description: String::new(),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_groups_by_user() {
        let store = catalog().await;
        let subs = vec![
            subscription(1, 10, "Medium", SubscriptionStatus::Active),
            subscription(2, 10, "Small", SubscriptionStatus::Active),
            subscription(3, 20, "Medium", SubscriptionStatus::Active),
        ];

        let matches = collect_matches(subs, &store).await;

        assert_eq!(matches.len(), 2);
        assert_eq!(matches[&10].len(), 2);
        assert_eq!(matches[&20].len(), 1);
        assert_eq!(matches[&20][0].unit.key.size, "Medium");
    }

    #[tokio::test]
    async fn test_unavailable_missing_and_inactive_excluded() {
        let store = catalog().await;
        let subs = vec![
            subscription(1, 10, "Large", SubscriptionStatus::Active),
            subscription(2, 10, "Huge", SubscriptionStatus::Active),
            subscription(3, 20, "Medium", SubscriptionStatus::Inactive),
        ];

        let matches = collect_matches(subs, &store).await;
        assert!(matches.is_empty());
    }
}
