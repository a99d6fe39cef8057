//! The notification cycle.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{CooldownPolicy, Match, NotificationSink, collect_matches, message};
use crate::scheduler::PeriodicTask;
use crate::store::{StoreError, SubscriptionStore, UnitCatalog};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to load active subscriptions: {0}")]
    LoadSubscriptions(#[source] StoreError),
}

/// Counters for one notification cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Distinct users owning at least one active subscription.
    pub users_checked: usize,
    /// Users with at least one satisfied subscription.
    pub matched: usize,
    pub notified: usize,
    /// Matched users skipped because their cooldown has not elapsed.
    pub cooling_down: usize,
    /// Matched users whose lookup, send or bookkeeping failed.
    pub failed: usize,
    /// Set when shutdown stopped the cycle before every user was handled.
    pub interrupted: bool,
}

/// Matches subscriptions against the catalog and notifies eligible users.
pub struct Notifier {
    subscriptions: Arc<dyn SubscriptionStore>,
    catalog: Arc<dyn UnitCatalog>,
    sink: Arc<dyn NotificationSink>,
    policy: CooldownPolicy,
}

impl Notifier {
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        catalog: Arc<dyn UnitCatalog>,
        sink: Arc<dyn NotificationSink>,
        policy: CooldownPolicy,
    ) -> Self {
        Self {
            subscriptions,
            catalog,
            sink,
            policy,
        }
    }

    /// Runs one cycle using `now` as the cycle timestamp.
    ///
    /// Only loading the subscription list can fail the cycle. Every other
    /// problem is confined to the user it happened for and counted in the
    /// report.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CycleReport, NotifyError> {
        let subscriptions = self
            .subscriptions
            .active_subscriptions()
            .await
            .map_err(NotifyError::LoadSubscriptions)?;

        let mut report = CycleReport {
            users_checked: subscriptions
                .iter()
                .map(|s| s.user_id)
                .collect::<BTreeSet<_>>()
                .len(),
            ..CycleReport::default()
        };

        let matches = collect_matches(subscriptions, self.catalog.as_ref()).await;
        report.matched = matches.len();

        for (user_id, user_matches) in matches {
            if cancel.is_cancelled() {
                info!("Shutdown requested, stopping notification cycle");
                report.interrupted = true;
                break;
            }

            match self.notify_user(user_id, &user_matches, now).await {
                Outcome::Notified => report.notified += 1,
                Outcome::CoolingDown => report.cooling_down += 1,
                Outcome::Failed => report.failed += 1,
            }
        }

        Ok(report)
    }

    async fn notify_user(&self, user_id: i64, matches: &[Match], now: DateTime<Utc>) -> Outcome {
        let user = match self.subscriptions.get_user(user_id).await {
            Ok(user) => user,
            Err(e) => {
                warn!(user_id, "Failed to load user: {}", e);
                return Outcome::Failed;
            }
        };

        if !self.policy.is_eligible(user.last_notified, now) {
            debug!(
                user_id,
                next_eligible_at = ?self.policy.next_eligible_at(user.last_notified),
                "User is cooling down"
            );
            return Outcome::CoolingDown;
        }

        let text = message::render(&user, matches);
        if let Err(e) = self.sink.send(user.telegram_id, &text).await {
            warn!(user_id, telegram_id = user.telegram_id, "Failed to send notification: {}", e);
            return Outcome::Failed;
        }

        if let Err(e) = self.subscriptions.update_user_last_notified(user_id, now).await {
            // The message went out but the cooldown was not recorded, so the
            // user may be notified again next cycle.
            error!(user_id, "Failed to record notification time: {}", e);
            return Outcome::Failed;
        }

        info!(user_id, matches = matches.len(), "User notified");
        Outcome::Notified
    }
}

enum Outcome {
    Notified,
    CoolingDown,
    Failed,
}

#[async_trait]
impl PeriodicTask for Notifier {
    fn name(&self) -> &'static str {
        "notifier"
    }

    async fn run_cycle(&self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let report = self.run_at(Utc::now(), cancel).await?;
        info!(
            users_checked = report.users_checked,
            matched = report.matched,
            notified = report.notified,
            cooling_down = report.cooling_down,
            failed = report.failed,
            interrupted = report.interrupted,
            "Notification cycle finished"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
