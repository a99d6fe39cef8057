//! Notification cooldown.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Default minimum time between two notifications to the same user.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(24 * 60 * 60);

/// Decides whether a user may be notified again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    cooldown: TimeDelta,
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl CooldownPolicy {
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown: TimeDelta::from_std(cooldown).unwrap_or(TimeDelta::MAX),
        }
    }

    #[must_use]
    pub const fn cooldown(&self) -> TimeDelta {
        self.cooldown
    }

    /// A user is eligible once a full cooldown has elapsed since the last
    /// notification. Users that were never notified are always eligible.
    #[must_use]
    pub fn is_eligible(&self, last_notified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_notified.is_none_or(|last| now.signed_duration_since(last) >= self.cooldown)
    }

    /// Earliest time the user may be notified again.
    #[must_use]
    pub fn next_eligible_at(&self, last_notified: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
        last_notified.and_then(|last| last.checked_add_signed(self.cooldown))
    }
}
