//! Records shared by the catalog, the subscription store and their callers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

/// Natural key of a storage unit: the triple subscriptions match against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitKey {
    pub city: String,
    pub storage_name: String,
    pub size: String,
}

impl UnitKey {
    #[must_use]
    pub fn new(
        city: impl Into<String>,
        storage_name: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            city: city.into(),
            storage_name: storage_name.into(),
            size: size.into(),
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {}", self.city, self.storage_name, self.size)
    }
}

/// A unit as extracted from the listing page, before it has a catalog identity.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitRecord {
    pub key: UnitKey,
    pub dimension: String,
    /// Monthly price; `None` when the listing shows no parseable price.
    pub price: Option<f64>,
    pub available: bool,
    pub description: String,
}

/// A unit stored in the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub id: i64,
    pub key: UnitKey,
    pub dimension: String,
    pub price: Option<f64>,
    pub available: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    /// Builds a catalog entry from a scraped record.
    #[must_use]
    pub fn from_record(id: i64, record: UnitRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            key: record.key,
            dimension: record.dimension,
            price: record.price,
            available: record.available,
            description: record.description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrites the mutable fields from a fresh scrape, keeping identity.
    pub fn apply(&mut self, record: UnitRecord, now: DateTime<Utc>) {
        self.dimension = record.dimension;
        self.price = record.price;
        self.available = record.available;
        self.description = record.description;
        self.updated_at = now;
    }
}

/// A bot user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the user last received an availability notification.
    pub last_notified: Option<DateTime<Utc>>,
}

impl User {
    /// Name to greet the user with.
    #[must_use]
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.username) {
            (Some(first), _) if !first.is_empty() => first.clone(),
            (_, Some(username)) if !username.is_empty() => format!("@{username}"),
            _ => format!("user {}", self.telegram_id),
        }
    }
}

/// Profile data used to register a user on first contact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUser {
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Whether a subscription takes part in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionStatus {
    Active,
    Inactive,
}

impl SubscriptionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is not recognised.
#[derive(Debug, thiserror::Error)]
#[error("unknown subscription status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for SubscriptionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// A user's standing interest in units with a given key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub criteria: UnitKey,
    pub status: SubscriptionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
