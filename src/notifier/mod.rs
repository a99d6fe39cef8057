//! Availability notifications.
//!
//! Each cycle joins active subscriptions against the unit catalog, applies
//! the per-user cooldown and sends every eligible user one message listing
//! all of their matches.

mod dispatcher;
mod matcher;
mod message;
mod policy;
mod sink;

pub use dispatcher::{CycleReport, Notifier, NotifyError};
pub use matcher::{Match, MatchesByUser, collect_matches};
pub use message::render;
pub use policy::{CooldownPolicy, DEFAULT_COOLDOWN};
pub use sink::{NotificationSink, OperatorChannel, SinkError};
