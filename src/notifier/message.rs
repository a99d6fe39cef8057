//! Notification text.

use std::fmt::Write as _;

use super::Match;
use crate::store::User;

/// Matches listed in full before the message is summarized.
const MAX_LISTED: usize = 15;

/// Longest unit description kept in a notification.
const MAX_DESCRIPTION: usize = 80;

/// Renders the single message a user receives for all of their matches.
#[must_use]
pub fn render(user: &User, matches: &[Match]) -> String {
    let mut text = format!(
        "🔔 {}, storage units you are watching are available:\n",
        user.display_name()
    );

    for m in matches.iter().take(MAX_LISTED) {
        let unit = &m.unit;
        let _ = write!(text, "\n📦 {}", unit.key);

        let mut details = Vec::new();
        if !unit.dimension.is_empty() {
            details.push(unit.dimension.clone());
        }
        if let Some(price) = unit.price {
            details.push(format!("{} per month", format_price(price)));
        }
        if !details.is_empty() {
            let _ = write!(text, "\n   {}", details.join(", "));
        }
        if !unit.description.is_empty() {
            let _ = write!(text, "\n   {}", truncate(&unit.description, MAX_DESCRIPTION));
        }
        let _ = writeln!(text, "\n   Subscription #{}", m.subscription.id);
    }

    if matches.len() > MAX_LISTED {
        let _ = writeln!(text, "\n…and {} more.", matches.len() - MAX_LISTED);
    }

    text.push_str("\nUse /list to see or cancel your subscriptions.");
    text
}

/// Formats a price with thousands separators, e.g. `12 500` or `1 250.50`.
fn format_price(price: f64) -> String {
    let cents = (price * 100.0).round();
    // Listing prices are small positive numbers; the cast cannot truncate.
    #[allow(clippy::cast_possible_truncation)]
    let cents = cents as i64;
    let (whole, fraction) = (cents / 100, cents % 100);

    let digits = whole.abs().to_string();
    let mut grouped = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if whole < 0 {
        grouped.insert(0, '-');
    }

    if fraction == 0 {
        grouped
    } else {
        format!("{grouped}.{:02}", fraction.abs())
    }
}

/// Truncates a string to a maximum length, adding "..." if truncated.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::store::{Subscription, SubscriptionStatus, Unit, UnitKey};

    fn user() -> User {
        let now = Utc::now();
        User {
            id: 1,
            telegram_id: 42,
            username: None,
            first_name: Some("Anna".to_owned()),
            last_name: None,
            created_at: now,
            updated_at: now,
            last_notified: None,
        }
    }

    fn matched(id: i64, size: &str, price: Option<f64>) -> Match {
        let now = Utc::now();
        let key = UnitKey::new("Moscow", "StorageA", size);
        Match {
            subscription: Subscription {
                id,
                user_id: 1,
                criteria: key.clone(),
                status: SubscriptionStatus::Active,
                created_at: now,
                updated_at: now,
            },
            unit: Unit {
                id: id + 100,
                key,
                dimension: "2x3 m".to_owned(),
                price,
                available: true,
                description: String::new(),
                created_at: now,
                updated_at: now,
            },
        }
    }

    #[test]
    fn test_render_lists_every_match() {
        let text = render(
            &user(),
            &[matched(1, "Medium", Some(4500.0)), matched(2, "Small", None)],
        );

        assert!(text.starts_with("🔔 Anna,"));
        assert!(text.contains("📦 Moscow / StorageA / Medium"));
        assert!(text.contains("2x3 m, 4 500 per month"));
        assert!(text.contains("Subscription #1"));
        assert!(text.contains("📦 Moscow / StorageA / Small"));
        assert!(text.contains("Subscription #2"));
        assert!(text.ends_with("Use /list to see or cancel your subscriptions."));
    }

    #[test]
    fn test_render_summarizes_long_lists() {
        let matches: Vec<Match> = (0..20)
            .map(|i| matched(i, &format!("Box {i}"), None))
            .collect();
        let text = render(&user(), &matches);

        assert!(text.contains("Box 14"));
        assert!(!text.contains("Box 15"));
        assert!(text.contains("…and 5 more."));
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(4500.0), "4 500");
        assert_eq!(format_price(999.0), "999");
        assert_eq!(format_price(1_250_000.0), "1 250 000");
        assert_eq!(format_price(1250.5), "1 250.50");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Hello", 10), "Hello");
        assert_eq!(truncate("Hello, World!", 5), "Hello...");
    }
}
