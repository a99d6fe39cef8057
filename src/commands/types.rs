//! Command types and definitions.

use std::fmt;

/// Main menu button that starts a subscription dialog.
pub const NEW_SUBSCRIPTION: &str = "New Subscription";

/// Main menu button that lists the caller's subscriptions.
pub const LIST_SUBSCRIPTIONS: &str = "List Subscriptions";

/// Dialog button that returns to the main menu.
pub const RETURN: &str = "Return";

/// Available bot commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    /// Register and show the main menu.
    Start,

    /// Show help information.
    Help,

    /// Start the city → storage → size dialog.
    Subscribe,

    /// List the caller's active subscriptions.
    List,

    /// Deactivate a subscription. `None` when the ID is missing or malformed.
    Unsubscribe(Option<i64>),

    /// Abandon the current dialog.
    Cancel,
}

impl BotCommand {
    /// Parses a command or a main menu button from a message text.
    ///
    /// Returns `None` if the message is neither. Commands addressed to a bot
    /// (`/list@storage_watch_bot`) are accepted.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();

        match text {
            NEW_SUBSCRIPTION => return Some(Self::Subscribe),
            LIST_SUBSCRIPTIONS => return Some(Self::List),
            RETURN => return Some(Self::Cancel),
            _ => {}
        }

        let after_slash = text.strip_prefix('/')?;

        let (cmd, args) = match after_slash.split_once(char::is_whitespace) {
            Some((cmd, args)) => (cmd, Some(args.trim())),
            None => (after_slash, None),
        };
        let cmd = cmd.split_once('@').map_or(cmd, |(cmd, _bot)| cmd).to_lowercase();

        match cmd.as_str() {
            "start" | "menu" => Some(Self::Start),
            "help" | "h" => Some(Self::Help),
            "subscribe" | "new" => Some(Self::Subscribe),
            "list" | "ls" => Some(Self::List),
            "unsubscribe" | "unsub" | "rm" => Some(Self::Unsubscribe(
                args.and_then(|a| a.trim_start_matches('#').parse().ok()),
            )),
            "cancel" | "return" => Some(Self::Cancel),
            _ => None,
        }
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Subscribe => "subscribe",
            Self::List => "list",
            Self::Unsubscribe(_) => "unsubscribe",
            Self::Cancel => "cancel",
        }
    }

    /// Returns all available commands with their descriptions.
    #[must_use]
    pub fn all_commands() -> Vec<(&'static str, &'static str)> {
        vec![
            ("/start", "Show the main menu"),
            ("/subscribe", "Watch a storage unit size"),
            ("/list", "Show your subscriptions"),
            ("/unsubscribe <id>", "Stop watching a subscription"),
            ("/cancel", "Abandon the current selection"),
            ("/help", "Show this help message"),
        ]
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsubscribe(Some(id)) => write!(f, "unsubscribe {id}"),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Reply keyboard shown under a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<String>>,
}

impl Keyboard {
    /// The main menu buttons.
    #[must_use]
    pub fn main_menu() -> Self {
        Self {
            rows: vec![
                vec![NEW_SUBSCRIPTION.to_owned()],
                vec![LIST_SUBSCRIPTIONS.to_owned()],
            ],
        }
    }

    /// One button per option, two per row, followed by a `Return` row.
    #[must_use]
    pub fn choices(options: &[String]) -> Self {
        let mut rows: Vec<Vec<String>> = options.chunks(2).map(<[String]>::to_vec).collect();
        rows.push(vec![RETURN.to_owned()]);
        Self { rows }
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command was successful.
    pub success: bool,

    /// Response message to show the user.
    pub message: String,

    /// Keyboard to show with the message; `None` leaves the current one.
    pub keyboard: Option<Keyboard>,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            keyboard: None,
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            keyboard: None,
        }
    }

    #[must_use]
    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start() {
        assert_eq!(BotCommand::parse("/start"), Some(BotCommand::Start));
        assert_eq!(BotCommand::parse("/menu"), Some(BotCommand::Start));
    }

    #[test]
    fn test_parse_menu_buttons() {
        assert_eq!(BotCommand::parse("New Subscription"), Some(BotCommand::Subscribe));
        assert_eq!(BotCommand::parse("List Subscriptions"), Some(BotCommand::List));
        assert_eq!(BotCommand::parse("Return"), Some(BotCommand::Cancel));
    }

    #[test]
    fn test_parse_unsubscribe_with_arg() {
        assert_eq!(
            BotCommand::parse("/unsubscribe 42"),
            Some(BotCommand::Unsubscribe(Some(42)))
        );
        assert_eq!(
            BotCommand::parse("/unsubscribe #7"),
            Some(BotCommand::Unsubscribe(Some(7)))
        );
    }

    #[test]
    fn test_parse_unsubscribe_without_arg() {
        assert_eq!(
            BotCommand::parse("/unsubscribe"),
            Some(BotCommand::Unsubscribe(None))
        );
        assert_eq!(
            BotCommand::parse("/unsubscribe abc"),
            Some(BotCommand::Unsubscribe(None))
        );
    }

    #[test]
    fn test_parse_addressed_to_bot() {
        assert_eq!(
            BotCommand::parse("/list@storage_watch_bot"),
            Some(BotCommand::List)
        );
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(BotCommand::parse("Moscow"), None);
        assert_eq!(BotCommand::parse("/unknown"), None);
        assert_eq!(BotCommand::parse(""), None);
    }

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(BotCommand::parse("/LIST"), Some(BotCommand::List));
        assert_eq!(BotCommand::parse("/Help"), Some(BotCommand::Help));
    }

    #[test]
    fn test_parse_with_extra_whitespace() {
        assert_eq!(BotCommand::parse("  /cancel  "), Some(BotCommand::Cancel));
        assert_eq!(
            BotCommand::parse("/unsubscribe   3  "),
            Some(BotCommand::Unsubscribe(Some(3)))
        );
    }

    #[test]
    fn test_choices_keyboard() {
        let options = vec!["A".to_owned(), "B".to_owned(), "C".to_owned()];
        let keyboard = Keyboard::choices(&options);
        assert_eq!(
            keyboard.rows,
            vec![
                vec!["A".to_owned(), "B".to_owned()],
                vec!["C".to_owned()],
                vec!["Return".to_owned()],
            ]
        );
    }
}
