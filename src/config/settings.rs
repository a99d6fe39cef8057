//! Application settings loaded from the environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Url;

/// Deployment environment; selects the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            _ => Err(()),
        }
    }
}

/// Telegram Bot API configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Token issued by @BotFather.
    pub bot_token: String,

    /// Chat that receives operator alerts, if any.
    pub admin_chat_id: Option<i64>,

    /// Minimum spacing between two outbound messages.
    pub send_interval: Duration,
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("admin_chat_id", &self.admin_chat_id)
            .field("send_interval", &self.send_interval)
            .finish()
    }
}

/// Listing page scraping.
#[derive(Debug, Clone)]
pub struct ScrapeSettings {
    pub url: Url,
    pub interval: Duration,
    pub http_timeout: Duration,
    /// JSON file overriding the listing selectors.
    pub layout_file: Option<PathBuf>,
}

/// Notification cycle.
#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub interval: Duration,
    /// Minimum time between two notifications to the same user.
    pub cooldown: Duration,
}

/// Everything the binary needs to start.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub environment: Environment,
    pub telegram: TelegramConfig,
    pub database_path: PathBuf,
    pub scrape: ScrapeSettings,
    pub notify: NotifySettings,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

const DEFAULT_DATABASE_PATH: &str = "storage_watch.db";
const DEFAULT_SCRAPE_INTERVAL_SECS: u64 = 3600;
const DEFAULT_NOTIFY_INTERVAL_SECS: u64 = 3600;
const DEFAULT_COOLDOWN_SECS: u64 = 24 * 3600;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SEND_INTERVAL_MS: u64 = 50;
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl AppSettings {
    /// Loads settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing or invalid variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &'static str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };
        let required = |key: &'static str| var(key).ok_or(ConfigError::MissingEnvVar(key));

        let environment = required("ENVIRONMENT")?
            .parse::<Environment>()
            .map_err(|()| ConfigError::invalid("ENVIRONMENT", "expected development or production"))?;

        let bot_token = required("TELEGRAM_BOT_TOKEN")?;
        if !bot_token.contains(':') {
            return Err(ConfigError::invalid(
                "TELEGRAM_BOT_TOKEN",
                "expected the <id>:<secret> form issued by BotFather",
            ));
        }

        let admin_chat_id = var("ADMIN_CHAT_ID")
            .map(|v| {
                v.parse::<i64>()
                    .map_err(|_| ConfigError::invalid("ADMIN_CHAT_ID", "expected an integer chat ID"))
            })
            .transpose()?;

        let url = required("SCRAPE_URL")?;
        let url = Url::parse(&url).map_err(|e| ConfigError::invalid("SCRAPE_URL", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid("SCRAPE_URL", "expected an http or https URL"));
        }

        let secs = |key: &'static str, default: u64| -> Result<Duration, ConfigError> {
            positive(key, var(key), default).map(Duration::from_secs)
        };

        let log_level = var("LOG_LEVEL")
            .unwrap_or_else(|| "info".to_owned())
            .to_ascii_lowercase();
        if !LOG_LEVELS.contains(&log_level.as_str()) {
            return Err(ConfigError::invalid(
                "LOG_LEVEL",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }

        Ok(Self {
            environment,
            telegram: TelegramConfig {
                bot_token,
                admin_chat_id,
                send_interval: Duration::from_millis(positive(
                    "SEND_INTERVAL_MS",
                    var("SEND_INTERVAL_MS"),
                    DEFAULT_SEND_INTERVAL_MS,
                )?),
            },
            database_path: var("DATABASE_PATH")
                .map_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH), PathBuf::from),
            scrape: ScrapeSettings {
                url,
                interval: secs("SCRAPE_INTERVAL_SECS", DEFAULT_SCRAPE_INTERVAL_SECS)?,
                http_timeout: secs("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?,
                layout_file: var("SCRAPE_LAYOUT_FILE").map(PathBuf::from),
            },
            notify: NotifySettings {
                interval: secs("NOTIFY_INTERVAL_SECS", DEFAULT_NOTIFY_INTERVAL_SECS)?,
                cooldown: secs("NOTIFICATION_COOLDOWN_SECS", DEFAULT_COOLDOWN_SECS)?,
            },
            log_level,
            log_file: var("LOG_FILE_PATH").map(PathBuf::from),
        })
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

fn positive(key: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.parse::<u64>() {
        Ok(0) | Err(_) => Err(ConfigError::invalid(key, "expected a positive integer")),
        Ok(n) => Ok(n),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(var: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            var,
            reason: reason.into(),
        }
    }
}
