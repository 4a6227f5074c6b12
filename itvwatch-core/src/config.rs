//! Run configuration read from environment-style key/value pairs.

use std::env;
use std::fmt;

use crate::model::{CenterId, Plate};

/// Booking site used when `ITV_BASE_URL` is unset.
pub const DEFAULT_BOOKING_URL: &str = "https://www.itv-tuvrheinland.es";
/// Telegram Bot API endpoint used when `TELEGRAM_API_URL` is unset.
pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";
/// Centers checked when `CENTERS` is unset.
pub const DEFAULT_CENTERS: &str = "35,36";
/// User agent sent when `USER_AGENT` is unset.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
/// Errors raised while assembling the configuration.
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{0} environment variable is required")]
    Missing(&'static str),
    /// A variable holds a value that cannot be used.
    #[error("invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
    /// Only one of the bot token and chat id was set.
    #[error("TELEGRAM_TOKEN and TELEGRAM_CHAT_ID must be set together")]
    IncompleteCredentials,
}

#[derive(Clone, PartialEq, Eq)]
/// Bot credentials for the messaging endpoint.
pub struct MessagingCredentials {
    /// Bot token embedded in the API path.
    pub bot_token: String,
    /// Target chat.
    pub chat_id: String,
}

// Keeps the bot token out of debug logs.
impl fmt::Debug for MessagingCredentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MessagingCredentials")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
/// Immutable settings for a single run.
pub struct Config {
    /// Plate to check.
    pub plate: Plate,
    /// Centers to query, in report order.
    pub centers: Vec<CenterId>,
    /// User agent presented to the booking site.
    pub user_agent: String,
    /// Base URL of the booking site.
    pub booking_url: String,
    /// Base URL of the Telegram Bot API.
    pub telegram_api_url: String,
    /// Credentials for sending the report, if configured.
    pub messaging: Option<MessagingCredentials>,
}

impl Config {
    /// Read the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a required variable is missing or malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when a required variable is missing or malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let plate = get("PLATE")
            .and_then(Plate::new)
            .ok_or(ConfigError::Missing("PLATE"))?;

        let centers_raw = get("CENTERS").unwrap_or_else(|| DEFAULT_CENTERS.to_owned());
        let centers = parse_centers(&centers_raw)?;

        let user_agent = get("USER_AGENT").unwrap_or_else(|| DEFAULT_USER_AGENT.to_owned());
        let booking_url = base_url(get("ITV_BASE_URL"), DEFAULT_BOOKING_URL);
        let telegram_api_url = base_url(get("TELEGRAM_API_URL"), DEFAULT_TELEGRAM_API_URL);

        let messaging = match (get("TELEGRAM_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(MessagingCredentials { bot_token, chat_id }),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteCredentials),
        };

        Ok(Self {
            plate,
            centers,
            user_agent,
            booking_url,
            telegram_api_url,
            messaging,
        })
    }
}

/// Parse a comma-separated list of center ids, keeping the given order.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] if any entry is not a positive integer
/// or the list is empty.
pub fn parse_centers(raw: &str) -> Result<Vec<CenterId>, ConfigError> {
    let invalid = || ConfigError::Invalid {
        var: "CENTERS",
        value: raw.to_owned(),
    };

    let centers = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.parse::<CenterId>().map_err(|_err| invalid()))
        .collect::<Result<Vec<_>, _>>()?;

    if centers.is_empty() {
        return Err(invalid());
    }

    Ok(centers)
}

fn base_url(value: Option<String>, default: &str) -> String {
    value
        .as_deref()
        .unwrap_or(default)
        .trim()
        .trim_end_matches('/')
        .to_owned()
}
