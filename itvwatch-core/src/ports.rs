//! Traits describing backend capabilities and their error types.

use async_trait::async_trait;
use chrono::ParseError as ChronoParseError;
use reqwest::{Error as ReqwestError, StatusCode};
use serde_json::Error as JsonError;

use crate::model::{Availability, CenterId, Plate};

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while querying the booking site for one center.
pub enum CheckError {
    /// The booking page did not embed a CSRF token.
    #[error("Could not obtain CSRF token")]
    TokenNotFound,
    /// Network layer failed or a step answered with a non-2xx status.
    #[error("Request failed: {0}")]
    RequestFailed(#[from] ReqwestError),
    /// The final response was not the expected JSON document.
    #[error("Response parse error: {0}")]
    ResponseParse(String),
    /// Anything else that prevented the check.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<JsonError> for CheckError {
    fn from(err: JsonError) -> Self {
        Self::ResponseParse(err.to_string())
    }
}

impl From<ChronoParseError> for CheckError {
    fn from(err: ChronoParseError) -> Self {
        Self::ResponseParse(format!("invalid slot timestamp: {err}"))
    }
}

#[derive(thiserror::Error, Debug)]
/// Errors that can occur while delivering the aggregate message.
pub enum NotifyError {
    /// Bot token or chat id were not configured.
    #[error("Messaging credentials are not configured")]
    MissingCredentials,
    /// Network layer failed.
    #[error("Network error: {0}")]
    Request(#[from] ReqwestError),
    /// The messaging API answered with a non-2xx status.
    #[error("Message rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status returned by the API.
        status: StatusCode,
        /// Response body, for diagnostics.
        body: String,
    },
}

#[async_trait]
/// Trait for booking site backends.
pub trait AvailabilityPort: Send + Sync {
    /// Query the available appointment slots for a plate at one center.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckError`] when any step of the booking session fails.
    async fn fetch_availability(
        &self,
        plate: &Plate,
        center: CenterId,
    ) -> Result<Availability, CheckError>;
}

#[async_trait]
/// Trait for message delivery backends.
pub trait NotifyPort: Send + Sync {
    /// Deliver a finished text message.
    ///
    /// # Errors
    ///
    /// Returns a [`NotifyError`] when the message could not be delivered.
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}
