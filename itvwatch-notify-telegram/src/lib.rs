//! Notifier that posts reports to a Telegram chat via the Bot API.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

use itvwatch_core::{
    config::MessagingCredentials,
    ports::{NotifyError, NotifyPort},
};

const PARSE_MODE: &str = "Markdown";

/// Body of a `sendMessage` call.
#[derive(Debug, Serialize)]
struct SendMessage<'msg> {
    chat_id: &'msg str,
    text: &'msg str,
    parse_mode: &'msg str,
}

/// Message delivery through `sendMessage`.
pub struct TelegramNotifier {
    client: Client,
    api_url: String,
    credentials: Option<MessagingCredentials>,
}

impl TelegramNotifier {
    /// Create a notifier bound to the given HTTP client and API base URL.
    ///
    /// Without credentials every delivery fails with
    /// [`NotifyError::MissingCredentials`].
    #[must_use]
    pub fn new<A: Into<String>>(
        client: Client,
        api_url: A,
        credentials: Option<MessagingCredentials>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_owned(),
            credentials,
        }
    }
}

#[async_trait]
impl NotifyPort for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(NotifyError::MissingCredentials)?;

        let url = format!("{}/bot{}/sendMessage", self.api_url, credentials.bot_token);
        let payload = SendMessage {
            chat_id: &credentials.chat_id,
            text,
            parse_mode: PARSE_MODE,
        };

        debug!(chat_id = %credentials.chat_id, len = text.len(), "sending telegram message");

        // The request URL embeds the bot token; keep it out of error messages.
        let response = self
            .client
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|err| NotifyError::Request(err.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "telegram rejected the message");
            return Err(NotifyError::Rejected { status, body });
        }

        Ok(())
    }
}
