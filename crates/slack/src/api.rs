//! Slack Web API client.
//!
//! Outbound calls used by the approval flow: `views.open`, `chat.postMessage`,
//! and the per-interaction `response_url` callback. Every call is attempted
//! once and returns a typed [`SlackApiError`] on failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::blocks::{OutgoingMessage, View};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack request failed: {0}")]
    Request(String),
    #[error("slack response could not be read: {0}")]
    Response(String),
    #[error("slack api `{method}` returned error `{error}`")]
    Api { method: String, error: String },
    #[error("slack client could not be built: {0}")]
    Client(String),
}

/// Body posted to an interaction's `response_url`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InteractiveResponse {
    pub text: String,
    pub replace_original: bool,
}

impl InteractiveResponse {
    pub fn replace_original(text: impl Into<String>) -> Self {
        Self { text: text.into(), replace_original: true }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: Option<String>,
    pub ts: Option<String>,
}

#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<(), SlackApiError>;
    async fn post_message(&self, message: &OutgoingMessage)
        -> Result<PostedMessage, SlackApiError>;
    async fn respond(
        &self,
        response_url: &str,
        response: &InteractiveResponse,
    ) -> Result<(), SlackApiError>;
}

#[derive(Debug, Deserialize)]
struct WebApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

#[derive(Serialize)]
struct OpenViewRequest<'a> {
    trigger_id: &'a str,
    view: &'a View,
}

#[derive(Clone)]
pub struct WebApiClient {
    client: Client,
    bot_token: SecretString,
    base_url: String,
}

impl std::fmt::Debug for WebApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApiClient")
            .field("bot_token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl WebApiClient {
    pub fn new(
        bot_token: SecretString,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SlackApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| SlackApiError::Client(error.to_string()))?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, bot_token, base_url })
    }

    async fn call<B>(&self, method: &str, body: &B) -> Result<WebApiResponse, SlackApiError>
    where
        B: Serialize + Sync,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| SlackApiError::Request(error.to_string()))?;

        let result: WebApiResponse =
            response.json().await.map_err(|error| SlackApiError::Response(error.to_string()))?;

        if !result.ok {
            let error = result.error.unwrap_or_else(|| "unknown_error".to_owned());
            warn!(
                event_name = "egress.slack.api_error",
                method,
                error = %error,
                "slack web api rejected call"
            );
            return Err(SlackApiError::Api { method: method.to_owned(), error });
        }

        Ok(result)
    }
}

#[async_trait]
impl SlackApi for WebApiClient {
    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<(), SlackApiError> {
        self.call("views.open", &OpenViewRequest { trigger_id, view }).await?;
        debug!(
            event_name = "egress.slack.view_opened",
            callback_id = view.callback_id(),
            "slack view opened"
        );
        Ok(())
    }

    async fn post_message(
        &self,
        message: &OutgoingMessage,
    ) -> Result<PostedMessage, SlackApiError> {
        let result = self.call("chat.postMessage", message).await?;
        debug!(
            event_name = "egress.slack.message_posted",
            channel = result.channel.as_deref().unwrap_or(&message.channel),
            ts = result.ts.as_deref().unwrap_or("unknown"),
            "slack message posted"
        );
        Ok(PostedMessage { channel: result.channel, ts: result.ts })
    }

    async fn respond(
        &self,
        response_url: &str,
        response: &InteractiveResponse,
    ) -> Result<(), SlackApiError> {
        let reply = self
            .client
            .post(response_url)
            .json(response)
            .send()
            .await
            .map_err(|error| SlackApiError::Request(error.to_string()))?;

        let status = reply.status();
        if !status.is_success() {
            let body = reply.text().await.unwrap_or_default();
            return Err(SlackApiError::Response(format!(
                "response_url returned {status}: {body}"
            )));
        }

        debug!(
            event_name = "egress.slack.responded",
            replace_original = response.replace_original,
            "responded to slack response_url"
        );
        Ok(())
    }
}
