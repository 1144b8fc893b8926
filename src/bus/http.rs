//! HTTP adapter for an external message bus.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Method | Path        | Body / query                         | Response                   |
//! |--------|-------------|--------------------------------------|----------------------------|
//! | POST   | `/register` | `{agent, channels}`                  | `{agent_id}`               |
//! | POST   | `/post`     | `{channel, sender, body}`            | any 2xx                    |
//! | GET    | `/pull`     | `?channel=&since=&limit=`            | `{items: [...], next?}`    |
//! | GET    | `/channels` |                                      | `{channels: [...]}`        |

use std::time::Duration;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{BusFuture, MessageBus, PullResponse};
use crate::config::BusConfig;
use crate::{AppError, Result};

#[derive(Serialize)]
struct RegisterRequest<'a> {
    agent: &'a str,
    channels: &'a [String],
}

#[derive(Deserialize)]
struct RegisterResponse {
    agent_id: String,
}

#[derive(Serialize)]
struct PostRequest<'a> {
    channel: &'a str,
    sender: &'a str,
    body: Value,
}

#[derive(Deserialize)]
struct ChannelsResponse {
    channels: Vec<String>,
}

/// Bus client speaking JSON over HTTP.
pub struct HttpBus {
    client: Client,
    base_url: String,
}

impl HttpBus {
    /// Build a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bus` if the HTTP client cannot be constructed.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| AppError::Bus(format!("failed to build http client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// Build a client from the `[bus]` config section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when no URL is configured, or
    /// `AppError::Bus` if the HTTP client cannot be constructed.
    pub fn from_config(config: &BusConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| AppError::Config("bus.url is not set".into()))?;
        Self::new(url, Duration::from_secs(config.request_timeout_seconds))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(AppError::Bus(format!("HTTP {status}: {text}")))
    }
}

impl MessageBus for HttpBus {
    fn register<'a>(&'a self, agent: &'a str, channels: &'a [String]) -> BusFuture<'a, String> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("register"))
                .json(&RegisterRequest { agent, channels })
                .send()
                .await?;
            let parsed: RegisterResponse = Self::check(response).await?.json().await?;
            debug!(agent, agent_id = %parsed.agent_id, "agent registered on http bus");
            Ok(parsed.agent_id)
        })
    }

    fn post<'a>(&'a self, channel: &'a str, sender: &'a str, body: Value) -> BusFuture<'a, ()> {
        Box::pin(async move {
            let response = self
                .client
                .post(self.url("post"))
                .json(&PostRequest {
                    channel,
                    sender,
                    body,
                })
                .send()
                .await?;
            Self::check(response).await?;
            Ok(())
        })
    }

    fn pull<'a>(
        &'a self,
        channel: &'a str,
        since: u64,
        limit: usize,
    ) -> BusFuture<'a, PullResponse> {
        Box::pin(async move {
            let since = since.to_string();
            let limit = limit.to_string();
            let response = self
                .client
                .get(self.url("pull"))
                .query(&[
                    ("channel", channel),
                    ("since", since.as_str()),
                    ("limit", limit.as_str()),
                ])
                .send()
                .await?;
            let parsed: PullResponse = Self::check(response).await?.json().await?;
            Ok(parsed)
        })
    }

    fn list_channels(&self) -> BusFuture<'_, Vec<String>> {
        Box::pin(async move {
            let response = self.client.get(self.url("channels")).send().await?;
            let parsed: ChannelsResponse = Self::check(response).await?.json().await?;
            Ok(parsed.channels)
        })
    }
}
