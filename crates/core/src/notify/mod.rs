pub mod message;

use crate::config::Settings;
use crate::error::CheckError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

const DEFAULT_CHAT_API_BASE_URL: &str = "https://api.chatwork.com/v2";
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Posts one message to the team chat room. There is no secondary channel:
/// a dispatch failure is an unrecoverable run outcome.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ChatworkNotifier {
    http: reqwest::Client,
    base_url: String,
    room_id: String,
    api_token: String,
}

impl ChatworkNotifier {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let room_id = settings.require_chat_room_id()?.to_string();
        let api_token = settings.require_chat_api_token()?.to_string();

        let base_url = std::env::var("CHAT_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_CHAT_API_BASE_URL.to_string());
        let timeout_secs = std::env::var("CHAT_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build chat http client")?;

        Ok(Self {
            http,
            base_url,
            room_id,
            api_token,
        })
    }
}

#[async_trait]
impl Notifier for ChatworkNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let url = format!(
            "{}/rooms/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.room_id
        );

        let res = self
            .http
            .post(url)
            .header("X-ChatWorkToken", &self.api_token)
            .form(&[("body", message)])
            .send()
            .await
            .map_err(|err| CheckError::Dispatch(format!("transport failure: {err}")))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CheckError::Dispatch(format!("HTTP {status}: {body}")).into());
        }

        tracing::debug!(room_id = %self.room_id, "chat message posted");
        Ok(())
    }
}

/// Logs instead of posting; used by `--dry-run`.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        tracing::info!(body = %message, "dry run: chat message suppressed");
        Ok(())
    }
}
