//! Telegram Bot API notifier.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::config::TelegramSettings;
use crate::domain::{AppError, ExternalServiceError, Notifier};

/// Configuration for the Bot API client
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Sends messages to one chat through the Bot API
pub struct TelegramNotifier {
    http_client: Client,
    api_base: String,
    bot_token: SecretString,
    chat_id: String,
    config: TelegramConfig,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct BotApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[allow(dead_code)]
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings, config: TelegramConfig) -> Result<Self, AppError> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExternalServiceError::Unavailable(e.without_url().to_string()))?;
        info!(api_base = %settings.api_base, chat_id = %settings.chat_id, "Created Telegram notifier");
        Ok(Self {
            http_client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
            config,
        })
    }

    pub fn with_defaults(settings: &TelegramSettings) -> Result<Self, AppError> {
        Self::new(settings, TelegramConfig::default())
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Call a Bot API method, retrying transport failures.
    #[instrument(skip(self, body))]
    async fn call<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        body: Option<&B>,
    ) -> Result<R, AppError> {
        let mut attempt = 0;
        loop {
            match self.call_once(method, body).await {
                Ok(result) => return Ok(result),
                Err(e) if is_retryable(&e) && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, method = %method, "Bot API call failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        method: &str,
        body: Option<&B>,
    ) -> Result<R, AppError> {
        let url = self.method_url(method);
        let request = match body {
            Some(body) => self.http_client.post(&url).json(body),
            None => self.http_client.get(&url),
        };

        let response = request.send().await.map_err(|e| {
            let e = e.without_url();
            if e.is_timeout() {
                ExternalServiceError::Timeout(e.to_string())
            } else if e.is_connect() {
                ExternalServiceError::Unavailable(e.to_string())
            } else {
                ExternalServiceError::HttpError(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ExternalServiceError::Unavailable(format!("Bot API returned {status}")).into());
        }

        let body: BotApiResponse<R> = response.json().await.map_err(|e| {
            ExternalServiceError::HttpError(format!("invalid Bot API response: {}", e.without_url()))
        })?;

        let description = body
            .description
            .unwrap_or_else(|| format!("Bot API returned {status}"));
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ExternalServiceError::RateLimited(description).into());
        }
        if !body.ok {
            return Err(ExternalServiceError::HttpError(description).into());
        }
        body.result.ok_or_else(|| {
            ExternalServiceError::HttpError("Bot API response has no result".to_string()).into()
        })
    }
}

fn is_retryable(err: &AppError) -> bool {
    matches!(
        err,
        AppError::ExternalService(
            ExternalServiceError::Timeout(_) | ExternalServiceError::Unavailable(_)
        )
    )
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip(self, text), fields(chat_id = %self.chat_id, len = text.len()))]
    async fn send(&self, text: &str) -> Result<(), AppError> {
        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
        };
        let sent: SentMessage = self.call("sendMessage", Some(&request)).await?;
        info!(message_id = sent.message_id, "Telegram message sent");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let me: BotUser = self.call::<(), _>("getMe", None).await?;
        info!(bot = ?me.username, "Telegram bot reachable");
        Ok(())
    }
}
