use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::core::config::BotConfig;
use crate::core::error::{AppError, Result};
use crate::modules::telegram::types::{
    ApiResponse, File, GetFileRequest, GetUpdatesRequest, Message, SendMessageRequest, Update,
    User,
};

/// Extra time allowed on top of the long-poll timeout before giving up on getUpdates
const POLL_GRACE_SECS: u64 = 10;

/// Timeout for ordinary Bot API calls
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retrieves the content of an inbound attachment
#[async_trait]
pub trait FileSource: Send + Sync {
    /// Write the content identified by `file_id` to `dest`, returning bytes written
    ///
    /// Stops early once more than `max_bytes` have arrived, so a returned count
    /// above `max_bytes` means the content was cut off.
    async fn download_to(&self, file_id: &str, dest: &Path, max_bytes: u64) -> Result<u64>;
}

/// Receives updates and delivers replies
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>>;

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<()>;
}

/// Client for the Telegram Bot API
pub struct TelegramClient {
    api_url: String,
    token: String,
    poll_timeout: Duration,
    download_timeout: Duration,
    http_client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(config: BotConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_url: config.api_url,
            token: config.token,
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            download_timeout: Duration::from_secs(config.download_timeout_secs),
            http_client,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }

    /// Call a Bot API method and unwrap the response envelope
    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(self.method_url(method))
            .timeout(timeout)
            .json(params)
            .send()
            .await
            // The request URL embeds the bot token
            .map_err(|e| {
                AppError::ExternalServiceError(format!("{} failed: {}", method, e.without_url()))
            })?;

        let status = response.status();
        let envelope = response.json::<ApiResponse<R>>().await.map_err(|e| {
            AppError::ExternalServiceError(format!(
                "Failed to parse {} response (HTTP {}): {}",
                method,
                status,
                e.without_url()
            ))
        })?;

        if !envelope.ok {
            return Err(AppError::ExternalServiceError(format!(
                "{} rejected: {} {}",
                method,
                envelope.error_code.unwrap_or_else(|| i32::from(status.as_u16())),
                envelope.description.unwrap_or_default()
            )));
        }

        envelope
            .result
            .ok_or_else(|| AppError::ExternalServiceError(format!("{} returned no result", method)))
    }

    /// Identify the bot account behind the token
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", &serde_json::json!({}), Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .await
    }

    /// Long-poll for updates newer than `offset`
    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        let request = GetUpdatesRequest {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };

        self.call(
            "getUpdates",
            &request,
            self.poll_timeout + Duration::from_secs(POLL_GRACE_SECS),
        )
        .await
    }

    /// Send a plain-text reply to a chat
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<()> {
        let request = SendMessageRequest {
            chat_id,
            text,
            reply_to_message_id,
            disable_web_page_preview: true,
        };

        let _: Message = self
            .call(
                "sendMessage",
                &request,
                Duration::from_secs(REQUEST_TIMEOUT_SECS),
            )
            .await?;
        Ok(())
    }

    /// Resolve a file id to a downloadable path
    pub async fn get_file(&self, file_id: &str) -> Result<File> {
        self.call(
            "getFile",
            &GetFileRequest { file_id },
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
        .await
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>> {
        TelegramClient::get_updates(self, offset).await
    }

    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<()> {
        TelegramClient::send_message(self, chat_id, text, reply_to_message_id).await
    }
}

#[async_trait]
impl FileSource for TelegramClient {
    async fn download_to(&self, file_id: &str, dest: &Path, max_bytes: u64) -> Result<u64> {
        let file = self.get_file(file_id).await?;
        let file_path = file.file_path.ok_or_else(|| {
            AppError::ExternalServiceError(format!("File {} is not available for download", file_id))
        })?;

        let response = self
            .http_client
            .get(self.file_url(&file_path))
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("File download failed: {}", e.without_url()))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "File download failed: HTTP {}",
                response.status()
            )));
        }

        let mut out = tokio::fs::File::create(dest).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                AppError::ExternalServiceError(format!(
                    "File download interrupted: {}",
                    e.without_url()
                ))
            })?;
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if written > max_bytes {
                tracing::debug!("Download of {} passed {} bytes, stopping", file_id, max_bytes);
                break;
            }
        }
        out.flush().await?;

        tracing::debug!("Downloaded file {} ({} bytes)", file_id, written);
        Ok(written)
    }
}
