use std::time::Duration;

use courier_core::{CoreError, HistorySource, SendTransport};
use courier_models::{
    Chat, ChatsResponse, Page, SendAttachmentRequest, SendRequest, SendResponse,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::photo::Photo;
use crate::ApiError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3883";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;
/// Upper bound on attempts per GET; keeps the doubling delay finite.
pub const MAX_RETRY_LIMIT: u32 = 10;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Attempts per GET; 5xx answers and transport errors are retried.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
            retry_base_delay: RETRY_BASE_DELAY,
        }
    }
}

/// HTTP client for the companion backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: Url,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        Self::with_config(ApiClientConfig {
            base_url: base_url.to_string(),
            ..ApiClientConfig::default()
        })
    }

    pub fn with_config(config: ApiClientConfig) -> Result<Self, ApiError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(config.base_url));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("Courier/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ApiError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base,
            max_retries: config.max_retries.clamp(1, MAX_RETRY_LIMIT),
            retry_base_delay: config.retry_base_delay,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// URL of the realtime endpoint on the same host.
    pub fn websocket_url(&self) -> Result<Url, ApiError> {
        let mut url = self.endpoint(&["ws"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ApiError::InvalidUrl(url.to_string()))?;
        Ok(url)
    }

    /// Backend liveness check.
    pub async fn health(&self) -> Result<bool, ApiError> {
        #[derive(serde::Deserialize)]
        struct Health {
            status: String,
        }
        let url = self.endpoint(&["health"])?;
        let health: Health = self.get_json(url).await?;
        Ok(health.status == "ok")
    }

    /// Chats ordered by most recent activity.
    pub async fn fetch_chats(&self, limit: usize, offset: usize) -> Result<ChatsResponse, ApiError> {
        let mut url = self.endpoint(&["chats"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        self.get_json(url).await
    }

    pub async fn find_chat(&self, chat_id: i64, scan_limit: usize) -> Result<Option<Chat>, ApiError> {
        let chats = self.fetch_chats(scan_limit, 0).await?;
        Ok(chats.chats.into_iter().find(|c| c.id == chat_id))
    }

    pub async fn fetch_messages(
        &self,
        chat_id: i64,
        limit: usize,
        offset: usize,
    ) -> Result<Page, ApiError> {
        let mut url = self.endpoint(&["chats", &chat_id.to_string(), "messages"])?;
        url.query_pairs_mut()
            .append_pair("limit", &limit.to_string())
            .append_pair("offset", &offset.to_string());
        let page: Page = self.get_json(url).await?;
        tracing::debug!(
            chat_id,
            offset,
            fetched = page.messages.len(),
            total = page.total,
            "history page fetched"
        );
        Ok(page)
    }

    pub async fn send(&self, request: &SendRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&["send"])?;
        let resp: SendResponse = self.post_json(url, request).await?;
        if !resp.ok {
            return Err(ApiError::Rejected(
                resp.error.unwrap_or_else(|| "send failed".to_string()),
            ));
        }
        Ok(())
    }

    /// Returns the backend's warning when the file went out but the
    /// follow-up text did not.
    pub async fn send_attachment_file(
        &self,
        request: &SendAttachmentRequest,
    ) -> Result<Option<String>, ApiError> {
        let url = self.endpoint(&["send-attachment"])?;
        let resp: SendResponse = self.post_json(url, request).await?;
        if !resp.ok {
            return Err(ApiError::Rejected(
                resp.error.unwrap_or_else(|| "attachment send failed".to_string()),
            ));
        }
        Ok(resp.error)
    }

    /// Contact photo for `handle`; `None` when the contact has none.
    pub async fn fetch_photo(&self, handle: &str) -> Result<Option<Photo>, ApiError> {
        let url = self.endpoint(&["contacts", handle, "photo"])?;
        let resp = match self.get_with_retry(url.clone()).await {
            Ok(resp) => resp,
            Err(ApiError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        Ok(Some(Photo {
            url: url.to_string(),
            content_type,
            bytes,
        }))
    }

    /// `base` with `segments` appended, each percent-encoded as one path
    /// segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ApiError> {
        let resp = self.get_with_retry(url.clone()).await?;
        resp.json()
            .await
            .map_err(|e| ApiError::Decode(format!("{url}: {e}")))
    }

    /// Single attempt; a timed-out send may still have gone out.
    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ApiError::Http(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        resp.json()
            .await
            .map_err(|e| ApiError::Decode(format!("{url}: {e}")))
    }

    /// GET with exponential backoff retry on transport errors and 5xx.
    async fn get_with_retry(&self, url: Url) -> Result<reqwest::Response, ApiError> {
        let mut last_err = ApiError::Http("no attempts made".to_string());
        for attempt in 0..self.max_retries {
            match self.http.get(url.clone()).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) if resp.status().is_server_error() => {
                    last_err = ApiError::Status {
                        status: resp.status().as_u16(),
                        url: url.to_string(),
                    };
                }
                Ok(resp) => {
                    return Err(ApiError::Status {
                        status: resp.status().as_u16(),
                        url: url.to_string(),
                    });
                }
                Err(e) => {
                    last_err = ApiError::Http(e.to_string());
                }
            }
            if attempt + 1 < self.max_retries {
                let delay = self.retry_base_delay * 2u32.pow(attempt);
                tracing::debug!(%url, attempt, ?delay, error = %last_err, "retrying request");
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_err)
    }
}

impl HistorySource for ApiClient {
    async fn fetch_page(&self, chat_id: i64, limit: usize, offset: usize) -> Result<Page, CoreError> {
        Ok(self.fetch_messages(chat_id, limit, offset).await?)
    }
}

impl SendTransport for ApiClient {
    async fn send_text(&self, request: &SendRequest) -> Result<(), CoreError> {
        Ok(self.send(request).await?)
    }

    async fn send_attachment(
        &self,
        request: &SendAttachmentRequest,
    ) -> Result<Option<String>, CoreError> {
        Ok(self.send_attachment_file(request).await?)
    }
}
