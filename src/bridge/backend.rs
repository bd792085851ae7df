//! Backend file and chat endpoints.
//!
//! [`FileBackend`] covers the calls the ingestion pipeline makes, so tests can
//! swap in an in-memory fake. [`HttpBackend`] is the real implementation.

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::config::BackendConfig;
use super::error::{BridgeError, BridgeResult};
use super::types::{
    BackendRequest, BatchGetRequest, BatchGetResponse, FileRegisterRequest, FileRegisterResponse,
    IndexedFile, PreSignData, PreSignRequest, PreSignResponse, RegisteredFile,
};

/// Phase A endpoint.
pub const PRE_SIGN_PATH: &str = "file_object/pre_sign_list_by_module";
/// Phase C endpoint.
pub const FILE_REGISTER_PATH: &str = "files/batch_create_llm_file";
/// Indexing status endpoint.
pub const FILE_STATUS_PATH: &str = "files/batch_get_file";
/// Generic bot chat endpoint.
pub const BOT_CHAT_PATH: &str = "custom_bot/chat";
/// Custom bot chat endpoint.
pub const CUSTOM_BOT_CHAT_PATH: &str = "custom_bot/preview_chat";

/// Boxed future type for backend operations.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A downloaded attachment.
#[derive(Clone, Debug, Default)]
pub struct Downloaded {
    /// Response body.
    pub bytes: Vec<u8>,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
}

/// Backend calls used by file ingestion.
pub trait FileBackend: Send + Sync {
    /// Request pre-signed upload URLs.
    ///
    /// # Errors
    /// Returns an error if the call fails or is rejected.
    fn presign(&self, request: PreSignRequest) -> BackendFuture<'_, BridgeResult<PreSignData>>;

    /// Store raw bytes at a pre-signed URL.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx status.
    fn store(
        &self,
        url: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendFuture<'_, BridgeResult<()>>;

    /// Register uploaded objects as LLM files.
    ///
    /// # Errors
    /// Returns an error if the call fails or is rejected.
    fn register(
        &self,
        request: FileRegisterRequest,
    ) -> BackendFuture<'_, BridgeResult<Vec<RegisteredFile>>>;

    /// Query indexing status.
    ///
    /// # Errors
    /// Returns an error if the call fails or is rejected.
    fn batch_get(&self, file_uids: Vec<String>) -> BackendFuture<'_, BridgeResult<Vec<IndexedFile>>>;

    /// Fetch a remote attachment of at most `max_bytes`.
    ///
    /// # Errors
    /// Returns `Preprocess` on transport failure, a non-200 status, or a body
    /// larger than `max_bytes`.
    fn download(&self, url: &str, max_bytes: u64) -> BackendFuture<'_, BridgeResult<Downloaded>>;
}

/// HTTP implementation of the backend.
pub struct HttpBackend {
    config: BackendConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    /// Create a backend client.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: BackendConfig) -> BridgeResult<Self> {
        let client = Self::build_client(&config)?;
        Ok(Self { config, client })
    }

    fn build_client(config: &BackendConfig) -> BridgeResult<reqwest::Client> {
        let mut headers = HeaderMap::new();

        if let Ok(ua_value) = HeaderValue::from_str(&config.user_agent) {
            headers.insert(USER_AGENT, ua_value);
        }

        reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| BridgeError::HttpClient(e.to_string()))
    }

    /// Backend configuration.
    #[must_use]
    pub const fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// POST a JSON body to a backend path with the session cookie.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> BridgeResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.config.endpoint(path);
        let response = self
            .client
            .post(&url)
            .header("cookie", &self.config.cookie)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Upstream(format!(
                "{path} returned {status}: {}",
                truncate(&text, 200)
            )));
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Forward an assembled chat envelope; the SSE response is returned as-is.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn send_chat(&self, request: &BackendRequest) -> BridgeResult<reqwest::Response> {
        let path = match request {
            BackendRequest::BotChat(_) => BOT_CHAT_PATH,
            BackendRequest::CustomBot(_) => CUSTOM_BOT_CHAT_PATH,
        };

        if tracing::enabled!(tracing::Level::DEBUG) {
            let body = serde_json::to_value(request)?;
            tracing::debug!(endpoint = path, body = %mask_sensitive(&body), "Sending chat request");
        }

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(self.config.endpoint(path))
            .header("cookie", &self.config.cookie)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        tracing::info!(
            endpoint = path,
            status = status.as_u16(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Chat request answered"
        );

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Upstream(format!(
                "{path} returned {status}: {}",
                truncate(&text, 200)
            )));
        }

        Ok(response)
    }
}

impl FileBackend for HttpBackend {
    fn presign(&self, request: PreSignRequest) -> BackendFuture<'_, BridgeResult<PreSignData>> {
        Box::pin(async move {
            let response: PreSignResponse = self.post_json(PRE_SIGN_PATH, &request).await?;
            Ok(response.data)
        })
    }

    fn store(
        &self,
        url: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> BackendFuture<'_, BridgeResult<()>> {
        let url = url.to_string();
        let content_type = content_type.to_string();
        Box::pin(async move {
            let response = self
                .client
                .put(&url)
                .header(CONTENT_TYPE, content_type)
                .body(bytes)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                return Err(BridgeError::Upstream(format!(
                    "object store returned {status}"
                )));
            }
            Ok(())
        })
    }

    fn register(
        &self,
        request: FileRegisterRequest,
    ) -> BackendFuture<'_, BridgeResult<Vec<RegisteredFile>>> {
        Box::pin(async move {
            let response: FileRegisterResponse =
                self.post_json(FILE_REGISTER_PATH, &request).await?;
            Ok(response.data.items)
        })
    }

    fn batch_get(&self, file_uids: Vec<String>) -> BackendFuture<'_, BridgeResult<Vec<IndexedFile>>> {
        Box::pin(async move {
            let request = BatchGetRequest { file_uids };
            let response: BatchGetResponse = self.post_json(FILE_STATUS_PATH, &request).await?;
            Ok(response.data.items)
        })
    }

    fn download(&self, url: &str, max_bytes: u64) -> BackendFuture<'_, BridgeResult<Downloaded>> {
        let url = url.to_string();
        Box::pin(async move {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| BridgeError::Preprocess(format!("download file from URL failed: {e}")))?;

            let status = response.status();
            if status != reqwest::StatusCode::OK {
                return Err(BridgeError::Preprocess(format!(
                    "download failed with status: {}",
                    status.as_u16()
                )));
            }

            if let Some(len) = response.content_length().filter(|len| *len > max_bytes) {
                return Err(BridgeError::Preprocess(format!(
                    "remote file too large: {len} > {max_bytes} bytes"
                )));
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let bytes = read_capped(response.bytes_stream(), max_bytes).await?;

            Ok(Downloaded {
                bytes,
                content_type,
            })
        })
    }
}

/// Collect a body stream, giving up as soon as it grows past `max_bytes`.
///
/// # Errors
/// Returns `Preprocess` when a chunk fails or the cap is exceeded.
pub async fn read_capped<S, B, E>(stream: S, max_bytes: u64) -> BridgeResult<Vec<u8>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = Box::pin(stream);
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BridgeError::Preprocess(format!("read file data failed: {e}")))?;
        body.extend_from_slice(chunk.as_ref());
        if body.len() as u64 > max_bytes {
            return Err(BridgeError::Preprocess(format!(
                "remote file too large: more than {max_bytes} bytes"
            )));
        }
    }
    Ok(body)
}

/// Credential names whose values never reach the logs, matched exactly or as
/// a `_`-separated suffix (`api_key`, `access_token`).
const SENSITIVE_KEYS: &[&str] = &[
    "cookie",
    "token",
    "secret",
    "key",
    "password",
    "authorization",
];

fn is_sensitive(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    SENSITIVE_KEYS.iter().any(|name| {
        lower == *name
            || lower
                .strip_suffix(name)
                .is_some_and(|prefix| prefix.ends_with('_') || prefix.ends_with('-'))
    })
}

/// Copy of a JSON value with credential-like fields replaced by `***`.
#[must_use]
pub fn mask_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    if is_sensitive(key) {
                        (key.clone(), Value::String("***".to_string()))
                    } else {
                        (key.clone(), mask_sensitive(inner))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(mask_sensitive).collect()),
        other => other.clone(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
