//! Protocol adapter between OpenAI-style chat requests and the Monica backend.
//!
//! This module provides:
//! - Model routing (public model name to backend bot id)
//! - Conversation building (message list to threaded item chain)
//! - Attachment extraction (images and embedded documents)
//! - Bounded concurrent uploads with a shared deadline
//! - File ingestion (presign, store, register, index)
//! - A content-addressed upload cache
//! - Backend event stream translation to OpenAI chunks

pub mod backend;
pub mod cache;
pub mod config;
pub mod conversation;
pub mod error;
pub mod extract;
pub mod fanout;
pub mod ingest;
pub mod mime;
pub mod models;
pub mod openai;
pub mod sse;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{FileBackend, HttpBackend};
pub use cache::{CacheStats, UploadCache};
pub use config::GatewayConfig;
pub use error::{BridgeError, BridgeResult};
pub use ingest::{CancelToken, FileIngestor};
pub use openai::{ChatCompletionRequest, ModelList};
pub use types::{BackendRequest, FileInfo, UploadRequest};

use std::sync::Arc;

/// Main adapter service that coordinates chat building, uploads and caching.
pub struct BridgeService {
    config: GatewayConfig,
    cache: Arc<UploadCache>,
    http: Arc<HttpBackend>,
    ingestor: FileIngestor,
}

impl BridgeService {
    /// Create a new service talking to the configured backend.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn new(config: GatewayConfig) -> BridgeResult<Self> {
        config.validate()?;
        let http = Arc::new(HttpBackend::new(config.backend.clone())?);
        let files: Arc<dyn FileBackend> = http.clone();
        Ok(Self::assemble(config, http, files))
    }

    /// Create a service whose file uploads go to `files` instead of HTTP.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be created.
    pub fn with_file_backend(
        config: GatewayConfig,
        files: Arc<dyn FileBackend>,
    ) -> BridgeResult<Self> {
        config.validate()?;
        let http = Arc::new(HttpBackend::new(config.backend.clone())?);
        Ok(Self::assemble(config, http, files))
    }

    fn assemble(config: GatewayConfig, http: Arc<HttpBackend>, files: Arc<dyn FileBackend>) -> Self {
        let cache = Arc::new(UploadCache::new(config.cache.clone()));
        let ingestor = FileIngestor::new(files, cache.clone(), config.upload.clone());
        Self {
            config,
            cache,
            http,
            ingestor,
        }
    }

    /// Current configuration.
    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Translate a chat request into the configured backend envelope.
    ///
    /// Attachments are uploaded on the way; failed ones are left out.
    ///
    /// # Errors
    /// Returns `EmptyInput` when the request has no messages.
    pub async fn build_request(&self, request: &ChatCompletionRequest) -> BridgeResult<BackendRequest> {
        conversation::build(&self.ingestor, request, &self.config.bot).await
    }

    /// Forward a backend envelope and return the raw streaming response.
    ///
    /// # Errors
    /// Returns an error on transport failure or a non-2xx backend status.
    pub async fn send_chat(&self, request: &BackendRequest) -> BridgeResult<reqwest::Response> {
        self.http.send_chat(request).await
    }

    /// Run one file through the ingestion pipeline.
    ///
    /// # Errors
    /// See [`FileIngestor::ingest_with_cancel`].
    pub async fn upload_file(&self, request: UploadRequest) -> BridgeResult<FileInfo> {
        let deadline = tokio::time::Instant::now() + self.config.upload.upload_timeout;
        let cancel = CancelToken::never().with_deadline(deadline);
        self.ingestor.ingest_with_cancel(request, &cancel).await
    }

    /// Models exposed on `/v1/models`.
    #[must_use]
    pub fn models(&self) -> ModelList {
        ModelList::from_names(&models::supported_models())
    }

    /// Get upload cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Clear the upload cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
