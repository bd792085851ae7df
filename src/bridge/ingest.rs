//! File ingestion pipeline: normalize, deduplicate, validate, upload, index.

use std::future::Future;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tokio::sync::watch;
use tokio::time::Instant;
use url::Url;

use super::backend::FileBackend;
use super::cache::{UploadCache, cache_key};
use super::config::UploadConfig;
use super::error::{BridgeError, BridgeResult};
use super::mime::{self, FileTypeInfo};
use super::types::{FileInfo, FileRegisterRequest, PreSignRequest, UploadPayload, UploadRequest};

/// Backend module the uploads belong to.
const UPLOAD_MODULE: &str = "chat_bot";
/// Storage location of uploads.
const UPLOAD_LOCATION: &str = "files";

/// Fires a [`CancelToken`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel every token cloned from this handle's pair.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Cooperative cancellation signal with an optional deadline.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never fires.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            rx: None,
            deadline: None,
        }
    }

    /// A token fired through the returned handle.
    #[must_use]
    pub fn pair() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            Self {
                rx: Some(rx),
                deadline: None,
            },
        )
    }

    /// Also fire once `deadline` passes.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Whether the token has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return true;
        }
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolve once the token fires. Pending forever for [`CancelToken::never`].
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let deadline = self.deadline;

        let signal = async move {
            if let Some(rx) = rx.as_mut() {
                loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // Handle dropped without firing.
                        break;
                    }
                }
            }
            std::future::pending::<()>().await;
        };
        let timer = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            () = signal => {}
            () = timer => {}
        }
    }

    /// Run `fut`, aborting with [`BridgeError::Cancelled`] if the token fires first.
    ///
    /// # Errors
    /// Returns the future's error, or `Cancelled`.
    pub async fn guard<T, F>(&self, fut: F) -> BridgeResult<T>
    where
        F: Future<Output = BridgeResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.cancelled() => Err(BridgeError::Cancelled),
            result = fut => result,
        }
    }

    /// Tighten the deadline to `deadline` if it is earlier than the current one.
    fn with_deadline_if_sooner(mut self, deadline: Instant) -> Self {
        match self.deadline {
            Some(current) if current <= deadline => {}
            _ => self.deadline = Some(deadline),
        }
        self
    }

    /// Whether the effective deadline is `deadline` and it has passed.
    fn deadline_is(&self, deadline: Instant) -> bool {
        self.deadline == Some(deadline)
            && Instant::now() >= deadline
            && !self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

/// Attachment bytes with resolved name and type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedFile {
    /// Decoded content.
    pub bytes: Vec<u8>,
    /// File name, synthesised when absent.
    pub file_name: String,
    /// MIME type without parameters.
    pub mime_type: String,
}

/// Turns attachment payloads into indexed backend files.
pub struct FileIngestor {
    backend: Arc<dyn FileBackend>,
    cache: Arc<UploadCache>,
    config: UploadConfig,
}

impl FileIngestor {
    /// Create an ingestor over a backend and a shared cache.
    #[must_use]
    pub fn new(backend: Arc<dyn FileBackend>, cache: Arc<UploadCache>, config: UploadConfig) -> Self {
        Self {
            backend,
            cache,
            config,
        }
    }

    /// Upload settings.
    #[must_use]
    pub const fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Shared upload cache.
    #[must_use]
    pub const fn cache(&self) -> &Arc<UploadCache> {
        &self.cache
    }

    /// Ingest one file without a cancellation signal.
    ///
    /// # Errors
    /// See [`FileIngestor::ingest_with_cancel`].
    pub async fn ingest(&self, request: UploadRequest) -> BridgeResult<FileInfo> {
        self.ingest_with_cancel(request, &CancelToken::never()).await
    }

    /// Ingest one file.
    ///
    /// Returns a sanitized [`FileInfo`]; identical content is served from the
    /// cache without any backend call.
    ///
    /// # Errors
    /// `Preprocess` for undecodable or unreachable data, `Validation` for
    /// unsupported or oversized files, `Upstream` when the backend rejects a
    /// phase or reports an indexing failure, `ProcessingTimeout` when indexing
    /// does not finish, `Cancelled` when `cancel` fires.
    pub async fn ingest_with_cancel(
        &self,
        request: UploadRequest,
        cancel: &CancelToken,
    ) -> BridgeResult<FileInfo> {
        if cancel.is_cancelled() {
            return Err(BridgeError::Cancelled);
        }

        let parse_file = request.parse_file;
        let source = request.payload.source();
        let file = cancel.guard(self.normalize(request)).await?;

        let key = cache_key(&file.bytes, &file.file_name, &file.mime_type);
        if let Some(hit) = self.cache.get(&key) {
            tracing::debug!(file_name = %file.file_name, file_uid = %hit.file_uid, "Upload cache hit");
            return Ok(hit);
        }

        let type_info = self.validate(&file)?;
        let file_size = file.bytes.len() as u64;

        tracing::info!(
            file_name = %file.file_name,
            file_type = %file.mime_type,
            file_size,
            source,
            "Uploading file"
        );

        let presigned = cancel
            .guard(self.backend.presign(PreSignRequest {
                filename_list: vec![file.file_name.clone()],
                module: UPLOAD_MODULE.to_string(),
                location: UPLOAD_LOCATION.to_string(),
                obj_id: uuid::Uuid::new_v4().to_string(),
            }))
            .await?;

        let (Some(pre_sign_url), Some(object_url)) = (
            presigned.pre_sign_url_list.first(),
            presigned.object_url_list.first(),
        ) else {
            return Err(BridgeError::Upstream(
                "no pre-sign url or object url returned".to_string(),
            ));
        };

        cancel
            .guard(self.backend.store(pre_sign_url, &file.mime_type, file.bytes))
            .await?;

        let mut info = FileInfo {
            url: String::new(),
            file_url: String::new(),
            file_uid: String::new(),
            parse: parse_file,
            file_name: file.file_name,
            file_size,
            file_type: file.mime_type,
            file_ext: type_info.extension.to_string(),
            file_tokens: 0,
            file_chunks: 0,
            object_url: object_url.clone(),
            use_full_text: true,
        };

        let registered = cancel
            .guard(self.backend.register(FileRegisterRequest {
                data: vec![info.clone()],
            }))
            .await?;
        let Some(item) = registered.into_iter().next() else {
            return Err(BridgeError::Upstream(
                "file registration returned no items".to_string(),
            ));
        };
        if item.file_uid.is_empty() {
            return Err(BridgeError::Upstream(
                "file registration returned no file uid".to_string(),
            ));
        }

        info.file_uid = item.file_uid;
        if !item.file_name.is_empty() {
            info.file_name = item.file_name;
        }
        if !item.file_type.is_empty() {
            info.file_ext.clone_from(&item.file_type);
            info.file_type = item.file_type;
        }
        if item.file_size > 0 {
            info.file_size = item.file_size;
        }
        info.file_tokens = item.file_tokens;
        info.file_chunks = item.file_chunks;
        info.file_url = presigned.cdn_url_list.first().cloned().unwrap_or_default();

        if parse_file {
            let (tokens, chunks) = self.wait_for_indexing(&info.file_uid, cancel).await?;
            info.file_tokens = tokens;
            info.file_chunks = chunks;
        }

        let stored = self.cache.insert(&key, info);

        tracing::info!(
            file_uid = %stored.file_uid,
            file_tokens = stored.file_tokens,
            file_chunks = stored.file_chunks,
            "File uploaded successfully"
        );

        Ok(stored)
    }

    /// Decode the payload and resolve file name and MIME type.
    ///
    /// # Errors
    /// Returns `Preprocess` when the payload cannot be decoded or fetched.
    pub async fn normalize(&self, request: UploadRequest) -> BridgeResult<NormalizedFile> {
        let declared = request
            .mime_type
            .as_deref()
            .map(mime::essence)
            .filter(|m| !m.is_empty());
        let mut file_name = request.file_name.filter(|n| !n.trim().is_empty());

        let (bytes, mime_type) = match request.payload {
            UploadPayload::Base64(data) => {
                let (header_mime, encoded) = split_data_url(&data);
                let bytes = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| BridgeError::Preprocess(format!("decode base64 failed: {e}")))?;
                let mime_type = declared
                    .or_else(|| header_mime.map(mime::essence))
                    .unwrap_or_else(|| mime::essence(mime::sniff(&bytes)));
                (bytes, mime_type)
            }
            UploadPayload::Url(url) => {
                let downloaded = self.backend.download(&url, self.config.max_file_size).await?;
                if file_name.is_none() {
                    file_name = file_name_from_url(&url);
                }
                let mime_type = declared
                    .or_else(|| {
                        downloaded
                            .content_type
                            .as_deref()
                            .map(mime::essence)
                            .filter(|m| !m.is_empty())
                    })
                    .unwrap_or_else(|| mime::essence(mime::sniff(&downloaded.bytes)));
                (downloaded.bytes, mime_type)
            }
            UploadPayload::Bytes(bytes) => {
                let mime_type = declared.unwrap_or_else(|| mime::essence(mime::sniff(&bytes)));
                (bytes, mime_type)
            }
        };

        let file_name = file_name.unwrap_or_else(|| {
            format!("{}{}", uuid::Uuid::new_v4(), mime::extension_for(&mime_type))
        });

        Ok(NormalizedFile {
            bytes,
            file_name,
            mime_type,
        })
    }

    /// Check type support and size ceilings.
    ///
    /// # Errors
    /// Returns `Validation` for unsupported types or oversized payloads.
    pub fn validate(&self, file: &NormalizedFile) -> BridgeResult<&'static FileTypeInfo> {
        let Some(type_info) = mime::lookup(&file.mime_type) else {
            return Err(BridgeError::Validation(format!(
                "unsupported file type: {}",
                file.mime_type
            )));
        };

        let size = file.bytes.len() as u64;
        let limit = type_info.category.max_size(&self.config);
        if size > limit {
            return Err(BridgeError::Validation(format!(
                "file size exceeds limit: {size} > {limit} bytes"
            )));
        }

        let detected = mime::sniff(&file.bytes);
        if !mime::is_compatible(detected, &file.mime_type) {
            tracing::warn!(
                provided = %file.mime_type,
                detected,
                file_name = %file.file_name,
                "MIME type mismatch"
            );
        }

        Ok(type_info)
    }

    /// Poll indexing status until done, failed, exhausted or cancelled.
    async fn wait_for_indexing(&self, file_uid: &str, cancel: &CancelToken) -> BridgeResult<(i64, i64)> {
        let retries = self.config.poll_retries;
        let give_up_at = Instant::now() + self.config.max_index_wait;
        let cancel = cancel.clone().with_deadline_if_sooner(give_up_at);

        for attempt in 1..=retries {
            let statuses = match cancel
                .guard(self.backend.batch_get(vec![file_uid.to_string()]))
                .await
            {
                Err(BridgeError::Cancelled) if cancel.deadline_is(give_up_at) => {
                    return Err(BridgeError::ProcessingTimeout { retries: attempt });
                }
                other => other?,
            };

            if let Some(status) = statuses.first() {
                if status.is_indexed() {
                    tracing::debug!(file_uid, attempt, "File indexed");
                    return Ok((status.file_tokens, status.file_chunks));
                }
                if !status.error_message.is_empty() {
                    return Err(BridgeError::Upstream(format!(
                        "file processing failed: {}",
                        status.error_message
                    )));
                }
                tracing::debug!(
                    file_uid,
                    index_state = status.index_state,
                    attempt,
                    "File still processing"
                );
            }

            if attempt < retries {
                let sleep = tokio::time::sleep(self.config.poll_interval);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        if cancel.deadline_is(give_up_at) {
                            return Err(BridgeError::ProcessingTimeout { retries: attempt });
                        }
                        return Err(BridgeError::Cancelled);
                    }
                    () = sleep => {}
                }
            }
        }

        Err(BridgeError::ProcessingTimeout { retries })
    }
}

/// Split `data:<mime>;base64,<payload>` into its MIME type and payload.
fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let Some((header, payload)) = data.split_once(',') else {
        return (None, data);
    };
    let mime = header
        .strip_prefix("data:")
        .and_then(|rest| rest.strip_suffix(";base64"))
        .filter(|m| !m.is_empty());
    (mime, payload)
}

/// Last non-empty path segment of a URL.
fn file_name_from_url(raw: &str) -> Option<String> {
    let url = Url::parse(raw).ok()?;
    url.path_segments()?
        .rfind(|segment| !segment.is_empty())
        .map(str::to_string)
}
