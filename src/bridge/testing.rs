//! In-memory backend used by the adapter's tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::backend::{BackendFuture, Downloaded, FileBackend};
use super::error::{BridgeError, BridgeResult};
use super::types::{
    FileInfo, FileRegisterRequest, INDEX_STATE_DONE, IndexedFile, PreSignData, PreSignRequest,
    RegisteredFile,
};

/// How the fake reports indexing progress.
#[derive(Clone, Debug)]
pub enum Indexing {
    /// Indexed on the first poll.
    Immediate,
    /// Indexed on the given poll.
    AfterPolls(usize),
    /// Never finishes.
    Never,
    /// Reports an error message.
    Fails(String),
}

/// Fake backend counting every call it serves.
pub struct FakeBackend {
    indexing: Indexing,
    presign_urls: bool,
    fail_store_for: Option<String>,
    store_delay: Duration,
    downloads: Mutex<HashMap<String, Downloaded>>,
    polls_per_uid: Mutex<HashMap<String, usize>>,
    registered: Mutex<Vec<FileInfo>>,
    pub presign_calls: AtomicUsize,
    pub store_calls: AtomicUsize,
    pub register_calls: AtomicUsize,
    pub poll_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new(indexing: Indexing) -> Self {
        Self {
            indexing,
            presign_urls: true,
            fail_store_for: None,
            store_delay: Duration::ZERO,
            downloads: Mutex::new(HashMap::new()),
            polls_per_uid: Mutex::new(HashMap::new()),
            registered: Mutex::new(Vec::new()),
            presign_calls: AtomicUsize::new(0),
            store_calls: AtomicUsize::new(0),
            register_calls: AtomicUsize::new(0),
            poll_calls: AtomicUsize::new(0),
        }
    }

    pub fn without_presign_urls(mut self) -> Self {
        self.presign_urls = false;
        self
    }

    /// Reject the object-store PUT for URLs containing `name`.
    pub fn fail_store_for(mut self, name: &str) -> Self {
        self.fail_store_for = Some(name.to_string());
        self
    }

    pub const fn with_store_delay(mut self, delay: Duration) -> Self {
        self.store_delay = delay;
        self
    }

    pub fn add_download(&self, url: &str, bytes: &[u8], content_type: Option<&str>) {
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.insert(
                url.to_string(),
                Downloaded {
                    bytes: bytes.to_vec(),
                    content_type: content_type.map(str::to_string),
                },
            );
        }
    }

    /// Every file record sent to registration, in call order.
    pub fn registered(&self) -> Vec<FileInfo> {
        self.registered
            .lock()
            .map(|registered| registered.clone())
            .unwrap_or_default()
    }

    pub fn total_calls(&self) -> usize {
        self.presign_calls.load(Ordering::SeqCst)
            + self.store_calls.load(Ordering::SeqCst)
            + self.register_calls.load(Ordering::SeqCst)
            + self.poll_calls.load(Ordering::SeqCst)
    }
}

impl FileBackend for FakeBackend {
    fn presign(&self, request: PreSignRequest) -> BackendFuture<'_, BridgeResult<PreSignData>> {
        Box::pin(async move {
            self.presign_calls.fetch_add(1, Ordering::SeqCst);
            if !self.presign_urls {
                return Ok(PreSignData::default());
            }
            let name = request.filename_list.first().cloned().unwrap_or_default();
            Ok(PreSignData {
                pre_sign_url_list: vec![format!("https://upload.example.com/{name}?signature=abc")],
                object_url_list: vec![format!("s3://bucket/{}/{name}", request.obj_id)],
                cdn_url_list: vec![format!("https://cdn.example.com/{name}")],
            })
        })
    }

    fn store(
        &self,
        url: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> BackendFuture<'_, BridgeResult<()>> {
        let url = url.to_string();
        Box::pin(async move {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            if !self.store_delay.is_zero() {
                tokio::time::sleep(self.store_delay).await;
            }
            if self
                .fail_store_for
                .as_deref()
                .is_some_and(|name| url.contains(name))
            {
                return Err(BridgeError::Upstream("object store returned 403".to_string()));
            }
            Ok(())
        })
    }

    fn register(
        &self,
        request: FileRegisterRequest,
    ) -> BackendFuture<'_, BridgeResult<Vec<RegisteredFile>>> {
        Box::pin(async move {
            let n = self.register_calls.fetch_add(1, Ordering::SeqCst);
            if let Ok(mut registered) = self.registered.lock() {
                registered.extend(request.data.iter().cloned());
            }
            Ok(request
                .data
                .into_iter()
                .map(|file| RegisteredFile {
                    file_uid: format!("uid-{n}-{}", file.file_name),
                    file_name: file.file_name,
                    file_type: file.file_type,
                    file_size: file.file_size,
                    file_tokens: 0,
                    file_chunks: 0,
                })
                .collect())
        })
    }

    fn batch_get(&self, file_uids: Vec<String>) -> BackendFuture<'_, BridgeResult<Vec<IndexedFile>>> {
        Box::pin(async move {
            self.poll_calls.fetch_add(1, Ordering::SeqCst);
            let mut statuses = Vec::with_capacity(file_uids.len());
            for file_uid in file_uids {
                let polls = match self.polls_per_uid.lock() {
                    Ok(mut polls) => {
                        let count = polls.entry(file_uid.clone()).or_insert(0);
                        *count += 1;
                        *count
                    }
                    Err(_) => 1,
                };
                let (index_state, file_chunks, error_message) = match &self.indexing {
                    Indexing::Immediate => (INDEX_STATE_DONE, 2, String::new()),
                    Indexing::AfterPolls(n) if polls >= *n => (INDEX_STATE_DONE, 2, String::new()),
                    Indexing::AfterPolls(_) | Indexing::Never => (1, 0, String::new()),
                    Indexing::Fails(message) => (1, 0, message.clone()),
                };
                statuses.push(IndexedFile {
                    file_uid,
                    index_state,
                    file_tokens: file_chunks * 100,
                    file_chunks,
                    error_message,
                });
            }
            Ok(statuses)
        })
    }

    fn download(&self, url: &str, max_bytes: u64) -> BackendFuture<'_, BridgeResult<Downloaded>> {
        let url = url.to_string();
        Box::pin(async move {
            let downloaded = self
                .downloads
                .lock()
                .ok()
                .and_then(|downloads| downloads.get(&url).cloned())
                .ok_or_else(|| BridgeError::Preprocess("download failed with status: 404".to_string()))?;
            if downloaded.bytes.len() as u64 > max_bytes {
                return Err(BridgeError::Preprocess(format!(
                    "remote file too large: {} > {max_bytes} bytes",
                    downloaded.bytes.len()
                )));
            }
            Ok(downloaded)
        })
    }
}
