//! Bounded concurrent upload of a message's attachments.

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use super::config::UploadConfig;
use super::error::BridgeError;
use super::ingest::{CancelToken, FileIngestor};
use super::types::{AttachmentRequest, FileInfo};

/// Upload every attachment and keep the successes, in input order.
///
/// At most `limits.max_concurrent_uploads` uploads run at once and the whole
/// batch shares one `limits.upload_timeout` deadline; uploads still pending
/// when it passes are cancelled. Failures are logged and dropped.
pub async fn upload_all(
    ingestor: &FileIngestor,
    attachments: Vec<AttachmentRequest>,
    limits: &UploadConfig,
) -> Vec<FileInfo> {
    if attachments.is_empty() {
        return Vec::new();
    }

    let total = attachments.len();
    let semaphore = Semaphore::new(limits.max_concurrent_uploads.max(1));
    let cancel = CancelToken::never().with_deadline(Instant::now() + limits.upload_timeout);

    let uploads = attachments.into_iter().enumerate().map(|(index, attachment)| {
        let semaphore = &semaphore;
        let cancel = &cancel;
        async move {
            let kind = attachment.kind;
            let name = attachment.file_name.clone().unwrap_or_default();

            let result = match cancel
                .guard(async {
                    semaphore
                        .acquire()
                        .await
                        .map_err(|e| BridgeError::Config(e.to_string()))
                })
                .await
            {
                Ok(_permit) => {
                    ingestor
                        .ingest_with_cancel(attachment.into_upload(), cancel)
                        .await
                }
                Err(err) => Err(err),
            };

            match result {
                Ok(info) => Some(info),
                Err(err) => {
                    tracing::warn!(
                        index,
                        kind = kind.as_str(),
                        file_name = %name,
                        error = %err,
                        "Attachment upload failed"
                    );
                    None
                }
            }
        }
    });

    let uploaded: Vec<FileInfo> = join_all(uploads).await.into_iter().flatten().collect();

    tracing::info!(
        total,
        succeeded = uploaded.len(),
        failed = total - uploaded.len(),
        "Attachment uploads finished"
    );

    uploaded
}
