//! Upload submission: send files, wait for the job if needed, normalize.

use crate::backend::{OcrBackend, UploadFile};
use crate::config::AppConfig;
use crate::error::{FrontError, Result};
use crate::model::UploadBatch;
use crate::normalize::{batch_from_items, batch_from_job_results, empty_batch, BulkReply};
use crate::poller::{Clock, JobPoller};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Everything one submission needs from the outside world.
pub struct Uploader<'a> {
    backend: &'a dyn OcrBackend,
    clock: &'a dyn Clock,
    config: &'a AppConfig,
}

impl<'a> Uploader<'a> {
    pub fn new(backend: &'a dyn OcrBackend, clock: &'a dyn Clock, config: &'a AppConfig) -> Self {
        Self {
            backend,
            clock,
            config,
        }
    }

    /// Submit `files` and return the normalized batch.
    ///
    /// Fails with [`FrontError::NoFiles`] before any request when `files` is empty.
    pub async fn submit(&self, files: Vec<UploadFile>) -> Result<UploadBatch> {
        if files.is_empty() {
            return Err(FrontError::NoFiles);
        }

        let submission = Uuid::new_v4().simple().to_string();
        let span = tracing::info_span!("upload", submission = %submission, files = files.len());
        self.submit_inner(files).instrument(span).await
    }

    async fn submit_inner(&self, files: Vec<UploadFile>) -> Result<UploadBatch> {
        let reply = self.backend.submit_bulk(files).await?;

        let batch = match reply {
            BulkReply::Inline {
                batch_id,
                count,
                items,
            } => batch_from_items(batch_id, count, &items),
            BulkReply::Pending { job_id, batch_id } => {
                info!("Backend queued job {}", job_id);
                let status =
                    JobPoller::from_config(job_id.as_str(), self.backend, self.clock, self.config)
                        .run()
                        .await?;
                let fallback = if batch_id.is_empty() { &job_id } else { &batch_id };
                batch_from_job_results(fallback, status.results)
            }
            BulkReply::Unrecognized(value) => {
                warn!("Unrecognized ocr-bulk reply, showing no products: {}", value);
                empty_batch("")
            }
        };

        info!(
            "Batch {:?} normalized: {} product(s)",
            batch.batch_id,
            batch.products.len()
        );
        Ok(batch)
    }
}
