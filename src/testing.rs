//! In-process fakes for the upstream services and the clock.

use crate::backend::{OcrBackend, UploadFile};
use crate::error::{FrontError, Result};
use crate::model::{EditableField, JobStatus, ProductRow};
use crate::normalize::BulkReply;
use crate::poller::Clock;
use crate::supabase::ProductSource;
use serde_json::Value;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Scripted reply of the job status endpoint.
pub enum JobReply {
    Status(String, Option<Value>),
    /// 503 from the backend.
    Unavailable,
    /// 404 from the backend.
    Missing,
}

impl JobReply {
    pub fn status(status: &str) -> Self {
        JobReply::Status(status.to_string(), None)
    }

    pub fn done(results: Value) -> Self {
        JobReply::Status("done".to_string(), Some(results))
    }
}

/// Fake OCR backend. Job status defaults to `pending` once the script runs out.
#[derive(Default)]
pub struct MockBackend {
    bulk_reply: Mutex<Option<Result<BulkReply>>>,
    job_replies: Mutex<VecDeque<JobReply>>,
    failing_fields: Mutex<HashSet<EditableField>>,
    pub submit_calls: AtomicUsize,
    pub job_calls: AtomicUsize,
    pub submitted_files: Mutex<Vec<String>>,
    pub patches: Mutex<Vec<(String, EditableField, String)>>,
}

impl MockBackend {
    pub fn with_bulk(self, reply: Result<BulkReply>) -> Self {
        *self.bulk_reply.lock().unwrap() = Some(reply);
        self
    }

    pub fn with_jobs(self, replies: Vec<JobReply>) -> Self {
        self.job_replies.lock().unwrap().extend(replies);
        self
    }

    pub fn failing(self, field: EditableField) -> Self {
        self.failing_fields.lock().unwrap().insert(field);
        self
    }
}

#[async_trait::async_trait]
impl OcrBackend for MockBackend {
    async fn submit_bulk(&self, files: Vec<UploadFile>) -> Result<BulkReply> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submitted_files
            .lock()
            .unwrap()
            .extend(files.into_iter().map(|f| f.filename));
        self.bulk_reply
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Ok(BulkReply::Unrecognized(Value::Null)))
    }

    async fn job_status(&self, _job_id: &str) -> Result<JobStatus> {
        self.job_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.job_replies.lock().unwrap().pop_front();
        match next {
            Some(JobReply::Status(status, results)) => Ok(JobStatus { status, results }),
            Some(JobReply::Unavailable) => Err(FrontError::Upstream {
                status: 503,
                message: "Service Unavailable".into(),
            }),
            Some(JobReply::Missing) => Err(FrontError::Upstream {
                status: 404,
                message: "Job not found".into(),
            }),
            None => Ok(JobStatus {
                status: "pending".into(),
                results: None,
            }),
        }
    }

    async fn patch_field(&self, row_id: &str, field: EditableField, value: &str) -> Result<()> {
        self.patches
            .lock()
            .unwrap()
            .push((row_id.to_string(), field, value.to_string()));
        if self.failing_fields.lock().unwrap().contains(&field) {
            return Err(FrontError::Upstream {
                status: 500,
                message: "Save failed".into(),
            });
        }
        Ok(())
    }
}

/// Clock whose `sleep` advances time instantly.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Fake database listing.
#[derive(Default)]
pub struct MockSource {
    rows: Mutex<Vec<ProductRow>>,
    failure: Mutex<Option<String>>,
    pub filters: Mutex<Vec<Option<String>>>,
}

impl MockSource {
    pub fn with_rows(self, rows: Vec<ProductRow>) -> Self {
        *self.rows.lock().unwrap() = rows;
        self
    }

    pub fn failing_with(self, message: &str) -> Self {
        *self.failure.lock().unwrap() = Some(message.to_string());
        self
    }
}

#[async_trait::async_trait]
impl ProductSource for MockSource {
    async fn list_products(&self, batch_id: Option<&str>) -> Result<Vec<ProductRow>> {
        self.filters
            .lock()
            .unwrap()
            .push(batch_id.map(str::to_string));

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(FrontError::Upstream {
                status: 500,
                message,
            });
        }

        let rows = self.rows.lock().unwrap().clone();
        Ok(match batch_id {
            Some(id) => rows
                .into_iter()
                .filter(|r| r.batch_id.as_deref() == Some(id))
                .collect(),
            None => rows,
        })
    }
}

pub fn row(id: &str, batch_id: &str) -> ProductRow {
    ProductRow {
        id: id.to_string(),
        batch_id: Some(batch_id.to_string()),
        ..ProductRow::default()
    }
}
