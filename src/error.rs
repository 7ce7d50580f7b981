//! Error taxonomy shared by the pages.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FrontError {
    #[error("Please select some images first")]
    NoFiles,

    #[error("No data to export")]
    EmptyExport,

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid JSON from server")]
    InvalidJson,

    /// Non-success upstream status; `message` is already extracted from the body.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("Timed out waiting for job {} after {}s", .job_id, .waited.as_secs())]
    Timeout { job_id: String, waited: Duration },

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
}

impl FrontError {
    /// Whether a job-status poll hitting this error should simply try again.
    pub fn is_transient(&self) -> bool {
        match self {
            FrontError::Transport(_) | FrontError::InvalidJson => true,
            FrontError::Upstream { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrontError>;
