//! OCR backend client (`/ocr-bulk`, `/ocr-job/{id}`).

use crate::config::AppConfig;
use crate::error::{FrontError, Result};
use crate::model::{value_as_text, EditableField, JobStatus};
use crate::normalize::BulkReply;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// A file picked by the user, forwarded verbatim.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Operations the pages need from the OCR backend.
#[async_trait::async_trait]
pub trait OcrBackend: Send + Sync {
    /// Send all files in one multipart request.
    async fn submit_bulk(&self, files: Vec<UploadFile>) -> Result<BulkReply>;

    /// Fetch the current status of a queued job.
    async fn job_status(&self, job_id: &str) -> Result<JobStatus>;

    /// Save one field of one stored row.
    async fn patch_field(&self, row_id: &str, field: EditableField, value: &str) -> Result<()>;
}

/// reqwest-backed [`OcrBackend`].
#[derive(Clone)]
pub struct BackendClient {
    client: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.backend_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl OcrBackend for BackendClient {
    async fn submit_bulk(&self, files: Vec<UploadFile>) -> Result<BulkReply> {
        let file_count = files.len();
        let mut form = Form::new();
        for file in files {
            let mut part = Part::bytes(file.data).file_name(file.filename);
            if let Some(ct) = file.content_type.as_deref() {
                part = part.mime_str(ct)?;
            }
            form = form.part("files", part);
        }

        info!("Submitting {} file(s) to {}/ocr-bulk", file_count, self.base_url);

        let resp = self
            .client
            .post(format!("{}/ocr-bulk", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!(
            "ocr-bulk reply {} ({} bytes): {}",
            status,
            text.len(),
            text.chars().take(500).collect::<String>()
        );

        if !status.is_success() {
            return Err(FrontError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&text, "Upload failed"),
            });
        }

        let json = parse_body(&text)?;
        Ok(BulkReply::decode(json))
    }

    async fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let resp = self
            .client
            .get(format!(
                "{}/ocr-job/{}",
                self.base_url,
                urlencoding::encode(job_id)
            ))
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(FrontError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&text, &format!("HTTP {}", status.as_u16())),
            });
        }

        serde_json::from_str(&text).map_err(|_| FrontError::InvalidJson)
    }

    async fn patch_field(&self, row_id: &str, field: EditableField, value: &str) -> Result<()> {
        let mut body = Map::new();
        body.insert(field.column().to_string(), Value::String(value.to_string()));

        info!("Saving {} of row {}", field.column(), row_id);

        let resp = self
            .client
            .patch(format!("{}/ocr-bulk", self.base_url))
            .query(&[("id", row_id)])
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FrontError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&text, "Save failed"),
            });
        }

        Ok(())
    }
}

/// Parse a reply body; an empty body decodes as `null`.
pub fn parse_body(text: &str) -> Result<Value> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(text).map_err(|_| FrontError::InvalidJson)
}

/// Pick a human-readable message out of an error body.
///
/// JSON bodies yield `detail`, then `error`, then the JSON text; plain bodies
/// are returned as-is; empty bodies fall back to `fallback`.
pub fn upstream_message(text: &str, fallback: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }

    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return trimmed.to_string();
    };

    for key in ["detail", "error"] {
        match json.get(key) {
            None | Some(Value::Null) => continue,
            Some(v) => {
                if let Some(text) = value_as_text(v).filter(|t| !t.is_empty()) {
                    return text;
                }
                if !v.is_string() {
                    return v.to_string();
                }
            }
        }
    }

    match json {
        Value::Null => fallback.to_string(),
        other => other.to_string(),
    }
}
