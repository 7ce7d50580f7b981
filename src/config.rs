//! Runtime configuration.
//!
//! Every component receives an explicit [`AppConfig`] instead of reading the
//! process environment itself, so tests can point them at injected endpoints.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1200;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Endpoints, credentials and timing knobs for the front end.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the OCR backend (`/ocr-bulk`, `/ocr-job/{id}`).
    pub backend_url: String,
    /// Base URL of the Supabase project (`/rest/v1/...`).
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub bind_addr: String,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    pub http_timeout: Duration,
}

impl AppConfig {
    /// Build a config with default timings.
    pub fn new(
        backend_url: impl Into<String>,
        supabase_url: impl Into<String>,
        supabase_anon_key: impl Into<String>,
    ) -> Self {
        Self {
            backend_url: trim_base(backend_url.into()),
            supabase_url: trim_base(supabase_url.into()),
            supabase_anon_key: supabase_anon_key.into(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }

    /// Load from environment variables (call `dotenvy::dotenv()` first).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend_url = get("BACKEND_URL")
            .or_else(|| get("NEXT_PUBLIC_BACKEND_URL"))
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let supabase_url = get("SUPABASE_URL").ok_or_else(|| anyhow!("SUPABASE_URL not set"))?;
        let supabase_anon_key =
            get("SUPABASE_ANON_KEY").ok_or_else(|| anyhow!("SUPABASE_ANON_KEY not set"))?;

        let mut config = Self::new(backend_url, supabase_url, supabase_anon_key);

        if let Some(addr) = get("BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(ms) = get("POLL_INTERVAL_MS") {
            config.poll_interval = Duration::from_millis(parse_num("POLL_INTERVAL_MS", &ms)?);
        }
        if let Some(secs) = get("POLL_TIMEOUT_SECS") {
            config.poll_timeout = Duration::from_secs(parse_num("POLL_TIMEOUT_SECS", &secs)?);
        }
        if let Some(secs) = get("HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_num("HTTP_TIMEOUT_SECS", &secs)?);
        }

        Ok(config)
    }
}

fn parse_num(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .with_context(|| format!("{} must be a whole number, got {:?}", key, raw))
}

fn trim_base(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
