//! Supabase REST client for reading stored product rows.

use crate::backend::upstream_message;
use crate::config::AppConfig;
use crate::error::{FrontError, Result};
use crate::model::ProductRow;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, info};

/// Read access to the `products` table.
#[async_trait::async_trait]
pub trait ProductSource: Send + Sync {
    /// Rows ordered newest first, optionally restricted to one batch.
    async fn list_products(&self, batch_id: Option<&str>) -> Result<Vec<ProductRow>>;
}

/// Supabase client configuration.
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            client,
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        })
    }

    /// Helper: GET from Supabase REST API.
    async fn get_json(&self, table: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}/rest/v1/{}", self.base_url, table);
        let resp = self
            .client
            .get(&url)
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", self.anon_key))
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(FrontError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&text, &format!("HTTP {}", status.as_u16())),
            });
        }

        let text = resp.text().await?;
        serde_json::from_str(&text).map_err(|_| FrontError::InvalidJson)
    }
}

/// Query parameters for a product listing.
pub fn listing_query(batch_id: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = Vec::with_capacity(3);
    if let Some(batch) = batch_id.map(str::trim).filter(|b| !b.is_empty()) {
        query.push(("batch_id", format!("eq.{}", batch)));
    }
    query.push(("select", "*".to_string()));
    query.push(("order", "created_at.desc".to_string()));
    query
}

#[async_trait::async_trait]
impl ProductSource for SupabaseClient {
    async fn list_products(&self, batch_id: Option<&str>) -> Result<Vec<ProductRow>> {
        let query = listing_query(batch_id);
        debug!("Listing products with {:?}", query);

        let value = self.get_json("products", &query).await?;
        let rows = ProductRow::list_from_value(value);

        info!("Fetched {} product row(s)", rows.len());
        Ok(rows)
    }
}
