//! Boundary decoder for `/ocr-bulk` and `/ocr-job/{id}` replies.
//!
//! Backend versions disagree on where results live and how items name their
//! images and text. Replies are decoded once into [`BulkReply`], and every raw
//! item is mapped into the canonical [`Product`].

use crate::model::{value_as_text, ParsedFields, Product, UploadBatch};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Decoded reply of a bulk upload.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkReply {
    /// Results came back in the POST reply.
    Inline {
        batch_id: String,
        count: Option<usize>,
        items: Vec<Value>,
    },
    /// Backend queued the work; results must be polled for.
    Pending { job_id: String, batch_id: String },
    /// Neither results nor a job id. Kept for logging; yields an empty batch.
    Unrecognized(Value),
}

impl BulkReply {
    pub fn decode(value: Value) -> Self {
        let Value::Object(map) = value else {
            return BulkReply::Unrecognized(value);
        };

        let batch_id = map.get("batch_id").and_then(value_as_text).unwrap_or_default();
        let count = map
            .get("count")
            .and_then(Value::as_u64)
            .map(|c| c as usize);

        if let Some(items) = inline_items(&map) {
            return BulkReply::Inline {
                batch_id,
                count,
                items,
            };
        }

        let job_id = map
            .get("job_id")
            .and_then(value_as_text)
            .filter(|id| !id.is_empty())
            .or_else(|| Some(batch_id.clone()).filter(|id| !id.is_empty()));

        match job_id {
            Some(job_id) => BulkReply::Pending { job_id, batch_id },
            None => BulkReply::Unrecognized(Value::Object(map)),
        }
    }
}

/// Locate the inline results array: `results`, then `products`, then `results.results`.
fn inline_items(map: &Map<String, Value>) -> Option<Vec<Value>> {
    if let Some(Value::Array(items)) = map.get("results") {
        return Some(items.clone());
    }
    if let Some(Value::Array(items)) = map.get("products") {
        return Some(items.clone());
    }
    if let Some(Value::Array(items)) = map.get("results").and_then(|r| r.get("results")) {
        return Some(items.clone());
    }
    None
}

/// Build a batch from inline items.
pub fn batch_from_items(batch_id: String, count: Option<usize>, items: &[Value]) -> UploadBatch {
    let products: Vec<Product> = items
        .iter()
        .enumerate()
        .map(|(idx, item)| product_from_item(idx, item))
        .collect();

    UploadBatch {
        batch_id,
        product_count: count.unwrap_or(products.len()),
        products,
    }
}

/// Normalize the `results` payload of a finished job.
///
/// The payload may be a bare item array or any inline bulk reply shape. The
/// batch id from the submission is used when the payload carries none.
pub fn batch_from_job_results(fallback_batch_id: &str, results: Option<Value>) -> UploadBatch {
    match results {
        Some(Value::Array(items)) => batch_from_items(fallback_batch_id.to_string(), None, &items),
        Some(other) => match BulkReply::decode(other) {
            BulkReply::Inline {
                batch_id,
                count,
                items,
            } => {
                let batch_id = if batch_id.is_empty() {
                    fallback_batch_id.to_string()
                } else {
                    batch_id
                };
                batch_from_items(batch_id, count, &items)
            }
            reply => {
                warn!("Finished job carried no results array: {:?}", reply);
                empty_batch(fallback_batch_id)
            }
        },
        None => {
            debug!("Finished job carried no results");
            empty_batch(fallback_batch_id)
        }
    }
}

pub fn empty_batch(batch_id: &str) -> UploadBatch {
    UploadBatch {
        batch_id: batch_id.to_string(),
        product_count: 0,
        products: Vec::new(),
    }
}

/// Map one raw result item into a [`Product`]. Never fails.
pub fn product_from_item(idx: usize, item: &Value) -> Product {
    let product_no = item
        .get("product_no")
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(idx as u32 + 1);

    Product {
        product_no,
        images_in_group: images_of(item),
        raw_text: raw_text_of(item),
        parsed: item
            .get("parsed")
            .map(ParsedFields::from_value)
            .unwrap_or_default(),
        supabase: item
            .get("supabase")
            .filter(|v| !v.is_null())
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
    }
}

fn images_of(item: &Value) -> Vec<String> {
    let from_strings = |key: &str| -> Vec<String> {
        item.get(key)
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default()
    };
    let from_refs = |key: &str| -> Vec<String> {
        item.get(key)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|entry| match entry {
                        Value::String(name) => Some(name.clone()),
                        other => other.get("filename").and_then(Value::as_str).map(str::to_string),
                    })
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };

    let candidates = [
        from_strings("images_in_group"),
        from_refs("images_json"),
        from_refs("images"),
        from_strings("files"),
    ];
    if let Some(found) = candidates.into_iter().find(|list| !list.is_empty()) {
        return found;
    }

    item.get("file")
        .and_then(Value::as_str)
        .filter(|f| !f.is_empty())
        .map(|f| vec![f.to_string()])
        .unwrap_or_default()
}

fn raw_text_of(item: &Value) -> String {
    for key in ["raw_text", "text"] {
        if let Some(text) = item.get(key).and_then(Value::as_str) {
            if !text.is_empty() {
                return text.to_string();
            }
        }
    }

    for key in ["images_json", "images"] {
        if let Some(entries) = item.get(key).and_then(Value::as_array) {
            let joined = entries
                .iter()
                .map(|e| e.get("text").and_then(Value::as_str).unwrap_or(""))
                .collect::<Vec<_>>()
                .join("\n");
            if !joined.trim().is_empty() {
                return joined;
            }
        }
    }

    String::new()
}
