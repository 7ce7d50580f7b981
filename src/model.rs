//! Product, batch and row types shared by the upload and products pages.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Named attributes extracted from nameplate text.
///
/// `None` means "unknown": the backend did not report the field, or reported
/// it as null.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedFields {
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub dn: Option<String>,
    pub pn: Option<String>,
    pub pt: Option<String>,
    pub body: Option<String>,
    pub disc: Option<String>,
    pub seat: Option<String>,
    pub temp: Option<String>,
    pub date: Option<String>,
    /// Keys the backend added that this client does not know about.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ParsedFields {
    /// Lenient conversion from whatever the backend put under `parsed`.
    pub fn from_value(value: &Value) -> Self {
        let Some(map) = value.as_object() else {
            return Self::default();
        };

        let mut fields = Self::default();
        for (key, raw) in map {
            let text = value_as_text(raw);
            match key.as_str() {
                "serial_number" => fields.serial_number = text,
                "model" => fields.model = text,
                "dn" => fields.dn = text,
                "pn" => fields.pn = text,
                "pt" => fields.pt = text,
                "body" => fields.body = text,
                "disc" => fields.disc = text,
                "seat" => fields.seat = text,
                "temp" => fields.temp = text,
                "date" => fields.date = text,
                _ => {
                    fields.extra.insert(key.clone(), raw.clone());
                }
            }
        }
        fields
    }

    /// Label/value pairs in card order.
    pub fn labelled(&self) -> [(&'static str, Option<&str>); 9] {
        [
            ("Serial", self.serial_number.as_deref()),
            ("Model", self.model.as_deref()),
            ("DN", self.dn.as_deref()),
            ("PN", self.pn.as_deref()),
            ("PT", self.pt.as_deref()),
            ("Body", self.body.as_deref()),
            ("Disc", self.disc.as_deref()),
            ("Seat", self.seat.as_deref()),
            ("Temp", self.temp.as_deref()),
        ]
    }
}

impl<'de> Deserialize<'de> for ParsedFields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

/// One grouped set of nameplate photos and its OCR output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub product_no: u32,
    pub images_in_group: Vec<String>,
    pub raw_text: String,
    pub parsed: ParsedFields,
    /// Backend's acknowledgement of the database write, passed through as-is.
    pub supabase: Value,
}

impl Product {
    /// Whether the backend reported a successful database write.
    pub fn stored(&self) -> bool {
        self.supabase.get("ok").and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Result of one upload submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadBatch {
    pub batch_id: String,
    pub product_count: usize,
    pub products: Vec<Product>,
}

/// Reply of the job status endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub results: Option<Value>,
}

impl JobStatus {
    pub fn is_done(&self) -> bool {
        self.status == "done"
    }
}

/// Image reference stored alongside a database row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// A row of the `products` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductRow {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "opt_text")]
    pub batch_id: Option<String>,
    pub product_no: Option<i64>,
    #[serde(deserialize_with = "opt_text")]
    pub serial_number: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub model: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub dn: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub pn: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub pt: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub body: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub disc: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub seat: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub temp: Option<String>,
    #[serde(deserialize_with = "opt_text")]
    pub casting_summary: Option<String>,
    #[serde(deserialize_with = "image_refs")]
    pub images_json: Vec<ImageRef>,
    #[serde(deserialize_with = "opt_text")]
    pub created_at: Option<String>,
}

/// Fields of a row that can be edited and saved individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EditableField {
    SerialNumber,
    Model,
    Dn,
    Pn,
    Pt,
    Body,
    Disc,
    Seat,
    Temp,
}

impl EditableField {
    pub const ALL: [EditableField; 9] = [
        EditableField::SerialNumber,
        EditableField::Model,
        EditableField::Dn,
        EditableField::Pn,
        EditableField::Pt,
        EditableField::Body,
        EditableField::Disc,
        EditableField::Seat,
        EditableField::Temp,
    ];

    /// Column name, also the key sent in the patch body.
    pub fn column(self) -> &'static str {
        match self {
            EditableField::SerialNumber => "serial_number",
            EditableField::Model => "model",
            EditableField::Dn => "dn",
            EditableField::Pn => "pn",
            EditableField::Pt => "pt",
            EditableField::Body => "body",
            EditableField::Disc => "disc",
            EditableField::Seat => "seat",
            EditableField::Temp => "temp",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EditableField::SerialNumber => "Serial",
            EditableField::Model => "Model",
            EditableField::Dn => "DN",
            EditableField::Pn => "PN",
            EditableField::Pt => "PT",
            EditableField::Body => "Body",
            EditableField::Disc => "Disc",
            EditableField::Seat => "Seat",
            EditableField::Temp => "Temp",
        }
    }

    pub fn from_column(column: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.column() == column)
    }
}

impl ProductRow {
    pub fn field(&self, field: EditableField) -> Option<&str> {
        self.slot(field).as_deref()
    }

    pub fn set_field(&mut self, field: EditableField, value: String) {
        *self.slot_mut(field) = Some(value);
    }

    fn slot(&self, field: EditableField) -> &Option<String> {
        match field {
            EditableField::SerialNumber => &self.serial_number,
            EditableField::Model => &self.model,
            EditableField::Dn => &self.dn,
            EditableField::Pn => &self.pn,
            EditableField::Pt => &self.pt,
            EditableField::Body => &self.body,
            EditableField::Disc => &self.disc,
            EditableField::Seat => &self.seat,
            EditableField::Temp => &self.temp,
        }
    }

    fn slot_mut(&mut self, field: EditableField) -> &mut Option<String> {
        match field {
            EditableField::SerialNumber => &mut self.serial_number,
            EditableField::Model => &mut self.model,
            EditableField::Dn => &mut self.dn,
            EditableField::Pn => &mut self.pn,
            EditableField::Pt => &mut self.pt,
            EditableField::Body => &mut self.body,
            EditableField::Disc => &mut self.disc,
            EditableField::Seat => &mut self.seat,
            EditableField::Temp => &mut self.temp,
        }
    }

    /// Coerce a listing response into rows.
    ///
    /// Accepts a bare array or an object with a `results` array; anything else
    /// is an empty listing. Elements that do not decode as rows are skipped.
    pub fn list_from_value(value: Value) -> Vec<ProductRow> {
        let items = match value {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("results") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| match serde_json::from_value::<ProductRow>(item) {
                Ok(row) => Some(row),
                Err(e) => {
                    tracing::warn!("Skipping undecodable product row: {}", e);
                    None
                }
            })
            .collect()
    }
}

/// Render a scalar JSON value as text; null and containers are "unknown".
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_text(&value).unwrap_or_default())
}

fn opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(value_as_text(&value))
}

fn image_refs<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<ImageRef>, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let Value::Array(items) = value else {
        return Ok(Vec::new());
    };
    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(image_ref_from_map(map)),
            Value::String(name) => Some(ImageRef {
                filename: name.clone(),
                text: None,
            }),
            _ => None,
        })
        .collect())
}

fn image_ref_from_map(map: &Map<String, Value>) -> ImageRef {
    ImageRef {
        filename: map.get("filename").and_then(value_as_text).unwrap_or_default(),
        text: map.get("text").and_then(value_as_text),
    }
}
