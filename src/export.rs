//! CSV export of the displayed product rows.

use crate::error::{FrontError, Result};
use crate::model::ProductRow;
use csv::{QuoteStyle, Terminator, WriterBuilder};

pub const CSV_FILENAME: &str = "products.csv";
pub const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Fixed column order of the export.
pub const CSV_COLUMNS: [&str; 14] = [
    "id",
    "batch_id",
    "product_no",
    "serial_number",
    "model",
    "dn",
    "pn",
    "pt",
    "body",
    "disc",
    "seat",
    "temp",
    "casting_summary",
    "created_at",
];

/// Render `rows` as CSV: a bare header line, then one fully quoted line per row.
pub fn products_csv(rows: &[ProductRow]) -> Result<String> {
    if rows.is_empty() {
        return Err(FrontError::EmptyExport);
    }

    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    for row in rows {
        writer.write_record(cells(row))?;
    }

    let body = writer
        .into_inner()
        .map_err(|e| FrontError::Csv(csv::Error::from(e.into_error())))?;
    let body = String::from_utf8_lossy(&body).into_owned();

    let mut out = CSV_COLUMNS.join(",");
    out.push('\n');
    out.push_str(body.strip_suffix('\n').unwrap_or(&body));
    Ok(out)
}

fn cells(row: &ProductRow) -> [String; 14] {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        row.id.clone(),
        text(&row.batch_id),
        row.product_no.map(|n| n.to_string()).unwrap_or_default(),
        text(&row.serial_number),
        text(&row.model),
        text(&row.dn),
        text(&row.pn),
        text(&row.pt),
        text(&row.body),
        text(&row.disc),
        text(&row.seat),
        text(&row.temp),
        text(&row.casting_summary),
        text(&row.created_at),
    ]
}
