//! HTML for the landing, upload and products pages.

use crate::model::{EditableField, Product, UploadBatch};
use crate::products::{ProductsView, SaveStatus};
use std::fmt::Write as _;

const UNKNOWN: &str = "—";

/// Escape text for element content and quoted attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n<main>\n{}\n</main>\n</body>\n</html>\n",
        escape(title),
        body
    )
}

pub fn home_page() -> String {
    layout(
        "Valve OCR",
        "<h1>Valve OCR</h1>\n\
         <p>Upload valve photos, let the backend run OCR, review what was saved.</p>\n\
         <nav>\n\
         <a href=\"/upload\"><h2>Upload images</h2><p>Select bulk photos and send them to /ocr-bulk.</p></a>\n\
         <a href=\"/products\"><h2>View products</h2><p>Read stored rows and check what OCR extracted.</p></a>\n\
         </nav>",
    )
}

/// Upload page; `batch` and `error` are the outcome of the last submission, if any.
pub fn upload_page(backend_url: &str, batch: Option<&UploadBatch>, error: Option<&str>) -> String {
    let mut body = String::new();
    let _ = write!(
        body,
        "<h1>Valve / Nameplate OCR</h1>\n<p>Backend: <strong>{}</strong></p>\n",
        escape(backend_url)
    );
    body.push_str(
        "<section>\n<h2>1. Upload product images</h2>\n\
         <p>Select multiple images. The backend treats every 3 images as 1 product.</p>\n\
         <form method=\"post\" action=\"/upload\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"files\" multiple>\n\
         <button type=\"submit\">Start OCR &amp; Save</button>\n\
         </form>\n",
    );

    if let Some(error) = error {
        let _ = writeln!(body, "<p class=\"error\">{}</p>", escape(error));
    } else if let Some(batch) = batch {
        let _ = writeln!(
            body,
            "<p class=\"ok\">Stored: <b>{}</b> product(s) in {}</p>",
            batch.product_count,
            escape(&batch.batch_id)
        );
    }
    body.push_str("</section>\n<section>\n<h2>2. OCR / parsed result</h2>\n");

    match batch {
        None => body.push_str("<p>After upload, grouped products will appear here.</p>\n"),
        Some(batch) => {
            for (idx, product) in batch.products.iter().enumerate() {
                product_card(&mut body, &batch.batch_id, idx, product);
            }
        }
    }
    body.push_str("</section>");

    layout("Upload", &body)
}

fn product_card(out: &mut String, batch_id: &str, idx: usize, product: &Product) {
    let _ = writeln!(
        out,
        "<article id=\"{}-{}-{}\">\n<header><span>Product #{}</span> <span>{} image(s)</span> <span>Supabase: {}</span></header>",
        escape(batch_id),
        product.product_no,
        idx,
        product.product_no,
        product.images_in_group.len(),
        if product.stored() { "ok" } else { "not stored" }
    );

    out.push_str("<div class=\"fields\">\n");
    for (label, value) in product.parsed.labelled() {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        let _ = writeln!(
            out,
            "<label>{}<input value=\"{}\" placeholder=\"{}\"></label>",
            escape(label),
            escape(value.unwrap_or("")),
            UNKNOWN
        );
    }
    out.push_str("</div>\n");

    let _ = writeln!(
        out,
        "<details><summary>Show raw OCR text</summary><pre>{}</pre></details>\n</article>",
        escape(&product.raw_text)
    );
}

pub fn products_page(view: &ProductsView) -> String {
    let mut body = String::from("<h1>Stored products</h1>\n");

    let _ = write!(
        body,
        "<form method=\"post\" action=\"/products/load\">\n\
         <input name=\"batch\" value=\"{}\" placeholder=\"Filter by batch_id (eg. batch-8db99b4d)\">\n\
         <button type=\"submit\">Load</button>\n\
         </form>\n\
         <form method=\"post\" action=\"/products/clear\"><button type=\"submit\">Clear</button></form>\n\
         <a href=\"/products/export.csv\">Export CSV</a>\n",
        escape(&view.filter)
    );

    if let Some(error) = &view.error {
        let _ = writeln!(body, "<p class=\"error\">Error: {}</p>", escape(error));
    }
    if let Some(notice) = &view.notice {
        let _ = writeln!(body, "<p class=\"notice\">{}</p>", escape(notice));
    }

    for row in &view.rows {
        let _ = writeln!(
            body,
            "<article>\n<header><span>{} · #{}</span> <span>{}</span></header>",
            escape(row.batch_id.as_deref().unwrap_or("")),
            row.product_no.map(|n| n.to_string()).unwrap_or_default(),
            escape(row.created_at.as_deref().unwrap_or(""))
        );

        for field in EditableField::ALL {
            let status = match view.edit(&row.id, field).map(|e| &e.status) {
                Some(SaveStatus::Saved) => "<span class=\"ok\">Saved ✓</span>".to_string(),
                Some(SaveStatus::Failed(reason)) => {
                    format!("<span class=\"error\" title=\"{}\">Failed</span>", escape(reason))
                }
                None => String::new(),
            };
            let _ = writeln!(
                body,
                "<form method=\"post\" action=\"/products/{}/fields/{}\">\
                 <label>{}<input name=\"value\" value=\"{}\"></label>\
                 <button type=\"submit\">Save</button>{}</form>",
                urlencoding::encode(&row.id),
                field.column(),
                field.label().to_uppercase(),
                escape(&view.shown_value(row, field)),
                status
            );
        }

        if let Some(casting) = row.casting_summary.as_deref().filter(|c| !c.is_empty()) {
            let _ = writeln!(body, "<p>Casting: {}</p>", escape(casting));
        }
        if !row.images_json.is_empty() {
            body.push_str("<ul class=\"images\">");
            for image in &row.images_json {
                let _ = write!(body, "<li>{}</li>", escape(&image.filename));
            }
            body.push_str("</ul>\n");
        }
        body.push_str("</article>\n");
    }

    layout("Products", &body)
}
