//! Structural HTML cleaning for curated decision documents.
//!
//! Cleaning keeps the main content of a decision page and drops site chrome:
//! 1. Chrome tags (navigation, header, footer, scripts, embeds, forms, controls)
//! 2. Elements whose `class` or `id` contains a noise keyword
//! 3. Comments
//! 4. Root selection: `main`, `#main-content`, `.content`, `article`, `body`
//! 5. Inside the root: inline styles stripped, `<br>` runs capped at two,
//!    empty elements dropped, free-standing text whitespace collapsed
//! 6. Re-wrapped in a minimal UTF-8 document
//!
//! Output is a pure function of the input bytes.

mod render;
mod rules;

use scraper::Html;
use tracing::{debug, instrument};

/// Wrap cleaned body markup in a standalone document.
fn wrap_document(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"UTF-8\"><title>Decision</title></head>\n<body>{body}</body>\n</html>"
    )
}

/// Clean an HTML document and return the rewrapped result.
#[instrument(skip_all, fields(input_len = html.len()))]
pub fn clean_html(html: &str) -> String {
    let doc = Html::parse_document(html);
    let root = rules::select_root(&doc);
    let body = render::render_root(&root);

    debug!(
        root = root.element().value().name(),
        output_len = body.len(),
        "html cleaned"
    );

    wrap_document(&body)
}

/// Clean raw landing-zone bytes. Invalid UTF-8 is replaced, not rejected.
pub fn clean_bytes(raw: &[u8]) -> Vec<u8> {
    clean_html(&String::from_utf8_lossy(raw)).into_bytes()
}
