//! Text extraction per content kind.
//!
//! Every extractor produces the same [`Extracted`] shape: the prose to
//! chunk, plus the auxiliary structures worth keeping on the document
//! metadata (step lists, embedded images capped per document, a title when
//! the format carries one).

mod docx;
mod html;
mod steps;

use crate::detect::ContentKind;
use quarry_core::error::{ExternalService, QuarryError, Result};
use std::collections::HashMap;

pub use steps::extract_step_lists;

/// Extraction output.
#[derive(Debug, Clone, Default)]
pub struct Extracted {
    /// Main prose content.
    pub text: String,
    /// Document title, when the format carries one.
    pub title: Option<String>,
    /// Embedded images as base64 payloads, capped by the caller's config.
    pub images: Vec<String>,
    /// Numbered or bulleted procedures found in the prose.
    pub step_lists: Vec<Vec<String>>,
    /// Format-specific extras (page counts, row counts, language tags).
    pub extra: HashMap<String, serde_json::Value>,
}

fn extraction_failed(detail: impl std::fmt::Display) -> QuarryError {
    QuarryError::external(
        ExternalService::Storage,
        format!("extraction failed: {detail}"),
        false,
    )
}

fn extract_csv(bytes: &[u8]) -> Result<Extracted> {
    let delimiter = if bytes.split(|b| *b == b'\n').next().is_some_and(|first| {
        first.contains(&b'\t')
    }) {
        b'\t'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .has_headers(false)
        .from_reader(bytes);

    let mut lines = Vec::new();
    for record in reader.records() {
        let record = record.map_err(extraction_failed)?;
        lines.push(record.iter().collect::<Vec<_>>().join(" | "));
    }

    let mut extra = HashMap::new();
    extra.insert("row_count".to_string(), serde_json::json!(lines.len()));

    Ok(Extracted {
        text: lines.join("\n"),
        extra,
        ..Extracted::default()
    })
}

fn extract_pdf(bytes: &[u8]) -> Result<Extracted> {
    let text = pdf_extract::extract_text_from_mem(bytes).map_err(extraction_failed)?;
    let step_lists = extract_step_lists(&text);
    Ok(Extracted {
        text,
        step_lists,
        ..Extracted::default()
    })
}

fn extract_plain(bytes: &[u8], language: Option<&str>) -> Extracted {
    let text = String::from_utf8_lossy(bytes).into_owned();
    let step_lists = extract_step_lists(&text);
    let mut extra = HashMap::new();
    if let Some(language) = language {
        extra.insert("language".to_string(), serde_json::json!(language));
    }
    Extracted {
        text,
        step_lists,
        extra,
        ..Extracted::default()
    }
}

/// Run the extractor matching `kind`.
///
/// # Errors
///
/// Fails when the payload is corrupt for its detected kind.
pub fn extract(kind: &ContentKind, bytes: &[u8], max_images: usize) -> Result<Extracted> {
    match kind {
        ContentKind::Pdf => extract_pdf(bytes),
        ContentKind::Docx => docx::extract(bytes),
        ContentKind::Html => html::extract(bytes, max_images),
        ContentKind::Csv => extract_csv(bytes),
        ContentKind::Code { language } => Ok(extract_plain(bytes, Some(language))),
        ContentKind::PlainText => Ok(extract_plain(bytes, None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_keeps_step_lists() {
        let text = b"Install guide.\n1. Download the package.\n2. Run the installer.\n3. Restart.";
        let extracted = extract(&ContentKind::PlainText, text, 10).unwrap();
        assert!(extracted.text.contains("Install guide"));
        assert_eq!(extracted.step_lists.len(), 1);
        assert_eq!(extracted.step_lists[0].len(), 3);
    }

    #[test]
    fn test_csv_rows_become_lines() {
        let csv = b"name,city\nalice,oslo\nbob,lima\n";
        let extracted = extract(&ContentKind::Csv, csv, 10).unwrap();
        assert!(extracted.text.contains("alice | oslo"));
        assert_eq!(extracted.extra["row_count"], serde_json::json!(3));
    }

    #[test]
    fn test_code_carries_language_tag() {
        let extracted = extract(
            &ContentKind::Code {
                language: "rust".to_string(),
            },
            b"fn main() {}",
            10,
        )
        .unwrap();
        assert_eq!(extracted.extra["language"], serde_json::json!("rust"));
    }
}
