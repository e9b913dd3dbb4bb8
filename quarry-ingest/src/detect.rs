//! Content-type detection from magic bytes.
//!
//! Client-supplied content types are never trusted; the first bytes of the
//! payload decide which extractor runs. The filename is consulted only to
//! tell source code apart from prose once the payload is known to be text.

use serde::{Deserialize, Serialize};

/// Payload kinds the extractors understand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// PDF document.
    Pdf,
    /// Word document (OOXML).
    Docx,
    /// HTML page.
    Html,
    /// Comma or tab separated values.
    Csv,
    /// Source code.
    Code {
        /// Language tag derived from the extension.
        language: String,
    },
    /// Plain prose.
    PlainText,
}

impl ContentKind {
    /// MIME type recorded on the document row.
    #[must_use]
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Html => "text/html",
            Self::Csv => "text/csv",
            Self::Code { .. } => "text/x-source",
            Self::PlainText => "text/plain",
        }
    }
}

const CODE_EXTENSIONS: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("js", "javascript"),
    ("ts", "typescript"),
    ("go", "go"),
    ("java", "java"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("rb", "ruby"),
    ("sh", "shell"),
    ("sql", "sql"),
    ("toml", "toml"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("json", "json"),
];

fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start().get(..256).unwrap_or(text.trim_start());
    let lower = head.to_lowercase();
    lower.starts_with("<!doctype html") || lower.starts_with("<html") || lower.contains("<head")
}

fn looks_like_csv(text: &str) -> bool {
    let mut lines = text.lines().take(5).filter(|l| !l.trim().is_empty());
    let Some(first) = lines.next() else {
        return false;
    };
    let delimiter = if first.matches('\t').count() > 0 { '\t' } else { ',' };
    let columns = first.matches(delimiter).count();
    columns >= 1 && lines.all(|l| l.matches(delimiter).count() == columns)
}

/// Detect the payload kind. Returns `None` for binary formats no extractor
/// handles; the caller maps that to `UnsupportedType`.
#[must_use]
pub fn detect(bytes: &[u8], filename: &str) -> Option<ContentKind> {
    if bytes.starts_with(b"%PDF") {
        return Some(ContentKind::Pdf);
    }

    // OOXML containers share the zip magic; the docx marker is the
    // word/ directory in the central directory.
    if bytes.starts_with(b"PK\x03\x04") {
        let haystack = &bytes[..bytes.len().min(64 * 1024)];
        if haystack.windows(5).any(|w| w == b"word/") {
            return Some(ContentKind::Docx);
        }
        return None;
    }

    // Anything else must be valid text.
    let text = std::str::from_utf8(bytes).ok()?;

    if looks_like_html(text) {
        return Some(ContentKind::Html);
    }

    let extension = filename.rsplit('.').next().unwrap_or("").to_lowercase();
    if let Some((_, language)) = CODE_EXTENSIONS.iter().find(|(ext, _)| *ext == extension) {
        return Some(ContentKind::Code {
            language: (*language).to_string(),
        });
    }

    if extension == "csv" || extension == "tsv" || looks_like_csv(text) {
        return Some(ContentKind::Csv);
    }

    Some(ContentKind::PlainText)
}
