//! DOCX text extraction.
//!
//! A docx is a zip container; the prose lives in `word/document.xml`.
//! Paragraph closes become newlines, every other tag is dropped, and the
//! usual XML entities are unescaped.

use super::{extract_step_lists, Extracted};
use quarry_core::error::{ExternalService, QuarryError, Result};
use std::io::{Cursor, Read};

fn corrupt(detail: impl std::fmt::Display) -> QuarryError {
    QuarryError::external(
        ExternalService::Storage,
        format!("docx extraction failed: {detail}"),
        false,
    )
}

fn strip_tags(xml: &str) -> String {
    // Paragraph and break closes map to newlines so the chunker sees
    // sentence structure.
    let xml = xml.replace("</w:p>", "\n").replace("<w:br/>", "\n");

    let mut out = String::with_capacity(xml.len() / 2);
    let mut in_tag = false;
    for ch in xml.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }

    out.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Extract the document prose.
///
/// # Errors
///
/// Fails when the container or its document part is unreadable.
pub fn extract(bytes: &[u8]) -> Result<Extracted> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(corrupt)?;
    let mut file = archive.by_name("word/document.xml").map_err(corrupt)?;
    let mut xml = String::new();
    file.read_to_string(&mut xml).map_err(corrupt)?;

    let text = strip_tags(&xml)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    let step_lists = extract_step_lists(&text);
    Ok(Extracted {
        text,
        step_lists,
        ..Extracted::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_with(document_xml: &str) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("word/document.xml", options).unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buffer.into_inner()
    }

    #[test]
    fn test_paragraphs_become_lines() {
        let bytes = docx_with(
            "<w:document><w:body>\
             <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>\
             <w:p><w:r><w:t>Second &amp; last.</w:t></w:r></w:p>\
             </w:body></w:document>",
        );
        let extracted = extract(&bytes).unwrap();
        assert_eq!(extracted.text, "First paragraph.\nSecond & last.");
    }

    #[test]
    fn test_missing_document_part_is_an_error() {
        let mut buffer = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buffer);
            let options = zip::write::SimpleFileOptions::default();
            writer.start_file("unrelated.txt", options).unwrap();
            writer.write_all(b"nope").unwrap();
            writer.finish().unwrap();
        }
        assert!(extract(&buffer.into_inner()).is_err());
    }
}
