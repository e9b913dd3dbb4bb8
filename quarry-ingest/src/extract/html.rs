//! HTML main-content extraction.
//!
//! Navigation, headers, footers, scripts, and ad containers are skipped
//! before the text is read, preferring an explicit main-content landmark
//! when the page has one.

use super::{extract_step_lists, Extracted};
use quarry_core::error::Result;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;

const CONTENT_SELECTORS: &[&str] = &[
    "main",
    "article",
    "[role=main]",
    "#content",
    ".content",
    ".documentation",
    ".docs-content",
];

const NOISE_TAGS: &[&str] = &[
    "nav", "header", "footer", "aside", "script", "style", "noscript", "form",
];

const NOISE_CLASSES: &[&str] = &["nav", "navbar", "sidebar", "footer", "advertisement", "cookie-banner"];

fn is_noise(element: ElementRef<'_>) -> bool {
    let value = element.value();
    if NOISE_TAGS.contains(&value.name()) {
        return true;
    }
    value
        .classes()
        .any(|class| NOISE_CLASSES.contains(&class))
}

fn under_noise(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(is_noise)
}

fn collect_text(root: ElementRef<'_>) -> String {
    let readable =
        Selector::parse("p, h1, h2, h3, h4, h5, h6, li, pre, td, blockquote").expect("static selector");
    let mut parts = Vec::new();
    for element in root.select(&readable) {
        if under_noise(element) {
            continue;
        }
        let part = element.text().collect::<String>();
        let part = part.split_whitespace().collect::<Vec<_>>().join(" ");
        if !part.is_empty() {
            parts.push(part);
        }
    }
    if parts.is_empty() {
        // No block elements at all; take the raw text.
        return root
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
    }
    parts.join("\n")
}

/// Extract main content, title, and embedded data-URI images.
///
/// # Errors
///
/// Currently infallible; kept fallible for parity with the other
/// extractors.
pub fn extract(bytes: &[u8], max_images: usize) -> Result<Extracted> {
    let html = String::from_utf8_lossy(bytes);
    let document = Html::parse_document(&html);

    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|t| t.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    });

    let mut text = String::new();
    for selector in CONTENT_SELECTORS {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            text = collect_text(element);
            if !text.is_empty() {
                break;
            }
        }
    }

    if text.is_empty() {
        // No content landmark; read the whole body minus noise subtrees.
        if let Some(body) = Selector::parse("body")
            .ok()
            .and_then(|s| document.select(&s).next())
        {
            text = collect_text(body);
        }
    }

    let mut images = Vec::new();
    if let Ok(selector) = Selector::parse("img[src]") {
        for img in document.select(&selector) {
            if images.len() >= max_images {
                break;
            }
            if let Some(src) = img.value().attr("src") {
                if let Some(payload) = src
                    .strip_prefix("data:image/")
                    .and_then(|rest| rest.split_once("base64,").map(|(_, data)| data))
                {
                    images.push(payload.to_string());
                }
            }
        }
    }

    let step_lists = extract_step_lists(&text);

    let mut extra = HashMap::new();
    if let Ok(selector) = Selector::parse("h1, h2, h3") {
        extra.insert(
            "heading_count".to_string(),
            serde_json::json!(document.select(&selector).count()),
        );
    }

    Ok(Extracted {
        text,
        title,
        images,
        step_lists,
        extra,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_main_landmark_wins_over_nav() {
        let html = br#"<html><head><title>Guide</title></head><body>
            <nav><li>Home</li><li>Pricing</li></nav>
            <main><p>The actual guide content lives here.</p></main>
            <footer><p>Copyright</p></footer>
        </body></html>"#;
        let extracted = extract(html, 10).unwrap();
        assert_eq!(extracted.title.as_deref(), Some("Guide"));
        assert!(extracted.text.contains("actual guide content"));
        assert!(!extracted.text.contains("Pricing"));
        assert!(!extracted.text.contains("Copyright"));
    }

    #[test]
    fn test_body_fallback_skips_noise_subtrees() {
        let html = br#"<html><body>
            <nav><li>Home</li></nav>
            <div><p>First paragraph.</p><p>Second one.</p></div>
        </body></html>"#;
        let extracted = extract(html, 10).unwrap();
        assert!(extracted.text.contains("First paragraph."));
        assert!(extracted.text.contains("Second one."));
        assert!(!extracted.text.contains("Home"));
    }

    #[test]
    fn test_data_uri_images_are_collected_and_capped() {
        let html = br#"<html><body><main>
            <p>content</p>
            <img src="data:image/png;base64,AAAA"/>
            <img src="data:image/png;base64,BBBB"/>
            <img src="https://example.com/remote.png"/>
        </main></body></html>"#;
        let extracted = extract(html, 1).unwrap();
        assert_eq!(extracted.images, vec!["AAAA".to_string()]);
    }
}
