//! Page content analysis: quality scoring and duplicate detection.

use quarry_core::types::QualityMetrics;
use std::collections::HashSet;

/// Analysis of one page's extracted main content.
#[derive(Debug, Clone)]
pub struct PageAnalysis {
    /// Extracted main content.
    pub text: String,
    /// Page title.
    pub title: Option<String>,
    /// Main-content word count.
    pub word_count: usize,
    /// sha256 of the main content.
    pub content_hash: String,
    /// Quality breakdown.
    pub quality: QualityMetrics,
    /// Normalised token set for near-duplicate comparison.
    pub token_set: HashSet<String>,
}

fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// Sentence-length readability: best around 12-25 words per sentence.
fn readability(text: &str) -> f32 {
    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let avg_words = text.split_whitespace().count() as f32 / sentences.len() as f32;
    if (8.0..=30.0).contains(&avg_words) {
        1.0 - ((avg_words - 18.0).abs() / 22.0)
    } else {
        0.2
    }
}

/// Text-to-markup ratio.
#[allow(clippy::cast_precision_loss)]
fn content_density(text_len: usize, html_len: usize) -> f32 {
    if html_len == 0 {
        return 0.0;
    }
    clamp01(text_len as f32 / html_len as f32 * 4.0)
}

/// Heading-structure richness, saturating around eight headings.
#[allow(clippy::cast_precision_loss)]
fn semantic_richness(heading_count: usize) -> f32 {
    clamp01(heading_count as f32 / 8.0)
}

/// Unique-term ratio over the token stream.
#[allow(clippy::cast_precision_loss)]
fn information_density(tokens: &[String]) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&String> = tokens.iter().collect();
    clamp01(unique.len() as f32 / tokens.len() as f32 * 1.5)
}

/// Date and freshness indicators in the text.
fn freshness(text: &str, current_year: i32) -> f32 {
    for offset in 0..3i32 {
        let year = (current_year - offset).to_string();
        if text.contains(&year) {
            #[allow(clippy::cast_precision_loss)]
            let age = offset as f32;
            return 0.25f32.mul_add(-age, 1.0);
        }
    }
    0.3
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(ToString::to_string)
        .collect()
}

/// Analyse extracted main content against its raw HTML.
#[must_use]
pub fn analyse(
    text: &str,
    title: Option<String>,
    html_len: usize,
    heading_count: usize,
    current_year: i32,
) -> PageAnalysis {
    let tokens = tokenize(text);
    let word_count = text.split_whitespace().count();

    let readability = clamp01(readability(text));
    let density = content_density(text.len(), html_len);
    let richness = semantic_richness(heading_count);
    let info = information_density(&tokens);
    let fresh = freshness(text, current_year);

    // Weighted blend; density and information carry the most signal for
    // retrieval value.
    let overall = clamp01(
        0.2 * readability + 0.3 * density + 0.15 * richness + 0.25 * info + 0.1 * fresh,
    );

    PageAnalysis {
        content_hash: quarry_core::hash::text_hash(text),
        token_set: tokens.into_iter().collect(),
        text: text.to_string(),
        title,
        word_count,
        quality: QualityMetrics {
            readability,
            content_density: density,
            semantic_richness: richness,
            information_density: info,
            freshness: fresh,
            overall,
        },
    }
}

/// Normalised token-set Jaccard similarity.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    if union == 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Sliding window of recently accepted pages for near-dup comparison.
#[derive(Debug, Default)]
pub struct RecentPages {
    window: Vec<HashSet<String>>,
    capacity: usize,
}

impl RecentPages {
    /// Window holding up to `capacity` pages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            window: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Highest Jaccard similarity against the window.
    #[must_use]
    pub fn max_similarity(&self, tokens: &HashSet<String>) -> f32 {
        self.window
            .iter()
            .map(|seen| jaccard(seen, tokens))
            .fold(0.0, f32::max)
    }

    /// Admit a page into the window, evicting the oldest beyond capacity.
    pub fn push(&mut self, tokens: HashSet<String>) {
        if self.window.len() >= self.capacity {
            self.window.remove(0);
        }
        self.window.push(tokens);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_TEXT: &str = "Configuring the ingestion service takes three settings. \
        The chunk size controls how much text lands in each span. The overlap keeps \
        context across boundaries. The retry budget bounds how long a failing document \
        occupies a worker before it is marked failed in 2025.";

    #[test]
    fn test_substantial_page_scores_above_threshold() {
        let analysis = analyse(GOOD_TEXT, Some("Guide".to_string()), GOOD_TEXT.len() * 3, 4, 2025);
        assert!(analysis.quality.overall > 0.35, "{:?}", analysis.quality);
        assert!(analysis.word_count > 30);
    }

    #[test]
    fn test_thin_page_scores_low() {
        let thin = "buy now click here buy now click here buy now";
        let analysis = analyse(thin, None, thin.len() * 50, 0, 2025);
        assert!(analysis.quality.overall < 0.35, "{:?}", analysis.quality);
    }

    #[test]
    fn test_jaccard_extremes() {
        let a: HashSet<String> = ["alpha", "beta", "gamma"].iter().map(|s| (*s).to_string()).collect();
        let b = a.clone();
        let c: HashSet<String> = ["delta", "epsilon"].iter().map(|s| (*s).to_string()).collect();

        assert!((jaccard(&a, &b) - 1.0).abs() < f32::EPSILON);
        assert!(jaccard(&a, &c).abs() < f32::EPSILON);
    }

    #[test]
    fn test_recent_window_detects_near_duplicate() {
        let mut recent = RecentPages::new(10);
        let page_a = analyse(GOOD_TEXT, None, GOOD_TEXT.len() * 3, 2, 2025);
        recent.push(page_a.token_set.clone());

        // Nearly identical content, one word changed.
        let near = GOOD_TEXT.replace("three settings", "four settings");
        let page_b = analyse(&near, None, near.len() * 3, 2, 2025);
        assert!(recent.max_similarity(&page_b.token_set) > 0.9);

        let other = "Completely different prose about gardening and soil quality.";
        let page_c = analyse(other, None, other.len() * 3, 0, 2025);
        assert!(recent.max_similarity(&page_c.token_set) < 0.2);
    }
}
