//! Content analytics over stored crawled-page records.

use quarry_core::types::{CrawledPage, PageStatus};
use serde::{Deserialize, Serialize};

/// Aggregate view of a connector's crawl history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrawlAnalytics {
    /// Pages on record.
    pub total_pages: usize,
    /// Pages ingested.
    pub ingested: usize,
    /// Pages skipped as duplicates.
    pub duplicates: usize,
    /// Pages below the quality floor.
    pub low_quality: usize,
    /// Pages whose fetch failed.
    pub failed: usize,
    /// Pages robots.txt blocked.
    pub blocked_by_robots: usize,
    /// Mean overall quality across fetched pages.
    pub mean_quality: f32,
    /// Quality histogram over ten equal buckets of [0, 1].
    pub quality_histogram: [usize; 10],
    /// Mean main-content word count across fetched pages.
    pub mean_word_count: f32,
}

/// Summarise a connector's stored pages.
#[must_use]
pub fn analyse_pages(pages: &[CrawledPage]) -> CrawlAnalytics {
    let mut analytics = CrawlAnalytics {
        total_pages: pages.len(),
        ..CrawlAnalytics::default()
    };

    let mut quality_sum = 0.0f32;
    let mut word_sum = 0usize;
    let mut fetched = 0usize;

    for page in pages {
        match page.status {
            PageStatus::Ingested => analytics.ingested += 1,
            PageStatus::SkippedDuplicate => analytics.duplicates += 1,
            PageStatus::SkippedLowQuality => analytics.low_quality += 1,
            PageStatus::Failed => analytics.failed += 1,
            PageStatus::BlockedByRobots => {
                analytics.blocked_by_robots += 1;
                continue;
            }
        }
        if page.status == PageStatus::Failed {
            continue;
        }

        fetched += 1;
        quality_sum += page.quality.overall;
        word_sum += page.word_count;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bucket = ((page.quality.overall * 10.0) as usize).min(9);
        analytics.quality_histogram[bucket] += 1;
    }

    if fetched > 0 {
        #[allow(clippy::cast_precision_loss)]
        {
            analytics.mean_quality = quality_sum / fetched as f32;
            analytics.mean_word_count = word_sum as f32 / fetched as f32;
        }
    }

    analytics
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quarry_core::ids::{ConnectorId, DomainId, OrgId};
    use quarry_core::types::QualityMetrics;

    fn page(status: PageStatus, quality: f32, words: usize) -> CrawledPage {
        CrawledPage {
            connector_id: ConnectorId::new(),
            org_id: OrgId::new(),
            domain_id: DomainId::new(),
            url: format!("https://site.test/{words}"),
            title: None,
            status,
            word_count: words,
            content_hash: String::new(),
            depth: 1,
            quality: QualityMetrics {
                overall: quality,
                ..QualityMetrics::default()
            },
            content_preview: String::new(),
            last_crawled: Utc::now(),
        }
    }

    #[test]
    fn test_counts_and_means() {
        let pages = vec![
            page(PageStatus::Ingested, 0.8, 100),
            page(PageStatus::Ingested, 0.6, 200),
            page(PageStatus::SkippedDuplicate, 0.7, 150),
            page(PageStatus::SkippedLowQuality, 0.1, 20),
            page(PageStatus::Failed, 0.0, 0),
            page(PageStatus::BlockedByRobots, 0.0, 0),
        ];

        let analytics = analyse_pages(&pages);
        assert_eq!(analytics.total_pages, 6);
        assert_eq!(analytics.ingested, 2);
        assert_eq!(analytics.duplicates, 1);
        assert_eq!(analytics.low_quality, 1);
        assert_eq!(analytics.failed, 1);
        assert_eq!(analytics.blocked_by_robots, 1);

        // Means cover the four fetched pages, not the failed or blocked
        // ones.
        assert!((analytics.mean_quality - 0.55).abs() < 1e-4);
        assert!((analytics.mean_word_count - 117.5).abs() < 1e-3);
        assert_eq!(analytics.quality_histogram[8], 1);
        assert_eq!(analytics.quality_histogram[1], 1);
    }

    #[test]
    fn test_empty_history() {
        let analytics = analyse_pages(&[]);
        assert_eq!(analytics.total_pages, 0);
        assert!(analytics.mean_quality.abs() < f32::EPSILON);
    }
}
