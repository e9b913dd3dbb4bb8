//! Crawl-session lifecycle and live statistics.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use quarry_core::ids::ConnectorId;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Lifecycle of one crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlState {
    /// Created, not started.
    Idle,
    /// Walking links from the seeds.
    Discovering,
    /// Draining the frontier.
    Fetching,
    /// Finished normally.
    Completed,
    /// Discovery could not produce any work.
    Failed,
    /// Stopped by request.
    Cancelled,
}

impl CrawlState {
    /// Whether the crawl has finished.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Counters accumulated during a crawl.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CrawlCounters {
    /// URLs discovered, every class included.
    pub discovered: usize,
    /// Pages the fetch phase handled.
    pub processed: usize,
    /// Pages ingested.
    pub successful: usize,
    /// Pages whose fetch failed.
    pub failed: usize,
    /// Pages dropped as exact or near duplicates.
    pub skipped_duplicate: usize,
    /// Pages dropped below the quality floor.
    pub skipped_low_quality: usize,
    /// Pages robots.txt kept us away from.
    pub blocked_by_robots: usize,
    /// Body bytes fetched.
    pub bytes_fetched: u64,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlStatus {
    /// Lifecycle state.
    pub state: CrawlState,
    /// Counters so far.
    pub counters: CrawlCounters,
    /// Start instant, once the crawl leaves `Idle`.
    pub started_at: Option<DateTime<Utc>>,
    /// Processing rate.
    pub pages_per_minute: f32,
    /// Seconds left at the current rate, when predictable.
    pub estimated_seconds_remaining: Option<u64>,
    /// URLs queued and not yet processed.
    pub pending: usize,
}

/// Shared handle onto one running crawl.
#[derive(Debug)]
pub struct CrawlSession {
    /// Connector the crawl belongs to.
    pub connector_id: ConnectorId,
    state: RwLock<CrawlState>,
    counters: RwLock<CrawlCounters>,
    started_at: RwLock<Option<DateTime<Utc>>>,
    pending: RwLock<usize>,
    cancel: CancellationToken,
}

impl CrawlSession {
    /// Fresh idle session.
    #[must_use]
    pub fn new(connector_id: ConnectorId) -> Self {
        Self {
            connector_id,
            state: RwLock::new(CrawlState::Idle),
            counters: RwLock::new(CrawlCounters::default()),
            started_at: RwLock::new(None),
            pending: RwLock::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> CrawlState {
        *self.state.read()
    }

    /// Move to a new state. The first transition out of `Idle` stamps the
    /// start time; terminal states are sticky.
    pub fn set_state(&self, next: CrawlState) {
        let mut state = self.state.write();
        if state.is_terminal() {
            return;
        }
        if *state == CrawlState::Idle && !next.is_terminal() {
            *self.started_at.write() = Some(Utc::now());
        }
        *state = next;
    }

    /// Request cancellation; observed at every fetch-loop iteration.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Mutate the counters.
    pub fn update<F: FnOnce(&mut CrawlCounters)>(&self, f: F) {
        f(&mut self.counters.write());
    }

    /// Set the queued-URL gauge.
    pub fn set_pending(&self, pending: usize) {
        *self.pending.write() = pending;
    }

    /// Live statistics.
    #[must_use]
    pub fn status(&self) -> CrawlStatus {
        let counters = *self.counters.read();
        let started_at = *self.started_at.read();
        let pending = *self.pending.read();

        let pages_per_minute = started_at.map_or(0.0, |started| {
            let minutes = (Utc::now() - started).num_milliseconds().max(1) as f32 / 60_000.0;
            #[allow(clippy::cast_precision_loss)]
            {
                counters.processed as f32 / minutes
            }
        });

        let estimated_seconds_remaining = if pages_per_minute > 0.0 && pending > 0 {
            #[allow(
                clippy::cast_precision_loss,
                clippy::cast_possible_truncation,
                clippy::cast_sign_loss
            )]
            let seconds = (pending as f32 / pages_per_minute * 60.0) as u64;
            Some(seconds)
        } else {
            None
        };

        CrawlStatus {
            state: self.state(),
            counters,
            started_at,
            pages_per_minute,
            estimated_seconds_remaining,
            pending,
        }
    }
}
