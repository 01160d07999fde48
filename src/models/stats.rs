//! Counters reported by crawl, merge and restore runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Contiguous id range `[start_id, end_id]` visited by one crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlWindow {
    pub start_id: u64,
    pub end_id: u64,
}

impl CrawlWindow {
    /// Window centred on `anchor`: `[max(1, anchor - look_back), anchor + look_ahead]`.
    ///
    /// Negative distances are a configuration error.
    pub fn around(anchor: u64, look_back: i64, look_ahead: i64) -> Result<Self> {
        let look_back = u64::try_from(look_back)
            .map_err(|_| AppError::config(format!("look_back must be >= 0, got {look_back}")))?;
        let look_ahead = u64::try_from(look_ahead)
            .map_err(|_| AppError::config(format!("look_ahead must be >= 0, got {look_ahead}")))?;

        let start_id = anchor.saturating_sub(look_back).max(1);
        let end_id = anchor.saturating_add(look_ahead).max(start_id);
        Ok(Self { start_id, end_id })
    }

    /// Number of ids in the window.
    pub fn len(&self) -> u64 {
        self.end_id - self.start_id + 1
    }

    /// Always false: a window holds at least its start id.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn ids(&self) -> std::ops::RangeInclusive<u64> {
        self.start_id..=self.end_id
    }
}

/// Statistics for a single crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlStats {
    pub window: CrawlWindow,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Ids that were attempted
    pub scanned: u64,
    /// Ids that produced a valid record
    pub fetched: u64,
    /// Ids where every fetch strategy failed
    pub empty: u64,
    /// Ids whose payload the normalizer rejected
    pub rejected: u64,
    /// Id at which the consecutive-failure breaker stopped the crawl
    pub halted_at: Option<u64>,
}

impl CrawlStats {
    pub fn new(window: CrawlWindow) -> Self {
        let now = Utc::now();
        Self {
            window,
            start_time: now,
            end_time: now,
            scanned: 0,
            fetched: 0,
            empty: 0,
            rejected: 0,
            halted_at: None,
        }
    }

    /// Share of scanned ids that produced a record.
    pub fn success_rate(&self) -> f64 {
        if self.scanned == 0 {
            return 0.0;
        }
        self.fetched as f64 / self.scanned as f64
    }
}

/// Counts describing one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Old records kept because no new record shares their id
    pub retained: usize,
    /// Old records replaced by a new record with the same id
    pub replaced: usize,
    /// New records whose id was not in the old collection
    pub added: usize,
    /// Duplicate ids collapsed inside a single input
    pub collapsed: usize,
    /// Size of the merged collection
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_around_anchor() {
        let window = CrawlWindow::around(1000, 100, 200).unwrap();
        assert_eq!(
            window,
            CrawlWindow {
                start_id: 900,
                end_id: 1200
            }
        );
    }

    #[test]
    fn test_window_start_clamps_to_one() {
        let window = CrawlWindow::around(50, 100, 0).unwrap();
        assert_eq!(window.start_id, 1);
        assert_eq!(window.end_id, 50);

        let window = CrawlWindow::around(0, 0, 0).unwrap();
        assert_eq!((window.start_id, window.end_id), (1, 1));
    }

    #[test]
    fn test_negative_distance_is_config_error() {
        assert!(matches!(
            CrawlWindow::around(10, -1, 5),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            CrawlWindow::around(10, 1, -5),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_window_len() {
        let window = CrawlWindow {
            start_id: 900,
            end_id: 1200,
        };
        assert_eq!(window.len(), 301);
        assert_eq!(window.ids().count(), 301);
    }

    #[test]
    fn test_success_rate() {
        let mut stats = CrawlStats::new(CrawlWindow {
            start_id: 1,
            end_id: 4,
        });
        assert_eq!(stats.success_rate(), 0.0);
        stats.scanned = 4;
        stats.fetched = 3;
        assert!((stats.success_rate() - 0.75).abs() < f64::EPSILON);
    }
}
