// src/pipeline/crawl.rs

//! Range crawler.
//!
//! Walks a [`CrawlWindow`] id by id, in ascending order, fetching and
//! normalizing each ticket. Per-id failures are logged and counted; a run of
//! them opens the circuit breaker and ends the crawl early with whatever was
//! collected so far.

use std::time::Duration;

use chrono::Utc;
use serde_json::{Value, json};

use crate::models::{CrawlStats, CrawlWindow, Ticket};
use crate::services::{Normalized, TicketFetcher, normalize};
use crate::utils::Reporter;

use super::circuit_breaker::{CircuitBreaker, DEFAULT_FAILURE_THRESHOLD};

/// Result of one crawl.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Valid tickets in fetch order
    pub tickets: Vec<Ticket>,
    /// Every payload a strategy returned, including rejected ones
    pub raw: Vec<Value>,
    pub stats: CrawlStats,
}

impl CrawlOutcome {
    /// Raw payloads in the `{"items": [...]}` snapshot shape.
    pub fn raw_document(&self) -> Value {
        json!({ "items": self.raw })
    }
}

/// Sequential crawler over a window of ids.
pub struct RangeCrawler<'a> {
    fetcher: &'a TicketFetcher,
    failure_threshold: u32,
    request_delay: Duration,
}

impl<'a> RangeCrawler<'a> {
    pub fn new(fetcher: &'a TicketFetcher) -> Self {
        Self {
            fetcher,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            request_delay: Duration::ZERO,
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Pause between consecutive ids.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Crawl every id in `window` until it ends or the breaker opens.
    pub async fn crawl(&self, window: CrawlWindow, reporter: &dyn Reporter) -> CrawlOutcome {
        let mut breaker = CircuitBreaker::with_threshold(self.failure_threshold);
        let mut stats = CrawlStats::new(window);
        let mut tickets = Vec::new();
        let mut raw = Vec::new();

        reporter.info(&format!(
            "Crawling ids {}..={} ({} ids)",
            window.start_id,
            window.end_id,
            window.len()
        ));

        for id in window.ids() {
            if id != window.start_id && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
            stats.scanned += 1;

            match self.fetcher.fetch(id, reporter).await {
                Ok(fetched) => {
                    let outcome = normalize(&fetched.payload);
                    raw.push(fetched.payload);
                    match outcome {
                        Normalized::Valid(ticket) => {
                            reporter.debug(&format!("id {id}: ok via {}", fetched.source));
                            stats.fetched += 1;
                            tickets.push(ticket);
                            breaker.record_success();
                        }
                        Normalized::Rejected(rejection) => {
                            reporter.warn(&format!(
                                "id {id}: rejected payload from {}: {rejection}",
                                fetched.source
                            ));
                            stats.rejected += 1;
                            breaker.record_failure();
                        }
                    }
                }
                Err(failure) => {
                    reporter.warn(&format!("id {id}: no record ({failure})"));
                    stats.empty += 1;
                    breaker.record_failure();
                }
            }

            if breaker.is_open() {
                reporter.warn(&format!(
                    "Stopping at id {id}: {} consecutive failures",
                    breaker.consecutive_failures()
                ));
                stats.halted_at = Some(id);
                break;
            }
        }

        stats.end_time = Utc::now();
        CrawlOutcome {
            tickets,
            raw,
            stats,
        }
    }
}
