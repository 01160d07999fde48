//! Pipeline entry points for crawler operations.
//!
//! - `run_update`: Crawl a window around the anchor and merge it into the store
//! - `run_refresh`: Merge the full ticket list into the store
//! - `run_restore`: Rebuild a store from snapshots and seed files
//! - `inspect_store`: Describe the store for the `info` command

pub mod anchor;
pub mod circuit_breaker;
pub mod crawl;
pub mod info;
pub mod merge;
pub mod refresh;
pub mod restore;
pub mod update;

pub use anchor::{Anchor, AnchorSource, resolve_anchor};
pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerConfig};
pub use crawl::{CrawlOutcome, RangeCrawler};
pub use info::{StoreInfo, inspect_store, report_store_info};
pub use merge::merge;
pub use refresh::{RefreshReport, run_refresh};
pub use restore::{RestoreOutcome, replay, run_restore};
pub use update::{UpdateReport, run_update};
