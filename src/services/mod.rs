//! Service layer for the ticket crawler.
//!
//! This module contains the per-record logic:
//! - Payload validation (`normalize`)
//! - Remote fetching with retry and fallback (`TicketFetcher`)
//! - Map page extraction (`web`)
//! - Cycling subset predicate (`is_cycling_related`)

mod classify;
pub mod fetch;
mod normalize;
pub mod web;

pub use classify::{cycling_subset, is_cycling_related};
pub use fetch::{
    ApiStrategy, BackoffPolicy, FetchError, FetchFailure, FetchStrategy, Fetched,
    StrategyFailure, TicketFetcher, WebStrategy,
};
pub use normalize::{Normalized, Rejection, RejectionKind, normalize, parse_id, unwrap_item};
