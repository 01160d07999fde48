// src/models/mod.rs

//! Domain models for the ticket crawler.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod stats;
mod ticket;

// Re-export all public types
pub use config::{
    Config, CrawlConfig, HttpConfig, OutputConfig, PathsConfig, SourceConfig, SourceMode,
};
pub use stats::{CrawlStats, CrawlWindow, MergeStats};
pub use ticket::Ticket;
