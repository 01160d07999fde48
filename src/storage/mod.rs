//! Storage for the ticket store and its snapshot history.
//!
//! ## Directory Structure
//!
//! ```text
//! data/
//! ├── tickets.json              # the store: bare array of tickets
//! ├── tickets_cycling.json      # optional derived subset
//! └── snapshots/                # write-once raw crawl payloads
//!     ├── 2026-10-16T04-00-00Z.json.bz2
//!     └── 2026-10-17T04-00-00Z.json.bz2
//! ```
//!
//! The store is always replaced atomically; snapshots are created once and
//! never rewritten.

pub mod local;
pub mod snapshot;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;
use crate::models::Ticket;
use crate::utils::Reporter;

// Re-export for convenience
pub use local::{LocalStorage, write_atomic, write_atomic_from};
pub use snapshot::{SnapshotArchive, list_documents, read_document};

/// Metadata about a store write.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    pub path: PathBuf,
    /// Number of tickets written
    pub count: usize,
    /// Size of the written file
    pub bytes: u64,
    pub timestamp: DateTime<Utc>,
}

/// Trait for ticket store backends.
#[async_trait]
pub trait TicketStorage: Send + Sync {
    /// Load every valid ticket. A missing store is empty, not an error.
    ///
    /// Entries that fail normalization are dropped and reported.
    async fn load_tickets(&self, reporter: &dyn Reporter) -> Result<Vec<Ticket>>;

    /// Replace the store with `tickets`, all or nothing.
    async fn write_tickets(&self, tickets: &[Ticket]) -> Result<WriteMetadata>;
}

/// Pull the record list out of a store or snapshot document.
///
/// Accepts a bare array or an object carrying an `items` array.
pub fn item_list(document: Value) -> Option<Vec<Value>> {
    match document {
        Value::Array(items) => Some(items),
        Value::Object(mut map) => match map.remove("items") {
            Some(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}
