//! Full refresh from the ticket list endpoint.

use std::path::PathBuf;

use reqwest::Client;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Config, MergeStats};
use crate::services::fetch::{BackoffPolicy, get_json, with_retry};
use crate::services::{Normalized, normalize};
use crate::storage::{SnapshotArchive, TicketStorage, WriteMetadata, item_list};
use crate::utils::{Reporter, endpoint};

use super::merge::merge;
use super::update::{merge_summary, write_subset};

#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Entries in the list response
    pub listed: usize,
    pub rejected: usize,
    pub merge: MergeStats,
    pub snapshot: Option<PathBuf>,
    pub store: WriteMetadata,
    pub subset: Option<WriteMetadata>,
}

/// Download the full list and merge it into the store.
pub async fn run_refresh(
    config: &Config,
    client: &Client,
    storage: &dyn TicketStorage,
    reporter: &dyn Reporter,
) -> Result<RefreshReport> {
    reporter.header("Full refresh");
    let document = fetch_ticket_list(config, client, reporter).await?;
    apply_ticket_list(config, document, storage, reporter).await
}

/// `GET {api}/tickets/list?{list_query}` with the configured retry policy.
pub async fn fetch_ticket_list(
    config: &Config,
    client: &Client,
    reporter: &dyn Reporter,
) -> Result<Value> {
    let mut url = endpoint(&config.source.api_url()?, "tickets/list")?;
    if !config.source.list_query.is_empty() {
        url.set_query(Some(&config.source.list_query));
    }
    reporter.info(&format!("Downloading ticket list from {url}"));

    let backoff = BackoffPolicy::from_config(&config.http);
    with_retry(&backoff, "list", reporter, || get_json(client, &url))
        .await
        .map_err(|failure| AppError::ListFetch(failure.to_string()))
}

/// Archive, normalize and merge a list response into the store.
pub async fn apply_ticket_list(
    config: &Config,
    document: Value,
    storage: &dyn TicketStorage,
    reporter: &dyn Reporter,
) -> Result<RefreshReport> {
    let snapshot = if config.output.archive_raw {
        let path = SnapshotArchive::new(config.snapshot_dir())
            .archive(&document)
            .await?;
        reporter.info(&format!("Snapshot written to {}", path.display()));
        Some(path)
    } else {
        None
    };

    let items = item_list(document)
        .ok_or_else(|| AppError::validation("ticket list response has no `items` array"))?;
    let listed = items.len();

    let mut rejected = 0;
    let mut fresh = Vec::with_capacity(listed);
    for item in &items {
        match normalize(item) {
            Normalized::Valid(ticket) => fresh.push(ticket),
            Normalized::Rejected(rejection) => {
                reporter.warn(&format!("Dropping list entry: {rejection}"));
                rejected += 1;
            }
        }
    }

    let existing = storage.load_tickets(reporter).await?;
    let (merged, merge_stats) = merge(existing, fresh);
    let store = storage.write_tickets(&merged).await?;
    let subset = write_subset(config, &merged, reporter).await?;

    let mut summary = vec![
        ("listed", listed.to_string()),
        ("rejected", rejected.to_string()),
    ];
    summary.extend(merge_summary(&merge_stats, &store, snapshot.as_ref()));
    reporter.summary("Refresh", &summary);

    Ok(RefreshReport {
        listed,
        rejected,
        merge: merge_stats,
        snapshot,
        store,
        subset,
    })
}
