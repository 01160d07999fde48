//! Restore replayer.
//!
//! Rebuilds a store by folding every snapshot or seed file in a directory
//! through the normalizer and the merge engine, oldest name first. A file
//! that cannot be read or decoded is skipped with a warning.

use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::models::{MergeStats, Ticket};
use crate::services::{Normalized, is_cycling_related, normalize};
use crate::storage::{LocalStorage, TicketStorage, item_list, list_documents, read_document};
use crate::utils::Reporter;

use super::merge::merge;

/// What a replay produced.
#[derive(Debug, Clone, Default)]
pub struct RestoreOutcome {
    pub tickets: Vec<Ticket>,
    pub files_applied: usize,
    pub files_skipped: usize,
    /// Entries dropped by the normalizer across all files
    pub rejected: usize,
    /// Entries dropped by the cycling filter
    pub filtered: usize,
}

/// Fold every document in `dir` onto `seed`.
pub async fn replay(
    dir: &Path,
    seed: Vec<Ticket>,
    cycling_only: bool,
    reporter: &dyn Reporter,
) -> Result<RestoreOutcome> {
    let files = list_documents(dir).await?;
    reporter.info(&format!(
        "Replaying {} files from {} onto {} seed tickets",
        files.len(),
        dir.display(),
        seed.len()
    ));

    let mut outcome = RestoreOutcome {
        tickets: seed,
        ..RestoreOutcome::default()
    };

    for path in files {
        let document = match read_document(&path).await {
            Ok(document) => document,
            Err(e) => {
                reporter.warn(&format!("Skipping {}: {e}", path.display()));
                outcome.files_skipped += 1;
                continue;
            }
        };
        let Some(items) = document_records(document) else {
            reporter.warn(&format!(
                "Skipping {}: expected an array, an `items` object or a single ticket",
                path.display()
            ));
            outcome.files_skipped += 1;
            continue;
        };

        let mut batch = Vec::with_capacity(items.len());
        for item in &items {
            match normalize(item) {
                Normalized::Valid(ticket) => batch.push(ticket),
                Normalized::Rejected(rejection) => {
                    reporter.debug(&format!("{}: {rejection}", path.display()));
                    outcome.rejected += 1;
                }
            }
        }
        if cycling_only {
            let before = batch.len();
            batch.retain(is_cycling_related);
            outcome.filtered += before - batch.len();
        }

        let (merged, stats) = merge(std::mem::take(&mut outcome.tickets), batch);
        log_file_merge(reporter, &path, &stats);
        outcome.tickets = merged;
        outcome.files_applied += 1;
    }

    Ok(outcome)
}

/// Replay `dir`, optionally on top of a seed store, and write the result.
pub async fn run_restore(
    dir: &Path,
    seed_file: Option<&Path>,
    output: &Path,
    cycling_only: bool,
    reporter: &dyn Reporter,
) -> Result<RestoreOutcome> {
    reporter.header("Restore");

    let seed = match seed_file {
        Some(path) => LocalStorage::new(path).load_tickets(reporter).await?,
        None => Vec::new(),
    };
    let outcome = replay(dir, seed, cycling_only, reporter).await?;
    let written = LocalStorage::new(output)
        .write_tickets(&outcome.tickets)
        .await?;

    reporter.summary(
        "Restore",
        &[
            ("files applied", outcome.files_applied.to_string()),
            ("files skipped", outcome.files_skipped.to_string()),
            ("rejected entries", outcome.rejected.to_string()),
            ("filtered entries", outcome.filtered.to_string()),
            ("tickets", written.count.to_string()),
            ("output", written.path.display().to_string()),
        ],
    );
    Ok(outcome)
}

/// A replay document's records: a list, an `items` object or one ticket.
fn document_records(document: Value) -> Option<Vec<Value>> {
    let single = document
        .as_object()
        .is_some_and(|map| !map.contains_key("items"));
    if single {
        return Some(vec![document]);
    }
    item_list(document)
}

fn log_file_merge(reporter: &dyn Reporter, path: &Path, stats: &MergeStats) {
    reporter.debug(&format!(
        "{}: +{} new, {} replaced, {} total",
        path.display(),
        stats.added,
        stats.replaced,
        stats.total
    ));
}
