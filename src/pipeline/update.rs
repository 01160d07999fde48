// src/pipeline/update.rs

//! Incremental update: resolve anchor, crawl the window, archive, merge, write.

use std::path::PathBuf;

use crate::error::Result;
use crate::models::{Config, CrawlStats, CrawlWindow, MergeStats, Ticket};
use crate::services::{TicketFetcher, cycling_subset};
use crate::storage::{LocalStorage, SnapshotArchive, TicketStorage, WriteMetadata};
use crate::utils::Reporter;

use super::anchor::{Anchor, resolve_anchor};
use super::crawl::RangeCrawler;
use super::merge::merge;

const TOTAL_STEPS: usize = 4;

/// Everything an update run did.
#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub anchor: Anchor,
    pub crawl: CrawlStats,
    pub merge: MergeStats,
    pub snapshot: Option<PathBuf>,
    pub store: WriteMetadata,
    pub subset: Option<WriteMetadata>,
}

/// Run one incremental update against `storage`.
///
/// Fatal only when no anchor can be resolved, the existing store is
/// structurally invalid, or a write fails. Per-id fetch failures and a
/// circuit-breaker stop still merge and persist what was collected.
pub async fn run_update(
    config: &Config,
    fetcher: &TicketFetcher,
    storage: &dyn TicketStorage,
    reporter: &dyn Reporter,
) -> Result<UpdateReport> {
    reporter.header("Incremental update");

    reporter.step(1, TOTAL_STEPS, "Resolve anchor");
    let existing = storage.load_tickets(reporter).await?;
    let anchor = resolve_anchor(
        &existing,
        config.crawl.anchor_override,
        config.crawl.seed_dir.as_deref(),
    )
    .await?;
    let window = CrawlWindow::around(anchor.id, config.crawl.look_back, config.crawl.look_ahead)?;
    reporter.info(&format!(
        "Anchor {} from {} ({} tickets in store)",
        anchor.id,
        anchor.source,
        existing.len()
    ));

    reporter.step(2, TOTAL_STEPS, "Crawl window");
    let outcome = RangeCrawler::new(fetcher)
        .with_failure_threshold(config.crawl.failure_threshold)
        .with_request_delay(config.http.request_delay())
        .crawl(window, reporter)
        .await;

    reporter.step(3, TOTAL_STEPS, "Archive raw payloads");
    let snapshot = if config.output.archive_raw {
        let path = SnapshotArchive::new(config.snapshot_dir())
            .archive(&outcome.raw_document())
            .await?;
        reporter.info(&format!("Snapshot written to {}", path.display()));
        Some(path)
    } else {
        reporter.info("Raw archiving disabled");
        None
    };

    reporter.step(4, TOTAL_STEPS, "Merge and write store");
    let (merged, merge_stats) = merge(existing, outcome.tickets);
    let store = storage.write_tickets(&merged).await?;
    let subset = write_subset(config, &merged, reporter).await?;

    let report = UpdateReport {
        anchor,
        crawl: outcome.stats,
        merge: merge_stats,
        snapshot,
        store,
        subset,
    };
    summarize(reporter, &report);
    Ok(report)
}

/// Write the cycling subset when enabled.
pub(crate) async fn write_subset(
    config: &Config,
    tickets: &[Ticket],
    reporter: &dyn Reporter,
) -> Result<Option<WriteMetadata>> {
    if !config.output.write_subset {
        return Ok(None);
    }
    let subset = cycling_subset(tickets);
    let written = LocalStorage::new(config.subset_path())
        .write_tickets(&subset)
        .await?;
    reporter.info(&format!(
        "Cycling subset: {} tickets written to {}",
        written.count,
        written.path.display()
    ));
    Ok(Some(written))
}

/// Summary lines shared by update and refresh.
pub(crate) fn merge_summary(
    merge: &MergeStats,
    store: &WriteMetadata,
    snapshot: Option<&PathBuf>,
) -> Vec<(&'static str, String)> {
    vec![
        ("retained", merge.retained.to_string()),
        ("replaced", merge.replaced.to_string()),
        ("added", merge.added.to_string()),
        ("store total", store.count.to_string()),
        ("store", store.path.display().to_string()),
        (
            "snapshot",
            snapshot.map_or_else(|| "-".to_string(), |p| p.display().to_string()),
        ),
    ]
}

fn summarize(reporter: &dyn Reporter, report: &UpdateReport) {
    let crawl = &report.crawl;
    let mut items = vec![
        (
            "window",
            format!("{}..={}", crawl.window.start_id, crawl.window.end_id),
        ),
        ("scanned", crawl.scanned.to_string()),
        ("fetched", crawl.fetched.to_string()),
        ("empty", crawl.empty.to_string()),
        ("rejected", crawl.rejected.to_string()),
        (
            "halted at",
            crawl
                .halted_at
                .map_or_else(|| "-".to_string(), |id| id.to_string()),
        ),
        (
            "duration",
            format!("{}s", (crawl.end_time - crawl.start_time).num_seconds()),
        ),
    ];
    items.extend(merge_summary(
        &report.merge,
        &report.store,
        report.snapshot.as_ref(),
    ));
    reporter.summary("Update", &items);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::pipeline::anchor::AnchorSource;
    use crate::services::fetch::testing::fetcher_for;
    use crate::storage::read_document;
    use crate::utils::MemoryReporter;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.data_dir = dir.to_path_buf();
        config.crawl.look_back = 2;
        config.crawl.look_ahead = 3;
        config
    }

    fn store_for(config: &Config) -> LocalStorage {
        LocalStorage::new(config.store_path())
    }

    #[tokio::test]
    async fn test_update_merges_window_into_store() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        std::fs::write(
            config.store_path(),
            r#"[{"id": 8, "name": "old"}, {"id": 10, "name": "old"}]"#,
        )
        .unwrap();
        let fetcher = fetcher_for([
            (9, json!({"id": 9, "name": "new"})),
            (10, json!({"id": 10, "name": "new"})),
            (12, json!({"id": 12, "name": "new"})),
        ]);
        let storage = store_for(&config);

        let report = run_update(&config, &fetcher, &storage, &MemoryReporter::new())
            .await
            .unwrap();

        assert_eq!(report.anchor.id, 10);
        assert_eq!(report.anchor.source, AnchorSource::Store);
        assert_eq!(report.crawl.window, CrawlWindow { start_id: 8, end_id: 13 });
        assert_eq!(report.crawl.fetched, 3);
        assert_eq!(report.merge.replaced, 1);

        let stored = storage.load_tickets(&MemoryReporter::new()).await.unwrap();
        let ids: Vec<u64> = stored.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![8, 9, 10, 12]);
        assert!(stored.iter().filter(|t| t.id != 8).all(|t| t.name == "new"));

        let snapshot = report.snapshot.unwrap();
        let raw = read_document(&snapshot).await.unwrap();
        assert_eq!(raw["items"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rerun_with_same_results_is_stable() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.crawl.anchor_override = Some(5);
        config.output.archive_raw = false;
        let fetcher = fetcher_for([(4, json!({"id": 4})), (5, json!({"id": 5}))]);
        let storage = store_for(&config);
        let reporter = MemoryReporter::new();

        let first = run_update(&config, &fetcher, &storage, &reporter).await.unwrap();
        let after_first = std::fs::read(config.store_path()).unwrap();
        let second = run_update(&config, &fetcher, &storage, &reporter).await.unwrap();
        let after_second = std::fs::read(config.store_path()).unwrap();

        assert_eq!(first.anchor.source, AnchorSource::Override);
        assert_eq!(second.anchor.source, AnchorSource::Store);
        assert_eq!(after_first, after_second);
        assert!(first.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_no_anchor_aborts_before_fetching() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let fetcher = fetcher_for([]);
        let storage = store_for(&config);

        let err = run_update(&config, &fetcher, &storage, &MemoryReporter::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoAnchor { .. }));
        assert!(!config.store_path().exists());
    }

    #[tokio::test]
    async fn test_subset_written_when_enabled() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.crawl.anchor_override = Some(1);
        config.output.write_subset = true;
        let fetcher = fetcher_for([
            (1, json!({"id": 1, "name": "Cyklostezka"})),
            (2, json!({"id": 2, "name": "Lampa"})),
        ]);

        let report = run_update(&config, &fetcher, &store_for(&config), &MemoryReporter::new())
            .await
            .unwrap();

        assert_eq!(report.store.count, 2);
        assert_eq!(report.subset.unwrap().count, 1);
        assert!(config.subset_path().exists());
    }
}
