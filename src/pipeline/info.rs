//! Store inspection for the `info` command.

use std::path::PathBuf;

use chrono::NaiveDateTime;

use crate::error::Result;
use crate::models::Config;
use crate::storage::{LocalStorage, SnapshotArchive, TicketStorage};
use crate::utils::Reporter;

#[derive(Debug, Clone, PartialEq)]
pub struct StoreInfo {
    pub store_path: PathBuf,
    pub exists: bool,
    pub count: usize,
    pub min_id: Option<u64>,
    pub max_id: Option<u64>,
    pub newest_created: Option<NaiveDateTime>,
    pub snapshot_dir: PathBuf,
    pub snapshots: usize,
}

/// Describe the configured store and snapshot directory.
pub async fn inspect_store(config: &Config, reporter: &dyn Reporter) -> Result<StoreInfo> {
    let store_path = config.store_path();
    let exists = tokio::fs::try_exists(&store_path).await?;
    let tickets = LocalStorage::new(&store_path)
        .load_tickets(reporter)
        .await?;

    let archive = SnapshotArchive::new(config.snapshot_dir());
    let snapshots = archive.list().await?.len();

    Ok(StoreInfo {
        store_path,
        exists,
        count: tickets.len(),
        min_id: tickets.iter().map(|t| t.id).min(),
        max_id: tickets.iter().map(|t| t.id).max(),
        newest_created: tickets.iter().filter_map(|t| t.created_at()).max(),
        snapshot_dir: archive.dir().to_path_buf(),
        snapshots,
    })
}

/// Log a [`StoreInfo`] as a summary block.
pub fn report_store_info(info: &StoreInfo, reporter: &dyn Reporter) {
    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    reporter.summary(
        "Store",
        &[
            ("path", info.store_path.display().to_string()),
            ("exists", info.exists.to_string()),
            ("tickets", info.count.to_string()),
            ("min id", or_dash(info.min_id.map(|id| id.to_string()))),
            ("max id", or_dash(info.max_id.map(|id| id.to_string()))),
            ("newest", or_dash(info.newest_created.map(|d| d.to_string()))),
            ("snapshot dir", info.snapshot_dir.display().to_string()),
            ("snapshots", info.snapshots.to_string()),
        ],
    );
}
