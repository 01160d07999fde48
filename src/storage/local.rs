//! Local filesystem store.
//!
//! The store is a single JSON file holding a bare array of tickets. Every
//! write goes through [`write_atomic_from`]: bytes land in a temporary file
//! next to the target, which is synced and renamed over it only once
//! complete. Any failure removes the temporary file and leaves the target
//! untouched.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::error::{AppError, Result};
use crate::models::Ticket;
use crate::services::{Normalized, normalize};
use crate::storage::{TicketStorage, WriteMetadata, item_list};
use crate::utils::Reporter;

/// Store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw file, returning None if it doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::store(&self.path, e)),
        }
    }
}

#[async_trait]
impl TicketStorage for LocalStorage {
    async fn load_tickets(&self, reporter: &dyn Reporter) -> Result<Vec<Ticket>> {
        let Some(bytes) = self.read_bytes().await? else {
            reporter.warn(&format!(
                "No store at {}, starting empty",
                self.path.display()
            ));
            return Ok(Vec::new());
        };

        let document = serde_json::from_slice(&bytes)
            .map_err(|e| AppError::store(&self.path, format!("invalid JSON: {e}")))?;
        let items = item_list(document).ok_or_else(|| {
            AppError::store(
                &self.path,
                "expected a JSON array or an object with an `items` array",
            )
        })?;

        let mut tickets = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            match normalize(item) {
                Normalized::Valid(ticket) => tickets.push(ticket),
                Normalized::Rejected(rejection) => reporter.warn(&format!(
                    "{}: dropping entry #{index}: {rejection}",
                    self.path.display()
                )),
            }
        }
        reporter.debug(&format!(
            "Loaded {} tickets from {}",
            tickets.len(),
            self.path.display()
        ));
        Ok(tickets)
    }

    async fn write_tickets(&self, tickets: &[Ticket]) -> Result<WriteMetadata> {
        let bytes = serde_json::to_vec_pretty(tickets)?;
        let written = write_atomic(&self.path, &bytes).await?;
        Ok(WriteMetadata {
            path: self.path.clone(),
            count: tickets.len(),
            bytes: written,
            timestamp: Utc::now(),
        })
    }
}

/// Replace `path` with `bytes` atomically.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<u64> {
    write_atomic_from(path, bytes).await
}

/// Replace `path` with everything `reader` yields, atomically.
///
/// Returns the number of bytes written.
pub async fn write_atomic_from<R>(path: &Path, mut reader: R) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let tmp = temp_path(path)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::store(path, e))?;
    }

    let outcome = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        let written = tokio::io::copy(&mut reader, &mut file).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await?;
        Ok::<_, std::io::Error>(written)
    }
    .await;

    match outcome {
        Ok(written) => Ok(written),
        Err(e) => {
            // The temp file may not exist yet; nothing else to do on failure.
            let _ = tokio::fs::remove_file(&tmp).await;
            Err(AppError::store(path, e))
        }
    }
}

/// Hidden sibling of `path`, unique to this process.
fn temp_path(path: &Path) -> Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| AppError::store(path, "not a file path"))?;
    let tmp_name = format!(".{}.tmp-{}", name.to_string_lossy(), std::process::id());
    Ok(path.with_file_name(tmp_name))
}
