//! Compressed, write-once snapshots of raw crawl payloads.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use bzip2::Compression;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};

/// Colon-free so names are portable and sort chronologically.
const SNAPSHOT_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%SZ";

/// Directory of timestamp-named `.json.bz2` snapshots.
#[derive(Debug, Clone)]
pub struct SnapshotArchive {
    dir: PathBuf,
}

impl SnapshotArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `payload` as a new snapshot named after the current time.
    pub async fn archive(&self, payload: &Value) -> Result<PathBuf> {
        self.archive_at(payload, Utc::now()).await
    }

    /// Write `payload` as a new snapshot named after `at`.
    ///
    /// An existing snapshot with the same name gets a `-N` sibling instead;
    /// nothing is ever overwritten.
    pub async fn archive_at(&self, payload: &Value, at: DateTime<Utc>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| AppError::snapshot(&self.dir, e))?;

        let json = serde_json::to_vec(payload)?;
        let compressed = compress(&json).map_err(|e| AppError::snapshot(&self.dir, e))?;
        let stem = at.format(SNAPSHOT_TIME_FORMAT).to_string();

        let mut suffix = 0u32;
        loop {
            let name = match suffix {
                0 => format!("{stem}.json.bz2"),
                n => format!("{stem}-{n}.json.bz2"),
            };
            let path = self.dir.join(name);

            let file = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match file {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(&compressed).await?;
                        file.sync_all().await
                    }
                    .await;
                    if let Err(e) = written {
                        drop(file);
                        let _ = tokio::fs::remove_file(&path).await;
                        return Err(AppError::snapshot(&path, e));
                    }
                    return Ok(path);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(AppError::snapshot(&path, e)),
            }
        }
    }

    /// Snapshot files in replay order.
    pub async fn list(&self) -> Result<Vec<PathBuf>> {
        match tokio::fs::metadata(&self.dir).await {
            Ok(_) => list_documents(&self.dir).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(AppError::snapshot(&self.dir, e)),
        }
    }
}

pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(bytes)?;
    encoder.finish()
}

pub fn decompress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    MultiBzDecoder::new(bytes).read_to_end(&mut out)?;
    Ok(out)
}

/// Whether a file name looks like a replayable JSON document.
pub fn is_document_name(name: &str) -> bool {
    name.ends_with(".json") || name.ends_with(".bz2")
}

/// Replayable files directly under `dir`, sorted byte-wise by file name.
pub async fn list_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| AppError::snapshot(dir, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| AppError::snapshot(dir, e))?
    {
        let name = entry.file_name();
        if !is_document_name(&name.to_string_lossy()) {
            continue;
        }
        let is_file = entry
            .file_type()
            .await
            .map(|t| t.is_file())
            .unwrap_or(false);
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Read a `.json` or bzip2-compressed document.
pub async fn read_document(path: &Path) -> Result<Value> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::snapshot(path, e))?;

    let is_compressed = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"));
    let bytes = if is_compressed {
        decompress(&raw).map_err(|e| AppError::snapshot(path, format!("bad bzip2 data: {e}")))?
    } else {
        raw
    };

    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::snapshot(path, format!("invalid JSON: {e}")))
}
