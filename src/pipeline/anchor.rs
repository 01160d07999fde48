//! Anchor resolution: where the next crawl window is centred.

use std::fmt;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Ticket;
use crate::utils::numeric_file_id;

/// Which signal produced the anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSource {
    /// Highest id already in the store
    Store,
    /// Caller-supplied id
    Override,
    /// Highest `<id>.json` file in the seed directory
    SeedDir,
}

impl fmt::Display for AnchorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Store => "store",
            Self::Override => "override",
            Self::SeedDir => "seed directory",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    pub id: u64,
    pub source: AnchorSource,
}

/// Pick the anchor: store maximum, then override, then seed directory.
///
/// Fails with [`AppError::NoAnchor`] when none of them yields an id.
pub async fn resolve_anchor(
    existing: &[Ticket],
    explicit_override: Option<u64>,
    seed_dir: Option<&Path>,
) -> Result<Anchor> {
    if let Some(id) = existing.iter().map(|t| t.id).max() {
        return Ok(Anchor {
            id,
            source: AnchorSource::Store,
        });
    }
    if let Some(id) = explicit_override {
        return Ok(Anchor {
            id,
            source: AnchorSource::Override,
        });
    }
    let seeded = match seed_dir {
        Some(dir) => max_seed_id(dir).await?,
        None => None,
    };
    if let Some(id) = seeded {
        return Ok(Anchor {
            id,
            source: AnchorSource::SeedDir,
        });
    }

    Err(AppError::NoAnchor {
        seed_dir: seed_dir.map(|d| d.display().to_string()),
    })
}

/// Highest numeric file name in `dir`; a missing directory has none.
async fn max_seed_id(dir: &Path) -> Result<Option<u64>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut max = None;
    while let Some(entry) = entries.next_entry().await? {
        if let Some(id) = numeric_file_id(&entry.file_name().to_string_lossy()) {
            max = max.max(Some(id));
        }
    }
    Ok(max)
}
