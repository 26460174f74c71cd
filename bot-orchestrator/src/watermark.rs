use crate::types::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkRecord {
    last_seen: DateTime<Utc>,
}

/// Per-bot "last seen article" timestamps, one small JSON file per bot.
/// Writes go through a temp file and rename so a crash never leaves a
/// torn record. The watermark only moves forward.
pub struct WatermarkStore {
    dir: PathBuf,
}

impl WatermarkStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn record_path(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    pub async fn load(&self, id: Uuid) -> Result<Option<DateTime<Utc>>> {
        let path = self.record_path(id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let record: WatermarkRecord = serde_json::from_slice(&bytes)?;
                Ok(Some(record.last_seen))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Advance the stored watermark to `candidate` if it is newer.
    /// Returns the effective watermark after the call.
    pub async fn advance(&self, id: Uuid, candidate: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let current = self.load(id).await?;
        if let Some(current) = current {
            if candidate <= current {
                debug!("Watermark for {} unchanged at {}", id, current);
                return Ok(current);
            }
        }

        let record = WatermarkRecord { last_seen: candidate };
        write_atomic(&self.record_path(id), &serde_json::to_vec_pretty(&record)?).await?;
        debug!("Watermark for {} advanced to {}", id, candidate);
        Ok(candidate)
    }

    /// Remove the record for a deleted bot. Missing records are fine.
    pub async fn clear(&self, id: Uuid) -> Result<()> {
        match tokio::fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Whole-file atomic write: temp file in the same directory, then rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}
