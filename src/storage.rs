use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::StoreError;
use crate::record::ClubRecord;

/// JSON file holding one record per club name.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
}

impl ResultStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored records in insertion order. A missing file is an empty store.
    pub async fn load(&self) -> Result<Vec<ClubRecord>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes `record`, replacing any earlier record for the same club.
    pub async fn record(&self, record: ClubRecord) -> Result<(), StoreError> {
        let mut records = self.load().await?;
        upsert(&mut records, record);
        self.save(&records).await
    }

    /// Replaces the whole file. Readers never observe a half-written file.
    pub async fn save(&self, records: &[ClubRecord]) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), records = records.len(), "results saved");
        Ok(())
    }
}

/// Replaces the record with the same name in place, or appends.
pub fn upsert(records: &mut Vec<ClubRecord>, record: ClubRecord) {
    match records.iter_mut().find(|r| r.name() == record.name()) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}
