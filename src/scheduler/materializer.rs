//! Materializer seam and a file-backed implementation.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{MaterializedRef, RecurrenceSeries};

/// Failure reported by a materializer
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("materializer unavailable: {0}")]
    Unavailable(String),

    #[error("materializer rejected occurrence: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Turns one calculated occurrence into a concrete meeting
///
/// Called at most once per `(series, start_time)` unless a previous call
/// failed and its claim was released.
#[async_trait]
pub trait Materializer: Send + Sync {
    async fn materialize(
        &self,
        series: &RecurrenceSeries,
        at: DateTime<Utc>,
    ) -> Result<MaterializedRef, MaterializeError>;
}

/// One line of the journal file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub reference: MaterializedRef,
    pub series_id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub time_zone: String,
}

/// Appends each materialized occurrence to a JSONL journal
#[derive(Debug)]
pub struct JournalMaterializer {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JournalMaterializer {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, MaterializeError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join("occurrences.jsonl"),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every journal entry
    pub fn entries(&self) -> Result<Vec<JournalEntry>, MaterializeError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(MaterializeError::from))
            .collect()
    }

    fn reference_for(series_id: &str, at: DateTime<Utc>) -> MaterializedRef {
        MaterializedRef::new(format!("occ-{}-{}", series_id, at.timestamp()))
    }
}

#[async_trait]
impl Materializer for JournalMaterializer {
    async fn materialize(
        &self,
        series: &RecurrenceSeries,
        at: DateTime<Utc>,
    ) -> Result<MaterializedRef, MaterializeError> {
        let entry = JournalEntry {
            reference: Self::reference_for(&series.id, at),
            series_id: series.id.clone(),
            title: series.title.clone(),
            start_time: at,
            time_zone: series.time_zone.name().to_string(),
        };
        let line = serde_json::to_string(&entry)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| MaterializeError::Unavailable(e.to_string()))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        Ok(entry.reference)
    }
}
