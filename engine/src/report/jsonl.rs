//! JSON-lines report sink
//!
//! One shared file for every session in the process. Records are serialized
//! before the lock is taken; the lock covers a single write of a single line.

use super::{DimensionRecord, Record, ReportSink};
use async_trait::async_trait;
use sdk::errors::AssessmentError;
use sdk::types::{Report, TurnRecord};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it and its parent directory
    pub async fn open(path: &Path) -> Result<Self, AssessmentError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AssessmentError::Persistence(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|e| {
                AssessmentError::Persistence(format!("Failed to open {}: {}", path.display(), e))
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, record: &Record) -> Result<(), AssessmentError> {
        let mut line = serde_json::to_vec(record)
            .map_err(|e| AssessmentError::Persistence(format!("Failed to encode record: {}", e)))?;
        line.push(b'\n');

        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .map_err(|e| AssessmentError::Persistence(format!("Failed to append record: {}", e)))?;
        file.flush()
            .await
            .map_err(|e| AssessmentError::Persistence(format!("Failed to flush record: {}", e)))
    }

    /// Read every record back, skipping lines that do not parse
    pub async fn read_all(path: &Path) -> Result<Vec<Record>, AssessmentError> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            AssessmentError::Persistence(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Ok(contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[async_trait]
impl ReportSink for JsonlSink {
    async fn record_turn(&self, record: &TurnRecord) -> Result<(), AssessmentError> {
        self.append(&Record::Turn(record.clone())).await
    }

    async fn record_dimension(&self, record: &DimensionRecord) -> Result<(), AssessmentError> {
        self.append(&Record::Dimension(record.clone())).await
    }

    async fn record_report(&self, report: &Report) -> Result<(), AssessmentError> {
        self.append(&Record::Report(report.clone())).await
    }
}
