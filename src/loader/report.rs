use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::process::header::HeaderConvention;

/// Whether an export made it into the dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FileState {
    Loaded,
    Skipped,
}

/// Outcome of one file in a load pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub file: String,
    pub state: FileState,
    pub convention: Option<HeaderConvention>,
    pub rows: usize,
    /// Full error chain for skipped files.
    pub reason: Option<String>,
}

impl FileOutcome {
    pub fn loaded(file: impl Into<String>, convention: HeaderConvention, rows: usize) -> Self {
        Self {
            file: file.into(),
            state: FileState::Loaded,
            convention: Some(convention),
            rows,
            reason: None,
        }
    }

    pub fn skipped(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            state: FileState::Skipped,
            convention: None,
            rows: 0,
            reason: Some(reason.into()),
        }
    }
}

/// Diagnostics of one load pass, published next to the dataset it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadReport {
    pub data_dir: PathBuf,
    pub files: Vec<FileOutcome>,
    /// Set when the directory itself could not be read.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl LoadReport {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            data_dir: data_dir.into(),
            files: Vec::new(),
            error: None,
            started_at: now,
            finished_at: now,
        }
    }

    /// A report for a pass that never got to the files.
    pub fn failed(data_dir: impl Into<PathBuf>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(data_dir)
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    pub fn loaded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.state == FileState::Loaded)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.state == FileState::Skipped)
    }

    pub fn rows_loaded(&self) -> usize {
        self.loaded().map(|f| f.rows).sum()
    }
}
