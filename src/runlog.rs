//! Append-only diagnostic log shared by sample pipelines.

use std::{
    fs::{File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// One line per diagnostic: `<timestamp> - <message>`.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl RunLog {
    /// Opens (or creates) the log for appending. Missing parent directories are created.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line. Concurrent writers never interleave within a line.
    pub fn append(&self, message: &str) -> io::Result<()> {
        let line = format!("{} - {}\n", timestamp(), message);
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())?;
        file.flush()
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Per-sample state threaded through every stage of one pipeline run.
#[derive(Debug, Clone)]
pub struct SampleContext {
    sample_id: String,
    log: Arc<RunLog>,
}

impl SampleContext {
    pub fn new(sample_id: impl Into<String>, log: Arc<RunLog>) -> Self {
        Self {
            sample_id: sample_id.into(),
            log,
        }
    }

    pub fn sample_id(&self) -> &str {
        &self.sample_id
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Records a diagnostic in the persistent log and reports it on stderr.
    pub fn diagnostic(&self, message: &str) -> io::Result<()> {
        tracing::warn!(sample = %self.sample_id, "{message}");
        self.log.append(message)
    }
}
