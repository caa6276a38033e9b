//! Process status surface: a JSON status record and a PID file.
//!
//! The status record is rewritten about once a second while the monitor
//! runs and once more with `running: false` on exit. External control
//! layers poll it; nothing in this crate reads it back except the `status`
//! command.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Timestamp format used in the status record.
pub const STATUS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Status record as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub running: bool,
    /// Always true; there is no preview window
    pub headless: bool,
    #[serde(default)]
    pub instance_id: Option<Uuid>,
    pub start_time: Option<String>,
    pub is_sleeping: bool,
    pub total_sleep_seconds: f64,
    pub last_update: String,
}

impl StatusReport {
    pub fn running(
        instance_id: Uuid,
        start_time: DateTime<Local>,
        is_sleeping: bool,
        total_sleep_seconds: f64,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            running: true,
            headless: true,
            instance_id: Some(instance_id),
            start_time: Some(start_time.format(STATUS_TIME_FORMAT).to_string()),
            is_sleeping,
            total_sleep_seconds,
            last_update: now.format(STATUS_TIME_FORMAT).to_string(),
        }
    }

    /// Record written when the monitor exits. The run's sleep total is kept
    /// so pollers still see it after the process is gone.
    pub fn stopped(total_sleep_seconds: f64, now: DateTime<Local>) -> Self {
        Self {
            running: false,
            headless: true,
            instance_id: None,
            start_time: None,
            is_sleeping: false,
            total_sleep_seconds,
            last_update: now.format(STATUS_TIME_FORMAT).to_string(),
        }
    }
}

/// Writes and reads the status record.
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the record. Written to a sibling file and renamed so that
    /// readers never see a partial record.
    pub fn write(&self, report: &StatusReport) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }

    /// Current record, or `None` when no status has been written.
    pub fn read(&self) -> Result<Option<StatusReport>, std::io::Error> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let report = serde_json::from_str(&content).map_err(std::io::Error::other)?;
        Ok(Some(report))
    }
}

/// PID file that is removed when dropped.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write the current process id to `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Ok(existing) = std::fs::read_to_string(&path) {
            tracing::warn!(
                "Replacing stale PID file {} (pid {})",
                path.display(),
                existing.trim()
            );
        }
        std::fs::write(&path, std::process::id().to_string())?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now.
    pub fn remove(self) {
        drop(self);
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Could not remove PID file {}: {}", self.path.display(), e);
            }
        }
    }
}
