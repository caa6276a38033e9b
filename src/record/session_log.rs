//! Append-only log of completed sleep sessions.

use crate::core::sleep::SleepSession;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Header line of the session CSV.
pub const CSV_HEADER: &str = "date,sleep_start,sleep_end,duration_hours,duration_minutes,snore_detected";

/// Errors from session persistence.
#[derive(Debug)]
pub enum RecorderError {
    Io(std::io::Error),
    /// A row in an existing log could not be parsed
    Malformed { line: usize, reason: String },
}

impl std::fmt::Display for RecorderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecorderError::Io(e) => write!(f, "IO error: {}", e),
            RecorderError::Malformed { line, reason } => {
                write!(f, "Malformed session log line {}: {}", line, reason)
            }
        }
    }
}

impl std::error::Error for RecorderError {}

impl From<std::io::Error> for RecorderError {
    fn from(e: std::io::Error) -> Self {
        RecorderError::Io(e)
    }
}

/// Sink for completed sessions.
pub trait SessionRecorder {
    fn append(&mut self, session: &SleepSession) -> Result<(), RecorderError>;
}

/// One row of the session log as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRow {
    pub date: String,
    pub sleep_start: String,
    pub sleep_end: String,
    pub duration_hours: i64,
    pub duration_minutes: i64,
    pub snore_detected: bool,
}

impl SessionRow {
    pub fn from_session(session: &SleepSession) -> Self {
        Self {
            date: session.date().format("%Y-%m-%d").to_string(),
            sleep_start: session.started_at.format("%H:%M:%S").to_string(),
            sleep_end: session.ended_at.format("%H:%M:%S").to_string(),
            duration_hours: session.duration_hours,
            duration_minutes: session.duration_minutes,
            snore_detected: session.snore_detected,
        }
    }

    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.date,
            self.sleep_start,
            self.sleep_end,
            self.duration_hours,
            self.duration_minutes,
            if self.snore_detected { "True" } else { "False" }
        )
    }

    fn parse(line: &str, number: usize) -> Result<Self, RecorderError> {
        let malformed = |reason: String| RecorderError::Malformed {
            line: number,
            reason,
        };

        let fields: Vec<&str> = line.trim_end().split(',').collect();
        if fields.len() != 6 {
            return Err(malformed(format!("expected 6 fields, found {}", fields.len())));
        }
        let int = |s: &str| {
            s.trim()
                .parse::<i64>()
                .map_err(|e| malformed(format!("{s:?}: {e}")))
        };
        let snore_detected = match fields[5].trim() {
            "True" | "true" | "1" => true,
            "False" | "false" | "0" => false,
            other => return Err(malformed(format!("bad snore flag {other:?}"))),
        };

        Ok(Self {
            date: fields[0].to_string(),
            sleep_start: fields[1].to_string(),
            sleep_end: fields[2].to_string(),
            duration_hours: int(fields[3])?,
            duration_minutes: int(fields[4])?,
            snore_detected,
        })
    }

    /// Duration in whole minutes.
    pub fn total_minutes(&self) -> i64 {
        self.duration_hours * 60 + self.duration_minutes
    }
}

/// CSV file of sessions, one row per session.
#[derive(Debug, Clone)]
pub struct CsvSessionLog {
    path: PathBuf,
}

impl CsvSessionLog {
    /// Open the log at `path`, creating it with a header when missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let path = path.into();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, format!("{CSV_HEADER}\n"))?;
            tracing::info!("Created session log at {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All rows currently in the log, header excluded.
    pub fn read_all(&self) -> Result<Vec<SessionRow>, RecorderError> {
        read_rows(&self.path)
    }
}

/// Read the rows of a session log. A missing file has no rows.
pub fn read_rows(path: &Path) -> Result<Vec<SessionRow>, RecorderError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut rows = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if (index == 0 && line.starts_with("date,")) || line.trim().is_empty() {
            continue;
        }
        rows.push(SessionRow::parse(&line, index + 1)?);
    }
    Ok(rows)
}

impl SessionRecorder for CsvSessionLog {
    fn append(&mut self, session: &SleepSession) -> Result<(), RecorderError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", SessionRow::from_session(session).to_csv())?;
        Ok(())
    }
}

/// Keeps sessions in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    sessions: Vec<SleepSession>,
}

impl MemoryRecorder {
    pub fn sessions(&self) -> &[SleepSession] {
        &self.sessions
    }
}

impl SessionRecorder for MemoryRecorder {
    fn append(&mut self, session: &SleepSession) -> Result<(), RecorderError> {
        self.sessions.push(session.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Local, TimeZone};

    fn temp_log() -> PathBuf {
        std::env::temp_dir()
            .join(format!("sleep-sentinel-log-{}", uuid::Uuid::new_v4()))
            .join("sleep_records.csv")
    }

    fn session(snore: bool) -> SleepSession {
        let start = Local.with_ymd_and_hms(2025, 3, 1, 23, 15, 0).unwrap();
        SleepSession::new(start, start + Duration::minutes(7 * 60 + 42), snore)
    }

    #[test]
    fn test_row_format() {
        let row = SessionRow::from_session(&session(true));
        assert_eq!(row.to_csv(), "2025-03-01,23:15:00,06:57:00,7,42,True");
        assert_eq!(row.total_minutes(), 462);
    }

    #[test]
    fn test_open_writes_header_once() {
        let path = temp_log();
        CsvSessionLog::open(&path).unwrap();
        let mut log = CsvSessionLog::open(&path).unwrap();
        log.append(&session(false)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec![CSV_HEADER, "2025-03-01,23:15:00,06:57:00,7,42,False"]);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_read_all() {
        let path = temp_log();
        let mut log = CsvSessionLog::open(&path).unwrap();
        log.append(&session(false)).unwrap();
        log.append(&session(true)).unwrap();

        let rows = log.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(!rows[0].snore_detected);
        assert!(rows[1].snore_detected);
        assert_eq!(rows[1].duration_hours, 7);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_malformed_row_reports_line() {
        let path = temp_log();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("{CSV_HEADER}\n2025-03-01,23:15:00,06:57:00,x,42,True\n"))
            .unwrap();

        match read_rows(&path) {
            Err(RecorderError::Malformed { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected malformed row, got {other:?}"),
        }

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_missing_log_is_empty() {
        assert!(read_rows(&temp_log()).unwrap().is_empty());
    }
}
