//! Persistence for sleep-sentinel.
//!
//! Completed sessions go to an append-only CSV log; the running process
//! exposes its state through a status record and a PID file.

pub mod session_log;
pub mod status;

// Re-export commonly used types
pub use session_log::{
    read_rows, CsvSessionLog, MemoryRecorder, RecorderError, SessionRecorder, SessionRow,
    CSV_HEADER,
};
pub use status::{PidFile, StatusFile, StatusReport, STATUS_TIME_FORMAT};
