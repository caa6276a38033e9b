//! sleep-sentinel - camera and microphone sleep/wake recorder.
//!
//! This library watches a sleeper through an MJPEG camera stream and a
//! microphone, fuses motion, face/eye presence, volume, snoring and breathing
//! into a sleep/wake state machine, and records each completed sleep session.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         sleep-sentinel                         │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌──────────────┐   ┌───────────────┐        │
//! │  │ Camera proc │──▶│ FrameDemuxer │──▶│ CameraMonitor │──┐     │
//! │  │ MJPEG pipe  │   │  + decode    │   │ motion, faces │  │     │
//! │  └─────────────┘   └──────────────┘   └───────────────┘  ▼     │
//! │                                                  ┌────────────┐│
//! │                                                  │   Sleep    ││
//! │                                                  │   State    ││
//! │                                                  │  Machine   ││
//! │  ┌─────────────┐   ┌──────────────┐              └────────────┘│
//! │  │ Microphone  │──▶│ AudioSignal  │─────────────────▲    │     │
//! │  │  PCM pipe   │   │ volume, FFT  │                      ▼     │
//! │  └─────────────┘   └──────────────┘          ┌──────────────┐  │
//! │                                              │ Session log  │  │
//! │                                              │ + status     │  │
//! │                                              └──────────────┘  │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use sleep_sentinel::{run_monitor, Config, RunOptions, ShutdownToken};
//!
//! let shutdown = ShutdownToken::new();
//! shutdown.install_signal_handler().expect("signal handler");
//!
//! let summary = run_monitor(Config::load().unwrap_or_default(), RunOptions { calibrate: true }, &shutdown)
//!     .expect("monitor failed to start");
//! println!("Slept {:.0}s", summary.total_sleep_seconds);
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod monitor;
pub mod record;
pub mod shutdown;

// Re-export key types at crate root for convenience
pub use capture::{AudioCapture, CameraCapture, CaptureError, FrameDemuxer};
pub use config::{Config, ConfigError};
pub use crate::core::{
    AudioSignal, AudioStatus, CalibrationResult, Calibrator, CameraStatus, MotionSignal,
    SleepSession, SleepState, SleepStateMachine,
};
pub use monitor::{run_monitor, Monitor, MonitorError, RunOptions, RunSummary};
pub use record::{CsvSessionLog, SessionRecorder, StatusFile, StatusReport};
pub use shutdown::ShutdownToken;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
