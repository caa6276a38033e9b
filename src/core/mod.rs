//! Core signal processing for sleep-sentinel.
//!
//! This module contains:
//! - Frame preparation and motion measurement with rollover debouncing
//! - Face/eye detection interface
//! - Audio volume, snore and breathing analysis
//! - Baseline calibration
//! - The sleep/wake state machine

pub mod audio;
pub mod calibration;
pub mod detect;
pub mod history;
pub mod imaging;
pub mod motion;
pub mod sleep;
pub mod spectrum;
pub mod vision;

// Re-export commonly used types
pub use audio::{AudioSignal, AudioStatus, AudioThresholds};
pub use calibration::{CalibrationResult, Calibrator};
pub use detect::{Detector, NoopDetector, Rect, StaticRegionDetector};
pub use history::History;
pub use motion::{MotionReading, MotionSignal};
pub use sleep::{
    sleep_condition, SleepEvent, SleepSession, SleepState, SleepStateMachine, SleepTimings,
    SleepTrigger,
};
pub use vision::{CameraMonitor, CameraStatus};
