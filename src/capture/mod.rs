//! Sensor capture for sleep-sentinel.
//!
//! This module owns the camera and microphone devices and their reader
//! threads. Each reader publishes only its most recent output to a
//! single-slot mailbox; the fusion loop never waits on a device.

pub mod camera;
pub mod demux;
pub mod mailbox;
pub mod microphone;
pub mod process;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use camera::{CameraCapture, CommandCamera, FrameSource, MjpegFileCamera, ReaderSettings};
pub use demux::{DemuxError, FrameDemuxer};
pub use mailbox::{shared_mailbox, Mailbox, SharedMailbox};
pub use microphone::{AudioCapture, AudioSettings, AudioSource, CommandMicrophone, PcmFileMicrophone};
pub use types::{AudioChunk, Frame};
pub use worker::Worker;

/// Errors raised while opening or reading a sensor.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// The device or its capture tool could not be opened
    DeviceUnavailable(String),
    /// A frame could not be decoded
    Decode(String),
    /// The source was opened twice
    AlreadyRunning,
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::DeviceUnavailable(msg) => write!(f, "Device unavailable: {}", msg),
            CaptureError::Decode(msg) => write!(f, "Frame decode failed: {}", msg),
            CaptureError::AlreadyRunning => write!(f, "Capture source is already running"),
        }
    }
}

impl std::error::Error for CaptureError {}
