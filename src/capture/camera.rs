//! Camera capture: an MJPEG byte stream is read on a background thread,
//! split into frames, decoded, and published to a single-slot mailbox.

use crate::capture::demux::FrameDemuxer;
use crate::capture::mailbox::{shared_mailbox, SharedMailbox};
use crate::capture::process::StreamProcess;
use crate::capture::types::Frame;
use crate::capture::worker::Worker;
use crate::capture::CaptureError;
use image::{DynamicImage, ImageFormat};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A producer of MJPEG bytes.
pub trait FrameSource: Send {
    /// Short name used in log lines.
    fn name(&self) -> &str;

    /// Open the byte stream.
    fn open(&mut self) -> Result<Box<dyn Read + Send>, CaptureError>;

    /// Delay between published frames. Live sources return `None` and are
    /// paced by the device itself.
    fn frame_interval(&self) -> Option<Duration> {
        None
    }

    /// Release the device after the reader thread has stopped.
    fn close(&mut self, _grace: Duration) {}
}

/// Camera tool spawned as a child process writing MJPEG to stdout.
pub struct CommandCamera {
    program: String,
    args: Vec<String>,
    process: Option<StreamProcess>,
}

impl CommandCamera {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            process: None,
        }
    }

    /// `libcamera-vid` streaming MJPEG at the given geometry.
    pub fn libcamera(width: u32, height: u32, framerate: u32) -> Self {
        Self::new("libcamera-vid", libcamera_args(width, height, framerate))
    }
}

/// Arguments for an endless, preview-less MJPEG stream on stdout.
pub fn libcamera_args(width: u32, height: u32, framerate: u32) -> Vec<String> {
    vec![
        "-t".into(),
        "0".into(),
        "--width".into(),
        width.to_string(),
        "--height".into(),
        height.to_string(),
        "--codec".into(),
        "mjpeg".into(),
        "--framerate".into(),
        framerate.to_string(),
        "-n".into(),
        "-o".into(),
        "-".into(),
    ]
}

impl FrameSource for CommandCamera {
    fn name(&self) -> &str {
        &self.program
    }

    fn open(&mut self) -> Result<Box<dyn Read + Send>, CaptureError> {
        if self.process.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        let (process, stdout) = StreamProcess::spawn(&self.program, &self.args)?;
        self.process = Some(process);
        Ok(Box::new(stdout))
    }

    fn close(&mut self, grace: Duration) {
        if let Some(mut process) = self.process.take() {
            process.terminate(grace);
        }
    }
}

/// Recorded MJPEG file replayed at a fixed frame rate.
pub struct MjpegFileCamera {
    path: PathBuf,
    label: String,
    interval: Duration,
}

impl MjpegFileCamera {
    pub fn new(path: impl Into<PathBuf>, framerate: u32) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            path,
            interval: Duration::from_secs(1) / framerate.max(1),
        }
    }
}

impl FrameSource for MjpegFileCamera {
    fn name(&self) -> &str {
        &self.label
    }

    fn open(&mut self) -> Result<Box<dyn Read + Send>, CaptureError> {
        let file = File::open(&self.path)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {e}", self.label)))?;
        Ok(Box::new(file))
    }

    fn frame_interval(&self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// Reader thread settings.
#[derive(Debug, Clone, Copy)]
pub struct ReaderSettings {
    /// Bytes requested per read call
    pub chunk_bytes: usize,
    /// Demuxer safety limit
    pub max_buffer_bytes: usize,
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            chunk_bytes: 32 * 1024,
            max_buffer_bytes: crate::capture::demux::DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Decode one JPEG image.
pub fn decode_jpeg(bytes: &[u8]) -> Result<DynamicImage, CaptureError> {
    image::load_from_memory_with_format(bytes, ImageFormat::Jpeg)
        .map_err(|e| CaptureError::Decode(e.to_string()))
}

/// Running camera capture.
pub struct CameraCapture {
    source: Option<Box<dyn FrameSource>>,
    frames: SharedMailbox<Arc<Frame>>,
    worker: Option<Worker>,
}

impl CameraCapture {
    /// Open `source` and start the reader thread.
    ///
    /// A source that cannot be opened is logged and yields a capture that
    /// never publishes frames.
    pub fn start(mut source: Box<dyn FrameSource>, settings: ReaderSettings) -> Self {
        let frames = shared_mailbox();

        let reader = match source.open() {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!("Camera unavailable, continuing without video: {}", e);
                return Self {
                    source: None,
                    frames,
                    worker: None,
                };
            }
        };

        let pace = source.frame_interval();
        let mailbox = frames.clone();
        let worker = Worker::spawn("camera-reader", move |running| {
            pump_frames(reader, settings, &mailbox, &running, pace);
        });

        match worker {
            Ok(worker) => {
                tracing::info!("Camera capture started ({})", source.name());
                Self {
                    source: Some(source),
                    frames,
                    worker: Some(worker),
                }
            }
            Err(e) => {
                tracing::warn!("Could not start camera thread: {}", e);
                source.close(Duration::ZERO);
                Self {
                    source: None,
                    frames,
                    worker: None,
                }
            }
        }
    }

    /// Capture with no device behind it.
    pub fn disabled() -> Self {
        Self {
            source: None,
            frames: shared_mailbox(),
            worker: None,
        }
    }

    /// Whether a device was opened and its reader is still producing.
    pub fn is_available(&self) -> bool {
        self.worker.as_ref().map(Worker::is_running).unwrap_or(false)
    }

    /// Latest frame newer than sequence `seen`.
    pub fn newer_frame(&self, seen: u64) -> Option<(u64, Arc<Frame>)> {
        self.frames.newer_than(seen)
    }

    /// Shared handle to the frame mailbox.
    pub fn frames(&self) -> SharedMailbox<Arc<Frame>> {
        self.frames.clone()
    }

    /// Stop the reader (bounded by `join_timeout`), then release the device,
    /// allowing it `grace` to exit before it is killed.
    pub fn stop(&mut self, join_timeout: Duration, grace: Duration) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop(join_timeout);
        }
        if let Some(mut source) = self.source.take() {
            source.close(grace);
            tracing::info!("Camera capture stopped ({})", source.name());
        }
    }
}

impl Drop for CameraCapture {
    fn drop(&mut self) {
        self.stop(Duration::from_millis(200), Duration::from_millis(500));
    }
}

/// Read `reader` until EOF, error, or `running` turns false, publishing each
/// decoded frame. Returns the number of frames published.
pub(crate) fn pump_frames<R: Read>(
    mut reader: R,
    settings: ReaderSettings,
    mailbox: &SharedMailbox<Arc<Frame>>,
    running: &AtomicBool,
    pace: Option<Duration>,
) -> u64 {
    let mut demuxer = FrameDemuxer::with_limit(settings.max_buffer_bytes);
    let mut buf = vec![0u8; settings.chunk_bytes.max(1)];
    let mut published = 0u64;
    let mut decode_failures = 0u64;

    while running.load(Ordering::SeqCst) {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                tracing::info!("Camera stream ended after {} frames", published);
                break;
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    tracing::warn!("Camera read error: {}", e);
                }
                break;
            }
        };

        let jpegs = match demuxer.push(&buf[..n]) {
            Ok(jpegs) => jpegs,
            Err(e) => {
                tracing::warn!("{}", e);
                continue;
            }
        };

        for jpeg in jpegs {
            match decode_jpeg(&jpeg) {
                Ok(image) => {
                    published += 1;
                    mailbox.publish(Arc::new(Frame::new(image, published)));
                    if let Some(interval) = pace {
                        thread::sleep(interval);
                    }
                }
                Err(e) => {
                    decode_failures += 1;
                    if decode_failures == 1 {
                        tracing::warn!("Dropping undecodable frame: {}", e);
                    } else {
                        tracing::debug!("Dropping undecodable frame #{}: {}", decode_failures, e);
                    }
                }
            }
            if !running.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    published
}
