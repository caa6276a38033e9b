//! Microphone capture: fixed-size PCM chunks are read on a background thread,
//! run through [`AudioSignal`], and the resulting status is published.

use crate::capture::mailbox::{shared_mailbox, SharedMailbox};
use crate::capture::process::StreamProcess;
use crate::capture::types::AudioChunk;
use crate::capture::worker::Worker;
use crate::capture::CaptureError;
use crate::core::audio::{AudioSignal, AudioStatus, AudioThresholds};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// A producer of signed 16-bit little-endian mono PCM.
pub trait AudioSource: Send {
    fn name(&self) -> &str;

    /// Open the PCM stream at `sample_rate`.
    fn open(&mut self, sample_rate: u32) -> Result<Box<dyn Read + Send>, CaptureError>;

    /// Whether chunks must be paced to real time (recordings).
    fn realtime_pacing(&self) -> bool {
        false
    }

    fn close(&mut self, _grace: Duration) {}
}

/// Recording tool spawned as a child process writing raw PCM to stdout.
pub struct CommandMicrophone {
    program: String,
    extra_args: Vec<String>,
    process: Option<StreamProcess>,
}

impl CommandMicrophone {
    pub fn new(program: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            extra_args,
            process: None,
        }
    }

    /// ALSA `arecord` on the default capture device.
    pub fn arecord() -> Self {
        Self::new("arecord", Vec::new())
    }
}

/// Arguments for raw mono S16_LE capture on stdout.
pub fn arecord_args(sample_rate: u32) -> Vec<String> {
    vec![
        "-q".into(),
        "-t".into(),
        "raw".into(),
        "-f".into(),
        "S16_LE".into(),
        "-r".into(),
        sample_rate.to_string(),
        "-c".into(),
        "1".into(),
    ]
}

impl AudioSource for CommandMicrophone {
    fn name(&self) -> &str {
        &self.program
    }

    fn open(&mut self, sample_rate: u32) -> Result<Box<dyn Read + Send>, CaptureError> {
        if self.process.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        let mut args = arecord_args(sample_rate);
        args.extend(self.extra_args.iter().cloned());
        let (process, stdout) = StreamProcess::spawn(&self.program, &args)?;
        self.process = Some(process);
        Ok(Box::new(stdout))
    }

    fn close(&mut self, grace: Duration) {
        if let Some(mut process) = self.process.take() {
            process.terminate(grace);
        }
    }
}

/// Raw PCM recording replayed at real time.
pub struct PcmFileMicrophone {
    path: PathBuf,
    label: String,
}

impl PcmFileMicrophone {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            path,
        }
    }
}

impl AudioSource for PcmFileMicrophone {
    fn name(&self) -> &str {
        &self.label
    }

    fn open(&mut self, _sample_rate: u32) -> Result<Box<dyn Read + Send>, CaptureError> {
        let file = File::open(&self.path)
            .map_err(|e| CaptureError::DeviceUnavailable(format!("{}: {e}", self.label)))?;
        Ok(Box::new(file))
    }

    fn realtime_pacing(&self) -> bool {
        true
    }
}

/// Microphone stream parameters.
#[derive(Debug, Clone, Copy)]
pub struct AudioSettings {
    pub sample_rate: u32,
    /// Samples per chunk
    pub chunk_size: usize,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: crate::core::audio::DEFAULT_SAMPLE_RATE,
            chunk_size: crate::core::audio::DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Running microphone capture.
pub struct AudioCapture {
    source: Option<Box<dyn AudioSource>>,
    settings: AudioSettings,
    signal: Arc<Mutex<AudioSignal>>,
    status: SharedMailbox<AudioStatus>,
    chunks: SharedMailbox<AudioChunk>,
    worker: Option<Worker>,
}

impl AudioCapture {
    /// Open `source` and start the reader thread.
    ///
    /// A source that cannot be opened is logged and yields a capture whose
    /// status is always idle.
    pub fn start(
        mut source: Box<dyn AudioSource>,
        settings: AudioSettings,
        thresholds: AudioThresholds,
    ) -> Self {
        let mut capture = Self::disabled(settings, thresholds);

        let reader = match source.open(settings.sample_rate) {
            Ok(reader) => reader,
            Err(e) => {
                tracing::warn!("Microphone unavailable, continuing without audio: {}", e);
                return capture;
            }
        };

        let pace = source.realtime_pacing().then(|| {
            Duration::from_secs_f64(settings.chunk_size as f64 / settings.sample_rate.max(1) as f64)
        });
        let signal = capture.signal.clone();
        let status = capture.status.clone();
        let chunks = capture.chunks.clone();
        let worker = Worker::spawn("audio-reader", move |running| {
            pump_chunks(reader, settings, &signal, &status, &chunks, &running, pace);
            status.clear();
        });

        match worker {
            Ok(worker) => {
                tracing::info!(
                    "Audio capture started ({}, {} Hz, {} samples/chunk)",
                    source.name(),
                    settings.sample_rate,
                    settings.chunk_size
                );
                capture.source = Some(source);
                capture.worker = Some(worker);
            }
            Err(e) => {
                tracing::warn!("Could not start audio thread: {}", e);
                source.close(Duration::ZERO);
            }
        }
        capture
    }

    /// Capture with no device behind it.
    pub fn disabled(settings: AudioSettings, thresholds: AudioThresholds) -> Self {
        Self {
            source: None,
            settings,
            signal: Arc::new(Mutex::new(AudioSignal::new(thresholds, settings.sample_rate))),
            status: shared_mailbox(),
            chunks: shared_mailbox(),
            worker: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.worker.as_ref().map(Worker::is_running).unwrap_or(false)
    }

    /// Latest status, or the idle status when nothing has been processed
    /// (or the stream has ended).
    pub fn status(&self) -> AudioStatus {
        self.status.latest().unwrap_or_else(|| {
            AudioStatus::idle(self.settings.chunk_size, self.thresholds().silence)
        })
    }

    /// Latest raw chunk newer than sequence `seen`.
    pub fn newer_chunk(&self, seen: u64) -> Option<(u64, AudioChunk)> {
        self.chunks.newer_than(seen)
    }

    /// Shared handle to the raw chunk mailbox.
    pub fn chunks(&self) -> SharedMailbox<AudioChunk> {
        self.chunks.clone()
    }

    pub fn thresholds(&self) -> AudioThresholds {
        lock_signal(&self.signal).thresholds()
    }

    /// Replace the thresholds used for subsequent chunks.
    pub fn set_thresholds(&self, thresholds: AudioThresholds) {
        lock_signal(&self.signal).set_thresholds(thresholds);
    }

    pub fn settings(&self) -> AudioSettings {
        self.settings
    }

    /// Stop the reader (bounded by `join_timeout`) and release the device.
    pub fn stop(&mut self, join_timeout: Duration, grace: Duration) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop(join_timeout);
        }
        if let Some(mut source) = self.source.take() {
            source.close(grace);
            tracing::info!("Audio capture stopped ({})", source.name());
        }
        self.status.clear();
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop(Duration::from_millis(200), Duration::from_millis(500));
    }
}

fn lock_signal(signal: &Mutex<AudioSignal>) -> std::sync::MutexGuard<'_, AudioSignal> {
    signal.lock().unwrap_or_else(|e| e.into_inner())
}

/// Read whole chunks until EOF, error, or `running` turns false. Returns the
/// number of chunks processed.
pub(crate) fn pump_chunks<R: Read>(
    mut reader: R,
    settings: AudioSettings,
    signal: &Mutex<AudioSignal>,
    status: &SharedMailbox<AudioStatus>,
    chunks: &SharedMailbox<AudioChunk>,
    running: &AtomicBool,
    pace: Option<Duration>,
) -> u64 {
    let mut buf = vec![0u8; settings.chunk_size.max(1) * 2];
    let mut processed = 0u64;

    while running.load(Ordering::SeqCst) {
        if let Err(e) = reader.read_exact(&mut buf) {
            match e.kind() {
                ErrorKind::UnexpectedEof => {
                    tracing::info!("Audio stream ended after {} chunks", processed)
                }
                _ if running.load(Ordering::SeqCst) => tracing::warn!("Audio read error: {}", e),
                _ => {}
            }
            break;
        }

        processed += 1;
        let chunk = AudioChunk::from_le_bytes(&buf, settings.sample_rate, processed);
        let next = lock_signal(signal).process(&chunk.samples);
        status.publish(next);
        chunks.publish(chunk);

        if let Some(interval) = pace {
            thread::sleep(interval);
        }
    }

    processed
}
