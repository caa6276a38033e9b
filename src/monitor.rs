//! The fusion loop: wires capture, signal processing, the state machine and
//! persistence together, and owns the startup and shutdown sequence.

use crate::capture::{
    AudioCapture, AudioSettings, AudioSource, CameraCapture, CommandCamera, CommandMicrophone,
    Frame, FrameSource, MjpegFileCamera, PcmFileMicrophone, ReaderSettings,
};
use crate::config::{
    AudioBackend, AudioConfig, CameraBackend, CameraConfig, Config, ConfigError, DetectorConfig,
    DetectorKind,
};
use crate::core::audio::AudioStatus;
use crate::core::calibration::{CalibrationResult, Calibrator};
use crate::core::detect::{Detector, NoopDetector, StaticRegionDetector};
use crate::core::motion::MotionSignal;
use crate::core::sleep::{SleepEvent, SleepSession, SleepStateMachine};
use crate::core::vision::{CameraMonitor, CameraStatus};
use crate::record::{CsvSessionLog, PidFile, RecorderError, SessionRecorder, StatusFile, StatusReport};
use crate::shutdown::ShutdownToken;
use chrono::{DateTime, Local};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Bounded join for the reader threads on shutdown.
pub const READER_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Time a capture subprocess gets to exit before it is killed.
pub const DEVICE_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Errors that prevent the monitor from starting.
#[derive(Debug)]
pub enum MonitorError {
    Config(ConfigError),
    Recorder(RecorderError),
    Io(std::io::Error),
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::Config(e) => write!(f, "Configuration error: {}", e),
            MonitorError::Recorder(e) => write!(f, "Session log error: {}", e),
            MonitorError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for MonitorError {}

impl From<ConfigError> for MonitorError {
    fn from(e: ConfigError) -> Self {
        MonitorError::Config(e)
    }
}

impl From<RecorderError> for MonitorError {
    fn from(e: RecorderError) -> Self {
        MonitorError::Recorder(e)
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(e: std::io::Error) -> Self {
        MonitorError::Io(e)
    }
}

/// Build the configured camera backend.
pub fn build_frame_source(config: &CameraConfig) -> Option<Box<dyn FrameSource>> {
    match config.backend {
        CameraBackend::Disabled => None,
        CameraBackend::Command => {
            let args = config.args.clone().unwrap_or_else(|| {
                crate::capture::camera::libcamera_args(config.width, config.height, config.framerate)
            });
            Some(Box::new(CommandCamera::new(config.program.clone(), args)))
        }
        CameraBackend::File => match &config.file {
            Some(path) => Some(Box::new(MjpegFileCamera::new(path, config.framerate))),
            None => {
                tracing::warn!("Camera backend is \"file\" but no file is configured");
                None
            }
        },
    }
}

/// Build the configured microphone backend.
pub fn build_audio_source(config: &AudioConfig) -> Option<Box<dyn AudioSource>> {
    match config.backend {
        AudioBackend::Disabled => None,
        AudioBackend::Command => Some(Box::new(CommandMicrophone::new(
            config.program.clone(),
            config.extra_args.clone(),
        ))),
        AudioBackend::File => match &config.file {
            Some(path) => Some(Box::new(PcmFileMicrophone::new(path))),
            None => {
                tracing::warn!("Audio backend is \"file\" but no file is configured");
                None
            }
        },
    }
}

/// Build the face and eye detectors.
pub fn build_detectors(config: &DetectorConfig) -> (Box<dyn Detector>, Box<dyn Detector>) {
    match config.kind {
        DetectorKind::None => (Box::new(NoopDetector), Box::new(NoopDetector)),
        DetectorKind::Static => {
            let eyes: Box<dyn Detector> = if config.eye_regions.is_empty() {
                Box::new(NoopDetector)
            } else {
                Box::new(StaticRegionDetector::new(config.eye_regions.clone()))
            };
            (
                Box::new(StaticRegionDetector::new(config.face_regions.clone())),
                eyes,
            )
        }
    }
}

/// Result of one fusion tick.
#[derive(Debug, Clone)]
pub struct Tick {
    pub camera: CameraStatus,
    pub audio: AudioStatus,
    pub event: Option<SleepEvent>,
}

/// What a run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub instance_id: Uuid,
    pub started_at: DateTime<Local>,
    pub ended_at: DateTime<Local>,
    pub ticks: u64,
    pub calibration: Option<CalibrationResult>,
    /// Sessions completed during this run, including one closed on shutdown
    pub sessions: Vec<SleepSession>,
    pub total_sleep_seconds: f64,
}

/// Live monitor state.
pub struct Monitor {
    config: Config,
    camera: CameraCapture,
    audio: AudioCapture,
    vision: CameraMonitor,
    machine: SleepStateMachine,
    recorder: Box<dyn SessionRecorder>,
    status_file: Option<StatusFile>,
    instance_id: Uuid,
    started_at: DateTime<Local>,
    seen_frame: u64,
    ticks: u64,
    sessions: Vec<SleepSession>,
    calibration: Option<CalibrationResult>,
    camera_loss_logged: bool,
    status_error_logged: bool,
}

impl Monitor {
    /// Assemble a monitor around already started captures.
    pub fn new(
        config: Config,
        camera: CameraCapture,
        audio: AudioCapture,
        recorder: Box<dyn SessionRecorder>,
    ) -> Self {
        let motion = MotionSignal::new(config.thresholds.motion, config.timings.rollover());
        let (faces, eyes) = build_detectors(&config.detector);
        let machine = SleepStateMachine::new(config.timings.sleep_timings());
        audio.set_thresholds(config.thresholds.audio());

        Self {
            vision: CameraMonitor::new(motion, faces, eyes),
            machine,
            camera,
            audio,
            recorder,
            status_file: None,
            instance_id: Uuid::new_v4(),
            started_at: Local::now(),
            seen_frame: 0,
            ticks: 0,
            sessions: Vec::new(),
            calibration: None,
            camera_loss_logged: false,
            status_error_logged: false,
            config,
        }
    }

    /// Start the configured devices. Missing devices degrade, they do not fail.
    pub fn from_config(config: Config, recorder: Box<dyn SessionRecorder>) -> Self {
        let camera = match build_frame_source(&config.camera) {
            Some(source) => CameraCapture::start(
                source,
                ReaderSettings {
                    chunk_bytes: config.camera.chunk_bytes,
                    max_buffer_bytes: config.camera.max_buffer_bytes,
                },
            ),
            None => {
                tracing::warn!("Camera disabled, no sleep can be detected without a face");
                CameraCapture::disabled()
            }
        };

        let settings = AudioSettings {
            sample_rate: config.audio.sample_rate,
            chunk_size: config.audio.chunk_size,
        };
        let audio = match build_audio_source(&config.audio) {
            Some(source) => AudioCapture::start(source, settings, config.thresholds.audio()),
            None => {
                tracing::info!("Audio disabled, running on camera signals only");
                AudioCapture::disabled(settings, config.thresholds.audio())
            }
        };

        Self::new(config, camera, audio, recorder)
    }

    pub fn with_status_file(mut self, status_file: StatusFile) -> Self {
        self.status_file = Some(status_file);
        self
    }

    /// Measure baselines from the live devices and adopt the result.
    pub fn calibrate(&mut self, calibrator: &Calibrator, shutdown: &ShutdownToken) -> CalibrationResult {
        tracing::info!(
            "Calibrating for {}s per modality, keep still and quiet",
            calibrator.duration().as_secs()
        );

        let motion = if self.camera.is_available() {
            Some(calibrator.calibrate_motion(&self.camera.frames(), shutdown))
        } else {
            None
        };
        let audio = if self.audio.is_available() {
            Some(calibrator.calibrate_audio(&self.audio.chunks(), shutdown))
        } else {
            None
        };

        let result = Calibrator::resolve(
            self.config.thresholds.calibration(),
            motion.as_ref(),
            audio.as_ref(),
        );
        tracing::info!(
            "Calibration complete: motion {:.0} ({} samples), silence {:.0}, snore {:.0} ({} chunks)",
            result.motion_threshold,
            motion.as_ref().map(|m| m.samples()).unwrap_or(0),
            result.silence_threshold,
            result.snore_threshold,
            audio.as_ref().map(|a| a.samples()).unwrap_or(0),
        );

        self.apply_thresholds(&result);
        self.calibration = Some(result);
        result
    }

    /// Replace the motion, silence and snore thresholds.
    pub fn apply_thresholds(&mut self, result: &CalibrationResult) {
        self.config.thresholds.apply(result);
        self.vision.set_motion_threshold(result.motion_threshold);
        self.audio.set_thresholds(self.config.thresholds.audio());
    }

    /// Tick if a new frame is ready. Once the camera has stopped producing,
    /// ticks run without a face so that an open session can close.
    pub fn step(&mut self, now: DateTime<Local>) -> Option<Tick> {
        match self.camera.newer_frame(self.seen_frame) {
            Some((sequence, frame)) => {
                self.seen_frame = sequence;
                Some(self.process_frame(&frame, now))
            }
            None if !self.camera.is_available() => {
                if !self.camera_loss_logged {
                    tracing::warn!("No camera frames available, treating subject as absent");
                    self.camera_loss_logged = true;
                }
                Some(self.advance(CameraStatus::default(), now))
            }
            None => None,
        }
    }

    /// Run one tick on `frame`.
    pub fn process_frame(&mut self, frame: &Frame, now: DateTime<Local>) -> Tick {
        let camera = self.vision.process(frame, now);
        self.advance(camera, now)
    }

    fn advance(&mut self, camera: CameraStatus, now: DateTime<Local>) -> Tick {
        let audio = self.audio.status();
        let event = self
            .machine
            .tick(&camera, &audio, now, self.recorder.as_mut());
        if let Some(SleepEvent::WakeConfirmed(session)) = &event {
            self.sessions.push(session.clone());
        }
        self.ticks += 1;
        Tick {
            camera,
            audio,
            event,
        }
    }

    /// Tick until shutdown is requested, then finalize.
    pub fn run(mut self, shutdown: &ShutdownToken) -> RunSummary {
        let tick_interval = self.config.tick_interval();
        let status_interval = self.config.status_interval;
        let mut last_status = Instant::now();
        self.write_status(Local::now());

        while !shutdown.is_requested() {
            let now = Local::now();
            match self.step(now) {
                Some(tick) => {
                    if let Some(event) = &tick.event {
                        tracing::debug!("{:?}", event);
                    }
                }
                None => thread::sleep(tick_interval),
            }
            // Faceless ticks still need pacing.
            if !self.camera.is_available() {
                thread::sleep(tick_interval);
            }

            if last_status.elapsed() >= status_interval {
                self.write_status(now);
                last_status = Instant::now();
            }
        }

        self.finish(Local::now())
    }

    /// Close any open session, release the devices and write the final status.
    pub fn finish(mut self, now: DateTime<Local>) -> RunSummary {
        if let Some(session) = self.machine.shutdown(now, self.recorder.as_mut()) {
            self.sessions.push(session);
        }

        self.audio.stop(READER_JOIN_TIMEOUT, DEVICE_EXIT_GRACE);
        self.camera.stop(READER_JOIN_TIMEOUT, DEVICE_EXIT_GRACE);

        if let Some(status_file) = &self.status_file {
            let report = StatusReport::stopped(self.machine.total_sleep_seconds(), now);
            if let Err(e) = status_file.write(&report) {
                tracing::warn!("Could not write final status: {}", e);
            }
        }

        tracing::info!(
            "Monitor stopped after {} ticks, {} session(s)",
            self.ticks,
            self.sessions.len()
        );

        RunSummary {
            instance_id: self.instance_id,
            started_at: self.started_at,
            ended_at: now,
            ticks: self.ticks,
            calibration: self.calibration,
            sessions: std::mem::take(&mut self.sessions),
            total_sleep_seconds: self.machine.total_sleep_seconds(),
        }
    }

    fn write_status(&mut self, now: DateTime<Local>) {
        let Some(status_file) = &self.status_file else {
            return;
        };
        let report = StatusReport::running(
            self.instance_id,
            self.started_at,
            self.machine.is_sleeping(),
            self.machine.total_sleep_seconds(),
            now,
        );
        match status_file.write(&report) {
            Ok(()) => self.status_error_logged = false,
            Err(e) if !self.status_error_logged => {
                tracing::warn!("Could not write status to {}: {}", status_file.path().display(), e);
                self.status_error_logged = true;
            }
            Err(_) => {}
        }
        tracing::debug!(
            state = %self.machine.state(),
            snore_events = self.machine.snore_event_count(),
            ticks = self.ticks,
            "status"
        );
    }

    pub fn machine(&self) -> &SleepStateMachine {
        &self.machine
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn camera_available(&self) -> bool {
        self.camera.is_available()
    }

    pub fn audio_available(&self) -> bool {
        self.audio.is_available()
    }
}

/// Options for a full monitoring run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub calibrate: bool,
}

/// Full run: PID file, devices, calibration, fusion loop, shutdown.
pub fn run_monitor(
    config: Config,
    options: RunOptions,
    shutdown: &ShutdownToken,
) -> Result<RunSummary, MonitorError> {
    config.ensure_directories()?;
    let pid_file = PidFile::create(config.pid_path())?;
    let recorder = CsvSessionLog::open(config.session_log_path())?;
    let status_file = StatusFile::new(config.status_path());
    let calibrator = Calibrator::new(config.calibration_duration);

    let mut monitor = Monitor::from_config(config, Box::new(recorder)).with_status_file(status_file);
    if options.calibrate && !shutdown.is_requested() {
        monitor.calibrate(&calibrator, shutdown);
    }

    tracing::info!("Monitoring started (instance {})", monitor.instance_id());
    let summary = monitor.run(shutdown);
    pid_file.remove();
    Ok(summary)
}

/// Format seconds as `Hh Mm Ss`.
pub fn format_hms(total_seconds: f64) -> String {
    let secs = total_seconds.max(0.0) as u64;
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
