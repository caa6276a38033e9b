//! Configuration for sleep-sentinel.

use crate::core::audio::{AudioThresholds, DEFAULT_CHUNK_SIZE, DEFAULT_SAMPLE_RATE};
use crate::core::calibration::{CalibrationResult, DEFAULT_CALIBRATION_SECS};
use crate::core::detect::Rect;
use crate::core::sleep::SleepTimings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration for the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the session log, status record and PID file
    pub data_path: PathBuf,

    pub camera: CameraConfig,

    pub audio: AudioConfig,

    pub detector: DetectorConfig,

    /// Detection thresholds, replaced by calibration at startup
    pub thresholds: ThresholdConfig,

    pub timings: TimingConfig,

    /// Sampling period for each calibrated modality
    #[serde(with = "duration_serde")]
    pub calibration_duration: Duration,

    /// Whether `start` calibrates before monitoring
    pub calibrate_on_start: bool,

    /// Sleep between polls when no new frame is ready (in milliseconds)
    pub tick_interval_ms: u64,

    /// How often the status record is rewritten
    #[serde(with = "duration_serde")]
    pub status_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sleep-sentinel");

        Self {
            data_path: data_dir,
            camera: CameraConfig::default(),
            audio: AudioConfig::default(),
            detector: DetectorConfig::default(),
            thresholds: ThresholdConfig::default(),
            timings: TimingConfig::default(),
            calibration_duration: Duration::from_secs(DEFAULT_CALIBRATION_SECS),
            calibrate_on_start: true,
            tick_interval_ms: 33, // ~30 Hz
            status_interval: Duration::from_secs(1),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sleep-sentinel")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values the monitor cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".into()));
        }
        if self.audio.sample_rate == 0 || self.audio.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "audio sample_rate and chunk_size must be > 0".into(),
            ));
        }
        if self.camera.framerate == 0 {
            return Err(ConfigError::Invalid("camera framerate must be > 0".into()));
        }
        if self.timings.snore_count == 0 {
            return Err(ConfigError::Invalid("timings.snore_count must be > 0".into()));
        }
        Ok(())
    }

    pub fn session_log_path(&self) -> PathBuf {
        self.data_path.join("sleep_records.csv")
    }

    pub fn status_path(&self) -> PathBuf {
        self.data_path.join("status.json")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.data_path.join("sleep-sentinel.pid")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackend {
    /// Capture tool writing MJPEG to stdout
    Command,
    /// Recorded MJPEG file
    File,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub backend: CameraBackend,
    pub program: String,
    /// Full argument list; when absent the standard libcamera arguments are built
    pub args: Option<Vec<String>>,
    pub file: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Bytes requested per read
    pub chunk_bytes: usize,
    /// Demuxer buffer limit before the stream is considered desynchronized
    pub max_buffer_bytes: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::Command,
            program: "libcamera-vid".to_string(),
            args: None,
            file: None,
            width: 640,
            height: 480,
            framerate: 15,
            chunk_bytes: 32 * 1024,
            max_buffer_bytes: crate::capture::demux::DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

/// Where audio comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioBackend {
    /// Recording tool writing raw S16LE mono to stdout
    Command,
    /// Raw PCM recording
    File,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub backend: AudioBackend,
    pub program: String,
    /// Appended after the format arguments (e.g. `-D plughw:1,0`)
    pub extra_args: Vec<String>,
    pub file: Option<PathBuf>,
    pub sample_rate: u32,
    /// Samples per chunk
    pub chunk_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            backend: AudioBackend::Command,
            program: "arecord".to_string(),
            extra_args: Vec::new(),
            file: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Face/eye detector selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    /// Never detects; no face means no sleep is ever recorded
    None,
    /// Fixed regions for a camera aimed at the pillow
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub kind: DetectorKind,
    /// Face regions; empty means the whole frame
    pub face_regions: Vec<Rect>,
    /// Eye regions relative to each face; empty means eyes are never found
    pub eye_regions: Vec<Rect>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Static,
            face_regions: Vec::new(),
            eye_regions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub motion: f64,
    pub silence: f64,
    pub snore: f64,
    pub breathing: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        let audio = AudioThresholds::default();
        Self {
            motion: crate::core::motion::DEFAULT_MOTION_THRESHOLD,
            silence: audio.silence,
            snore: audio.snore,
            breathing: audio.breathing,
        }
    }
}

impl ThresholdConfig {
    pub fn audio(&self) -> AudioThresholds {
        AudioThresholds {
            silence: self.silence,
            snore: self.snore,
            breathing: self.breathing,
        }
    }

    pub fn calibration(&self) -> CalibrationResult {
        CalibrationResult {
            motion_threshold: self.motion,
            silence_threshold: self.silence,
            snore_threshold: self.snore,
        }
    }

    /// Take over calibrated values. Breathing is not calibrated.
    pub fn apply(&mut self, result: &CalibrationResult) {
        self.motion = result.motion_threshold;
        self.silence = result.silence_threshold;
        self.snore = result.snore_threshold;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    #[serde(with = "duration_serde")]
    pub sleep_threshold: Duration,
    #[serde(with = "duration_serde")]
    pub wake_grace: Duration,
    #[serde(with = "duration_serde")]
    pub snore_window: Duration,
    pub snore_count: usize,
    #[serde(with = "duration_serde")]
    pub rollover_grace: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            sleep_threshold: Duration::from_secs(300), // 5 minutes
            wake_grace: Duration::from_secs(30),
            snore_window: Duration::from_secs(60),
            snore_count: 3,
            rollover_grace: Duration::from_secs(5),
        }
    }
}

impl TimingConfig {
    pub fn sleep_timings(&self) -> SleepTimings {
        SleepTimings {
            sleep_threshold: to_chrono(self.sleep_threshold),
            wake_grace: to_chrono(self.wake_grace),
            snore_window: to_chrono(self.snore_window),
            snore_count: self.snore_count,
        }
    }

    pub fn rollover(&self) -> chrono::Duration {
        to_chrono(self.rollover_grace)
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.calibration_duration, Duration::from_secs(10));
        assert_eq!(config.tick_interval(), Duration::from_millis(33));
        assert_eq!(config.thresholds.motion, 50_000.0);
        assert_eq!(config.thresholds.silence, 300.0);
        assert_eq!(config.thresholds.snore, 5000.0);
        assert_eq!(config.thresholds.breathing, 1000.0);
        assert_eq!(config.camera.backend, CameraBackend::Command);
        assert_eq!(config.audio.sample_rate, 44_100);
        assert!(config.session_log_path().ends_with("sleep_records.csv"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let json = r#"{
            "thresholds": { "motion": 1234.0 },
            "timings": { "sleep_threshold": 120 },
            "camera": { "backend": "file", "file": "/tmp/night.mjpeg" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.thresholds.motion, 1234.0);
        assert_eq!(config.thresholds.snore, 5000.0);
        assert_eq!(config.timings.sleep_threshold, Duration::from_secs(120));
        assert_eq!(config.timings.wake_grace, Duration::from_secs(30));
        assert_eq!(config.camera.backend, CameraBackend::File);
        assert_eq!(config.camera.framerate, 15);
    }

    #[test]
    fn test_sleep_timings_conversion() {
        let timings = TimingConfig::default().sleep_timings();
        assert_eq!(timings.sleep_threshold, chrono::Duration::seconds(300));
        assert_eq!(timings.wake_grace, chrono::Duration::seconds(30));
        assert_eq!(timings.snore_window, chrono::Duration::seconds(60));
        assert_eq!(timings.snore_count, 3);
        assert_eq!(TimingConfig::default().rollover(), chrono::Duration::seconds(5));
    }

    #[test]
    fn test_apply_calibration_keeps_breathing() {
        let mut thresholds = ThresholdConfig::default();
        thresholds.apply(&CalibrationResult {
            motion_threshold: 10.0,
            silence_threshold: 20.0,
            snore_threshold: 30.0,
        });
        assert_eq!(thresholds.calibration().motion_threshold, 10.0);
        assert_eq!(thresholds.audio().silence, 20.0);
        assert_eq!(thresholds.audio().snore, 30.0);
        assert_eq!(thresholds.breathing, 1000.0);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("sleep-sentinel-config-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        let mut config = Config::default();
        config.thresholds.motion = 777.0;
        config.detector.face_regions = vec![Rect::new(10, 20, 100, 120)];
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config: Config = serde_json::from_str(r#"{ "tick_interval_ms": 0 }"#).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
