//! Baseline calibration of the motion, silence and snore thresholds.
//!
//! For a fixed period the subject is expected to lie still in a quiet room.
//! Each threshold is set to the mean of the observed baseline plus a
//! multiple of its standard deviation:
//!
//! | threshold | samples              | multiplier |
//! |-----------|----------------------|------------|
//! | motion    | changed-pixel counts | 3σ         |
//! | silence   | chunk volume         | 2σ         |
//! | snore     | snore band power     | 5σ         |
//!
//! The snore multiplier is the most conservative since a false snore can
//! start a sleep session on its own.

use crate::capture::mailbox::SharedMailbox;
use crate::capture::types::{AudioChunk, Frame};
use crate::core::audio::measure_chunk;
use crate::core::imaging::{changed_pixels, prepare};
use crate::shutdown::ShutdownToken;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const MOTION_SIGMA: f64 = 3.0;
pub const SILENCE_SIGMA: f64 = 2.0;
pub const SNORE_SIGMA: f64 = 5.0;

/// Default sampling period per modality.
pub const DEFAULT_CALIBRATION_SECS: u64 = 10;

/// Thresholds derived by calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub motion_threshold: f64,
    pub silence_threshold: f64,
    pub snore_threshold: f64,
}

/// Collected baseline samples for one quantity.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    samples: Vec<f64>,
}

impl Baseline {
    pub fn push(&mut self, value: f64) {
        self.samples.push(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `mean + sigmas * population_std_dev`, or `None` without samples.
    pub fn threshold(&self, sigmas: f64) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        let mean = self.samples.iter().mean();
        let std_dev = self.samples.iter().population_std_dev();
        Some(mean + std_dev * sigmas)
    }
}

/// Motion baseline built from consecutive frames.
#[derive(Debug, Default)]
pub struct MotionBaseline {
    previous: Option<GrayImage>,
    levels: Baseline,
}

impl MotionBaseline {
    pub fn observe(&mut self, frame: &Frame) {
        let current = prepare(&frame.image);
        if let Some(level) = self
            .previous
            .as_ref()
            .and_then(|previous| changed_pixels(previous, &current))
        {
            self.levels.push(level as f64);
        }
        self.previous = Some(current);
    }

    pub fn samples(&self) -> usize {
        self.levels.len()
    }

    pub fn threshold(&self) -> Option<f64> {
        self.levels.threshold(MOTION_SIGMA)
    }
}

/// Volume and snore-band baseline built from audio chunks.
#[derive(Debug, Default)]
pub struct AudioBaseline {
    volume: Baseline,
    snore_power: Baseline,
}

impl AudioBaseline {
    pub fn observe(&mut self, samples: &[i16], sample_rate: u32) {
        let levels = measure_chunk(samples, sample_rate);
        self.volume.push(levels.volume);
        self.snore_power.push(levels.snore_power);
    }

    pub fn samples(&self) -> usize {
        self.volume.len()
    }

    /// `(silence, snore)` thresholds.
    pub fn thresholds(&self) -> Option<(f64, f64)> {
        Some((
            self.volume.threshold(SILENCE_SIGMA)?,
            self.snore_power.threshold(SNORE_SIGMA)?,
        ))
    }
}

/// Runs the blocking baseline measurement on the calling thread.
#[derive(Debug, Clone)]
pub struct Calibrator {
    duration: Duration,
    poll_interval: Duration,
}

impl Calibrator {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            poll_interval: Duration::from_millis(100),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Call `poll` every poll interval until the duration elapses or shutdown is requested.
    fn sample_for<F: FnMut()>(&self, shutdown: &ShutdownToken, mut poll: F) {
        let deadline = Instant::now() + self.duration;
        while Instant::now() < deadline && !shutdown.is_requested() {
            poll();
            thread::sleep(self.poll_interval);
        }
    }

    /// Sample frame-difference motion from published frames. Frames already
    /// seen are skipped.
    pub fn calibrate_motion(
        &self,
        frames: &SharedMailbox<Arc<Frame>>,
        shutdown: &ShutdownToken,
    ) -> MotionBaseline {
        let mut baseline = MotionBaseline::default();
        let mut seen = frames.sequence();
        self.sample_for(shutdown, || {
            if let Some((sequence, frame)) = frames.newer_than(seen) {
                seen = sequence;
                baseline.observe(&frame);
            }
        });
        baseline
    }

    /// Sample volume and snore power from published audio chunks.
    pub fn calibrate_audio(
        &self,
        chunks: &SharedMailbox<AudioChunk>,
        shutdown: &ShutdownToken,
    ) -> AudioBaseline {
        let mut baseline = AudioBaseline::default();
        let mut seen = chunks.sequence();
        self.sample_for(shutdown, || {
            if let Some((sequence, chunk)) = chunks.newer_than(seen) {
                seen = sequence;
                baseline.observe(&chunk.samples, chunk.sample_rate);
            }
        });
        baseline
    }

    /// Combine the baselines with the current thresholds. Any modality
    /// without samples keeps its current value.
    pub fn resolve(
        current: CalibrationResult,
        motion: Option<&MotionBaseline>,
        audio: Option<&AudioBaseline>,
    ) -> CalibrationResult {
        let mut result = current;

        match motion.and_then(MotionBaseline::threshold) {
            Some(threshold) => result.motion_threshold = threshold,
            None => tracing::warn!(
                "No frames collected during calibration, keeping motion threshold {:.0}",
                current.motion_threshold
            ),
        }

        match audio.and_then(AudioBaseline::thresholds) {
            Some((silence, snore)) => {
                result.silence_threshold = silence;
                result.snore_threshold = snore;
            }
            None => tracing::warn!(
                "No audio collected during calibration, keeping silence {:.0} / snore {:.0}",
                current.silence_threshold,
                current.snore_threshold
            ),
        }

        result
    }
}

impl Default for Calibrator {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CALIBRATION_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::mailbox::shared_mailbox;
    use image::{DynamicImage, Luma};

    fn defaults() -> CalibrationResult {
        CalibrationResult {
            motion_threshold: 50_000.0,
            silence_threshold: 300.0,
            snore_threshold: 5000.0,
        }
    }

    fn frame(value: u8, sequence: u64) -> Arc<Frame> {
        Arc::new(Frame::new(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(20, 10, Luma([value]))),
            sequence,
        ))
    }

    #[test]
    fn test_baseline_threshold() {
        let mut baseline = Baseline::default();
        assert_eq!(baseline.threshold(3.0), None);
        for v in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            baseline.push(v);
        }
        // mean 5, population std 2
        assert!((baseline.threshold(3.0).unwrap() - 11.0).abs() < 1e-9);
        assert!((baseline.threshold(0.0).unwrap() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_motion_baseline_from_frames() {
        let mut baseline = MotionBaseline::default();
        baseline.observe(&frame(0, 1));
        assert_eq!(baseline.samples(), 0);
        baseline.observe(&frame(0, 2));
        baseline.observe(&frame(255, 3));
        // Levels 0 and 200: mean 100, std 100.
        assert_eq!(baseline.samples(), 2);
        assert!((baseline.threshold().unwrap() - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_audio_baseline_multipliers() {
        let mut baseline = AudioBaseline::default();
        baseline.observe(&[100; 64], 44_100);
        baseline.observe(&[300; 64], 44_100);
        let (silence, _snore) = baseline.thresholds().unwrap();
        // Volumes 100 and 300: mean 200, std 100.
        assert!((silence - 400.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_keeps_defaults_without_samples() {
        let result = Calibrator::resolve(defaults(), None, Some(&AudioBaseline::default()));
        assert_eq!(result, defaults());
    }

    #[test]
    fn test_resolve_applies_motion_only() {
        let mut motion = MotionBaseline::default();
        motion.observe(&frame(0, 1));
        motion.observe(&frame(0, 2));
        let result = Calibrator::resolve(defaults(), Some(&motion), None);
        assert_eq!(result.motion_threshold, 0.0);
        assert_eq!(result.silence_threshold, 300.0);
        assert_eq!(result.snore_threshold, 5000.0);
    }

    #[test]
    fn test_calibrate_motion_polls_new_frames_only() {
        let frames = shared_mailbox();
        frames.publish(frame(0, 1));

        let publisher = {
            let frames = frames.clone();
            thread::spawn(move || {
                for i in 2..6 {
                    thread::sleep(Duration::from_millis(30));
                    frames.publish(frame(0, i));
                }
            })
        };

        let calibrator =
            Calibrator::new(Duration::from_millis(400)).with_poll_interval(Duration::from_millis(5));
        let baseline = calibrator.calibrate_motion(&frames, &ShutdownToken::new());
        publisher.join().unwrap();

        // The frame published before calibration started is stale and skipped;
        // four fresh frames give three differences.
        assert_eq!(baseline.samples(), 3);
        assert_eq!(baseline.threshold(), Some(0.0));
    }

    #[test]
    fn test_calibration_stops_on_shutdown() {
        let chunks: SharedMailbox<AudioChunk> = shared_mailbox();
        let shutdown = ShutdownToken::new();
        shutdown.request();
        let started = Instant::now();
        let baseline = Calibrator::new(Duration::from_secs(10)).calibrate_audio(&chunks, &shutdown);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(baseline.samples(), 0);
    }
}
