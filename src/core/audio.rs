//! Audio signal processing: volume, snore band power, breathing regularity.

use crate::core::history::{History, BREATHING_HISTORY_SIZE, VOLUME_HISTORY_SIZE};
use crate::core::spectrum::Spectrum;
use serde::{Deserialize, Serialize};

/// Default capture rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Default chunk length in samples.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Snoring energy band (Hz).
pub const SNORE_BAND_HZ: (f64, f64) = (100.0, 500.0);

/// Low-frequency band tracked for breathing (Hz).
pub const BREATHING_BAND_HZ: (f64, f64) = (10.0, 50.0);

/// Breathing samples required before regularity is evaluated.
pub const MIN_BREATHING_SAMPLES: usize = 10;

/// Open interval of coefficient of variation accepted as regular breathing.
pub const BREATHING_CV_RANGE: (f64, f64) = (0.1, 0.8);

/// Thresholds applied by [`AudioSignal`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioThresholds {
    /// Smoothed volume below this is silence
    pub silence: f64,
    /// Snore band power above this is a snore
    pub snore: f64,
    /// Mean breathing band power must exceed this
    pub breathing: f64,
}

impl Default for AudioThresholds {
    fn default() -> Self {
        Self {
            silence: 300.0,
            snore: 5000.0,
            breathing: 1000.0,
        }
    }
}

/// Audio-derived signals for the latest chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStatus {
    pub silent: bool,
    pub snore_detected: bool,
    pub breathing_detected: bool,
    /// Mean absolute amplitude of the latest chunk
    pub volume: f64,
    /// Latest chunk's samples
    pub waveform: Vec<i16>,
    /// Silence threshold in effect
    pub threshold: f64,
}

impl AudioStatus {
    /// Status reported when no audio is available: silent, nothing detected.
    pub fn idle(chunk_size: usize, silence_threshold: f64) -> Self {
        Self {
            silent: true,
            snore_detected: false,
            breathing_detected: false,
            volume: 0.0,
            waveform: vec![0; chunk_size],
            threshold: silence_threshold,
        }
    }
}

impl Default for AudioStatus {
    fn default() -> Self {
        Self::idle(DEFAULT_CHUNK_SIZE, AudioThresholds::default().silence)
    }
}

/// Per-chunk measurements before thresholding. Also used for calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkLevels {
    pub volume: f64,
    pub snore_power: f64,
    pub breathing_power: f64,
}

/// Measure one chunk.
pub fn measure_chunk(samples: &[i16], sample_rate: u32) -> ChunkLevels {
    let volume = if samples.is_empty() {
        0.0
    } else {
        samples.iter().map(|&s| (s as f64).abs()).sum::<f64>() / samples.len() as f64
    };
    let spectrum = Spectrum::of_samples(samples, sample_rate);
    ChunkLevels {
        volume,
        snore_power: spectrum.band_power(SNORE_BAND_HZ.0, SNORE_BAND_HZ.1),
        breathing_power: spectrum.band_power(BREATHING_BAND_HZ.0, BREATHING_BAND_HZ.1),
    }
}

/// Stateful audio detector.
#[derive(Debug, Clone)]
pub struct AudioSignal {
    thresholds: AudioThresholds,
    sample_rate: u32,
    volume_history: History,
    breathing_history: History,
}

impl AudioSignal {
    pub fn new(thresholds: AudioThresholds, sample_rate: u32) -> Self {
        Self {
            thresholds,
            sample_rate,
            volume_history: History::new(VOLUME_HISTORY_SIZE),
            breathing_history: History::new(BREATHING_HISTORY_SIZE),
        }
    }

    /// Process one chunk and return the resulting status.
    pub fn process(&mut self, samples: &[i16]) -> AudioStatus {
        let levels = measure_chunk(samples, self.sample_rate);

        self.volume_history.push(levels.volume);
        let silent = self.volume_history.mean() < self.thresholds.silence;

        let snore_detected = levels.snore_power > self.thresholds.snore;

        self.breathing_history.push(levels.breathing_power);
        let breathing_detected = self.breathing_regular();

        AudioStatus {
            silent,
            snore_detected,
            breathing_detected,
            volume: levels.volume,
            waveform: samples.to_vec(),
            threshold: self.thresholds.silence,
        }
    }

    /// Regular breathing: enough history, mean above threshold, and a
    /// coefficient of variation that is neither flat nor chaotic.
    fn breathing_regular(&self) -> bool {
        if self.breathing_history.len() < MIN_BREATHING_SAMPLES {
            return false;
        }
        let mean = self.breathing_history.mean();
        if mean <= 0.0 {
            return false;
        }
        let cv = self.breathing_history.std_dev() / mean;
        cv > BREATHING_CV_RANGE.0 && cv < BREATHING_CV_RANGE.1 && mean > self.thresholds.breathing
    }

    pub fn thresholds(&self) -> AudioThresholds {
        self.thresholds
    }

    pub fn set_thresholds(&mut self, thresholds: AudioThresholds) {
        self.thresholds = thresholds;
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Default for AudioSignal {
    fn default() -> Self {
        Self::new(AudioThresholds::default(), DEFAULT_SAMPLE_RATE)
    }
}
