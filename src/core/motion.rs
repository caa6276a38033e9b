//! Frame-difference motion metric with rollover debouncing.
//!
//! Each tick the blurred grayscale frame is compared against the previous
//! one. The number of changed pixels is smoothed over [`MOTION_HISTORY_SIZE`]
//! ticks and compared with the calibrated threshold. Short bursts of motion
//! (the subject rolling over) are ignored until they last longer than the
//! rollover grace period.

use crate::core::history::{History, MOTION_HISTORY_SIZE};
use crate::core::imaging::changed_pixels;
use chrono::{DateTime, Duration, Local};
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Motion threshold used until calibration runs.
pub const DEFAULT_MOTION_THRESHOLD: f64 = 50_000.0;

/// Motion shorter than this is treated as repositioning.
pub const DEFAULT_ROLLOVER_GRACE_SECS: i64 = 5;

/// Result of one motion update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionReading {
    /// Changed-pixel count for this tick (0 on the first frame)
    pub level: f64,
    /// Mean of the motion history
    pub smoothed: f64,
    /// Smoothed level above threshold, before debouncing
    pub raw_motion: bool,
    /// Raw motion currently inside the rollover grace period
    pub rollover: bool,
    /// Sustained motion: raw motion lasting at least the grace period
    pub motion_detected: bool,
}

/// Stateful motion detector.
#[derive(Debug, Clone)]
pub struct MotionSignal {
    previous: Option<GrayImage>,
    history: History,
    threshold: f64,
    rollover_grace: Duration,
    rollover_start: Option<DateTime<Local>>,
    last: MotionReading,
}

impl MotionSignal {
    pub fn new(threshold: f64, rollover_grace: Duration) -> Self {
        Self {
            previous: None,
            history: History::new(MOTION_HISTORY_SIZE),
            threshold,
            rollover_grace,
            rollover_start: None,
            last: MotionReading::default(),
        }
    }

    /// Feed the next blurred grayscale frame.
    pub fn update(&mut self, frame: GrayImage, now: DateTime<Local>) -> MotionReading {
        let level = match self.previous.as_ref() {
            Some(previous) => changed_pixels(previous, &frame),
            None => None,
        };
        self.previous = Some(frame);

        let Some(level) = level else {
            // First frame, or the geometry changed: nothing to compare against.
            self.last = MotionReading {
                motion_detected: self.last.motion_detected,
                ..MotionReading::default()
            };
            return self.last;
        };

        self.history.push(level as f64);
        let smoothed = self.history.mean();
        let raw_motion = smoothed > self.threshold;
        let (rollover, motion_detected) = self.debounce(raw_motion, now);

        self.last = MotionReading {
            level: level as f64,
            smoothed,
            raw_motion,
            rollover,
            motion_detected,
        };
        self.last
    }

    /// Apply the rollover grace period to the raw motion flag.
    ///
    /// Returns `(rollover, motion_detected)`.
    fn debounce(&mut self, raw_motion: bool, now: DateTime<Local>) -> (bool, bool) {
        if !raw_motion {
            self.rollover_start = None;
            return (false, false);
        }

        let start = *self.rollover_start.get_or_insert(now);
        if now - start < self.rollover_grace {
            (true, false)
        } else {
            (false, true)
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn set_threshold(&mut self, threshold: f64) {
        self.threshold = threshold;
    }

    /// Most recent reading.
    pub fn last(&self) -> MotionReading {
        self.last
    }

    /// Forget the reference frame and history (e.g. after calibration).
    pub fn reset(&mut self) {
        self.previous = None;
        self.history.clear();
        self.rollover_start = None;
        self.last = MotionReading::default();
    }
}

impl Default for MotionSignal {
    fn default() -> Self {
        Self::new(
            DEFAULT_MOTION_THRESHOLD,
            Duration::seconds(DEFAULT_ROLLOVER_GRACE_SECS),
        )
    }
}
