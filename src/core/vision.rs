//! Per-tick camera status: motion plus face and eye presence.

use crate::capture::types::Frame;
use crate::core::detect::{observe_faces, Detector, FaceObservation};
use crate::core::imaging::prepare;
use crate::core::motion::{MotionReading, MotionSignal};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Camera-derived signals for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraStatus {
    /// Sustained motion (after rollover debouncing)
    pub motion_detected: bool,
    /// Changed-pixel count for this tick
    pub motion_level: f64,
    /// Threshold the smoothed level is compared against
    pub threshold: f64,
    pub face_detected: bool,
    pub face_count: usize,
    pub eyes_open: bool,
    pub eye_count: usize,
}

impl CameraStatus {
    pub fn from_parts(motion: &MotionReading, threshold: f64, faces: &FaceObservation) -> Self {
        Self {
            motion_detected: motion.motion_detected,
            motion_level: motion.level,
            threshold,
            face_detected: faces.face_detected(),
            face_count: faces.faces.len(),
            eyes_open: faces.eyes_open(),
            eye_count: faces.eyes.len(),
        }
    }
}

/// Turns frames into [`CameraStatus`] values.
pub struct CameraMonitor {
    motion: MotionSignal,
    face_detector: Box<dyn Detector>,
    eye_detector: Box<dyn Detector>,
    last_faces: FaceObservation,
}

impl CameraMonitor {
    pub fn new(
        motion: MotionSignal,
        face_detector: Box<dyn Detector>,
        eye_detector: Box<dyn Detector>,
    ) -> Self {
        Self {
            motion,
            face_detector,
            eye_detector,
            last_faces: FaceObservation::default(),
        }
    }

    /// Process one frame.
    pub fn process(&mut self, frame: &Frame, now: DateTime<Local>) -> CameraStatus {
        let blurred = prepare(&frame.image);
        let faces = observe_faces(
            &blurred,
            self.face_detector.as_mut(),
            self.eye_detector.as_mut(),
        );
        let motion = self.motion.update(blurred, now);

        let status = CameraStatus::from_parts(&motion, self.motion.threshold(), &faces);
        self.last_faces = faces;
        status
    }

    /// Faces and eyes from the most recent frame.
    pub fn last_faces(&self) -> &FaceObservation {
        &self.last_faces
    }

    pub fn motion(&self) -> &MotionSignal {
        &self.motion
    }

    pub fn set_motion_threshold(&mut self, threshold: f64) {
        self.motion.set_threshold(threshold);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detect::{NoopDetector, Rect, StaticRegionDetector};
    use chrono::Duration;
    use image::{DynamicImage, GrayImage, Luma};

    fn frame(value: u8, sequence: u64) -> Frame {
        Frame::new(
            DynamicImage::ImageLuma8(GrayImage::from_pixel(40, 30, Luma([value]))),
            sequence,
        )
    }

    #[test]
    fn test_status_reports_faces_and_motion() {
        let motion = MotionSignal::new(100.0, Duration::seconds(5));
        let mut monitor = CameraMonitor::new(
            motion,
            Box::new(StaticRegionDetector::new(vec![Rect::new(5, 5, 10, 10)])),
            Box::new(NoopDetector),
        );

        let t0 = Local::now();
        let first = monitor.process(&frame(0, 1), t0);
        assert!(first.face_detected);
        assert_eq!(first.face_count, 1);
        assert!(!first.eyes_open);
        assert_eq!(first.motion_level, 0.0);
        assert_eq!(first.threshold, 100.0);

        let second = monitor.process(&frame(255, 2), t0 + Duration::milliseconds(33));
        assert_eq!(second.motion_level, 1200.0);
        // Raw motion right away, but still inside the rollover grace period.
        assert!(!second.motion_detected);
    }

    #[test]
    fn test_eyes_open_when_eye_found() {
        let mut monitor = CameraMonitor::new(
            MotionSignal::default(),
            Box::new(StaticRegionDetector::whole_frame()),
            Box::new(StaticRegionDetector::new(vec![Rect::new(1, 1, 2, 2)])),
        );
        let status = monitor.process(&frame(10, 1), Local::now());
        assert!(status.eyes_open);
        assert_eq!(status.eye_count, 1);
        assert_eq!(monitor.last_faces().eyes, vec![Rect::new(1, 1, 2, 2)]);
    }
}
