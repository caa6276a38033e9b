//! Face and eye detection interface.
//!
//! The detection model is not part of this crate. A [`Detector`] turns a
//! grayscale image into bounding boxes; the backend is picked at startup.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with an image of the given size. `None` if nothing remains.
    pub fn clip(&self, image_width: u32, image_height: u32) -> Option<Rect> {
        if self.x >= image_width || self.y >= image_height {
            return None;
        }
        let width = self.width.min(image_width - self.x);
        let height = self.height.min(image_height - self.y);
        if width == 0 || height == 0 {
            return None;
        }
        Some(Rect::new(self.x, self.y, width, height))
    }

    /// Translate a box found inside this region back to image coordinates.
    ///
    /// The box is clipped to the region first; `None` if it lies outside.
    pub fn offset(&self, inner: Rect) -> Option<Rect> {
        let inner = inner.clip(self.width, self.height)?;
        Some(Rect::new(
            self.x + inner.x,
            self.y + inner.y,
            inner.width,
            inner.height,
        ))
    }
}

/// Object detector capability.
pub trait Detector: Send {
    /// Return every box found in `image`.
    fn detect(&mut self, image: &GrayImage) -> Vec<Rect>;
}

/// Detector that never finds anything.
#[derive(Debug, Clone, Default)]
pub struct NoopDetector;

impl Detector for NoopDetector {
    fn detect(&mut self, _image: &GrayImage) -> Vec<Rect> {
        Vec::new()
    }
}

/// Detector reporting fixed regions, for a camera aimed at a known spot.
///
/// With no regions configured the whole image is reported.
#[derive(Debug, Clone, Default)]
pub struct StaticRegionDetector {
    regions: Vec<Rect>,
}

impl StaticRegionDetector {
    pub fn new(regions: Vec<Rect>) -> Self {
        Self { regions }
    }

    /// Report the whole image.
    pub fn whole_frame() -> Self {
        Self::default()
    }
}

impl Detector for StaticRegionDetector {
    fn detect(&mut self, image: &GrayImage) -> Vec<Rect> {
        let (width, height) = image.dimensions();
        if self.regions.is_empty() {
            return Rect::new(0, 0, width, height)
                .clip(width, height)
                .into_iter()
                .collect();
        }
        self.regions
            .iter()
            .filter_map(|r| r.clip(width, height))
            .collect()
    }
}

/// Faces found in a frame and the eyes found inside them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaceObservation {
    pub faces: Vec<Rect>,
    /// Eye boxes in image coordinates
    pub eyes: Vec<Rect>,
}

impl FaceObservation {
    pub fn face_detected(&self) -> bool {
        !self.faces.is_empty()
    }

    /// Open eyes are visible when the eye detector found at least one eye in a face.
    pub fn eyes_open(&self) -> bool {
        !self.eyes.is_empty()
    }
}

/// Run the face detector on `image` and the eye detector on each face region.
pub fn observe_faces(
    image: &GrayImage,
    faces: &mut dyn Detector,
    eyes: &mut dyn Detector,
) -> FaceObservation {
    let (width, height) = image.dimensions();
    let found: Vec<Rect> = faces
        .detect(image)
        .into_iter()
        .filter_map(|r| r.clip(width, height))
        .collect();

    let mut observation = FaceObservation {
        faces: Vec::with_capacity(found.len()),
        eyes: Vec::new(),
    };
    for face in found {
        let roi = image::imageops::crop_imm(image, face.x, face.y, face.width, face.height)
            .to_image();
        observation
            .eyes
            .extend(eyes.detect(&roi).into_iter().filter_map(|eye| face.offset(eye)));
        observation.faces.push(face);
    }
    observation
}
