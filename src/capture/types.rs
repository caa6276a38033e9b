//! Units of data produced by the capture threads.
//!
//! Frames and audio chunks are transient: the fusion loop consumes the most
//! recent one and the rest are overwritten.

use chrono::{DateTime, Local};
use image::DynamicImage;
use std::sync::Arc;

/// A decoded camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Decoded bitmap (usually RGB from the JPEG codec)
    pub image: DynamicImage,
    /// Wall-clock time at which decoding finished
    pub captured_at: DateTime<Local>,
    /// Position of this frame in the capture stream, starting at 1
    pub sequence: u64,
}

impl Frame {
    pub fn new(image: DynamicImage, sequence: u64) -> Self {
        Self {
            image,
            captured_at: Local::now(),
            sequence,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A fixed-size block of signed 16-bit mono PCM samples.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Samples, shared so that snapshots do not copy the buffer
    pub samples: Arc<[i16]>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Position of this chunk in the capture stream, starting at 1
    pub sequence: u64,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>, sample_rate: u32, sequence: u64) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            sequence,
        }
    }

    /// Decode little-endian S16 bytes into a chunk. A trailing odd byte is ignored.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32, sequence: u64) -> Self {
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        Self::new(samples, sample_rate, sequence)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_chunk_from_le_bytes() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80, 0x7f];
        let chunk = AudioChunk::from_le_bytes(&bytes, 44_100, 1);
        assert_eq!(&*chunk.samples, &[1, -1, i16::MIN]);
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn test_frame_dimensions() {
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 4, Luma([0])));
        let frame = Frame::new(image, 7);
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.sequence, 7);
    }
}
