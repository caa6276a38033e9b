//! MJPEG frame de-multiplexer.
//!
//! Camera tools such as `libcamera-vid --codec mjpeg -o -` write JPEG images
//! back to back on stdout with no container. Frames are recovered by
//! scanning for the end-of-image marker and pairing it with the closest
//! preceding start-of-image marker.

const SOI: [u8; 2] = [0xff, 0xd8];
const EOI: [u8; 2] = [0xff, 0xd9];

/// Default upper bound on buffered bytes before the stream is declared desynchronized.
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;

/// Errors reported by the demuxer. Both are recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// The buffer grew past the safety limit without yielding a frame and was reset.
    StreamDesync { buffered: usize },
}

impl std::fmt::Display for DemuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemuxError::StreamDesync { buffered } => {
                write!(f, "MJPEG stream desynchronized ({buffered} bytes discarded)")
            }
        }
    }
}

impl std::error::Error for DemuxError {}

/// Accumulates stream bytes and splits them into complete JPEG frames.
#[derive(Debug)]
pub struct FrameDemuxer {
    buffer: Vec<u8>,
    max_buffer: usize,
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_BUFFER_BYTES)
    }

    pub fn with_limit(max_buffer: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_buffer,
        }
    }

    /// Append a chunk and return every frame it completes, oldest first.
    ///
    /// On [`DemuxError::StreamDesync`] the buffer has already been cleared and
    /// the caller may keep feeding data.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, DemuxError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(eoi) = find(&self.buffer, &EOI) {
            let end = eoi + EOI.len();
            match rfind(&self.buffer[..end], &SOI) {
                Some(start) => {
                    frames.push(self.buffer[start..end].to_vec());
                    self.buffer.drain(..end);
                }
                // Keep everything and wait for more data.
                None => break,
            }
        }

        if self.buffer.len() > self.max_buffer {
            let buffered = self.buffer.len();
            self.buffer.clear();
            return Err(DemuxError::StreamDesync { buffered });
        }

        Ok(frames)
    }

    /// Bytes currently held waiting for a frame boundary.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

fn find(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == needle)
}

fn rfind(haystack: &[u8], needle: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).rposition(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_jpeg(fill: u8, len: usize) -> Vec<u8> {
        let mut frame = SOI.to_vec();
        frame.extend(std::iter::repeat(fill).take(len));
        frame.extend_from_slice(&EOI);
        frame
    }

    fn stream() -> (Vec<u8>, Vec<Vec<u8>>) {
        let frames = vec![fake_jpeg(1, 10), fake_jpeg(2, 3), fake_jpeg(3, 25)];
        let mut bytes = vec![0x00, 0x13, 0x37];
        for f in &frames {
            bytes.extend_from_slice(f);
        }
        bytes.extend_from_slice(&SOI);
        bytes.push(9);
        (bytes, frames)
    }

    #[test]
    fn test_single_chunk() {
        let (bytes, expected) = stream();
        let mut demuxer = FrameDemuxer::new();
        let frames = demuxer.push(&bytes).unwrap();
        assert_eq!(frames, expected);
        // The trailing partial frame stays buffered.
        assert_eq!(demuxer.buffered(), 3);
    }

    #[test]
    fn test_split_at_every_boundary() {
        let (bytes, expected) = stream();
        for split in 0..=bytes.len() {
            let mut demuxer = FrameDemuxer::new();
            let mut frames = demuxer.push(&bytes[..split]).unwrap();
            frames.extend(demuxer.push(&bytes[split..]).unwrap());
            assert_eq!(frames, expected, "split at {split}");
        }
    }

    #[test]
    fn test_byte_at_a_time() {
        let (bytes, expected) = stream();
        let mut demuxer = FrameDemuxer::new();
        let mut frames = Vec::new();
        for b in &bytes {
            frames.extend(demuxer.push(std::slice::from_ref(b)).unwrap());
        }
        assert_eq!(frames, expected);
    }

    #[test]
    fn test_end_marker_without_start_waits() {
        let mut demuxer = FrameDemuxer::new();
        assert!(demuxer.push(&[0x10, 0xff, 0xd9, 0x20]).unwrap().is_empty());
        assert_eq!(demuxer.buffered(), 4);
    }

    #[test]
    fn test_desync_resets_buffer() {
        let mut demuxer = FrameDemuxer::with_limit(16);
        let err = demuxer.push(&[0xaa; 20]).unwrap_err();
        assert_eq!(err, DemuxError::StreamDesync { buffered: 20 });
        assert_eq!(demuxer.buffered(), 0);

        // The stream recovers once valid frames arrive again.
        let frame = fake_jpeg(7, 4);
        assert_eq!(demuxer.push(&frame).unwrap(), vec![frame]);
    }
}
