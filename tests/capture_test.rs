//! Integration tests for the capture pipeline over real encoded JPEG data.

use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use sleep_sentinel::capture::{
    CameraCapture, FrameDemuxer, MjpegFileCamera, ReaderSettings,
};
use sleep_sentinel::config::{AudioBackend, CameraBackend, Config};
use sleep_sentinel::record::MemoryRecorder;
use sleep_sentinel::Monitor;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn jpeg(value: u8) -> Vec<u8> {
    let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(48, 32, Luma([value])));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Jpeg).unwrap();
    out.into_inner()
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sleep-sentinel-capture-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_demuxer_chunking_does_not_change_frames() {
    let frames: Vec<Vec<u8>> = [20u8, 120, 220].iter().map(|&v| jpeg(v)).collect();
    let mut stream = b"noise before the first frame".to_vec();
    for frame in &frames {
        stream.extend_from_slice(frame);
    }

    let mut whole = FrameDemuxer::new();
    let expected = whole.push(&stream).unwrap();
    assert_eq!(expected, frames);

    for chunk_size in [1, 7, 64, 333, 4096] {
        let mut demuxer = FrameDemuxer::new();
        let mut got = Vec::new();
        for chunk in stream.chunks(chunk_size) {
            got.extend(demuxer.push(chunk).unwrap());
        }
        assert_eq!(got, expected, "chunk size {chunk_size}");
    }
}

#[test]
fn test_file_camera_publishes_decoded_frames() {
    let dir = temp_dir();
    let path = dir.join("night.mjpeg");
    let mut bytes = Vec::new();
    for v in [10u8, 60, 110, 160, 210] {
        bytes.extend(jpeg(v));
    }
    std::fs::write(&path, bytes).unwrap();

    let mut capture = CameraCapture::start(
        Box::new(MjpegFileCamera::new(&path, 200)),
        ReaderSettings::default(),
    );

    let deadline = Instant::now() + Duration::from_secs(5);
    while capture.is_available() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!capture.is_available(), "reader did not reach end of file");

    let (sequence, frame) = capture.newer_frame(0).unwrap();
    assert_eq!(sequence, 5);
    assert_eq!((frame.width(), frame.height()), (48, 32));
    let luma = frame.image.to_luma8();
    assert!(luma.get_pixel(24, 16)[0] > 180);

    capture.stop(Duration::from_millis(100), Duration::ZERO);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_monitor_ticks_from_file_camera() {
    let dir = temp_dir();
    let path = dir.join("still.mjpeg");
    let frame = jpeg(100);
    std::fs::write(&path, frame.repeat(6)).unwrap();

    let mut config = Config::default();
    config.data_path = dir.clone();
    config.camera.backend = CameraBackend::File;
    config.camera.file = Some(path);
    config.camera.framerate = 50;
    config.audio.backend = AudioBackend::Disabled;

    let mut monitor = Monitor::from_config(config, Box::new(MemoryRecorder::default()));

    let mut face_ticks = 0;
    let mut faceless_ticks = 0;
    let deadline = Instant::now() + Duration::from_secs(5);
    while faceless_ticks == 0 && Instant::now() < deadline {
        match monitor.step(chrono::Local::now()) {
            Some(tick) if tick.camera.face_detected => {
                assert_eq!(tick.camera.motion_level, 0.0);
                assert!(tick.audio.silent);
                face_ticks += 1;
            }
            Some(_) => faceless_ticks += 1,
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }

    // Frames were observed while the file played, then the stream ended and
    // ticks continued without a face.
    assert!(face_ticks >= 1);
    assert!(face_ticks <= 6);
    assert_eq!(faceless_ticks, 1);

    let summary = monitor.finish(chrono::Local::now());
    assert!(summary.sessions.is_empty());
    std::fs::remove_dir_all(&dir).ok();
}
