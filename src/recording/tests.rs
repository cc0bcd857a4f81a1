use std::time::SystemTime;

use image::codecs::jpeg::JpegEncoder;

use super::*;
use crate::config::RecordingConfig;
use crate::effect::Rgb;
use crate::error::{PopboxError, RecordingError, TranscodeError};
use crate::frame::FrameData;
use crate::surface::Surface;

fn recording_config(binary: &str) -> RecordingConfig {
    RecordingConfig {
        fps: 30,
        jpeg_quality: 80,
        output_dir: ".".to_string(),
        ffmpeg_binary: binary.to_string(),
    }
}

fn camera_frame(width: u32, height: u32) -> FrameData {
    let image = image::RgbImage::from_pixel(width, height, image::Rgb([0, 80, 160]));
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, 80);
    encoder
        .encode(image.as_raw(), width, height, image::ColorType::Rgb8)
        .unwrap();
    FrameData::new(0, SystemTime::now(), buffer, width, height)
}

fn overlay_with_box(width: u32, height: u32) -> Surface {
    let mut surface = Surface::new(width, height);
    surface.fill_rect(8.0, 8.0, 16.0, 16.0, Rgb { r: 255, g: 0, b: 0 }, 1.0);
    surface
}

#[test]
fn double_start_is_rejected() {
    let pipeline = RecordingPipeline::new(recording_config("false"));
    pipeline.start().unwrap();
    match pipeline.start() {
        Err(PopboxError::Recording(RecordingError::AlreadyRecording)) => {}
        other => panic!("expected AlreadyRecording, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn stop_without_start_yields_nothing() {
    let pipeline = RecordingPipeline::new(recording_config("false"));
    assert!(pipeline.stop().await.unwrap().is_none());
    assert!(!pipeline.is_recording());
}

#[tokio::test]
async fn stop_with_no_frames_yields_nothing() {
    let pipeline = RecordingPipeline::new(recording_config("false"));
    pipeline.start().unwrap();
    assert!(pipeline.stop().await.unwrap().is_none());
    assert!(!pipeline.is_recording());

    // The pipeline is reusable afterwards.
    pipeline.start().unwrap();
    assert!(pipeline.is_recording());
}

#[test]
fn composite_tick_while_idle_is_a_no_op() {
    let pipeline = RecordingPipeline::new(recording_config("false"));
    let frame = camera_frame(64, 48);
    let overlay = overlay_with_box(64, 48);
    pipeline.composite_tick(&frame, &overlay).unwrap();
    assert_eq!(pipeline.frames_captured(), 0);
}

#[tokio::test]
async fn failed_transcode_falls_back_to_mjpeg() {
    // "false" exits nonzero on probe, so the transcoder is unavailable and
    // the raw stream becomes the artifact.
    let pipeline = RecordingPipeline::new(recording_config("false"));
    pipeline.start().unwrap();

    let frame = camera_frame(64, 48);
    let overlay = overlay_with_box(64, 48);
    pipeline.composite_tick(&frame, &overlay).unwrap();
    pipeline.composite_tick(&frame, &overlay).unwrap();
    assert_eq!(pipeline.frames_captured(), 2);

    let artifact = pipeline.stop().await.unwrap().expect("artifact expected");
    assert_eq!(artifact.format, ArtifactFormat::Mjpeg);
    assert!(artifact.file_name.starts_with("popbox-effect-"));
    assert!(artifact.file_name.ends_with(".mjpeg"));

    // The stream must start with a decodable JPEG chunk.
    let first = image::load_from_memory(&artifact.data).unwrap();
    assert_eq!(first.width(), 64);
    assert_eq!(first.height(), 48);
    assert!(!pipeline.is_recording());
}

#[tokio::test]
async fn overlay_is_burned_into_the_recording() {
    let pipeline = RecordingPipeline::new(recording_config("false"));
    pipeline.start().unwrap();

    let frame = camera_frame(64, 48);
    let overlay = overlay_with_box(64, 48);
    pipeline.composite_tick(&frame, &overlay).unwrap();

    let artifact = pipeline.stop().await.unwrap().expect("artifact expected");
    let composited = image::load_from_memory(&artifact.data).unwrap().to_rgb8();

    // Inside the drawn box the red channel dominates; outside it matches the
    // camera background.
    let inside = composited.get_pixel(16, 16);
    let outside = composited.get_pixel(48, 40);
    assert!(inside[0] > 150, "overlay box missing: {:?}", inside);
    assert!(outside[0] < 80, "background overwritten: {:?}", outside);
}

#[tokio::test]
async fn mismatched_overlay_is_scaled_to_the_frame() {
    let pipeline = RecordingPipeline::new(recording_config("false"));
    pipeline.start().unwrap();

    let frame = camera_frame(128, 96);
    let overlay = overlay_with_box(64, 48);
    pipeline.composite_tick(&frame, &overlay).unwrap();

    let artifact = pipeline.stop().await.unwrap().expect("artifact expected");
    let composited = image::load_from_memory(&artifact.data).unwrap();
    assert_eq!(composited.width(), 128);
    assert_eq!(composited.height(), 96);
}

#[tokio::test]
async fn corrupt_camera_frame_fails_the_tick_but_not_the_recording() {
    let pipeline = RecordingPipeline::new(recording_config("false"));
    pipeline.start().unwrap();

    let bad = FrameData::new(0, SystemTime::now(), vec![1, 2, 3], 64, 48);
    let overlay = overlay_with_box(64, 48);
    assert!(pipeline.composite_tick(&bad, &overlay).is_err());
    assert!(pipeline.is_recording());

    let good = camera_frame(64, 48);
    pipeline.composite_tick(&good, &overlay).unwrap();
    assert_eq!(pipeline.frames_captured(), 1);
    assert!(pipeline.stop().await.unwrap().is_some());
}

#[tokio::test]
async fn artifacts_save_into_the_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = RecordingArtifact {
        file_name: "popbox-effect-test.mjpeg".to_string(),
        data: bytes::Bytes::from_static(b"\xFF\xD8\xFF\xD9"),
        format: ArtifactFormat::Mjpeg,
    };

    let path = artifact.save(dir.path()).await.unwrap();
    assert!(path.exists());
    assert_eq!(std::fs::read(&path).unwrap(), b"\xFF\xD8\xFF\xD9");
}

#[tokio::test]
async fn missing_transcoder_binary_reports_unavailable() {
    let engine = TranscodeEngine::new("definitely-not-a-real-binary-3141");
    assert!(!engine.is_ready().await);
    match engine.load().await {
        Err(PopboxError::Transcode(TranscodeError::EngineUnavailable { .. })) => {}
        other => panic!("expected EngineUnavailable, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn engine_probe_is_memoized() {
    // "true" accepts any arguments and exits zero, so the probe succeeds.
    let engine = TranscodeEngine::new("true");
    engine.load().await.unwrap();
    assert!(engine.is_ready().await);
    engine.load().await.unwrap();
}
