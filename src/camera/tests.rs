use std::time::Duration;

use tokio::time::timeout;

use super::*;
use crate::config::CameraConfig;
use crate::frame::FrameData;

fn small_camera() -> CameraConfig {
    CameraConfig {
        index: 0,
        resolution: (64, 48),
        fps: 100,
    }
}

async fn wait_for_frame(source: &TestPatternSource) -> FrameData {
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(frame) = source.latest_frame() {
                return frame;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("source never produced a frame")
}

#[tokio::test]
async fn produces_decodable_jpeg_frames() {
    let source = TestPatternSource::new(small_camera());
    assert!(!source.is_ready());
    assert!(source.latest_frame().is_none());

    source.start().await.unwrap();
    let frame = wait_for_frame(&source).await;
    assert!(source.is_ready());

    let decoded = image::load_from_memory(&frame.data).expect("frame must be a valid JPEG");
    assert_eq!(decoded.width(), 64);
    assert_eq!(decoded.height(), 48);
    assert_eq!(frame.width, 64);
    assert_eq!(frame.height, 48);

    source.stop().await.unwrap();
    assert!(!source.is_ready());
}

#[tokio::test]
async fn slot_holds_the_newest_frame() {
    let source = TestPatternSource::new(small_camera());
    source.start().await.unwrap();

    let first = wait_for_frame(&source).await;
    let later = timeout(Duration::from_secs(5), async {
        loop {
            if let Some(frame) = source.latest_frame() {
                if frame.id > first.id {
                    return frame;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("frame counter never advanced");

    assert!(later.id > first.id);
    source.stop().await.unwrap();
}

#[tokio::test]
async fn start_and_stop_are_idempotent() {
    let source = TestPatternSource::new(small_camera());

    source.start().await.unwrap();
    source.start().await.unwrap();
    wait_for_frame(&source).await;

    source.stop().await.unwrap();
    source.stop().await.unwrap();
    assert!(!source.is_ready());
}

#[tokio::test]
async fn dimensions_come_from_configuration() {
    let source = TestPatternSource::new(CameraConfig {
        index: 2,
        resolution: (320, 240),
        fps: 15,
    });
    assert_eq!(source.dimensions(), (320, 240));
}
