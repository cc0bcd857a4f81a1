use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CameraConfig;
use crate::error::Result;
use crate::frame::FrameData;

use super::source::{FrameSlot, FrameSource};

/// Synthetic frame source producing a scrolling gradient as real JPEG data.
/// Used when no capture hardware is present and by the test suite.
pub struct TestPatternSource {
    config: CameraConfig,
    slot: Arc<FrameSlot>,
    frame_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    capture_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl TestPatternSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            slot: FrameSlot::new(),
            frame_counter: Arc::new(AtomicU64::new(0)),
            is_running: Arc::new(AtomicBool::new(false)),
            capture_task: tokio::sync::Mutex::new(None),
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl FrameSource for TestPatternSource {
    async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            warn!("Test pattern source is already running");
            return Ok(());
        }

        info!(
            "Starting test pattern source ({}x{} @ {}fps)",
            self.config.resolution.0, self.config.resolution.1, self.config.fps
        );
        self.is_running.store(true, Ordering::Relaxed);

        let (width, height) = self.config.resolution;
        let fps = self.config.fps.max(1);
        let slot = Arc::clone(&self.slot);
        let frame_counter = Arc::clone(&self.frame_counter);
        let is_running = Arc::clone(&self.is_running);

        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis((1000 / fps as u64).max(1)));

            while is_running.load(Ordering::Relaxed) {
                interval.tick().await;
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
                match render_pattern(frame_id, width, height) {
                    Ok(data) => {
                        slot.store(FrameData::new(
                            frame_id,
                            SystemTime::now(),
                            data,
                            width,
                            height,
                        ));
                    }
                    Err(e) => error!("Failed to encode test pattern frame: {}", e),
                }
            }

            debug!("Test pattern loop stopped");
        });

        *self.capture_task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.is_running.load(Ordering::Relaxed) {
            debug!("Test pattern source is not running");
            return Ok(());
        }

        self.is_running.store(false, Ordering::Relaxed);
        if let Some(task) = self.capture_task.lock().await.take() {
            if let Err(e) = tokio::time::timeout(Duration::from_secs(3), task).await {
                warn!("Test pattern loop did not stop within timeout: {}", e);
            }
        }
        info!("Test pattern source stopped");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.is_running.load(Ordering::Relaxed) && self.frame_counter.load(Ordering::Relaxed) > 0
    }

    fn dimensions(&self) -> (u32, u32) {
        self.config.resolution
    }

    fn latest_frame(&self) -> Option<FrameData> {
        self.slot.load()
    }
}

/// Render one pattern frame as a JPEG. The gradient scrolls with the frame
/// id so consecutive frames differ.
fn render_pattern(frame_id: u64, width: u32, height: u32) -> image::ImageResult<Vec<u8>> {
    let shift = (frame_id * 4 % 256) as u32;
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            ((x + shift) % 256) as u8,
            ((y + shift / 2) % 256) as u8,
            (((x + y) / 2) % 256) as u8,
        ])
    });

    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, 75);
    encoder.encode(image.as_raw(), width, height, image::ColorType::Rgb8)?;
    Ok(buffer)
}
