use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::camera::FrameSource;
use crate::channel::{ChannelHandle, OutboundEvent};
use crate::config::StreamerConfig;
use crate::error::Result;
use crate::frame::FrameData;

/// Samples the newest camera frame on a fixed period and ships it upstream
/// as a base64 JPEG data URL.
///
/// Starting requires a channel and a ready source to be attached; once
/// running, ticks with no fresh frame simply do nothing and a failed tick
/// never stops the loop.
pub struct FrameStreamer {
    shared: Arc<StreamerShared>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

struct StreamerShared {
    config: StreamerConfig,
    source: RwLock<Option<Arc<dyn FrameSource>>>,
    channel: RwLock<Option<ChannelHandle>>,
    is_running: AtomicBool,
    frames_sent: AtomicU64,
}

impl FrameStreamer {
    pub fn new(config: StreamerConfig) -> Self {
        Self {
            shared: Arc::new(StreamerShared {
                config,
                source: RwLock::new(None),
                channel: RwLock::new(None),
                is_running: AtomicBool::new(false),
                frames_sent: AtomicU64::new(0),
            }),
            task: tokio::sync::Mutex::new(None),
        }
    }

    /// Attach or replace the frame source. Takes effect on the next tick.
    pub fn attach_source(&self, source: Arc<dyn FrameSource>) {
        *self.shared.source.write() = Some(source);
    }

    /// Attach or replace the upstream channel. Takes effect on the next tick.
    pub fn attach_channel(&self, channel: ChannelHandle) {
        *self.shared.channel.write() = Some(channel);
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.is_running.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.shared.frames_sent.load(Ordering::Relaxed)
    }

    /// Start the sampling loop. Requires a channel and a ready source to
    /// already be attached; without both there is nothing to sample or
    /// send, so the call returns without spawning and a later `start()`
    /// can pick things up. Starting an already-running streamer is a no-op.
    pub async fn start(&self) -> Result<()> {
        if self.shared.is_running.load(Ordering::Relaxed) {
            warn!("Frame streamer is already running");
            return Ok(());
        }
        if self.shared.channel.read().is_none() {
            debug!("No channel attached; not starting the frame streamer");
            return Ok(());
        }
        let source_ready = self
            .shared
            .source
            .read()
            .as_ref()
            .map(|source| source.is_ready())
            .unwrap_or(false);
        if !source_ready {
            debug!("No ready frame source attached; not starting the frame streamer");
            return Ok(());
        }

        info!(
            "Starting frame streamer (every {}ms, quality {}, max width {})",
            self.shared.config.sample_interval_ms,
            self.shared.config.jpeg_quality,
            self.shared.config.max_width
        );
        self.shared.is_running.store(true, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(shared.config.sample_interval_ms));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            while shared.is_running.load(Ordering::Relaxed) {
                interval.tick().await;
                if !shared.is_running.load(Ordering::Relaxed) {
                    break;
                }
                sample_once(&shared);
            }
            debug!("Frame streamer loop stopped");
        });

        *self.task.lock().await = Some(task);
        Ok(())
    }

    /// Stop the sampling loop. Stopping an idle streamer is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if !self.shared.is_running.load(Ordering::Relaxed) {
            debug!("Frame streamer is not running");
            return Ok(());
        }

        self.shared.is_running.store(false, Ordering::Relaxed);
        if let Some(task) = self.task.lock().await.take() {
            if let Err(e) = tokio::time::timeout(Duration::from_secs(3), task).await {
                warn!("Frame streamer did not stop within timeout: {}", e);
            }
        }
        info!("Frame streamer stopped");
        Ok(())
    }
}

fn sample_once(shared: &StreamerShared) {
    let channel = shared.channel.read().clone();
    let channel = match channel {
        Some(channel) => channel,
        None => {
            trace!("No channel attached; skipping sample");
            return;
        }
    };
    let source = shared.source.read().clone();
    let frame = match source.and_then(|s| s.latest_frame()) {
        Some(frame) => frame,
        None => {
            trace!("No frame available; skipping sample");
            return;
        }
    };

    match encode_outbound(&frame, shared.config.max_width, shared.config.jpeg_quality) {
        Ok(data_url) => {
            channel.send(OutboundEvent::VideoFrame { frame: data_url });
            shared.frames_sent.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => warn!("Failed to encode outbound frame: {}", e),
    }
}

/// Turn a captured JPEG frame into a `data:image/jpeg;base64,` URL,
/// downscaling first when it is wider than `max_width`. Frames are always
/// re-encoded at the sampling quality so payload size follows the config,
/// not the capture encoder.
fn encode_outbound(frame: &FrameData, max_width: u32, quality: u8) -> Result<String> {
    let decoded = image::load_from_memory(&frame.data)?;
    let rgb = if frame.width > max_width && max_width > 0 {
        let scale = max_width as f32 / frame.width as f32;
        let height = ((frame.height as f32 * scale).round() as u32).max(1);
        decoded
            .resize_exact(max_width, height, FilterType::Triangle)
            .to_rgb8()
    } else {
        decoded.to_rgb8()
    };

    let (width, height) = rgb.dimensions();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder.encode(rgb.as_raw(), width, height, image::ColorType::Rgb8)?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        STANDARD.encode(&buffer)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::TestPatternSource;
    use crate::channel::{ConnectionStatus, EventChannel};
    use crate::config::{CameraConfig, ChannelConfig};
    use futures_util::StreamExt;
    use std::time::SystemTime;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn jpeg_frame(width: u32, height: u32) -> FrameData {
        let image = image::RgbImage::from_pixel(width, height, image::Rgb([120, 40, 200]));
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, 80);
        encoder
            .encode(image.as_raw(), width, height, image::ColorType::Rgb8)
            .unwrap();
        FrameData::new(0, SystemTime::now(), buffer, width, height)
    }

    fn decode_data_url(url: &str) -> image::DynamicImage {
        let encoded = url
            .strip_prefix("data:image/jpeg;base64,")
            .expect("missing data URL prefix");
        let bytes = STANDARD.decode(encoded).unwrap();
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn small_frames_keep_their_dimensions() {
        let frame = jpeg_frame(320, 240);
        let url = encode_outbound(&frame, 640, 70).unwrap();
        let decoded = decode_data_url(&url);
        assert_eq!(decoded.width(), 320);
        assert_eq!(decoded.height(), 240);
    }

    #[test]
    fn small_frames_are_reencoded_at_sampling_quality() {
        // A textured frame captured at high quality; the outbound payload
        // must shrink with the configured quality even with no downscale.
        let image = image::RgbImage::from_fn(320, 240, |x, y| {
            image::Rgb([
                ((x * 7 + y * 13) % 256) as u8,
                ((x * 3 + y * 31) % 256) as u8,
                ((x * 17 + y * 5) % 256) as u8,
            ])
        });
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, 95);
        encoder
            .encode(image.as_raw(), 320, 240, image::ColorType::Rgb8)
            .unwrap();
        let frame = FrameData::new(0, SystemTime::now(), buffer, 320, 240);

        let payload_len = |url: &str| {
            STANDARD
                .decode(url.strip_prefix("data:image/jpeg;base64,").unwrap())
                .unwrap()
                .len()
        };
        let low = encode_outbound(&frame, 640, 10).unwrap();
        let high = encode_outbound(&frame, 640, 90).unwrap();
        assert!(payload_len(&low) < payload_len(&high));
        assert_eq!(decode_data_url(&low).width(), 320);
    }

    #[test]
    fn wide_frames_are_downscaled_preserving_aspect() {
        let frame = jpeg_frame(1280, 720);
        let url = encode_outbound(&frame, 640, 70).unwrap();
        let decoded = decode_data_url(&url);
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 360);
    }

    #[test]
    fn corrupt_frames_fail_cleanly() {
        let frame = FrameData::new(0, SystemTime::now(), vec![0xDE, 0xAD], 1280, 720);
        assert!(encode_outbound(&frame, 640, 70).is_err());
    }

    async fn wait_for_frames(source: &TestPatternSource) {
        timeout(Duration::from_secs(5), async {
            while !source.is_ready() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("source never produced a frame");
    }

    #[tokio::test]
    async fn start_without_attachments_is_a_noop() {
        let streamer = FrameStreamer::new(StreamerConfig {
            sample_interval_ms: 10,
            jpeg_quality: 70,
            max_width: 640,
        });
        streamer.start().await.unwrap();
        assert!(!streamer.is_streaming());
        assert_eq!(streamer.frames_sent(), 0);
        streamer.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_without_a_channel_is_a_noop() {
        let source = Arc::new(TestPatternSource::new(CameraConfig {
            index: 0,
            resolution: (64, 48),
            fps: 100,
        }));
        source.start().await.unwrap();
        wait_for_frames(&source).await;

        let streamer = FrameStreamer::new(StreamerConfig {
            sample_interval_ms: 10,
            jpeg_quality: 70,
            max_width: 640,
        });
        streamer.attach_source(source.clone());
        streamer.start().await.unwrap();
        assert!(!streamer.is_streaming());
        source.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_without_a_ready_source_is_a_noop() {
        let channel = EventChannel::new(ChannelConfig {
            url: "ws://127.0.0.1:1".to_string(),
            reconnect_delay_ms: 50,
        });
        let source = Arc::new(TestPatternSource::new(CameraConfig {
            index: 0,
            resolution: (64, 48),
            fps: 100,
        }));
        let streamer = FrameStreamer::new(StreamerConfig {
            sample_interval_ms: 10,
            jpeg_quality: 70,
            max_width: 640,
        });
        streamer.attach_channel(channel.handle());

        // Attached but never started, so the source is not ready.
        streamer.attach_source(source.clone());
        streamer.start().await.unwrap();
        assert!(!streamer.is_streaming());

        // A later start() picks up the now-ready source.
        source.start().await.unwrap();
        wait_for_frames(&source).await;
        streamer.start().await.unwrap();
        assert!(streamer.is_streaming());

        streamer.stop().await.unwrap();
        source.stop().await.unwrap();
        channel.close().await;
    }

    #[tokio::test]
    async fn streams_frames_to_the_service() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let text = ws.next().await.unwrap().unwrap().into_text().unwrap();
            assert!(text.contains("\"event\":\"video_frame\""));
            assert!(text.contains("data:image/jpeg;base64,"));
        });

        let channel = EventChannel::new(ChannelConfig {
            url: format!("ws://{}", addr),
            reconnect_delay_ms: 50,
        });
        channel.connect();
        let mut status = channel.status();
        timeout(Duration::from_secs(5), async {
            while *status.borrow() != ConnectionStatus::Connected {
                status.changed().await.unwrap();
            }
        })
        .await
        .expect("never connected");

        let source = Arc::new(TestPatternSource::new(CameraConfig {
            index: 0,
            resolution: (64, 48),
            fps: 100,
        }));
        source.start().await.unwrap();
        wait_for_frames(&source).await;

        let streamer = FrameStreamer::new(StreamerConfig {
            sample_interval_ms: 10,
            jpeg_quality: 70,
            max_width: 640,
        });
        streamer.attach_source(source.clone());
        streamer.attach_channel(channel.handle());
        streamer.start().await.unwrap();
        assert!(streamer.is_streaming());

        timeout(Duration::from_secs(5), server)
            .await
            .expect("service never received a frame")
            .unwrap();

        streamer.stop().await.unwrap();
        source.stop().await.unwrap();
        channel.close().await;
    }
}
