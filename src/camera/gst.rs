use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::config::CameraConfig;
use crate::error::{CameraError, Result};
use crate::frame::FrameData;

use super::source::{FrameSlot, FrameSource};

/// V4L2 camera behind a GStreamer MJPEG pipeline.
///
/// The device already delivers JPEG; samples go straight into the frame slot
/// without a decode step.
pub struct GstCamera {
    config: CameraConfig,
    pipeline: Pipeline,
    slot: Arc<FrameSlot>,
    frame_counter: Arc<AtomicU64>,
    is_running: Arc<AtomicBool>,
    capture_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl GstCamera {
    pub fn new(config: CameraConfig) -> Result<Self> {
        gstreamer::init().map_err(|e| CameraError::Configuration {
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let description = pipeline_description(&config);
        info!("Creating GStreamer pipeline: {}", description);

        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::Configuration {
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        Ok(Self {
            config,
            pipeline,
            slot: FrameSlot::new(),
            frame_counter: Arc::new(AtomicU64::new(0)),
            is_running: Arc::new(AtomicBool::new(false)),
            capture_task: tokio::sync::Mutex::new(None),
        })
    }

    /// Cycle the pipeline through Ready to verify the device is usable
    /// without starting capture.
    pub fn test_device(&self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Ready)
            .map_err(|e| CameraError::Unavailable {
                details: format!("Device test failed: {}", e),
            })?;
        self.pipeline
            .set_state(gstreamer::State::Null)
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to reset pipeline: {}", e),
            })?;
        debug!("Camera device test successful");
        Ok(())
    }
}

fn pipeline_description(config: &CameraConfig) -> String {
    let (width, height) = config.resolution;
    format!(
        "v4l2src device=/dev/video{} io-mode=mmap do-timestamp=true ! \
         image/jpeg,width={},height={},framerate={}/1 ! \
         queue max-size-buffers=4 leaky=downstream ! \
         appsink name=sink sync=false max-buffers=10 drop=false qos=false enable-last-sample=false emit-signals=false",
        config.index, width, height, config.fps
    )
}

fn store_sample(
    sample: gstreamer::Sample,
    frame_counter: &AtomicU64,
    slot: &FrameSlot,
) -> Result<()> {
    let buffer = sample.buffer().ok_or_else(|| CameraError::CaptureStream {
        details: "No buffer in sample".to_string(),
    })?;
    let caps = sample.caps().ok_or_else(|| CameraError::CaptureStream {
        details: "No caps in sample".to_string(),
    })?;
    let video_info = VideoInfo::from_caps(caps).map_err(|e| CameraError::CaptureStream {
        details: format!("Failed to get video info: {}", e),
    })?;

    let map = buffer
        .map_readable()
        .map_err(|e| CameraError::CaptureStream {
            details: format!("Failed to map buffer: {}", e),
        })?;

    let frame_id = frame_counter.fetch_add(1, Ordering::Relaxed);
    trace!(
        "Captured MJPEG frame {} ({}x{}, {} bytes)",
        frame_id,
        video_info.width(),
        video_info.height(),
        map.len()
    );

    slot.store(FrameData::new(
        frame_id,
        SystemTime::now(),
        map.as_slice().to_vec(),
        video_info.width(),
        video_info.height(),
    ));
    Ok(())
}

#[async_trait]
impl FrameSource for GstCamera {
    async fn start(&self) -> Result<()> {
        if self.is_running.load(Ordering::Relaxed) {
            warn!("Camera capture is already running");
            return Ok(());
        }

        info!(
            "Starting camera capture on /dev/video{} ({}x{} @ {}fps)",
            self.config.index, self.config.resolution.0, self.config.resolution.1, self.config.fps
        );
        self.is_running.store(true, Ordering::Relaxed);

        let pipeline = self.pipeline.clone();
        let slot = Arc::clone(&self.slot);
        let frame_counter = Arc::clone(&self.frame_counter);
        let is_running = Arc::clone(&self.is_running);

        let task = tokio::spawn(async move {
            let appsink = match pipeline
                .by_name("sink")
                .and_then(|e| e.downcast::<AppSink>().ok())
            {
                Some(sink) => sink,
                None => {
                    error!("Pipeline has no usable appsink; capture aborted");
                    is_running.store(false, Ordering::Relaxed);
                    return;
                }
            };

            let (tx, mut rx) = mpsc::unbounded_channel();
            appsink.set_callbacks(
                gstreamer_app::AppSinkCallbacks::builder()
                    .new_sample(move |appsink| {
                        let sample = appsink
                            .pull_sample()
                            .map_err(|_| gstreamer::FlowError::Eos)?;
                        let _ = tx.send(sample);
                        Ok(gstreamer::FlowSuccess::Ok)
                    })
                    .build(),
            );

            if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
                error!("Failed to start GStreamer pipeline: {}", e);
                is_running.store(false, Ordering::Relaxed);
                return;
            }
            info!("GStreamer pipeline started");

            let mut last_sample_time = tokio::time::Instant::now();
            let mut watchdog = tokio::time::interval(Duration::from_secs(1));
            let watchdog_timeout = Duration::from_secs(5);

            while is_running.load(Ordering::Relaxed) {
                tokio::select! {
                    sample = rx.recv() => {
                        if let Some(sample) = sample {
                            if let Err(e) = store_sample(sample, &frame_counter, &slot) {
                                error!("Error processing camera sample: {}", e);
                            }
                            last_sample_time = tokio::time::Instant::now();
                        }
                    }
                    _ = watchdog.tick() => {
                        if last_sample_time.elapsed() >= watchdog_timeout {
                            warn!(
                                "No camera frames for {:?}; restarting pipeline",
                                watchdog_timeout
                            );
                            let _ = pipeline.set_state(gstreamer::State::Null);
                            if let Err(e) = pipeline.set_state(gstreamer::State::Playing) {
                                error!("Failed to restart GStreamer pipeline: {}", e);
                            } else {
                                last_sample_time = tokio::time::Instant::now();
                            }
                        }
                    }
                }
            }

            let _ = pipeline.set_state(gstreamer::State::Null);
            info!("Camera capture loop stopped");
        });

        *self.capture_task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if !self.is_running.load(Ordering::Relaxed) {
            debug!("Camera capture is not running");
            return Ok(());
        }

        info!("Stopping camera capture");
        self.is_running.store(false, Ordering::Relaxed);

        if let Some(task) = self.capture_task.lock().await.take() {
            match tokio::time::timeout(Duration::from_secs(3), task).await {
                Ok(Ok(())) => debug!("Capture task completed"),
                Ok(Err(e)) => error!("Error waiting for capture task: {}", e),
                Err(_) => warn!("Capture task did not complete within timeout"),
            }
        }
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
