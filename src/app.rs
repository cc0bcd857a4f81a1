use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::camera::FrameSource;
#[cfg(not(all(target_os = "linux", feature = "gstreamer-capture")))]
use crate::camera::TestPatternSource;
use crate::channel::{BatchMailbox, EventChannel};
use crate::config::{EffectConfig, PopboxConfig};
use crate::effect::OverlayRenderer;
use crate::error::{RecordingError, Result};
use crate::recording::RecordingPipeline;
use crate::streamer::FrameStreamer;
use crate::surface::Surface;

#[cfg(all(target_os = "linux", feature = "gstreamer-capture"))]
use crate::camera::GstCamera;

/// Renderer state shared between the animation loop and the control surface.
struct RenderShared {
    renderer: Mutex<OverlayRenderer>,
    overlay: Mutex<Surface>,
}

/// Wires the whole client together: camera, channel, streamer, renderer and
/// recorder, driven by one ordered animation loop.
///
/// The loop runs at the recording rate and performs, in order: advance the
/// animation phase, ingest the newest detection batch, redraw the overlay,
/// then composite into the recording when one is active. The strict order
/// keeps recorded frames consistent with what the overlay showed that tick.
pub struct PopboxApp {
    config: PopboxConfig,
    source: Arc<dyn FrameSource>,
    channel: Arc<EventChannel>,
    streamer: Arc<FrameStreamer>,
    recorder: Arc<RecordingPipeline>,
    mailbox: Arc<BatchMailbox>,
    shared: Arc<RenderShared>,
    cancel: CancellationToken,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl PopboxApp {
    pub fn new(config: PopboxConfig) -> Result<Self> {
        let source = build_source(&config)?;
        let channel = Arc::new(EventChannel::new(config.channel.clone()));
        let streamer = Arc::new(FrameStreamer::new(config.streamer.clone()));
        let recorder = Arc::new(RecordingPipeline::new(config.recording.clone()));
        let mailbox = channel.mailbox();

        let renderer = OverlayRenderer::new(
            config.effect.render_config(),
            &config.effect.label_font_path,
            config.effect.label_font_size,
        );
        let (width, height) = source.dimensions();
        let shared = Arc::new(RenderShared {
            renderer: Mutex::new(renderer),
            overlay: Mutex::new(Surface::new(width, height)),
        });

        Ok(Self {
            config,
            source,
            channel,
            streamer,
            recorder,
            mailbox,
            shared,
            cancel: CancellationToken::new(),
            tasks: tokio::sync::Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        })
    }

    /// Start every component and the animation loop.
    pub async fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("Application is already started");
            return Ok(());
        }

        info!("Starting popbox client");
        self.channel.connect();
        self.shared
            .renderer
            .lock()
            .attach_channel(self.channel.handle());

        // A failing camera leaves streaming and recording dormant; the
        // channel and overlay still run so detections keep rendering.
        if let Err(e) = self.source.start().await {
            error!("Camera failed to start: {}", e);
        }

        self.streamer.attach_source(Arc::clone(&self.source));
        self.streamer.attach_channel(self.channel.handle());

        self.recorder.preload_transcoder().await;

        let mut tasks = self.tasks.lock().await;
        tasks.push(self.spawn_streamer_starter());
        tasks.push(self.spawn_animation_loop());
        tasks.push(self.spawn_status_logger());

        info!("Popbox client started");
        Ok(())
    }

    /// The streamer refuses to start until the camera has produced a frame,
    /// so wait for readiness and start it then.
    fn spawn_streamer_starter(&self) -> JoinHandle<()> {
        let streamer = Arc::clone(&self.streamer);
        let source = Arc::clone(&self.source);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(50));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = interval.tick() => {}
                }
                if source.is_ready() {
                    if let Err(e) = streamer.start().await {
                        error!("Failed to start frame streamer: {}", e);
                    }
                    return;
                }
            }
        })
    }

    fn spawn_animation_loop(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let mailbox = Arc::clone(&self.mailbox);
        let recorder = Arc::clone(&self.recorder);
        let source = Arc::clone(&self.source);
        let cancel = self.cancel.clone();
        let fps = self.config.recording.fps.max(1);

        tokio::spawn(async move {
            let tick = Duration::from_millis((1000 / fps as u64).max(1));
            let tick_secs = tick.as_secs_f32();
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut phase = 0.0f32;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                phase += tick_secs * 2.0;
                if let Some(batch) = mailbox.take() {
                    shared.renderer.lock().ingest(batch);
                }

                let renderer = shared.renderer.lock();
                let mut overlay = shared.overlay.lock();
                renderer.render(&mut overlay, phase);

                if recorder.is_recording() {
                    if let Some(frame) = source.latest_frame() {
                        if let Err(e) = recorder.composite_tick(&frame, &overlay) {
                            warn!("Skipping recording tick: {}", e);
                        }
                    }
                }
            }
            debug!("Animation loop stopped");
        })
    }

    fn spawn_status_logger(&self) -> JoinHandle<()> {
        let mut status = self.channel.status();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = status.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        info!("Analysis service connection: {:?}", *status.borrow());
                    }
                }
            }
        })
    }

    /// Begin recording the composited output. Requires at least one
    /// captured frame so the recording never opens on a black screen.
    pub fn start_recording(&self) -> Result<()> {
        if !self.source.is_ready() {
            return Err(RecordingError::NoSource.into());
        }
        self.recorder.start()?;
        Ok(())
    }

    /// Stop recording and save the artifact into the configured output
    /// directory. Returns the saved path, or `None` when nothing was
    /// recorded.
    pub async fn stop_recording(&self) -> Result<Option<PathBuf>> {
        let artifact = match self.recorder.stop().await? {
            Some(artifact) => artifact,
            None => return Ok(None),
        };
        let path = artifact.save(self.recorder.output_dir()).await?;
        Ok(Some(path))
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn is_streaming(&self) -> bool {
        self.streamer.is_streaming()
    }

    /// Replace the effect settings at runtime. The renderer forwards the
    /// sensitivity subset to the analysis service.
    pub fn configure(&self, effect: EffectConfig) {
        self.shared
            .renderer
            .lock()
            .configure(effect.render_config());
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    /// Block until a shutdown signal arrives, then stop everything.
    pub async fn run(&self) -> Result<()> {
        tokio::select! {
            result = signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Received shutdown signal"),
                    Err(e) => error!("Failed to listen for shutdown signal: {}", e),
                }
            }
            _ = self.cancel.cancelled() => {}
        }
        self.stop().await
    }

    /// Stop all components in reverse dependency order, finalizing any
    /// recording still in flight.
    pub async fn stop(&self) -> Result<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Stopping popbox client");

        if self.recorder.is_recording() {
            match self.stop_recording().await {
                Ok(Some(path)) => info!("Recording finalized at {}", path.display()),
                Ok(None) => {}
                Err(e) => error!("Failed to finalize recording: {}", e),
            }
        }

        self.cancel.cancel();
        for task in self.tasks.lock().await.drain(..) {
            if let Err(e) = tokio::time::timeout(Duration::from_secs(3), task).await {
                warn!("Background task did not stop within timeout: {}", e);
            }
        }

        self.streamer.stop().await?;
        if let Err(e) = self.source.stop().await {
            warn!("Camera stop reported an error: {}", e);
        }
        self.channel.close().await;

        info!("Popbox client stopped");
        Ok(())
    }
}

#[cfg(all(target_os = "linux", feature = "gstreamer-capture"))]
fn build_source(config: &PopboxConfig) -> Result<Arc<dyn FrameSource>> {
    Ok(Arc::new(GstCamera::new(config.camera.clone())?))
}

#[cfg(not(all(target_os = "linux", feature = "gstreamer-capture")))]
fn build_source(config: &PopboxConfig) -> Result<Arc<dyn FrameSource>> {
    info!("Camera capture not compiled in; using the test pattern source");
    Ok(Arc::new(TestPatternSource::new(config.camera.clone())))
}
