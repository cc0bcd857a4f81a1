mod transcode;

#[cfg(test)]
mod tests;

pub use transcode::TranscodeEngine;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::RecordingConfig;
use crate::error::{RecordingError, Result};
use crate::frame::FrameData;
use crate::surface::Surface;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// H.264 in an MP4 container, produced by the transcoder.
    Mp4,
    /// Raw concatenated-JPEG stream, saved when transcoding is unavailable.
    Mjpeg,
}

impl ArtifactFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Mp4 => "mp4",
            ArtifactFormat::Mjpeg => "mjpeg",
        }
    }
}

/// A finished recording held in memory until the caller saves it.
#[derive(Debug, Clone)]
pub struct RecordingArtifact {
    pub file_name: String,
    pub data: Bytes,
    pub format: ArtifactFormat,
}

impl RecordingArtifact {
    /// Write the artifact into `dir`, creating the directory if needed.
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(&self.file_name);
        tokio::fs::write(&path, &self.data).await?;
        info!(
            "Saved recording to {} ({} bytes)",
            path.display(),
            self.data.len()
        );
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PipelineState {
    Idle,
    Recording,
    Finalizing,
}

struct PipelineInner {
    state: PipelineState,
    stream: Vec<u8>,
    frames: u64,
}

/// Records camera frames with the overlay burned in.
///
/// While recording, each animation tick composites the newest camera frame
/// and the overlay surface into one JPEG appended to an in-memory MJPEG
/// stream. `stop` hands the stream to the transcoder; when that fails the
/// raw stream itself becomes the artifact.
pub struct RecordingPipeline {
    config: RecordingConfig,
    engine: Arc<TranscodeEngine>,
    inner: Mutex<PipelineInner>,
}

impl RecordingPipeline {
    pub fn new(config: RecordingConfig) -> Self {
        let engine = Arc::new(TranscodeEngine::new(config.ffmpeg_binary.clone()));
        Self {
            config,
            engine,
            inner: Mutex::new(PipelineInner {
                state: PipelineState::Idle,
                stream: Vec::new(),
                frames: 0,
            }),
        }
    }

    /// Probe the transcoder ahead of the first recording so stop-time
    /// fallbacks are decided early. Failure is logged, not returned: the
    /// MJPEG fallback still works.
    pub async fn preload_transcoder(&self) {
        if let Err(e) = self.engine.load().await {
            warn!("Transcoder unavailable, recordings will fall back to MJPEG: {}", e);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.inner.lock().state == PipelineState::Recording
    }

    pub fn frames_captured(&self) -> u64 {
        self.inner.lock().frames
    }

    /// Begin a new recording.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.state != PipelineState::Idle {
            return Err(RecordingError::AlreadyRecording.into());
        }
        inner.state = PipelineState::Recording;
        inner.stream.clear();
        inner.frames = 0;
        info!("Recording started");
        Ok(())
    }

    /// Composite one tick into the recording. A no-op while idle, so the
    /// animation loop can call it unconditionally.
    pub fn composite_tick(&self, frame: &FrameData, overlay: &Surface) -> Result<()> {
        if self.inner.lock().state != PipelineState::Recording {
            return Ok(());
        }

        // Compositing happens outside the lock; only the append takes it.
        let chunk = composite_frame(frame, overlay, self.config.jpeg_quality)?;

        let mut inner = self.inner.lock();
        if inner.state != PipelineState::Recording {
            return Ok(());
        }
        inner.stream.extend_from_slice(&chunk);
        inner.frames += 1;
        Ok(())
    }

    /// Finish the recording and produce an artifact.
    ///
    /// Stopping an idle pipeline, or one that never composited a frame,
    /// yields no artifact. Transcode failure falls back to the raw MJPEG
    /// stream so the footage is never lost.
    pub async fn stop(&self) -> Result<Option<RecordingArtifact>> {
        let (stream, frames) = {
            let mut inner = self.inner.lock();
            if inner.state != PipelineState::Recording {
                debug!("Recording pipeline is not recording");
                return Ok(None);
            }
            inner.state = PipelineState::Finalizing;
            (std::mem::take(&mut inner.stream), inner.frames)
        };

        let artifact = if frames == 0 {
            warn!("Recording stopped with no composited frames; discarding");
            None
        } else {
            info!("Finalizing recording ({} frames, {} bytes)", frames, stream.len());
            let stamp = Local::now().format("%Y%m%dT%H%M%S");
            match self.engine.convert(&stream, self.config.fps).await {
                Ok(mp4) => Some(RecordingArtifact {
                    file_name: format!("popbox-effect-{}.mp4", stamp),
                    data: Bytes::from(mp4),
                    format: ArtifactFormat::Mp4,
                }),
                Err(e) => {
                    warn!("Transcode failed ({}); keeping raw MJPEG stream", e);
                    Some(RecordingArtifact {
                        file_name: format!("popbox-effect-{}.mjpeg", stamp),
                        data: Bytes::from(stream),
                        format: ArtifactFormat::Mjpeg,
                    })
                }
            }
        };

        self.inner.lock().state = PipelineState::Idle;
        Ok(artifact)
    }

    pub fn output_dir(&self) -> &str {
        &self.config.output_dir
    }
}

/// Decode a camera frame, blend the overlay on top, and re-encode as JPEG.
fn composite_frame(frame: &FrameData, overlay: &Surface, quality: u8) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(&frame.data).map_err(|e| {
        RecordingError::Compositing {
            details: format!("frame decode failed: {}", e),
        }
    })?;
    let mut base = decoded.to_rgba8();

    let scaled = overlay.scaled_to(base.width(), base.height());
    image::imageops::overlay(&mut base, &scaled, 0, 0);

    let rgb = image::DynamicImage::ImageRgba8(base).to_rgb8();
    let mut buffer = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    encoder
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), image::ColorType::Rgb8)
        .map_err(|e| RecordingError::Compositing {
            details: format!("chunk encode failed: {}", e),
        })?;
    Ok(buffer)
}
