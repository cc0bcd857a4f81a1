pub mod app;
pub mod camera;
pub mod channel;
pub mod config;
pub mod effect;
pub mod error;
pub mod frame;
pub mod recording;
pub mod streamer;
pub mod surface;

pub use app::PopboxApp;
pub use camera::{FrameSlot, FrameSource, TestPatternSource};
pub use channel::{BatchMailbox, ChannelHandle, ConnectionStatus, EventChannel, InboundEvent, OutboundEvent};
pub use config::PopboxConfig;
pub use effect::{
    DetectionBatch, DetectionRegion, EffectMode, GuideLine, LineStyle, OverlayRenderer,
    RenderConfig, SensitivityConfig,
};
pub use error::{PopboxError, Result};
pub use frame::FrameData;
pub use recording::{ArtifactFormat, RecordingArtifact, RecordingPipeline, TranscodeEngine};
pub use streamer::FrameStreamer;
pub use surface::Surface;

#[cfg(all(target_os = "linux", feature = "gstreamer-capture"))]
pub use camera::GstCamera;
