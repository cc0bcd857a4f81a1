use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::frame::FrameData;

/// A camera-like producer of JPEG frames.
///
/// Sources push into a shared [`FrameSlot`]; consumers (the streamer and the
/// recording compositor) pull the newest frame on their own schedule, so a
/// slow consumer never backs up capture.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Begin producing frames. Calling start on a running source is a no-op.
    async fn start(&self) -> Result<()>;

    /// Stop producing frames and wait for the capture loop to wind down.
    async fn stop(&self) -> Result<()>;

    /// True once the source is running and has produced at least one frame.
    fn is_ready(&self) -> bool;

    /// Native capture resolution.
    fn dimensions(&self) -> (u32, u32);

    /// The newest captured frame, if any.
    fn latest_frame(&self) -> Option<FrameData>;
}

/// Single-slot latest-frame exchange between a capture loop and consumers.
/// Overwrites on every store; frames are cheap to clone out.
#[derive(Default)]
pub struct FrameSlot {
    slot: Mutex<Option<FrameData>>,
}

impl FrameSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn store(&self, frame: FrameData) {
        *self.slot.lock() = Some(frame);
    }

    pub fn load(&self) -> Option<FrameData> {
        self.slot.lock().clone()
    }
}
