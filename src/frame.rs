use std::sync::Arc;
use std::time::SystemTime;

/// A single captured video frame, JPEG-encoded.
///
/// Frames are shared across the streamer and the recording pipeline, so the
/// payload lives behind an `Arc` and cloning a frame is cheap.
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Monotonic capture counter assigned by the source
    pub id: u64,
    /// Timestamp when the frame was captured
    pub timestamp: SystemTime,
    /// JPEG-encoded frame payload
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
}

impl FrameData {
    pub fn new(id: u64, timestamp: SystemTime, data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            id,
            timestamp,
            data: Arc::new(data),
            width,
            height,
        }
    }

    /// Frame age relative to now, in milliseconds.
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
