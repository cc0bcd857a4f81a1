#[cfg(all(target_os = "linux", feature = "gstreamer-capture"))]
mod gst;
mod source;
mod test_pattern;

#[cfg(test)]
mod tests;

#[cfg(all(target_os = "linux", feature = "gstreamer-capture"))]
pub use gst::GstCamera;
pub use source::{FrameSlot, FrameSource};
pub use test_pattern::TestPatternSource;
