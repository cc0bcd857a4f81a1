mod renderer;
mod types;


pub use renderer::OverlayRenderer;
pub use types::{
    fade_alpha, DetectionBatch, DetectionRegion, EffectMode, GuideLine, LineStyle, Rgb,
    RenderConfig, SensitivityConfig,
};
