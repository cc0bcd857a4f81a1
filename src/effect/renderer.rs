use std::f32::consts::PI;

use rusttype::Font;
use tracing::{debug, warn};

use crate::channel::{ChannelHandle, OutboundEvent};
use crate::surface::Surface;

use super::types::{fade_alpha, DetectionBatch, DetectionRegion, EffectMode, GuideLine, Rgb, RenderConfig};

/// Renders the latest detection working set onto an overlay surface.
///
/// The renderer is a pure function of its last-ingested batch, the active
/// `RenderConfig` snapshot, and the caller-supplied animation phase; `render`
/// has no side effects beyond drawing on the target surface.
pub struct OverlayRenderer {
    config: RenderConfig,
    regions: Vec<DetectionRegion>,
    lines: Vec<GuideLine>,
    frame_counter: u64,
    font: Option<Font<'static>>,
    font_size: f32,
    channel: Option<ChannelHandle>,
}

impl OverlayRenderer {
    pub fn new(config: RenderConfig, font_path: &str, font_size: f32) -> Self {
        let font = load_label_font(font_path);
        Self {
            config,
            regions: Vec::new(),
            lines: Vec::new(),
            frame_counter: 0,
            font,
            font_size,
            channel: None,
        }
    }

    /// Attach the remote channel and push the current sensitivity subset so
    /// the service starts from the active snapshot.
    pub fn attach_channel(&mut self, channel: ChannelHandle) {
        channel.send(OutboundEvent::ConfigUpdate(self.config.sensitivity_subset()));
        self.channel = Some(channel);
    }

    /// Replace the active snapshot atomically and forward the
    /// sensitivity-relevant subset upstream.
    pub fn configure(&mut self, config: RenderConfig) {
        if let Some(channel) = &self.channel {
            channel.send(OutboundEvent::ConfigUpdate(config.sensitivity_subset()));
        }
        self.config = config;
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Replace the whole working set. Each batch is authoritative; nothing
    /// from the previous batch survives.
    pub fn ingest(&mut self, batch: DetectionBatch) {
        debug!(
            regions = batch.boxes.len(),
            lines = batch.lines.len(),
            frame_count = batch.frame_count,
            "Ingested detection batch"
        );
        self.regions = batch.boxes;
        self.lines = batch.lines;
        self.frame_counter = batch.frame_count;
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Redraw the full overlay: clear, guide lines beneath, then every
    /// region in the configured style with its age-based opacity.
    pub fn render(&self, surface: &mut Surface, phase: f32) {
        surface.clear();

        let line_rgb = Rgb::from_hex(&self.config.line_color);
        let region_rgb = Rgb::from_hex(&self.config.region_color);
        let line_alpha = self.config.line_opacity.min(100) as f32 / 100.0;
        let dash = self.config.line_style.dash_pattern();

        for line in &self.lines {
            surface.draw_line(
                (line.x1, line.y1),
                (line.x2, line.y2),
                dash,
                line_rgb,
                line_alpha,
            );
        }

        let size = self.config.region_size as f32;
        for region in &self.regions {
            let alpha = fade_alpha(
                self.frame_counter,
                region.timestamp,
                self.config.fade_duration,
            );
            match self.config.effect_mode {
                EffectMode::Standard => self.draw_standard(surface, region, alpha, size, region_rgb),
                EffectMode::Glow => self.draw_glow(surface, region, alpha, size, region_rgb),
                EffectMode::Layered => self.draw_layered(surface, region, alpha, size, region_rgb),
                EffectMode::Orbit => {
                    self.draw_orbit(surface, region, alpha, size, region_rgb, phase)
                }
            }
        }
    }

    /// Filled background box, colored border, centered label, fixed green
    /// corner marker.
    fn draw_standard(
        &self,
        surface: &mut Surface,
        region: &DetectionRegion,
        alpha: f32,
        size: f32,
        rgb: Rgb,
    ) {
        let (x, y) = (region.x - size / 2.0, region.y - size / 2.0);
        surface.fill_rect(x, y, size, size, Rgb { r: 50, g: 50, b: 50 }, alpha * 0.8);
        surface.stroke_rect(x, y, size, size, 2, rgb, alpha);
        self.draw_label(surface, &region.label, region.x, region.y, rgb, alpha);
        surface.fill_rect(x, y, 8.0, 8.0, Rgb { r: 0, g: 255, b: 0 }, alpha);
    }

    /// Soft halo approximating a drop-shadow blur of `15 + glow_intensity`,
    /// a wide low-opacity outer stroke, and a crisp inner stroke.
    fn draw_glow(
        &self,
        surface: &mut Surface,
        region: &DetectionRegion,
        alpha: f32,
        size: f32,
        rgb: Rgb,
    ) {
        let (x, y) = (region.x - size / 2.0, region.y - size / 2.0);
        let blur = 15.0 + self.config.glow_intensity as f32;

        // Halo rings spread over the blur radius, fading outward.
        let rings = 3;
        for i in 1..=rings {
            let spread = blur * i as f32 / rings as f32;
            let ring_alpha = alpha * 0.15 * (1.0 - (i - 1) as f32 / rings as f32);
            surface.stroke_rect(
                x - spread,
                y - spread,
                size + 2.0 * spread,
                size + 2.0 * spread,
                1,
                rgb,
                ring_alpha,
            );
        }

        surface.stroke_rect(x - 2.0, y - 2.0, size + 4.0, size + 4.0, 4, rgb, alpha * 0.3);
        surface.stroke_rect(x, y, size, size, 2, rgb, alpha);
        self.draw_label(surface, &region.label, region.x, region.y, rgb, alpha);
    }

    /// Three concentric strokes at decreasing opacity and growing size, plus
    /// a top-left corner bracket.
    fn draw_layered(
        &self,
        surface: &mut Surface,
        region: &DetectionRegion,
        alpha: f32,
        size: f32,
        rgb: Rgb,
    ) {
        for i in 0..3 {
            let layer_alpha = alpha * (1.0 - i as f32 * 0.3);
            let layer_size = size + i as f32 * 4.0;
            surface.stroke_rect(
                region.x - layer_size / 2.0,
                region.y - layer_size / 2.0,
                layer_size,
                layer_size,
                1,
                rgb,
                layer_alpha * 0.4,
            );
        }

        let corner = 8.0;
        let (x, y) = (region.x - size / 2.0, region.y - size / 2.0);
        surface.draw_line((x, y + corner), (x, y), None, rgb, alpha);
        surface.draw_line((x, y), (x + corner, y), None, rgb, alpha);
        surface.draw_line((x + 1.0, y + corner), (x + 1.0, y), None, rgb, alpha);
        surface.draw_line((x, y + 1.0), (x + corner, y + 1.0), None, rgb, alpha);

        self.draw_label(surface, &region.label, region.x, region.y, rgb, alpha);
    }

    /// Low-opacity core plus eight satellite points on an oscillating
    /// circle. The oscillation phase comes from the animation driver so the
    /// draw itself stays deterministic.
    fn draw_orbit(
        &self,
        surface: &mut Surface,
        region: &DetectionRegion,
        alpha: f32,
        size: f32,
        rgb: Rgb,
        phase: f32,
    ) {
        surface.fill_rect(
            region.x - size / 4.0,
            region.y - size / 4.0,
            size / 2.0,
            size / 2.0,
            rgb,
            alpha * 0.3,
        );

        for i in 0..8 {
            let angle = i as f32 * 2.0 * PI / 8.0;
            let distance = size / 2.0 + (phase + i as f32).sin() * 10.0;
            let px = region.x + angle.cos() * distance;
            let py = region.y + angle.sin() * distance;
            surface.fill_rect(px - 2.0, py - 2.0, 4.0, 4.0, rgb, alpha * 0.6);
        }

        self.draw_label(surface, &region.label, region.x, region.y, rgb, alpha);
    }

    fn draw_label(
        &self,
        surface: &mut Surface,
        text: &str,
        cx: f32,
        cy: f32,
        rgb: Rgb,
        alpha: f32,
    ) {
        if let Some(font) = &self.font {
            surface.draw_text_centered(font, self.font_size, text, cx, cy, rgb, alpha);
        }
    }
}

/// Load the label font, degrading to label-free rendering when the font is
/// not present on the host.
fn load_label_font(path: &str) -> Option<Font<'static>> {
    match std::fs::read(path) {
        Ok(bytes) => match Font::try_from_vec(bytes) {
            Some(font) => Some(font),
            None => {
                warn!("Failed to parse label font '{}'; labels disabled", path);
                None
            }
        },
        Err(e) => {
            warn!(
                "Label font '{}' unavailable ({}); labels disabled",
                path, e
            );
            None
        }
    }
}
