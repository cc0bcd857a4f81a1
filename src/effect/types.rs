use serde::{Deserialize, Serialize};

/// A region of interest reported by the remote analysis service.
///
/// Coordinates are the region center in source-frame pixels. The `timestamp`
/// is the service's frame counter at detection time, used only for fade math.
/// On the wire the label field is called `hex_code` (the service labels each
/// region with a random hex string).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRegion {
    pub x: f32,
    pub y: f32,
    #[serde(rename = "hex_code")]
    pub label: String,
    pub timestamp: u64,
}

/// A guide line reported alongside regions. Redrawn verbatim each tick,
/// never faded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuideLine {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// One inbound event batch. Each batch is authoritative and fully supersedes
/// the previous one; there is no incremental merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    #[serde(default)]
    pub boxes: Vec<DetectionRegion>,
    #[serde(default)]
    pub lines: Vec<GuideLine>,
    pub frame_count: u64,
}

/// Mutually exclusive visual style applied to every rendered region.
/// Serialized with the remote service's mode names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EffectMode {
    #[default]
    #[serde(rename = "popbox")]
    Standard,
    #[serde(rename = "neon")]
    Glow,
    #[serde(rename = "cyberpunk")]
    Layered,
    #[serde(rename = "particles")]
    Orbit,
}

/// Guide line stroke style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineStyle {
    Solid,
    Dashed,
    Dotted,
}

impl LineStyle {
    /// Dash pattern as (on, off) pixel lengths; `None` means solid.
    pub fn dash_pattern(&self) -> Option<(f32, f32)> {
        match self {
            LineStyle::Solid => None,
            LineStyle::Dashed => Some((5.0, 5.0)),
            LineStyle::Dotted => Some((2.0, 3.0)),
        }
    }
}

/// Immutable per-tick style snapshot. Replaced whole via a single update
/// entry point; never patched field by field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    pub sensitivity: u32,
    pub min_area: u32,
    pub max_regions: u32,
    pub region_color: String,
    pub line_color: String,
    pub line_style: LineStyle,
    pub line_opacity: u8,
    pub fade_duration: u32,
    pub region_size: u32,
    pub effect_mode: EffectMode,
    pub glow_intensity: u32,
}

impl RenderConfig {
    /// The subset of the snapshot the remote service consumes.
    pub fn sensitivity_subset(&self) -> SensitivityConfig {
        SensitivityConfig {
            sensitivity: self.sensitivity,
            min_area: self.min_area,
            max_boxes: self.max_regions,
            fade_duration: self.fade_duration,
        }
    }
}

/// Detection parameters forwarded upstream on every `config_update`.
/// Field names follow the service's camelCase contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityConfig {
    pub sensitivity: u32,
    pub min_area: u32,
    pub max_boxes: u32,
    pub fade_duration: u32,
}

/// Additive RGB triple resolved from a hex color string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Parse a `#rrggbb` (leading `#` optional) hex color. Invalid input
    /// resolves to white, matching the service's color fallback.
    pub fn from_hex(hex: &str) -> Rgb {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Rgb::WHITE;
        }
        let parse = |s: &str| u8::from_str_radix(s, 16).unwrap_or(255);
        Rgb {
            r: parse(&hex[0..2]),
            g: parse(&hex[2..4]),
            b: parse(&hex[4..6]),
        }
    }
}

/// Age-based region opacity: linear fade from 1.0 toward a 0.3 floor over
/// `fade_duration` frame-counter units. The floor holds indefinitely; a
/// region only leaves the screen when the service stops re-sending it.
pub fn fade_alpha(frame_counter: u64, timestamp: u64, fade_duration: u32) -> f32 {
    let delta = frame_counter.saturating_sub(timestamp) as f32;
    let fade = fade_duration.max(1) as f32;
    (1.0 - delta / fade).clamp(0.3, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_alpha_is_monotone_and_bounded() {
        let fade = 30;
        let mut last = f32::INFINITY;
        for delta in 0..200u64 {
            let alpha = fade_alpha(10 + delta, 10, fade);
            assert!(alpha <= last, "alpha must be non-increasing in age");
            assert!((0.3..=1.0).contains(&alpha));
            last = alpha;
        }
    }

    #[test]
    fn fade_alpha_matches_reference_points() {
        // Fresh region: full opacity.
        assert_eq!(fade_alpha(10, 10, 30), 1.0);
        // Half way through the fade window.
        assert_eq!(fade_alpha(25, 10, 30), 0.5);
        // Past the window the floor holds.
        assert_eq!(fade_alpha(100, 10, 30), 0.3);
    }

    #[test]
    fn floor_holds_for_stale_regions() {
        // A region the service never supersedes fades to 0.3 and stays there
        // forever; it never fully disappears on its own.
        assert_eq!(fade_alpha(u64::MAX, 0, 30), 0.3);
    }

    #[test]
    fn fade_alpha_tolerates_counter_gaps_and_skew() {
        // Gap-tolerant: huge counter jumps just pin the floor.
        assert_eq!(fade_alpha(1_000_000, 10, 30), 0.3);
        // Timestamp ahead of the counter clamps to full opacity.
        assert_eq!(fade_alpha(5, 10, 30), 1.0);
    }

    #[test]
    fn hex_parsing_and_fallback() {
        assert_eq!(Rgb::from_hex("#ff0080"), Rgb { r: 255, g: 0, b: 128 });
        assert_eq!(Rgb::from_hex("00ff00"), Rgb { r: 0, g: 255, b: 0 });
        assert_eq!(Rgb::from_hex("not-a-color"), Rgb::WHITE);
        assert_eq!(Rgb::from_hex("#fff"), Rgb::WHITE);
    }

    #[test]
    fn line_styles_carry_expected_dash_patterns() {
        assert_eq!(LineStyle::Solid.dash_pattern(), None);
        assert_eq!(LineStyle::Dashed.dash_pattern(), Some((5.0, 5.0)));
        assert_eq!(LineStyle::Dotted.dash_pattern(), Some((2.0, 3.0)));
    }

    #[test]
    fn batch_deserializes_wire_names() {
        let json = r#"{
            "boxes": [{"x": 100, "y": 100, "hex_code": "a1b2c3", "timestamp": 10}],
            "lines": [{"x1": 0, "y1": 0, "x2": 50, "y2": 50}],
            "frame_count": 12
        }"#;
        let batch: DetectionBatch = serde_json::from_str(json).unwrap();
        assert_eq!(batch.boxes[0].label, "a1b2c3");
        assert_eq!(batch.frame_count, 12);
        assert_eq!(batch.lines.len(), 1);
    }

    #[test]
    fn empty_batch_defaults_boxes_and_lines() {
        let batch: DetectionBatch = serde_json::from_str(r#"{"frame_count": 3}"#).unwrap();
        assert!(batch.boxes.is_empty());
        assert!(batch.lines.is_empty());
    }

    #[test]
    fn effect_modes_use_service_names() {
        assert_eq!(
            serde_json::to_string(&EffectMode::Orbit).unwrap(),
            "\"particles\""
        );
        let mode: EffectMode = serde_json::from_str("\"neon\"").unwrap();
        assert_eq!(mode, EffectMode::Glow);
    }

    #[test]
    fn sensitivity_subset_uses_camel_case() {
        let config = RenderConfig {
            sensitivity: 30,
            min_area: 500,
            max_regions: 10,
            region_color: "#ffffff".into(),
            line_color: "#ffffff".into(),
            line_style: LineStyle::Dashed,
            line_opacity: 60,
            fade_duration: 30,
            region_size: 80,
            effect_mode: EffectMode::Standard,
            glow_intensity: 0,
        };
        let json = serde_json::to_value(config.sensitivity_subset()).unwrap();
        assert_eq!(json["minArea"], 500);
        assert_eq!(json["maxBoxes"], 10);
        assert_eq!(json["fadeDuration"], 30);
    }
}
