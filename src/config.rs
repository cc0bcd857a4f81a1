use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

use crate::effect::{EffectMode, LineStyle, RenderConfig};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PopboxConfig {
    pub camera: CameraConfig,
    pub channel: ChannelConfig,
    pub streamer: StreamerConfig,
    pub effect: EffectConfig,
    pub recording: RecordingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Camera device index (e.g., 0 for /dev/video0)
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Requested capture resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Requested frames per second
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChannelConfig {
    /// WebSocket URL of the remote analysis service
    #[serde(default = "default_channel_url")]
    pub url: String,

    /// Delay between reconnect attempts in milliseconds
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamerConfig {
    /// Sampling period in milliseconds (100 ms = 10 Hz upstream)
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// JPEG quality for outbound frames (0-100)
    #[serde(default = "default_stream_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Maximum width of outbound frames; larger frames are downscaled
    #[serde(default = "default_stream_max_width")]
    pub max_width: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EffectConfig {
    /// Motion sensitivity threshold forwarded to the remote service
    #[serde(default = "default_sensitivity")]
    pub sensitivity: u32,

    /// Minimum contour area forwarded to the remote service
    #[serde(default = "default_min_area")]
    pub min_area: u32,

    /// Maximum number of tracked regions forwarded to the remote service
    #[serde(default = "default_max_regions")]
    pub max_regions: u32,

    /// Region color as a hex string
    #[serde(default = "default_color")]
    pub region_color: String,

    /// Guide line color as a hex string
    #[serde(default = "default_color")]
    pub line_color: String,

    /// Guide line stroke style
    #[serde(default = "default_line_style")]
    pub line_style: LineStyle,

    /// Guide line opacity in percent (0-100)
    #[serde(default = "default_line_opacity")]
    pub line_opacity: u8,

    /// Region fade duration in frame-counter units
    #[serde(default = "default_fade_duration")]
    pub fade_duration: u32,

    /// Region box size in pixels
    #[serde(default = "default_region_size")]
    pub region_size: u32,

    /// Visual style applied to every region
    #[serde(default)]
    pub effect_mode: EffectMode,

    /// Extra blur radius for the glow style
    #[serde(default)]
    pub glow_intensity: u32,

    /// TrueType font used for region labels
    #[serde(default = "default_label_font_path")]
    pub label_font_path: String,

    /// Font size for region labels
    #[serde(default = "default_label_font_size")]
    pub label_font_size: f32,
}

impl EffectConfig {
    /// Build the immutable per-tick render snapshot from this section.
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            sensitivity: self.sensitivity,
            min_area: self.min_area,
            max_regions: self.max_regions,
            region_color: self.region_color.clone(),
            line_color: self.line_color.clone(),
            line_style: self.line_style,
            line_opacity: self.line_opacity,
            fade_duration: self.fade_duration,
            region_size: self.region_size,
            effect_mode: self.effect_mode,
            glow_intensity: self.glow_intensity,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RecordingConfig {
    /// Compositing rate in frames per second
    #[serde(default = "default_recording_fps")]
    pub fps: u32,

    /// JPEG quality for composited frames (0-100)
    #[serde(default = "default_recording_jpeg_quality")]
    pub jpeg_quality: u8,

    /// Directory where finished artifacts are saved
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Transcoder binary to invoke
    #[serde(default = "default_ffmpeg_binary")]
    pub ffmpeg_binary: String,
}

impl PopboxConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("popbox.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let defaults = toml::to_string(&Self::default())
            .map_err(|e| ConfigError::Message(format!("Failed to render defaults: {}", e)))?;

        let settings = Config::builder()
            .add_source(File::from_str(&defaults, config::FileFormat::Toml))
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("POPBOX").separator("__"))
            .build()?;

        let config: PopboxConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if self.streamer.sample_interval_ms == 0 {
            return Err(ConfigError::Message(
                "Streamer sample interval must be greater than 0".to_string(),
            ));
        }

        if self.streamer.jpeg_quality == 0 || self.streamer.jpeg_quality > 100 {
            return Err(ConfigError::Message(
                "Streamer JPEG quality must be between 1 and 100".to_string(),
            ));
        }

        if self.effect.fade_duration == 0 {
            return Err(ConfigError::Message(
                "Effect fade duration must be greater than 0".to_string(),
            ));
        }

        if self.effect.line_opacity > 100 {
            return Err(ConfigError::Message(
                "Line opacity must be between 0 and 100".to_string(),
            ));
        }

        if self.recording.fps == 0 {
            return Err(ConfigError::Message(
                "Recording fps must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML (used by --print-config)
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

impl Default for PopboxConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
            },
            channel: ChannelConfig {
                url: default_channel_url(),
                reconnect_delay_ms: default_reconnect_delay_ms(),
            },
            streamer: StreamerConfig {
                sample_interval_ms: default_sample_interval_ms(),
                jpeg_quality: default_stream_jpeg_quality(),
                max_width: default_stream_max_width(),
            },
            effect: EffectConfig {
                sensitivity: default_sensitivity(),
                min_area: default_min_area(),
                max_regions: default_max_regions(),
                region_color: default_color(),
                line_color: default_color(),
                line_style: default_line_style(),
                line_opacity: default_line_opacity(),
                fade_duration: default_fade_duration(),
                region_size: default_region_size(),
                effect_mode: EffectMode::default(),
                glow_intensity: 0,
                label_font_path: default_label_font_path(),
                label_font_size: default_label_font_size(),
            },
            recording: RecordingConfig {
                fps: default_recording_fps(),
                jpeg_quality: default_recording_jpeg_quality(),
                output_dir: default_output_dir(),
                ffmpeg_binary: default_ffmpeg_binary(),
            },
        }
    }
}

fn default_camera_index() -> u32 {
    0
}

fn default_camera_resolution() -> (u32, u32) {
    (1280, 720)
}

fn default_camera_fps() -> u32 {
    30
}

fn default_channel_url() -> String {
    "ws://localhost:8080/ws".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    2000
}

fn default_sample_interval_ms() -> u64 {
    100
}

fn default_stream_jpeg_quality() -> u8 {
    70
}

fn default_stream_max_width() -> u32 {
    640
}

fn default_sensitivity() -> u32 {
    30
}

fn default_min_area() -> u32 {
    500
}

fn default_max_regions() -> u32 {
    10
}

fn default_color() -> String {
    "#ffffff".to_string()
}

fn default_line_style() -> LineStyle {
    LineStyle::Dashed
}

fn default_line_opacity() -> u8 {
    60
}

fn default_fade_duration() -> u32 {
    30
}

fn default_region_size() -> u32 {
    80
}

fn default_label_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf".to_string()
}

fn default_label_font_size() -> f32 {
    12.0
}

fn default_recording_fps() -> u32 {
    30
}

fn default_recording_jpeg_quality() -> u8 {
    80
}

fn default_output_dir() -> String {
    ".".to_string()
}

fn default_ffmpeg_binary() -> String {
    "ffmpeg".to_string()
}
