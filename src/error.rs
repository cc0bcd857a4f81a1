use thiserror::Error;

#[derive(Error, Debug)]
pub enum PopboxError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecordingError),

    #[error("Transcode error: {0}")]
    Transcode(#[from] TranscodeError),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl PopboxError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Capture device failures. These are user-visible: streaming and recording
/// stay disabled until the device is retried.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Camera device unavailable or permission denied: {details}")]
    Unavailable { details: String },

    #[error("Capture stream error: {details}")]
    CaptureStream { details: String },
}

/// Remote channel failures. Never fatal; reflected in connection status only.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Malformed inbound event: {details}")]
    Protocol { details: String },
}

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("No video source available for recording")]
    NoSource,

    #[error("Recording already in progress")]
    AlreadyRecording,

    #[error("Compositing failed: {details}")]
    Compositing { details: String },
}

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Transcode engine unavailable: {details}")]
    EngineUnavailable { details: String },

    #[error("Conversion failed: {details}")]
    Conversion { details: String },
}

pub type Result<T> = std::result::Result<T, PopboxError>;
