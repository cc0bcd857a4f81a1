use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::effect::{DetectionBatch, SensitivityConfig};
use crate::error::ChannelError;

/// JSON envelope carried in every WebSocket text message, both directions:
/// `{"event": "<name>", "data": <payload>}`.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    data: Value,
}

/// Events this client emits to the analysis service.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Sensitivity-relevant configuration subset.
    ConfigUpdate(SensitivityConfig),
    /// One sampled camera frame as a base64 JPEG data URL.
    VideoFrame { frame: String },
}

impl OutboundEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundEvent::ConfigUpdate(_) => "config_update",
            OutboundEvent::VideoFrame { .. } => "video_frame",
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let data = match self {
            OutboundEvent::ConfigUpdate(config) => serde_json::to_value(config)?,
            OutboundEvent::VideoFrame { frame } => serde_json::json!({ "frame": frame }),
        };
        serde_json::to_string(&Envelope {
            event: self.event_name().to_string(),
            data,
        })
    }
}

/// Events the analysis service emits to this client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// A full detection batch superseding the previous one.
    PopboxData(DetectionBatch),
    /// Human-readable service status line.
    Status { msg: String },
    /// Acknowledgement of a config_update.
    ConfigApplied { status: String },
}

pub fn parse_inbound(text: &str) -> Result<InboundEvent, ChannelError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(|e| ChannelError::Protocol {
        details: format!("invalid envelope: {}", e),
    })?;

    match envelope.event.as_str() {
        "popbox_data" => {
            let batch: DetectionBatch =
                serde_json::from_value(envelope.data).map_err(|e| ChannelError::Protocol {
                    details: format!("invalid popbox_data payload: {}", e),
                })?;
            Ok(InboundEvent::PopboxData(batch))
        }
        "status" => {
            #[derive(Deserialize)]
            struct Status {
                msg: String,
            }
            let status: Status =
                serde_json::from_value(envelope.data).map_err(|e| ChannelError::Protocol {
                    details: format!("invalid status payload: {}", e),
                })?;
            Ok(InboundEvent::Status { msg: status.msg })
        }
        "config_applied" => {
            #[derive(Deserialize)]
            struct Applied {
                status: String,
            }
            let applied: Applied =
                serde_json::from_value(envelope.data).map_err(|e| ChannelError::Protocol {
                    details: format!("invalid config_applied payload: {}", e),
                })?;
            Ok(InboundEvent::ConfigApplied {
                status: applied.status,
            })
        }
        other => Err(ChannelError::Protocol {
            details: format!("unknown event '{}'", other),
        }),
    }
}
