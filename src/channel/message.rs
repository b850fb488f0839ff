use serde::{Deserialize, Serialize};

/// Inbound message, already classified. Anything that is not a well-formed
/// `injectPrompt` or `ping` is [`InboundMessage::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    InjectPrompt { prompt: String },
    Ping,
    Unrecognized,
}

#[derive(Deserialize)]
#[serde(tag = "action")]
enum WireMessage {
    #[serde(rename = "injectPrompt")]
    InjectPrompt { prompt: String },
    #[serde(rename = "ping")]
    Ping,
}

impl InboundMessage {
    pub fn parse(payload: &serde_json::Value) -> Self {
        match WireMessage::deserialize(payload) {
            Ok(WireMessage::InjectPrompt { prompt }) if !prompt.is_empty() => {
                InboundMessage::InjectPrompt { prompt }
            }
            Ok(WireMessage::InjectPrompt { .. }) => {
                tracing::debug!("injectPrompt with an empty prompt");
                InboundMessage::Unrecognized
            }
            Ok(WireMessage::Ping) => InboundMessage::Ping,
            Err(e) => {
                tracing::debug!(error = %e, "unrecognized message shape");
                InboundMessage::Unrecognized
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Alive,
    UnknownAction,
}

/// Exactly one of these answers every inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Injection { success: bool },
    Status { status: ReplyStatus },
}

impl Reply {
    pub fn injection(success: bool) -> Self {
        Reply::Injection { success }
    }

    pub fn alive() -> Self {
        Reply::Status {
            status: ReplyStatus::Alive,
        }
    }

    pub fn unknown_action() -> Self {
        Reply::Status {
            status: ReplyStatus::UnknownAction,
        }
    }
}
