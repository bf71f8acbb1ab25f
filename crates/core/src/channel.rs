//! # Message Channel
//!
//! Structured messages exchanged with the user, and the sink the pipeline
//! writes them to. Transport (websocket, terminal) lives in the server.
//!
//! | direction | kind         | fields                                        |
//! |-----------|--------------|-----------------------------------------------|
//! | in        | `query`      | text                                          |
//! | in        | `answer`     | id, text                                      |
//! | out       | `question`   | id, text                                      |
//! | out       | `answer_ack` | id, accepted, message                         |
//! | out       | `result`     | products, recommended, message, flow, steps   |
//! | out       | `error`      | message                                       |
//! | out       | `ack`        | message                                       |

use crate::error::ChannelError;
use crate::state::{Product, ShopResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Messages received from the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Start a new run
    Query { text: String },
    /// Answer to a specific question
    Answer { id: String, text: String },
}

/// Messages sent to the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Question {
        id: String,
        text: String,
    },
    AnswerAck {
        id: String,
        accepted: bool,
        message: String,
    },
    Result {
        products: Vec<Product>,
        recommended: Option<Product>,
        message: Option<String>,
        flow: Vec<String>,
        steps: u32,
    },
    Error {
        message: String,
    },
    Ack {
        message: String,
    },
}

impl OutboundMessage {
    pub fn result(result: ShopResult) -> Self {
        Self::Result {
            products: result.products,
            recommended: result.recommended,
            message: result.message,
            flow: result.flow,
            steps: result.steps,
        }
    }

    pub fn answer_ack(id: &str, accepted: bool) -> Self {
        Self::AnswerAck {
            id: id.to_string(),
            accepted,
            message: if accepted {
                "Response received"
            } else {
                "No matching prompt"
            }
            .to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Question { .. } => "question",
            Self::AnswerAck { .. } => "answer_ack",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
            Self::Ack { .. } => "ack",
        }
    }
}

/// Outbound half of the message channel
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError>;
}

#[async_trait]
impl MessageSink for mpsc::Sender<OutboundMessage> {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        mpsc::Sender::send(self, message)
            .await
            .map_err(|_| ChannelError)
    }
}

#[async_trait]
impl MessageSink for mpsc::UnboundedSender<OutboundMessage> {
    async fn send(&self, message: OutboundMessage) -> Result<(), ChannelError> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| ChannelError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_wire_shape() {
        let msg: InboundMessage =
            serde_json::from_str(r#"{"type":"answer","id":"q-7","text":"noise cancelling"}"#)
                .unwrap();
        assert_eq!(
            msg,
            InboundMessage::Answer {
                id: "q-7".into(),
                text: "noise cancelling".into()
            }
        );
    }

    #[test]
    fn test_outbound_wire_shape() {
        let json = serde_json::to_value(OutboundMessage::Question {
            id: "q-1".into(),
            text: "Which brand?".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "question");
        assert_eq!(json["id"], "q-1");

        let json = serde_json::to_value(OutboundMessage::result(ShopResult::default())).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["steps"], 0);
        assert!(json["recommended"].is_null());
    }

    #[tokio::test]
    async fn test_closed_sink_reports_channel_error() {
        let (tx, rx) = mpsc::channel::<OutboundMessage>(1);
        drop(rx);
        let err = MessageSink::send(&tx, OutboundMessage::Ack { message: "x".into() })
            .await
            .unwrap_err();
        assert_eq!(err, ChannelError);
    }
}
