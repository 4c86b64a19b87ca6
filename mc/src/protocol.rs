//! Cross-context message kinds
//!
//! Transport-agnostic JSON schema. Each message is tagged by `kind`:
//!
//! ```text
//! {"kind":"ready","target-id":"claude"}
//! {"kind":"inject","target-id":"claude","text":"...","attachments":[...]}
//! {"kind":"extract-request","target-id":"claude"}
//! {"kind":"extract-response","target-id":"claude","text":"..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::target::TargetId;

/// Messages exchanged between the coordinator and adapters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Message {
    /// Adapter → coordinator: the adapter has initialized
    Ready {
        #[serde(rename = "target-id")]
        target_id: TargetId,
    },

    /// Coordinator → adapter: deliver a prompt
    Inject {
        #[serde(rename = "target-id")]
        target_id: TargetId,
        text: String,
        #[serde(default)]
        attachments: Vec<Attachment>,
    },

    /// Coordinator → adapter: report the latest answer
    ExtractRequest {
        #[serde(rename = "target-id")]
        target_id: TargetId,
    },

    /// Adapter → coordinator: the latest answer (empty when nothing was found)
    ExtractResponse {
        #[serde(rename = "target-id")]
        target_id: TargetId,
        text: String,
    },
}

impl Message {
    pub fn target_id(&self) -> &TargetId {
        match self {
            Message::Ready { target_id }
            | Message::Inject { target_id, .. }
            | Message::ExtractRequest { target_id }
            | Message::ExtractResponse { target_id, .. } => target_id,
        }
    }

    /// Wire name of the message kind
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ready { .. } => "ready",
            Message::Inject { .. } => "inject",
            Message::ExtractRequest { .. } => "extract-request",
            Message::ExtractResponse { .. } => "extract-response",
        }
    }

    /// Whether this kind legitimately flows from an adapter to the coordinator
    pub fn is_upstream(&self) -> bool {
        matches!(self, Message::Ready { .. } | Message::ExtractResponse { .. })
    }
}

/// A raw message as received by the coordinator
///
/// `origin` is computed by the transport from the sending frame, never read from the
/// payload.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub origin: String,
    pub payload: serde_json::Value,
}

impl Inbound {
    pub fn new(origin: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            origin: origin.into(),
            payload,
        }
    }
}
