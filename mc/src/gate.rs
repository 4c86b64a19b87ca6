//! Origin gate
//!
//! The allow-list of target origins is the sole trust boundary for inbound traffic.
//! Rejections are never surfaced to callers; they are only logged at debug level.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::protocol::{Inbound, Message};
use crate::target::{TargetId, TargetRegistry};

/// Why an inbound message was dropped
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("origin '{0}' is not allow-listed")]
    UnknownOrigin(String),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("'{kind}' is not an upstream message kind")]
    WrongDirection { kind: &'static str },

    #[error("payload claims '{claimed}' but origin belongs to '{actual}'")]
    IdentityMismatch { claimed: TargetId, actual: TargetId },
}

/// A message that passed the gate, attributed to the target owning its origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub target_id: TargetId,
    pub message: Message,
}

/// Pre-computed origin allow-list
#[derive(Debug, Clone)]
pub struct OriginGate {
    origins: HashMap<String, TargetId>,
}

impl OriginGate {
    pub fn new(registry: &TargetRegistry) -> Self {
        let origins: HashMap<String, TargetId> = registry.iter().map(|t| (t.origin(), t.id.clone())).collect();
        debug!(count = origins.len(), "OriginGate::new: allow-list built");
        Self { origins }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.origins.contains_key(origin)
    }

    /// Check an inbound message against the allow-list and its own claims
    pub fn admit(&self, inbound: &Inbound) -> Result<Admitted, Rejection> {
        let owner = self
            .origins
            .get(inbound.origin.as_str())
            .ok_or_else(|| Rejection::UnknownOrigin(inbound.origin.clone()))?;

        let message: Message =
            serde_json::from_value(inbound.payload.clone()).map_err(|e| Rejection::Malformed(e.to_string()))?;

        if !message.is_upstream() {
            return Err(Rejection::WrongDirection { kind: message.kind() });
        }

        if message.target_id() != owner {
            return Err(Rejection::IdentityMismatch {
                claimed: message.target_id().clone(),
                actual: owner.clone(),
            });
        }

        Ok(Admitted {
            target_id: owner.clone(),
            message,
        })
    }
}
