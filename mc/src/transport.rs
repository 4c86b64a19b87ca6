//! Delivery seam between the coordinator and adapter frames

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::Message;
use crate::target::TargetId;

/// Errors from delivering a message to one target
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("No live surface for target {0}")]
    NoSurface(TargetId),

    #[error("Surface for target {0} closed")]
    Closed(TargetId),

    #[error("Delivery failed: {0}")]
    Failed(String),
}

/// Addresses messages to a target's adapter
///
/// Implementations decide how a target id maps to a live frame. A failure for one
/// target must not affect delivery to any other.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, target_id: &TargetId, message: Message) -> Result<(), TransportError>;
}
