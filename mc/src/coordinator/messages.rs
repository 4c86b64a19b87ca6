//! Message types for the Coordinator

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use eyre::Result;
use serde::Serialize;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::protocol::Inbound;
use crate::request::{InjectionRequest, ValidationError};
use crate::target::TargetId;

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub enum CoordRequest {
    /// Replace the ordered set of active targets
    SetActive {
        targets: Vec<TargetId>,
        reply_tx: oneshot::Sender<Result<(), ValidationError>>,
    },

    /// Read the active set
    GetActive { reply_tx: oneshot::Sender<Vec<TargetId>> },

    /// Fan a request out to every active target
    Broadcast {
        request: InjectionRequest,
        reply_tx: oneshot::Sender<BroadcastReport>,
    },

    /// Send a request to one target, active or not
    Deliver {
        target_id: TargetId,
        request: InjectionRequest,
        reply_tx: oneshot::Sender<Result<Route>>,
    },

    /// Ask one target for its latest answer
    Extract {
        target_id: TargetId,
        timeout: Duration,
        reply_tx: oneshot::Sender<Option<String>>,
    },

    /// Extraction deadline reached (internal)
    ExtractTimeout { target_id: TargetId, generation: u64 },

    /// Extraction request could not be delivered (internal)
    ExtractUndeliverable { target_id: TargetId, generation: u64 },

    /// Raw message from a frame, not yet gated
    Inbound(Inbound),

    /// Read the readiness table
    GetReadiness { reply_tx: oneshot::Sender<Readiness> },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Shutdown the coordinator
    Shutdown,
}

/// How a message reached its target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    /// Addressed to the target's frame
    Direct,
    /// Re-dispatched by the relay to surfaces on the target's domain
    Relay,
}

/// Outcome of one broadcast; failures are reported, never raised
#[derive(Debug, Clone, Default, Serialize)]
pub struct BroadcastReport {
    #[serde(rename = "request-id")]
    pub request_id: Option<Uuid>,
    pub delivered: Vec<(TargetId, Route)>,
    pub failed: Vec<(TargetId, String)>,
}

impl BroadcastReport {
    /// Number of targets a delivery was attempted for
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.failed.len()
    }

    pub fn delivered_to(&self, target_id: &str) -> bool {
        self.delivered.iter().any(|(t, _)| t.as_str() == target_id)
    }
}

/// Answers gathered by one collect call, in request order
#[derive(Debug, Clone, Default, Serialize)]
pub struct Collection {
    pub answers: Vec<(TargetId, String)>,
    /// Targets that produced no answer before their deadline
    pub missing: Vec<TargetId>,
}

impl Collection {
    pub fn get(&self, target_id: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|(t, _)| t.as_str() == target_id)
            .map(|(_, text)| text.as_str())
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn to_map(&self) -> BTreeMap<TargetId, String> {
        self.answers.iter().cloned().collect()
    }
}

/// Snapshot of verified readiness handshakes
#[derive(Debug, Clone, Default, Serialize)]
pub struct Readiness {
    pub ready: BTreeMap<TargetId, DateTime<Utc>>,
}

impl Readiness {
    pub fn is_ready(&self, target_id: &str) -> bool {
        self.ready.contains_key(target_id)
    }
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorMetrics {
    pub active_targets: usize,
    pub ready_targets: usize,
    pub pending_extractions: usize,
    pub messages_received: u64,
    pub rejected_messages: u64,
    pub broadcasts: u64,
    pub extraction_timeouts: u64,
    pub superseded_extractions: u64,
    pub stale_responses: u64,
}
