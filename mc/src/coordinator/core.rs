//! Main Coordinator task implementation

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use eyre::eyre;
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::messages::{BroadcastReport, CoordRequest, CoordinatorMetrics, Readiness, Route};
use crate::gate::{Admitted, OriginGate};
use crate::protocol::{Inbound, Message};
use crate::relay::{Relay, RelayRequest};
use crate::request::{InjectionRequest, ValidationError};
use crate::target::{TargetId, TargetRegistry};
use crate::transport::{Transport, TransportError};

/// Pending extraction tracking
struct PendingExtraction {
    generation: u64,
    reply_tx: oneshot::Sender<Option<String>>,
}

/// The Coordinator owns the active set, the readiness table and the pending
/// extraction table. All of it is touched only from the task running [`Coordinator::run`].
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: TargetRegistry,
    transport: Arc<dyn Transport>,
    relay: Option<Arc<Relay>>,
    /// Active set at startup; the registry default when unset
    initial_active: Option<Vec<TargetId>>,
    tx: mpsc::Sender<CoordRequest>,
    rx: mpsc::Receiver<CoordRequest>,
}

impl Coordinator {
    /// Create a new Coordinator with the given configuration
    pub fn new(config: CoordinatorConfig, registry: TargetRegistry, transport: Arc<dyn Transport>) -> Self {
        debug!(?config, targets = registry.len(), "Coordinator::new: called");
        let (tx, rx) = mpsc::channel(config.channel_buffer);
        Self {
            config,
            registry,
            transport,
            relay: None,
            initial_active: None,
            tx,
            rx,
        }
    }

    /// Use the relay when a target's frame cannot be addressed directly
    pub fn with_relay(mut self, relay: Arc<Relay>) -> Self {
        debug!("Coordinator::with_relay: called");
        self.relay = Some(relay);
        self
    }

    /// Start with `targets` active instead of the registry default
    ///
    /// Unknown ids are skipped and duplicates keep their first position.
    pub fn with_active(mut self, targets: Vec<TargetId>) -> Self {
        debug!(?targets, "Coordinator::with_active: called");
        let mut seen = HashSet::new();
        let active = targets
            .into_iter()
            .filter(|t| self.registry.contains(t.as_str()) && seen.insert(t.clone()))
            .collect();
        self.initial_active = Some(active);
        self
    }

    /// Get a sender for creating handles
    pub fn sender(&self) -> mpsc::Sender<CoordRequest> {
        self.tx.clone()
    }

    /// Create a handle for callers (UI layer, synthesis, frame host)
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone(), self.config.extract_timeout())
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested.
    pub async fn run(mut self) {
        debug!("Coordinator::run: called");
        let coord_tx = self.tx.clone();
        let gate = OriginGate::new(&self.registry);

        // Internal state
        let mut active: Vec<TargetId> = self
            .initial_active
            .take()
            .unwrap_or_else(|| self.registry.default_active());
        let mut readiness: HashMap<TargetId, DateTime<Utc>> = HashMap::new();
        let mut pending: HashMap<TargetId, PendingExtraction> = HashMap::new();
        let mut next_generation: u64 = 0;

        // Metrics
        let mut metrics = CoordinatorMetrics::default();

        info!(active = active.len(), "Coordinator started");

        while let Some(req) = self.rx.recv().await {
            metrics.messages_received += 1;

            match req {
                CoordRequest::SetActive { targets, reply_tx } => {
                    let unknown = targets.iter().find(|t| !self.registry.contains(t.as_str()));
                    if let Some(unknown) = unknown {
                        let _ = reply_tx.send(Err(ValidationError::UnknownTarget(unknown.to_string())));
                        continue;
                    }
                    let mut seen = HashSet::new();
                    active = targets.into_iter().filter(|t| seen.insert(t.clone())).collect();
                    debug!(?active, "Active targets updated");
                    let _ = reply_tx.send(Ok(()));
                }

                CoordRequest::GetActive { reply_tx } => {
                    let _ = reply_tx.send(active.clone());
                }

                CoordRequest::Broadcast { request, reply_tx } => {
                    metrics.broadcasts += 1;
                    debug!(request_id = %request.id(), targets = active.len(), "Broadcasting injection");

                    let targets = active.clone();
                    let transport = self.transport.clone();
                    let relay = self.relay.clone();
                    tokio::spawn(async move {
                        let report = fan_out(transport, relay, targets, request).await;
                        let _ = reply_tx.send(report);
                    });
                }

                CoordRequest::Deliver {
                    target_id,
                    request,
                    reply_tx,
                } => {
                    if !self.registry.contains(target_id.as_str()) {
                        let _ = reply_tx.send(Err(eyre!("Unknown target: {}", target_id)));
                        continue;
                    }
                    debug!(request_id = %request.id(), %target_id, "Delivering injection");

                    let transport = self.transport.clone();
                    let relay = self.relay.clone();
                    tokio::spawn(async move {
                        let result = deliver_one(transport, relay, &target_id, &request)
                            .await
                            .map_err(|e| eyre!("Delivery to {} failed: {}", target_id, e));
                        let _ = reply_tx.send(result);
                    });
                }

                CoordRequest::Extract {
                    target_id,
                    timeout,
                    reply_tx,
                } => {
                    if !self.registry.contains(target_id.as_str()) {
                        debug!(%target_id, "Extraction requested for unknown target");
                        let _ = reply_tx.send(None);
                        continue;
                    }

                    next_generation += 1;
                    let generation = next_generation;
                    if let Some(previous) = pending.insert(target_id.clone(), PendingExtraction { generation, reply_tx }) {
                        debug!(%target_id, "Superseding pending extraction");
                        let _ = previous.reply_tx.send(None);
                        metrics.superseded_extractions += 1;
                    }
                    metrics.pending_extractions = pending.len();

                    // Request delivery and deadline run off the coordinator task
                    let deadline = Instant::now() + timeout;
                    let transport = self.transport.clone();
                    let timer_tx = coord_tx.clone();
                    tokio::spawn(async move {
                        let message = Message::ExtractRequest {
                            target_id: target_id.clone(),
                        };
                        let sent = tokio::time::timeout_at(deadline, transport.post(&target_id, message)).await;
                        if let Ok(Err(e)) = sent {
                            warn!(%target_id, error = %e, "Failed to deliver extraction request");
                            let _ = timer_tx
                                .send(CoordRequest::ExtractUndeliverable { target_id, generation })
                                .await;
                            return;
                        }
                        tokio::time::sleep_until(deadline).await;
                        let _ = timer_tx.send(CoordRequest::ExtractTimeout { target_id, generation }).await;
                    });
                }

                CoordRequest::ExtractTimeout { target_id, generation } => {
                    if pending.get(&target_id).is_some_and(|p| p.generation == generation)
                        && let Some(expired) = pending.remove(&target_id)
                    {
                        warn!(%target_id, "Extraction timed out");
                        let _ = expired.reply_tx.send(None);
                        metrics.extraction_timeouts += 1;
                        metrics.pending_extractions = pending.len();
                    }
                }

                CoordRequest::ExtractUndeliverable { target_id, generation } => {
                    if pending.get(&target_id).is_some_and(|p| p.generation == generation)
                        && let Some(failed) = pending.remove(&target_id)
                    {
                        let _ = failed.reply_tx.send(None);
                        metrics.pending_extractions = pending.len();
                    }
                }

                CoordRequest::Inbound(inbound) => {
                    handle_inbound(&gate, inbound, &mut readiness, &mut pending, &mut metrics);
                    metrics.pending_extractions = pending.len();
                    metrics.ready_targets = readiness.len();
                }

                CoordRequest::GetReadiness { reply_tx } => {
                    let snapshot = Readiness {
                        ready: readiness.iter().map(|(k, v)| (k.clone(), *v)).collect(),
                    };
                    let _ = reply_tx.send(snapshot);
                }

                CoordRequest::GetMetrics { reply_tx } => {
                    metrics.active_targets = active.len();
                    let _ = reply_tx.send(metrics.clone());
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    break;
                }
            }
        }

        info!("Coordinator stopped");
    }
}

/// Gate an inbound message and apply it; rejected messages change nothing
fn handle_inbound(
    gate: &OriginGate,
    inbound: Inbound,
    readiness: &mut HashMap<TargetId, DateTime<Utc>>,
    pending: &mut HashMap<TargetId, PendingExtraction>,
    metrics: &mut CoordinatorMetrics,
) {
    let Admitted { target_id, message } = match gate.admit(&inbound) {
        Ok(admitted) => admitted,
        Err(rejection) => {
            debug!(origin = %inbound.origin, %rejection, "Dropping inbound message");
            metrics.rejected_messages += 1;
            return;
        }
    };

    match message {
        Message::Ready { .. } => {
            if !readiness.contains_key(&target_id) {
                info!(%target_id, "Target ready");
                readiness.insert(target_id, Utc::now());
            }
        }
        Message::ExtractResponse { text, .. } => match pending.remove(&target_id) {
            Some(entry) => {
                let answer = if text.trim().is_empty() {
                    None
                } else {
                    Some(text.trim().to_string())
                };
                debug!(%target_id, found = answer.is_some(), "Extraction resolved");
                let _ = entry.reply_tx.send(answer);
            }
            None => {
                debug!(%target_id, "No pending extraction, ignoring response");
                metrics.stale_responses += 1;
            }
        },
        Message::Inject { .. } | Message::ExtractRequest { .. } => {}
    }
}

/// Deliver to one target, falling back to the relay when no frame is addressable
async fn deliver_one(
    transport: Arc<dyn Transport>,
    relay: Option<Arc<Relay>>,
    target_id: &TargetId,
    request: &InjectionRequest,
) -> Result<Route, TransportError> {
    match transport.post(target_id, request.addressed_to(target_id)).await {
        Ok(()) => Ok(Route::Direct),
        Err(TransportError::NoSurface(id)) => {
            let Some(relay) = relay else {
                return Err(TransportError::NoSurface(id));
            };
            if !request.attachments().is_empty() {
                warn!(%target_id, "Relay carries text only, attachments not delivered");
            }
            debug!(%target_id, "No addressable frame, trying relay");
            let outcome = relay
                .relay(RelayRequest {
                    target_id: target_id.clone(),
                    text: request.prompt().to_string(),
                })
                .await;
            if outcome.delivered() > 0 {
                Ok(Route::Relay)
            } else {
                Err(TransportError::NoSurface(id))
            }
        }
        Err(e) => Err(e),
    }
}

/// Deliver to every target independently; one failure never blocks the rest
async fn fan_out(
    transport: Arc<dyn Transport>,
    relay: Option<Arc<Relay>>,
    targets: Vec<TargetId>,
    request: InjectionRequest,
) -> BroadcastReport {
    let request = Arc::new(request);
    let sends: Vec<_> = targets
        .iter()
        .map(|target_id| {
            let transport = transport.clone();
            let relay = relay.clone();
            let request = request.clone();
            let target_id = target_id.clone();
            tokio::spawn(async move { deliver_one(transport, relay, &target_id, &request).await })
        })
        .collect();

    let results = join_all(sends).await;

    let mut report = BroadcastReport {
        request_id: Some(request.id()),
        ..Default::default()
    };
    for (target_id, result) in targets.into_iter().zip(results) {
        match result {
            Ok(Ok(route)) => report.delivered.push((target_id, route)),
            Ok(Err(e)) => {
                warn!(%target_id, error = %e, "Delivery failed");
                report.failed.push((target_id, e.to_string()));
            }
            Err(e) => {
                warn!(%target_id, error = %e, "Delivery task aborted");
                report.failed.push((target_id, e.to_string()));
            }
        }
    }

    info!(
        delivered = report.delivered.len(),
        failed = report.failed.len(),
        "Broadcast complete"
    );
    report
}
