//! CoordinatorHandle - Client interface for the coordinator task

use std::collections::HashSet;
use std::time::Duration;

use eyre::{Result, eyre};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{BroadcastReport, Collection, CoordRequest, CoordinatorMetrics, Readiness, Route};
use crate::protocol::Inbound;
use crate::request::InjectionRequest;
use crate::target::TargetId;

/// Slack added on top of an extraction deadline before the caller gives up waiting
const REPLY_GRACE: Duration = Duration::from_millis(250);

/// Handle for callers to interact with the Coordinator
///
/// This handle is cloneable; every operation is a message to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    /// Sender to the Coordinator task
    tx: mpsc::Sender<CoordRequest>,

    /// Deadline used by [`collect_default`](Self::collect_default)
    extract_timeout: Duration,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::Sender<CoordRequest>, extract_timeout: Duration) -> Self {
        debug!(?extract_timeout, "CoordinatorHandle::new: called");
        Self { tx, extract_timeout }
    }

    async fn send(&self, req: CoordRequest) -> Result<()> {
        self.tx
            .send(req)
            .await
            .map_err(|_| eyre!("Coordinator channel closed"))
    }

    /// Replace the active target set; unknown ids reject the whole update
    pub async fn set_active(&self, targets: Vec<TargetId>) -> Result<()> {
        debug!(?targets, "CoordinatorHandle::set_active: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::SetActive { targets, reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown"))??;
        Ok(())
    }

    /// Current active targets, in order
    pub async fn active(&self) -> Result<Vec<TargetId>> {
        debug!("CoordinatorHandle::active: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::GetActive { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown"))
    }

    /// Send one request to every active target
    ///
    /// Per-target failures are reported in the [`BroadcastReport`]; only a dead
    /// coordinator produces an error here.
    pub async fn broadcast(&self, request: InjectionRequest) -> Result<BroadcastReport> {
        debug!(request_id = %request.id(), "CoordinatorHandle::broadcast: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::Broadcast { request, reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Broadcast cancelled or coordinator shutdown"))
    }

    /// Send one request to a single target, active or not
    pub async fn deliver(&self, target_id: &TargetId, request: InjectionRequest) -> Result<Route> {
        debug!(%target_id, request_id = %request.id(), "CoordinatorHandle::deliver: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::Deliver {
            target_id: target_id.clone(),
            request,
            reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| eyre!("Delivery cancelled or coordinator shutdown"))?
    }

    /// Ask each target for its latest answer and wait up to `timeout` for each
    ///
    /// Targets are queried concurrently. The result never waits longer than the
    /// slowest deadline, and a target that stays silent only lands in `missing`.
    pub async fn collect(&self, targets: &[TargetId], timeout: Duration) -> Result<Collection> {
        debug!(?targets, ?timeout, "CoordinatorHandle::collect: called");

        let mut seen = HashSet::new();
        let targets: Vec<TargetId> = targets.iter().filter(|t| seen.insert(*t)).cloned().collect();

        let mut waiters = Vec::with_capacity(targets.len());
        for target_id in &targets {
            let (reply_tx, reply_rx) = oneshot::channel();
            self.send(CoordRequest::Extract {
                target_id: target_id.clone(),
                timeout,
                reply_tx,
            })
            .await?;
            waiters.push(async move {
                match tokio::time::timeout(timeout + REPLY_GRACE, reply_rx).await {
                    Ok(Ok(answer)) => answer,
                    _ => None,
                }
            });
        }

        let replies = join_all(waiters).await;

        let mut collection = Collection::default();
        for (target_id, reply) in targets.into_iter().zip(replies) {
            match reply {
                Some(text) => collection.answers.push((target_id, text)),
                None => collection.missing.push(target_id),
            }
        }
        debug!(
            answers = collection.answers.len(),
            missing = collection.missing.len(),
            "CoordinatorHandle::collect: done"
        );
        Ok(collection)
    }

    /// [`collect`](Self::collect) with the configured deadline
    pub async fn collect_default(&self, targets: &[TargetId]) -> Result<Collection> {
        self.collect(targets, self.extract_timeout).await
    }

    /// Hand a raw frame message to the coordinator for gating
    pub async fn inbound(&self, inbound: Inbound) -> Result<()> {
        debug!(origin = %inbound.origin, "CoordinatorHandle::inbound: called");
        self.send(CoordRequest::Inbound(inbound)).await
    }

    /// Snapshot of which targets completed the readiness handshake
    pub async fn readiness(&self) -> Result<Readiness> {
        debug!("CoordinatorHandle::readiness: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::GetReadiness { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown"))
    }

    /// Get coordinator metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics> {
        debug!("CoordinatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(CoordRequest::GetMetrics { reply_tx }).await?;
        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown"))
    }

    /// Request coordinator shutdown
    pub async fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.send(CoordRequest::Shutdown).await
    }
}
