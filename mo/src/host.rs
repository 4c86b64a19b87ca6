//! In-process frame host
//!
//! Hosts adapters the way a browser hosts frames: each frame has a location, and the
//! host, never the message, decides which origin a message came from. Frames mounted
//! for a target are directly addressable; detached tabs are reachable only through
//! the relay.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use eyre::Result;
use mosaic_adapter::{Adapter, AdapterConfig, Envelope, Page};
use mosaic_core::{
    CoordinatorHandle, Inbound, Message, Surface, SurfaceDirectory, TargetDescriptor, TargetId, Transport,
    TransportError,
};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use url::Url;

/// Origin the host stamps on coordinator traffic
pub const COORDINATOR_ORIGIN: &str = "chrome-extension://mosaic";

const FRAME_BUFFER: usize = 64;

struct Frame {
    surface: Surface,
    inbox: mpsc::Sender<Envelope>,
}

#[derive(Default)]
struct Frames {
    /// Addressable by target id
    mounted: HashMap<TargetId, Frame>,
    /// Reachable only by surface id
    tabs: Vec<Frame>,
}

pub struct FrameHost {
    frames: RwLock<Frames>,
    coordinator_origin: String,
    next_surface: std::sync::atomic::AtomicU64,
}

impl Default for FrameHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameHost {
    pub fn new() -> Self {
        Self::with_origin(COORDINATOR_ORIGIN)
    }

    pub fn with_origin(coordinator_origin: impl Into<String>) -> Self {
        let coordinator_origin = coordinator_origin.into();
        debug!(%coordinator_origin, "FrameHost::with_origin: called");
        Self {
            frames: RwLock::new(Frames::default()),
            coordinator_origin,
            next_surface: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Load an adapter in a frame for `descriptor`, located at `url`
    ///
    /// Replies from the adapter reach the coordinator stamped with `url`'s origin.
    pub async fn mount(
        &self,
        descriptor: &TargetDescriptor,
        url: Url,
        page: Arc<dyn Page>,
        config: AdapterConfig,
        coordinator: CoordinatorHandle,
    ) -> Result<()> {
        debug!(target_id = %descriptor.id, %url, "FrameHost::mount: called");
        let frame = self.spawn_frame(descriptor, url, page, config, coordinator);
        if let Some(old) = self.frames.write().await.mounted.insert(descriptor.id.clone(), frame) {
            debug!(surface = %old.surface.id, "FrameHost::mount: replaced existing frame");
        }
        Ok(())
    }

    /// Open a tab that only the relay can reach
    pub async fn open_tab(
        &self,
        descriptor: &TargetDescriptor,
        url: Url,
        page: Arc<dyn Page>,
        config: AdapterConfig,
        coordinator: CoordinatorHandle,
    ) -> Result<String> {
        debug!(target_id = %descriptor.id, %url, "FrameHost::open_tab: called");
        let frame = self.spawn_frame(descriptor, url, page, config, coordinator);
        let id = frame.surface.id.clone();
        self.frames.write().await.tabs.push(frame);
        Ok(id)
    }

    /// Drop a target's frame; its adapter stops once the inbox closes
    pub async fn unmount(&self, target_id: &TargetId) -> bool {
        debug!(%target_id, "FrameHost::unmount: called");
        self.frames.write().await.mounted.remove(target_id).is_some()
    }

    fn spawn_frame(
        &self,
        descriptor: &TargetDescriptor,
        url: Url,
        page: Arc<dyn Page>,
        config: AdapterConfig,
        coordinator: CoordinatorHandle,
    ) -> Frame {
        let n = self.next_surface.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let surface = Surface {
            id: format!("surface-{}", n),
            url,
        };
        let origin = surface.url.origin().ascii_serialization();

        let adapter = Arc::new(Adapter::new(descriptor, page, config));
        let (inbox_tx, inbox_rx) = mpsc::channel(FRAME_BUFFER);
        let (outbox_tx, outbox_rx) = mpsc::channel(FRAME_BUFFER);
        tokio::spawn(adapter.serve(inbox_rx, outbox_tx));
        tokio::spawn(forward_upstream(origin, outbox_rx, coordinator));

        info!(surface = %surface.id, url = %surface.url, target_id = %descriptor.id, "Frame loaded");
        Frame {
            surface,
            inbox: inbox_tx,
        }
    }

    fn envelope(&self, message: Message) -> Envelope {
        Envelope {
            origin: self.coordinator_origin.clone(),
            message,
        }
    }
}

/// Relay adapter replies to the coordinator under the frame's origin
async fn forward_upstream(origin: String, mut outbox: mpsc::Receiver<Message>, coordinator: CoordinatorHandle) {
    while let Some(message) = outbox.recv().await {
        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%origin, error = %e, "Failed to encode frame message");
                continue;
            }
        };
        if coordinator.inbound(Inbound::new(origin.clone(), payload)).await.is_err() {
            debug!(%origin, "Coordinator gone, frame forwarder stopping");
            break;
        }
    }
}

#[async_trait]
impl Transport for FrameHost {
    async fn post(&self, target_id: &TargetId, message: Message) -> Result<(), TransportError> {
        let inbox = {
            let frames = self.frames.read().await;
            match frames.mounted.get(target_id) {
                Some(frame) => frame.inbox.clone(),
                None => return Err(TransportError::NoSurface(target_id.clone())),
            }
        };
        inbox
            .send(self.envelope(message))
            .await
            .map_err(|_| TransportError::Closed(target_id.clone()))
    }
}

#[async_trait]
impl SurfaceDirectory for FrameHost {
    async fn live_surfaces(&self) -> Vec<Surface> {
        let frames = self.frames.read().await;
        frames
            .mounted
            .values()
            .chain(frames.tabs.iter())
            .filter(|f| !f.inbox.is_closed())
            .map(|f| f.surface.clone())
            .collect()
    }

    async fn dispatch(&self, surface: &Surface, message: Message) -> Result<(), TransportError> {
        let inbox = {
            let frames = self.frames.read().await;
            frames
                .mounted
                .values()
                .chain(frames.tabs.iter())
                .find(|f| f.surface.id == surface.id)
                .map(|f| f.inbox.clone())
        };
        let Some(inbox) = inbox else {
            return Err(TransportError::Failed(format!("surface {} is gone", surface.id)));
        };
        inbox
            .send(self.envelope(message))
            .await
            .map_err(|_| TransportError::Failed(format!("surface {} closed", surface.id)))
    }
}
