//! End-to-end session: mount frames, broadcast, collect, optionally synthesize

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use mosaic_adapter::HtmlPage;
use mosaic_core::attachment::media_type_for_extension;
use mosaic_core::{
    Attachment, AttachmentError, BroadcastReport, Collection, Coordinator, CoordinatorHandle, Readiness, Relay,
    SynthesisError, SynthesisOutcome, Synthesizer, TargetId, TargetRegistry, compose,
};
use tracing::{debug, info};

use crate::config::Config;
use crate::host::FrameHost;

/// How long to wait for frames to complete the readiness handshake
const READY_WAIT: Duration = Duration::from_secs(2);

/// What one session should do
#[derive(Debug, Clone, Default)]
pub struct SessionPlan {
    pub prompt: String,
    pub attachments: Vec<Attachment>,
    /// One page per target, as HTML
    pub pages: Vec<(TargetId, String)>,
    pub synthesize_into: Option<TargetId>,
}

/// Everything a session observed
#[derive(Debug)]
pub struct SessionReport {
    pub warnings: Vec<AttachmentError>,
    pub readiness: Readiness,
    pub broadcast: BroadcastReport,
    pub collection: Collection,
    pub synthesis: Option<Result<SynthesisOutcome, SynthesisError>>,
}

/// A coordinator wired to an in-process frame host, with the relay as fallback
pub struct Runtime {
    pub registry: TargetRegistry,
    pub host: Arc<FrameHost>,
    pub handle: CoordinatorHandle,
}

impl Runtime {
    /// Spawn the coordinator with the configured active set
    pub fn start(config: &Config) -> Result<Self> {
        debug!("Runtime::start: called");
        let registry = TargetRegistry::builtin();
        let active = config.active_targets(&registry)?;
        let host = Arc::new(FrameHost::new());
        let relay = Arc::new(Relay::new(&registry, host.clone(), config.relay.clone()));
        let coordinator = Coordinator::new(config.coordinator.clone(), registry.clone(), host.clone())
            .with_relay(relay)
            .with_active(active);
        let handle = coordinator.handle();
        tokio::spawn(coordinator.run());
        Ok(Self { registry, host, handle })
    }

    /// Mount a frame at the target's canonical location
    pub async fn mount(&self, config: &Config, target_id: &TargetId, html: String) -> Result<Arc<HtmlPage>> {
        let descriptor = self
            .registry
            .get(target_id.as_str())
            .ok_or_else(|| eyre!("Unknown target '{}'", target_id))?;
        let page = Arc::new(HtmlPage::new(html));
        self.host
            .mount(
                descriptor,
                descriptor.url.clone(),
                page.clone(),
                config.adapter.clone(),
                self.handle.clone(),
            )
            .await?;
        Ok(page)
    }

    /// Wait until every target is ready or the wait runs out
    pub async fn await_ready(&self, targets: &[TargetId], wait: Duration) -> Result<Readiness> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let readiness = self.handle.readiness().await?;
            if targets.iter().all(|t| readiness.is_ready(t.as_str())) || tokio::time::Instant::now() >= deadline {
                return Ok(readiness);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

/// Read an image file; the media type comes from the extension
///
/// Unknown extensions are kept with a generic type so validation can report them.
pub fn load_attachment(path: &Path) -> Result<Attachment> {
    debug!(path = %path.display(), "load_attachment: called");
    let data = std::fs::read(path).context(format!("Failed to read {}", path.display()))?;
    let media_type = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(media_type_for_extension)
        .unwrap_or("application/octet-stream");
    let mut attachment = Attachment::new(media_type, data);
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        attachment = attachment.with_name(name);
    }
    Ok(attachment)
}

/// Read ID=FILE pairs into (target, contents), rejecting unknown targets
pub fn load_pages(registry: &TargetRegistry, pages: &[(String, PathBuf)]) -> Result<Vec<(TargetId, String)>> {
    pages
        .iter()
        .map(|(id, path)| {
            if !registry.contains(id) {
                return Err(eyre!("Unknown target '{}'", id));
            }
            let html = std::fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;
            Ok((TargetId::from(id.as_str()), html))
        })
        .collect()
}

/// Run a full round trip against in-memory pages
pub async fn run_session(config: &Config, plan: SessionPlan) -> Result<SessionReport> {
    debug!(pages = plan.pages.len(), "run_session: called");
    let composed = compose(plan.prompt, plan.attachments, config.coordinator.attachment_policy)
        .context("Prompt rejected")?;

    let runtime = Runtime::start(config)?;
    let targets: Vec<TargetId> = plan.pages.iter().map(|(id, _)| id.clone()).collect();
    for (target_id, html) in plan.pages {
        runtime.mount(config, &target_id, html).await?;
    }
    runtime.handle.set_active(targets.clone()).await?;
    let readiness = runtime.await_ready(&targets, READY_WAIT).await?;

    let broadcast = runtime.handle.broadcast(composed.request).await?;
    let collection = runtime.handle.collect_default(&targets).await?;
    info!(
        answers = collection.len(),
        missing = collection.missing.len(),
        "Session collected answers"
    );

    let synthesis = match plan.synthesize_into {
        Some(destination) => {
            let synthesizer = Synthesizer::new(runtime.handle.clone(), runtime.registry.clone());
            Some(synthesizer.synthesize_from(&collection, &destination).await)
        }
        None => None,
    };

    runtime.shutdown().await?;
    Ok(SessionReport {
        warnings: composed.warnings,
        readiness,
        broadcast,
        collection,
        synthesis,
    })
}
