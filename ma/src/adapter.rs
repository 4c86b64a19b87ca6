//! Adapter runtime
//!
//! One adapter lives in each target frame. It answers only to the coordinator's
//! origin, only for its own target, and never runs two injections at once.

use std::sync::Arc;

use mosaic_core::{MAX_TEXT_CHARS, Message, TargetDescriptor, TargetId};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use crate::config::AdapterConfig;
use crate::extract;
use crate::injector::{InjectionReport, Injector};
use crate::page::{Page, PageError};
use crate::profile::{TargetProfile, profile_for};

/// Why an incoming message was ignored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Refusal {
    #[error("origin '{0}' is not the coordinator")]
    ForeignOrigin(String),

    #[error("message addressed to '{0}'")]
    OtherTarget(TargetId),

    #[error("'{0}' is not a coordinator message kind")]
    WrongDirection(&'static str),

    #[error("prompt of {0} characters exceeds the limit")]
    TooLong(usize),
}

/// A message with the origin the frame runtime attributed to it
#[derive(Debug, Clone)]
pub struct Envelope {
    pub origin: String,
    pub message: Message,
}

/// Result of handling one message
#[derive(Debug, Clone)]
pub enum Handled {
    Ignored(Refusal),
    Injected(InjectionReport),
    /// Upstream message to post back to the coordinator
    Reply(Message),
}

pub struct Adapter {
    target_id: TargetId,
    profile: &'static TargetProfile,
    images: bool,
    page: Arc<dyn Page>,
    config: AdapterConfig,
    injecting: Mutex<()>,
}

impl Adapter {
    pub fn new(descriptor: &TargetDescriptor, page: Arc<dyn Page>, config: AdapterConfig) -> Self {
        debug!(target_id = %descriptor.id, "Adapter::new: called");
        Self {
            target_id: descriptor.id.clone(),
            profile: profile_for(descriptor.id.as_str()),
            images: descriptor.capabilities.images,
            page,
            config,
            injecting: Mutex::new(()),
        }
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    /// Readiness handshake, posted once when the adapter loads
    pub fn announce(&self) -> Message {
        Message::Ready {
            target_id: self.target_id.clone(),
        }
    }

    pub fn accepts_origin(&self, origin: &str) -> bool {
        origin.starts_with(&self.config.coordinator_origin_prefix)
    }

    /// Handle one coordinator message
    pub async fn handle(&self, envelope: Envelope) -> Result<Handled, PageError> {
        let Envelope { origin, message } = envelope;
        debug!(%origin, kind = message.kind(), "Adapter::handle: called");

        if !self.accepts_origin(&origin) {
            return Ok(self.ignore(Refusal::ForeignOrigin(origin)));
        }
        if message.target_id() != &self.target_id {
            return Ok(self.ignore(Refusal::OtherTarget(message.target_id().clone())));
        }

        match message {
            Message::Inject { text, attachments, .. } => {
                let chars = text.chars().count();
                if chars > MAX_TEXT_CHARS {
                    return Ok(self.ignore(Refusal::TooLong(chars)));
                }
                let report = self.inject(&text, &attachments).await?;
                Ok(Handled::Injected(report))
            }
            Message::ExtractRequest { .. } => {
                let text = self.extract().await?.unwrap_or_default();
                Ok(Handled::Reply(Message::ExtractResponse {
                    target_id: self.target_id.clone(),
                    text,
                }))
            }
            other => Ok(self.ignore(Refusal::WrongDirection(other.kind()))),
        }
    }

    fn ignore(&self, refusal: Refusal) -> Handled {
        debug!(target_id = %self.target_id, %refusal, "Adapter: ignoring message");
        Handled::Ignored(refusal)
    }

    /// Run one injection; concurrent calls queue behind each other
    pub async fn inject(&self, text: &str, attachments: &[mosaic_core::Attachment]) -> Result<InjectionReport, PageError> {
        let _guard = self.injecting.lock().await;
        Injector::new(self.page.as_ref(), self.profile, &self.config, self.images)
            .run(text, attachments)
            .await
    }

    /// Latest answer on the page; never waits on an injection
    pub async fn extract(&self) -> Result<Option<String>, PageError> {
        let html = self.page.snapshot().await?;
        Ok(extract::extract(&html, self.profile))
    }

    /// Serve messages until the inbox closes
    ///
    /// Each message is handled on its own task so an extraction request is answered
    /// while an injection is still settling. Replies go to `outbox`.
    pub async fn serve(self: Arc<Self>, mut inbox: mpsc::Receiver<Envelope>, outbox: mpsc::Sender<Message>) {
        info!(target_id = %self.target_id, "Adapter serving");
        if outbox.send(self.announce()).await.is_err() {
            warn!(target_id = %self.target_id, "Outbox closed before readiness handshake");
            return;
        }

        while let Some(envelope) = inbox.recv().await {
            let adapter = self.clone();
            let outbox = outbox.clone();
            tokio::spawn(async move {
                match adapter.handle(envelope).await {
                    Ok(Handled::Reply(reply)) => {
                        let kind = reply.kind();
                        if outbox.send(reply).await.is_err() {
                            warn!(target_id = %adapter.target_id, kind, "Adapter: outbox closed, reply dropped");
                        }
                    }
                    Ok(Handled::Injected(report)) => {
                        debug!(target_id = %adapter.target_id, state = %report.state(), "Adapter: injection finished");
                    }
                    Ok(Handled::Ignored(_)) => {}
                    Err(e) => warn!(target_id = %adapter.target_id, error = %e, "Adapter: page error"),
                }
            });
        }
        info!(target_id = %self.target_id, "Adapter inbox closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{Action, HtmlPage};
    use mosaic_core::TargetRegistry;
    use std::time::Duration;

    const COORDINATOR: &str = "chrome-extension://abcdef";

    const CLAUDE_PAGE: &str = r#"<html><body>
        <div class="font-claude-message"><p>Earlier answer</p></div>
        <div class="ProseMirror" contenteditable="true"></div>
        <button aria-label="Send message">Send</button>
    </body></html>"#;

    fn adapter(target: &str, page: Arc<HtmlPage>, config: AdapterConfig) -> Adapter {
        let registry = TargetRegistry::builtin();
        Adapter::new(registry.get(target).unwrap(), page, config)
    }

    fn envelope(origin: &str, message: Message) -> Envelope {
        Envelope {
            origin: origin.to_string(),
            message,
        }
    }

    fn inject(target: &str, text: &str) -> Message {
        Message::Inject {
            target_id: TargetId::from(target),
            text: text.to_string(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_foreign_origin_is_ignored() {
        let page = Arc::new(HtmlPage::new(CLAUDE_PAGE));
        let adapter = adapter("claude", page.clone(), AdapterConfig::immediate());

        let handled = adapter
            .handle(envelope("https://evil.example", inject("claude", "hi")))
            .await
            .unwrap();
        assert!(matches!(handled, Handled::Ignored(Refusal::ForeignOrigin(_))));
        assert!(page.journal().is_empty());
    }

    #[tokio::test]
    async fn test_message_for_other_target_is_ignored() {
        let page = Arc::new(HtmlPage::new(CLAUDE_PAGE));
        let adapter = adapter("claude", page.clone(), AdapterConfig::immediate());

        let handled = adapter.handle(envelope(COORDINATOR, inject("grok", "hi"))).await.unwrap();
        assert!(matches!(handled, Handled::Ignored(Refusal::OtherTarget(_))));
        assert!(page.journal().is_empty());
    }

    #[tokio::test]
    async fn test_over_length_prompt_is_ignored() {
        let page = Arc::new(HtmlPage::new(CLAUDE_PAGE));
        let adapter = adapter("claude", page.clone(), AdapterConfig::immediate());

        let text = "x".repeat(MAX_TEXT_CHARS + 1);
        let handled = adapter.handle(envelope(COORDINATOR, inject("claude", &text))).await.unwrap();
        assert!(matches!(handled, Handled::Ignored(Refusal::TooLong(100_001))));
        assert!(page.journal().is_empty());
    }

    #[tokio::test]
    async fn test_inject_runs_state_machine() {
        let page = Arc::new(HtmlPage::new(CLAUDE_PAGE));
        let adapter = adapter("claude", page.clone(), AdapterConfig::immediate());

        let handled = adapter.handle(envelope(COORDINATOR, inject("claude", "hello"))).await.unwrap();
        match handled {
            Handled::Injected(report) => assert!(report.succeeded()),
            other => panic!("Unexpected: {:?}", other),
        }
        assert!(matches!(page.journal().last(), Some(Action::Click(_))));
    }

    #[tokio::test]
    async fn test_extract_request_replies_with_answer() {
        let page = Arc::new(HtmlPage::new(CLAUDE_PAGE));
        let adapter = adapter("claude", page, AdapterConfig::immediate());

        let handled = adapter
            .handle(envelope(
                COORDINATOR,
                Message::ExtractRequest {
                    target_id: TargetId::from("claude"),
                },
            ))
            .await
            .unwrap();
        match handled {
            Handled::Reply(Message::ExtractResponse { target_id, text }) => {
                assert_eq!(target_id.as_str(), "claude");
                assert_eq!(text, "Earlier answer");
            }
            other => panic!("Unexpected: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_answered_while_injection_settles() {
        let page = Arc::new(HtmlPage::new(CLAUDE_PAGE));
        let config = AdapterConfig {
            submit_delay_ms: Some(5_000),
            ..AdapterConfig::immediate()
        };
        let adapter = Arc::new(adapter("claude", page, config));
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        tokio::spawn(adapter.clone().serve(in_rx, out_tx));

        assert!(matches!(out_rx.recv().await, Some(Message::Ready { .. })));

        in_tx.send(envelope(COORDINATOR, inject("claude", "slow"))).await.unwrap();
        in_tx
            .send(envelope(
                COORDINATOR,
                Message::ExtractRequest {
                    target_id: TargetId::from("claude"),
                },
            ))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let reply = out_rx.recv().await.unwrap();
        assert!(matches!(reply, Message::ExtractResponse { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_closed_outbox_does_not_stop_serving() {
        let page = Arc::new(HtmlPage::new(CLAUDE_PAGE));
        let adapter = Arc::new(adapter("claude", page.clone(), AdapterConfig::immediate()));
        let (in_tx, in_rx) = mpsc::channel(8);
        let (out_tx, mut out_rx) = mpsc::channel(8);
        let serving = tokio::spawn(adapter.serve(in_rx, out_tx));

        assert!(matches!(out_rx.recv().await, Some(Message::Ready { .. })));
        drop(out_rx);

        // The reply has nowhere to go, but later messages are still handled
        in_tx
            .send(envelope(
                COORDINATOR,
                Message::ExtractRequest {
                    target_id: TargetId::from("claude"),
                },
            ))
            .await
            .unwrap();
        in_tx.send(envelope(COORDINATOR, inject("claude", "still here"))).await.unwrap();

        for _ in 0..100 {
            if !page.journal().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!page.journal().is_empty());

        drop(in_tx);
        assert!(tokio::time::timeout(Duration::from_secs(5), serving).await.is_ok());
    }
}
