//! Privileged relay
//!
//! The relay has wider reach than any single frame: it can see every live surface and
//! re-address an injection to each one whose location belongs to a target's registered
//! domain. It is the fallback route when a target's frame cannot be addressed directly.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::protocol::Message;
use crate::request::MAX_TEXT_CHARS;
use crate::target::{TargetId, TargetRegistry, domain_matches};
use crate::transport::TransportError;

/// A live surface (tab or frame) the relay can reach
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    pub id: String,
    pub url: Url,
}

/// Enumerates and addresses live surfaces
#[async_trait]
pub trait SurfaceDirectory: Send + Sync {
    async fn live_surfaces(&self) -> Vec<Surface>;

    async fn dispatch(&self, surface: &Surface, message: Message) -> Result<(), TransportError>;
}

/// Relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Longest text the relay will carry
    #[serde(rename = "max-text-chars", default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_max_text_chars() -> usize {
    MAX_TEXT_CHARS
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_text_chars: default_max_text_chars(),
        }
    }
}

/// A broadcast request naming one target identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayRequest {
    #[serde(rename = "target-id")]
    pub target_id: TargetId,
    pub text: String,
}

/// Result of a relay attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Unknown target or over-length text; nothing was sent
    Dropped,
    /// `matched` surfaces were on the target's domain, `delivered` accepted the message
    Dispatched { matched: usize, delivered: usize },
}

impl RelayOutcome {
    pub fn delivered(&self) -> usize {
        match self {
            RelayOutcome::Dropped => 0,
            RelayOutcome::Dispatched { delivered, .. } => *delivered,
        }
    }
}

/// Re-dispatches requests to every live surface of a validated target
pub struct Relay {
    domains: HashMap<TargetId, String>,
    directory: Arc<dyn SurfaceDirectory>,
    config: RelayConfig,
}

impl Relay {
    pub fn new(registry: &TargetRegistry, directory: Arc<dyn SurfaceDirectory>, config: RelayConfig) -> Self {
        let domains = registry.iter().map(|t| (t.id.clone(), t.domain.clone())).collect();
        Self {
            domains,
            directory,
            config,
        }
    }

    pub async fn relay(&self, request: RelayRequest) -> RelayOutcome {
        debug!(target_id = %request.target_id, chars = request.text.len(), "Relay::relay: called");

        let Some(domain) = self.domains.get(&request.target_id) else {
            debug!(target_id = %request.target_id, "Relay::relay: unknown target, dropping");
            return RelayOutcome::Dropped;
        };

        if request.text.chars().count() > self.config.max_text_chars {
            debug!(target_id = %request.target_id, "Relay::relay: text over limit, dropping");
            return RelayOutcome::Dropped;
        }

        let surfaces: Vec<Surface> = self
            .directory
            .live_surfaces()
            .await
            .into_iter()
            .filter(|s| s.url.host_str().is_some_and(|host| domain_matches(host, domain)))
            .collect();

        let matched = surfaces.len();
        let message = Message::Inject {
            target_id: request.target_id.clone(),
            text: request.text,
            attachments: Vec::new(),
        };

        let sends = surfaces.iter().map(|surface| {
            let message = message.clone();
            async move {
                match self.directory.dispatch(surface, message).await {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(surface = %surface.id, error = %e, "Relay dispatch failed");
                        false
                    }
                }
            }
        });
        let delivered = join_all(sends).await.into_iter().filter(|ok| *ok).count();

        info!(target_id = %request.target_id, matched, delivered, "Relayed injection");
        RelayOutcome::Dispatched { matched, delivered }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tabs {
        surfaces: Vec<Surface>,
        failing: Vec<String>,
        sent: Mutex<Vec<(String, Message)>>,
    }

    impl Tabs {
        fn new(urls: &[(&str, &str)]) -> Self {
            Self {
                surfaces: urls
                    .iter()
                    .map(|(id, url)| Surface {
                        id: id.to_string(),
                        url: Url::parse(url).unwrap(),
                    })
                    .collect(),
                failing: Vec::new(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SurfaceDirectory for Tabs {
        async fn live_surfaces(&self) -> Vec<Surface> {
            self.surfaces.clone()
        }

        async fn dispatch(&self, surface: &Surface, message: Message) -> Result<(), TransportError> {
            if self.failing.contains(&surface.id) {
                return Err(TransportError::Failed("tab gone".to_string()));
            }
            self.sent.lock().unwrap().push((surface.id.clone(), message));
            Ok(())
        }
    }

    fn relay_with(tabs: Arc<Tabs>) -> Relay {
        Relay::new(&TargetRegistry::builtin(), tabs, RelayConfig::default())
    }

    #[tokio::test]
    async fn test_relays_to_every_matching_surface() {
        let tabs = Arc::new(Tabs::new(&[
            ("1", "https://www.kimi.com/chat/abc"),
            ("2", "https://kimi.com/"),
            ("3", "https://chatgpt.com/"),
            ("4", "https://notkimi.com/"),
        ]));
        let relay = relay_with(tabs.clone());

        let outcome = relay
            .relay(RelayRequest {
                target_id: TargetId::from("kimi"),
                text: "hello".to_string(),
            })
            .await;

        assert_eq!(outcome, RelayOutcome::Dispatched { matched: 2, delivered: 2 });
        let sent = tabs.sent.lock().unwrap();
        let ids: Vec<&str> = sent.iter().map(|(id, _)| id.as_str()).collect();
        assert!(ids.contains(&"1") && ids.contains(&"2"));
        assert!(matches!(&sent[0].1, Message::Inject { text, .. } if text == "hello"));
    }

    #[tokio::test]
    async fn test_unknown_target_has_no_side_effect() {
        let tabs = Arc::new(Tabs::new(&[("1", "https://chatgpt.com/")]));
        let relay = relay_with(tabs.clone());

        let outcome = relay
            .relay(RelayRequest {
                target_id: TargetId::from("bard"),
                text: "hello".to_string(),
            })
            .await;

        assert_eq!(outcome, RelayOutcome::Dropped);
        assert!(tabs.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_over_length_text_is_dropped() {
        let tabs = Arc::new(Tabs::new(&[("1", "https://chatgpt.com/")]));
        let relay = relay_with(tabs.clone());

        let outcome = relay
            .relay(RelayRequest {
                target_id: TargetId::from("chatgpt"),
                text: "x".repeat(MAX_TEXT_CHARS + 1),
            })
            .await;

        assert_eq!(outcome, RelayOutcome::Dropped);
        assert!(tabs.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_surface_does_not_stop_others() {
        let mut tabs = Tabs::new(&[("1", "https://claude.ai/new"), ("2", "https://claude.ai/chat/1")]);
        tabs.failing.push("1".to_string());
        let tabs = Arc::new(tabs);
        let relay = relay_with(tabs.clone());

        let outcome = relay
            .relay(RelayRequest {
                target_id: TargetId::from("claude"),
                text: "hi".to_string(),
            })
            .await;

        assert_eq!(outcome, RelayOutcome::Dispatched { matched: 2, delivered: 1 });
        assert_eq!(outcome.delivered(), 1);
    }
}
