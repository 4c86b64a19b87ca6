//! Target descriptors and the built-in registry
//!
//! A target is one third-party conversational web app embedded as an untrusted frame.
//! Descriptors are immutable and fixed at process start; the origin derived from each
//! descriptor's URL is the only thing the rest of the system trusts.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

/// Short identity code for a target (e.g. "chatgpt")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(String);

impl TargetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TargetId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TargetId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TargetId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TargetId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Capability flags advertised by a target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Accepts pasted/dropped image attachments
    pub images: bool,
}

/// Immutable description of one target
#[derive(Debug, Clone, Serialize)]
pub struct TargetDescriptor {
    pub id: TargetId,
    pub name: String,
    pub color: String,
    pub icon: String,
    /// Canonical entry URL; its origin is the trust anchor
    pub url: Url,
    /// Registered domain used by the relay to match live surfaces
    pub domain: String,
    pub order: u32,
    pub capabilities: Capabilities,
}

impl TargetDescriptor {
    /// Serialized origin (scheme://host[:port]) of the canonical URL
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }

    /// Whether a surface host belongs to this target's registered domain
    pub fn matches_host(&self, host: &str) -> bool {
        domain_matches(host, &self.domain)
    }
}

/// Exact host match or subdomain match against a registered domain
pub fn domain_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    if domain.is_empty() {
        return false;
    }
    host == domain || host.strip_suffix(&domain).is_some_and(|prefix| prefix.ends_with('.'))
}

struct BuiltinTarget {
    id: &'static str,
    name: &'static str,
    color: &'static str,
    icon: &'static str,
    url: &'static str,
    domain: &'static str,
    images: bool,
}

const BUILTIN_TARGETS: &[BuiltinTarget] = &[
    BuiltinTarget {
        id: "chatgpt",
        name: "ChatGPT",
        color: "#10A37F",
        icon: "●",
        url: "https://chatgpt.com/",
        domain: "chatgpt.com",
        images: true,
    },
    BuiltinTarget {
        id: "gemini",
        name: "Gemini",
        color: "#4285F4",
        icon: "✦",
        url: "https://gemini.google.com/app",
        domain: "gemini.google.com",
        images: true,
    },
    BuiltinTarget {
        id: "claude",
        name: "Claude",
        color: "#D97757",
        icon: "A",
        url: "https://claude.ai/new",
        domain: "claude.ai",
        images: true,
    },
    BuiltinTarget {
        id: "grok",
        name: "Grok",
        color: "#FFFFFF",
        icon: "𝕏",
        url: "https://grok.com/",
        domain: "grok.com",
        images: true,
    },
    BuiltinTarget {
        id: "zai",
        name: "Z.ai",
        color: "#7C3AED",
        icon: "Z",
        url: "https://chat.z.ai/",
        domain: "chat.z.ai",
        images: false,
    },
    BuiltinTarget {
        id: "kimi",
        name: "Kimi",
        color: "#F59E0B",
        icon: "K",
        url: "https://www.kimi.com/",
        domain: "kimi.com",
        images: true,
    },
    BuiltinTarget {
        id: "deepseek",
        name: "DeepSeek",
        color: "#0EA5E9",
        icon: "D",
        url: "https://chat.deepseek.com/",
        domain: "chat.deepseek.com",
        images: true,
    },
    BuiltinTarget {
        id: "perplexity",
        name: "Perplexity",
        color: "#22D3EE",
        icon: "P",
        url: "https://www.perplexity.ai/",
        domain: "perplexity.ai",
        images: true,
    },
    BuiltinTarget {
        id: "mistral",
        name: "Mistral",
        color: "#F97316",
        icon: "M",
        url: "https://chat.mistral.ai/",
        domain: "chat.mistral.ai",
        images: true,
    },
];

/// Targets active when the user has not chosen a working set
pub const DEFAULT_ACTIVE: &[&str] = &["chatgpt", "gemini", "claude", "grok", "zai", "kimi"];

/// Ordered, immutable set of known targets
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: Vec<TargetDescriptor>,
}

impl TargetRegistry {
    /// Build a registry from descriptors, ordered by their `order` field
    pub fn new(mut targets: Vec<TargetDescriptor>) -> Self {
        debug!(count = targets.len(), "TargetRegistry::new: called");
        targets.sort_by_key(|t| t.order);
        Self { targets }
    }

    /// The nine built-in targets
    pub fn builtin() -> Self {
        let targets = BUILTIN_TARGETS
            .iter()
            .zip(1u32..)
            .filter_map(|(t, order)| match Url::parse(t.url) {
                Ok(url) => Some(TargetDescriptor {
                    id: TargetId::from(t.id),
                    name: t.name.to_string(),
                    color: t.color.to_string(),
                    icon: t.icon.to_string(),
                    url,
                    domain: t.domain.to_string(),
                    order,
                    capabilities: Capabilities { images: t.images },
                }),
                Err(e) => {
                    warn!(id = t.id, error = %e, "Skipping builtin target with unparsable URL");
                    None
                }
            })
            .collect();
        Self::new(targets)
    }

    pub fn get(&self, id: &str) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|t| t.id.as_str() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetDescriptor> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target owning the given serialized origin, if any
    pub fn by_origin(&self, origin: &str) -> Option<&TargetDescriptor> {
        self.targets.iter().find(|t| t.origin() == origin)
    }

    /// Allow-list of origins derived from the descriptor set
    pub fn allowed_origins(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.origin()).collect()
    }

    /// Display name for a target id, falling back to the id itself
    pub fn display_name(&self, id: &TargetId) -> String {
        self.get(id.as_str())
            .map(|t| t.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Default working set, restricted to targets this registry knows
    pub fn default_active(&self) -> Vec<TargetId> {
        DEFAULT_ACTIVE
            .iter()
            .filter(|id| self.contains(id))
            .map(|id| TargetId::from(*id))
            .collect()
    }
}

impl Default for TargetRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
