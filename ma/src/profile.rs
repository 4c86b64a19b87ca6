//! Per-target page profiles
//!
//! Each target's page is described by data, not code: where its input lives, how text
//! is inserted, which controls submit, where images can be dropped and where answers
//! are rendered. Unknown targets get the generic profile.

use serde::{Deserialize, Serialize};

/// How text reaches the input surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsertStrategy {
    /// Focus plus selectAll/delete/insertText editing commands
    RichText,
    /// Native value setter plus synthetic input/change events
    NativeSetter,
    /// Decide from the located element
    Auto,
}

/// A way to find the submit control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitCandidate {
    /// First element matching the selector
    Css(&'static str),
    /// Parent of the first element matching the selector (icon inside a clickable wrapper)
    ParentOf(&'static str),
    /// First button whose aria-label contains the keyword, case-insensitive
    AriaContains(&'static str),
    /// First button whose class contains the keyword, case-insensitive
    ClassContains(&'static str),
}

impl std::fmt::Display for SubmitCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmitCandidate::Css(sel) => write!(f, "{}", sel),
            SubmitCandidate::ParentOf(sel) => write!(f, "parent of {}", sel),
            SubmitCandidate::AriaContains(kw) => write!(f, "button[aria-label~{}]", kw),
            SubmitCandidate::ClassContains(kw) => write!(f, "button[class~{}]", kw),
        }
    }
}

/// Static description of one target's page
#[derive(Debug, Clone, Copy)]
pub struct TargetProfile {
    pub name: &'static str,
    /// Input selectors, tried in declared order
    pub input: &'static [&'static str],
    /// Tried once after the locate budget runs out
    pub fallback: Option<&'static str>,
    pub insert: InsertStrategy,
    pub submit: &'static [SubmitCandidate],
    pub submit_delay_ms: u64,
    /// Also press Enter after a click, for sites whose send control ignores clicks
    pub enter_after_click: bool,
    /// Containers that take a synthetic drop after the paste
    pub drop_zones: &'static [&'static str],
    /// Answer selectors; the last match of the first yielding text wins
    pub extract: &'static [&'static str],
}

pub const GENERIC_INPUTS: &[&str] = &[
    r#"[contenteditable="true"][role="textbox"]"#,
    r#".ProseMirror[contenteditable="true"]"#,
    "textarea",
];

pub const GENERIC_SUBMIT: &[SubmitCandidate] = &[
    SubmitCandidate::AriaContains("send"),
    SubmitCandidate::AriaContains("submit"),
    SubmitCandidate::ClassContains("send"),
    SubmitCandidate::ClassContains("submit"),
];

/// Broad answer containers; matches here must carry more than a few words
pub const GENERIC_EXTRACT: &[&str] = &[
    r#"[class*="assistant"] [class*="markdown"]"#,
    r#"[class*="response"] [class*="markdown"]"#,
    r#"[class*="message"][class*="bot"]"#,
    r#"[class*="answer"]"#,
    ".markdown",
    ".prose",
];

pub const GENERIC: TargetProfile = TargetProfile {
    name: "generic",
    input: GENERIC_INPUTS,
    fallback: None,
    insert: InsertStrategy::Auto,
    submit: GENERIC_SUBMIT,
    submit_delay_ms: 600,
    enter_after_click: false,
    drop_zones: &[],
    extract: &[],
};

const PROFILES: &[TargetProfile] = &[
    TargetProfile {
        name: "chatgpt",
        input: &["#prompt-textarea"],
        fallback: None,
        insert: InsertStrategy::Auto,
        submit: &[
            SubmitCandidate::Css(r#"button[data-testid="send-button"]"#),
            SubmitCandidate::Css(r#"button[aria-label="Send prompt"]"#),
            SubmitCandidate::Css("button.composer-submit-button-color"),
        ],
        submit_delay_ms: 700,
        enter_after_click: false,
        drop_zones: &[],
        extract: &[
            r#"[data-message-author-role="assistant"] .markdown"#,
            r#"[data-message-author-role="assistant"]"#,
        ],
    },
    TargetProfile {
        name: "gemini",
        input: &[r#".ql-editor[contenteditable="true"]"#],
        fallback: None,
        insert: InsertStrategy::RichText,
        submit: &[
            SubmitCandidate::Css("button.send-button"),
            SubmitCandidate::Css(r#"button[aria-label="Send message"]"#),
        ],
        submit_delay_ms: 600,
        enter_after_click: false,
        drop_zones: &[],
        extract: &["model-response .markdown", "model-response", ".response-content"],
    },
    TargetProfile {
        name: "claude",
        input: &[
            r#".ProseMirror[contenteditable="true"]"#,
            r#"div[aria-label="Write your prompt to Claude"]"#,
        ],
        fallback: None,
        insert: InsertStrategy::RichText,
        submit: &[SubmitCandidate::AriaContains("send")],
        submit_delay_ms: 700,
        enter_after_click: false,
        drop_zones: &[],
        extract: &[".font-claude-message", "[data-is-streaming] .markdown", ".prose"],
    },
    TargetProfile {
        name: "grok",
        input: &[r#".tiptap.ProseMirror[contenteditable="true"]"#],
        // Older layout used a plain textarea
        fallback: Some("textarea"),
        insert: InsertStrategy::Auto,
        submit: &[SubmitCandidate::Css(r#"button[aria-label="Submit"]"#)],
        submit_delay_ms: 600,
        enter_after_click: false,
        drop_zones: &[],
        extract: &[
            ".message-bubble:last-of-type",
            r#"[class*="assistant"] [class*="markdown"]"#,
        ],
    },
    TargetProfile {
        name: "zai",
        input: &["#chat-input", "textarea"],
        fallback: None,
        insert: InsertStrategy::Auto,
        submit: &[
            SubmitCandidate::Css(".sendMessageButton"),
            SubmitCandidate::Css(r#"button[class*="sendMessage"]"#),
        ],
        submit_delay_ms: 500,
        enter_after_click: false,
        drop_zones: &[],
        extract: &[".assistant-message", r#"[class*="botMessage"]"#],
    },
    TargetProfile {
        name: "kimi",
        input: &[r#".chat-input-editor[contenteditable="true"]"#],
        fallback: None,
        // Editor state only updates through editing commands
        insert: InsertStrategy::RichText,
        submit: &[
            SubmitCandidate::Css(".send-button-container:not(.disabled)"),
            SubmitCandidate::ParentOf(".send-button-container .send-icon"),
        ],
        submit_delay_ms: 600,
        enter_after_click: true,
        drop_zones: &[],
        extract: &[".chat-message-content .markdown", ".chat-message-content"],
    },
    TargetProfile {
        name: "deepseek",
        input: &["textarea"],
        fallback: None,
        insert: InsertStrategy::Auto,
        submit: GENERIC_SUBMIT,
        submit_delay_ms: 600,
        enter_after_click: false,
        drop_zones: &[".chat-input-container", "textarea"],
        extract: &[".ds-markdown", r#"[class*="assistant"] .markdown"#],
    },
    TargetProfile {
        name: "perplexity",
        input: &["textarea"],
        fallback: None,
        insert: InsertStrategy::Auto,
        submit: GENERIC_SUBMIT,
        submit_delay_ms: 600,
        enter_after_click: false,
        drop_zones: &[r#"[class*="input"]"#, "textarea"],
        extract: &[r".prose.dark\:prose-invert", r#"[class*="answer"]"#],
    },
    TargetProfile {
        name: "mistral",
        input: &["textarea"],
        fallback: None,
        insert: InsertStrategy::Auto,
        submit: GENERIC_SUBMIT,
        submit_delay_ms: 600,
        enter_after_click: false,
        drop_zones: &[r#"[class*="chat-input"]"#, "textarea"],
        extract: &[".prose", r#"[class*="assistant"]"#],
    },
];

/// Profile for a target id, or the generic profile
pub fn profile_for(target_id: &str) -> &'static TargetProfile {
    PROFILES.iter().find(|p| p.name == target_id).unwrap_or(&GENERIC)
}

/// Every specific profile
pub fn profiles() -> &'static [TargetProfile] {
    PROFILES
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::TargetRegistry;
    use scraper::Selector;

    #[test]
    fn test_every_builtin_target_has_a_profile() {
        for target in TargetRegistry::builtin().iter() {
            assert_eq!(profile_for(target.id.as_str()).name, target.id.as_str());
        }
    }

    #[test]
    fn test_unknown_target_gets_generic() {
        assert_eq!(profile_for("bard").name, "generic");
    }

    #[test]
    fn test_all_selectors_parse() {
        let mut selectors: Vec<&str> = GENERIC_INPUTS.iter().chain(GENERIC_EXTRACT).copied().collect();
        for profile in profiles() {
            selectors.extend(profile.input);
            selectors.extend(profile.fallback);
            selectors.extend(profile.drop_zones);
            selectors.extend(profile.extract);
            for candidate in profile.submit {
                if let SubmitCandidate::Css(sel) | SubmitCandidate::ParentOf(sel) = candidate {
                    selectors.push(sel);
                }
            }
        }
        for sel in selectors {
            assert!(Selector::parse(sel).is_ok(), "selector failed to parse: {}", sel);
        }
    }
}
