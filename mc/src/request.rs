//! Injection requests
//!
//! An [`InjectionRequest`] is built once per user action and never mutated afterwards.
//! The constructor is strict: a request that exists has already passed every check.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::attachment::{self, Attachment, AttachmentError};
use crate::target::TargetId;

/// Maximum prompt length in characters
pub const MAX_TEXT_CHARS: usize = 100_000;

/// Reasons a request is refused before any delivery attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Prompt is {chars} characters; the limit is {limit}")]
    TextTooLong { chars: usize, limit: usize },

    #[error("Nothing to send: prompt is empty and there are no attachments")]
    Empty,

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error(transparent)]
    Attachment(#[from] AttachmentError),
}

/// Check prompt length against the character ceiling
pub fn check_text(text: &str) -> Result<(), ValidationError> {
    let chars = text.chars().count();
    if chars > MAX_TEXT_CHARS {
        return Err(ValidationError::TextTooLong {
            chars,
            limit: MAX_TEXT_CHARS,
        });
    }
    Ok(())
}

/// A prompt plus optional attachments, ready to fan out
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectionRequest {
    id: Uuid,
    text: String,
    attachments: Vec<Attachment>,
}

impl InjectionRequest {
    /// Build a validated request; any failing attachment voids the request
    pub fn new(text: impl Into<String>, attachments: Vec<Attachment>) -> Result<Self, ValidationError> {
        let text = text.into();
        debug!(chars = text.len(), attachments = attachments.len(), "InjectionRequest::new: called");
        check_text(&text)?;
        attachment::validate_batch(&attachments)?;
        if text.trim().is_empty() && attachments.is_empty() {
            return Err(ValidationError::Empty);
        }
        Ok(Self {
            id: Uuid::now_v7(),
            text,
            attachments,
        })
    }

    /// Text-only convenience constructor
    pub fn text(text: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(text, Vec::new())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn prompt(&self) -> &str {
        &self.text
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Wire message addressed to one target
    pub fn addressed_to(&self, target_id: &TargetId) -> crate::protocol::Message {
        crate::protocol::Message::Inject {
            target_id: target_id.clone(),
            text: self.text.clone(),
            attachments: self.attachments.clone(),
        }
    }
}

/// A request produced by lenient composition, with the warnings to show the user
#[derive(Debug, Clone)]
pub struct Composed {
    pub request: InjectionRequest,
    pub warnings: Vec<AttachmentError>,
}

/// How attachment problems are handled when composing from user input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttachmentPolicy {
    /// Drop offending attachments, warn, and still send the text
    #[default]
    Drop,
    /// Refuse the whole send
    Reject,
}

/// Compose a request from raw user input under the given attachment policy
///
/// Text problems always reject. Attachment problems reject or are dropped with
/// warnings depending on `policy`.
pub fn compose(
    text: impl Into<String>,
    attachments: Vec<Attachment>,
    policy: AttachmentPolicy,
) -> Result<Composed, ValidationError> {
    let text = text.into();
    debug!(?policy, attachments = attachments.len(), "compose: called");
    check_text(&text)?;

    match policy {
        AttachmentPolicy::Reject => {
            let request = InjectionRequest::new(text, attachments)?;
            Ok(Composed {
                request,
                warnings: Vec::new(),
            })
        }
        AttachmentPolicy::Drop => {
            let (kept, warnings) = attachment::screen(attachments);
            let request = InjectionRequest::new(text, kept)?;
            Ok(Composed { request, warnings })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png() -> Attachment {
        Attachment::new("image/png", vec![1, 2, 3])
    }

    #[test]
    fn test_text_at_limit_is_accepted() {
        let text = "a".repeat(MAX_TEXT_CHARS);
        assert!(InjectionRequest::text(text).is_ok());
    }

    #[test]
    fn test_text_over_limit_is_rejected() {
        let text = "a".repeat(MAX_TEXT_CHARS + 1);
        assert_eq!(
            InjectionRequest::text(text),
            Err(ValidationError::TextTooLong {
                chars: 100_001,
                limit: 100_000
            })
        );
    }

    #[test]
    fn test_limit_counts_characters_not_bytes() {
        let text = "é".repeat(MAX_TEXT_CHARS);
        assert!(text.len() > MAX_TEXT_CHARS);
        assert!(check_text(&text).is_ok());
    }

    #[test]
    fn test_empty_request_is_rejected() {
        assert_eq!(InjectionRequest::text("   "), Err(ValidationError::Empty));
        assert!(InjectionRequest::new("", vec![png()]).is_ok());
    }

    #[test]
    fn test_strict_constructor_produces_nothing_for_bad_attachment() {
        let result = InjectionRequest::new("hi", vec![png(), Attachment::new("image/tiff", vec![1])]);
        assert!(matches!(result, Err(ValidationError::Attachment(_))));

        let five = (0..5).map(|_| png()).collect();
        assert!(matches!(
            InjectionRequest::new("hi", five),
            Err(ValidationError::Attachment(AttachmentError::TooMany { .. }))
        ));
    }

    #[test]
    fn test_compose_drop_policy_keeps_text() {
        let five = (0..5).map(|_| png()).collect();
        let composed = compose("describe these", five, AttachmentPolicy::Drop).unwrap();
        assert_eq!(composed.request.attachments().len(), 4);
        assert_eq!(composed.request.prompt(), "describe these");
        assert_eq!(composed.warnings.len(), 1);
    }

    #[test]
    fn test_compose_reject_policy_refuses() {
        let bad = vec![Attachment::new("image/bmp", vec![1])];
        assert!(compose("hi", bad, AttachmentPolicy::Reject).is_err());
    }

    #[test]
    fn test_compose_rejects_long_text_under_either_policy() {
        let text = "x".repeat(MAX_TEXT_CHARS + 1);
        assert!(compose(text.clone(), vec![], AttachmentPolicy::Drop).is_err());
        assert!(compose(text, vec![], AttachmentPolicy::Reject).is_err());
    }

    #[test]
    fn test_addressed_to_builds_inject_message() {
        let request = InjectionRequest::new("hello", vec![png()]).unwrap();
        let msg = request.addressed_to(&TargetId::from("claude"));
        match msg {
            crate::protocol::Message::Inject {
                target_id,
                text,
                attachments,
            } => {
                assert_eq!(target_id.as_str(), "claude");
                assert_eq!(text, "hello");
                assert_eq!(attachments.len(), 1);
            }
            other => panic!("Wrong message: {:?}", other),
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_text_accepted_iff_within_limit(extra in 0usize..64, over in proptest::bool::ANY) {
            let len = if over { MAX_TEXT_CHARS + 1 + extra } else { MAX_TEXT_CHARS - extra };
            let result = InjectionRequest::text("é".repeat(len));
            proptest::prop_assert_eq!(result.is_ok(), !over);
        }

        #[test]
        fn prop_never_more_than_four_attachments(count in 0usize..10) {
            let attachments: Vec<Attachment> = (0..count).map(|_| png()).collect();
            let composed = compose("hi", attachments, AttachmentPolicy::Drop).unwrap();
            proptest::prop_assert_eq!(composed.request.attachments().len(), count.min(4));
        }
    }
}
