//! Image attachments and their validation policies
//!
//! Two policies share the same checks:
//! - [`validate_batch`] is fail-closed: one bad item voids the whole batch.
//! - [`screen`] is lenient: bad or excess items are dropped and reported as warnings.

use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

/// Maximum attachments per request
pub const MAX_ATTACHMENTS: usize = 4;

/// Maximum decoded size of one attachment (10 MiB)
pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;

/// Media types accepted for attachments
pub const ALLOWED_MEDIA_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// A binary image payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "media-type")]
    pub media_type: String,

    #[serde(serialize_with = "serialize_bytes", deserialize_with = "deserialize_bytes")]
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: None,
            media_type: media_type.into(),
            data,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// File name to present to the target, defaulting by media type
    pub fn file_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let ext = match self.media_type.as_str() {
            "image/jpeg" => "jpg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => "png",
        };
        format!("image.{}", ext)
    }
}

/// Map a file extension to an allowed media type
pub fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn serialize_bytes<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    serializer.serialize_str(&encoded)
}

fn deserialize_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let encoded = String::deserialize(deserializer)?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| serde::de::Error::custom(e.to_string()))
}

/// Reasons an attachment (or a batch of them) is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttachmentError {
    #[error("Attachment {index}: unsupported media type '{media_type}'")]
    UnsupportedMediaType { index: usize, media_type: String },

    #[error("Attachment {index}: {bytes} bytes exceeds the {limit}-byte limit")]
    TooLarge { index: usize, bytes: usize, limit: usize },

    #[error("Attachment {index}: empty payload")]
    Empty { index: usize },

    #[error("{count} attachments exceeds the limit of {limit}")]
    TooMany { count: usize, limit: usize },
}

/// Check a single attachment's type and size
pub fn check(index: usize, attachment: &Attachment) -> Result<(), AttachmentError> {
    if !ALLOWED_MEDIA_TYPES.contains(&attachment.media_type.as_str()) {
        return Err(AttachmentError::UnsupportedMediaType {
            index,
            media_type: attachment.media_type.clone(),
        });
    }
    if attachment.data.is_empty() {
        return Err(AttachmentError::Empty { index });
    }
    if attachment.byte_len() > MAX_ATTACHMENT_BYTES {
        return Err(AttachmentError::TooLarge {
            index,
            bytes: attachment.byte_len(),
            limit: MAX_ATTACHMENT_BYTES,
        });
    }
    Ok(())
}

/// Fail-closed validation: the first failing check rejects the whole batch
pub fn validate_batch(attachments: &[Attachment]) -> Result<(), AttachmentError> {
    debug!(count = attachments.len(), "validate_batch: called");
    if attachments.len() > MAX_ATTACHMENTS {
        return Err(AttachmentError::TooMany {
            count: attachments.len(),
            limit: MAX_ATTACHMENTS,
        });
    }
    attachments
        .iter()
        .enumerate()
        .try_for_each(|(index, attachment)| check(index, attachment))
}

/// Lenient screening: keep valid items up to the cap, report everything dropped
pub fn screen(attachments: Vec<Attachment>) -> (Vec<Attachment>, Vec<AttachmentError>) {
    debug!(count = attachments.len(), "screen: called");
    let total = attachments.len();
    let mut kept = Vec::with_capacity(total.min(MAX_ATTACHMENTS));
    let mut warnings = Vec::new();

    for (index, attachment) in attachments.into_iter().enumerate() {
        if let Err(e) = check(index, &attachment) {
            warnings.push(e);
        } else if kept.len() < MAX_ATTACHMENTS {
            kept.push(attachment);
        }
    }

    let valid = total - warnings.len();
    if valid > MAX_ATTACHMENTS {
        warnings.push(AttachmentError::TooMany {
            count: valid,
            limit: MAX_ATTACHMENTS,
        });
    }

    (kept, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(len: usize) -> Attachment {
        Attachment::new("image/png", vec![0x89; len])
    }

    #[test]
    fn test_check_accepts_allowed_types() {
        for media_type in ALLOWED_MEDIA_TYPES {
            assert!(check(0, &Attachment::new(*media_type, vec![1, 2, 3])).is_ok());
        }
    }

    #[test]
    fn test_check_rejects_unsupported_type() {
        let err = check(2, &Attachment::new("image/svg+xml", vec![1])).unwrap_err();
        assert_eq!(
            err,
            AttachmentError::UnsupportedMediaType {
                index: 2,
                media_type: "image/svg+xml".to_string()
            }
        );
    }

    #[test]
    fn test_check_rejects_oversized_and_empty() {
        assert!(matches!(
            check(0, &png(MAX_ATTACHMENT_BYTES + 1)),
            Err(AttachmentError::TooLarge { .. })
        ));
        assert!(check(0, &png(MAX_ATTACHMENT_BYTES)).is_ok());
        assert_eq!(check(1, &png(0)), Err(AttachmentError::Empty { index: 1 }));
    }

    #[test]
    fn test_validate_batch_fails_closed() {
        let batch = vec![png(10), Attachment::new("application/pdf", vec![1]), png(10)];
        assert!(validate_batch(&batch).is_err());
        assert!(validate_batch(&[png(10), png(20)]).is_ok());
        assert!(validate_batch(&[]).is_ok());
    }

    #[test]
    fn test_validate_batch_rejects_five() {
        let batch: Vec<_> = (0..5).map(|_| png(4)).collect();
        assert_eq!(
            validate_batch(&batch),
            Err(AttachmentError::TooMany { count: 5, limit: 4 })
        );
    }

    #[test]
    fn test_screen_drops_invalid_and_trims_excess() {
        let mut batch: Vec<_> = (0..5).map(|i| png(i + 1)).collect();
        batch.insert(1, Attachment::new("text/plain", vec![1]));

        let (kept, warnings) = screen(batch);
        assert_eq!(kept.len(), 4);
        assert_eq!(kept[0].byte_len(), 1);
        assert_eq!(kept[3].byte_len(), 4);
        assert_eq!(warnings.len(), 2);
        assert!(matches!(warnings[0], AttachmentError::UnsupportedMediaType { index: 1, .. }));
        assert!(matches!(warnings[1], AttachmentError::TooMany { count: 5, limit: 4 }));
    }

    #[test]
    fn test_serializes_data_as_base64() {
        let attachment = Attachment::new("image/gif", b"GIF89a".to_vec()).with_name("a.gif");
        let json = serde_json::to_value(&attachment).unwrap();
        assert_eq!(json["data"], "R0lGODlh");
        assert_eq!(json["media-type"], "image/gif");

        let back: Attachment = serde_json::from_value(json).unwrap();
        assert_eq!(back, attachment);
    }

    #[test]
    fn test_rejects_invalid_base64() {
        let json = serde_json::json!({"media-type": "image/png", "data": "@@not base64@@"});
        assert!(serde_json::from_value::<Attachment>(json).is_err());
    }

    #[test]
    fn test_file_name_defaults_by_type() {
        assert_eq!(Attachment::new("image/jpeg", vec![1]).file_name(), "image.jpg");
        assert_eq!(png(1).with_name("shot.png").file_name(), "shot.png");
        assert_eq!(media_type_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(media_type_for_extension("bmp"), None);
    }
}
