//! Attachment extraction from message content parts.

use std::sync::OnceLock;

use regex::Regex;

use super::openai::ContentPart;
use super::types::{AttachmentKind, AttachmentRequest};

const FILE_NAME_TAG: &str = "[file name]:";
const CONTENT_BEGIN: &str = "[file content begin]";
const CONTENT_END: &str = "[file content end]";

/// MIME type given to documents embedded in message text.
pub const EMBEDDED_FILE_MIME: &str = "text/markdown";

static FILE_NAME_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();

fn file_name_pattern() -> Option<&'static Regex> {
    FILE_NAME_PATTERN
        .get_or_init(|| Regex::new(r"\[file name\]:\s*([^\n]+)").ok())
        .as_ref()
}

/// Attachments found in a message, plus the text left for the item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Pending uploads, in part order.
    pub attachments: Vec<AttachmentRequest>,
    /// Text of the last text part, emptied when it carried a file.
    pub text: String,
}

/// Split content parts into attachments and message text.
#[must_use]
pub fn extract(parts: &[ContentPart]) -> Extraction {
    let mut extraction = Extraction::default();

    for part in parts {
        match part.kind.as_str() {
            "text" => {
                let text = part.text.clone().unwrap_or_default();
                if let Some((file_name, content)) = extract_embedded_file(&text) {
                    extraction.attachments.push(AttachmentRequest {
                        kind: AttachmentKind::Document,
                        data: content,
                        file_name: Some(file_name),
                        mime_type: Some(EMBEDDED_FILE_MIME.to_string()),
                    });
                    extraction.text = String::new();
                } else {
                    extraction.text = text;
                }
            }
            "image_url" => match &part.image_url {
                Some(image) => extraction.attachments.push(AttachmentRequest {
                    kind: AttachmentKind::ImageUrl,
                    data: image.url.clone(),
                    file_name: None,
                    mime_type: None,
                }),
                None => tracing::warn!("image_url part without an image_url field, skipping"),
            },
            other => tracing::warn!(kind = other, "Unsupported content part type, skipping"),
        }
    }

    extraction
}

/// Find a file embedded in text with the name/begin/end marker convention.
///
/// Returns the trimmed file name and content, or `None` when any marker is
/// missing or the end marker does not follow the begin marker.
#[must_use]
pub fn extract_embedded_file(text: &str) -> Option<(String, String)> {
    if !text.contains(FILE_NAME_TAG) || !text.contains(CONTENT_BEGIN) {
        return None;
    }

    let file_name = file_name_pattern()?
        .captures(text)?
        .get(1)?
        .as_str()
        .trim()
        .to_string();

    let start = text.find(CONTENT_BEGIN)? + CONTENT_BEGIN.len();
    let end = start + text[start..].find(CONTENT_END)?;

    Some((file_name, text[start..end].trim().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "[file name]: report.md\n[file content begin]\n# Q3\nRevenue up.\n[file content end]\nPlease summarise.";

    #[test]
    fn test_well_formed_markers() {
        let extraction = extract(&[ContentPart::text(REPORT)]);

        assert_eq!(extraction.attachments.len(), 1);
        assert!(extraction.text.is_empty());

        let doc = &extraction.attachments[0];
        assert_eq!(doc.kind, AttachmentKind::Document);
        assert_eq!(doc.file_name.as_deref(), Some("report.md"));
        assert_eq!(doc.mime_type.as_deref(), Some("text/markdown"));
        assert_eq!(doc.data, "# Q3\nRevenue up.");
    }

    #[test]
    fn test_missing_end_marker_leaves_text() {
        let text = "[file name]: report.md\n[file content begin]\nno end here";
        let extraction = extract(&[ContentPart::text(text)]);

        assert!(extraction.attachments.is_empty());
        assert_eq!(extraction.text, text);
    }

    #[test]
    fn test_end_before_begin_is_malformed() {
        let text = "[file name]: a.md\n[file content end]\n[file content begin]\nbody";
        assert!(extract_embedded_file(text).is_none());
    }

    #[test]
    fn test_name_without_begin_is_malformed() {
        assert!(extract_embedded_file("[file name]: a.md\njust text").is_none());
    }

    #[test]
    fn test_images_and_last_text_wins() {
        let parts = vec![
            ContentPart::text("first"),
            ContentPart::image("data:image/png;base64,iVBORw0KGgo="),
            ContentPart::text("second"),
            ContentPart::image("https://example.com/cat.jpg"),
        ];
        let extraction = extract(&parts);

        assert_eq!(extraction.text, "second");
        assert_eq!(extraction.attachments.len(), 2);
        assert!(extraction
            .attachments
            .iter()
            .all(|a| a.kind == AttachmentKind::ImageUrl));
        assert_eq!(extraction.attachments[1].data, "https://example.com/cat.jpg");
    }

    #[test]
    fn test_unknown_parts_are_skipped() {
        let part = ContentPart {
            kind: "input_audio".to_string(),
            text: None,
            image_url: None,
        };
        let extraction = extract(&[part, ContentPart::text("hi")]);
        assert!(extraction.attachments.is_empty());
        assert_eq!(extraction.text, "hi");
    }
}
