//! Backend wire types: the item chain, file records and upload payloads.

use serde::{Deserialize, Serialize};

/// Marker text of the synthetic root reply.
pub const WELCOME_MARKER: &str = "__RENDER_BOT_WELCOME_MSG__";

/// Index state the backend reports once a file is fully indexed.
pub const INDEX_STATE_DONE: i64 = 3;

/// Kind of turn in a conversation thread.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    /// User turn.
    Question,
    /// Assistant or synthetic turn.
    Reply,
}

/// Payload shape of an item.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Text only.
    #[default]
    Text,
    /// Text with attached files.
    FileWithText,
}

/// One turn of a backend conversation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    /// Conversation this item belongs to.
    pub conversation_id: String,
    /// Predecessor item; empty only for the root.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub parent_item_id: String,
    /// Item identifier.
    pub item_id: String,
    /// Question or reply.
    pub item_type: ItemType,
    /// Item payload.
    pub data: ItemContent,
}

/// Content of an item.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItemContent {
    /// Text or file-with-text.
    #[serde(rename = "type")]
    pub kind: ContentKind,
    /// Text, possibly empty when attachments replace it.
    pub content: String,
    /// Incognito flag.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_incognito: bool,
    /// Uploaded files; empty unless `kind` is `FileWithText`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_infos: Vec<FileInfo>,
}

impl ItemContent {
    /// Plain text content.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: ContentKind::Text,
            content: content.into(),
            is_incognito: false,
            file_infos: Vec::new(),
        }
    }

    /// Text accompanied by uploaded files.
    #[must_use]
    pub fn with_files(content: impl Into<String>, file_infos: Vec<FileInfo>) -> Self {
        Self {
            kind: ContentKind::FileWithText,
            content: content.into(),
            is_incognito: false,
            file_infos,
        }
    }

    /// Set the incognito flag.
    #[must_use]
    pub const fn incognito(mut self, is_incognito: bool) -> Self {
        self.is_incognito = is_incognito;
        self
    }
}

/// Durable record of an uploaded file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Pre-signed URL; upload-time only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    /// CDN URL kept for reuse.
    #[serde(default)]
    pub file_url: String,
    /// Backend identity, empty until registration succeeds.
    #[serde(default)]
    pub file_uid: String,
    /// Whether the backend indexes this file.
    #[serde(default)]
    pub parse: bool,
    /// File name.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: u64,
    /// MIME type.
    pub file_type: String,
    /// Extension.
    #[serde(default)]
    pub file_ext: String,
    /// Token count reported by the backend.
    #[serde(default)]
    pub file_tokens: i64,
    /// Chunk count reported by the backend.
    #[serde(default)]
    pub file_chunks: i64,
    /// Object-store URL; upload-time only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub object_url: String,
    /// Send the whole text rather than retrieved chunks.
    #[serde(default)]
    pub use_full_text: bool,
}

impl FileInfo {
    /// Clear the short-lived upload URLs.
    pub fn sanitize(&mut self) {
        self.url.clear();
        self.object_url.clear();
    }

    /// Sanitized copy.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }
}

/// Generic bot-chat envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotChatRequest {
    /// Task identifier.
    pub task_uid: String,
    /// Backend bot identifier.
    pub bot_uid: String,
    /// Conversation payload.
    pub data: BotChatData,
    /// Language hint.
    pub language: String,
    /// Task type.
    pub task_type: String,
    /// Tool settings.
    pub tool_data: ToolData,
}

/// Conversation payload of a bot chat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotChatData {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Last item of the chain.
    pub pre_parent_item_id: String,
    /// Item chain, root first.
    pub items: Vec<Item>,
    /// Trigger source.
    pub trigger_by: String,
    /// Model override.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub use_model: String,
    /// Incognito flag.
    pub is_incognito: bool,
    /// Memory flag.
    pub use_new_memory: bool,
}

/// Tool settings of a bot chat.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolData {
    /// Enabled system skills.
    pub sys_skill_list: Vec<String>,
}

/// Named custom-bot envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomBotRequest {
    /// Task identifier.
    pub task_uid: String,
    /// Custom bot identifier.
    pub bot_uid: String,
    /// Conversation payload.
    pub data: CustomBotData,
    /// Language hint.
    pub language: String,
    /// Locale.
    pub locale: String,
    /// Task type.
    pub task_type: String,
    /// Bot persona block.
    pub bot_data: BotData,
    /// Response language.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ai_resp_language: String,
}

/// Conversation payload of a custom-bot chat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomBotData {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Item chain, root first.
    pub items: Vec<Item>,
    /// Identifier reserved for the reply.
    pub pre_generated_reply_id: String,
    /// Last item of the chain.
    pub pre_parent_item_id: String,
    /// Origin page.
    pub origin: String,
    /// Origin page title.
    pub origin_page_title: String,
    /// Trigger source.
    pub trigger_by: String,
    /// Public model name.
    pub use_model: String,
    /// Incognito flag.
    pub is_incognito: bool,
    /// Memory flag.
    pub use_new_memory: bool,
    /// Memory suggestion flag.
    pub use_memory_suggestion: bool,
}

/// Custom bot persona.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BotData {
    /// Description.
    pub description: String,
    /// Logo.
    pub logo_url: String,
    /// Display name.
    pub name: String,
    /// Classification.
    pub classification: String,
    /// System prompt.
    pub prompt: String,
    /// Bot type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Bot identifier.
    pub uid: String,
    /// Example conversations.
    pub example_list: Vec<serde_json::Value>,
    /// Tool settings.
    pub tool_data: BotToolData,
}

/// Custom bot tool settings.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BotToolData {
    /// Knowledge bases.
    pub knowledge_list: Vec<serde_json::Value>,
    /// User skills.
    pub user_skill_list: Vec<serde_json::Value>,
    /// System skills.
    pub sys_skill_list: Vec<serde_json::Value>,
    /// Public model name.
    pub use_model: String,
    /// Scheduled tasks.
    pub schedule_task_list: Vec<serde_json::Value>,
}

/// Either backend envelope, ready for transmission.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum BackendRequest {
    /// Generic bot chat.
    BotChat(BotChatRequest),
    /// Named custom bot chat.
    CustomBot(CustomBotRequest),
}

impl BackendRequest {
    /// The item chain of either envelope.
    #[must_use]
    pub fn items(&self) -> &[Item] {
        match self {
            Self::BotChat(req) => &req.data.items,
            Self::CustomBot(req) => &req.data.items,
        }
    }
}

/// Phase A request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PreSignRequest {
    /// Names to sign.
    pub filename_list: Vec<String>,
    /// Backend module.
    pub module: String,
    /// Storage location.
    pub location: String,
    /// Object identifier.
    pub obj_id: String,
}

/// Phase A response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PreSignResponse {
    /// Payload.
    #[serde(default)]
    pub data: PreSignData,
}

/// Signed URLs returned by phase A.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PreSignData {
    /// Upload targets.
    #[serde(default)]
    pub pre_sign_url_list: Vec<String>,
    /// Object URLs passed to registration.
    #[serde(default)]
    pub object_url_list: Vec<String>,
    /// Public CDN URLs.
    #[serde(default)]
    pub cdn_url_list: Vec<String>,
}

/// Phase C request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRegisterRequest {
    /// Files to register, each carrying its object URL.
    pub data: Vec<FileInfo>,
}

/// Phase C response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileRegisterResponse {
    /// Payload.
    #[serde(default)]
    pub data: FileRegisterData,
}

/// Phase C payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileRegisterData {
    /// Registered files.
    #[serde(default)]
    pub items: Vec<RegisteredFile>,
}

/// A file as registered by the backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RegisteredFile {
    /// Normalised name.
    #[serde(default)]
    pub file_name: String,
    /// Normalised type.
    #[serde(default)]
    pub file_type: String,
    /// Normalised size.
    #[serde(default)]
    pub file_size: u64,
    /// Canonical identity.
    #[serde(default)]
    pub file_uid: String,
    /// Token count, if known.
    #[serde(default)]
    pub file_tokens: i64,
    /// Chunk count, if known.
    #[serde(default)]
    pub file_chunks: i64,
}

/// Indexing status request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchGetRequest {
    /// Files to query.
    pub file_uids: Vec<String>,
}

/// Indexing status response.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BatchGetResponse {
    /// Payload.
    #[serde(default)]
    pub data: BatchGetData,
}

/// Indexing status payload.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct BatchGetData {
    /// Status per file.
    #[serde(default)]
    pub items: Vec<IndexedFile>,
}

/// Indexing status of one file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct IndexedFile {
    /// Identity.
    #[serde(default)]
    pub file_uid: String,
    /// Index state code.
    #[serde(default)]
    pub index_state: i64,
    /// Tokens counted so far.
    #[serde(default)]
    pub file_tokens: i64,
    /// Chunks produced so far.
    #[serde(default)]
    pub file_chunks: i64,
    /// Backend failure description.
    #[serde(default)]
    pub error_message: String,
}

impl IndexedFile {
    /// Whether indexing finished successfully.
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        self.index_state == INDEX_STATE_DONE && self.file_chunks > 0
    }
}

/// Attachment source data, one variant per encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadPayload {
    /// Base64 text, optionally with a `data:<mime>;base64,` header.
    Base64(String),
    /// Remote URL to fetch.
    Url(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl UploadPayload {
    /// Pick the source for an attachment's data string.
    #[must_use]
    pub fn classify(data: &str) -> Self {
        if data.starts_with("data:") {
            Self::Base64(data.to_string())
        } else if data.starts_with("http") {
            Self::Url(data.to_string())
        } else {
            Self::Bytes(data.as_bytes().to_vec())
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn source(&self) -> &'static str {
        match self {
            Self::Base64(_) => "base64",
            Self::Url(_) => "url",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// A file to ingest.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Source data.
    pub payload: UploadPayload,
    /// Optional file name.
    pub file_name: Option<String>,
    /// Optional MIME type.
    pub mime_type: Option<String>,
    /// Wait for backend indexing before returning.
    pub parse_file: bool,
}

impl UploadRequest {
    /// Create a request for the given payload.
    #[must_use]
    pub const fn new(payload: UploadPayload) -> Self {
        Self {
            payload,
            file_name: None,
            mime_type: None,
            parse_file: false,
        }
    }

    /// Set the file name.
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Set the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    /// Request indexing.
    #[must_use]
    pub const fn with_parse(mut self, parse_file: bool) -> Self {
        self.parse_file = parse_file;
        self
    }
}

/// Kind of extracted attachment.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum AttachmentKind {
    /// Explicit image part.
    ImageUrl,
    /// Document embedded in text.
    Document,
}

impl AttachmentKind {
    /// Label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ImageUrl => "image_url",
            Self::Document => "document",
        }
    }
}

/// Pending upload produced by extraction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttachmentRequest {
    /// Kind.
    pub kind: AttachmentKind,
    /// Base64 data URL, remote URL, or literal text.
    pub data: String,
    /// File name, if known.
    pub file_name: Option<String>,
    /// MIME type, if known.
    pub mime_type: Option<String>,
}

impl AttachmentRequest {
    /// Turn into an ingestion request; attachments are always indexed.
    ///
    /// Only image references are routed by prefix. Embedded documents are
    /// literal text whatever they start with.
    #[must_use]
    pub fn into_upload(self) -> UploadRequest {
        let payload = match self.kind {
            AttachmentKind::ImageUrl => UploadPayload::classify(&self.data),
            AttachmentKind::Document => UploadPayload::Bytes(self.data.into_bytes()),
        };
        UploadRequest {
            payload,
            file_name: self.file_name,
            mime_type: self.mime_type,
            parse_file: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_classification() {
        assert_eq!(
            UploadPayload::classify("data:image/png;base64,AAAA").source(),
            "base64"
        );
        assert_eq!(
            UploadPayload::classify("https://example.com/a.png").source(),
            "url"
        );
        assert_eq!(
            UploadPayload::classify("# plain markdown"),
            UploadPayload::Bytes(b"# plain markdown".to_vec())
        );
    }

    #[test]
    fn test_sanitize_clears_upload_urls() {
        let info = FileInfo {
            url: "https://signed".to_string(),
            object_url: "s3://object".to_string(),
            file_uid: "uid-1".to_string(),
            ..FileInfo::default()
        }
        .sanitized();
        assert!(info.url.is_empty());
        assert!(info.object_url.is_empty());
        assert_eq!(info.file_uid, "uid-1");
    }

    #[test]
    fn test_item_serialization_omits_empty_parent() {
        let root = Item {
            conversation_id: "conv:1".to_string(),
            parent_item_id: String::new(),
            item_id: "msg:1".to_string(),
            item_type: ItemType::Reply,
            data: ItemContent::text(WELCOME_MARKER),
        };
        let json = serde_json::to_value(&root).unwrap_or_default();
        assert!(json.get("parent_item_id").is_none());
        assert_eq!(json["item_type"], "reply");
        assert_eq!(json["data"]["type"], "text");
        assert!(json["data"].get("file_infos").is_none());
    }

    #[test]
    fn test_indexed_requires_chunks() {
        let mut status = IndexedFile {
            index_state: INDEX_STATE_DONE,
            ..IndexedFile::default()
        };
        assert!(!status.is_indexed());
        status.file_chunks = 4;
        assert!(status.is_indexed());
    }

    #[test]
    fn test_attachment_into_upload_parses() {
        let upload = AttachmentRequest {
            kind: AttachmentKind::Document,
            data: "hello".to_string(),
            file_name: Some("a.md".to_string()),
            mime_type: Some("text/markdown".to_string()),
        }
        .into_upload();
        assert!(upload.parse_file);
        assert_eq!(upload.file_name.as_deref(), Some("a.md"));
    }

    #[test]
    fn test_document_is_never_routed_by_prefix() {
        for body in ["https://example.com is my homepage", "data: a,b,c"] {
            let upload = AttachmentRequest {
                kind: AttachmentKind::Document,
                data: body.to_string(),
                file_name: Some("notes.md".to_string()),
                mime_type: Some("text/markdown".to_string()),
            }
            .into_upload();
            assert_eq!(upload.payload, UploadPayload::Bytes(body.as_bytes().to_vec()));
        }

        let image = AttachmentRequest {
            kind: AttachmentKind::ImageUrl,
            data: "https://example.com/cat.png".to_string(),
            file_name: None,
            mime_type: None,
        }
        .into_upload();
        assert_eq!(image.payload.source(), "url");
    }
}
