//! OpenAI-shaped request and response types accepted by the gateway.

use serde::{Deserialize, Serialize};

/// `POST /v1/chat/completions` body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Public model name.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Stream the response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Sampling temperature; accepted and ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Token budget; accepted and ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatCompletionRequest {
    /// Create a request for a model.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: None,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Whether the caller asked for streaming.
    #[must_use]
    pub const fn is_stream(&self) -> bool {
        matches!(self.stream, Some(true))
    }
}

/// Message author.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt.
    System,
    /// End user.
    User,
    /// Model output.
    Assistant,
    /// Tool result.
    Tool,
    /// Any other role.
    #[serde(other)]
    Other,
}

/// One chat message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// String or array of parts; may be null.
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ChatMessage {
    /// Message with plain string content.
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(text.into())),
        }
    }

    /// Message with content parts.
    #[must_use]
    pub fn parts(role: Role, parts: Vec<ContentPart>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Parts(parts)),
        }
    }

    /// Plain string content, empty for part arrays.
    #[must_use]
    pub fn plain_text(&self) -> &str {
        match &self.content {
            Some(MessageContent::Text(text)) => text,
            _ => "",
        }
    }

    /// Content parts, empty for plain strings.
    #[must_use]
    pub fn content_parts(&self) -> &[ContentPart] {
        match &self.content {
            Some(MessageContent::Parts(parts)) => parts,
            _ => &[],
        }
    }

    /// All text of the message joined by newlines.
    #[must_use]
    pub fn joined_text(&self) -> String {
        match &self.content {
            Some(MessageContent::Text(text)) => text.clone(),
            Some(MessageContent::Parts(parts)) => parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
            None => String::new(),
        }
    }
}

/// Message content.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain string.
    Text(String),
    /// Multi-part content.
    Parts(Vec<ContentPart>),
}

/// One content part; unknown `type`s are kept so they can be reported.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContentPart {
    /// Part type (`text`, `image_url`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Text of a `text` part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Image of an `image_url` part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<ImageUrl>,
}

impl ContentPart {
    /// A `text` part.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(text.into()),
            image_url: None,
        }
    }

    /// An `image_url` part.
    #[must_use]
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            kind: "image_url".to_string(),
            text: None,
            image_url: Some(ImageUrl {
                url: url.into(),
                detail: None,
            }),
        }
    }
}

/// Image reference: data URL or remote URL.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL or `data:` URI.
    pub url: String,
    /// Detail hint; ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// `GET /v1/models` entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelObject {
    /// Public model name.
    pub id: String,
    /// Always `model`.
    pub object: String,
    /// Owner label.
    pub owned_by: String,
}

/// `GET /v1/models` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelList {
    /// Always `list`.
    pub object: String,
    /// Models.
    pub data: Vec<ModelObject>,
}

impl ModelList {
    /// Build the list from public model names.
    #[must_use]
    pub fn from_names(names: &[&str]) -> Self {
        Self {
            object: "list".to_string(),
            data: names
                .iter()
                .map(|name| ModelObject {
                    id: (*name).to_string(),
                    object: "model".to_string(),
                    owned_by: "monica".to_string(),
                })
                .collect(),
        }
    }
}

/// Non-streaming `POST /v1/chat/completions` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletion {
    /// Completion id (`chatcmpl-...`).
    pub id: String,
    /// Always `chat.completion`.
    pub object: String,
    /// Unix timestamp.
    pub created: i64,
    /// Public model name the caller asked for.
    pub model: String,
    /// Single assistant choice.
    pub choices: Vec<CompletionChoice>,
}

/// One choice of a non-streaming completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// Choice index.
    pub index: u32,
    /// Assistant message.
    pub message: ChatMessage,
    /// Why generation stopped.
    pub finish_reason: Option<String>,
}

/// One streamed `chat.completion.chunk` event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletionChunk {
    /// Completion id shared by every chunk of the stream.
    pub id: String,
    /// Always `chat.completion.chunk`.
    pub object: String,
    /// Unix timestamp.
    pub created: i64,
    /// Public model name the caller asked for.
    pub model: String,
    /// Single delta choice.
    pub choices: Vec<ChunkChoice>,
}

/// Delta choice of a streamed chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkChoice {
    /// Choice index.
    pub index: u32,
    /// Incremental content.
    pub delta: ChunkDelta,
    /// Set on the last chunk only.
    pub finish_reason: Option<String>,
}

/// Incremental message content.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ChunkDelta {
    /// Sent once, on the first chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Text appended by this chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// OpenAI file object returned by `POST /v1/files`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileObject {
    /// Backend file uid.
    pub id: String,
    /// Always `file`.
    pub object: String,
    /// Size in bytes.
    pub bytes: u64,
    /// Unix timestamp.
    pub created_at: i64,
    /// File name.
    pub filename: String,
    /// Declared purpose.
    pub purpose: String,
    /// Processing status.
    pub status: String,
    /// Token and chunk counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_details: Option<serde_json::Value>,
}

/// OpenAI error envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error details.
    pub error: ErrorDetail,
}

/// OpenAI error details.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable message.
    pub message: String,
    /// Error type.
    #[serde(rename = "type")]
    pub kind: String,
    /// HTTP status code.
    pub code: u16,
}

impl ErrorBody {
    /// Build an error envelope.
    #[must_use]
    pub fn new(message: impl Into<String>, kind: impl Into<String>, code: u16) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                kind: kind.into(),
                code,
            },
        }
    }
}
