//! Translation of the backend's event stream into OpenAI chat responses.
//!
//! The backend answers a chat turn with `data: {"text": "...", "finished": false}`
//! events. Streaming callers get one `chat.completion.chunk` per event with
//! text, then a `finish_reason: "stop"` chunk and `data: [DONE]`. Non-streaming
//! callers get the joined text as a single `chat.completion`.

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::error::{BridgeError, BridgeResult};
use super::openai::{
    ChatCompletion, ChatCompletionChunk, ChatMessage, ChunkChoice, ChunkDelta, CompletionChoice,
    Role,
};

const DONE_MARKER: &str = "[DONE]";
const STOP: &str = "stop";

/// One backend event.
#[derive(Debug, Deserialize)]
struct BackendEvent {
    #[serde(default)]
    text: String,
    #[serde(default)]
    finished: bool,
}

enum Payload {
    Event(BackendEvent),
    Done,
    Skip,
}

fn parse_payload(payload: &str) -> Payload {
    if payload.trim() == DONE_MARKER {
        return Payload::Done;
    }
    match serde_json::from_str::<BackendEvent>(payload) {
        Ok(event) => Payload::Event(event),
        Err(e) => {
            tracing::warn!(error = %e, "Skipping malformed backend event");
            Payload::Skip
        }
    }
}

fn stream_failure(err: &dyn Display) -> BridgeError {
    BridgeError::Upstream(format!("backend stream failed: {err}"))
}

fn completion_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes are buffered until a full line is available, so events and UTF-8
/// sequences may be split across network chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Feed raw bytes; returns the `data` payload of every event they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(end) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            let text = String::from_utf8_lossy(&raw);
            if let Some(event) = self.feed_line(text.trim_end_matches(['\n', '\r'])) {
                events.push(event);
            }
        }
        events
    }

    /// Flush the event a stream ended on without a trailing blank line.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            let text = String::from_utf8_lossy(&rest);
            self.feed_line(text.trim_end_matches('\r'));
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        if field == "data" {
            let value = value.strip_prefix(' ').unwrap_or(value);
            self.data.push(value.to_string());
        }
        None
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let payload = self.data.join("\n");
        self.data.clear();
        Some(payload)
    }
}

/// Builds the chunks of one streamed completion.
struct ChunkTranslator {
    id: String,
    created: i64,
    model: String,
    role_sent: bool,
}

impl ChunkTranslator {
    fn new(model: String) -> Self {
        Self {
            id: completion_id(),
            created: chrono::Utc::now().timestamp(),
            model,
            role_sent: false,
        }
    }

    fn frame(&mut self, content: Option<String>, finish_reason: Option<&str>) -> BridgeResult<String> {
        let role = if self.role_sent {
            None
        } else {
            self.role_sent = true;
            Some(Role::Assistant)
        };
        let chunk = ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta { role, content },
                finish_reason: finish_reason.map(str::to_string),
            }],
        };
        Ok(format!("data: {}\n\n", serde_json::to_string(&chunk)?))
    }
}

struct Relay<S> {
    upstream: Pin<Box<S>>,
    decoder: SseDecoder,
    translator: ChunkTranslator,
    pending: VecDeque<BridgeResult<String>>,
    done: bool,
}

impl<S> Relay<S> {
    fn accept(&mut self, payload: &str) {
        if self.done {
            return;
        }
        match parse_payload(payload) {
            Payload::Done => self.close(),
            Payload::Skip => {}
            Payload::Event(event) => {
                if !event.text.is_empty() {
                    let frame = self.translator.frame(Some(event.text), None);
                    self.pending.push_back(frame);
                }
                if event.finished {
                    self.close();
                }
            }
        }
    }

    fn close(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        let frame = self.translator.frame(None, Some(STOP));
        self.pending.push_back(frame);
        self.pending.push_back(Ok(format!("data: {DONE_MARKER}\n\n")));
    }
}

/// Re-frame a backend event stream as OpenAI `chat.completion.chunk` events.
///
/// The output always ends with a stop chunk and `data: [DONE]`, whether the
/// backend marked its last event `finished` or simply closed the stream. A
/// transport error ends the stream with an `Upstream` error item.
pub fn translate_stream<S, B, E>(
    upstream: S,
    model: String,
) -> impl Stream<Item = BridgeResult<String>> + Send + 'static
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let relay = Relay {
        upstream: Box::pin(upstream),
        decoder: SseDecoder::new(),
        translator: ChunkTranslator::new(model),
        pending: VecDeque::new(),
        done: false,
    };

    futures::stream::unfold(relay, |mut relay| async move {
        loop {
            if let Some(frame) = relay.pending.pop_front() {
                return Some((frame, relay));
            }
            if relay.done {
                return None;
            }
            match relay.upstream.next().await {
                Some(Ok(bytes)) => {
                    for payload in relay.decoder.push(bytes.as_ref()) {
                        relay.accept(&payload);
                    }
                }
                Some(Err(e)) => {
                    relay.done = true;
                    return Some((Err(stream_failure(&e)), relay));
                }
                None => {
                    if let Some(payload) = relay.decoder.finish() {
                        relay.accept(&payload);
                    }
                    relay.close();
                }
            }
        }
    })
}

/// Append one event's text to `reply`; true once the reply is complete.
fn absorb(reply: &mut String, payload: &str) -> bool {
    match parse_payload(payload) {
        Payload::Done => true,
        Payload::Skip => false,
        Payload::Event(event) => {
            reply.push_str(&event.text);
            event.finished
        }
    }
}

/// Read a backend event stream to its end and return one `chat.completion`.
///
/// # Errors
/// Returns `Upstream` if the stream fails before the reply is complete.
pub async fn collect_completion<S, B, E>(upstream: S, model: String) -> BridgeResult<ChatCompletion>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut upstream = Box::pin(upstream);
    let mut decoder = SseDecoder::new();
    let mut reply = String::new();
    let mut finished = false;

    while !finished {
        let Some(chunk) = upstream.next().await else {
            break;
        };
        let bytes = chunk.map_err(|e| stream_failure(&e))?;
        for payload in decoder.push(bytes.as_ref()) {
            if !finished {
                finished = absorb(&mut reply, &payload);
            }
        }
    }
    if let Some(payload) = decoder.finish().filter(|_| !finished) {
        absorb(&mut reply, &payload);
    }

    Ok(ChatCompletion {
        id: completion_id(),
        object: "chat.completion".to_string(),
        created: chrono::Utc::now().timestamp(),
        model,
        choices: vec![CompletionChoice {
            index: 0,
            message: ChatMessage::text(Role::Assistant, reply),
            finish_reason: Some(STOP.to_string()),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], String>> + Send + 'static {
        let items: Vec<Result<&'static [u8], String>> =
            parts.iter().map(|part| Ok(part.as_bytes())).collect();
        futures::stream::iter(items)
    }

    async fn relay_frames(parts: &[&'static str]) -> Vec<BridgeResult<String>> {
        translate_stream(body(parts), "gpt-4o".to_string())
            .collect::<Vec<_>>()
            .await
    }

    fn chunk_of(frame: &str) -> Option<ChatCompletionChunk> {
        frame
            .strip_prefix("data: ")
            .and_then(|json| serde_json::from_str(json.trim_end()).ok())
    }

    fn content_of(chunk: &ChatCompletionChunk) -> Option<&str> {
        chunk.choices.first().and_then(|c| c.delta.content.as_deref())
    }

    #[test]
    fn test_decoder_joins_lines_across_pushes() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"te").is_empty());
        assert!(decoder.push(b"xt\":\"a\"}\r\n").is_empty());
        assert_eq!(decoder.push(b"\r\n"), vec![r#"{"text":"a"}"#.to_string()]);

        let events = decoder.push(b": keepalive\n\nevent: msg\ndata: one\ndata: two\n\n");
        assert_eq!(events, vec!["one\ntwo".to_string()]);

        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn test_decoder_keeps_multibyte_text_split_between_chunks() {
        let raw = "data: {\"text\":\"héllo\"}\n\n".as_bytes();
        let split = raw.iter().position(|b| *b == 0xc3).unwrap_or_default() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&raw[..split]).is_empty());
        assert_eq!(decoder.push(&raw[split..]), vec![r#"{"text":"héllo"}"#.to_string()]);
    }

    #[tokio::test]
    async fn test_events_become_completion_chunks() {
        let frames = relay_frames(&[
            "data: {\"text\":\"Hel",
            "lo\",\"finished\":false}\r\n\r\ndata: {\"text\":\" world\"",
            ",\"finished\":false}\n\n",
            "data: {\"text\":\"\",\"finished\":true}\n\n",
        ])
        .await;
        let frames: Vec<String> = frames.into_iter().filter_map(Result::ok).collect();
        assert_eq!(frames.len(), 4);

        let chunks: Vec<ChatCompletionChunk> =
            frames[..3].iter().filter_map(|f| chunk_of(f)).collect();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.object == "chat.completion.chunk"));
        assert!(chunks.iter().all(|c| c.id == chunks[0].id && c.model == "gpt-4o"));
        assert!(chunks[0].id.starts_with("chatcmpl-"));

        assert_eq!(chunks[0].choices[0].delta.role, Some(Role::Assistant));
        assert_eq!(content_of(&chunks[0]), Some("Hello"));
        assert_eq!(chunks[1].choices[0].delta.role, None);
        assert_eq!(content_of(&chunks[1]), Some(" world"));
        assert_eq!(content_of(&chunks[2]), None);
        assert_eq!(chunks[2].choices[0].finish_reason.as_deref(), Some("stop"));

        assert_eq!(frames[3], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_stream_closed_without_finished_still_terminates() {
        let frames = relay_frames(&["data: {\"text\":\"partial\"}\n\ndata: {\"text\":\"tail\"}"]).await;
        let frames: Vec<String> = frames.into_iter().filter_map(Result::ok).collect();
        assert_eq!(frames.len(), 4);
        assert_eq!(chunk_of(&frames[1]).as_ref().and_then(content_of), Some("tail"));
        assert_eq!(
            chunk_of(&frames[2]).and_then(|c| c.choices[0].finish_reason.clone()),
            Some("stop".to_string())
        );
        assert_eq!(frames[3], "data: [DONE]\n\n");
    }

    #[tokio::test]
    async fn test_malformed_and_late_events_are_dropped() {
        let frames = relay_frames(&[
            "data: not json\n\n: keepalive\n\n",
            "data: {\"text\":\"ok\",\"finished\":true}\n\n",
            "data: {\"text\":\"late\"}\n\n",
        ])
        .await;
        let frames: Vec<String> = frames.into_iter().filter_map(Result::ok).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(chunk_of(&frames[0]).as_ref().and_then(content_of), Some("ok"));
        assert!(frames.iter().all(|f| !f.contains("late")));
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream_with_upstream_error() {
        let items: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"data: {\"text\":\"a\"}\n\n".as_slice()),
            Err("connection reset".to_string()),
            Ok(b"data: {\"text\":\"b\"}\n\n".as_slice()),
        ];
        let frames: Vec<BridgeResult<String>> =
            translate_stream(futures::stream::iter(items), "o3".to_string())
                .collect()
                .await;
        assert_eq!(frames.len(), 2);
        assert!(frames[0].is_ok());
        assert!(
            matches!(&frames[1], Err(BridgeError::Upstream(m)) if m.contains("connection reset"))
        );
    }

    #[tokio::test]
    async fn test_collect_completion_joins_text() {
        let completion = collect_completion(
            body(&[
                "data: {\"text\":\"Hello\"}\n\ndata: {\"text\":\", wor",
                "ld\"}\n\ndata: {\"text\":\"!\",\"finished\":true}\n\n",
                "data: {\"text\":\"ignored\"}\n\n",
            ]),
            "claude-3-7-sonnet".to_string(),
        )
        .await;
        assert!(completion.is_ok());
        let Ok(completion) = completion else { return };

        assert_eq!(completion.object, "chat.completion");
        assert_eq!(completion.model, "claude-3-7-sonnet");
        assert_eq!(completion.choices.len(), 1);
        let choice = &completion.choices[0];
        assert_eq!(choice.message.role, Role::Assistant);
        assert_eq!(choice.message.plain_text(), "Hello, world!");
        assert_eq!(choice.finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_collect_completion_reports_stream_errors() {
        let items: Vec<Result<&'static [u8], String>> = vec![
            Ok(b"data: {\"text\":\"a\"}\n\n".as_slice()),
            Err("eof".to_string()),
        ];
        let completion = collect_completion(futures::stream::iter(items), "o3".to_string()).await;
        assert!(matches!(completion, Err(BridgeError::Upstream(_))));
    }
}
