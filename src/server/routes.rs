//! HTTP route handlers for the gateway API.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Request, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::bridge::BridgeError;
use crate::bridge::openai::{ChatCompletionRequest, ErrorBody, FileObject, ModelList};
use crate::bridge::types::{UploadPayload, UploadRequest};
use crate::bridge::{mime, sse};

use super::state::AppState;

/// Multipart framing allowance on top of the largest accepted file.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Error response in the OpenAI envelope.
type ApiError = (StatusCode, Json<ErrorBody>);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.bridge.config().upload.max_file_size + MULTIPART_OVERHEAD;
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);

    let api = Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .route(
            "/v1/files",
            post(upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cache = state.bridge.cache_stats();
    Json(serde_json::json!({
        "status": "ok",
        "service": "monica-bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "cached_uploads": cache.live(),
    }))
}

/// Reject `/v1/*` calls without the configured bearer token.
async fn require_bearer(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let Some(expected) = state.bearer_token() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if provided == Some(expected) {
        next.run(request).await
    } else {
        tracing::warn!(path = %request.uri().path(), "Rejected request with missing or invalid token");
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody::new(
                "invalid or missing bearer token",
                "authentication_error",
                StatusCode::UNAUTHORIZED.as_u16(),
            )),
        )
            .into_response()
    }
}

fn api_error(err: &BridgeError) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
    } else {
        tracing::warn!(error = %err, "Request rejected");
    }
    (
        status,
        Json(ErrorBody::new(err.to_string(), err.kind(), status.as_u16())),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody::new(
            message,
            "invalid_request_error",
            StatusCode::BAD_REQUEST.as_u16(),
        )),
    )
}

/// List public model names.
async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    Json(state.bridge.models())
}

/// Translate, forward and answer a chat completion in OpenAI form.
async fn chat_completions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let stream = request.is_stream();
    tracing::info!(
        model = %request.model,
        messages = request.messages.len(),
        stream,
        "Chat completion request"
    );

    let envelope = state
        .bridge
        .build_request(&request)
        .await
        .map_err(|e| api_error(&e))?;
    let upstream = state
        .bridge
        .send_chat(&envelope)
        .await
        .map_err(|e| api_error(&e))?;

    let model = request.model;
    if stream {
        let frames = sse::translate_stream(upstream.bytes_stream(), model);
        let mut response = Response::new(Body::from_stream(frames));
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/event-stream"),
        );
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        return Ok(response);
    }

    let completion = sse::collect_completion(upstream.bytes_stream(), model)
        .await
        .map_err(|e| api_error(&e))?;
    Ok(Json(completion).into_response())
}

/// Upload a file through the ingestion pipeline and describe it OpenAI-style.
async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<FileObject>, ApiError> {
    let started = std::time::Instant::now();
    let mut purpose = String::new();
    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("purpose") => {
                purpose = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("invalid purpose field: {e}")))?;
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("invalid file field: {e}")))?;
                upload = Some((file_name, content_type, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let Some((file_name, declared, bytes)) = upload else {
        return Err(bad_request("missing file field"));
    };

    let max_size = state.bridge.config().upload.max_file_size;
    if bytes.len() as u64 > max_size {
        return Err(bad_request(format!(
            "file size exceeds limit: {} > {max_size} bytes",
            bytes.len()
        )));
    }

    let mime_type = resolve_upload_mime(&file_name, declared.as_deref(), &bytes);
    let parse_file = should_parse_file(&purpose, &mime_type);

    tracing::info!(
        file_name = %file_name,
        mime_type = %mime_type,
        size = bytes.len(),
        purpose = %purpose,
        parse_file,
        "File upload request"
    );

    let request = UploadRequest::new(UploadPayload::Bytes(bytes))
        .with_file_name(file_name)
        .with_mime_type(mime_type)
        .with_parse(parse_file);
    let info = state
        .bridge
        .upload_file(request)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(FileObject {
        id: info.file_uid,
        object: "file".to_string(),
        bytes: info.file_size,
        created_at: chrono::Utc::now().timestamp(),
        filename: info.file_name,
        purpose,
        status: "processed".to_string(),
        status_details: Some(serde_json::json!({
            "tokens": info.file_tokens,
            "chunks": info.file_chunks,
            "upload_duration_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })),
    }))
}

/// Declared type when specific, then the file extension, then the content.
fn resolve_upload_mime(file_name: &str, declared: Option<&str>, bytes: &[u8]) -> String {
    declared
        .map(mime::essence)
        .filter(|m| !m.is_empty() && m != "application/octet-stream")
        .or_else(|| mime::guess_from_name(file_name))
        .unwrap_or_else(|| mime::essence(mime::sniff(bytes)))
}

/// Whether an upload with this purpose and type should be indexed.
fn should_parse_file(purpose: &str, mime_type: &str) -> bool {
    match purpose {
        "assistants" | "vision" | "batch" => true,
        "fine-tune" => false,
        _ => mime::lookup(mime_type).is_some_and(|info| info.category.parse_by_default()),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;

    use super::*;
    use crate::bridge::testing::{FakeBackend, Indexing};
    use crate::bridge::{BridgeService, GatewayConfig};

    fn router(token: Option<&str>) -> Router {
        let mut config = GatewayConfig::default();
        config.server.bearer_token = token.map(str::to_string);
        let bridge = BridgeService::with_file_backend(
            config,
            Arc::new(FakeBackend::new(Indexing::Immediate)),
        );
        assert!(bridge.is_ok());
        let Ok(bridge) = bridge else {
            return Router::new();
        };
        create_router(AppState::from_bridge(bridge))
    }

    async fn send(app: Router, request: HttpRequest<Body>) -> Response {
        match app.oneshot(request).await {
            Ok(response) => response,
            Err(never) => match never {},
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap_or_default();
        serde_json::from_slice(&bytes).unwrap_or_default()
    }

    fn get_request(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri(uri)
            .body(Body::empty())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_health() {
        let response = send(router(None), get_request("/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_list_models() {
        let response = send(router(None), get_request("/v1/models")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["object"], "list");
        assert_eq!(body["data"][0]["id"], "gpt-5");
    }

    #[tokio::test]
    async fn test_bearer_token_required() {
        let app = router(Some("secret"));

        let denied = send(app.clone(), get_request("/v1/models")).await;
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let request = HttpRequest::builder()
            .uri("/v1/models")
            .header(header::AUTHORIZATION, "Bearer secret")
            .body(Body::empty())
            .unwrap_or_default();
        let allowed = send(app.clone(), request).await;
        assert_eq!(allowed.status(), StatusCode::OK);

        let health = send(app, get_request("/health")).await;
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_empty_messages_is_bad_request() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/v1/chat/completions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"model":"gpt-4o","messages":[]}"#))
            .unwrap_or_default();

        let response = send(router(None), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["message"], "empty messages");
    }

    #[tokio::test]
    async fn test_file_upload() {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"purpose\"\r\n\r\n\
             assistants\r\n\
             --{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"notes.md\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n\
             # Notes\nhello\r\n\
             --{boundary}--\r\n"
        );
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/v1/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap_or_default();

        let response = send(router(None), request).await;
        assert_eq!(response.status(), StatusCode::OK);
        let file = json_body(response).await;
        assert_eq!(file["object"], "file");
        assert_eq!(file["filename"], "notes.md");
        assert_eq!(file["purpose"], "assistants");
        assert_eq!(file["status_details"]["chunks"], 2);
    }

    #[tokio::test]
    async fn test_file_upload_without_file() {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"purpose\"\r\n\r\n\
             assistants\r\n\
             --{boundary}--\r\n"
        );
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/v1/files")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap_or_default();

        let response = send(router(None), request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_should_parse_file() {
        assert!(should_parse_file("assistants", "image/png"));
        assert!(!should_parse_file("fine-tune", "text/plain"));
        assert!(should_parse_file("user_data", "application/pdf"));
        assert!(!should_parse_file("user_data", "image/png"));
    }

    #[test]
    fn test_resolve_upload_mime() {
        assert_eq!(
            resolve_upload_mime("a.md", Some("application/octet-stream"), b"# x"),
            "text/markdown"
        );
        assert_eq!(resolve_upload_mime("a", Some("image/png"), b""), "image/png");
        assert_eq!(resolve_upload_mime("noext", None, b"plain"), "text/plain");
    }
}
