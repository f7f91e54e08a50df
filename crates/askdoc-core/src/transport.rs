//! HTTP boundary to the question-answering backend.
//!
//! `ChatTransport` is the seam the stream pump reads through; `HttpTransport`
//! is the reqwest implementation used by the CLI. Tests substitute scripted
//! transports.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ChatError, ChatErrorKind, ChatResult};
use crate::session::SessionContext;

/// Standard User-Agent header for askdoc requests.
pub const USER_AGENT: &str = concat!("askdoc/", env!("CARGO_PKG_VERSION"));

const CHAT_STREAM_PATH: &str = "/chat/stream";
const UPLOAD_PATH: &str = "/upload";

/// Raw answer bytes as delivered by the transport, one item per chunk.
pub type ByteStream = BoxStream<'static, ChatResult<Bytes>>;

/// JSON body of a chat request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub query: String,
    pub session_id: String,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>, session: &SessionContext) -> Self {
        Self {
            query: query.into(),
            session_id: session.session_id().to_string(),
        }
    }
}

/// Opens answer streams.
pub trait ChatTransport: Send + Sync {
    /// Sends the request and returns the response body as a byte stream.
    ///
    /// Returns `Ok(None)` when the backend accepted the request but produced
    /// no streamable body.
    fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> impl Future<Output = ChatResult<Option<ByteStream>>> + Send;
}

/// Result of a successful document upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: u16,
    /// Human-readable message from the backend, when it sent one.
    pub message: Option<String>,
}

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport for `base_url`.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, connect_timeout: Option<Duration>) -> ChatResult<Self> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ChatError::network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Uploads a document into the session's namespace.
    ///
    /// Any non-2xx status is a failure; the body is not interpreted beyond a
    /// one-line summary.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, the request fails, or the
    /// backend answers with a non-success status.
    pub async fn upload(&self, path: &Path, session: &SessionContext) -> ChatResult<UploadReceipt> {
        let data = tokio::fs::read(path).await.map_err(|e| {
            ChatError::new(
                ChatErrorKind::Io,
                format!("Failed to read {}: {e}", path.display()),
            )
        })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".to_string(), |n| n.to_string_lossy().into_owned());

        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.clone())
            .mime_str(mime_for(path))
            .map_err(|e| ChatError::network(format!("Invalid upload part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("session_id", session.session_id().to_string());

        tracing::info!(file = %file_name, session = %session, "uploading document");

        let response = self
            .http
            .post(self.endpoint(UPLOAD_PATH))
            .multipart(form)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "upload rejected");
            return Err(ChatError::http_status(status.as_u16(), &body));
        }

        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|json| json.get("message").and_then(|m| m.as_str()).map(String::from));

        Ok(UploadReceipt {
            status: status.as_u16(),
            message,
        })
    }
}

impl ChatTransport for HttpTransport {
    async fn open_stream(&self, request: &ChatRequest) -> ChatResult<Option<ByteStream>> {
        let url = self.endpoint(CHAT_STREAM_PATH);
        tracing::debug!(%url, session = %request.session_id, "opening answer stream");

        let response = self
            .http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ChatError::http_status(status.as_u16(), &error_body));
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Ok(None);
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(classify_reqwest_error))
            .boxed();
        Ok(Some(stream))
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        ChatError::timeout(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        ChatError::network(format!("Connection failed: {e}"))
    } else if e.is_body() || e.is_decode() {
        ChatError::network(format!("Stream interrupted: {e}"))
    } else {
        ChatError::network(format!("Network error: {e}"))
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt" | "md") => "text/plain",
        _ => "application/octet-stream",
    }
}
