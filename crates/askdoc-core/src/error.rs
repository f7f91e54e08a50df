//! Error types for the streaming answer pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error categories for chat requests and the answer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatErrorKind {
    /// The backend accepted the request but returned no streamable body
    TransportUnavailable,
    /// Connection or read failure (before or during the stream)
    NetworkFailure,
    /// Non-success HTTP status (4xx, 5xx)
    HttpStatus,
    /// No data arrived within the configured stall window
    Timeout,
    /// Undecodable bytes replaced with U+FFFD (recovered, never fatal)
    MalformedByteSequence,
    /// Operation not valid in the current state (programming error)
    InvalidState,
    /// Local file could not be read
    Io,
}

impl fmt::Display for ChatErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatErrorKind::TransportUnavailable => write!(f, "transport_unavailable"),
            ChatErrorKind::NetworkFailure => write!(f, "network_failure"),
            ChatErrorKind::HttpStatus => write!(f, "http_status"),
            ChatErrorKind::Timeout => write!(f, "timeout"),
            ChatErrorKind::MalformedByteSequence => write!(f, "malformed_byte_sequence"),
            ChatErrorKind::InvalidState => write!(f, "invalid_state"),
            ChatErrorKind::Io => write!(f, "io"),
        }
    }
}

/// Structured error with kind and details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatError {
    /// Error category
    pub kind: ChatErrorKind,
    /// One-line summary suitable for display
    pub message: String,
    /// Optional additional details (e.g., raw error body)
    pub details: Option<String>,
}

impl ChatError {
    /// Creates a new error.
    pub fn new(kind: ChatErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates an HTTP status error.
    ///
    /// The body is kept as details; a `detail` or `message` field in a JSON body
    /// is lifted into the summary line.
    pub fn http_status(status: u16, body: &str) -> Self {
        if body.trim().is_empty() {
            return Self::new(ChatErrorKind::HttpStatus, format!("HTTP {status}"));
        }

        let summary = serde_json::from_str::<Value>(body).ok().and_then(|json| {
            json.get("detail")
                .or_else(|| json.get("message"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });

        Self {
            kind: ChatErrorKind::HttpStatus,
            message: match summary {
                Some(msg) => format!("HTTP {status}: {msg}"),
                None => format!("HTTP {status}"),
            },
            details: Some(body.to_string()),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::NetworkFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::Timeout, message)
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ChatErrorKind::InvalidState, message)
    }

    /// Returns true if this error aborts the exchange.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind, ChatErrorKind::MalformedByteSequence)
    }
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ChatError {}

/// Result type for chat operations.
pub type ChatResult<T> = std::result::Result<T, ChatError>;
