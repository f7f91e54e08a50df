//! Session identity sent with every chat and upload request.

use std::fmt;

/// Identifies the backend namespace a conversation reads from and uploads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    session_id: String,
}

impl SessionContext {
    /// Session id the backend falls back to when none is supplied.
    pub const DEFAULT_SESSION_ID: &str = "default_user";

    /// Creates a session context, falling back to the default id when blank.
    pub fn new(session_id: impl Into<String>) -> Self {
        let session_id = session_id.into();
        let trimmed = session_id.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        Self {
            session_id: trimmed.to_string(),
        }
    }

    /// Creates a session with a fresh random id.
    pub fn generate() -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            session_id: Self::DEFAULT_SESSION_ID.to_string(),
        }
    }
}

impl fmt::Display for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.session_id)
    }
}
