//! Clipboard access.
//!
//! `SystemClipboard` tries, in order:
//! 1. OSC 52 - terminal clipboard escape sequence (works over SSH)
//! 2. System clipboard via `arboard`

use std::io::{IsTerminal, Write};

/// Destination for copied text.
pub trait ClipboardSink: Send + Sync {
    /// Places `text` on the clipboard.
    ///
    /// # Errors
    /// Returns an error if no transport accepted the text.
    fn set_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Clipboard with OSC 52 and system fallbacks.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSink for SystemClipboard {
    fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
        match Self::copy_osc52(text) {
            Ok(()) => return Ok(()),
            Err(err) => tracing::debug!("{err}, falling back to system clipboard"),
        }
        Self::copy_system(text)
    }
}

impl SystemClipboard {
    /// Writes the OSC 52 sequence to stdout for the terminal to intercept.
    ///
    /// Skipped when stdout is not a terminal so escape bytes never land in
    /// redirected output.
    fn copy_osc52(text: &str) -> Result<(), ClipboardError> {
        use base64::Engine;

        let mut stdout = std::io::stdout();
        if !stdout.is_terminal() {
            return Err(ClipboardError::Osc52("stdout is not a terminal".into()));
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(text);

        // ESC ] 52 ; c ; <base64> ESC \   ('c' = system clipboard)
        write!(stdout, "\x1b]52;c;{encoded}\x1b\\")
            .map_err(|e| ClipboardError::Osc52(e.to_string()))?;
        stdout
            .flush()
            .map_err(|e| ClipboardError::Osc52(e.to_string()))
    }

    fn copy_system(text: &str) -> Result<(), ClipboardError> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| ClipboardError::System(e.to_string()))?;
        clipboard
            .set_text(text)
            .map_err(|e| ClipboardError::System(e.to_string()))
    }
}

/// Clipboard operation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardError {
    /// OSC 52 write failed.
    Osc52(String),
    /// System clipboard operation failed.
    System(String),
}

impl std::fmt::Display for ClipboardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipboardError::Osc52(msg) => write!(f, "OSC 52 clipboard failed: {msg}"),
            ClipboardError::System(msg) => write!(f, "System clipboard failed: {msg}"),
        }
    }
}

impl std::error::Error for ClipboardError {}
