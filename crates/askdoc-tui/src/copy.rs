//! Copy-to-clipboard affordance for rendered code blocks.
//!
//! Each block carries its own transient "copied" flag. A successful copy
//! arms the flag for `COPIED_WINDOW`; copying again while armed restarts the
//! window. Time comes from `tokio::time` so paused-clock tests are exact.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::clipboard::ClipboardSink;

/// How long a block reports "copied" after a successful copy.
pub const COPIED_WINDOW: Duration = Duration::from_millis(2000);

pub const COPY_LABEL: &str = "📋 Copy";
pub const COPIED_LABEL: &str = "✔ Copied!";

/// Copy state for one code block.
pub struct CopyAffordance {
    sink: Arc<dyn ClipboardSink>,
    copied_until: Option<Instant>,
}

impl std::fmt::Debug for CopyAffordance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyAffordance")
            .field("copied_until", &self.copied_until)
            .finish_non_exhaustive()
    }
}

impl CopyAffordance {
    pub fn new(sink: Arc<dyn ClipboardSink>) -> Self {
        Self {
            sink,
            copied_until: None,
        }
    }

    /// Copies a block's text, minus one trailing newline.
    ///
    /// Returns false when the clipboard rejected the text; the failure is
    /// logged and the copied flag is left untouched.
    pub fn copy(&mut self, block_text: &str) -> bool {
        let text = block_text.strip_suffix('\n').unwrap_or(block_text);
        match self.sink.set_text(text) {
            Ok(()) => {
                self.copied_until = Some(Instant::now() + COPIED_WINDOW);
                tracing::debug!(len = text.len(), "code block copied");
                true
            }
            Err(err) => {
                tracing::debug!("copy failed: {err}");
                false
            }
        }
    }

    pub fn is_copied(&self) -> bool {
        self.copied_until
            .is_some_and(|until| Instant::now() < until)
    }

    /// When the copied flag reverts, if it is currently set.
    pub fn expires_at(&self) -> Option<Instant> {
        self.copied_until.filter(|_| self.is_copied())
    }

    pub fn label(&self) -> &'static str {
        if self.is_copied() {
            COPIED_LABEL
        } else {
            COPY_LABEL
        }
    }
}

/// Copy affordances for every code block of one rendered answer.
pub struct CopyStates {
    sink: Arc<dyn ClipboardSink>,
    states: Vec<CopyAffordance>,
}

impl std::fmt::Debug for CopyStates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyStates")
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}

impl CopyStates {
    pub fn new(sink: Arc<dyn ClipboardSink>) -> Self {
        Self {
            sink,
            states: Vec::new(),
        }
    }

    /// Grows to cover `count` blocks. Existing states are kept, since a
    /// streaming answer only ever adds blocks at the end.
    pub fn sync(&mut self, count: usize) {
        while self.states.len() < count {
            self.states
                .push(CopyAffordance::new(Arc::clone(&self.sink)));
        }
        self.states.truncate(count);
    }

    /// Drops all states (new answer).
    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Copies block `index`. Returns false for an unknown index or a
    /// clipboard failure.
    pub fn copy(&mut self, index: usize, block_text: &str) -> bool {
        self.states
            .get_mut(index)
            .is_some_and(|state| state.copy(block_text))
    }

    pub fn get(&self, index: usize) -> Option<&CopyAffordance> {
        self.states.get(index)
    }

    pub fn label(&self, index: usize) -> &'static str {
        self.get(index).map_or(COPY_LABEL, CopyAffordance::label)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::clipboard::ClipboardError;

    #[derive(Default)]
    struct RecordingClipboard {
        texts: Mutex<Vec<String>>,
        fail: bool,
    }

    impl ClipboardSink for RecordingClipboard {
        fn set_text(&self, text: &str) -> Result<(), ClipboardError> {
            if self.fail {
                return Err(ClipboardError::System("no display".into()));
            }
            self.texts.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    fn recording() -> Arc<RecordingClipboard> {
        Arc::new(RecordingClipboard::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_strips_one_newline_and_reverts_after_window() {
        let clipboard = recording();
        let mut copy = CopyAffordance::new(Arc::clone(&clipboard) as Arc<dyn ClipboardSink>);

        assert!(copy.copy("print(1)\n"));
        assert_eq!(*clipboard.texts.lock().unwrap(), vec!["print(1)"]);
        assert!(copy.is_copied());
        assert_eq!(copy.label(), "✔ Copied!");

        tokio::time::advance(Duration::from_millis(1999)).await;
        assert!(copy.is_copied());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(!copy.is_copied());
        assert_eq!(copy.label(), "📋 Copy");
        assert!(copy.expires_at().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_trailing_newline_is_stripped() {
        let clipboard = recording();
        let mut copy = CopyAffordance::new(Arc::clone(&clipboard) as Arc<dyn ClipboardSink>);

        copy.copy("a\n\n");
        copy.copy("b");

        assert_eq!(*clipboard.texts.lock().unwrap(), vec!["a\n", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_copy_restarts_window() {
        let mut copy = CopyAffordance::new(recording());

        copy.copy("x");
        tokio::time::advance(Duration::from_millis(1500)).await;
        copy.copy("x");
        tokio::time::advance(Duration::from_millis(1500)).await;
        assert!(copy.is_copied());

        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(!copy.is_copied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_copy_returns_false() {
        let clipboard = Arc::new(RecordingClipboard {
            fail: true,
            ..Default::default()
        });
        let mut copy = CopyAffordance::new(clipboard);

        assert!(!copy.copy("x"));
        assert!(!copy.is_copied());
    }

    #[tokio::test(start_paused = true)]
    async fn test_states_are_per_block() {
        let mut states = CopyStates::new(recording());
        states.sync(3);

        assert!(states.copy(1, "second\n"));

        assert_eq!(states.label(0), COPY_LABEL);
        assert_eq!(states.label(1), COPIED_LABEL);
        assert_eq!(states.label(2), COPY_LABEL);
        assert_eq!(
            states.get(1).and_then(CopyAffordance::expires_at),
            Some(Instant::now() + COPIED_WINDOW)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_keeps_existing_states() {
        let mut states = CopyStates::new(recording());
        states.sync(1);
        states.copy(0, "x");

        states.sync(2);

        assert_eq!(states.len(), 2);
        assert_eq!(states.label(0), COPIED_LABEL);
        states.clear();
        assert!(states.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_block_is_not_copied() {
        let clipboard = recording();
        let mut states = CopyStates::new(Arc::clone(&clipboard) as Arc<dyn ClipboardSink>);
        states.sync(1);

        assert!(!states.copy(5, "x"));
        assert!(clipboard.texts.lock().unwrap().is_empty());
    }
}
