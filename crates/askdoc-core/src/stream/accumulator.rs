//! Growing answer buffer with change notifications.
//!
//! Every `append` raises exactly one notification, synchronously, to every
//! registered observer. Renderers subscribe and recompute their view from the
//! full text snapshot each time.

use tokio::sync::mpsc;

use crate::error::{ChatError, ChatResult};

/// A change notification delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerUpdate {
    /// Full answer text after the change.
    pub text: String,
    /// Text added by this change (empty for finalize/reset).
    pub delta: String,
    /// What caused the notification.
    pub kind: UpdateKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Appended,
    Finalized,
    Reset,
}

impl AnswerUpdate {
    pub fn is_finalized(&self) -> bool {
        self.kind == UpdateKind::Finalized
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Observer = Box<dyn FnMut(&AnswerUpdate) + Send>;

/// Append-only answer buffer for one question/answer exchange.
#[derive(Default)]
pub struct AnswerAccumulator {
    text: String,
    finalized: bool,
    observers: Vec<(SubscriptionId, Observer)>,
    channels: Vec<mpsc::UnboundedSender<AnswerUpdate>>,
    next_id: u64,
}

impl std::fmt::Debug for AnswerAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnswerAccumulator")
            .field("len", &self.text.len())
            .field("finalized", &self.finalized)
            .field("observers", &self.observers.len())
            .field("channels", &self.channels.len())
            .finish()
    }
}

impl AnswerAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer called once per change.
    ///
    /// Observers run synchronously inside `append`/`finalize`/`reset` and must
    /// not call back into the accumulator.
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: FnMut(&AnswerUpdate) + Send + 'static,
    {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Subscribes through an unbounded channel instead of a callback.
    ///
    /// The subscription is dropped lazily once the receiver goes away.
    pub fn subscribe_channel(&mut self) -> mpsc::UnboundedReceiver<AnswerUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.push(tx);
        rx
    }

    /// Removes an observer. Returns false if the id was unknown.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    /// Appends text and notifies observers once.
    ///
    /// # Errors
    /// Returns `InvalidState` if the buffer has been finalized.
    pub fn append(&mut self, delta: &str) -> ChatResult<()> {
        if self.finalized {
            return Err(ChatError::invalid_state(
                "append called on a finalized answer",
            ));
        }
        self.text.push_str(delta);
        self.notify(UpdateKind::Appended, delta);
        Ok(())
    }

    /// Closes the buffer to further appends. Calling it twice is a no-op.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        self.notify(UpdateKind::Finalized, "");
    }

    /// Clears the buffer for a new question and re-opens it.
    pub fn reset(&mut self) {
        self.text.clear();
        self.finalized = false;
        self.notify(UpdateKind::Reset, "");
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn notify(&mut self, kind: UpdateKind, delta: &str) {
        if self.observers.is_empty() && self.channels.is_empty() {
            return;
        }
        let update = AnswerUpdate {
            text: self.text.clone(),
            delta: delta.to_string(),
            kind,
        };
        for (_, observer) in &mut self.observers {
            observer(&update);
        }
        self.channels.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Number of live channel subscriptions.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
