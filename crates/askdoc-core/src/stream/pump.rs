//! Stream pump: drives one question/answer exchange.
//!
//! ```text
//! Idle -> Sending -> Reading -> Draining -> Done
//!            \          \
//!             +----------+--> Failed
//! ```
//!
//! The pump owns the decoder and the answer accumulator for the exchange.
//! Only one exchange may be in flight; a submit while `Sending`, `Reading` or
//! `Draining` is rejected rather than queued, so two answers can never
//! interleave in the buffer.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::accumulator::{AnswerAccumulator, AnswerUpdate, SubscriptionId};
use super::decoder::Utf8StreamDecoder;
use crate::error::{ChatError, ChatErrorKind, ChatResult};
use crate::session::SessionContext;
use crate::transport::{ByteStream, ChatRequest, ChatTransport};

/// Lifecycle state of the pump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Sending,
    Reading,
    Draining,
    Done,
    Failed,
}

impl PumpState {
    /// True while an exchange owns the answer buffer.
    pub fn is_in_flight(self) -> bool {
        matches!(
            self,
            PumpState::Sending | PumpState::Reading | PumpState::Draining
        )
    }

    pub fn accepts_submit(self) -> bool {
        !self.is_in_flight()
    }
}

/// How a completed exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// The transport closed the stream.
    Completed,
    /// The caller cancelled; the partial answer was kept.
    Cancelled,
}

/// Summary of an exchange that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpOutcome {
    pub status: StreamStatus,
    /// Number of chunks read from the transport.
    pub chunks: usize,
    /// Number of raw bytes read from the transport.
    pub bytes: usize,
    /// Non-fatal problems recovered during the exchange.
    pub recovered: Vec<ChatError>,
}

/// Result of a submit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// The exchange ran to completion or was cancelled.
    Finished(PumpOutcome),
    /// Another exchange is in flight; nothing was sent.
    Rejected { state: PumpState },
    /// The query was empty; nothing was sent.
    Ignored,
}

/// Tuning knobs for the read loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpOptions {
    /// Fail the exchange when no chunk arrives within this window.
    /// `None` waits until the transport closes or errors.
    pub stall_timeout: Option<Duration>,
}

/// Drives answer streams from a transport into an accumulator.
pub struct StreamPump<T> {
    transport: T,
    session: SessionContext,
    options: PumpOptions,
    state: Mutex<PumpState>,
    decoder: Mutex<Utf8StreamDecoder>,
    /// Only the pump mutates the buffer; callers get snapshots and updates.
    accumulator: Mutex<AnswerAccumulator>,
}

impl<T: ChatTransport> StreamPump<T> {
    pub fn new(transport: T, session: SessionContext, options: PumpOptions) -> Self {
        Self {
            transport,
            session,
            options,
            state: Mutex::new(PumpState::Idle),
            decoder: Mutex::new(Utf8StreamDecoder::new()),
            accumulator: Mutex::new(AnswerAccumulator::new()),
        }
    }

    pub fn state(&self) -> PumpState {
        *lock(&self.state)
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Switches the session for subsequent exchanges.
    ///
    /// # Errors
    /// Returns `InvalidState` while an exchange is in flight.
    pub fn set_session(&mut self, session: SessionContext) -> ChatResult<()> {
        if self.state().is_in_flight() {
            return Err(ChatError::invalid_state(
                "cannot change session while a stream is in flight",
            ));
        }
        self.session = session;
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }


    /// Registers a change observer on the answer buffer.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: FnMut(&AnswerUpdate) + Send + 'static,
    {
        lock(&self.accumulator).subscribe(observer)
    }

    /// Subscribes to answer changes through a channel.
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<AnswerUpdate> {
        lock(&self.accumulator).subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.accumulator).unsubscribe(id)
    }

    /// Snapshot of the answer so far.
    pub fn answer_text(&self) -> String {
        lock(&self.accumulator).text().to_string()
    }

    /// True once the current answer is closed (completed, failed or
    /// cancelled).
    pub fn is_finalized(&self) -> bool {
        lock(&self.accumulator).is_finalized()
    }

    /// Sends a question and pumps the answer until the stream ends.
    ///
    /// # Errors
    /// Returns the transport error that moved the pump to `Failed`. The partial
    /// answer stays readable through `answer_text()`.
    pub async fn submit(&self, query: &str) -> ChatResult<SubmitResult> {
        self.submit_with_cancel(query, &CancellationToken::new())
            .await
    }

    /// Like `submit`, but stops pumping when `cancel` fires.
    ///
    /// Cancellation releases the transport stream, keeps the partial answer
    /// and ends in `Done` with `StreamStatus::Cancelled`.
    ///
    /// # Errors
    /// Returns the transport error that moved the pump to `Failed`.
    pub async fn submit_with_cancel(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<SubmitResult> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(SubmitResult::Ignored);
        }

        {
            let mut state = lock(&self.state);
            if !state.accepts_submit() {
                tracing::debug!(state = ?*state, "submit rejected, stream in flight");
                return Ok(SubmitResult::Rejected { state: *state });
            }
            *state = PumpState::Sending;
        }

        lock(&self.decoder).reset();
        lock(&self.accumulator).reset();
        tracing::info!(session = %self.session, "question submitted");

        let mut guard = InFlight {
            pump: self,
            armed: true,
        };
        let result = self.run_exchange(query, cancel).await;
        guard.armed = false;
        result.map(SubmitResult::Finished)
    }

    async fn run_exchange(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> ChatResult<PumpOutcome> {
        let request = ChatRequest::new(query, &self.session);

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(self.finish_cancelled(0, 0)),
            opened = self.transport.open_stream(&request) => opened,
        };

        let mut stream = match opened {
            Ok(Some(stream)) => stream,
            Ok(None) => {
                return Err(self.fail(ChatError::new(
                    ChatErrorKind::TransportUnavailable,
                    "Backend returned no streamable body",
                )));
            }
            Err(err) => return Err(self.fail(err)),
        };

        self.set_state(PumpState::Reading);

        let mut chunks = 0usize;
        let mut bytes = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    drop(stream);
                    return Ok(self.finish_cancelled(chunks, bytes));
                }
                next = self.next_chunk(&mut stream) => next,
            };

            match next {
                Ok(Some(chunk)) => {
                    chunks += 1;
                    bytes += chunk.len();
                    tracing::trace!(len = chunk.len(), "chunk received");
                    let text = lock(&self.decoder).decode(&chunk, false);
                    if !text.is_empty() {
                        let appended = lock(&self.accumulator).append(&text);
                        appended.map_err(|err| self.fail(err))?;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    drop(stream);
                    return Err(self.fail(err));
                }
            }
        }
        drop(stream);

        self.set_state(PumpState::Draining);
        let (residue, malformed) = {
            let mut decoder = lock(&self.decoder);
            let residue = decoder.finish();
            (residue, decoder.malformed_count())
        };
        if !residue.is_empty() {
            let appended = lock(&self.accumulator).append(&residue);
            appended.map_err(|err| self.fail(err))?;
        }
        lock(&self.accumulator).finalize();

        let mut recovered = Vec::new();
        if malformed > 0 {
            tracing::warn!(malformed, "replaced malformed byte sequences in answer");
            recovered.push(ChatError::new(
                ChatErrorKind::MalformedByteSequence,
                format!("Replaced {malformed} malformed byte sequence(s)"),
            ));
        }

        self.set_state(PumpState::Done);
        tracing::info!(chunks, bytes, "answer stream completed");

        Ok(PumpOutcome {
            status: StreamStatus::Completed,
            chunks,
            bytes,
            recovered,
        })
    }

    async fn next_chunk(&self, stream: &mut ByteStream) -> ChatResult<Option<Bytes>> {
        let next = match self.options.stall_timeout {
            Some(window) => tokio::time::timeout(window, stream.next())
                .await
                .map_err(|elapsed| {
                    ChatError::timeout(format!(
                        "No data received for {}s ({elapsed})",
                        window.as_secs()
                    ))
                })?,
            None => stream.next().await,
        };
        next.transpose()
    }

    fn set_state(&self, next: PumpState) {
        let mut state = lock(&self.state);
        tracing::debug!(from = ?*state, to = ?next, "pump state");
        *state = next;
    }

    /// Moves to `Failed`, keeping the partial answer read-only.
    fn fail(&self, err: ChatError) -> ChatError {
        tracing::error!(kind = %err.kind, error = %err, "answer stream failed");
        lock(&self.accumulator).finalize();
        self.set_state(PumpState::Failed);
        err
    }

    fn finish_cancelled(&self, chunks: usize, bytes: usize) -> PumpOutcome {
        self.abandon();
        PumpOutcome {
            status: StreamStatus::Cancelled,
            chunks,
            bytes,
            recovered: Vec::new(),
        }
    }

    /// Ends an exchange early without draining the decoder.
    fn abandon(&self) {
        tracing::info!("answer stream cancelled");
        lock(&self.decoder).reset();
        lock(&self.accumulator).finalize();
        self.set_state(PumpState::Done);
    }
}

/// Restores a submittable state if the submit future is dropped mid-flight.
struct InFlight<'a, T: ChatTransport> {
    pump: &'a StreamPump<T>,
    armed: bool,
}

impl<T: ChatTransport> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if self.armed && self.pump.state().is_in_flight() {
            self.pump.abandon();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use futures_util::stream;
    use tokio::sync::{mpsc, oneshot};

    use super::*;

    enum Script {
        Chunks(Vec<ChatResult<Bytes>>),
        Channel(mpsc::UnboundedReceiver<ChatResult<Bytes>>),
        /// Holds the request open until chunks arrive on the receiver.
        Pending(oneshot::Receiver<Vec<ChatResult<Bytes>>>),
        NoBody,
        Refuse(ChatError),
    }

    #[derive(Default)]
    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Self {
            Self {
                scripts: Mutex::new(scripts.into()),
                requests: Mutex::default(),
            }
        }

        fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ChatTransport for ScriptedTransport {
        async fn open_stream(&self, request: &ChatRequest) -> ChatResult<Option<ByteStream>> {
            self.requests.lock().unwrap().push(request.clone());
            let script = self.scripts.lock().unwrap().pop_front();
            match script.expect("no script left for request") {
                Script::Chunks(chunks) => Ok(Some(stream::iter(chunks).boxed())),
                Script::Channel(rx) => Ok(Some(
                    stream::unfold(rx, |mut rx| async move {
                        rx.recv().await.map(|item| (item, rx))
                    })
                    .boxed(),
                )),
                Script::Pending(rx) => match rx.await {
                    Ok(chunks) => Ok(Some(stream::iter(chunks).boxed())),
                    Err(_) => Ok(None),
                },
                Script::NoBody => Ok(None),
                Script::Refuse(err) => Err(err),
            }
        }
    }

    fn ok(bytes: &[u8]) -> ChatResult<Bytes> {
        Ok(Bytes::copy_from_slice(bytes))
    }

    fn pump(scripts: Vec<Script>) -> StreamPump<ScriptedTransport> {
        StreamPump::new(
            ScriptedTransport::new(scripts),
            SessionContext::new("user1"),
            PumpOptions::default(),
        )
    }

    fn finished(result: ChatResult<SubmitResult>) -> PumpOutcome {
        match result.expect("submit failed") {
            SubmitResult::Finished(outcome) => outcome,
            other => panic!("expected finished exchange, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_streams_chunks_into_answer() {
        let pump = pump(vec![Script::Chunks(vec![
            ok(b"## Answer\n"),
            ok(b"Gross margin "),
            ok(b"is 18%."),
        ])]);

        let outcome = finished(pump.submit("Tesla margin?").await);

        assert_eq!(outcome.status, StreamStatus::Completed);
        assert_eq!(outcome.chunks, 3);
        assert_eq!(pump.answer_text(), "## Answer\nGross margin is 18%.");
        assert_eq!(pump.state(), PumpState::Done);
        assert!(pump.is_finalized());

        let requests = pump.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query, "Tesla margin?");
        assert_eq!(requests[0].session_id, "user1");
    }

    #[tokio::test]
    async fn test_multibyte_character_split_between_chunks() {
        let bytes = "特斯拉 Tesla".as_bytes();
        let pump = pump(vec![Script::Chunks(vec![ok(&bytes[..1]), ok(&bytes[1..])])]);

        let outcome = finished(pump.submit("q").await);

        assert_eq!(pump.answer_text(), "特斯拉 Tesla");
        assert!(!pump.answer_text().contains('\u{FFFD}'));
        assert!(outcome.recovered.is_empty());
    }

    #[tokio::test]
    async fn test_truncated_tail_is_replaced_and_reported() {
        let pump = pump(vec![Script::Chunks(vec![ok(b"ok "), ok(b"\xE6\x96")])]);

        let outcome = finished(pump.submit("q").await);

        assert_eq!(pump.answer_text(), "ok \u{FFFD}");
        assert_eq!(outcome.recovered.len(), 1);
        assert_eq!(
            outcome.recovered[0].kind,
            ChatErrorKind::MalformedByteSequence
        );
        assert_eq!(pump.state(), PumpState::Done);
    }

    #[tokio::test]
    async fn test_observer_notified_per_decoded_chunk() {
        let pump = pump(vec![Script::Chunks(vec![ok(b"a"), ok(b"b"), ok(b"c")])]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pump.subscribe(move |update| sink.lock().unwrap().push(update.clone()));

        finished(pump.submit("q").await);

        let seen = seen.lock().unwrap();
        let texts: Vec<&str> = seen.iter().map(|u| u.text.as_str()).collect();
        // reset, three appends, finalize
        assert_eq!(texts, vec!["", "a", "ab", "abc", "abc"]);
        assert!(seen.last().unwrap().is_finalized());
    }

    #[tokio::test]
    async fn test_no_body_fails_with_transport_unavailable() {
        let pump = pump(vec![Script::NoBody]);

        let err = pump.submit("q").await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::TransportUnavailable);
        assert_eq!(pump.state(), PumpState::Failed);
        assert_eq!(pump.answer_text(), "");
    }

    #[tokio::test]
    async fn test_refused_request_fails() {
        let pump = pump(vec![Script::Refuse(ChatError::http_status(500, ""))]);

        let err = pump.submit("q").await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::HttpStatus);
        assert_eq!(pump.state(), PumpState::Failed);
    }

    #[tokio::test]
    async fn test_mid_stream_error_keeps_partial_answer() {
        let pump = pump(vec![Script::Chunks(vec![
            ok(b"partial "),
            ok(b"answer"),
            Err(ChatError::network("connection reset")),
            ok(b" never seen"),
        ])]);

        let err = pump.submit("q").await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::NetworkFailure);
        assert_eq!(pump.state(), PumpState::Failed);
        assert_eq!(pump.answer_text(), "partial answer");
        assert!(pump.is_finalized());
    }

    #[tokio::test]
    async fn test_new_submit_after_failure_resets_answer() {
        let pump = pump(vec![
            Script::Chunks(vec![ok(b"stale"), Err(ChatError::network("reset"))]),
            Script::Chunks(vec![ok(b"fresh answer")]),
        ]);

        assert!(pump.submit("first").await.is_err());
        assert_eq!(pump.answer_text(), "stale");

        finished(pump.submit("second").await);
        assert_eq!(pump.answer_text(), "fresh answer");
        assert_eq!(pump.state(), PumpState::Done);
    }

    #[tokio::test]
    async fn test_empty_query_is_ignored() {
        let pump = pump(Vec::new());

        let result = pump.submit("   ").await.unwrap();

        assert_eq!(result, SubmitResult::Ignored);
        assert_eq!(pump.state(), PumpState::Idle);
        assert!(pump.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_second_submit_while_reading_is_rejected() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = pump(vec![Script::Channel(rx)]);

        let second = async {
            while pump.state() != PumpState::Reading {
                tokio::task::yield_now().await;
            }
            let result = pump.submit("second question").await;
            tx.send(ok(b"answer one")).unwrap();
            drop(tx);
            result
        };

        let (first, second) = tokio::join!(pump.submit("first question"), second);

        assert_eq!(
            second.unwrap(),
            SubmitResult::Rejected {
                state: PumpState::Reading
            }
        );
        finished(first);
        assert_eq!(pump.answer_text(), "answer one");
        assert_eq!(pump.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_keeps_partial_answer_without_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = pump(vec![Script::Channel(rx)]);
        let cancel = CancellationToken::new();

        let driver = async {
            tx.send(ok(b"half an ")).unwrap();
            while pump.answer_text() != "half an " {
                tokio::task::yield_now().await;
            }
            cancel.cancel();
        };

        let (result, ()) = tokio::join!(pump.submit_with_cancel("q", &cancel), driver);

        let outcome = finished(result);
        assert_eq!(outcome.status, StreamStatus::Cancelled);
        assert_eq!(outcome.chunks, 1);
        assert_eq!(pump.answer_text(), "half an ");
        assert_eq!(pump.state(), PumpState::Done);
        // The read handle was released with the stream.
        assert!(tx.send(ok(b"late")).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_timeout_fails_exchange() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = StreamPump::new(
            ScriptedTransport::new(vec![Script::Channel(rx)]),
            SessionContext::default(),
            PumpOptions {
                stall_timeout: Some(Duration::from_secs(5)),
            },
        );
        tx.send(ok(b"before stall")).unwrap();

        let err = pump.submit("q").await.unwrap_err();

        assert_eq!(err.kind, ChatErrorKind::Timeout);
        assert_eq!(pump.state(), PumpState::Failed);
        assert_eq!(pump.answer_text(), "before stall");
        drop(tx);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_submit_future_releases_pump() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let pump = pump(vec![
            Script::Channel(rx),
            Script::Chunks(vec![ok(b"next")]),
        ]);

        let timed_out = tokio::time::timeout(Duration::from_millis(50), pump.submit("q")).await;
        assert!(timed_out.is_err());
        assert_eq!(pump.state(), PumpState::Done);

        finished(pump.submit("again").await);
        assert_eq!(pump.answer_text(), "next");
    }

    #[tokio::test]
    async fn test_answer_is_open_while_reading() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pump = pump(vec![Script::Channel(rx)]);

        let driver = async {
            tx.send(ok(b"first ")).unwrap();
            while pump.answer_text() != "first " {
                tokio::task::yield_now().await;
            }
            assert_eq!(pump.state(), PumpState::Reading);
            assert!(!pump.is_finalized());
            tx.send(ok(b"tail")).unwrap();
            drop(tx);
        };

        let (result, ()) = tokio::join!(pump.submit("q"), driver);

        finished(result);
        assert_eq!(pump.answer_text(), "first tail");
        assert!(pump.is_finalized());
    }

    #[tokio::test]
    async fn test_second_submit_while_sending_is_rejected() {
        let (tx, rx) = oneshot::channel();
        let pump = pump(vec![Script::Pending(rx)]);

        let second = async {
            while pump.state() != PumpState::Sending {
                tokio::task::yield_now().await;
            }
            let result = pump.submit("second question").await;
            tx.send(vec![ok(b"answer one")]).unwrap();
            result
        };

        let (first, second) = tokio::join!(pump.submit("first question"), second);

        assert_eq!(
            second.unwrap(),
            SubmitResult::Rejected {
                state: PumpState::Sending
            }
        );
        finished(first);
        assert_eq!(pump.answer_text(), "answer one");
        assert_eq!(pump.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_while_sending_reads_nothing() {
        let (tx, rx) = oneshot::channel();
        let pump = pump(vec![Script::Pending(rx)]);
        let cancel = CancellationToken::new();

        let driver = async {
            while pump.state() != PumpState::Sending {
                tokio::task::yield_now().await;
            }
            cancel.cancel();
        };

        let (result, ()) = tokio::join!(pump.submit_with_cancel("q", &cancel), driver);

        let outcome = finished(result);
        assert_eq!(outcome.status, StreamStatus::Cancelled);
        assert_eq!(outcome.chunks, 0);
        assert_eq!(outcome.bytes, 0);
        assert_eq!(pump.state(), PumpState::Done);
        assert_eq!(pump.answer_text(), "");
        assert!(pump.is_finalized());
        // The pending request was dropped with the cancelled exchange.
        assert!(tx.send(vec![ok(b"late")]).is_err());
    }
}
