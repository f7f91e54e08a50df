//! Streams one answer into the live view.

use std::io::Write;

use anyhow::{Context, Result};
use askdoc_core::ChatError;
use askdoc_core::stream::{StreamPump, StreamStatus, SubmitResult};
use askdoc_core::transport::ChatTransport;
use askdoc_tui::{CopyStates, LiveView};
use tokio_util::sync::CancellationToken;

/// How an answer ended.
#[derive(Debug)]
pub(crate) enum AnswerEnd {
    Completed,
    /// Ctrl-C stopped the stream; the partial answer is on screen.
    Cancelled,
    /// Blank question, nothing was sent.
    Ignored,
    /// The stream failed; the partial answer is on screen.
    Failed(ChatError),
}

/// Submits `query` and repaints the view on every answer change until the
/// stream ends. Ctrl-C cancels the stream rather than the process.
///
/// # Errors
/// Returns an error only if writing to the terminal fails.
pub(crate) async fn stream_answer<T, W>(
    pump: &StreamPump<T>,
    view: &mut LiveView<W>,
    copy: &mut CopyStates,
    query: &str,
) -> Result<AnswerEnd>
where
    T: ChatTransport,
    W: Write,
{
    let cancel = CancellationToken::new();
    let mut updates = pump.subscribe_channel();

    let submit = pump.submit_with_cancel(query, &cancel);
    tokio::pin!(submit);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            Some(update) = updates.recv() => {
                view.apply(&update, copy).context("write answer")?;
            }
            _ = &mut ctrl_c, if !cancel.is_cancelled() => {
                tracing::info!("answer interrupted by user");
                cancel.cancel();
            }
        }
    };

    while let Ok(update) = updates.try_recv() {
        view.apply(&update, copy).context("write answer")?;
    }

    // the pump finalizes on every exit path, so the view has already
    // received its closing update
    Ok(match result {
        Ok(SubmitResult::Finished(outcome)) => {
            for problem in &outcome.recovered {
                let level = if problem.is_fatal() { "error" } else { "warning" };
                eprintln!("{level}: {problem}");
            }
            match outcome.status {
                StreamStatus::Completed => AnswerEnd::Completed,
                StreamStatus::Cancelled => AnswerEnd::Cancelled,
            }
        }
        Ok(SubmitResult::Ignored) => AnswerEnd::Ignored,
        Ok(SubmitResult::Rejected { state }) => {
            anyhow::bail!("An answer is already streaming ({state:?})")
        }
        Err(err) => AnswerEnd::Failed(err),
    })
}
