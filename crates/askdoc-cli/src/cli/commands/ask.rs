//! Ask command handler: one question, one streamed answer.

use std::io::Read;
use std::sync::Arc;

use anyhow::{Context, Result};
use askdoc_core::stream::StreamPump;
use askdoc_tui::{CopyStates, SystemClipboard};

use crate::cli::answer::{AnswerEnd, stream_answer};
use crate::cli::{AppContext, Interrupted};

pub async fn run(ctx: &AppContext, query: &str) -> Result<()> {
    let query = if query == "-" {
        let mut input = String::new();
        std::io::stdin()
            .lock()
            .read_to_string(&mut input)
            .context("read question from stdin")?;
        input
    } else {
        query.to_string()
    };

    let pump = StreamPump::new(
        ctx.transport()?,
        ctx.session.clone(),
        ctx.config.pump_options(),
    );
    let mut view = ctx.live_view();
    let mut copy = CopyStates::new(Arc::new(SystemClipboard));

    match stream_answer(&pump, &mut view, &mut copy, &query).await? {
        AnswerEnd::Completed => Ok(()),
        AnswerEnd::Cancelled => Err(Interrupted.into()),
        AnswerEnd::Ignored => anyhow::bail!("Question must not be empty"),
        AnswerEnd::Failed(err) => Err(err).context("answer stream failed"),
    }
}
