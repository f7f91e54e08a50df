//! Chat command handler: line-mode question/answer loop.

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use askdoc_core::session::SessionContext;
use askdoc_core::stream::StreamPump;
use askdoc_core::transport::HttpTransport;
use askdoc_tui::live::block_summary;
use askdoc_tui::{CopyStates, LiveView, Style, StyledLine, SystemClipboard};
use tokio::sync::mpsc;

use crate::cli::AppContext;
use crate::cli::answer::{AnswerEnd, stream_answer};

const PROMPT: &str = "you> ";

const HELP: &str = "\
Commands:
  :q, exit   quit
  :blocks    list code blocks of the last answer
  :copy N    copy code block N to the clipboard
  :new       start a fresh session
  :help      show this help
Anything else is sent as a question. Ctrl-C stops a streaming answer.";

/// One line of REPL input.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Empty,
    Quit,
    Help,
    Blocks,
    Copy(usize),
    NewSession,
    BadCommand(String),
    Question(&'a str),
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    if line.eq_ignore_ascii_case("exit") {
        return Input::Quit;
    }
    let Some(command) = line.strip_prefix(':') else {
        return Input::Question(line);
    };

    let mut parts = command.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("q" | "quit"), None, None) => Input::Quit,
        (Some("help"), None, None) => Input::Help,
        (Some("blocks"), None, None) => Input::Blocks,
        (Some("new"), None, None) => Input::NewSession,
        (Some("copy"), Some(n), None) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Input::Copy(n),
            _ => Input::BadCommand(format!("Not a block number: {n}")),
        },
        (Some("copy"), None, None) => Input::BadCommand("Usage: :copy N".to_string()),
        _ => Input::BadCommand(format!("Unknown command: {line} (try :help)")),
    }
}

/// Reads stdin lines on a plain thread so a blocking read never holds up
/// the runtime. The channel closes at EOF.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn prompt() -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{PROMPT}").context("write prompt")?;
    stdout.flush().context("flush prompt")
}

pub async fn run(ctx: &AppContext) -> Result<()> {
    let mut pump = StreamPump::new(
        ctx.transport()?,
        ctx.session.clone(),
        ctx.config.pump_options(),
    );
    let mut view = ctx.live_view();
    let mut copy = CopyStates::new(Arc::new(SystemClipboard));
    let mut lines = spawn_line_reader();

    println!(
        "askdoc chat at {} (session {}). Type :help for commands.",
        ctx.base_url,
        pump.session()
    );

    loop {
        prompt()?;
        let line = tokio::select! {
            line = lines.recv() => line,
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Goodbye!");
                break;
            }
        };
        // EOF
        let Some(line) = line else { break };

        match parse_input(&line) {
            Input::Empty => {}
            Input::Quit => {
                println!("Goodbye!");
                break;
            }
            Input::Help => println!("{HELP}"),
            Input::Blocks => list_blocks(&mut view, &copy)?,
            Input::Copy(n) => copy_block(&view, &mut copy, n),
            Input::NewSession => new_session(&mut pump)?,
            Input::BadCommand(message) => eprintln!("{message}"),
            Input::Question(query) => {
                ctx.fit_view(&mut view);
                match stream_answer(&pump, &mut view, &mut copy, query).await? {
                    AnswerEnd::Completed | AnswerEnd::Ignored => {}
                    AnswerEnd::Cancelled => {
                        view.notice(&StyledLine::from_span("(answer stopped)", Style::Notice))
                            .context("write notice")?;
                    }
                    AnswerEnd::Failed(err) => {
                        tracing::debug!(details = ?err.details, "answer failed");
                        eprintln!("Error: {err}");
                    }
                }
            }
        }
    }

    Ok(())
}

fn list_blocks<W: Write>(view: &mut LiveView<W>, copy: &CopyStates) -> Result<()> {
    let summary = block_summary(view.tree(), copy);
    if summary.is_empty() {
        println!("No code blocks in the last answer.");
        return Ok(());
    }
    for line in &summary {
        view.notice(line).context("write block list")?;
    }
    Ok(())
}

fn copy_block<W: Write>(view: &LiveView<W>, copy: &mut CopyStates, n: usize) {
    let Some(block) = view.tree().code_block(n - 1) else {
        eprintln!("No code block {n}");
        return;
    };
    if copy.copy(n - 1, &block.descriptor.raw_text) {
        println!("{}", askdoc_tui::copy::COPIED_LABEL);
    } else {
        eprintln!("Copy failed");
    }
}

fn new_session(pump: &mut StreamPump<HttpTransport>) -> Result<()> {
    let session = SessionContext::generate();
    let id = session.session_id().to_string();
    pump.set_session(session).context("switch session")?;
    println!("New session {id}");
    Ok(())
}
