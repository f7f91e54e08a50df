//! CLI entry and dispatch.

use std::io::{IsTerminal, Stdout, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use askdoc_core::config::{self, Config};
use askdoc_core::logging;
use askdoc_core::session::SessionContext;
use askdoc_core::transport::HttpTransport;
use askdoc_tui::live::{fit_width, terminal_width};
use askdoc_tui::{LiveView, ViewMode};
use clap::Parser;

mod answer;
mod commands;

/// Marker error: the user interrupted a running answer (exit code 130).
#[derive(Debug)]
pub struct Interrupted;

impl std::fmt::Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for Interrupted {}

#[derive(Parser)]
#[command(name = "askdoc")]
#[command(version)]
#[command(about = "Ask questions about your documents and watch the answer stream in")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Backend base URL (overrides ASKDOC_BASE_URL and config)
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,

    /// Session id for retrieval and uploads (overrides config)
    #[arg(long, global = true, value_name = "ID", conflicts_with = "new_session")]
    session: Option<String>,

    /// Start with a fresh random session id
    #[arg(long, global = true)]
    new_session: bool,

    /// Print raw answer text instead of rendered Markdown
    #[arg(long, global = true)]
    plain: bool,

    /// Log everything (trace level) to the log file
    #[arg(long, global = true)]
    debug_log: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Ask one question and stream the answer
    Ask {
        /// The question ("-" reads it from stdin)
        #[arg(value_name = "QUERY")]
        query: String,
    },
    /// Interactive question/answer loop (default)
    Chat,
    /// Upload a document into the session
    Upload {
        /// File to upload
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
    /// Set the backend base URL in the config file
    SetBaseUrl {
        #[arg(value_name = "URL")]
        url: String,
    },
}

/// Settings resolved from flags, environment and config for one run.
#[derive(Debug, Clone)]
pub(crate) struct AppContext {
    pub config: Config,
    pub base_url: String,
    pub session: SessionContext,
    pub mode: ViewMode,
}

impl AppContext {
    fn resolve(cli: &Cli, config: Config) -> Result<Self> {
        let base_url = match cli.base_url.as_deref() {
            Some(url) => config::resolve_base_url(Some(url), None)?,
            None => config.effective_base_url()?,
        };

        let session = if cli.new_session {
            SessionContext::generate()
        } else if let Some(id) = cli.session.as_deref() {
            SessionContext::new(id)
        } else {
            config.session()
        };

        let mode = if cli.plain || !std::io::stdout().is_terminal() {
            ViewMode::Plain
        } else {
            ViewMode::Ansi
        };

        Ok(Self {
            config,
            base_url,
            session,
            mode,
        })
    }

    pub fn transport(&self) -> Result<HttpTransport> {
        HttpTransport::new(&self.base_url, self.config.connect_timeout())
            .context("create HTTP transport")
    }

    /// Answer view on stdout sized for the current terminal.
    pub fn live_view(&self) -> LiveView<Stdout> {
        let mut view = LiveView::new(std::io::stdout(), self.mode, 0);
        self.fit_view(&mut view);
        view
    }

    /// Re-reads the terminal size; called between answers so a resize
    /// takes effect on the next one.
    pub fn fit_view<W: Write>(&self, view: &mut LiveView<W>) {
        let columns = terminal_width();
        let width = fit_width(self.config.render_width(), columns);
        view.set_width(width);
        view.set_columns(columns.unwrap_or(width));
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = match logging::init(cli.debug_log) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: file logging disabled: {e:#}");
            None
        }
    };

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(mut cli: Cli) -> Result<()> {
    let command = match cli.command.take() {
        Some(Commands::Config { command }) => {
            return match command {
                ConfigCommands::Path => {
                    commands::config::path();
                    Ok(())
                }
                ConfigCommands::Init => commands::config::init(),
                ConfigCommands::SetBaseUrl { url } => commands::config::set_base_url(&url),
            };
        }
        Some(command) => command,
        // default to chat mode
        None => Commands::Chat,
    };

    let config = Config::load().context("load config")?;
    let ctx = AppContext::resolve(&cli, config)?;
    tracing::info!(base_url = %ctx.base_url, session = %ctx.session, "askdoc starting");

    match command {
        Commands::Ask { query } => commands::ask::run(&ctx, &query).await,
        Commands::Chat => commands::chat::run(&ctx).await,
        Commands::Upload { file } => commands::upload::run(&ctx, &file).await,
        // handled before config is loaded
        Commands::Config { .. } => Ok(()),
    }
}
