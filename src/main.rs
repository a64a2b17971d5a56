#![forbid(unsafe_code)]

//! `agent-stream` — command-line client for a streaming conversational agent.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use agent_stream::framing::FramingMode;
use agent_stream::lifecycle::CancelHandle;
use agent_stream::models::{SessionState, SessionStatus, StreamEvent};
use agent_stream::{AppError, ClientConfig, Conversation, Result};

/// Chat command that starts a new conversation thread.
const RESET_COMMAND: &str = "/reset";
/// Chat command that leaves the loop.
const QUIT_COMMAND: &str = "/quit";
/// A second interrupt within this window exits even while a turn is running.
const DOUBLE_INTERRUPT_WINDOW: Duration = Duration::from_secs(2);
/// Exit status after an interrupt (128 + SIGINT).
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agent-stream", about = "Streaming conversational agent client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the agent root URL.
    #[arg(long)]
    base_url: Option<String>,

    /// Override the streaming framing protocol.
    #[arg(long, value_enum)]
    framing: Option<FramingMode>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send a prompt and print the complete answer.
    Ask {
        /// Prompt text.
        prompt: String,
    },
    /// Send a prompt and print the answer as it streams.
    Stream {
        /// Prompt text.
        prompt: String,
    },
    /// Interactive streaming conversation over stdin.
    Chat,
    /// Print agent health and transport settings.
    Health,
}

fn main() -> Result<ExitCode> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let code = runtime.block_on(run(args));
    // A pending stdin read would otherwise hold shutdown open.
    runtime.shutdown_background();
    code
}

async fn run(args: Cli) -> Result<ExitCode> {
    let mut config = match &args.config {
        Some(path) => ClientConfig::load_from_path(path)?,
        None => ClientConfig::default(),
    };
    if let Some(base_url) = args.base_url {
        config.base_url = base_url;
    }
    if let Some(framing) = args.framing {
        config.framing = framing;
    }
    config.validate()?;
    info!(base_url = %config.base_url, framing = ?config.framing, "configuration loaded");

    let mut conversation = Conversation::new(&config)?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(conversation.cancel_handle(), shutdown.clone());

    let status = tokio::select! {
        biased;
        () = shutdown.cancelled() => return Ok(ExitCode::from(INTERRUPTED_EXIT_CODE)),
        status = execute(args.command, &mut conversation) => status?,
    };

    Ok(if status == SessionStatus::Error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn execute(command: Command, conversation: &mut Conversation) -> Result<SessionStatus> {
    let status = match command {
        Command::Ask { prompt } => {
            let state = conversation.ask(&prompt).await;
            if let Some(text) = &state.final_response {
                println!("{text}");
            }
            report(state)
        }
        Command::Stream { prompt } => {
            spawn_highlight_logger(conversation);
            let state = conversation.stream_with(&prompt, print_event).await;
            report(state)
        }
        Command::Chat => chat(conversation).await?,
        Command::Health => {
            let client = conversation.client();
            let health = client.health().await?;
            let connectivity = client.connectivity().await?;
            let transport = client.transport_config().await?;
            println!("status: {}", health.status);
            println!("connectivity: {}", connectivity.status);
            println!("transport: {}", transport.transport);
            SessionStatus::Complete
        }
    };
    Ok(status)
}

async fn chat(conversation: &mut Conversation) -> Result<SessionStatus> {
    spawn_highlight_logger(conversation);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last = SessionStatus::Idle;

    loop {
        print!("> ");
        flush_stdout();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let prompt = line.trim();
        match prompt {
            "" => continue,
            QUIT_COMMAND => break,
            RESET_COMMAND => {
                conversation.reset()?;
                println!("(new conversation)");
                continue;
            }
            _ => {}
        }

        let state = conversation.stream_with(prompt, print_event).await;
        last = report(state);
    }

    Ok(last)
}

/// Print a value as soon as it has been applied to the session.
fn print_event(event: &StreamEvent) {
    match event {
        StreamEvent::Token { text } => {
            print!("{text}");
            flush_stdout();
        }
        StreamEvent::DomainEvent(domain) => println!(
            "[{} {}] {} -> {}: {}",
            domain.order_id, domain.state, domain.sender, domain.receiver, domain.message
        ),
        StreamEvent::FinalResponse { text } => println!("{text}"),
        StreamEvent::NodeHighlight { .. } | StreamEvent::Error { .. } => {}
    }
}

/// Print the outcome of a finished turn and return its status.
fn report(state: &SessionState) -> SessionStatus {
    match state.status {
        SessionStatus::Complete if !state.active_message.is_empty() => println!(),
        SessionStatus::Error => {
            eprintln!(
                "error: {}",
                state.error.as_deref().unwrap_or("request failed")
            );
        }
        SessionStatus::Idle => eprintln!("(cancelled)"),
        _ => {}
    }
    state.status
}

fn flush_stdout() {
    if let Err(err) = std::io::stdout().flush() {
        warn!(%err, "failed to flush stdout");
    }
}

fn spawn_highlight_logger(conversation: &Conversation) {
    let mut highlights = conversation.subscribe_highlights();
    tokio::spawn(async move {
        loop {
            match highlights.recv().await {
                Ok(highlight) => info!(
                    generation = highlight.generation,
                    node = %highlight.node_id,
                    "node active"
                ),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "node highlights lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Route Ctrl-C and SIGTERM.
///
/// A signal cancels the in-flight turn. It requests shutdown instead when no
/// turn is running, or when it repeats within [`DOUBLE_INTERRUPT_WINDOW`].
fn spawn_signal_handler(cancel: CancelHandle, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut last_interrupt: Option<Instant> = None;
        loop {
            shutdown_signal().await;
            let repeated =
                last_interrupt.is_some_and(|at| at.elapsed() < DOUBLE_INTERRUPT_WINDOW);
            last_interrupt = Some(Instant::now());

            if !repeated && cancel.cancel() {
                info!("interrupt received, cancelled current request");
                continue;
            }
            info!("interrupt received, shutting down");
            shutdown.cancel();
            break;
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
