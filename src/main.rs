//! Chatpane CLI
//!
//! Terminal chat client with streaming answers, plus the file upload server.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chatpane::session::stream::run_turn;
use chatpane::tui::App;
use chatpane::upload::{self, upload_file};
use chatpane::{ChatConfig, ChatError, HttpBackend, SessionController, StreamEvent};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Chatpane - chat with a streaming assistant from the terminal
#[derive(Parser, Debug)]
#[command(name = "chatpane")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: <config_dir>/chatpane/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory uploaded files are stored in
    #[arg(long, global = true)]
    upload_dir: Option<PathBuf>,

    /// Address the upload server binds to
    #[arg(long, global = true)]
    listen: Option<String>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable TUI and use plain text mode
    #[arg(long)]
    no_tui: bool,

    /// Also run the upload server in the background
    #[arg(long)]
    with_server: bool,

    /// Write logs to this file (the TUI logs nowhere otherwise)
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run only the file upload server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ChatConfig::load(cli.config.as_deref()).await?;
    if let Some(dir) = &cli.upload_dir {
        config = config.with_upload_dir(dir.clone());
    }
    if let Some(listen) = &cli.listen {
        config = config.with_listen(listen.clone());
    }

    match cli.command {
        Some(Command::Serve) => {
            init_stderr_logging(cli.verbose);
            upload::serve(
                &config.upload.listen,
                config.upload.dir.clone(),
                config.upload.max_upload_bytes,
            )
            .await
        }
        None if cli.no_tui => {
            init_stderr_logging(cli.verbose);
            maybe_spawn_server(cli.with_server, &config);
            run_plain_mode(config).await
        }
        None => {
            if let Some(path) = &cli.log_file {
                init_file_logging(path, cli.verbose)?;
            }
            maybe_spawn_server(cli.with_server, &config);
            run_tui_mode(config).await
        }
    }
}

fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Log to a file so output does not tear through the TUI
fn init_file_logging(path: &Path, verbose: bool) -> anyhow::Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

fn maybe_spawn_server(enabled: bool, config: &ChatConfig) {
    if !enabled {
        return;
    }
    let listen = config.upload.listen.clone();
    let dir = config.upload.dir.clone();
    let limit = config.upload.max_upload_bytes;
    tokio::spawn(async move {
        if let Err(e) = upload::serve(&listen, dir, limit).await {
            warn!("Upload server stopped: {e:#}");
        }
    });
}

async fn run_tui_mode(config: ChatConfig) -> anyhow::Result<()> {
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let mut app = App::new(config, backend)?;
    app.run().await?;
    Ok(())
}

/// Line-oriented mode: each stdin line is a question, answers stream to stdout.
async fn run_plain_mode(config: ChatConfig) -> anyhow::Result<()> {
    info!("Starting Chatpane (plain mode)");
    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let inactivity = config.backend.inactivity_timeout();
    let http = reqwest::Client::new();
    let mut controller = SessionController::new();

    let (line_tx, mut line_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("Error reading stdin: {e}");
                    break;
                }
            }
        }
    });

    while let Some(line) = line_rx.recv().await {
        let line = line.trim();
        match line {
            "/quit" => break,
            "/clear" => {
                controller.clear();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }
        if let Some(path) = line.strip_prefix("/upload ") {
            match upload_file(&http, &config.upload.endpoint, Path::new(path.trim())).await {
                Ok(receipt) => println!("{}", receipt.message),
                Err(ChatError::UploadFailed(message)) => println!("{message}"),
                Err(e) => println!("Could not upload {path}: {e}"),
            }
            continue;
        }

        let result = run_turn(
            &mut controller,
            Arc::clone(&backend),
            line,
            inactivity,
            |event, _| print_event(event, &config.ui.empty_citation_message),
        )
        .await;
        match result {
            Ok(()) => {
                if let Some(err) = controller.last_error() {
                    println!();
                    eprintln!("Answer failed: {err}");
                }
            }
            // Empty lines are simply ignored
            Err(ChatError::InputRejected(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

fn print_event(event: &StreamEvent, empty_citation: &str) {
    let mut stdout = io::stdout();
    match event {
        StreamEvent::Phase(phase) => eprintln!("{} {}", phase.icon.glyph(), phase.status),
        StreamEvent::Fragment(text) => {
            let _ = write!(stdout, "{text}");
        }
        StreamEvent::Citations(citations) => {
            for citation in citations {
                let description = if citation.source_description.trim().is_empty() {
                    empty_citation
                } else {
                    &citation.source_description
                };
                eprintln!("source: {description} {}", citation.source_url);
            }
        }
        StreamEvent::Done => {
            let _ = writeln!(stdout);
        }
        StreamEvent::Failed(_) => {}
    }
    let _ = stdout.flush();
}
