use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Map, Value};
use studio_contracts::events::EventWriter;
use studio_contracts::generation::GenerationRequest;
use studio_engine::{
    save_data_uri, ChatSession, DryrunBackend, EngineConfig, GeminiBackend, GenerationEngine,
    GenerativeBackend,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod chat;
mod server;

#[derive(Debug, Parser)]
#[command(name = "studio", version, about = "Chat-driven image generation")]
struct Cli {
    /// Log output format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    /// Append JSONL run events to this file.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve `POST /api/generate`.
    Serve(ServeArgs),
    /// Interactive chat on the terminal.
    Chat(ChatArgs),
    /// Generate one image and exit.
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ServeArgs {
    #[arg(long, env = "STUDIO_ADDR", default_value = "127.0.0.1:3000")]
    addr: SocketAddr,
    /// Largest accepted request body. History images arrive inline as base64.
    #[arg(long, env = "STUDIO_MAX_BODY_BYTES", default_value_t = server::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long, default_value = "studio-out")]
    out: PathBuf,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    model: Option<String>,
    #[arg(long, default_value = "studio-out")]
    out: PathBuf,
    #[arg(long)]
    dryrun: bool,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Command::Chat(_) => "warn",
        _ => "info",
    };
    init_tracing(cli.log_format, default_level);

    match cli.command {
        Command::Serve(args) => run_serve(args, cli.events),
        Command::Chat(args) => run_chat(args, cli.events),
        Command::Run(args) => run_once(args, cli.events),
    }
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn build_engine(command: &str, dryrun: bool, events: Option<PathBuf>) -> Result<GenerationEngine> {
    let config = EngineConfig::from_env()?;
    debug!(?config, "engine configuration");
    let backend: Arc<dyn GenerativeBackend> = if dryrun {
        Arc::new(DryrunBackend)
    } else {
        Arc::new(GeminiBackend::new(&config)?)
    };
    let mut engine = GenerationEngine::new(backend, &config);

    if let Some(path) = events {
        let writer = EventWriter::for_new_session(path);
        writer.emit(
            "session_started",
            json_object(json!({
                "command": command,
                "backend": engine.backend_name(),
                "image_model": engine.image_model(),
                "text_model": engine.text_model(),
            })),
        )?;
        info!(path = %writer.path().display(), session_id = writer.session_id(), "recording events");
        engine = engine.with_events(writer);
    }
    Ok(engine)
}

fn run_serve(args: ServeArgs, events: Option<PathBuf>) -> Result<i32> {
    // The blocking HTTP client must be created and dropped outside the async
    // runtime, so the engine outlives `runtime`.
    let engine = Arc::new(build_engine("serve", args.dryrun, events)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let served = runtime.block_on(server::serve(
        args.addr,
        Arc::clone(&engine),
        args.max_body_bytes,
    ));
    drop(runtime);
    drop(engine);
    served?;
    Ok(0)
}

fn run_chat(args: ChatArgs, events: Option<PathBuf>) -> Result<i32> {
    let engine = build_engine("chat", args.dryrun, events)?;
    chat::run_chat_stdio(&engine, ChatSession::new(args.model), &args.out)?;
    Ok(0)
}

fn run_once(args: RunArgs, events: Option<PathBuf>) -> Result<i32> {
    let engine = build_engine("run", args.dryrun, events)?;
    let request = GenerationRequest::new(Some(args.prompt), args.model, Vec::new())?;
    let result = engine.submit(&request);

    let Some(image) = result.image.as_deref() else {
        eprintln!("studio error: {}", result.status);
        return Ok(1);
    };
    let path = save_data_uri(&args.out, 1, image)?;
    println!("{} Saved to {}", result.status, path.display());
    Ok(0)
}

fn json_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults_to_local_port_3000() {
        let cli = Cli::try_parse_from(["studio", "serve", "--dryrun"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert!(args.dryrun);
        if std::env::var_os("STUDIO_ADDR").is_none() {
            assert_eq!(args.addr, "127.0.0.1:3000".parse::<SocketAddr>().unwrap());
        }
        if std::env::var_os("STUDIO_MAX_BODY_BYTES").is_none() {
            assert_eq!(args.max_body_bytes, server::DEFAULT_MAX_BODY_BYTES);
        }
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "studio",
            "run",
            "--prompt",
            "a red kite",
            "--model",
            "3.0",
            "--log-format",
            "json",
            "--events",
            "events.jsonl",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormat::Json);
        assert_eq!(cli.events, Some(PathBuf::from("events.jsonl")));
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.prompt, "a red kite");
        assert_eq!(args.model.as_deref(), Some("3.0"));
        assert_eq!(args.out, PathBuf::from("studio-out"));
    }

    #[test]
    fn serve_body_limit_is_configurable() {
        let cli =
            Cli::try_parse_from(["studio", "serve", "--max-body-bytes", "8388608"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.max_body_bytes, 8 * 1024 * 1024);
        assert!(Cli::try_parse_from(["studio", "serve", "--max-body-bytes", "lots"]).is_err());
    }

    #[test]
    fn run_requires_a_prompt() {
        assert!(Cli::try_parse_from(["studio", "run"]).is_err());
    }

    #[test]
    fn dryrun_run_writes_the_image() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events = temp.path().join("events.jsonl");
        let code = run_once(
            RunArgs {
                prompt: "a red kite".to_string(),
                model: None,
                out: temp.path().join("out"),
                dryrun: true,
            },
            Some(events.clone()),
        )?;
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_dir(temp.path().join("out"))?.count(), 1);

        let log = std::fs::read_to_string(events)?;
        let first: Value = serde_json::from_str(log.lines().next().unwrap_or_default())?;
        assert_eq!(first["type"], "session_started");
        assert_eq!(first["backend"], "dryrun");
        Ok(())
    }
}
