//! slack-rage main binary.
//!
//! Watches Slack channels for bursts of multi-person conversation and posts a
//! heads-up to a notify channel.

mod config;
mod routes;
mod server;
mod stream;

use crate::config::{CliOverrides, IngressMode, RageConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Debug, Parser)]
#[command(name = "slack-rage", version, about = "Notify the rage of slack channels")]
struct Cli {
    /// Enable verbose (debug) logging for slack-rage crates.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Optional TOML config file; environment and flags override it.
    #[arg(long, global = true, env = "RAGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the webhook server for the Slack Events API.
    Event(DetectionArgs),
    /// Run the bot over a Socket Mode stream.
    #[command(alias = "rtm")]
    Stream(DetectionArgs),
    /// Run a handshake-only webhook server to verify the Events URL.
    Server {
        #[arg(long, env = "RAGE_BIND_ADDR")]
        bind: Option<String>,
    },
    /// Validate config and check that the notify channel exists.
    Doctor(DetectionArgs),
    /// Print the version number.
    Version,
}

#[derive(Debug, Clone, Args)]
struct DetectionArgs {
    /// Window size in messages for rage judgement.
    #[arg(short, long, env = "RAGE_THRESHOLD")]
    threshold: Option<usize>,

    /// Observation period in seconds; the last `threshold` posts must fit in it.
    #[arg(short, long, env = "RAGE_PERIOD")]
    period: Option<u64>,

    /// Minimum number of distinct human speakers.
    #[arg(short, long, env = "RAGE_SPEAKERS")]
    speakers: Option<usize>,

    /// Notify channel name.
    #[arg(short, long, env = "RAGE_NOTIFY_CHANNEL")]
    channel: Option<String>,

    /// Listen address for the webhook server.
    #[arg(long, env = "RAGE_BIND_ADDR")]
    bind: Option<String>,
}

impl From<DetectionArgs> for CliOverrides {
    fn from(args: DetectionArgs) -> Self {
        Self {
            threshold: args.threshold,
            period_seconds: args.period,
            speakers: args.speakers,
            notify_channel: args.channel,
            bind_addr: args.bind,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            return Err(anyhow::anyhow!("load .env: {e}"));
        }
    }
    init_tracing(cli.verbose)?;
    install_panic_hook();

    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Event(args) => {
            let cfg = RageConfig::load(config_path, IngressMode::Event, &args.into()).await?;
            server::serve_events(cfg).await
        }
        Command::Stream(args) => {
            let cfg = RageConfig::load(config_path, IngressMode::Stream, &args.into()).await?;
            stream::serve_stream(cfg).await
        }
        Command::Server { bind } => {
            let overrides = CliOverrides {
                bind_addr: bind,
                ..CliOverrides::default()
            };
            let cfg = RageConfig::load(config_path, IngressMode::Handshake, &overrides).await?;
            server::serve_handshake(cfg).await
        }
        Command::Doctor(args) => {
            let cfg = RageConfig::load(config_path, IngressMode::Event, &args.into()).await?;
            server::doctor(&cfg).await
        }
        Command::Version => {
            println!("slack-rage v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(v) => v,
        Err(_) if verbose => EnvFilter::new(
            "info,slack_rage=debug,rage_app=debug,rage_core=debug,rage_channels=debug,tower_http=debug",
        ),
        Err(_) => EnvFilter::new("info,tower_http=info"),
    };
    let log_format = std::env::var("RAGE_LOG_FORMAT")
        .unwrap_or_else(|_| "json".to_string())
        .to_ascii_lowercase();

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .init();
        }
        "pretty" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .pretty()
                .init();
        }
        "compact" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .compact()
                .init();
        }
        other => {
            return Err(anyhow::anyhow!(
                "unsupported RAGE_LOG_FORMAT={other:?}; expected one of: json, pretty, compact"
            ));
        }
    }

    tracing::info!(
        log_format = %log_format,
        verbose,
        env_filter = ?std::env::var("RUST_LOG").ok(),
        "tracing initialized"
    );
    Ok(())
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_payload_to_string(panic_info.payload());
        tracing::error!(
            panic_location = %location,
            panic_payload = %payload,
            "panic captured"
        );
        default_hook(panic_info);
    }));
}

fn panic_payload_to_string(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        return msg.to_string();
    }
    if let Some(msg) = payload.downcast_ref::<String>() {
        return msg.clone();
    }
    "non-string panic payload".to_string()
}
