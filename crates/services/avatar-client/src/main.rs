//! Avatar client entry point
//!
//! Interactive console control surface for one LiveAvatar session. Every
//! command goes through the session controller, which gates it by phase.
//!
//! # Usage
//!
//! ```bash
//! # Credential from the environment, default avatar
//! AVATAR_SPEECH_KEY=... cargo run -p liveavatar-client -- \
//!   --endpoint-url wss://avatar.example.com/v1
//!
//! # Pick a character, style and voice
//! cargo run -p liveavatar-client -- \
//!   --character harry --style youthful --voice en-GB-SoniaNeural
//!
//! # Settings from a TOML file, JSON logs
//! cargo run -p liveavatar-client -- --config ./avatar.toml --log-format json
//! ```
//!
//! Console commands: `connect`, `speak [text]`, `disconnect`, `reset`,
//! `character <name>`, `style <name>`, `voice <id>`, `status`, `log`,
//! `help`, `quit`.

use anyhow::{Context, Result};
use clap::Parser;
use liveavatar_core::{AvatarConfig, LogEntry};
use liveavatar_webrtc::{
    NoDecoder, SessionController, TransportConfig, WebRtcTransportFactory,
    WebSocketEndpointFactory,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// LiveAvatar console client
///
/// Connects to a remote avatar render service, shows the session log and
/// speaks typed text.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Speech service subscription key
    #[arg(long, env = "AVATAR_SPEECH_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Speech service region
    #[arg(long, env = "AVATAR_SPEECH_REGION")]
    region: Option<String>,

    /// Synthesis endpoint URL (ws:// or wss://)
    #[arg(long, default_value = "ws://localhost:8080/avatar", env = "AVATAR_ENDPOINT_URL")]
    endpoint_url: String,

    /// STUN servers (comma-separated)
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "stun:stun.l.google.com:19302"
    )]
    stun_servers: Vec<String>,

    /// Avatar character
    #[arg(long, env = "AVATAR_CHARACTER")]
    character: Option<String>,

    /// Avatar style (must belong to the character)
    #[arg(long, env = "AVATAR_STYLE")]
    style: Option<String>,

    /// Synthesis voice
    #[arg(long, env = "AVATAR_VOICE")]
    voice: Option<String>,

    /// Compositor refresh rate in Hz
    #[arg(long, env = "AVATAR_REFRESH_HZ")]
    refresh_hz: Option<u32>,

    /// Endpoint reply timeout in seconds
    #[arg(long, default_value_t = 30)]
    request_timeout_secs: u64,

    /// Settings file (TOML)
    #[arg(long, env = "AVATAR_CONFIG")]
    config: Option<PathBuf>,

    /// Diagnostic log format
    #[arg(long, default_value = "text", env = "AVATAR_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    // One event loop: the session model is single-threaded cooperative.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(args))
}

async fn async_main(args: Args) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %args.endpoint_url,
        "LiveAvatar client starting"
    );

    let settings = load_settings(&args)?;
    let transport_config = TransportConfig {
        stun_servers: args.stun_servers.clone(),
        video_codec: settings.video_codec.clone(),
        ..Default::default()
    };
    transport_config
        .validate()
        .context("Invalid transport configuration")?;

    let endpoints = WebSocketEndpointFactory::new(args.endpoint_url.clone())
        .with_request_timeout(Duration::from_secs(args.request_timeout_secs));
    let controller = SessionController::builder(settings)
        .transports(Arc::new(WebRtcTransportFactory::new(
            transport_config,
            Arc::new(NoDecoder),
        )))
        .endpoints(Arc::new(endpoints))
        .build()
        .context("Failed to create session")?;

    tokio::spawn(print_log(controller.clone()));
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(&controller, line.trim()) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    controller.disconnect().await;
    Ok(())
}

/// Settings file, then command-line overrides
fn load_settings(args: &Args) -> Result<AvatarConfig> {
    let mut settings = match &args.config {
        Some(path) => AvatarConfig::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => AvatarConfig::from_env(),
    };

    if let Some(key) = &args.key {
        settings.credential.key = key.clone();
    }
    if let Some(region) = &args.region {
        settings.credential.region = region.clone();
    }
    if let Some(character) = &args.character {
        settings.select_character(character)?;
    }
    if let Some(style) = &args.style {
        settings.select_style(style)?;
    }
    if let Some(voice) = &args.voice {
        settings.select_voice(voice)?;
    }
    if let Some(hz) = args.refresh_hz {
        settings.refresh_hz = hz;
    }

    settings.validate()?;
    Ok(settings)
}

/// Run one console command. Returns false to quit.
fn handle_command(controller: &SessionController, line: &str) -> bool {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "connect" => {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller.connect().await;
            });
        }
        "speak" => {
            let text = if rest.is_empty() {
                controller.settings().utterance
            } else {
                rest.to_string()
            };
            let controller = controller.clone();
            tokio::spawn(async move {
                controller.speak(&text).await;
            });
        }
        "disconnect" => {
            let controller = controller.clone();
            tokio::spawn(async move { controller.disconnect().await });
        }
        "reset" => {
            let controller = controller.clone();
            tokio::spawn(async move { controller.reset().await });
        }
        "character" => report(controller.select_character(rest)),
        "style" => report(controller.select_style(rest)),
        "voice" => report(controller.select_voice(rest)),
        "status" => print_status(controller),
        "log" => {
            for entry in controller.log().snapshot() {
                print_entry(&entry);
            }
        }
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => println!("Unknown command: {} (try `help`)", other),
    }
    true
}

fn report(result: liveavatar_webrtc::Result<()>) {
    match result {
        Ok(()) => println!("ok"),
        Err(e) => println!("{}", e),
    }
}

fn print_status(controller: &SessionController) {
    let settings = controller.settings();
    println!("phase:     {}", controller.phase());
    println!(
        "avatar:    {} / {} ({})",
        settings.character, settings.style, settings.voice
    );
    if let Some(id) = controller.session_id() {
        println!("session:   {}", id);
    }
    match controller.displayed_stream() {
        Some(stream) => println!(
            "video:     {} {} ({} frames)",
            stream.label(),
            stream
                .natural_size()
                .map(|size| size.to_string())
                .unwrap_or_else(|| "size pending".to_string()),
            stream.frames_received()
        ),
        None => println!("video:     none"),
    }
    let surface = controller.surface();
    println!(
        "surface:   {:?}, {} frames composited",
        surface.presentation(),
        surface.frames_written()
    );
}

fn print_help() {
    println!("Commands: connect | speak [text] | disconnect | reset | character <name> |");
    println!("          style <name> | voice <id> | status | log | help | quit");
}

fn print_entry(entry: &LogEntry) {
    println!("{:<4} {}", entry.kind, entry);
}

/// Echo the activity log to the console as it grows
async fn print_log(controller: SessionController) {
    let mut updates = controller.log().subscribe();
    for entry in controller.log().snapshot() {
        print_entry(&entry);
    }

    loop {
        match updates.recv().await {
            Ok(entry) => print_entry(&entry),
            Err(RecvError::Lagged(skipped)) => warn!("Console skipped {} log entries", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn init_tracing(format: LogFormat) {
    // Initialize tracing with EnvFilter for RUST_LOG support
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,webrtc=warn"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
