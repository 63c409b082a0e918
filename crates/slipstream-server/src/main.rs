//! Relay server binary.
//!
//! # Usage
//!
//! ```bash
//! # Defaults (port 12333, 16 clients)
//! slipstream-server
//!
//! # Config file plus overrides
//! slipstream-server --config server.json --port 12005 --max-clients 64
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use slipstream_server::{
    ServerConfig, ServerMode, UserAuth, listener, reaper, sequencer::Sequencer,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Slipstream relay server
#[derive(Parser, Debug)]
#[command(name = "slipstream-server")]
#[command(about = "Multiplayer relay server for slipstream sessions")]
#[command(version)]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Maximum simultaneous clients
    #[arg(long)]
    max_clients: Option<usize>,

    /// Run in LAN mode (no auth resolver, no listing)
    #[arg(long)]
    lan: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    if let Some(max_clients) = args.max_clients {
        config.max_clients = max_clients;
    }
    if args.lan {
        config.server_mode = ServerMode::Lan;
    }
    config.validate()?;

    tracing::info!(
        port = config.listen_port,
        max_clients = config.max_clients,
        mode = ?config.server_mode,
        "slipstream server starting"
    );

    let auth = match (&config.server_mode, &config.auth_file) {
        (ServerMode::Lan, _) | (_, None) => None,
        (ServerMode::Inet, Some(path)) => match UserAuth::load(path, None) {
            Ok(auth) => Some(auth),
            Err(e) => {
                tracing::warn!(error = %e, "auth file unavailable; all clients unprivileged");
                None
            },
        },
    };

    let script = if config.enable_scripting {
        tracing::info!(path = ?config.script_path, "script host ready for an embedding engine");
        Some(Arc::new(slipstream_server::ScriptHost::new()))
    } else {
        None
    };

    if config.server_mode == ServerMode::Inet {
        tracing::info!("no master list client wired; running unlisted");
    }

    let sequencer = Sequencer::new(config.clone(), auth, None, script);
    reaper::spawn(Arc::clone(&sequencer));

    {
        let sequencer = Arc::clone(&sequencer);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sequencer.update_minute_stats();
            }
        });
    }

    let listener =
        tokio::net::TcpListener::bind(("0.0.0.0", config.listen_port)).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    tokio::select! {
        () = listener::run(Arc::clone(&sequencer), listener) => {},
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
        },
    }

    sequencer.shutdown().await;

    Ok(())
}
