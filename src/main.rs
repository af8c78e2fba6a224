//! Entry point: loads configuration, discovers device identity, wires the
//! fetcher/cache/player into a `PlaylistController`, and runs it until a
//! shutdown signal or the restart interval fires.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use signage_player::auth::AuthSigner;
use signage_player::cache::AssetCache;
use signage_player::config::Config;
use signage_player::device::DeviceIdentity;
use signage_player::errors::AppError;
use signage_player::fetcher::BatchFetcher;
use signage_player::player::{PlayerConfig as DriverConfig, PlayerDriver};
use signage_player::playlist::PlaylistController;

#[derive(Parser, Debug)]
#[command(
    name = "signage-player",
    about = "On-device playback coordinator for a digital-signage endpoint"
)]
struct Cli {
    /// Path to the TOML config file. Overrides $CONFIG_FILE.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if let Some(config_path) = &cli.config {
        std::env::set_var("CONFIG_FILE", config_path);
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal error, exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), AppError> {
    let config = Config::load()?;
    let identity = DeviceIdentity::discover()?;
    info!(device_id = %identity.device_id, "device identity resolved");

    let signer = AuthSigner::new(&identity);
    let fetcher = Arc::new(BatchFetcher::new(
        config.api_base.clone(),
        config.id.clone(),
        signer,
        config.auth_header.clone(),
    )?);
    let cache = Arc::new(AssetCache::new(
        config.paths.cache_dir.clone(),
        config.max_cache_mb,
    )?);
    let player = PlayerDriver::new(DriverConfig {
        binary: config.player.binary.clone(),
        socket_path: config.paths.socket_path.clone(),
        orientation: config.orientation,
        image_seconds: config.image_seconds,
    });

    let restart_after = if config.restart_hours == 0 {
        None
    } else {
        Some(Duration::from_secs(config.restart_hours * 3600))
    };

    let mut controller = PlaylistController::new(
        config.paths.state_dir.clone(),
        fetcher,
        cache,
        player,
        restart_after,
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signals(shutdown.clone()));

    controller.run(&shutdown).await
}

/// Cancels `shutdown` on SIGINT or SIGTERM so an in-flight image sleep or
/// video EOF wait bails out promptly instead of blocking process exit.
async fn wait_for_signals(shutdown: CancellationToken) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received SIGINT, shutting down");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
    }
    shutdown.cancel();
}
