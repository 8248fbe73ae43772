//! CLI entry point: logs in, prints the initial bundle once available, and
//! reports incoming attacks until interrupted.

use std::sync::Arc;

use clap::Parser;
use empire_core::state::StateStore;
use empire_core::{ClientConfig, Connection, Dispatcher, LoginExtras, SessionManager};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "empire-client", about = "SmartFoxServer-style game client core")]
struct Args {
    /// Account username.
    #[arg(long, env = "EMPIRE_USERNAME")]
    username: String,

    /// Account password.
    #[arg(long, env = "EMPIRE_PASSWORD")]
    password: String,

    /// Game server WebSocket URL.
    #[arg(long, env = "EMPIRE_GAME_URL")]
    game_url: Option<String>,

    /// Zone to log into.
    #[arg(long, env = "EMPIRE_ZONE")]
    zone: Option<String>,

    /// Optional TOML config file layered under CLI flags and env vars.
    #[arg(long, env = "EMPIRE_CONFIG_FILE", default_value = "empire")]
    config_file: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut config = ClientConfig::load(&args.config_file).unwrap_or_else(|e| {
        tracing::warn!("config file '{}' not applied: {e}", args.config_file);
        ClientConfig::default()
    });
    if let Some(url) = args.game_url {
        config.game_url = url;
    }
    if let Some(zone) = args.zone {
        config.default_zone = zone;
    }

    let dispatcher = Arc::new(Dispatcher::new());
    let conn = Connection::new(dispatcher.clone());
    let store = StateStore::new();
    store.install(&dispatcher);

    store.on_incoming_attack(Arc::new(|movement| {
        tracing::warn!(
            movement_id = movement.movement_id,
            target_area = movement.target_area_id,
            eta_seconds = movement.time_remaining(),
            "incoming attack"
        );
    }));

    store.on_movement_recalled(Arc::new(|movement| {
        tracing::info!(movement_id = movement.movement_id, "movement recalled");
    }));

    let zone = config.default_zone.clone();
    let session = SessionManager::new(conn.clone(), config).with_login_extras(LoginExtras::default());

    session.login(&args.username, &args.password).await?;
    tracing::info!("logged in, zone={zone}");

    if let Some(player) = store.local_player() {
        tracing::info!(player = ?player, "local player bundle received");
    }

    tokio::signal::ctrl_c().await?;
    conn.disconnect().await;
    Ok(())
}
