mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use waifu_anilist::Anilist;
use waifu_api::AppStateInner;
use waifu_api::roll::RollGate;
use waifu_db::Database;
use waifu_gateway::dispatcher::Dispatcher;
use waifu_gateway::dropper::Dropper;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "waifubot=debug,waifu_api=debug,waifu_gateway=debug,waifu_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let cfg = Config::from_env()?;

    let db = Database::open(&cfg.db_path)?;
    let source = Arc::new(Anilist::new(&cfg.anilist_url, cfg.max_characters, cfg.upstream_timeout)?);

    let dispatcher = Dispatcher::new();
    let dropper = Dropper::new(cfg.drop_threshold, source.clone(), dispatcher);
    let state = AppStateInner::new(
        db,
        source,
        dropper,
        RollGate::from_hours(cfg.roll_cooldown_hours),
        cfg.jwt_secret.clone(),
    );

    info!(
        "Drop threshold {} messages, roll cooldown {} hours",
        state.dropper.threshold(),
        cfg.roll_cooldown_hours
    );

    let app = waifu_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("waifubot listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            },
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
