//! chess-server: a two-player chess room server
//!
//! This server handles:
//! - Login and registration against the account database
//! - Friend list queries and new friendships
//! - Named two-player rooms with move broadcast

mod config;

use std::sync::Arc;

use anyhow::{Context, Result};
use chess_rooms::board::StandardRules;
use chess_rooms::registry::RoomRegistry;
use chess_rooms::server::{BoundedExecutor, TokioExecutor, serve};
use chess_rooms::session::ServerContext;
use chess_rooms::store::Database;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path =
        std::env::var("CHESS_SERVER_CONFIG").unwrap_or_else(|_| "chess-server.toml".to_string());
    let config = Config::load_or_default(&config_path)?;

    println!("╔════════════════════════════════════════╗");
    println!("║         chess-server Room Server       ║");
    println!("╠════════════════════════════════════════╣");
    println!("║ Port: {:<33}║", config.port);
    println!("║ Max rooms: {:<28}║", config.max_rooms);
    println!("╚════════════════════════════════════════╝");

    let db = Database::open(&config.database_path)
        .with_context(|| format!("failed to open database {}", config.database_path))?;

    let ctx = Arc::new(ServerContext::with_database(
        RoomRegistry::new(StandardRules, config.max_rooms),
        Arc::new(db),
        config.session_settings(),
    ));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(%addr, max_sessions = ?config.max_sessions, "Server started");

    match config.max_sessions {
        Some(max) => serve(listener, ctx, BoundedExecutor::new(max)).await,
        None => serve(listener, ctx, TokioExecutor).await,
    }

    Ok(())
}
