// ABOUTME: Entry point for the Fiscus authorization broker server
// ABOUTME: Loads configuration, opens SQLite, wires the broker, and serves HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Fiscus

use anyhow::{Context, Result};
use clap::Parser;
use fiscus_auth_broker::{logging, routes, BrokerResources, ServerConfig};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Parser)]
#[command(
    name = "fiscus-auth-server",
    about = "OAuth 2.0 authorization broker for Fiscus",
    version
)]
struct Args {
    /// Override the HTTP port from the environment
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env().context("failed to load configuration")?;
    if let Some(port) = args.port {
        config.http_port = port;
    }

    let options = SqliteConnectOptions::from_str(&config.database_url)
        .context("invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("failed to open database")?;

    let bind_addr = format!("{}:{}", config.host, config.http_port);

    let resources = BrokerResources::new(config, pool)?;
    resources.migrate().await?;
    resources.spawn_background_tasks();

    let resources = Arc::new(resources);
    let app = routes::routes(Arc::clone(&resources)).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(
        addr = %bind_addr,
        issuer = %resources.config.issuer_url,
        upstream = resources.config.upstream.is_some(),
        "authorization broker listening"
    );

    axum::serve(listener, app)
        .await
        .context("server terminated")?;

    Ok(())
}
