//! ERP authentication server
//!
//! Loads configuration, migrates the schema and serves the auth API until
//! interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use erp_auth::{create_routes, run_migrations, AuthConfig, AuthDeps, AuthService};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Process-level settings the library does not need
struct ServerConfig {
    database_url: String,
    database_max_connections: u32,
    bind_addr: String,
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let database_max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Ok(value) => value
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            Err(_) => 10,
        };

        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            bind_addr,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,erp_auth=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let server = ServerConfig::from_env()?;

    let config = AuthConfig::from_env().context("Failed to load auth configuration")?;
    config.validate().context("Invalid auth configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(server.database_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&server.database_url)
        .await
        .context("Failed to connect to database")?;

    run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    let deps = AuthDeps::postgres(pool, &config)?;
    let service = Arc::new(AuthService::new(config, deps));
    let app = create_routes(service);

    let listener = TcpListener::bind(&server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server.bind_addr))?;

    tracing::info!(addr = %server.bind_addr, "ERP auth server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
