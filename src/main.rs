use axum::http::{HeaderValue, Method};
use clap::Parser;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use thriftswap::auth::google::GoogleVerifier;
use thriftswap::auth::token::TokenKeys;
use thriftswap::config::{Cli, Config};
use thriftswap::state::AppState;
use thriftswap::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    if cli.seed {
        db::seed::run(&pool, config.seed_images_path())?;
    }

    // Session signing keys
    let keys = match &config.auth.token_secret {
        Some(secret) => TokenKeys::from_secret(secret.as_bytes()),
        None => {
            tracing::warn!(
                "auth.token_secret not configured; sessions will not survive a restart"
            );
            TokenKeys::random()
        }
    };

    let google = GoogleVerifier::new(
        &config.google.tokeninfo_url,
        config.google.client_id.clone(),
    );

    // Build app state
    let state = AppState {
        db: pool,
        config: config.clone(),
        keys,
        google,
    };

    // Build router
    let app = routes::app(state)
        .layer(TraceLayer::new_for_http())
        .layer(configure_cors(&config.server.cors_origins));

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn configure_cors(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        tracing::warn!("server.cors_origins not set, allowing all origins (dev mode)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .map(|s| s.parse().expect("Invalid CORS origin"))
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .allow_credentials(true)
}
