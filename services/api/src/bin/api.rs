//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{clock::SystemClock, db::DbAdapter, memory::InMemoryStore},
    config::Config,
    error::ApiError,
    web::{self, auth::ensure_bootstrap_admin, rest::ApiDoc, state::AppState},
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{extract::DefaultBodyLimit, Router};
use pickup_core::ports::{Catalog, OrderStore, StaffDirectory};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

type Stores = (Arc<dyn OrderStore>, Arc<dyn Catalog>, Arc<dyn StaffDirectory>);

/// Connects to PostgreSQL when a URL is configured, otherwise keeps everything in memory.
async fn connect_stores(config: &Config) -> Result<Stores, ApiError> {
    match &config.database_url {
        Some(url) => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            let orders: Arc<dyn OrderStore> = db_adapter.clone();
            let catalog: Arc<dyn Catalog> = db_adapter.clone();
            let staff: Arc<dyn StaffDirectory> = db_adapter;
            Ok((orders, catalog, staff))
        }
        None => {
            warn!("DATABASE_URL is not set; orders are kept in memory and lost on restart");
            let store = Arc::new(InMemoryStore::new());
            let orders: Arc<dyn OrderStore> = store.clone();
            let catalog: Arc<dyn Catalog> = store.clone();
            let staff: Arc<dyn StaffDirectory> = store;
            Ok((orders, catalog, staff))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect Storage ---
    let (orders, catalog, staff) = connect_stores(&config).await?;
    if let Some(admin) = &config.bootstrap_admin {
        ensure_bootstrap_admin(staff.as_ref(), admin).await?;
    }

    // --- 3. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(
        config.clone(),
        orders,
        catalog,
        staff,
        Arc::new(SystemClock),
    ));

    let origin = config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::CorsOrigin {
            origin: config.cors_origin.clone(),
            reason: e.to_string(),
        })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    let api_router = web::router(app_state)
        .layer(DefaultBodyLimit::max(256 * 1024))
        .layer(cors);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {:?}", e);
        }
        info!("Shutdown signal received, draining connections...");
        signal_token.cancel();
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped.");
    Ok(())
}
