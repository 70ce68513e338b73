//! # Server Setup
//!
//! Server initialization, route registration, and HTTP server startup.
//!
//! This module provides the main server setup function that creates the Axum router,
//! registers all routes, applies middleware, and starts the HTTP server.

// region: --- Imports
use axum::{
    routing::{delete, get, put},
    Router,
};
use lib_core::model::collab::{ListingCatalog, ParticipantDirectory, SqlListingCatalog, SqlParticipantDirectory};
use lib_core::{create_pool, run_migrations, Config, DbPool};
use lib_utils::{get_env_opt, get_env_or};
use crate::chat::{ConnectionRegistry, DeliveryDispatcher};
use crate::handlers;
use crate::middleware::{log_requests, require_auth, stamp_req};
use crate::services::HttpListingCatalog;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
// endregion: --- Imports

// region: --- AppState
/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<DeliveryDispatcher>,
    pub catalog: Arc<dyn ListingCatalog>,
    pub directory: Arc<dyn ParticipantDirectory>,
}

impl AppState {
    /// Wire the registry, directory and dispatcher around a store and catalog.
    pub fn new(db: DbPool, config: Config, catalog: Arc<dyn ListingCatalog>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let directory: Arc<dyn ParticipantDirectory> = Arc::new(SqlParticipantDirectory::new(db.clone()));
        let dispatcher = Arc::new(DeliveryDispatcher::new(
            db.clone(),
            registry.clone(),
            directory.clone(),
            config.max_message_length,
        ));

        Self {
            db,
            config,
            registry,
            dispatcher,
            catalog,
            directory,
        }
    }
}

impl axum::extract::FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.db.clone()
    }
}

impl axum::extract::FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<ConnectionRegistry> {
    fn from_ref(state: &AppState) -> Self {
        state.registry.clone()
    }
}

impl axum::extract::FromRef<AppState> for Arc<DeliveryDispatcher> {
    fn from_ref(state: &AppState) -> Self {
        state.dispatcher.clone()
    }
}
// endregion: --- AppState

// region: --- Server Configuration
/// Server configuration
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:3001")
    pub bind_address: String,
    /// Allowed CORS origins
    pub allowed_origins: Vec<String>,
    /// Database migrations path
    pub migrations_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3001".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            migrations_path: "./migrations".to_string(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `BIND_ADDRESS`, `ALLOWED_ORIGINS` (comma-separated)
    /// and `MIGRATIONS_PATH`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let allowed_origins = get_env_opt("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Self {
            bind_address: get_env_or("BIND_ADDRESS", &defaults.bind_address),
            allowed_origins,
            migrations_path: get_env_or("MIGRATIONS_PATH", &defaults.migrations_path),
        }
    }
}
// endregion: --- Server Configuration

// region: --- Server Setup
/// Install the global tracing subscriber, filtered by `LOG_LEVEL`.
///
/// Does nothing if a subscriber is already installed.
pub fn init_tracing() {
    let log_level = std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase();

    let filter = match log_level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => tracing_subscriber::EnvFilter::new(&log_level),
        _ => tracing_subscriber::EnvFilter::new("info"),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        info!(" Log level: {}", log_level);
    }
}

/// Initialize and start the HTTP server
///
/// # Errors
///
/// This function will return an error if:
/// - Configuration loading or validation fails
/// - Database connection fails
/// - Database migrations fail
/// - The listing catalog client cannot be built
/// - Server binding fails
pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!(" REALTY CHAT BACKEND STARTING");

    info!("Loading configuration...");
    let app_config = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;
    app_config.validate().map_err(|e| anyhow::anyhow!(e))?;

    info!("Database URL: {}", app_config.database_url);

    // SQLite will not create missing parent directories
    if let Some(db_path) = app_config.database_url.strip_prefix("sqlite:") {
        let db_path = db_path.trim_start_matches("//");
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created database directory: {:?}", parent);
            }
        }
    }

    info!("Connecting to database...");
    let pool = create_pool(&app_config.database_url).await?;

    info!(" Running database migrations from: {}", config.migrations_path);
    run_migrations(&pool, Path::new(&config.migrations_path)).await?;
    info!(" Migrations complete");

    let catalog: Arc<dyn ListingCatalog> = match &app_config.listing_catalog_url {
        Some(url) => {
            info!(" Listing catalog: {}", url);
            Arc::new(HttpListingCatalog::new(url.clone())?)
        }
        None => {
            info!(" Listing catalog: local listings table");
            Arc::new(SqlListingCatalog::new(pool.clone()))
        }
    };

    let state = AppState::new(pool, app_config, catalog);
    let registry = state.registry.clone();
    let app = create_router(state, config.allowed_origins.clone());

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;

    info!(" SERVER READY: http://{}", config.bind_address);
    log_server_info();

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let dropped = registry.clear().await;
    info!(" Server stopped ({} live sessions dropped)", dropped);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!(" Shutdown signal received");
}

/// Create the main application router with all routes
pub fn create_router(state: AppState, allowed_origins: Vec<String>) -> Router {
    use axum::http::{HeaderValue, Method};

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ]);

    info!("[ROUTE SETUP] Registering HTTP routes...");
    let conversations = Router::new()
        .route(
            "/api/conversations",
            get(handlers::conversations::list_conversations)
                .post(handlers::conversations::create_conversation),
        )
        .route("/api/conversations/unread-count", get(handlers::conversations::unread_count))
        .route("/api/conversations/{id}", delete(handlers::conversations::delete_conversation))
        .route(
            "/api/conversations/{id}/messages",
            get(handlers::conversations::get_messages).post(handlers::conversations::post_message),
        )
        .route("/api/conversations/{id}/read", put(handlers::conversations::mark_read))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(conversations)
        .route("/api/ws/chat", get(handlers::websocket::chat_websocket))
        .route("/health", get(|| async { "OK" }))
        .fallback(|| async {
            info!("[404 HANDLER] Unmatched route - returning 404");
            (axum::http::StatusCode::NOT_FOUND, "Route not found")
        })
        .with_state(state)
        .layer(axum::middleware::from_fn(log_requests))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    let request_id = request
                        .extensions()
                        .get::<crate::middleware::RequestStamp>()
                        .map(|s| s.id.clone())
                        .unwrap_or_else(|| "unknown".to_string());
                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                })
                .on_failure(|error: tower_http::classify::ServerErrorsFailureClass, latency: std::time::Duration, span: &tracing::Span| {
                    let _enter = span.enter();
                    tracing::error!(
                        error = ?error,
                        latency_ms = latency.as_millis(),
                        "[HTTP FAILURE] Error: {:?}, Latency: {}ms",
                        error,
                        latency.as_millis()
                    );
                }),
        )
        // Request stamping runs before the trace span and request log so both see the ID
        .layer(axum::middleware::from_fn(stamp_req))
        .layer(cors)
}

/// Log server information
fn log_server_info() {
    info!(" CONVERSATIONS:");
    info!("   • GET    /api/conversations");
    info!("   • POST   /api/conversations");
    info!("   • GET    /api/conversations/unread-count");
    info!("   • GET    /api/conversations/{{id}}/messages");
    info!("   • POST   /api/conversations/{{id}}/messages");
    info!("   • PUT    /api/conversations/{{id}}/read");
    info!("   • DELETE /api/conversations/{{id}}");
    info!(" LIVE CHANNEL:");
    info!("   • GET    /api/ws/chat?token={{token}}");
    info!(" HEALTH:");
    info!("   • GET    /health");
}
// endregion: --- Server Setup
