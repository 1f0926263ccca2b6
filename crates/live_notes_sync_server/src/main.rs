use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::get,
};
use live_notes_core::history::{SnapshotPolicy, SqliteStorage};
use live_notes_sync_server::{
    config::Config,
    handlers::{ApiState, api_routes},
    sync::SyncState,
};
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Interval between saves of the live note states
const AUTOSAVE_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_notes_sync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting Live Notes Sync Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Database path: {:?}", config.database_path);
    info!("CORS origins: {:?}", config.cors_origins);
    info!(
        "Snapshot throttle: {} ms, max versions: {}",
        config.history.throttle_ms, config.history.max_versions
    );

    // Initialize database
    if let Some(parent) = config.database_path.parent()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        error!("Failed to create data directory: {}", e);
        std::process::exit(1);
    }

    let storage = match SqliteStorage::open(&config.database_path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    // Create shared state
    let policy = Arc::new(SnapshotPolicy::new(storage, config.history.clone()));
    let sync_state = Arc::new(SyncState::new(policy));
    let api_state = ApiState {
        sync_state: sync_state.clone(),
    };

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "Live Notes Sync Server" }))
        .route("/health", get(|| async { "OK" }))
        // API and WebSocket routes
        .nest("/api", api_routes(api_state))
        // Add layers
        .layer(cors_layer(&config))
        .layer(TraceLayer::new_for_http());

    // Create listener
    let addr = config.server_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    info!("Server listening on http://{}", addr);

    // Periodically persist live notes so a crash loses little
    let autosave_state = sync_state.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(tokio::time::Duration::from_secs(AUTOSAVE_SECS));
        loop {
            interval.tick().await;
            let saved = autosave_state.save_all().await;
            if saved > 0 {
                info!("Autosaved {} live notes", saved);
            }
        }
    });

    // Run server with graceful shutdown
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    let saved = sync_state.save_all().await;
    info!("Saved {} live notes", saved);
    info!("Server shut down gracefully");
}

fn cors_layer(config: &Config) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if config.allows_any_origin() {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
