//! # Liveclass API
//!
//! The API crate provides the web server for the live class engine: session
//! and room lifecycle, join authorization, reminder status and the cron
//! triggers that drive auto-start and reminders.
//!
//! ## Architecture
//!
//! This crate follows a layered architecture:
//!
//! - **Routes**: Define API endpoints and URL structure
//! - **Handlers**: Translate requests into engine calls
//! - **Middleware**: Authentication extractors and error mapping
//! - **Providers**: HTTP clients for the video provider and dispatch service
//! - **Ticker**: In-process poll loop, for deployments without an external cron
//! - **Config**: Handle environment and application configuration
//!
//! The engine itself lives in `liveclass-core`; PostgreSQL storage in
//! `liveclass-db`.

/// Configuration module for API settings
pub mod config;
/// Request handlers that call into the engine
pub mod handlers;
/// Authentication extractors and error handling
pub mod middleware;
/// HTTP clients for external services
pub mod providers;
/// Route definitions and API endpoint structure
pub mod routes;
/// Periodic auto-start, reminder and sweep loop
pub mod ticker;

use std::sync::Arc;
use std::time::Duration;

use axum::error_handling::HandleErrorLayer;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::Router;
use eyre::{eyre, Result, WrapErr};
use liveclass_core::ports::SystemClock;
use liveclass_core::services::{
    AutoStartScanner, EngineContext, JoinAuthorizer, LifecycleController, ReminderEngine, TimetableNotifier,
};
use liveclass_db::{DbPool, PgNotificationLedger, PgSessionStore};
use tokio::net::TcpListener;
use tower::{BoxError, ServiceBuilder};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::middleware::auth::CRON_SECRET_HEADER;
use crate::providers::{HttpDispatcher, HttpVideoProvider};

/// Secrets checked by the authentication extractors.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub cron_secret: Option<String>,
}

/// Shared application state that is accessible to all request handlers
///
/// Every engine service is a cheap handle over the same [`EngineContext`].
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use liveclass_api::{build_router, ApiState, AuthSettings};
/// # fn example(ctx: liveclass_core::EngineContext) {
/// let auth = AuthSettings { jwt_secret: "secret".into(), cron_secret: None };
/// let app = build_router(Arc::new(ApiState::new(ctx, auth)));
/// # }
/// ```
#[derive(Clone)]
pub struct ApiState {
    pub engine: EngineContext,
    pub lifecycle: LifecycleController,
    pub scanner: AutoStartScanner,
    pub reminders: ReminderEngine,
    pub join: JoinAuthorizer,
    pub auth: AuthSettings,
}

impl ApiState {
    pub fn new(engine: EngineContext, auth: AuthSettings) -> Self {
        let timetable = TimetableNotifier::new(engine.clone());
        let lifecycle = LifecycleController::new(engine.clone()).with_timetable(timetable);
        Self {
            scanner: AutoStartScanner::new(engine.clone(), lifecycle.clone()),
            reminders: ReminderEngine::new(engine.clone()),
            join: JoinAuthorizer::new(engine.clone()),
            lifecycle,
            engine,
            auth,
        }
    }
}

/// Wires the engine to PostgreSQL and the HTTP providers.
pub fn build_engine(config: &config::ApiConfig, db_pool: DbPool) -> Result<EngineContext> {
    let engine = EngineContext::new(
        Arc::new(PgSessionStore::new(db_pool.clone())),
        Arc::new(PgNotificationLedger::new(db_pool)),
        Arc::new(HttpVideoProvider::new(config.video.clone())),
        Arc::new(HttpDispatcher::new(&config.dispatch)),
        Arc::new(SystemClock),
        config.engine.clone(),
    )
    .map_err(|e| eyre!("Invalid engine configuration: {}", e))?;
    Ok(engine)
}

/// Builds the application router with all routes attached to `state`.
pub fn build_router(state: Arc<ApiState>) -> Router {
    Router::new()
        // Health check endpoints
        .merge(routes::health::routes())
        // Session scheduling and lifecycle endpoints
        .merge(routes::sessions::routes())
        // Room lifecycle, join and attendance endpoints
        .merge(routes::rooms::routes())
        // Periodic trigger endpoints
        .merge(routes::cron::routes())
        // Attach shared state to all routes
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    let origins = origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .wrap_err_with(|| format!("Invalid CORS origin '{}'", origin))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::HeaderName::from_static(CRON_SECRET_HEADER),
        ])
        .allow_origin(origins)
        .allow_credentials(true))
}

/// Starts the API server with the provided configuration and database connection
///
/// Sets up logging, wires the engine, optionally spawns the internal ticker
/// and serves until the listener fails.
///
/// # Example
///
/// ```no_run
/// # async fn example() -> eyre::Result<()> {
/// let config = liveclass_api::config::ApiConfig::from_env()?;
/// let db_pool = liveclass_db::create_pool(&config.database_url).await?;
/// liveclass_api::start_server(config, db_pool).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_server(config: config::ApiConfig, db_pool: DbPool) -> Result<()> {
    // Initialize tracing for logging
    let subscriber = FmtSubscriber::builder().with_max_level(config.log_level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let engine = build_engine(&config, db_pool)?;
    let auth = AuthSettings {
        jwt_secret: config.jwt_secret.clone(),
        cron_secret: config.cron_secret.clone(),
    };
    if auth.cron_secret.is_none() {
        warn!("CRON_SECRET is not set: trigger routes are open and the attendance webhook is disabled");
    }
    let state = Arc::new(ApiState::new(engine.clone(), auth));

    if config.internal_ticker {
        let ticker = ticker::Ticker::new(engine, config.sweep_interval);
        tokio::spawn(ticker.run());
        info!("Internal ticker enabled");
    }

    let app = build_router(state);

    // Apply CORS configuration if origins are specified
    let app = match &config.cors_origins {
        Some(origins) => app.layer(cors_layer(origins)?),
        None => app,
    };

    // Add request timeout middleware
    let app = app.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(|_: BoxError| async { StatusCode::REQUEST_TIMEOUT }))
            .timeout(Duration::from_secs(config.request_timeout)),
    );

    // Start the HTTP server
    let addr = config.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
