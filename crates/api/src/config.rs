//! # API Configuration Module
//!
//! Loads the server, engine and provider settings from environment variables.
//!
//! ## Environment Variables
//!
//! - `API_HOST`: host address to bind to (default: "0.0.0.0")
//! - `API_PORT`: port to listen on (default: 3000)
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `LOG_LEVEL`: logging level (default: "info")
//! - `API_CORS_ORIGINS`: comma-separated list of allowed CORS origins
//! - `API_REQUEST_TIMEOUT_SECONDS`: request timeout (default: 30)
//! - `JWT_SECRET`: HS256 secret of portal session tokens (required)
//! - `CRON_SECRET`: shared secret expected in `X-Cron-Secret` on cron and webhook routes
//! - `PORTAL_TIMEZONE`: civil timezone of the schedule (default: "Asia/Kolkata")
//! - `EARLY_JOIN_MINUTES`, `GRACE_MINUTES`: join window around each class (default: 15 each)
//! - `REMINDER_WINDOWS`: e.g. `30:30,15:15,start:0:live`
//! - `REMINDER_BAND_SECONDS`, `POLL_INTERVAL_SECONDS`: reminder band and trigger period (default: 90, 60)
//! - `ENGINE_CONCURRENCY`: cap on concurrent provider and dispatch calls (default: 8)
//! - `VIDEO_API_URL`, `VIDEO_WS_URL`, `VIDEO_API_KEY`, `VIDEO_API_SECRET`: video provider
//! - `DISPATCH_URL`, `DISPATCH_TOKEN`: notification dispatch service
//! - `INTERNAL_TICKER`: run the poll loop inside the server (default: false)
//! - `AUTO_END_SWEEP_SECONDS`: overdue sweep period, 0 disables it (default: 300)
//! - `PORTAL_BASE_URL`: base of invite links sent in reminders

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;
use eyre::{eyre, Result, WrapErr};
use liveclass_core::config::{default_reminder_windows, parse_reminder_windows, EngineConfig};
use tracing::Level;

/// Credentials and endpoints of the LiveKit-compatible video provider.
#[derive(Debug, Clone)]
pub struct VideoSettings {
    /// HTTP base of the room service API.
    pub api_url: String,
    /// WebSocket URL handed to clients.
    pub ws_url: String,
    pub api_key: String,
    pub api_secret: String,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub url: String,
    pub token: String,
}

/// Configuration for the liveclass API server
///
/// # Example
///
/// ```no_run
/// use eyre::Result;
/// use liveclass_api::config::ApiConfig;
///
/// fn example() -> Result<()> {
///     let config = ApiConfig::from_env()?;
///     println!("Starting server on {}", config.server_addr());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origins: Option<Vec<String>>,
    /// Request timeout in seconds
    pub request_timeout: u64,
    pub jwt_secret: String,
    pub cron_secret: Option<String>,
    pub engine: EngineConfig,
    pub video: VideoSettings,
    pub dispatch: DispatchSettings,
    pub internal_ticker: bool,
    /// `None` when the overdue sweep is disabled.
    pub sweep_interval: Option<Duration>,
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| eyre!("Invalid {} value '{}': {}", name, raw, e)),
        None => Ok(default),
    }
}

fn text_var(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name).unwrap_or_else(|| default.to_string())
}

impl ApiConfig {
    /// Creates a new ApiConfig from environment variables
    ///
    /// # Errors
    ///
    /// Fails when `DATABASE_URL` or `JWT_SECRET` is missing, when a numeric
    /// or timezone value cannot be parsed, or when the resulting engine
    /// settings are inconsistent.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        // Network settings
        let host = text_var(&lookup, "API_HOST", "0.0.0.0");
        let port = parse_var(&lookup, "API_PORT", 3000u16)?;

        // Database settings
        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| eyre!("DATABASE_URL environment variable must be set"))?;

        // Logging settings
        let log_level = match text_var(&lookup, "LOG_LEVEL", "info").as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        // CORS settings
        let cors_origins = lookup("API_CORS_ORIGINS")
            .map(|origins| origins.split(',').map(|s| s.trim().to_string()).collect());

        let request_timeout = parse_var(&lookup, "API_REQUEST_TIMEOUT_SECONDS", 30u64)?;

        // Security settings
        let jwt_secret = lookup("JWT_SECRET").ok_or_else(|| eyre!("JWT_SECRET environment variable must be set"))?;
        let cron_secret = lookup("CRON_SECRET").filter(|s| !s.is_empty());

        let video_api_secret = text_var(&lookup, "VIDEO_API_SECRET", "secret");

        // Engine settings
        let defaults = EngineConfig::default();
        let reminder_windows = match lookup("REMINDER_WINDOWS") {
            Some(spec) => parse_reminder_windows(&spec).wrap_err("Invalid REMINDER_WINDOWS value")?,
            None => default_reminder_windows(),
        };
        let engine = EngineConfig {
            timezone: parse_var::<Tz>(&lookup, "PORTAL_TIMEZONE", defaults.timezone)?,
            early_join_minutes: parse_var(&lookup, "EARLY_JOIN_MINUTES", defaults.early_join_minutes)?,
            grace_minutes: parse_var(&lookup, "GRACE_MINUTES", defaults.grace_minutes)?,
            reminder_windows,
            reminder_band: Duration::from_secs(parse_var(
                &lookup,
                "REMINDER_BAND_SECONDS",
                defaults.reminder_band.as_secs(),
            )?),
            poll_interval: Duration::from_secs(parse_var(
                &lookup,
                "POLL_INTERVAL_SECONDS",
                defaults.poll_interval.as_secs(),
            )?),
            concurrency: parse_var(&lookup, "ENGINE_CONCURRENCY", defaults.concurrency)?,
            portal_base_url: text_var(&lookup, "PORTAL_BASE_URL", &defaults.portal_base_url),
            identity_key: video_api_secret.clone(),
            ..defaults
        };
        engine.validate().wrap_err("Invalid engine configuration")?;

        // Provider settings
        let video = VideoSettings {
            api_url: text_var(&lookup, "VIDEO_API_URL", "http://localhost:7880"),
            ws_url: text_var(&lookup, "VIDEO_WS_URL", "ws://localhost:7880"),
            api_key: text_var(&lookup, "VIDEO_API_KEY", "devkey"),
            api_secret: video_api_secret,
        };
        let dispatch = DispatchSettings {
            url: text_var(&lookup, "DISPATCH_URL", "http://localhost:4000/notifications"),
            token: text_var(&lookup, "DISPATCH_TOKEN", ""),
        };

        // Background work
        let internal_ticker = parse_var(&lookup, "INTERNAL_TICKER", false)?;
        let sweep_seconds = parse_var(&lookup, "AUTO_END_SWEEP_SECONDS", 300u64)?;
        let sweep_interval = (sweep_seconds > 0).then(|| Duration::from_secs(sweep_seconds));

        Ok(Self {
            host,
            port,
            database_url,
            log_level,
            cors_origins,
            request_timeout,
            jwt_secret,
            cron_secret,
            engine,
            video,
            dispatch,
            internal_ticker,
            sweep_interval,
        })
    }

    /// Returns the server address as a string, e.g. "127.0.0.1:8080"
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
