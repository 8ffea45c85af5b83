use siphon_core::retry::RetryPreset;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Concurrency limit applied to executions that do not set their own.
    pub default_concurrency: i32,
    /// Retry profile used for extraction tasks.
    pub retry_preset: RetryPreset,
    /// How long event history rows are retained, in days.
    pub event_retention_days: i64,
    /// Cross-process relay channel. `None` disables the relay and the
    /// server runs in single-process mode.
    pub relay_channel: Option<String>,
    /// Extraction agent HTTP base URL.
    pub agent_api_url: String,
    /// Extraction agent WebSocket base URL.
    pub agent_ws_url: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DEFAULT_CONCURRENCY`  | `3`                        |
    /// | `RETRY_PRESET`         | `standard`                 |
    /// | `EVENT_RETENTION_DAYS` | `30`                       |
    /// | `RELAY_CHANNEL`        | unset (relay disabled)     |
    /// | `AGENT_API_URL`        | `http://localhost:7070`    |
    /// | `AGENT_WS_URL`         | `ws://localhost:7070`      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let default_concurrency: i32 = std::env::var("DEFAULT_CONCURRENCY")
            .unwrap_or_else(|_| "3".into())
            .parse()
            .expect("DEFAULT_CONCURRENCY must be a valid i32");

        let retry_preset: RetryPreset = std::env::var("RETRY_PRESET")
            .unwrap_or_else(|_| "standard".into())
            .parse()
            .expect("RETRY_PRESET must be one of fast/standard/patient/aggressive");

        let event_retention_days: i64 = std::env::var("EVENT_RETENTION_DAYS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("EVENT_RETENTION_DAYS must be a valid i64");

        let relay_channel = std::env::var("RELAY_CHANNEL").ok().filter(|s| !s.is_empty());

        let agent_api_url =
            std::env::var("AGENT_API_URL").unwrap_or_else(|_| "http://localhost:7070".into());
        let agent_ws_url =
            std::env::var("AGENT_WS_URL").unwrap_or_else(|_| "ws://localhost:7070".into());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            default_concurrency,
            retry_preset,
            event_retention_days,
            relay_channel,
            agent_api_url,
            agent_ws_url,
        }
    }
}
