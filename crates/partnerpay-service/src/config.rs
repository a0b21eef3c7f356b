//! Service configuration.

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// PostgreSQL connection string. When unset the service runs on the
    /// in-memory ledger (development mode).
    pub database_url: Option<String>,

    /// Externally reachable base URL of this service, used for cron
    /// self-requeue requests (default: `http://localhost:8080`).
    pub self_url: String,

    /// Shared secret for cron invocation signatures.
    pub cron_secret: Option<String>,

    /// Payment processor webhook signing secret.
    pub payments_webhook_secret: Option<String>,

    /// Admin API key for privileged endpoints.
    pub admin_api_key: Option<String>,

    /// Payment processor recipient API base URL (optional).
    pub recipient_api_url: Option<String>,

    /// Payment processor recipient API key (optional).
    pub recipient_api_key: Option<String>,

    /// Partner notification webhook URL (optional).
    pub notify_webhook_url: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            database_url: std::env::var("DATABASE_URL").ok(),
            self_url: std::env::var("SELF_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
            cron_secret: std::env::var("CRON_SECRET").ok(),
            payments_webhook_secret: std::env::var("PAYMENTS_WEBHOOK_SECRET").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            recipient_api_url: std::env::var("RECIPIENT_API_URL").ok(),
            recipient_api_key: std::env::var("RECIPIENT_API_KEY").ok(),
            notify_webhook_url: std::env::var("NOTIFY_WEBHOOK_URL").ok(),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            database_url: None,
            self_url: "http://localhost:8080".into(),
            cron_secret: None,
            payments_webhook_secret: None,
            admin_api_key: None,
            recipient_api_url: None,
            recipient_api_key: None,
            notify_webhook_url: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
