use crate::browser::client::BrowserClient;
use crate::config::WebSocketConfig;
use crate::error::{BridgeError, Result};
use crate::websocket::connection::{run_connection, LinkTimings};
use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

const CHROME_EXTENSION_WILDCARD: &str = "chrome-extension://*";
const CHROME_EXTENSION_SCHEME: &str = "chrome-extension://";

#[derive(Clone)]
pub struct LinkState {
    pub client: Arc<BrowserClient>,
    pub allowed_origins: Arc<Vec<String>>,
    pub timings: LinkTimings,
    pub shutdown: CancellationToken,
}

impl LinkState {
    pub fn new(config: &WebSocketConfig, client: Arc<BrowserClient>, shutdown: CancellationToken) -> Self {
        Self {
            client,
            allowed_origins: Arc::new(config.allowed_origins.clone()),
            timings: LinkTimings {
                ping_interval: Duration::from_secs(config.ping_interval),
                ..LinkTimings::default()
            },
            shutdown,
        }
    }

    pub fn with_timings(mut self, timings: LinkTimings) -> Self {
        self.timings = timings;
        self
    }
}

/// Origin admission on upgrade. An empty origin is accepted.
pub fn is_origin_allowed(origin: &str, allowed: &[String]) -> bool {
    if origin.is_empty() {
        return true;
    }

    allowed.iter().any(|pattern| {
        if pattern == origin {
            return true;
        }
        if pattern == CHROME_EXTENSION_WILDCARD {
            return origin.starts_with(CHROME_EXTENSION_SCHEME);
        }
        if pattern == "http://localhost" || pattern == "https://localhost" {
            return origin
                .strip_prefix(pattern.as_str())
                .and_then(|rest| rest.strip_prefix(':'))
                .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()));
        }
        false
    })
}

pub fn router(state: LinkState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<LinkState>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !is_origin_allowed(origin, &state.allowed_origins) {
        tracing::warn!("Rejected WebSocket connection from origin: {}", origin);
        return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
    }

    ws.on_upgrade(move |socket| {
        run_connection(socket, state.client, state.timings, state.shutdown)
    })
}

/// Bind the configured host and port, then serve until `shutdown` fires
pub async fn run_server(
    config: &WebSocketConfig,
    client: Arc<BrowserClient>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        BridgeError::Config(format!("Failed to bind WebSocket port {}: {}", addr, e))
    })?;
    tracing::info!("WebSocket server listening on ws://{}", addr);

    serve(listener, LinkState::new(config, client, shutdown)).await
}

/// Serve on an already-bound listener
pub async fn serve(listener: TcpListener, state: LinkState) -> Result<()> {
    let shutdown = state.shutdown.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("WebSocket server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Vec<String> {
        WebSocketConfig::default().allowed_origins
    }

    #[test]
    fn empty_origin_allowed() {
        assert!(is_origin_allowed("", &[]));
    }

    #[test]
    fn extension_wildcard() {
        assert!(is_origin_allowed("chrome-extension://abcdef", &defaults()));
        assert!(!is_origin_allowed(
            "chrome-extension://abcdef",
            &["http://localhost".to_string()]
        ));
    }

    #[test]
    fn localhost_any_port() {
        let allowed = defaults();
        assert!(is_origin_allowed("http://localhost", &allowed));
        assert!(is_origin_allowed("http://localhost:3000", &allowed));
        assert!(is_origin_allowed("https://localhost:8443", &allowed));
        assert!(!is_origin_allowed("http://localhost.evil.com", &allowed));
        assert!(!is_origin_allowed("http://example.com", &allowed));
    }

    #[test]
    fn https_needs_its_own_entry() {
        let allowed = vec!["http://localhost".to_string()];
        assert!(!is_origin_allowed("https://localhost:8443", &allowed));
    }

    #[test]
    fn exact_match() {
        let allowed = vec!["https://app.example.com".to_string()];
        assert!(is_origin_allowed("https://app.example.com", &allowed));
        assert!(!is_origin_allowed("https://app.example.com:444", &allowed));
    }

    #[test]
    fn ping_interval_taken_from_config() {
        let config = WebSocketConfig {
            ping_interval: 7,
            ..Default::default()
        };
        let client = Arc::new(BrowserClient::from_config(&config));
        let state = LinkState::new(&config, client, CancellationToken::new());
        assert_eq!(state.timings.ping_interval, Duration::from_secs(7));
        assert_eq!(state.timings.read_timeout, LinkTimings::default().read_timeout);

        let fast = LinkTimings {
            ping_interval: Duration::from_millis(20),
            ..LinkTimings::default()
        };
        assert_eq!(state.with_timings(fast).timings, fast);
    }
}
