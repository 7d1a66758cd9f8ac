use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub websocket: WebSocketConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Identity reported to MCP clients during initialization
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,

    #[serde(default = "default_server_version")]
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            version: default_server_version(),
        }
    }
}

/// Listener for the browser extension link
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSocketConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Ceiling on a single command round-trip, in milliseconds
    #[serde(default = "default_reconnect_ms")]
    pub reconnect_ms: u64,

    /// Seconds between WebSocket pings
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,

    /// Origins admitted on upgrade. `chrome-extension://*` admits any extension;
    /// `http://localhost` and `https://localhost` admit any port on localhost.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            reconnect_ms: default_reconnect_ms(),
            ping_interval: default_ping_interval(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrowserConfig {
    /// Milliseconds
    #[serde(default = "default_browser_timeout")]
    pub default_timeout: u64,

    #[serde(default = "default_max_tabs")]
    pub max_tabs: u32,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            default_timeout: default_browser_timeout(),
            max_tabs: default_max_tabs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_server_name() -> String {
    "Browser Automation Server".to_string()
}

fn default_server_version() -> String {
    "1.0.0".to_string()
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_reconnect_ms() -> u64 {
    5000
}

fn default_ping_interval() -> u64 {
    30
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost".to_string(),
        "https://localhost".to_string(),
        "chrome-extension://*".to_string(),
    ]
}

fn default_browser_timeout() -> u64 {
    30000
}

fn default_max_tabs() -> u32 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.name, "Browser Automation Server");
        assert_eq!(config.websocket.port, 8765);
        assert_eq!(config.websocket.reconnect_ms, 5000);
        assert_eq!(config.websocket.allowed_origins.len(), 3);
        assert_eq!(config.browser.max_tabs, 100);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "websocket:\n  port: 9000\nlogging:\n  level: debug\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.websocket.port, 9000);
        assert_eq!(config.websocket.host, "localhost");
        assert_eq!(config.websocket.ping_interval, 30);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.server, ServerConfig::default());
    }
}
