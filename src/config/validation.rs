use crate::config::schema::Config;
use crate::error::{BridgeError, Result};

pub const LOG_FORMATS: &[&str] = &["json", "text", "pretty"];

/// Validate a loaded configuration before anything is started
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.name.trim().is_empty() {
        return Err(BridgeError::Validation(
            "server.name cannot be empty".to_string(),
        ));
    }

    if config.websocket.port == 0 {
        return Err(BridgeError::Validation(
            "websocket.port must be between 1 and 65535".to_string(),
        ));
    }

    if config.websocket.reconnect_ms == 0 {
        return Err(BridgeError::Validation(
            "websocket.reconnect_ms must be greater than 0".to_string(),
        ));
    }

    if config.websocket.ping_interval == 0 {
        return Err(BridgeError::Validation(
            "websocket.ping_interval must be greater than 0".to_string(),
        ));
    }

    let format = config.logging.format.to_ascii_lowercase();
    if !LOG_FORMATS.contains(&format.as_str()) {
        return Err(BridgeError::Validation(format!(
            "Invalid logging.format: {}. Must be one of: {}",
            config.logging.format,
            LOG_FORMATS.join(", ")
        )));
    }

    Ok(())
}
