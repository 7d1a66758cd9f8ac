use crate::config::schema::Config;
use crate::error::{BridgeError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "MCP_BROWSER_CONFIG";
pub const WS_HOST_ENV: &str = "MCP_BROWSER_WS_HOST";
pub const WS_PORT_ENV: &str = "MCP_BROWSER_WS_PORT";

/// Candidate config files, in lookup order, used when `MCP_BROWSER_CONFIG` is unset
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("./configs/config.yaml"),
        PathBuf::from("./config.yaml"),
    ];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config").join("mcp-browser").join("config.yaml"));
    }
    paths
}

/// Resolve which file to read. An explicit path is returned even when missing
/// so that the read reports it.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_paths().into_iter().find(|p| p.exists())
}

/// Load configuration: defaults, then the YAML file, then environment overrides
pub fn load_config() -> Result<Config> {
    let mut config = match resolve_config_path() {
        Some(path) => load_config_from(&path)?,
        None => {
            tracing::debug!("No config file found, using defaults");
            Config::default()
        }
    };
    apply_env_overrides(&mut config, |key| env::var(key).ok());
    Ok(config)
}

/// Read a YAML config file; missing sections and keys take their defaults
pub fn load_config_from(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| {
        BridgeError::Config(format!("Failed to read config from {:?}: {}", path, e))
    })?;

    if content.trim().is_empty() {
        return Ok(Config::default());
    }

    let config: Config = serde_yaml::from_str(&content)?;
    tracing::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Apply `MCP_BROWSER_WS_HOST` / `MCP_BROWSER_WS_PORT`. A port that does not
/// parse is ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(WS_HOST_ENV).filter(|h| !h.is_empty()) {
        config.websocket.host = host;
    }
    if let Some(port) = lookup(WS_PORT_ENV).and_then(|p| p.trim().parse::<u16>().ok()) {
        config.websocket.port = port;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, env_of(&[(WS_HOST_ENV, "0.0.0.0"), (WS_PORT_ENV, "9100")]));
        assert_eq!(config.websocket.host, "0.0.0.0");
        assert_eq!(config.websocket.port, 9100);
    }

    #[test]
    fn test_bad_port_override_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, env_of(&[(WS_PORT_ENV, "not-a-port")]));
        assert_eq!(config.websocket.port, 8765);
    }

    #[test]
    fn test_default_paths_order() {
        let paths = default_config_paths();
        assert_eq!(paths[0], PathBuf::from("./configs/config.yaml"));
        assert_eq!(paths[1], PathBuf::from("./config.yaml"));
    }
}
