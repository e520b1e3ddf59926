//! Configuration loading: upstream-registry JSON, enhancement-rules JSON, and
//! the recognized environment variables. Any malformed input is fatal (§4.10).

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, source: serde_json::Error },
    #[error("{LISTEN_PORT} must be a valid port number, got {value:?}", LISTEN_PORT = "LISTEN_PORT")]
    InvalidPort { value: String },
}

fn default_timeout_ms() -> u64 {
    30_000
}

/// One entry from the `servers` map in the upstream-registry config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum UpstreamDescriptor {
    Stdio {
        command: Vec<String>,
        #[serde(default)]
        health_endpoint: Option<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Http {
        url: String,
        #[serde(default)]
        health_endpoint: Option<String>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

impl UpstreamDescriptor {
    pub fn timeout_ms(&self) -> u64 {
        match self {
            Self::Stdio { timeout_ms, .. } | Self::Http { timeout_ms, .. } => *timeout_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerRegistryFile {
    pub servers: HashMap<String, UpstreamDescriptor>,
}

/// One client's enhancement rule.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRule {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub model: String,
    pub system_prompt: String,
}

fn default_enabled() -> bool {
    true
}

/// The full enhancement-rules file: a default rule, per-client overrides, and
/// an ordered model fallback chain (`None` entries are the "give up" sentinel).
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSet {
    pub default: ClientRule,
    #[serde(default)]
    pub clients: HashMap<String, ClientRule>,
    #[serde(default)]
    pub fallback_chain: Vec<Option<String>>,
}

impl RuleSet {
    /// Look up the rule for `client_name`, falling back to `default`.
    pub fn rule_for(&self, client_name: Option<&str>) -> &ClientRule {
        client_name.and_then(|name| self.clients.get(name)).unwrap_or(&self.default)
    }
}

/// Everything the gateway needs to start, loaded once.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_port: u16,
    pub inference_url: String,
    pub vector_store_url: String,
    pub log_level: String,
    pub servers: HashMap<String, UpstreamDescriptor>,
    pub rules: RuleSet,
}

impl GatewayConfig {
    /// Load server and rule files from disk, then layer in environment inputs.
    pub fn load(servers_path: &Path, rules_path: &Path) -> Result<Self, ConfigError> {
        let servers_file = read_json::<ServerRegistryFile>(servers_path)?;
        let rules = read_json::<RuleSet>(rules_path)?;

        let listen_port = match std::env::var("LISTEN_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidPort { value: raw })?,
            Err(_) => 9090,
        };

        Ok(Self {
            listen_port,
            inference_url: std::env::var("INFERENCE_URL").unwrap_or_default(),
            vector_store_url: std::env::var("VECTOR_STORE_URL").unwrap_or_default(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            servers: servers_file.servers,
            rules,
        })
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| ConfigError::Parse { path: path.display().to_string(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_for_falls_back_to_default() {
        let rules = RuleSet {
            default: ClientRule { enabled: true, model: "m".into(), system_prompt: "S".into() },
            clients: HashMap::new(),
            fallback_chain: vec![],
        };
        assert_eq!(rules.rule_for(Some("unknown-client")).model, "m");
        assert_eq!(rules.rule_for(None).model, "m");
    }

    #[test]
    fn rule_for_prefers_client_override() {
        let mut clients = HashMap::new();
        clients.insert(
            "acme".to_string(),
            ClientRule { enabled: true, model: "acme-model".into(), system_prompt: "S2".into() },
        );
        let rules = RuleSet {
            default: ClientRule { enabled: true, model: "m".into(), system_prompt: "S".into() },
            clients,
            fallback_chain: vec![],
        };
        assert_eq!(rules.rule_for(Some("acme")).model, "acme-model");
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let dir = std::env::temp_dir().join(format!("mcp-gateway-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("servers.json");
        std::fs::write(&path, "{ not json").unwrap();
        let result = read_json::<ServerRegistryFile>(&path);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
