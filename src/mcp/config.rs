//! Declarative registry of dynamic-data query servers.
//!
//! A server is either a spawned local process (stdio transport) or a
//! remote streamable-HTTP endpoint. The base JSON file can be overridden
//! per server id through the `RAGDESK_MCP_SERVERS` environment variable.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

pub const MCP_SERVERS_ENV: &str = "RAGDESK_MCP_SERVERS";

/// Registry id of the user-profile server used by the dashboard composite.
pub const USER_PROFILE_SERVER: &str = "user_profile_server";
/// Registry id of the order-management server used by the dashboard composite.
pub const ORDER_SERVER: &str = "order_management_server";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

impl McpServersConfig {
    /// Base file (absent file means empty registry) merged with the env
    /// override; an env entry replaces the whole base entry for that id.
    pub fn load(path: &Path) -> Result<Self, RagError> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| {
                RagError::Config(format!("failed to read {}: {}", path.display(), e))
            })?;
            serde_json::from_str::<McpServersConfig>(&contents).map_err(|e| {
                RagError::Config(format!("invalid MCP config {}: {}", path.display(), e))
            })?
        } else {
            McpServersConfig::default()
        };

        if let Ok(raw) = env::var(MCP_SERVERS_ENV) {
            if !raw.trim().is_empty() {
                let overrides: HashMap<String, McpServerConfig> = serde_json::from_str(&raw)
                    .map_err(|e| {
                        RagError::Config(format!("invalid {} override: {}", MCP_SERVERS_ENV, e))
                    })?;
                for (name, server) in overrides {
                    config.mcp_servers.insert(name, server);
                }
            }
        }

        Ok(config)
    }

    pub fn enabled_servers(&self) -> impl Iterator<Item = (&String, &McpServerConfig)> {
        self.mcp_servers.iter().filter(|(_, s)| s.enabled)
    }
}

fn default_enabled() -> bool {
    true
}

fn default_transport() -> String {
    "stdio".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests that touch RAGDESK_MCP_SERVERS must not interleave.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn parses_mcp_servers_registry() {
        let raw = r#"{
            "mcpServers": {
                "user_profile_server": {
                    "command": "python",
                    "args": ["mcp_user_server.py"]
                },
                "order_management_server": {
                    "transport": "http",
                    "url": "http://localhost:9301/mcp"
                },
                "disabled_one": {
                    "command": "noop",
                    "enabled": false
                }
            }
        }"#;
        let config: McpServersConfig = serde_json::from_str(raw).unwrap();
        assert_eq!(config.mcp_servers.len(), 3);
        assert_eq!(config.enabled_servers().count(), 2);

        let user = &config.mcp_servers[USER_PROFILE_SERVER];
        assert_eq!(user.transport, "stdio");
        assert!(user.enabled);

        let orders = &config.mcp_servers[ORDER_SERVER];
        assert_eq!(orders.url.as_deref(), Some("http://localhost:9301/mcp"));
    }

    #[test]
    fn missing_file_yields_empty_registry() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = McpServersConfig::load(&dir.path().join("absent.json")).unwrap();
        assert!(config.mcp_servers.is_empty());
    }

    #[test]
    fn env_override_replaces_matching_server_entry() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcp_servers.json");
        fs::write(
            &path,
            r#"{
                "mcpServers": {
                    "user_profile_server": {
                        "command": "python",
                        "args": ["mcp_user_server.py"]
                    },
                    "order_management_server": {
                        "command": "python",
                        "args": ["mcp_order_server.py"]
                    }
                }
            }"#,
        )
        .unwrap();

        env::set_var(
            MCP_SERVERS_ENV,
            r#"{"order_management_server": {"transport": "http", "url": "http://localhost:9301/mcp"}}"#,
        );
        let config = McpServersConfig::load(&path);
        env::remove_var(MCP_SERVERS_ENV);
        let config = config.unwrap();

        // The override replaces the whole base entry for that id.
        let orders = &config.mcp_servers[ORDER_SERVER];
        assert_eq!(orders.transport, "http");
        assert_eq!(orders.url.as_deref(), Some("http://localhost:9301/mcp"));
        assert!(orders.command.is_empty());
        assert!(orders.args.is_empty());

        // Servers the override does not name keep their base entry.
        let user = &config.mcp_servers[USER_PROFILE_SERVER];
        assert_eq!(user.command, "python");
        assert_eq!(user.args, vec!["mcp_user_server.py"]);
    }
}
