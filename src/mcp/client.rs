use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::CallToolRequestParams;
use rmcp::service::RoleClient;
use rmcp::service::RunningService;
use rmcp::transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess};
use rmcp::ServiceExt;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::process::Command;
use tokio::sync::RwLock;

use crate::core::errors::RagError;
use crate::mcp::config::McpServerConfig;

/// A connected dynamic-data server. One live connection per (context, server).
#[async_trait]
pub trait QueryService: Send + Sync {
    /// Invoke a named operation and return its decoded payload.
    async fn call(&self, operation: &str, args: Value) -> Result<Value, RagError>;

    /// Tear the connection down. Safe to call more than once.
    async fn shutdown(&self);
}

/// Opens connections; swapped for a mock in tests.
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    async fn connect(
        &self,
        name: &str,
        server: &McpServerConfig,
    ) -> Result<Arc<dyn QueryService>, RagError>;
}

// RwLock so concurrent calls on one connection do not serialize; shutdown
// takes the write side to move the service out for cancellation.
pub struct RmcpService {
    name: String,
    service: RwLock<Option<RunningService<RoleClient, ()>>>,
}

#[async_trait]
impl QueryService for RmcpService {
    async fn call(&self, operation: &str, args: Value) -> Result<Value, RagError> {
        let guard = self.service.read().await;
        let service = guard.as_ref().ok_or_else(|| {
            RagError::DynamicData(format!("server '{}' is already shut down", self.name))
        })?;

        let params = CallToolRequestParams {
            name: operation.to_string().into(),
            arguments: build_tool_arguments(&args),
            meta: None,
            task: None,
        };

        let result = service.call_tool(params).await.map_err(|err| {
            RagError::DynamicData(format!(
                "call to '{}' on '{}' failed: {}",
                operation, self.name, err
            ))
        })?;

        decode_tool_result(&self.name, operation, &result)
    }

    async fn shutdown(&self) {
        let service = self.service.write().await.take();
        if let Some(service) = service {
            tracing::debug!(server = %self.name, "cancelling MCP connection");
            let _ = service.cancel().await;
        }
    }
}

pub struct RmcpConnector;

#[async_trait]
impl ServiceConnector for RmcpConnector {
    async fn connect(
        &self,
        name: &str,
        server: &McpServerConfig,
    ) -> Result<Arc<dyn QueryService>, RagError> {
        let transport_name = server.transport.to_lowercase();
        let service = if transport_name == "stdio" || transport_name.is_empty() {
            let command = server.command.trim();
            if command.is_empty() {
                return Err(RagError::ConnectionPool(format!(
                    "server '{}' uses stdio transport but has no command",
                    name
                )));
            }
            let mut cmd = Command::new(command);
            cmd.args(&server.args);
            if !server.env.is_empty() {
                cmd.envs(&server.env);
            }
            let transport = TokioChildProcess::new(cmd.configure(|cmd| {
                let _ = cmd;
            }))
            .map_err(|err| {
                RagError::ConnectionPool(format!("failed to spawn server '{}': {}", name, err))
            })?;
            ().serve(transport).await.map_err(|err| {
                RagError::ConnectionPool(format!("failed to connect server '{}': {}", name, err))
            })?
        } else if transport_name == "streamable_http" || transport_name == "http" {
            let url = server
                .url
                .as_ref()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    RagError::ConnectionPool(format!(
                        "server '{}' uses HTTP transport but has no url",
                        name
                    ))
                })?;
            let transport = StreamableHttpClientTransport::from_uri(url);
            ().serve(transport).await.map_err(|err| {
                RagError::ConnectionPool(format!("failed to connect server '{}': {}", name, err))
            })?
        } else {
            return Err(RagError::ConnectionPool(format!(
                "server '{}' has unsupported transport '{}'",
                name, server.transport
            )));
        };

        let tool_count = service
            .list_tools(Default::default())
            .await
            .map(|listing| listing.tools.len())
            .unwrap_or(0);
        tracing::info!(server = name, tool_count, "connected dynamic-data server");

        Ok(Arc::new(RmcpService {
            name: name.to_string(),
            service: RwLock::new(Some(service)),
        }))
    }
}

fn build_tool_arguments(args: &Value) -> Option<Map<String, Value>> {
    match args {
        Value::Object(map) => Some(map.clone()),
        Value::Null => None,
        _ => {
            let mut map = Map::new();
            map.insert("input".to_string(), args.clone());
            Some(map)
        }
    }
}

/// Extracts the textual content of a tool result, decoding JSON payloads
/// where the server returned serialized structures.
fn decode_tool_result(
    server: &str,
    operation: &str,
    result: &impl Serialize,
) -> Result<Value, RagError> {
    let value = serde_json::to_value(result).unwrap_or(Value::Null);

    let mut parts = Vec::new();
    if let Some(content) = value.get("content").and_then(|v| v.as_array()) {
        for item in content {
            let item_type = item.get("type").and_then(|v| v.as_str()).unwrap_or("");
            if item_type == "text" {
                if let Some(text) = item.get("text").and_then(|v| v.as_str()) {
                    if !text.trim().is_empty() {
                        parts.push(text.to_string());
                        continue;
                    }
                }
            }
            parts.push(item.to_string());
        }
    }

    let is_error = value
        .get("is_error")
        .or_else(|| value.get("isError"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if is_error {
        return Err(RagError::DynamicData(format!(
            "'{}' on '{}' reported an error: {}",
            operation,
            server,
            parts.join("\n")
        )));
    }

    if parts.is_empty() {
        return Ok(value);
    }

    let joined = parts.join("\n");
    Ok(serde_json::from_str(&joined).unwrap_or(Value::String(joined)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_json_text_content() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"pending\": 2}"}]
        });
        let value = decode_tool_result("orders", "get_dashboard", &result).unwrap();
        assert_eq!(value, json!({"pending": 2}));
    }

    #[test]
    fn plain_text_content_falls_back_to_string() {
        let result = json!({
            "content": [{"type": "text", "text": "no orders on file"}]
        });
        let value = decode_tool_result("orders", "get_dashboard", &result).unwrap();
        assert_eq!(value, json!("no orders on file"));
    }

    #[test]
    fn error_results_surface_as_dynamic_data_errors() {
        let result = json!({
            "isError": true,
            "content": [{"type": "text", "text": "unknown user"}]
        });
        let err = decode_tool_result("profile", "get_user_profile", &result).unwrap_err();
        assert!(matches!(err, RagError::DynamicData(_)));
        assert!(err.to_string().contains("unknown user"));
    }

    #[test]
    fn scalar_arguments_are_wrapped() {
        let args = build_tool_arguments(&json!("u-42")).unwrap();
        assert_eq!(args.get("input"), Some(&json!("u-42")));
        assert!(build_tool_arguments(&Value::Null).is_none());
    }
}
