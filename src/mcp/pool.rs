use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};

use crate::core::errors::RagError;
use crate::mcp::client::{QueryService, RmcpConnector, ServiceConnector};
use crate::mcp::config::{McpServersConfig, ORDER_SERVER, USER_PROFILE_SERVER};

/// Connections held for one execution context. Handed out as an `Arc` so
/// every query in the same context reuses the same live servers.
pub struct SessionConnections {
    context_id: String,
    services: HashMap<String, Arc<dyn QueryService>>,
    failures: HashMap<String, String>,
}

impl SessionConnections {
    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    pub fn service(&self, server: &str) -> Result<&Arc<dyn QueryService>, RagError> {
        if let Some(service) = self.services.get(server) {
            return Ok(service);
        }
        if let Some(reason) = self.failures.get(server) {
            return Err(RagError::ConnectionPool(format!(
                "server '{}' is unavailable in context '{}': {}",
                server, self.context_id, reason
            )));
        }
        Err(RagError::DynamicData(format!(
            "server '{}' is not configured",
            server
        )))
    }

    async fn shutdown(&self) {
        for (name, service) in &self.services {
            tracing::debug!(server = %name, context = %self.context_id, "closing dynamic-data connection");
            service.shutdown().await;
        }
    }
}

/// Profile and order sections fetched for the standing user-context block.
/// Either side may be absent when its server is down; the query proceeds
/// with whatever was fetched.
#[derive(Debug, Clone, Serialize, Default)]
pub struct DashboardPayload {
    pub profile: Option<Value>,
    pub orders: Option<Value>,
}

impl DashboardPayload {
    pub fn is_empty(&self) -> bool {
        self.profile.is_none() && self.orders.is_none()
    }

    pub fn is_partial(&self) -> bool {
        !self.is_empty() && (self.profile.is_none() || self.orders.is_none())
    }
}

/// Lazily connects and caches dynamic-data servers per execution context.
pub struct DynamicDataPool {
    registry: McpServersConfig,
    connector: Arc<dyn ServiceConnector>,
    contexts: RwLock<HashMap<String, Arc<SessionConnections>>>,
    // One connect lock per context: a slow server spawn for one session
    // must not stall first use in other sessions.
    connect_locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DynamicDataPool {
    pub fn new(registry: McpServersConfig, connector: Arc<dyn ServiceConnector>) -> Self {
        Self {
            registry,
            connector,
            contexts: RwLock::new(HashMap::new()),
            connect_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_rmcp(registry: McpServersConfig) -> Self {
        Self::new(registry, Arc::new(RmcpConnector))
    }

    /// Returns the pooled connections for `context_id`, connecting every
    /// enabled server on first use. A server that fails to connect is
    /// recorded instead of failing the whole context.
    pub async fn get_client(&self, context_id: &str) -> Arc<SessionConnections> {
        if let Some(existing) = self.contexts.read().await.get(context_id) {
            return Arc::clone(existing);
        }

        let lock = {
            let mut locks = self.connect_locks.lock().unwrap();
            Arc::clone(locks.entry(context_id.to_string()).or_default())
        };
        let _guard = lock.lock().await;
        if let Some(existing) = self.contexts.read().await.get(context_id) {
            return Arc::clone(existing);
        }

        let mut services: HashMap<String, Arc<dyn QueryService>> = HashMap::new();
        let mut failures = HashMap::new();
        for (name, server) in self.registry.enabled_servers() {
            match self.connector.connect(name, server).await {
                Ok(service) => {
                    services.insert(name.clone(), service);
                }
                Err(err) => {
                    tracing::warn!(server = %name, context = %context_id, error = %err, "dynamic-data server unavailable");
                    failures.insert(name.clone(), err.to_string());
                }
            }
        }

        let connections = Arc::new(SessionConnections {
            context_id: context_id.to_string(),
            services,
            failures,
        });
        self.contexts
            .write()
            .await
            .insert(context_id.to_string(), Arc::clone(&connections));
        connections
    }

    pub async fn fetch(
        &self,
        context_id: &str,
        server: &str,
        operation: &str,
        args: Value,
    ) -> Result<Value, RagError> {
        let connections = self.get_client(context_id).await;
        let service = Arc::clone(connections.service(server)?);
        service.call(operation, args).await
    }

    /// Per-user query against one server; the user id is always part of the
    /// arguments so servers can scope their answer.
    pub async fn query_user_data(
        &self,
        context_id: &str,
        server: &str,
        operation: &str,
        user_id: &str,
        args: Value,
    ) -> Result<Value, RagError> {
        let args = match args {
            Value::Object(mut map) => {
                map.entry("user_id".to_string())
                    .or_insert_with(|| Value::String(user_id.to_string()));
                Value::Object(map)
            }
            Value::Null => json!({ "user_id": user_id }),
            other => json!({ "user_id": user_id, "input": other }),
        };
        self.fetch(context_id, server, operation, args).await
    }

    /// Fans out to the profile and order servers concurrently. Each section
    /// degrades to `None` on failure; the sections that did arrive are kept.
    pub async fn get_user_order_dashboard(
        &self,
        context_id: &str,
        user_id: &str,
    ) -> DashboardPayload {
        let args = json!({ "user_id": user_id });
        let (profile, orders) = tokio::join!(
            self.fetch(
                context_id,
                USER_PROFILE_SERVER,
                "get_user_profile",
                args.clone()
            ),
            self.fetch(
                context_id,
                ORDER_SERVER,
                "get_user_order_dashboard",
                args
            ),
        );

        let profile = match profile {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(context = %context_id, error = %err, "profile section unavailable");
                None
            }
        };
        let orders = match orders {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(context = %context_id, error = %err, "order section unavailable");
                None
            }
        };

        DashboardPayload { profile, orders }
    }

    /// Shuts down the pooled connections of one context. Run at session
    /// teardown so spawned server processes do not leak.
    pub async fn close_context(&self, context_id: &str) {
        let connections = self.contexts.write().await.remove(context_id);
        self.connect_locks.lock().unwrap().remove(context_id);
        if let Some(connections) = connections {
            connections.shutdown().await;
        }
    }

    /// Shuts down every pooled connection and forgets all contexts.
    pub async fn close_all(&self) {
        let contexts: Vec<Arc<SessionConnections>> =
            self.contexts.write().await.drain().map(|(_, c)| c).collect();
        self.connect_locks.lock().unwrap().clear();
        for connections in contexts {
            connections.shutdown().await;
        }
    }
}
