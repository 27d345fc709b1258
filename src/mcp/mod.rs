mod client;
mod config;
mod pool;

pub use client::{QueryService, RmcpConnector, RmcpService, ServiceConnector};
pub use config::{McpServerConfig, McpServersConfig, ORDER_SERVER, USER_PROFILE_SERVER};
pub use pool::{DashboardPayload, DynamicDataPool, SessionConnections};
