//! Client bridge — turns an in-process call from a generated stub into a
//! remote tool invocation and decodes the result.
//!
//! Connections are cached per host name in a [`ConnectionRegistry`] owned
//! by the bridge and never invalidated within a process lifetime: a dead
//! connection surfaces as an invocation failure, not a silent reconnect.

use crate::decode::decode_result;
use crate::introspect::handshake;
use crate::protocol::CallToolResult;
use crate::transport::{open_channel, Channel};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OnceCell};
use toolbind_core::{Error, HostDescriptor, HostsConfig, Result};
use tracing::{debug, warn};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Opens a ready-to-call channel to a host. The production implementation
/// opens a transport and performs the session handshake; tests substitute
/// their own.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connects to the host and returns a channel that has completed the
    /// capability handshake.
    async fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn Channel>>;
}

/// The production [`Connector`]: transport open plus session handshake.
pub struct TransportConnector {
    connect_timeout: Duration,
}

impl TransportConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TransportConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TransportConnector {
    async fn connect(&self, host: &HostDescriptor) -> Result<Arc<dyn Channel>> {
        let channel = open_channel(host, self.connect_timeout).await?;
        let init = handshake(channel.as_ref(), self.connect_timeout).await?;
        debug!(host = %host.name, version = %init.protocol_version, "host connected");
        Ok(channel)
    }
}

/// Per-process cache of live channels, keyed by host name. At most one
/// channel per host exists at a time; concurrent first callers share the
/// single in-flight open.
#[derive(Default)]
pub struct ConnectionRegistry {
    cells: Mutex<HashMap<String, Arc<OnceCell<Arc<dyn Channel>>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The once-init cell for a host, created on first use.
    async fn cell(&self, host: &str) -> Arc<OnceCell<Arc<dyn Channel>>> {
        let mut cells = self.cells.lock().await;
        cells.entry(host.to_string()).or_default().clone()
    }

    /// Number of hosts with an established channel.
    pub async fn connected_count(&self) -> usize {
        let cells = self.cells.lock().await;
        cells.values().filter(|c| c.initialized()).count()
    }
}

/// Runtime bridge between generated stubs and remote hosts.
pub struct ToolBridge {
    config: HostsConfig,
    connector: Arc<dyn Connector>,
    registry: ConnectionRegistry,
    call_timeout: Duration,
}

impl ToolBridge {
    /// Bridge over the given configuration with the production connector.
    pub fn new(config: HostsConfig) -> Self {
        Self::with_connector(config, Arc::new(TransportConnector::default()))
    }

    /// Bridge with a custom connector (tests, alternative transports).
    pub fn with_connector(config: HostsConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            registry: ConnectionRegistry::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Overrides the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The bridge's connection registry (read-only view for callers that
    /// report connection state).
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Resolves or lazily opens the cached channel for a host.
    async fn channel_for(&self, host: &str) -> Result<Arc<dyn Channel>> {
        let descriptor = self
            .config
            .get(host)
            .ok_or_else(|| Error::Config(format!("unknown host '{host}'")))?
            .clone();

        let cell = self.registry.cell(host).await;
        let channel = cell
            .get_or_try_init(|| async { self.connector.connect(&descriptor).await })
            .await?;
        Ok(channel.clone())
    }

    /// Invokes a tool on a host and decodes the result.
    ///
    /// A JSON-RPC error or a result flagged `isError` becomes
    /// [`Error::Invocation`]; the bridge never retries.
    pub async fn invoke(
        &self,
        host: &str,
        tool: &str,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let channel = self.channel_for(host).await?;

        let params = serde_json::json!({
            "name": tool,
            "arguments": input,
        });
        let resp = channel
            .request("tools/call", Some(params), self.call_timeout)
            .await?;

        if let Some(err) = resp.error {
            warn!(host, tool, code = err.code, "tool call rejected by host");
            return Err(Error::Invocation {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }

        let result: CallToolResult = serde_json::from_value(
            resp.result
                .ok_or_else(|| Error::Connection(format!("host '{host}': empty tools/call result")))?,
        )
        .map_err(|e| Error::Connection(format!("host '{host}': malformed tool result: {e}")))?;

        if result.is_error {
            let message: String = result
                .content
                .iter()
                .filter_map(|block| block.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            warn!(host, tool, "tool reported execution error");
            return Err(Error::Invocation {
                code: -1,
                message,
                data: serde_json::to_value(&result).ok(),
            });
        }

        Ok(decode_result(&result))
    }
}
