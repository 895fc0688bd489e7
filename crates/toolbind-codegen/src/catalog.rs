//! The production catalog source: opens a transport to the host,
//! introspects, and lets the channel drop when done — generation-time
//! connections are independent of the runtime bridge's cache.

use crate::freshness::CatalogSource;
use async_trait::async_trait;
use std::time::Duration;
use toolbind_core::{HostDescriptor, Result};
use toolbind_mcp::introspect::introspect;
use toolbind_mcp::transport::open_channel;
use toolbind_mcp::Catalog;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches catalogs over the host's configured transport.
pub struct TransportCatalogSource {
    connect_timeout: Duration,
    op_timeout: Duration,
}

impl TransportCatalogSource {
    pub fn new(connect_timeout: Duration, op_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            op_timeout,
        }
    }
}

impl Default for TransportCatalogSource {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT, DEFAULT_OP_TIMEOUT)
    }
}

#[async_trait]
impl CatalogSource for TransportCatalogSource {
    async fn fetch(&self, host: &HostDescriptor) -> Result<Catalog> {
        let channel = open_channel(host, self.connect_timeout).await?;
        introspect(channel.as_ref(), self.op_timeout).await
    }
}
