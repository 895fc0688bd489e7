//! Catalog introspection — negotiates a session over an open channel and
//! retrieves the host's tool catalog and optional usage instructions.

use crate::protocol::{InitializeResult, ListToolsResult, ToolDef, PROTOCOL_VERSION};
use crate::transport::Channel;
use std::time::Duration;
use toolbind_core::{Error, Result};
use tracing::info;

/// A host's introspected catalog.
#[derive(Debug, Clone)]
pub struct Catalog {
    /// Every tool the host advertises, in catalog order.
    pub tools: Vec<ToolDef>,
    /// Host-supplied free-text instructions from the handshake, verbatim.
    pub instructions: Option<String>,
}

/// Performs the capability handshake: `initialize` followed by the
/// `notifications/initialized` notification.
pub async fn handshake(channel: &dyn Channel, timeout: Duration) -> Result<InitializeResult> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "toolbind",
            "version": env!("CARGO_PKG_VERSION")
        }
    });

    let resp = channel.request("initialize", Some(params), timeout).await?;
    if let Some(err) = resp.error {
        return Err(Error::Connection(format!(
            "initialize failed: {} (code {})",
            err.message, err.code
        )));
    }

    let result: InitializeResult = serde_json::from_value(
        resp.result
            .ok_or_else(|| Error::Connection("empty initialize result".into()))?,
    )
    .map_err(|e| Error::Connection(format!("failed to parse initialize result: {e}")))?;

    channel.notify("notifications/initialized", None).await?;

    Ok(result)
}

/// Retrieves the full tool list, following `nextCursor` pagination. Each
/// page request is wrapped in the same timeout.
pub async fn list_tools(channel: &dyn Channel, timeout: Duration) -> Result<Vec<ToolDef>> {
    let mut tools = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let params = cursor
            .as_ref()
            .map(|c| serde_json::json!({ "cursor": c }));
        let resp = channel.request("tools/list", params, timeout).await?;
        if let Some(err) = resp.error {
            return Err(Error::Connection(format!(
                "tools/list failed: {} (code {})",
                err.message, err.code
            )));
        }

        let page: ListToolsResult = serde_json::from_value(
            resp.result
                .ok_or_else(|| Error::Connection("empty tools/list result".into()))?,
        )
        .map_err(|e| Error::Connection(format!("failed to parse tools/list result: {e}")))?;

        tools.extend(page.tools);
        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(tools)
}

/// Negotiates a session and retrieves the host's catalog. Every step runs
/// under `timeout`; exceeding it fails with [`Error::Timeout`] rather than
/// hanging the caller.
pub async fn introspect(channel: &dyn Channel, timeout: Duration) -> Result<Catalog> {
    let init = handshake(channel, timeout).await?;
    let tools = list_tools(channel, timeout).await?;

    info!(
        version = %init.protocol_version,
        tools = tools.len(),
        instructions = init.instructions.is_some(),
        "host catalog introspected"
    );

    Ok(Catalog {
        tools,
        instructions: init.instructions,
    })
}
