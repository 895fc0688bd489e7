//! Transport layer — opens a duplex JSON-RPC channel to a tool host,
//! either by spawning a subprocess (newline-framed stdio) or by talking
//! streamable HTTP to a network endpoint. Everything above this module is
//! transport-agnostic: both variants hide behind the [`Channel`] trait.

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use toolbind_core::{Error, HostDescriptor, HostTransport, Result};
use tracing::{debug, error};

/// A duplex JSON-RPC channel to one tool host.
///
/// Every request carries its own timeout; exceeding it cancels only that
/// request and surfaces [`Error::Timeout`]. There is no global timeout.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Sends a request and waits for the matching response.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse>;

    /// Sends a notification (no response expected).
    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()>;
}

/// Opens a channel to the given host, selecting the variant by descriptor
/// kind. Fails with [`Error::Connection`] if the subprocess cannot start or
/// the endpoint client cannot be built.
pub async fn open_channel(
    descriptor: &HostDescriptor,
    connect_timeout: Duration,
) -> Result<Arc<dyn Channel>> {
    match &descriptor.transport {
        HostTransport::Stdio { command, args, env } => {
            let channel = StdioChannel::spawn(&descriptor.name, command, args, env)?;
            Ok(Arc::new(channel))
        }
        HostTransport::Http { url, headers } => {
            let channel = HttpChannel::new(&descriptor.name, url, headers, connect_timeout)?;
            Ok(Arc::new(channel))
        }
    }
}

// --- Stdio variant ---

/// Channel to a subprocess host over newline-framed stdio.
pub struct StdioChannel {
    stdin: Mutex<tokio::process::ChildStdin>,
    // Held so the child stays alive for the channel's lifetime; kill_on_drop
    // guarantees termination once the channel goes away.
    _child: Mutex<Child>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>,
    next_id: AtomicU64,
    host: String,
}

impl StdioChannel {
    /// Spawns the host subprocess and wires its stdio as a message channel.
    pub fn spawn(
        host: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true);

        for (key, val) in env {
            cmd.env(key, val);
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::Connection(format!("failed to spawn host '{host}' ({command}): {e}"))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Connection(format!("host '{host}': stdin not available")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Connection(format!("host '{host}': stdout not available")))?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        // Reader task: route responses to their waiters by request id.
        let pending_reader = pending.clone();
        let host_name = host.to_string();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        debug!(host = %host_name, "host stdout closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                            Ok(resp) => {
                                if let Some(id) = resp.id {
                                    let mut map = pending_reader.lock().await;
                                    if let Some(tx) = map.remove(&id) {
                                        let _ = tx.send(resp);
                                    }
                                }
                                // Server notifications (no id) are ignored.
                            }
                            Err(e) => {
                                debug!(host = %host_name, line = %trimmed, error = %e, "non-JSON-RPC line from host");
                            }
                        }
                    }
                    Err(e) => {
                        error!(host = %host_name, error = %e, "error reading host stdout");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            stdin: Mutex::new(stdin),
            _child: Mutex::new(child),
            pending,
            next_id: AtomicU64::new(1),
            host: host.to_string(),
        })
    }

    async fn write_frame(&self, payload: &str) -> Result<()> {
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(payload.as_bytes()).await.map_err(|e| {
            Error::Connection(format!("host '{}': failed to write to stdin: {e}", self.host))
        })?;
        stdin.write_all(b"\n").await.map_err(|e| {
            Error::Connection(format!("host '{}': failed to write frame end: {e}", self.host))
        })?;
        stdin.flush().await.map_err(|e| {
            Error::Connection(format!("host '{}': failed to flush stdin: {e}", self.host))
        })?;
        Ok(())
    }
}

#[async_trait]
impl Channel for StdioChannel {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        {
            let mut map = self.pending.lock().await;
            map.insert(id, tx);
        }

        let msg = serde_json::to_string(&req)?;
        if let Err(e) = self.write_frame(&msg).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(Error::Connection(format!(
                "host '{}' closed the channel before responding to '{method}'",
                self.host
            ))),
            Err(_) => {
                // Cancel only this request; the channel stays usable.
                self.pending.lock().await.remove(&id);
                Err(Error::timeout(method, timeout))
            }
        }
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        let msg = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or(serde_json::json!({})),
        });
        self.write_frame(&serde_json::to_string(&msg)?).await
    }
}

// --- HTTP variant ---

/// Channel to a network host over streamable HTTP. Responses may arrive as
/// plain JSON or as an SSE stream whose `data:` lines carry the envelope.
pub struct HttpChannel {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    host: String,
}

impl HttpChannel {
    /// Builds the persistent HTTP client with the descriptor's static
    /// headers attached to every request.
    pub fn new(
        host: &str,
        url: &str,
        headers: &HashMap<String, String>,
        connect_timeout: Duration,
    ) -> Result<Self> {
        let mut header_map = reqwest::header::HeaderMap::new();
        for (key, val) in headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
                Error::Connection(format!("host '{host}': invalid header name '{key}': {e}"))
            })?;
            let value = reqwest::header::HeaderValue::from_str(val).map_err(|e| {
                Error::Connection(format!("host '{host}': invalid value for header '{key}': {e}"))
            })?;
            header_map.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(header_map)
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| Error::Connection(format!("host '{host}': failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.to_string(),
            client,
            next_id: AtomicU64::new(1),
            host: host.to_string(),
        })
    }

    async fn post(
        &self,
        body: &serde_json::Value,
        method: &str,
        timeout: Duration,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json, text/event-stream")
            .header("Content-Type", "application/json")
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::timeout(method, timeout)
                } else {
                    Error::Connection(format!("host '{}': {}", self.host, error_chain(&e)))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Connection(format!(
                "host '{}' returned status {status}: {body}",
                self.host
            )));
        }
        Ok(response)
    }

    async fn parse_response(&self, response: reqwest::Response) -> Result<JsonRpcResponse> {
        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("text/event-stream") {
            // SSE: accumulate chunks until a data line parses as an envelope.
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    Error::Connection(format!("host '{}': failed to read SSE chunk: {e}", self.host))
                })?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                for line in buffer.lines() {
                    if let Some(json_str) = line.strip_prefix("data: ") {
                        if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(json_str) {
                            return Ok(resp);
                        }
                    }
                }
            }

            Err(Error::Connection(format!(
                "host '{}': no JSON-RPC envelope in SSE response",
                self.host
            )))
        } else {
            response.json().await.map_err(|e| {
                Error::Connection(format!("host '{}': failed to parse response: {e}", self.host))
            })
        }
    }
}

#[async_trait]
impl Channel for HttpChannel {
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let req = JsonRpcRequest::new(id, method, params);
        let body = serde_json::to_value(&req)?;
        let response = self.post(&body, method, timeout).await?;
        self.parse_response(response).await
    }

    async fn notify(&self, method: &str, params: Option<serde_json::Value>) -> Result<()> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params.unwrap_or(serde_json::json!({})),
        });
        // Hosts answer notifications with 202 Accepted and an empty body.
        self.post(&body, method, Duration::from_secs(10)).await?;
        Ok(())
    }
}

/// Formats a reqwest error with its full source chain, which otherwise
/// hides the useful part (DNS failure, connection refused) behind
/// "error sending request".
fn error_chain(e: &reqwest::Error) -> String {
    let mut chain = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        chain.push_str(&format!(" -> {cause}"));
        source = cause.source();
    }
    chain
}
