#![allow(clippy::unwrap_used, clippy::expect_used)]

//! HTTP transport tests against a mock streamable-HTTP host.

use std::collections::HashMap;
use std::time::Duration;
use toolbind_core::{Error, HostDescriptor, HostTransport};
use toolbind_mcp::transport::open_channel;
use toolbind_mcp::introspect;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(2);

fn http_descriptor(server: &MockServer, headers: HashMap<String, String>) -> HostDescriptor {
    HostDescriptor {
        name: "mock".to_string(),
        transport: HostTransport::Http {
            url: format!("{}/mcp", server.uri()),
            headers,
        },
    }
}

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "result": result,
    }))
}

async fn mount_handshake(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({"method": "initialize"})))
        .respond_with(rpc_result(serde_json::json!({
            "protocolVersion": "2025-06-18",
            "capabilities": {"tools": {}},
            "serverInfo": {"name": "mock-host", "version": "1.0"},
            "instructions": "Prefer batch endpoints.",
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(
            serde_json::json!({"method": "notifications/initialized"}),
        ))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_introspect_over_http() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
        .respond_with(rpc_result(serde_json::json!({
            "tools": [
                {"name": "search", "description": "Search things",
                 "inputSchema": {"type": "object", "properties": {"query": {"type": "string"}}}},
                {"name": "fetch", "description": "Fetch one thing"},
            ],
        })))
        .mount(&server)
        .await;

    let descriptor = http_descriptor(&server, HashMap::new());
    let channel = open_channel(&descriptor, TIMEOUT).await.unwrap();
    let catalog = introspect::introspect(channel.as_ref(), TIMEOUT).await.unwrap();

    assert_eq!(catalog.tools.len(), 2);
    assert_eq!(catalog.tools[0].name, "search");
    assert_eq!(catalog.instructions.as_deref(), Some("Prefer batch endpoints."));
}

#[tokio::test]
async fn test_tools_list_follows_pagination_cursor() {
    let server = MockServer::start().await;
    mount_handshake(&server).await;

    // The cursor-bearing second page must match before the generic page.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(
            serde_json::json!({"method": "tools/list", "params": {"cursor": "page-2"}}),
        ))
        .respond_with(rpc_result(serde_json::json!({
            "tools": [{"name": "second"}],
        })))
        .with_priority(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
        .respond_with(rpc_result(serde_json::json!({
            "tools": [{"name": "first"}],
            "nextCursor": "page-2",
        })))
        .mount(&server)
        .await;

    let descriptor = http_descriptor(&server, HashMap::new());
    let channel = open_channel(&descriptor, TIMEOUT).await.unwrap();
    let tools = introspect::list_tools(channel.as_ref(), TIMEOUT).await.unwrap();

    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["first", "second"]);
}

#[tokio::test]
async fn test_static_headers_attached_to_every_request() {
    let server = MockServer::start().await;

    // Only requests carrying the configured bearer header match.
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer sekrit"))
        .and(body_partial_json(serde_json::json!({"method": "initialize"})))
        .respond_with(rpc_result(serde_json::json!({
            "protocolVersion": "2025-06-18",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(header("authorization", "Bearer sekrit"))
        .and(body_partial_json(
            serde_json::json!({"method": "notifications/initialized"}),
        ))
        .respond_with(ResponseTemplate::new(202))
        .mount(&server)
        .await;

    let mut headers = HashMap::new();
    headers.insert("Authorization".to_string(), "Bearer sekrit".to_string());
    let descriptor = http_descriptor(&server, headers);
    let channel = open_channel(&descriptor, TIMEOUT).await.unwrap();

    let init = introspect::handshake(channel.as_ref(), TIMEOUT).await.unwrap();
    assert_eq!(init.protocol_version, "2025-06-18");
}

#[tokio::test]
async fn test_sse_response_is_parsed() {
    let server = MockServer::start().await;

    let sse_body = concat!(
        "event: message\n",
        "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[{\"name\":\"streamed\"}]}}\n",
        "\n",
    );
    Mock::given(method("POST"))
        .and(path("/mcp"))
        .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_body.as_bytes(), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let descriptor = http_descriptor(&server, HashMap::new());
    let channel = open_channel(&descriptor, TIMEOUT).await.unwrap();
    let tools = introspect::list_tools(channel.as_ref(), TIMEOUT).await.unwrap();

    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "streamed");
}

#[tokio::test]
async fn test_slow_host_surfaces_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/mcp"))
        .respond_with(
            rpc_result(serde_json::json!({"protocolVersion": "2025-06-18"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let descriptor = http_descriptor(&server, HashMap::new());
    let channel = open_channel(&descriptor, TIMEOUT).await.unwrap();

    let err = channel
        .request("initialize", None, Duration::from_millis(100))
        .await
        .unwrap_err();
    match err {
        Error::Timeout { operation, ms } => {
            assert_eq!(operation, "initialize");
            assert_eq!(ms, 100);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_endpoint_is_connection_error() {
    // Port 1 on localhost: nothing listens there.
    let descriptor = HostDescriptor {
        name: "unreachable".to_string(),
        transport: HostTransport::Http {
            url: "http://127.0.0.1:1/mcp".to_string(),
            headers: HashMap::new(),
        },
    };
    let channel = open_channel(&descriptor, Duration::from_millis(200)).await.unwrap();

    let err = channel
        .request("initialize", None, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_) | Error::Timeout { .. }));
}
