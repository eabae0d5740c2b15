//! In-process round trips through the server shim and the client proxy:
//! the same wire path a real child process serves, minus the spawn.

mod common;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use hearth_plugin_system::plugin_proxy::{PluginHandle, PluginProxy, ProxyError};
use hearth_plugin_system::plugin_rpc::PluginServiceServer;
use hearth_plugin_system::plugin_sdk::{Plugin, PluginShim};
use hearth_plugin_system::{ApiRequest, ApiResponse, Manifest, MigrateOutcome};

use common::{sample_manifest, setup};

struct EchoPlugin;

#[async_trait]
impl Plugin for EchoPlugin {
    fn manifest(&self) -> Manifest {
        sample_manifest("echo", "Echo", "1.0.0")
    }

    async fn migrate(&self, db_path: &Path) -> MigrateOutcome {
        MigrateOutcome::ok(format!("migrated at {}", db_path.display()))
    }

    async fn handle_api(&self, request: ApiRequest) -> ApiResponse {
        if request.path == "/panic" {
            panic!("the implementation fell over");
        }

        ApiResponse::json(
            200,
            &json!({
                "method": request.method,
                "path": request.path,
                "body_len": request.body.len(),
                "query": request.query,
            }),
        )
    }

    async fn widget_data(&self, slot: &str) -> Option<serde_json::Value> {
        match slot {
            "known" => Some(json!({ "data": { "count": 7 } })),
            _ => None,
        }
    }
}

/// Serve a plugin over a local listener, exactly as a child process would
/// after its handshake.
async fn start_plugin_server<P: Plugin>(plugin: P) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("local addr").to_string();
    let (shim, shutdown_rx) = PluginShim::new(plugin);

    let server = tokio::spawn(async move {
        Server::builder()
            .add_service(PluginServiceServer::new(shim))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                shutdown_rx.await.ok();
            })
            .await
            .expect("plugin server should run");
    });

    (address, server)
}

async fn connect(address: &str) -> PluginProxy {
    PluginProxy::connect(address, Duration::from_secs(5))
        .await
        .expect("proxy should connect")
}

#[tokio::test]
async fn test_manifest_round_trip() {
    setup();
    let (address, _server) = start_plugin_server(EchoPlugin).await;
    let proxy = connect(&address).await;

    let manifest = proxy.manifest().await.expect("manifest call");

    assert_eq!(manifest.id, "echo");
    assert_eq!(manifest.version, "1.0.0");
}

#[tokio::test]
async fn test_migrate_round_trip() {
    let (address, _server) = start_plugin_server(EchoPlugin).await;
    let proxy = connect(&address).await;

    let outcome = proxy
        .migrate(Path::new("/tmp/echo/db.sqlite"))
        .await
        .expect("migrate call");

    assert!(outcome.success);
    assert!(outcome.message.contains("/tmp/echo/db.sqlite"));
}

#[tokio::test]
async fn test_api_call_round_trip() {
    let (address, _server) = start_plugin_server(EchoPlugin).await;
    let proxy = connect(&address).await;

    let mut query = HashMap::new();
    query.insert("page".to_owned(), "3".to_owned());

    let response = proxy
        .handle_api(ApiRequest {
            method: "POST".to_owned(),
            path: "/entries".to_owned(),
            body: vec![0u8; 64],
            query,
        })
        .await
        .expect("api call");

    assert_eq!(response.status_code, 200);
    assert_eq!(response.content_type, "application/json");
    let value: serde_json::Value = serde_json::from_slice(&response.body).expect("json body");
    assert_eq!(value["method"], "POST");
    assert_eq!(value["path"], "/entries");
    assert_eq!(value["body_len"], 64);
    assert_eq!(value["query"]["page"], "3");
}

#[tokio::test]
async fn test_concurrent_api_calls() {
    let (address, _server) = start_plugin_server(EchoPlugin).await;
    let proxy = connect(&address).await;

    let mut calls = Vec::new();
    for k in 0..10 {
        let proxy = proxy.clone();
        calls.push(tokio::spawn(async move {
            proxy
                .handle_api(ApiRequest {
                    method: "GET".to_owned(),
                    path: format!("/item/{}", k),
                    body: Vec::new(),
                    query: HashMap::new(),
                })
                .await
        }));
    }

    for call in calls {
        let response = call.await.expect("join").expect("api call");
        assert_eq!(response.status_code, 200);
    }
}

#[tokio::test]
async fn test_widget_slots() {
    let (address, _server) = start_plugin_server(EchoPlugin).await;
    let proxy = connect(&address).await;

    let known = proxy.widget_data("known").await.expect("widget call");
    let value: serde_json::Value = serde_json::from_slice(&known).expect("json");
    assert_eq!(value["data"]["count"], 7);

    // Unknown slots succeed with a null payload.
    let unknown = proxy.widget_data("nope").await.expect("widget call");
    let value: serde_json::Value = serde_json::from_slice(&unknown).expect("json");
    assert_eq!(value, json!({ "data": null }));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let (address, _server) = start_plugin_server(EchoPlugin).await;
    let proxy = connect(&address).await;

    let result = proxy
        .handle_api(ApiRequest {
            method: "GET".to_owned(),
            path: "/panic".to_owned(),
            body: Vec::new(),
            query: HashMap::new(),
        })
        .await;

    // The panic surfaces as an RPC error...
    match result {
        Err(ProxyError::Call(status)) => {
            assert_eq!(status.code(), tonic::Code::Internal);
        }
        other => panic!("expected an internal RPC error, got {:?}", other),
    }

    // ...and the shim keeps serving afterwards.
    let response = proxy
        .handle_api(ApiRequest {
            method: "GET".to_owned(),
            path: "/still-alive".to_owned(),
            body: Vec::new(),
            query: HashMap::new(),
        })
        .await
        .expect("follow-up call");
    assert_eq!(response.status_code, 200);
}

#[tokio::test]
async fn test_teardown_stops_the_server() {
    let (address, server) = start_plugin_server(EchoPlugin).await;
    let proxy = connect(&address).await;

    proxy.teardown().await.expect("teardown call");

    // The serve loop exits once teardown has been answered.
    server.await.expect("server should exit cleanly");

    // Further calls can no longer reach the plugin.
    let result = proxy.manifest().await;
    assert!(result.is_err());
}
