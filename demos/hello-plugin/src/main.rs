//! Minimal Hearth plugin: greets over the REST proxy and fills one
//! dashboard widget slot.
//!
//! Install by copying the built `plugin` binary and `manifest.json` into
//! `{pluginDir}/hello/`.

use std::path::Path;

use async_trait::async_trait;
use log::info;
use serde_json::json;

use hearth_plugin_system::plugin_sdk::{serve_plugin, Plugin};
use hearth_plugin_system::{ApiRequest, ApiResponse, Manifest, MigrateOutcome};

struct HelloPlugin;

#[async_trait]
impl Plugin for HelloPlugin {
    fn manifest(&self) -> Manifest {
        Manifest {
            id: "hello".to_owned(),
            name: "Hello".to_owned(),
            version: "0.1.0".to_owned(),
            description: "Says hello".to_owned(),
            icon: "face-smile-symbolic".to_owned(),
            color: "#33d17a".to_owned(),
            permissions: vec![],
        }
    }

    async fn migrate(&self, db_path: &Path) -> MigrateOutcome {
        // This plugin keeps no state; touching the file is enough to show
        // the hook ran.
        match tokio::fs::File::create(db_path).await {
            Ok(_) => MigrateOutcome::ok("database initialized"),
            Err(err) => MigrateOutcome::failed(format!("could not create database: {}", err)),
        }
    }

    async fn handle_api(&self, request: ApiRequest) -> ApiResponse {
        match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/greeting") => {
                let name = request
                    .query
                    .get("name")
                    .map(String::as_str)
                    .unwrap_or("world");
                ApiResponse::ok(json!({ "greeting": format!("hello, {}!", name) }))
            }
            _ => ApiResponse::error(404, "NOT_FOUND", "no such route"),
        }
    }

    async fn widget_data(&self, slot: &str) -> Option<serde_json::Value> {
        match slot {
            "hello-widget" => Some(json!({ "data": { "greeting": "hello from the dashboard" } })),
            _ => None,
        }
    }

    async fn teardown(&self) {
        info!("hello plugin shutting down");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    serve_plugin(HelloPlugin).await?;
    Ok(())
}
