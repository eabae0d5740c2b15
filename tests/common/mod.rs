//! Common test utilities and helpers for the Hearth plugin system tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};

use async_trait::async_trait;

use hearth_plugin_system::plugin_proxy::{PluginHandle, ProxyError};
use hearth_plugin_system::{ApiRequest, ApiResponse, Manifest, MigrateOutcome};

// Ensure test initialization happens only once
static INIT: Once = Once::new();

/// Initialize test logging.
pub fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// A manifest with the given id and sensible defaults.
pub fn sample_manifest(id: &str, name: &str, version: &str) -> Manifest {
    Manifest {
        id: id.to_owned(),
        name: name.to_owned(),
        version: version.to_owned(),
        description: format!("{} test plugin", name),
        icon: "application-x-addon-symbolic".to_owned(),
        color: "#3584e4".to_owned(),
        permissions: vec![],
    }
}

/// Create `{root}/{id}/` with a manifest and an executable `plugin` file.
///
/// `script` becomes the executable's contents; pass a shell script to
/// control what the child does during the handshake.
pub fn write_plugin_dir(root: &Path, id: &str, manifest_json: &str, script: &str) {
    let dir = root.join(id);
    std::fs::create_dir_all(&dir).expect("failed to create plugin dir");
    std::fs::write(dir.join("manifest.json"), manifest_json).expect("failed to write manifest");

    let executable = dir.join("plugin");
    std::fs::write(&executable, script).expect("failed to write plugin executable");

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755))
            .expect("failed to mark plugin executable");
    }
}

/// Manifest JSON for [`write_plugin_dir`].
pub fn manifest_json(id: &str, name: &str) -> String {
    format!(
        r#"{{"id": "{}", "name": "{}", "version": "1.0.0"}}"#,
        id, name
    )
}

/// A [`PluginHandle`] stub with canned replies that records the last API
/// request it saw.
pub struct StubHandle {
    pub manifest: Manifest,
    pub response: ApiResponse,
    pub widget_json: Vec<u8>,
    pub last_request: Mutex<Option<ApiRequest>>,
    pub teardown_calls: AtomicUsize,
}

impl StubHandle {
    pub fn new(id: &str) -> Self {
        Self {
            manifest: sample_manifest(id, id, "1.0.0"),
            response: ApiResponse {
                status_code: 200,
                body: b"{\"data\":null}".to_vec(),
                content_type: "application/json".to_owned(),
            },
            widget_json: b"{\"data\":null}".to_vec(),
            last_request: Mutex::new(None),
            teardown_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_response(mut self, response: ApiResponse) -> Self {
        self.response = response;
        self
    }
}

#[async_trait]
impl PluginHandle for StubHandle {
    async fn manifest(&self) -> Result<Manifest, ProxyError> {
        Ok(self.manifest.clone())
    }

    async fn migrate(&self, _db_path: &Path) -> Result<MigrateOutcome, ProxyError> {
        Ok(MigrateOutcome::ok(""))
    }

    async fn handle_api(&self, request: ApiRequest) -> Result<ApiResponse, ProxyError> {
        *self.last_request.lock().unwrap() = Some(request);
        Ok(self.response.clone())
    }

    async fn widget_data(&self, _slot: &str) -> Result<Vec<u8>, ProxyError> {
        Ok(self.widget_json.clone())
    }

    async fn teardown(&self) -> Result<(), ProxyError> {
        self.teardown_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A [`PluginHandle`] whose every call fails with an internal RPC error.
pub struct FailingHandle;

fn boom() -> ProxyError {
    ProxyError::Call(tonic::Status::internal("boom"))
}

#[async_trait]
impl PluginHandle for FailingHandle {
    async fn manifest(&self) -> Result<Manifest, ProxyError> {
        Err(boom())
    }

    async fn migrate(&self, _db_path: &Path) -> Result<MigrateOutcome, ProxyError> {
        Err(boom())
    }

    async fn handle_api(&self, _request: ApiRequest) -> Result<ApiResponse, ProxyError> {
        Err(boom())
    }

    async fn widget_data(&self, _slot: &str) -> Result<Vec<u8>, ProxyError> {
        Err(boom())
    }

    async fn teardown(&self) -> Result<(), ProxyError> {
        Err(boom())
    }
}
