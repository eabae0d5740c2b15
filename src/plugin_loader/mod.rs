//! Plugin Loader Module
//!
//! Lifecycle manager for plugin processes: discovery on disk, child spawn,
//! handshake, proxy resolution, migration, registration, and the reverse
//! path for unload. Failures are contained per plugin; a broken candidate
//! never aborts its siblings.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tokio::time::timeout;

use crate::config::Config;
use crate::handshake::{HandshakeError, HandshakeLine, COOKIE_ENV_KEY, COOKIE_VALUE, PLUGIN_KIND};
use crate::manifest::{Manifest, ManifestError, MANIFEST_FILE};
use crate::plugin_proxy::{PluginHandle, PluginProxy, ProxyError};
use crate::registry::{ChildHandle, PluginRegistry};

/// File name of the plugin executable inside a plugin directory.
pub const PLUGIN_EXECUTABLE: &str = "plugin";

/// How long the loader waits for the child's handshake line.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `Teardown` may run before the child is killed regardless.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for plugin load operations.
#[derive(Error, Debug)]
pub enum PluginLoadError {
    /// The on-disk manifest was missing, unreadable, or invalid
    #[error("invalid manifest for plugin '{id}': {source}")]
    ManifestInvalid {
        id: String,
        #[source]
        source: ManifestError,
    },

    /// The plugin's data directory could not be prepared
    #[error("failed to prepare data directory for plugin '{id}': {source}")]
    DataDirError {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// The plugin executable could not be spawned
    #[error("failed to spawn plugin '{id}': {source}")]
    SpawnFailed {
        id: String,
        #[source]
        source: std::io::Error,
    },

    /// The handshake did not complete or did not verify
    #[error("handshake with plugin '{id}' failed: {reason}")]
    HandshakeFailed { id: String, reason: String },

    /// The child advertised a plugin kind the host does not dispense
    #[error("plugin '{id}' advertised kind '{kind}', expected '{expected}'")]
    ContractMismatch {
        id: String,
        kind: String,
        expected: &'static str,
    },

    /// The RPC channel could not be established
    #[error("RPC channel to plugin '{id}' unavailable: {source}")]
    RpcUnavailable {
        id: String,
        #[source]
        source: ProxyError,
    },

    /// The plugin's migration hook failed; the plugin was unloaded
    #[error("migration for plugin '{id}' failed: {message}")]
    MigrationFailed { id: String, message: String },
}

/// Loader and lifecycle manager for the plugin directory.
pub struct PluginLoader {
    config: Config,
    registry: Arc<PluginRegistry>,
}

impl PluginLoader {
    /// Create a loader over the shared registry.
    pub fn new(config: Config, registry: Arc<PluginRegistry>) -> Self {
        Self { config, registry }
    }

    /// Scan the plugin directory for candidate ids.
    ///
    /// Each immediate subdirectory is a candidate; it is valid iff it
    /// contains an executable named `plugin` and a readable manifest file.
    /// Invalid candidates are logged and skipped. An empty or missing
    /// directory is not an error.
    pub fn discover(&self) -> Vec<String> {
        let plugin_dir = &self.config.plugin_dir;

        let entries = match std::fs::read_dir(plugin_dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    "plugin directory {} is not readable ({}); starting with no plugins",
                    plugin_dir.display(),
                    err
                );
                return Vec::new();
            }
        };

        let mut candidates = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let id = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_owned(),
                None => continue,
            };

            let executable = path.join(PLUGIN_EXECUTABLE);
            if !is_executable(&executable) {
                warn!(
                    "skipping plugin candidate '{}': no executable named '{}'",
                    id, PLUGIN_EXECUTABLE
                );
                continue;
            }

            if !path.join(MANIFEST_FILE).is_file() {
                warn!("skipping plugin candidate '{}': no {}", id, MANIFEST_FILE);
                continue;
            }

            candidates.push(id);
        }

        candidates.sort();
        candidates
    }

    /// Run the full load sequence for one plugin id.
    pub async fn load_plugin(&self, id: &str) -> Result<(), PluginLoadError> {
        let plugin_path = self.config.plugin_dir.join(id);

        // 1. Parse the on-disk manifest.
        let manifest =
            Manifest::load(&plugin_path, id).map_err(|source| PluginLoadError::ManifestInvalid {
                id: id.to_owned(),
                source,
            })?;

        // 2. Ensure the plugin's data directory exists.
        let data_dir = self.config.plugin_data_dir(id);
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|source| PluginLoadError::DataDirError {
                id: id.to_owned(),
                source,
            })?;

        // 3. Spawn the executable with the handshake cookie injected.
        let mut child = Command::new(plugin_path.join(PLUGIN_EXECUTABLE))
            .current_dir(&plugin_path)
            .env(COOKIE_ENV_KEY, COOKIE_VALUE)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PluginLoadError::SpawnFailed {
                id: id.to_owned(),
                source,
            })?;

        // 4. Read and verify the handshake line.
        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            return Err(handshake_failure(
                id,
                "child stdout was not captured".to_owned(),
            ));
        };
        let mut stdout_reader = BufReader::new(stdout);
        let handshake = match read_handshake(id, &mut stdout_reader).await {
            Ok(handshake) => handshake,
            Err(err) => {
                let _ = child.start_kill();
                return Err(err);
            }
        };

        // 5. Dispense the advertised plugin kind.
        if handshake.kind != PLUGIN_KIND {
            let _ = child.start_kill();
            return Err(PluginLoadError::ContractMismatch {
                id: id.to_owned(),
                kind: handshake.kind,
                expected: PLUGIN_KIND,
            });
        }

        // The handshake line has been consumed; everything else the child
        // prints goes to the host log.
        forward_child_logs(id, stdout_reader, child.stderr.take());

        let proxy = match PluginProxy::connect(&handshake.address, self.config.call_timeout).await {
            Ok(proxy) => proxy,
            Err(source) => {
                let _ = child.start_kill();
                return Err(PluginLoadError::RpcUnavailable {
                    id: id.to_owned(),
                    source,
                });
            }
        };

        // 6. Publish the entry, then attach the proxy.
        let handle = Arc::new(ChildHandle::new(child));
        self.registry.register(id, Some(handle), manifest);
        self.registry.attach_proxy(id, Arc::new(proxy.clone()));

        // 7. Trigger the one-time migration.
        let db_path = self.config.plugin_db_path(id);
        match proxy.migrate(&db_path).await {
            Ok(outcome) if outcome.success => {
                if !outcome.message.is_empty() {
                    debug!("plugin '{}' migration: {}", id, outcome.message);
                }
            }
            Ok(outcome) => {
                self.unload_plugin(id).await;
                return Err(PluginLoadError::MigrationFailed {
                    id: id.to_owned(),
                    message: outcome.message,
                });
            }
            Err(err) => {
                self.unload_plugin(id).await;
                return Err(PluginLoadError::MigrationFailed {
                    id: id.to_owned(),
                    message: err.to_string(),
                });
            }
        }

        // 8. Live.
        info!("plugin '{}' is live", id);
        Ok(())
    }

    /// Run the unload sequence for one plugin id. Unloading an absent
    /// plugin is an idempotent success.
    pub async fn unload_plugin(&self, id: &str) {
        // 9. Look up the entry.
        let entry = match self.registry.get(id) {
            Some(entry) => entry,
            None => {
                debug!("plugin '{}' is not loaded; nothing to unload", id);
                return;
            }
        };

        // 10. Bounded teardown; its failure never blocks termination.
        if let Some(proxy) = entry.proxy {
            match timeout(TEARDOWN_TIMEOUT, proxy.teardown()).await {
                Ok(Ok(())) => debug!("plugin '{}' tore down cleanly", id),
                Ok(Err(err)) => warn!("teardown for plugin '{}' failed: {}", id, err),
                Err(_) => warn!("teardown for plugin '{}' timed out", id),
            }
        }

        // 11/12. Remove the entry; unregister terminates the child.
        self.registry.unregister(id);
        info!("plugin '{}' unloaded", id);
    }

    /// Unload then load the same id. Between the two steps the registry
    /// entry is absent and routed calls observe the plugin as unavailable;
    /// requests are deliberately not queued across the gap. A failed load
    /// leaves the plugin absent, not rolled back.
    pub async fn reload_plugin(&self, id: &str) -> Result<(), PluginLoadError> {
        self.unload_plugin(id).await;
        self.load_plugin(id).await
    }

    /// Load every candidate in the plugin directory. Failures are
    /// per-plugin and never abort the batch. Returns the number of plugins
    /// that came up live.
    pub async fn load_all(&self) -> usize {
        let candidates = self.discover();
        if candidates.is_empty() {
            warn!(
                "no plugin candidates found in {}",
                self.config.plugin_dir.display()
            );
            return 0;
        }

        let mut loaded = 0;
        for id in &candidates {
            match self.load_plugin(id).await {
                Ok(()) => loaded += 1,
                Err(err) => error!("failed to load plugin '{}': {}", id, err),
            }
        }

        info!("{}/{} plugin(s) loaded", loaded, candidates.len());
        loaded
    }

    /// Unload every registered plugin; runs at host shutdown.
    pub async fn unload_all(&self) {
        for id in self.registry.ids() {
            self.unload_plugin(&id).await;
        }
    }
}

async fn read_handshake(
    id: &str,
    reader: &mut BufReader<ChildStdout>,
) -> Result<HandshakeLine, PluginLoadError> {
    let mut line = String::new();

    let read = timeout(HANDSHAKE_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| handshake_failure(id, "timed out waiting for handshake".to_owned()))?
        .map_err(|err| handshake_failure(id, format!("failed to read handshake: {}", err)))?;

    if read == 0 {
        return Err(handshake_failure(
            id,
            "plugin exited before the handshake".to_owned(),
        ));
    }

    let handshake = HandshakeLine::parse(&line).map_err(|err: HandshakeError| {
        handshake_failure(id, err.to_string())
    })?;
    handshake
        .verify()
        .map_err(|err| handshake_failure(id, err.to_string()))?;

    Ok(handshake)
}

fn handshake_failure(id: &str, reason: String) -> PluginLoadError {
    PluginLoadError::HandshakeFailed {
        id: id.to_owned(),
        reason,
    }
}

/// Forward a child's post-handshake stdout and stderr into the host log,
/// line by line, under a per-plugin target.
fn forward_child_logs(id: &str, stdout: BufReader<ChildStdout>, stderr: Option<ChildStderr>) {
    let target = format!("plugins::{}", id);

    {
        let target = target.clone();
        tokio::spawn(async move {
            let mut lines = stdout.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: target.as_str(), "{}", line);
            }
        });
    }

    if let Some(stderr) = stderr {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: target.as_str(), "{}", line);
            }
        });
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };

    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }

    #[cfg(not(unix))]
    true
}
