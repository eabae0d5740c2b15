//! Registry Module
//!
//! Process-wide, thread-safe directory of live plugins. An entry exists iff
//! a child is expected to be alive; there is no "registered but dead"
//! state. The registry is the single source of truth for routing.
//!
//! Reads proceed in parallel under a readers-writer lock; writes are
//! serialized. The lock is held only for the map mutation: terminating a
//! child happens after the entry has left the map.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::process::Child;

use crate::manifest::Manifest;
use crate::plugin_proxy::PluginHandle;

/// Owning handle to a plugin child process, sufficient to terminate it.
///
/// The loader is the only component that creates one; everything else
/// reaches it through [`PluginRegistry::unregister`].
pub struct ChildHandle {
    inner: Mutex<Option<Child>>,
}

impl ChildHandle {
    /// Wrap a spawned child.
    pub fn new(child: Child) -> Self {
        Self {
            inner: Mutex::new(Some(child)),
        }
    }

    /// OS process id, while the child has not been terminated.
    pub fn id(&self) -> Option<u32> {
        self.inner.lock().unwrap().as_ref().and_then(|c| c.id())
    }

    /// Kill the child. Idempotent; the exit status is reaped in the
    /// background when a runtime is available.
    pub fn terminate(&self) {
        if let Some(mut child) = self.inner.lock().unwrap().take() {
            if let Err(err) = child.start_kill() {
                warn!("failed to kill plugin child process: {}", err);
            }
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = child.wait().await;
                });
            }
        }
    }
}

/// A live plugin: child handle for termination, proxy for dispatch,
/// manifest for listing.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Handle to the child process, when one is owned.
    pub child: Option<Arc<ChildHandle>>,
    /// Dispatch proxy; absent only during the pre-handshake window.
    pub proxy: Option<Arc<dyn PluginHandle>>,
    /// Manifest parsed from disk at load time.
    pub manifest: Manifest,
    /// When the entry was registered.
    pub loaded_at: DateTime<Utc>,
}

/// Thread-safe map from plugin id to its live entry.
#[derive(Default)]
pub struct PluginRegistry {
    entries: RwLock<HashMap<String, RegistryEntry>>,
}

impl PluginRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry for `id`, overwriting any existing one.
    ///
    /// Overwrite is deliberate: a reload produces a new entry before the
    /// old one is fully retired. Terminating a displaced child is the
    /// caller's responsibility; `register` performs no I/O.
    pub fn register(&self, id: &str, child: Option<Arc<ChildHandle>>, manifest: Manifest) {
        let entry = RegistryEntry {
            child,
            proxy: None,
            manifest,
            loaded_at: Utc::now(),
        };

        let replaced = self
            .entries
            .write()
            .unwrap()
            .insert(id.to_owned(), entry)
            .is_some();

        if replaced {
            debug!("registry entry for plugin '{}' overwritten", id);
        }
    }

    /// Attach the dispatch proxy to an existing entry. Returns false when
    /// no entry exists for `id`.
    pub fn attach_proxy(&self, id: &str, proxy: Arc<dyn PluginHandle>) -> bool {
        match self.entries.write().unwrap().get_mut(id) {
            Some(entry) => {
                entry.proxy = Some(proxy);
                true
            }
            None => false,
        }
    }

    /// Look up the entry for `id`.
    pub fn get(&self, id: &str) -> Option<RegistryEntry> {
        self.entries.read().unwrap().get(id).cloned()
    }

    /// Snapshot of the current manifests. Ordering is unspecified.
    pub fn list(&self) -> Vec<Manifest> {
        self.entries
            .read()
            .unwrap()
            .values()
            .map(|entry| entry.manifest.clone())
            .collect()
    }

    /// Snapshot of the currently registered ids.
    pub fn ids(&self) -> Vec<String> {
        self.entries.read().unwrap().keys().cloned().collect()
    }

    /// Remove the entry for `id` and terminate its child if a handle is
    /// present. Unknown ids are a no-op, never an error.
    pub fn unregister(&self, id: &str) -> bool {
        let removed = self.entries.write().unwrap().remove(id);

        match removed {
            Some(entry) => {
                if let Some(child) = entry.child {
                    child.terminate();
                }
                true
            }
            None => false,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}
