//! Hearth Plugin System
//!
//! Plugin host runtime for the Hearth personal hub. Plugins are independent
//! executables loaded as child processes; the host negotiates an RPC channel
//! to each and routes inbound HTTP requests to the right plugin through it.
//! The same crate carries the SDK half used by plugin authors.

// Re-export main modules
pub mod config;
pub mod handshake;
pub mod http_api;
pub mod manifest;
pub mod plugin_contract;
pub mod plugin_loader;
pub mod plugin_proxy;
pub mod plugin_rpc;
pub mod plugin_sdk;
pub mod registry;

// Re-export common types
pub use config::{Config, ConfigError};
pub use manifest::{Manifest, ManifestError};
pub use plugin_contract::{ApiRequest, ApiResponse, MigrateOutcome};
pub use plugin_loader::{PluginLoadError, PluginLoader};
pub use plugin_proxy::{PluginHandle, PluginProxy, ProxyError};
pub use plugin_sdk::{serve_plugin, Plugin, PluginServeError};
pub use registry::{PluginRegistry, RegistryEntry};
