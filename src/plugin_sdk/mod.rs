//! Plugin SDK Module
//!
//! The child-side half of the contract: the [`Plugin`] trait plugin authors
//! implement, the [`PluginShim`] that serves it over the RPC channel, and
//! [`serve_plugin`], the entry point a plugin executable calls from `main`.
//!
//! The shim rehydrates wire messages into native values, invokes the
//! implementation, and marshals results back. A panic inside the
//! implementation is translated into an RPC error; it never crashes the
//! child.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info};
use thiserror::Error;
use tokio::io::{stdout, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinError;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use crate::handshake::{self, HandshakeError, HandshakeLine};
use crate::plugin_contract::{ApiRequest, ApiResponse, Manifest, MigrateOutcome};
use crate::plugin_rpc::{pb, PluginService, PluginServiceServer};

/// Error type for running a plugin process.
#[derive(Error, Debug)]
pub enum PluginServeError {
    /// The handshake environment was missing or wrong
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Failed to bind or write the handshake
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The RPC server failed
    #[error("RPC server error: {0}")]
    Transport(#[from] tonic::transport::Error),
}

/// The contract a plugin implements.
///
/// `handle_api` and `widget_data` may be called concurrently; the plugin is
/// responsible for internal serialization if its state demands it.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// The plugin's self-description. Must be pure and fast; the host may
    /// ask at any time.
    fn manifest(&self) -> Manifest;

    /// One-time migration hook, invoked before any other call. `db_path`
    /// points at the plugin's private database file; the plugin may create
    /// schema, seed data, and open handles.
    async fn migrate(&self, db_path: &Path) -> MigrateOutcome;

    /// Serve one REST call. A non-2xx response is a normal return.
    async fn handle_api(&self, request: ApiRequest) -> ApiResponse;

    /// Produce dashboard widget JSON for a slot. The returned value is
    /// forwarded to the dashboard verbatim; an unknown slot should return
    /// `None`, which the shim renders as `{"data": null}`.
    async fn widget_data(&self, _slot: &str) -> Option<serde_json::Value> {
        None
    }

    /// Release resources; the process exits shortly after this returns.
    async fn teardown(&self) {}
}

/// Server shim bridging the wire contract onto a [`Plugin`] implementation.
pub struct PluginShim<P: Plugin> {
    plugin: Arc<P>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl<P: Plugin> PluginShim<P> {
    /// Wrap a plugin. The returned receiver resolves once `Teardown` has
    /// been served and the process should exit.
    pub fn new(plugin: P) -> (Self, oneshot::Receiver<()>) {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        (
            Self {
                plugin: Arc::new(plugin),
                shutdown: Mutex::new(Some(shutdown_tx)),
            },
            shutdown_rx,
        )
    }
}

fn join_to_status(err: JoinError) -> Status {
    if err.is_panic() {
        error!("plugin implementation panicked while serving a call");
        Status::internal("plugin implementation panicked")
    } else {
        Status::cancelled("plugin task was cancelled")
    }
}

#[tonic::async_trait]
impl<P: Plugin> PluginService for PluginShim<P> {
    async fn get_manifest(
        &self,
        _request: Request<pb::Empty>,
    ) -> Result<Response<pb::Manifest>, Status> {
        Ok(Response::new(self.plugin.manifest().into()))
    }

    async fn migrate(
        &self,
        request: Request<pb::MigrateRequest>,
    ) -> Result<Response<pb::MigrateResult>, Status> {
        let plugin = self.plugin.clone();
        let db_path = PathBuf::from(request.into_inner().db_path);

        let outcome = tokio::spawn(async move { plugin.migrate(&db_path).await })
            .await
            .map_err(join_to_status)?;

        Ok(Response::new(outcome.into()))
    }

    async fn handle_api(
        &self,
        request: Request<pb::ApiRequest>,
    ) -> Result<Response<pb::ApiResponse>, Status> {
        let plugin = self.plugin.clone();
        let api_request = ApiRequest::from(request.into_inner());

        let response = tokio::spawn(async move { plugin.handle_api(api_request).await })
            .await
            .map_err(join_to_status)?;

        Ok(Response::new(response.into()))
    }

    async fn get_widget_data(
        &self,
        request: Request<pb::WidgetRequest>,
    ) -> Result<Response<pb::WidgetData>, Status> {
        let plugin = self.plugin.clone();
        let slot = request.into_inner().slot;

        let value = tokio::spawn(async move { plugin.widget_data(&slot).await })
            .await
            .map_err(join_to_status)?;

        let json = match value {
            Some(value) => value.to_string().into_bytes(),
            None => serde_json::json!({ "data": null }).to_string().into_bytes(),
        };

        Ok(Response::new(pb::WidgetData { json }))
    }

    async fn teardown(&self, _request: Request<pb::Empty>) -> Result<Response<pb::Empty>, Status> {
        let plugin = self.plugin.clone();

        tokio::spawn(async move { plugin.teardown().await })
            .await
            .map_err(join_to_status)?;

        // Fire the shutdown signal; the server finishes in-flight calls,
        // including this one, then exits.
        if let Some(shutdown_tx) = self.shutdown.lock().await.take() {
            let _ = shutdown_tx.send(());
        }

        Ok(Response::new(pb::Empty {}))
    }
}

/// Run a plugin process: verify the handshake environment, bind an
/// ephemeral endpoint, emit the handshake line on stdout, and serve the
/// contract until the host calls `Teardown`.
pub async fn serve_plugin<P: Plugin>(plugin: P) -> Result<(), PluginServeError> {
    // A child started without the host cookie must refuse to serve.
    handshake::check_child_environment()?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let address = listener.local_addr()?;

    let (shim, shutdown_rx) = PluginShim::new(plugin);

    let line = HandshakeLine::for_address(address.to_string());
    let mut out = stdout();
    out.write_all(line.emit().as_bytes()).await?;
    out.flush().await?;

    info!("plugin serving on {}", address);

    Server::builder()
        .add_service(PluginServiceServer::new(shim))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
            shutdown_rx.await.ok();
        })
        .await?;

    info!("plugin torn down, exiting");
    Ok(())
}
