//! Plugin Client Proxy Module
//!
//! Host-side façade over the RPC channel to one plugin process. The proxy
//! looks like a local plugin: each call marshals native values onto the
//! wire, awaits the child, and unmarshals the reply. It is stateless beyond
//! its channel reference and safe for concurrent use; a failed call never
//! mutates the proxy.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use thiserror::Error;
use tonic::transport::{Channel, Endpoint};
use tonic::{Code, Request, Status};

use crate::plugin_contract::{ApiRequest, ApiResponse, Manifest, MigrateOutcome};
use crate::plugin_rpc::{pb, PluginServiceClient};

/// Attempts made while the freshly spawned child finishes binding its
/// endpoint.
const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Deadline for the one-time `Migrate` call; schema creation may be slow.
const MIGRATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline for `Teardown`; the loader kills the child afterwards anyway.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for proxy calls.
#[derive(Error, Debug)]
pub enum ProxyError {
    /// The channel could not be established or has collapsed
    #[error("plugin channel unavailable: {0}")]
    Unavailable(#[from] tonic::transport::Error),

    /// The call's deadline expired or the caller went away
    #[error("plugin call cancelled or timed out")]
    Cancelled,

    /// The plugin answered with an RPC error
    #[error("plugin call failed: {0}")]
    Call(Status),
}

fn map_status(status: Status) -> ProxyError {
    match status.code() {
        Code::Cancelled | Code::DeadlineExceeded => ProxyError::Cancelled,
        _ => ProxyError::Call(status),
    }
}

/// The polymorphic handle the registry stores for a live plugin.
///
/// The production implementation is [`PluginProxy`]; tests may substitute
/// their own.
#[async_trait]
pub trait PluginHandle: Send + Sync {
    /// Fetch the plugin's self-description.
    async fn manifest(&self) -> Result<Manifest, ProxyError>;

    /// Run the plugin's migration hook against its database path.
    async fn migrate(&self, db_path: &Path) -> Result<MigrateOutcome, ProxyError>;

    /// Dispatch one REST call. Safe to invoke concurrently.
    async fn handle_api(&self, request: ApiRequest) -> Result<ApiResponse, ProxyError>;

    /// Fetch raw widget JSON for a dashboard slot.
    async fn widget_data(&self, slot: &str) -> Result<Vec<u8>, ProxyError>;

    /// Ask the plugin to release its resources before termination.
    async fn teardown(&self) -> Result<(), ProxyError>;
}

/// gRPC-backed [`PluginHandle`] over the channel negotiated at load time.
#[derive(Clone)]
pub struct PluginProxy {
    client: PluginServiceClient<Channel>,
    call_timeout: Duration,
}

impl PluginProxy {
    /// Connect to the endpoint a plugin advertised in its handshake.
    ///
    /// The child may still be binding when the host gets the handshake
    /// line, so the connection is retried a bounded number of times.
    pub async fn connect(address: &str, call_timeout: Duration) -> Result<Self, ProxyError> {
        let endpoint = Endpoint::from_shared(format!("http://{}", address))?;

        let mut attempt = 0;
        let channel = loop {
            match endpoint.connect().await {
                Ok(channel) => break channel,
                Err(err) => {
                    attempt += 1;
                    if attempt >= CONNECT_ATTEMPTS {
                        return Err(ProxyError::Unavailable(err));
                    }
                    debug!(
                        "plugin endpoint {} not ready (attempt {}): {}",
                        address, attempt, err
                    );
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        };

        Ok(Self {
            client: PluginServiceClient::new(channel),
            call_timeout,
        })
    }

    fn request<T>(&self, message: T, timeout: Duration) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(timeout);
        request
    }
}

#[async_trait]
impl PluginHandle for PluginProxy {
    async fn manifest(&self) -> Result<Manifest, ProxyError> {
        let mut client = self.client.clone();
        let reply = client
            .get_manifest(self.request(pb::Empty {}, self.call_timeout))
            .await
            .map_err(map_status)?;
        Ok(reply.into_inner().into())
    }

    async fn migrate(&self, db_path: &Path) -> Result<MigrateOutcome, ProxyError> {
        let mut client = self.client.clone();
        let message = pb::MigrateRequest {
            db_path: db_path.to_string_lossy().into_owned(),
        };
        let reply = client
            .migrate(self.request(message, MIGRATE_TIMEOUT))
            .await
            .map_err(map_status)?;
        Ok(reply.into_inner().into())
    }

    async fn handle_api(&self, request: ApiRequest) -> Result<ApiResponse, ProxyError> {
        let mut client = self.client.clone();
        let reply = client
            .handle_api(self.request(pb::ApiRequest::from(request), self.call_timeout))
            .await
            .map_err(map_status)?;
        Ok(reply.into_inner().into())
    }

    async fn widget_data(&self, slot: &str) -> Result<Vec<u8>, ProxyError> {
        let mut client = self.client.clone();
        let message = pb::WidgetRequest {
            slot: slot.to_owned(),
        };
        let reply = client
            .get_widget_data(self.request(message, self.call_timeout))
            .await
            .map_err(map_status)?;
        Ok(reply.into_inner().json)
    }

    async fn teardown(&self) -> Result<(), ProxyError> {
        let mut client = self.client.clone();
        client
            .teardown(self.request(pb::Empty {}, TEARDOWN_TIMEOUT))
            .await
            .map_err(map_status)?;
        Ok(())
    }
}
