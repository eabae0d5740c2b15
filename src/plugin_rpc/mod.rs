//! Plugin RPC Module
//!
//! Generated wire types for the `hearth.plugin.v1` contract and the
//! conversions between them and the native contract types.
//!
//! Field numbers in the schema are frozen; adding a capability requires a
//! protocol-version bump in the handshake, never renumbering.

use crate::plugin_contract::{ApiRequest, ApiResponse, Manifest, MigrateOutcome};

/// Generated protobuf and tonic code.
pub mod pb {
    #![allow(clippy::all)]
    tonic::include_proto!("hearth.plugin.v1");
}

pub use pb::plugin_service_client::PluginServiceClient;
pub use pb::plugin_service_server::{PluginService, PluginServiceServer};

impl From<pb::Manifest> for Manifest {
    fn from(wire: pb::Manifest) -> Self {
        Self {
            id: wire.id,
            name: wire.name,
            version: wire.version,
            description: wire.description,
            icon: wire.icon,
            color: wire.color,
            permissions: wire.permissions,
        }
    }
}

impl From<Manifest> for pb::Manifest {
    fn from(manifest: Manifest) -> Self {
        Self {
            id: manifest.id,
            name: manifest.name,
            version: manifest.version,
            description: manifest.description,
            icon: manifest.icon,
            color: manifest.color,
            permissions: manifest.permissions,
        }
    }
}

impl From<pb::ApiRequest> for ApiRequest {
    fn from(wire: pb::ApiRequest) -> Self {
        Self {
            method: wire.method,
            path: wire.path,
            body: wire.body,
            query: wire.query,
        }
    }
}

impl From<ApiRequest> for pb::ApiRequest {
    fn from(request: ApiRequest) -> Self {
        Self {
            method: request.method,
            path: request.path,
            body: request.body,
            query: request.query,
        }
    }
}

impl From<pb::ApiResponse> for ApiResponse {
    fn from(wire: pb::ApiResponse) -> Self {
        Self {
            // proto3 carries the status as i32; anything outside the HTTP
            // range is reported as a server error rather than truncated.
            status_code: u16::try_from(wire.status_code).unwrap_or(500),
            body: wire.body,
            content_type: wire.content_type,
        }
    }
}

impl From<ApiResponse> for pb::ApiResponse {
    fn from(response: ApiResponse) -> Self {
        Self {
            status_code: i32::from(response.status_code),
            body: response.body,
            content_type: response.content_type,
        }
    }
}

impl From<pb::MigrateResult> for MigrateOutcome {
    fn from(wire: pb::MigrateResult) -> Self {
        Self {
            success: wire.success,
            message: wire.message,
        }
    }
}

impl From<MigrateOutcome> for pb::MigrateResult {
    fn from(outcome: MigrateOutcome) -> Self {
        Self {
            success: outcome.success,
            message: outcome.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_api_request_round_trip() {
        let mut query = HashMap::new();
        query.insert("page".to_owned(), "1".to_owned());

        let request = ApiRequest {
            method: "POST".to_owned(),
            path: "/entries".to_owned(),
            body: b"{\"amount\":12}".to_vec(),
            query,
        };

        let back = ApiRequest::from(pb::ApiRequest::from(request.clone()));

        assert_eq!(back, request);
    }

    #[test]
    fn test_empty_body_stays_empty() {
        let request = ApiRequest {
            method: "GET".to_owned(),
            path: "/".to_owned(),
            body: Vec::new(),
            query: HashMap::new(),
        };

        let wire = pb::ApiRequest::from(request);

        assert!(wire.body.is_empty());
    }

    #[test]
    fn test_out_of_range_status_becomes_500() {
        let wire = pb::ApiResponse {
            status_code: -7,
            body: Vec::new(),
            content_type: String::new(),
        };

        assert_eq!(ApiResponse::from(wire).status_code, 500);
    }
}
