//! Plugin Contract Module
//!
//! Native value types for the four capability calls every plugin serves.
//! The proxy, the router, and the SDK all speak in these types; the wire
//! mirrors live in the generated protobuf code.

use std::collections::HashMap;

pub use crate::manifest::Manifest;

/// One proxied REST call, as handed to a plugin.
///
/// The path is already stripped of the `/api/plugins/{id}` prefix; the body
/// is fully buffered; query parameters are collapsed to the first value per
/// key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiRequest {
    /// HTTP method, uppercase.
    pub method: String,
    /// Remaining path, with a leading slash.
    pub path: String,
    /// Raw request body. Opaque to the host.
    pub body: Vec<u8>,
    /// Query parameters, first value per key.
    pub query: HashMap<String, String>,
}

/// A plugin's answer to an [`ApiRequest`].
///
/// A non-2xx status is a normal return, not an error; the host forwards
/// status, body, and content type verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code to relay.
    pub status_code: u16,
    /// Raw response body. Opaque to the host.
    pub body: Vec<u8>,
    /// Content type to relay.
    pub content_type: String,
}

impl ApiResponse {
    /// JSON response with the given status.
    pub fn json(status_code: u16, value: &serde_json::Value) -> Self {
        Self {
            status_code,
            body: value.to_string().into_bytes(),
            content_type: "application/json".to_owned(),
        }
    }

    /// `200 OK` JSON response wrapped in the hub's `{"data": ...}` envelope.
    pub fn ok(data: serde_json::Value) -> Self {
        Self::json(200, &serde_json::json!({ "data": data }))
    }

    /// JSON error response in the hub's `{"error": {...}}` envelope.
    pub fn error(status_code: u16, code: &str, message: &str) -> Self {
        Self::json(
            status_code,
            &serde_json::json!({ "error": { "code": code, "message": message } }),
        )
    }
}

/// Result of a plugin's `Migrate` hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateOutcome {
    /// Whether migration succeeded.
    pub success: bool,
    /// Human-readable detail, empty on a silent success.
    pub message: String,
}

impl MigrateOutcome {
    /// Successful outcome with a detail message.
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed outcome with a reason.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
