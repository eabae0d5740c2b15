//! HTTP API Module
//!
//! Routes `/api/plugins/...` onto the registry and the plugin proxies and
//! exposes the lifecycle endpoints (list, install, uninstall, reload,
//! widget). Every host-originated response uses the
//! `{"data": ...}` / `{"error": {"code", "message"}}` envelope; proxied
//! plugin responses are forwarded verbatim.
//!
//! Specific routes match before the generic proxy fallback. During a
//! reload the registry entry is briefly absent and routed calls observe
//! `NOT_FOUND` or `PLUGIN_UNAVAILABLE`; requests are not queued across the
//! gap. If the HTTP client disconnects, the handler future is dropped and
//! the in-flight plugin call is cancelled with it.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::Router;
use log::{error, warn};
use serde_json::json;
use tower_http::services::ServeDir;

use crate::manifest::is_valid_id;
use crate::plugin_contract::ApiRequest;
use crate::plugin_loader::PluginLoader;
use crate::plugin_proxy::PluginHandle;
use crate::registry::PluginRegistry;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// Live plugin directory.
    pub registry: Arc<PluginRegistry>,
    /// Lifecycle manager for install/uninstall/reload.
    pub loader: Arc<PluginLoader>,
}

/// Error codes emitted by the host router.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    AlreadyInstalled,
    InstallError,
    UnloadError,
    LoadError,
    PluginUnavailable,
    PluginError,
    BadRequest,
}

impl ErrorCode {
    /// Wire form of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyInstalled => "ALREADY_INSTALLED",
            ErrorCode::InstallError => "INSTALL_ERROR",
            ErrorCode::UnloadError => "UNLOAD_ERROR",
            ErrorCode::LoadError => "LOAD_ERROR",
            ErrorCode::PluginUnavailable => "PLUGIN_UNAVAILABLE",
            ErrorCode::PluginError => "PLUGIN_ERROR",
            ErrorCode::BadRequest => "BAD_REQUEST",
        }
    }

    fn status(self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyInstalled => StatusCode::CONFLICT,
            ErrorCode::PluginUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::InstallError
            | ErrorCode::UnloadError
            | ErrorCode::LoadError
            | ErrorCode::PluginError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Build the router. When `web_dir` is given, anything outside `/api` falls
/// back to the static front-end.
pub fn router(state: AppState, web_dir: Option<&FsPath>) -> Router {
    let api = Router::new()
        .route("/api/plugins", get(list_plugins))
        .route("/api/plugins/{id}", get(get_plugin).delete(uninstall_plugin))
        .route("/api/plugins/{id}/install", post(install_plugin))
        .route("/api/plugins/{id}/reload", post(reload_plugin))
        .route("/api/plugins/{id}/widget/{slot}", get(widget_data))
        .route("/api/plugins/{id}/{*rest}", any(proxy_request))
        .with_state(state);

    match web_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    }
}

fn data_response(status: StatusCode, data: serde_json::Value) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        json!({ "data": data }).to_string(),
    )
        .into_response()
}

fn error_response(code: ErrorCode, message: &str) -> Response {
    (
        code.status(),
        [(header::CONTENT_TYPE, "application/json")],
        json!({ "error": { "code": code.as_str(), "message": message } }).to_string(),
    )
        .into_response()
}

/// Collapse a raw query string to one value per key, keeping the first.
/// Multi-valued parameters are deliberately not supported.
fn first_value_query(query: Option<&str>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    if let Some(query) = query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            map.entry(key.into_owned()).or_insert_with(|| value.into_owned());
        }
    }
    map
}

/// Proxy lookup shared by the dispatch routes: absent entry → 404, entry
/// without an attached proxy (pre-handshake window) → 503.
enum Dispatch {
    Ready(Arc<dyn PluginHandle>),
    Reply(Response),
}

fn dispatchable(state: &AppState, id: &str) -> Dispatch {
    match state.registry.get(id) {
        None => Dispatch::Reply(error_response(ErrorCode::NotFound, "plugin not found")),
        Some(entry) => match entry.proxy {
            Some(proxy) => Dispatch::Ready(proxy),
            None => {
                warn!("plugin '{}' routed before its proxy was attached", id);
                Dispatch::Reply(error_response(
                    ErrorCode::PluginUnavailable,
                    "plugin is not ready",
                ))
            }
        },
    }
}

async fn list_plugins(State(state): State<AppState>) -> Response {
    let manifests = state.registry.list();
    data_response(StatusCode::OK, json!(manifests))
}

async fn get_plugin(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id) {
        Some(entry) => data_response(
            StatusCode::OK,
            json!({
                "manifest": entry.manifest,
                "loaded_at": entry.loaded_at,
            }),
        ),
        None => error_response(ErrorCode::NotFound, "plugin not found"),
    }
}

async fn install_plugin(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !is_valid_id(&id) {
        return error_response(ErrorCode::BadRequest, "invalid plugin id");
    }

    if state.registry.get(&id).is_some() {
        return error_response(ErrorCode::AlreadyInstalled, "plugin already installed");
    }

    match state.loader.load_plugin(&id).await {
        Ok(()) => {
            let manifest = state.registry.get(&id).map(|entry| entry.manifest);
            data_response(StatusCode::CREATED, json!(manifest))
        }
        Err(err) => {
            error!("install of plugin '{}' failed: {}", id, err);
            error_response(ErrorCode::InstallError, &err.to_string())
        }
    }
}

async fn uninstall_plugin(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.registry.get(&id).is_none() {
        return error_response(ErrorCode::NotFound, "plugin not found");
    }

    state.loader.unload_plugin(&id).await;
    data_response(StatusCode::OK, json!(null))
}

async fn reload_plugin(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if state.registry.get(&id).is_none() {
        return error_response(ErrorCode::NotFound, "plugin not found");
    }

    // A failed load leaves the plugin absent, not rolled back.
    match state.loader.reload_plugin(&id).await {
        Ok(()) => {
            let manifest = state.registry.get(&id).map(|entry| entry.manifest);
            data_response(StatusCode::OK, json!(manifest))
        }
        Err(err) => {
            error!("reload of plugin '{}' failed: {}", id, err);
            error_response(ErrorCode::LoadError, &err.to_string())
        }
    }
}

async fn widget_data(
    State(state): State<AppState>,
    Path((id, slot)): Path<(String, String)>,
) -> Response {
    let proxy = match dispatchable(&state, &id) {
        Dispatch::Ready(proxy) => proxy,
        Dispatch::Reply(response) => return response,
    };

    match proxy.widget_data(&slot).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Err(err) => {
            // The underlying message stays server-side.
            error!("widget call to plugin '{}' failed: {}", id, err);
            error_response(ErrorCode::PluginError, "plugin call failed")
        }
    }
}

async fn proxy_request(
    State(state): State<AppState>,
    Path((id, rest)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let proxy = match dispatchable(&state, &id) {
        Dispatch::Ready(proxy) => proxy,
        Dispatch::Reply(response) => return response,
    };

    let request = ApiRequest {
        method: method.to_string(),
        path: format!("/{}", rest),
        body: body.to_vec(),
        query: first_value_query(uri.query()),
    };

    match proxy.handle_api(request).await {
        Ok(reply) => {
            let status = StatusCode::from_u16(reply.status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let content_type = if reply.content_type.is_empty() {
                "application/octet-stream".to_owned()
            } else {
                reply.content_type
            };
            (status, [(header::CONTENT_TYPE, content_type)], reply.body).into_response()
        }
        Err(err) => {
            // The underlying message stays server-side.
            error!("proxied call to plugin '{}' failed: {}", id, err);
            error_response(ErrorCode::PluginError, "plugin call failed")
        }
    }
}
