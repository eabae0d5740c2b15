//! Handshake Module
//!
//! One-line exchange performed over the child's stdout before any RPC is
//! dispatched. The child proves it is a plugin built for this host by
//! echoing a cookie it received through its environment, and advertises the
//! endpoint the host should connect to.
//!
//! The cookie is a same-version compatibility check, not a security
//! mechanism.

use std::env;

use thiserror::Error;

/// Protocol version spoken by this host. Bumped whenever the wire contract
/// gains or changes a capability.
pub const PROTOCOL_VERSION: u32 = 1;

/// Environment key under which the host injects the cookie into the child.
pub const COOKIE_ENV_KEY: &str = "HEARTH_PLUGIN_COOKIE";

/// Cookie value baked into host and SDK at compile time.
pub const COOKIE_VALUE: &str = "9c3de1b04f6a4cd2a1e8f5b27c90d4e3";

/// The single plugin kind this host dispenses.
pub const PLUGIN_KIND: &str = "module";

/// Wire protocols the host is willing to speak.
pub const ALLOWED_PROTOCOLS: &[&str] = &["grpc"];

/// Error type for handshake parsing and verification.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum HandshakeError {
    /// The handshake line did not have the expected shape
    #[error("malformed handshake line: {0}")]
    Malformed(String),

    /// The child speaks a different protocol version
    #[error("unsupported protocol version {0}")]
    VersionMismatch(u32),

    /// The cookie echo did not match the host's cookie
    #[error("handshake cookie mismatch")]
    CookieMismatch,

    /// The child offered a wire protocol outside the allowed set
    #[error("no agreeable wire protocol, plugin offered '{0}'")]
    ProtocolRejected(String),

    /// The child was started without the host cookie in its environment
    #[error("plugin started without the host cookie in its environment")]
    MissingCookie,
}

/// The record exchanged during the handshake:
/// `version|cookie|kind|network|address|protocol`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    /// Fixed protocol version.
    pub protocol_version: u32,
    /// Cookie echo proving the child saw the host environment.
    pub cookie: String,
    /// Plugin kind being served.
    pub kind: String,
    /// Network type of the advertised endpoint (`tcp`).
    pub network: String,
    /// Endpoint address the host should connect to.
    pub address: String,
    /// Wire protocol offered for the channel.
    pub protocol: String,
}

impl HandshakeLine {
    /// Handshake record a plugin emits for the endpoint it bound.
    pub fn for_address(address: String) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            cookie: COOKIE_VALUE.to_owned(),
            kind: PLUGIN_KIND.to_owned(),
            network: "tcp".to_owned(),
            address,
            protocol: "grpc".to_owned(),
        }
    }

    /// Render the line, newline-terminated, for writing to stdout.
    pub fn emit(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}\n",
            self.protocol_version, self.cookie, self.kind, self.network, self.address, self.protocol
        )
    }

    /// Parse a handshake line read from a child's stdout.
    pub fn parse(line: &str) -> Result<Self, HandshakeError> {
        let line = line.trim();
        let fields: Vec<&str> = line.split('|').collect();

        if fields.len() != 6 {
            return Err(HandshakeError::Malformed(format!(
                "expected 6 fields, got {}",
                fields.len()
            )));
        }

        let protocol_version: u32 = fields[0]
            .parse()
            .map_err(|_| HandshakeError::Malformed(format!("bad version field '{}'", fields[0])))?;

        if fields[4].is_empty() {
            return Err(HandshakeError::Malformed("empty address field".into()));
        }

        Ok(Self {
            protocol_version,
            cookie: fields[1].to_owned(),
            kind: fields[2].to_owned(),
            network: fields[3].to_owned(),
            address: fields[4].to_owned(),
            protocol: fields[5].to_owned(),
        })
    }

    /// Host-side verification: protocol version, cookie echo, and wire
    /// protocol negotiation. The plugin kind is checked separately by the
    /// loader, which owns contract dispatch.
    pub fn verify(&self) -> Result<(), HandshakeError> {
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(HandshakeError::VersionMismatch(self.protocol_version));
        }

        if self.cookie != COOKIE_VALUE {
            return Err(HandshakeError::CookieMismatch);
        }

        if !ALLOWED_PROTOCOLS.contains(&self.protocol.as_str()) {
            return Err(HandshakeError::ProtocolRejected(self.protocol.clone()));
        }

        Ok(())
    }
}

/// Child-side check: a plugin started without the host cookie must refuse
/// to serve.
pub fn check_child_environment() -> Result<(), HandshakeError> {
    match env::var(COOKIE_ENV_KEY) {
        Ok(value) if value == COOKIE_VALUE => Ok(()),
        _ => Err(HandshakeError::MissingCookie),
    }
}
