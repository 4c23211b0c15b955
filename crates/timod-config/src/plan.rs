//! Validated connection parameters.

use std::time::Duration;

use crate::module_config::Secret;

/// Host and port of a backend node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    host: String,
    port: u16,
}

impl NodeAddress {
    /// Creates a node address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port number.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }
}

/// TLS options for the backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlsSettings {
    /// Accept any server certificate.
    pub skip_verify: bool,
}

/// How the module authenticates against the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Username and password.
    Password {
        /// Account name.
        username: String,
        /// Account password.
        password: Secret,
    },
    /// Access token.
    Token(Secret),
}

/// Everything needed to dial and authenticate a backend connection.
///
/// Only [`ModuleConfig::validate`](crate::ModuleConfig::validate) builds a
/// plan, so holding one means the configuration passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPlan {
    pub(crate) primary: NodeAddress,
    pub(crate) extra_nodes: Vec<NodeAddress>,
    pub(crate) tls: Option<TlsSettings>,
    pub(crate) timeout: Duration,
    pub(crate) credentials: Credentials,
    pub(crate) default_scope: Option<String>,
}

impl ConnectionPlan {
    /// Node dialled first.
    #[must_use]
    pub const fn primary(&self) -> &NodeAddress {
        &self.primary
    }

    /// Failover nodes in registration order.
    #[must_use]
    pub fn extra_nodes(&self) -> &[NodeAddress] {
        &self.extra_nodes
    }

    /// TLS options, absent for plain connections.
    #[must_use]
    pub const fn tls(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }

    /// Default timeout for backend operations.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Authentication mode.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Scope for requests that do not name one.
    #[must_use]
    pub fn default_scope(&self) -> Option<&str> {
        self.default_scope.as_deref()
    }
}
