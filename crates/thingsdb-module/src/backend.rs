//! Contract of the backend client the module drives.
//!
//! The client owns dialing, TLS, authentication and the QUERY/RUN wire
//! encoding. The module only sequences those calls and relays results, so the
//! client is consumed through the [`BackendClient`] and [`Connector`] traits.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use timod_config::{NodeAddress, TlsSettings};

/// Variables bound by name for a QUERY.
pub type Vars = BTreeMap<String, rmpv::Value>;

/// Outcome of a QUERY or RUN: raw MessagePack response bytes or an error.
pub type ResponseOutcome = Result<Vec<u8>, BackendError>;

/// Errors reported by the backend client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend answered with an error code.
    #[error("{message}")]
    Thingsdb {
        /// Backend error code, shared with the module exception kinds.
        code: i8,
        /// Message as reported by the backend.
        message: String,
    },
    /// The request never got a backend answer (I/O failure, timeout, ...).
    #[error("{message}")]
    Transport {
        /// Failure description.
        message: String,
    },
}

impl BackendError {
    /// Creates an error carrying a backend error code.
    #[must_use]
    pub fn thingsdb(code: i8, message: impl Into<String>) -> Self {
        Self::Thingsdb {
            code,
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// A session with the backend.
///
/// Set-up methods take `&mut self` and run while the session is still owned
/// exclusively by the connection manager. Once installed, the session is
/// shared between concurrent requests, so `query` and `run` take `&self`.
pub trait BackendClient: Send + Sync {
    /// Registers a failover node.
    fn add_node(&mut self, node: &NodeAddress);

    /// Dials the backend.
    ///
    /// # Errors
    ///
    /// Returns the dial failure.
    fn connect(&mut self) -> Result<(), BackendError>;

    /// Authenticates with an access token.
    ///
    /// # Errors
    ///
    /// Returns the authentication failure.
    fn auth_token(&mut self, token: &str) -> Result<(), BackendError>;

    /// Authenticates with a username and password.
    ///
    /// # Errors
    ///
    /// Returns the authentication failure.
    fn auth_password(&mut self, username: &str, password: &str) -> Result<(), BackendError>;

    /// Closes the session. Must be idempotent.
    fn close(&mut self);

    /// Evaluates `code` in `scope` with optional variables.
    fn query(&self, scope: &str, code: &str, vars: Option<&Vars>) -> ResponseOutcome;

    /// Runs the procedure `name` in `scope` with optional arguments.
    fn run(&self, scope: &str, name: &str, args: Option<&rmpv::Value>) -> ResponseOutcome;
}

/// Factory for unconnected backend sessions.
pub trait Connector: Send + Sync {
    /// Creates a session targeting `primary`, without dialing it.
    fn open(
        &self,
        primary: &NodeAddress,
        tls: Option<TlsSettings>,
        timeout: Duration,
    ) -> Box<dyn BackendClient>;
}
