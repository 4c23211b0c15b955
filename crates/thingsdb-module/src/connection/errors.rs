//! Errors surfaced while applying a configuration.

use thiserror::Error;

use timod_config::ConfigError;

use crate::backend::BackendError;

/// Reasons a reconfiguration did not produce a connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconfigureError {
    /// The configuration failed to decode or validate. The previous
    /// connection, if any, is still installed.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] ConfigError),

    /// Dialing the backend failed. No connection is installed.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        /// Primary node host.
        host: String,
        /// Primary node port.
        port: u16,
        /// Client failure.
        #[source]
        source: BackendError,
    },

    /// Authentication was refused. No connection is installed.
    #[error("authentication failed: {source}")]
    Auth {
        /// Client failure.
        #[source]
        source: BackendError,
    },
}

impl ReconfigureError {
    /// Short label for the stage that failed.
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "validate",
            Self::Connect { .. } => "connect",
            Self::Auth { .. } => "authenticate",
        }
    }
}
