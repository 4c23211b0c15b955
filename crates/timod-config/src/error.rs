//! Errors raised while decoding or validating configuration.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

/// Reasons a backend configuration is rejected.
///
/// Validation never touches the live connection, so any of these leaves the
/// previously applied configuration in place.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The payload is not a MessagePack map matching the configuration schema.
    #[error("missing or invalid configuration: {message}")]
    Decode {
        /// Decoder failure description.
        message: String,
    },

    /// No host to connect to.
    #[error("missing host")]
    MissingHost,

    /// Neither a username nor a token was given.
    #[error("missing username or token")]
    MissingCredentials,

    /// Both a username and a token were given.
    #[error("use a username or token, not both")]
    AmbiguousCredentials,

    /// A username was given without a password.
    #[error("missing password for the username")]
    MissingPassword,

    /// An extra node has an empty host.
    #[error("node {index} is missing a host")]
    MissingNodeHost {
        /// Position of the node in the `nodes` list.
        index: usize,
    },
}

impl ConfigError {
    pub(crate) fn decode(error: &rmp_serde::decode::Error) -> Self {
        Self::Decode {
            message: error.to_string(),
        }
    }
}

/// Errors raised while resolving process settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The layered loader rejected the environment, a settings file or the
    /// command line.
    #[error("failed to load module settings: {source}")]
    Load {
        /// Loader failure.
        #[source]
        source: Arc<OrthoError>,
    },
}

impl From<Arc<OrthoError>> for SettingsError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Load { source }
    }
}
