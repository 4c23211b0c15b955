//! Configuration payload sent by the host.
//!
//! Every field is optional on the wire. Absence is kept as `None` until
//! [`ModuleConfig::validate`] turns the payload into a [`ConnectionPlan`], so
//! the rules about which combinations are legal live in one place.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::defaults::{DEFAULT_PORT, DEFAULT_TIMEOUT};
use crate::error::ConfigError;
use crate::plan::{ConnectionPlan, Credentials, NodeAddress, TlsSettings};

/// Secret string whose `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret in clear text.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Secret(***)")
    }
}

/// Extra node used for failover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NodeConfig {
    /// Node host name or address.
    #[serde(default)]
    pub host: String,
    /// Node port, defaulting to [`DEFAULT_PORT`].
    #[serde(default)]
    pub port: Option<u16>,
}

/// Backend configuration as decoded from a configuration package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ModuleConfig {
    /// Primary node host.
    #[serde(default)]
    pub host: Option<String>,
    /// Primary node port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Username for password authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Password for password authentication.
    #[serde(default)]
    pub password: Option<Secret>,
    /// Token for token authentication.
    #[serde(default)]
    pub token: Option<Secret>,
    /// Whether to wrap the connection in TLS.
    #[serde(default, rename = "use_ssl")]
    pub use_tls: Option<bool>,
    /// Skip certificate verification; only used together with TLS.
    #[serde(default)]
    pub skip_verify: Option<bool>,
    /// Operation timeout in seconds.
    #[serde(default)]
    pub timeout: Option<u16>,
    /// Additional nodes, tried in the given order.
    #[serde(default)]
    pub nodes: Option<Vec<NodeConfig>>,
    /// Scope used by requests that do not name one.
    #[serde(default)]
    pub default_scope: Option<String>,
}

impl ModuleConfig {
    /// Decodes a configuration package payload.
    ///
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] when the payload is not a map matching
    /// the configuration schema.
    pub fn from_msgpack(data: &[u8]) -> Result<Self, ConfigError> {
        rmp_serde::from_slice(data).map_err(|error| ConfigError::decode(&error))
    }

    /// Checks the configuration and resolves defaults.
    ///
    /// Checks run in a fixed order and the first failure wins: host,
    /// presence of credentials, username and token together, username
    /// without password, then the extra nodes. A password sent alongside a
    /// token is ignored.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] describing the first failed check.
    pub fn validate(&self) -> Result<ConnectionPlan, ConfigError> {
        let host = self
            .host
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::MissingHost)?;

        let credentials = self.credentials()?;

        let extra_nodes = self
            .nodes
            .iter()
            .flatten()
            .enumerate()
            .map(|(index, node)| {
                if node.host.trim().is_empty() {
                    return Err(ConfigError::MissingNodeHost { index });
                }
                Ok(NodeAddress::new(
                    node.host.as_str(),
                    node.port.unwrap_or(DEFAULT_PORT),
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tls = self.use_tls.unwrap_or(false).then(|| TlsSettings {
            skip_verify: self.skip_verify.unwrap_or(false),
        });

        let timeout = self
            .timeout
            .map_or(DEFAULT_TIMEOUT, |seconds| Duration::from_secs(u64::from(seconds)));

        Ok(ConnectionPlan {
            primary: NodeAddress::new(host, self.port.unwrap_or(DEFAULT_PORT)),
            extra_nodes,
            tls,
            timeout,
            credentials,
            default_scope: self.default_scope.clone(),
        })
    }

    fn credentials(&self) -> Result<Credentials, ConfigError> {
        match (&self.username, &self.password, &self.token) {
            (None, _, None) => Err(ConfigError::MissingCredentials),
            (Some(_), _, Some(_)) => Err(ConfigError::AmbiguousCredentials),
            (Some(_), None, None) => Err(ConfigError::MissingPassword),
            (Some(username), Some(password), None) => Ok(Credentials::Password {
                username: username.clone(),
                password: password.clone(),
            }),
            (None, _, Some(token)) => Ok(Credentials::Token(token.clone())),
        }
    }
}
