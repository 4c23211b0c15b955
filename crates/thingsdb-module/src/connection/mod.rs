//! Ownership of the single backend connection.
//!
//! The [`ConnectionManager`] guards one slot holding either a fully
//! authenticated connection or nothing. Reconfiguration takes the write lock
//! for its whole body (validation, teardown, dial, authentication), so a
//! request holding the read lock never sees a connection being closed or one
//! that is still being built. Requests drain before a reconfiguration starts,
//! and new requests wait until it finishes. Under continuous reconfiguration
//! requests can starve; that is accepted. The number of requests waiting on
//! the lock is bounded by the runtime's worker limit.

mod errors;

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use timod_config::{ConnectionPlan, Credentials, ModuleConfig};

use crate::backend::{BackendClient, Connector};
use crate::health::HealthReporter;

pub use self::errors::ReconfigureError;

const CONNECTION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::connection");

/// The installed backend session plus the settings requests need from it.
pub struct ActiveConnection {
    client: Box<dyn BackendClient>,
    default_scope: Option<String>,
}

impl ActiveConnection {
    /// Backend session.
    #[must_use]
    pub fn client(&self) -> &dyn BackendClient {
        self.client.as_ref()
    }

    /// Scope used by requests that do not name one.
    #[must_use]
    pub fn default_scope(&self) -> Option<&str> {
        self.default_scope.as_deref()
    }
}

impl std::fmt::Debug for ActiveConnection {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ActiveConnection")
            .field("default_scope", &self.default_scope)
            .finish_non_exhaustive()
    }
}

/// Manager of the shared connection slot.
///
/// Cloning is cheap and every clone refers to the same slot.
#[derive(Clone)]
pub struct ConnectionManager {
    slot: Arc<RwLock<Option<ActiveConnection>>>,
    connector: Arc<dyn Connector>,
    reporter: Arc<dyn HealthReporter>,
}

impl ConnectionManager {
    /// Creates an unconfigured manager.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, reporter: Arc<dyn HealthReporter>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(None)),
            connector,
            reporter,
        }
    }

    /// Applies a configuration, replacing the current connection.
    ///
    /// An invalid configuration is rejected before anything else happens and
    /// leaves the current connection serving. Otherwise the current
    /// connection is closed first; if the new one cannot be dialled or
    /// authenticated it is closed as well and the manager is left
    /// unconfigured.
    ///
    /// # Errors
    ///
    /// Returns a [`ReconfigureError`] describing the failed stage.
    pub fn reconfigure(&self, config: &ModuleConfig) -> Result<(), ReconfigureError> {
        let mut slot = self.write_slot();
        self.reporter.reconfigure_starting();

        let result = config
            .validate()
            .map_err(ReconfigureError::from)
            .and_then(|plan| {
                if let Some(mut previous) = slot.take() {
                    debug!(target: CONNECTION_TARGET, "closing previous connection");
                    previous.client.close();
                }
                let connection = self.establish(&plan)?;
                *slot = Some(connection);
                Ok(plan)
            });

        match result {
            Ok(plan) => {
                self.reporter.connection_ready(&plan);
                Ok(())
            }
            Err(error) => {
                self.reporter.reconfigure_failed(&error);
                Err(error)
            }
        }
    }

    /// Reports a configuration that could not even be decoded.
    ///
    /// The current connection is left untouched.
    pub fn reject(&self, error: &ReconfigureError) {
        self.reporter.reconfigure_failed(error);
    }

    fn establish(&self, plan: &ConnectionPlan) -> Result<ActiveConnection, ReconfigureError> {
        let primary = plan.primary();
        let mut client = self
            .connector
            .open(primary, plan.tls().copied(), plan.timeout());

        for node in plan.extra_nodes() {
            client.add_node(node);
        }

        debug!(
            target: CONNECTION_TARGET,
            host = primary.host(),
            port = primary.port(),
            "dialing backend"
        );
        if let Err(source) = client.connect() {
            client.close();
            return Err(ReconfigureError::Connect {
                host: primary.host().to_owned(),
                port: primary.port(),
                source,
            });
        }

        let auth = match plan.credentials() {
            Credentials::Token(token) => client.auth_token(token.expose()),
            Credentials::Password { username, password } => {
                client.auth_password(username, password.expose())
            }
        };
        if let Err(source) = auth {
            client.close();
            return Err(ReconfigureError::Auth { source });
        }

        Ok(ActiveConnection {
            client,
            default_scope: plan.default_scope().map(str::to_owned),
        })
    }

    /// Runs `f` against the current connection while holding the read lock.
    ///
    /// Returns `None` when no connection is configured. The borrow cannot
    /// outlive the call, so the connection is never used after a
    /// reconfiguration has replaced it.
    pub fn with_connection<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&ActiveConnection) -> R,
    {
        self.read_slot().as_ref().map(f)
    }

    /// Returns `true` when a connection is installed.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.read_slot().is_some()
    }

    /// Closes the current connection, leaving the manager unconfigured.
    pub fn shutdown(&self) {
        if let Some(mut connection) = self.write_slot().take() {
            debug!(target: CONNECTION_TARGET, "closing connection on shutdown");
            connection.client.close();
        }
    }

    // The slot only ever holds a complete connection or `None`, so a
    // poisoned lock still guards a consistent value.
    fn read_slot(&self) -> RwLockReadGuard<'_, Option<ActiveConnection>> {
        self.slot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_slot(&self) -> RwLockWriteGuard<'_, Option<ActiveConnection>> {
        self.slot.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectionManager")
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
