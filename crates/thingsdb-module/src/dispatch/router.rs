//! Routing of validated requests to QUERY or RUN.

use tracing::debug;

use crate::backend::ResponseOutcome;
use crate::connection::{ActiveConnection, ConnectionManager};

use super::errors::RequestError;
use super::request::{Operation, RequestEnvelope};

/// Tracing target for dispatch operations.
pub const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Validates requests and runs them on the current connection.
///
/// The dispatcher is cheap to clone and safe to call from many threads at
/// once. Each call holds the connection read lock for its whole duration.
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    connections: ConnectionManager,
}

impl RequestDispatcher {
    /// Creates a dispatcher over the shared connection manager.
    #[must_use]
    pub const fn new(connections: ConnectionManager) -> Self {
        Self { connections }
    }

    /// Handles one request payload.
    ///
    /// The outer `Result` reports requests refused before reaching the
    /// backend; the inner [`ResponseOutcome`] is the backend result, passed
    /// on unmodified.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::NoConnection`] when no connection is
    /// configured, whatever the payload, and the validation error of
    /// [`RequestEnvelope::parse`] or [`RequestEnvelope::into_operation`]
    /// otherwise.
    pub fn handle(&self, data: &[u8]) -> Result<ResponseOutcome, RequestError> {
        self.connections
            .with_connection(|connection| Self::dispatch(connection, data))
            .unwrap_or(Err(RequestError::NoConnection))
    }

    fn dispatch(
        connection: &ActiveConnection,
        data: &[u8],
    ) -> Result<ResponseOutcome, RequestError> {
        let operation =
            RequestEnvelope::parse(data)?.into_operation(connection.default_scope())?;

        debug!(
            target: DISPATCH_TARGET,
            operation = operation.kind(),
            "dispatching request"
        );

        let client = connection.client();
        let outcome = match &operation {
            Operation::Query { scope, code, vars } => client.query(scope, code, vars.as_ref()),
            Operation::Run { scope, name, args } => client.run(scope, name, args.as_ref()),
        };
        Ok(outcome)
    }
}
