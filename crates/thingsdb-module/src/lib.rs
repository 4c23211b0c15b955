//! ThingsDB external module bridging module requests to a ThingsDB node.
//!
//! The host node starts the module as a child process and talks to it over
//! standard input and output (see [`timod_protocol`]). A configuration
//! package makes the module open one authenticated connection to a ThingsDB
//! node; request packages are then translated into QUERY or RUN calls on that
//! connection and the results are relayed back unchanged.
//!
//! The crate is organised around four components:
//!
//! - [`ConnectionManager`] owns the single backend connection and replaces it
//!   atomically on every reconfiguration.
//! - [`RequestDispatcher`] validates request maps and routes them to QUERY or
//!   RUN while holding a shared lock on the connection.
//! - [`response`] turns backend outcomes and refused requests into reply
//!   packages.
//! - [`ModuleRuntime`] is the protocol loop feeding the other three.
//!
//! The ThingsDB client itself is supplied by the embedding binary through the
//! [`Connector`] and [`BackendClient`] traits:
//!
//! ```ignore
//! fn main() -> std::process::ExitCode {
//!     let settings = match timod_config::ModuleSettings::from_env() {
//!         Ok(settings) => settings,
//!         Err(_) => return std::process::ExitCode::FAILURE,
//!     };
//!     match thingsdb_module::run_module(&settings, std::sync::Arc::new(MyConnector)) {
//!         Ok(()) => std::process::ExitCode::SUCCESS,
//!         Err(_) => std::process::ExitCode::FAILURE,
//!     }
//! }
//! ```

mod backend;
mod connection;
mod dispatch;
mod health;
mod runtime;
mod telemetry;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use backend::{BackendClient, BackendError, Connector, ResponseOutcome, Vars};
pub use connection::{ActiveConnection, ConnectionManager, ReconfigureError};
pub use dispatch::{
    DISPATCH_TARGET, Operation, RequestDispatcher, RequestEnvelope, RequestError, response,
};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use runtime::{DEFAULT_WORKER_LIMIT, ModuleError, ModuleRuntime, PROTOCOL_TARGET, run_module};
pub use telemetry::{TelemetryError, TelemetryHandle, initialise as initialise_telemetry};
