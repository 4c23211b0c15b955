//! The protocol loop tying the host transport to the module components.
//!
//! One loop thread consumes [`TransportEvent`]s in order. Configuration
//! packages are applied inline, so a reconfiguration never races another
//! one. Request packages are handed to a worker thread each and answered as
//! soon as their backend call completes, possibly out of order.
//!
//! At most [`DEFAULT_WORKER_LIMIT`] workers (or the limit given to
//! [`ModuleRuntime::with_worker_limit`]) run at once. When the limit is
//! reached the loop stops reading packages until the oldest worker finishes,
//! so a request flood backs up into the host channel instead of spawning
//! threads without bound.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info, warn};

use timod_config::{ModuleConfig, ModuleSettings};
use timod_protocol::{
    ExceptionKind, Package, PackageWriter, Proto, ProtocolError, TransportEvent, TransportReceiver,
    spawn_reader,
};

use crate::backend::Connector;
use crate::connection::{ConnectionManager, ReconfigureError};
use crate::dispatch::{RequestDispatcher, response};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::telemetry::{self, TelemetryError};

/// Tracing target for the protocol loop.
pub const PROTOCOL_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::protocol");

/// Default cap on request workers running at the same time.
pub const DEFAULT_WORKER_LIMIT: usize = 64;

/// Errors that stop the module.
#[derive(Debug, Error)]
pub enum ModuleError {
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The transport reader thread could not be started.
    #[error("failed to start the host reader: {source}")]
    Spawn {
        /// Operating system error.
        #[source]
        source: io::Error,
    },
    /// The host channel failed.
    #[error("host transport failed: {source}")]
    Transport {
        /// Underlying protocol error.
        #[source]
        source: ProtocolError,
    },
}

/// Protocol loop state.
pub struct ModuleRuntime {
    connections: ConnectionManager,
    dispatcher: RequestDispatcher,
    writer: PackageWriter,
    reporter: Arc<dyn HealthReporter>,
    workers: VecDeque<JoinHandle<()>>,
    worker_limit: usize,
}

impl ModuleRuntime {
    /// Creates an unconfigured runtime replying through `writer`.
    #[must_use]
    pub fn new(
        connector: Arc<dyn Connector>,
        reporter: Arc<dyn HealthReporter>,
        writer: PackageWriter,
    ) -> Self {
        let connections = ConnectionManager::new(connector, Arc::clone(&reporter));
        Self {
            dispatcher: RequestDispatcher::new(connections.clone()),
            connections,
            writer,
            reporter,
            workers: VecDeque::new(),
            worker_limit: DEFAULT_WORKER_LIMIT,
        }
    }

    /// Caps the number of request workers running at once. Zero counts as
    /// one.
    #[must_use]
    pub fn with_worker_limit(mut self, limit: usize) -> Self {
        self.worker_limit = limit.max(1);
        self
    }

    /// Connection manager shared with the request workers.
    #[must_use]
    pub const fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Serves packages until the host channel ends.
    ///
    /// Before returning, the loop waits for in-flight requests, closes the
    /// backend connection and reports that the module is stopping.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Transport`] when the host channel fails for any
    /// reason other than the host closing it.
    pub fn run(mut self, events: TransportReceiver) -> Result<(), ModuleError> {
        let result = loop {
            match events.recv() {
                TransportEvent::Package(package) => {
                    if let Err(source) = self.handle_package(package) {
                        self.reporter.transport_failed(&source);
                        break Err(ModuleError::Transport { source });
                    }
                }
                TransportEvent::Failed(ProtocolError::HostClosed) => {
                    info!(target: PROTOCOL_TARGET, "host closed the channel");
                    break Ok(());
                }
                TransportEvent::Failed(source) => {
                    self.reporter.transport_failed(&source);
                    break Err(ModuleError::Transport { source });
                }
            }
        };
        self.shutdown();
        events.detach();
        result
    }

    fn handle_package(&mut self, package: Package) -> Result<(), ProtocolError> {
        match package.proto() {
            Proto::ModuleConf => self.configure(package.data()),
            Proto::ModuleReq => {
                self.spawn_request(package);
                Ok(())
            }
            other => {
                self.reporter.unexpected_package(other);
                Ok(())
            }
        }
    }

    fn configure(&self, data: &[u8]) -> Result<(), ProtocolError> {
        let applied = match ModuleConfig::from_msgpack(data) {
            Ok(config) => self.connections.reconfigure(&config).is_ok(),
            Err(error) => {
                self.connections.reject(&ReconfigureError::from(error));
                false
            }
        };
        let reply = if applied {
            Package::conf_ok()
        } else {
            Package::conf_err()
        };
        self.writer.send(&reply)
    }

    fn spawn_request(&mut self, package: Package) {
        self.workers.retain(|worker| !worker.is_finished());
        if self.workers.len() >= self.worker_limit {
            debug!(
                target: PROTOCOL_TARGET,
                limit = self.worker_limit,
                "worker limit reached; waiting for the oldest request"
            );
            if let Some(oldest) = self.workers.pop_front() {
                join_worker(oldest);
            }
        }

        let pid = package.pid();
        let job = RequestJob {
            dispatcher: self.dispatcher.clone(),
            writer: self.writer.clone(),
            reporter: Arc::clone(&self.reporter),
            package,
        };
        match thread::Builder::new()
            .name(format!("timod-request-{pid}"))
            .spawn(move || job.run())
        {
            Ok(worker) => self.workers.push_back(worker),
            Err(error) => {
                warn!(target: PROTOCOL_TARGET, pid, %error, "failed to start request worker");
                let message = format!("failed to start request worker: {error}");
                let reply = Package::exception(pid, ExceptionKind::Cancelled, message);
                send_reply(&self.writer, pid, reply);
            }
        }
    }

    fn shutdown(&mut self) {
        debug!(
            target: PROTOCOL_TARGET,
            workers = self.workers.len(),
            "waiting for in-flight requests"
        );
        for worker in self.workers.drain(..) {
            join_worker(worker);
        }
        self.connections.shutdown();
        self.reporter.module_stopping();
    }
}

impl std::fmt::Debug for ModuleRuntime {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ModuleRuntime")
            .field("connections", &self.connections)
            .field("workers", &self.workers.len())
            .field("worker_limit", &self.worker_limit)
            .finish_non_exhaustive()
    }
}

struct RequestJob {
    dispatcher: RequestDispatcher,
    writer: PackageWriter,
    reporter: Arc<dyn HealthReporter>,
    package: Package,
}

impl RequestJob {
    fn run(self) {
        let pid = self.package.pid();
        let result = self.dispatcher.handle(self.package.data());
        if let Err(error) = &result {
            self.reporter.request_rejected(pid, error);
        }
        send_reply(&self.writer, pid, response::reply_for(pid, result));
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        warn!(target: PROTOCOL_TARGET, "request worker panicked");
    }
}

fn send_reply(writer: &PackageWriter, pid: u16, reply: Result<Package, ProtocolError>) {
    let sent = reply.and_then(|package| writer.send(&package));
    if let Err(error) = sent {
        warn!(target: PROTOCOL_TARGET, pid, %error, "failed to send reply");
    }
}

/// Runs the module over the process standard streams.
///
/// Installs telemetry from `settings`, then serves packages read from
/// standard input and replies on standard output until the host closes the
/// channel. `connector` supplies the backend sessions.
///
/// # Errors
///
/// Returns a [`ModuleError`] if telemetry or the reader thread cannot be
/// started, or if the host channel fails.
pub fn run_module(
    settings: &ModuleSettings,
    connector: Arc<dyn Connector>,
) -> Result<(), ModuleError> {
    telemetry::initialise(settings).map_err(|source| ModuleError::Telemetry { source })?;
    let events = spawn_reader(io::stdin()).map_err(|source| ModuleError::Spawn { source })?;

    info!(
        target: PROTOCOL_TARGET,
        version = env!("CARGO_PKG_VERSION"),
        "module started"
    );
    ModuleRuntime::new(
        connector,
        Arc::new(StructuredHealthReporter::new()),
        PackageWriter::stdout(),
    )
    .run(events)
}
