//! Structured reporting of module lifecycle events.

use std::sync::Arc;

use timod_config::{ConnectionPlan, Credentials};
use timod_protocol::{ProtocolError, Proto};

use crate::connection::ReconfigureError;
use crate::dispatch::RequestError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked when a configuration package is about to be applied.
    fn reconfigure_starting(&self);

    /// Invoked after a new connection is dialled, authenticated and installed.
    fn connection_ready(&self, plan: &ConnectionPlan);

    /// Invoked when a configuration is rejected or the connection attempt fails.
    fn reconfigure_failed(&self, error: &ReconfigureError);

    /// Invoked when a request is refused before reaching the backend.
    fn request_rejected(&self, pid: u16, error: &RequestError);

    /// Invoked for packages the module does not handle.
    fn unexpected_package(&self, proto: Proto);

    /// Invoked when the host channel fails.
    fn transport_failed(&self, error: &ProtocolError);

    /// Invoked once the dispatch loop has stopped.
    fn module_stopping(&self);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn reconfigure_starting(&self) {
        (**self).reconfigure_starting();
    }

    fn connection_ready(&self, plan: &ConnectionPlan) {
        (**self).connection_ready(plan);
    }

    fn reconfigure_failed(&self, error: &ReconfigureError) {
        (**self).reconfigure_failed(error);
    }

    fn request_rejected(&self, pid: u16, error: &RequestError) {
        (**self).request_rejected(pid, error);
    }

    fn unexpected_package(&self, proto: Proto) {
        (**self).unexpected_package(proto);
    }

    fn transport_failed(&self, error: &ProtocolError) {
        (**self).transport_failed(error);
    }

    fn module_stopping(&self) {
        (**self).module_stopping();
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn reconfigure_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "reconfigure_starting",
            "applying module configuration"
        );
    }

    fn connection_ready(&self, plan: &ConnectionPlan) {
        let auth = match plan.credentials() {
            Credentials::Password { .. } => "password",
            Credentials::Token(_) => "token",
        };
        tracing::info!(
            target: HEALTH_TARGET,
            event = "connection_ready",
            host = plan.primary().host(),
            port = plan.primary().port(),
            extra_nodes = plan.extra_nodes().len(),
            tls = plan.tls().is_some(),
            timeout_secs = plan.timeout().as_secs(),
            auth,
            "backend connection ready"
        );
    }

    fn reconfigure_failed(&self, error: &ReconfigureError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "reconfigure_failed",
            stage = error.stage(),
            error = %error,
            "module configuration failed"
        );
    }

    fn request_rejected(&self, pid: u16, error: &RequestError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "request_rejected",
            pid,
            kind = %error.exception_kind(),
            error = %error,
            "request rejected"
        );
    }

    fn unexpected_package(&self, proto: Proto) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "unexpected_package",
            package_type = proto.as_byte(),
            "unexpected package type"
        );
    }

    fn transport_failed(&self, error: &ProtocolError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "transport_failed",
            error = %error,
            "host channel failed"
        );
    }

    fn module_stopping(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "module_stopping",
            "module stopping"
        );
    }
}
