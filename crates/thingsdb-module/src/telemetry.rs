//! Log output for the module process.
//!
//! Standard output carries protocol frames, so every record goes to standard
//! error. JSON records are meant for the host's log collector and never carry
//! colour codes; compact records are coloured only on a terminal. Request
//! workers are named `timod-request-<pid>`, so thread names are kept in both
//! formats to tie records to a request.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::{Subscriber, subscriber::SetGlobalDefaultError};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::{self, time::UtcTime};

use timod_config::{LogFormat, ModuleSettings};

static TELEMETRY_GUARD: OnceCell<()> = OnceCell::new();

type BoxedSubscriber = Box<dyn Subscriber + Send + Sync>;

/// Handle returned once telemetry is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The log filter expression does not parse.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Another global subscriber is already installed.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the global subscriber on first use; later calls are no-ops.
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for an unparsable filter and
/// [`TelemetryError::Subscriber`] when something else installed a global
/// subscriber first.
pub fn initialise(settings: &ModuleSettings) -> Result<TelemetryHandle, TelemetryError> {
    TELEMETRY_GUARD
        .get_or_try_init(|| {
            let subscriber = build_subscriber(settings)?;
            tracing::subscriber::set_global_default(subscriber)
                .map_err(TelemetryError::Subscriber)
        })
        .map(|_| TelemetryHandle)
}

fn build_subscriber(settings: &ModuleSettings) -> Result<BoxedSubscriber, TelemetryError> {
    let filter = EnvFilter::try_new(settings.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;

    let records = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .with_timer(UtcTime::rfc_3339());

    Ok(match settings.log_format() {
        LogFormat::Json => Box::new(records.with_ansi(false).json().flatten_event(true).finish()),
        LogFormat::Compact => Box::new(
            records
                .with_ansi(io::stderr().is_terminal())
                .compact()
                .finish(),
        ),
    })
}
