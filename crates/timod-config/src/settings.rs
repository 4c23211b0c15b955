//! Process-level settings for the module.
//!
//! Settings are layered by `ortho_config`: built-in defaults, then a
//! `.timod.toml` file if one is found, then `TIMOD_*` environment variables,
//! then command-line flags (`--log-filter`, `--log-format`).

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::defaults::{DEFAULT_LOG_FILTER, default_log_filter};
use crate::error::SettingsError;

/// Output format of the module's log records on standard error.
///
/// Parsed case-insensitively from `json` or `compact` on the command line.
/// Environment and file values use the lower-case names.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LogFormat {
    /// One JSON object per event, for hosts that collect module output.
    #[default]
    Json,
    /// Single-line text for reading in a terminal.
    Compact,
}

/// Error returned when a [`LogFormat`] name is not recognised.
pub type LogFormatParseError = strum::ParseError;

/// Logging settings for the module process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "TIMOD")]
pub struct ModuleSettings {
    /// Filter expression for the tracing subscriber.
    #[serde(default = "default_log_filter")]
    log_filter: String,
    /// Output format for log records.
    #[serde(default)]
    log_format: LogFormat,
}

impl Default for ModuleSettings {
    fn default() -> Self {
        Self {
            log_filter: String::from(DEFAULT_LOG_FILTER),
            log_format: LogFormat::default(),
        }
    }
}

impl ModuleSettings {
    /// Creates settings from explicit values.
    #[must_use]
    pub fn new(log_filter: impl Into<String>, log_format: LogFormat) -> Self {
        Self {
            log_filter: log_filter.into(),
            log_format,
        }
    }

    /// Resolves settings from defaults, a settings file and the environment.
    ///
    /// The host passes no arguments the module understands, so command-line
    /// flags are not consulted.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Load`] if a layer holds an invalid value.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_args([OsString::from(env!("CARGO_PKG_NAME"))])
    }

    /// Resolves settings with `args` as the command line, program name
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Load`] if a layer holds an invalid value or
    /// the arguments do not parse.
    pub fn from_args<I>(args: I) -> Result<Self, SettingsError>
    where
        I: IntoIterator<Item = OsString>,
    {
        Self::load_from_iter(args).map_err(SettingsError::from)
    }

    /// Filter expression for the tracing subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for log records.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}
