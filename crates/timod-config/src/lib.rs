//! Configuration for the ThingsDB bridge module.
//!
//! Two kinds of configuration live here:
//!
//! - [`ModuleConfig`] is what the host sends in a configuration package. It
//!   describes how to reach and authenticate against the backend node and is
//!   checked by [`ModuleConfig::validate`], which yields a [`ConnectionPlan`]
//!   whose fields are total: credentials are a sum type, ports and timeouts
//!   have their defaults applied, and TLS is either configured or absent.
//! - [`ModuleSettings`] covers the module process itself (log filter and log
//!   format). It is layered by `ortho_config` from defaults, an optional
//!   `.timod.toml`, `TIMOD_*` environment variables and command-line flags.

mod defaults;
mod error;
mod module_config;
mod plan;
mod settings;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_PORT, DEFAULT_TIMEOUT, LOG_FILTER_ENV, LOG_FORMAT_ENV,
};
pub use error::{ConfigError, SettingsError};
pub use module_config::{ModuleConfig, NodeConfig, Secret};
pub use plan::{ConnectionPlan, Credentials, NodeAddress, TlsSettings};
pub use settings::{LogFormat, LogFormatParseError, ModuleSettings};
