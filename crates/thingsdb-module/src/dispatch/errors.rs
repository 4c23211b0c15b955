//! Errors raised while validating a request.
//!
//! Each variant is local to one request and maps onto the exception kind the
//! host receives. None of them affects the connection.

use thiserror::Error;

use timod_protocol::ExceptionKind;

/// Reasons a request is refused before reaching the backend.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No connection is configured.
    #[error("no connection; reconfigure first")]
    NoConnection,

    /// The payload is not a valid request map.
    #[error("invalid request: {message}")]
    Malformed {
        /// Decoder failure description.
        message: String,
        /// Underlying decoder error.
        #[source]
        source: Option<rmp_serde::decode::Error>,
    },

    /// Neither `code` nor `name` is set.
    #[error("missing code or name")]
    MissingCodeOrName,

    /// Both `code` and `name` are set.
    #[error("both code and name set")]
    BothCodeAndName,

    /// A QUERY carries `args`.
    #[error("args not valid with code; use vars")]
    ArgsWithCode,

    /// A RUN carries `vars`.
    #[error("vars not valid with name; use args")]
    VarsWithName,

    /// No `scope` in the request and no default scope configured.
    #[error("missing scope")]
    MissingScope,
}

impl RequestError {
    /// Exception kind reported to the host.
    #[must_use]
    pub const fn exception_kind(&self) -> ExceptionKind {
        match self {
            Self::NoConnection => ExceptionKind::Cancelled,
            Self::Malformed { .. }
            | Self::MissingCodeOrName
            | Self::BothCodeAndName
            | Self::ArgsWithCode
            | Self::VarsWithName
            | Self::MissingScope => ExceptionKind::BadData,
        }
    }

    /// Creates a malformed request error from a decoder error.
    #[must_use]
    pub fn from_decode_error(source: rmp_serde::decode::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed request error with a custom message.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }
}
