//! Exception kinds carried by module error replies.
//!
//! The codes are shared with the ThingsDB client protocol, which lets a module
//! that talks to another ThingsDB node pass backend errors through unchanged.

use std::fmt;

/// Exception kind of a `ModuleErr` reply.
///
/// Known codes have named variants. Any other code, such as the
/// `-127..=-100` range reserved for user raised errors, is kept as
/// [`ExceptionKind::Custom`] so conversion from a code is total and lossless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// The request was cancelled or could not be served.
    Cancelled,
    /// Operation not valid in the current context.
    Operation,
    /// Wrong number of arguments.
    NumArguments,
    /// Argument of the wrong type.
    Type,
    /// Argument with an invalid value.
    Value,
    /// Integer overflow.
    Overflow,
    /// Division or modulo by zero.
    ZeroDiv,
    /// A quota has been reached.
    MaxQuota,
    /// Authentication failed.
    Auth,
    /// Not allowed with the current privileges.
    Forbidden,
    /// Requested item does not exist.
    Lookup,
    /// Malformed or invalid request data.
    BadData,
    /// Syntax error in the code.
    Syntax,
    /// Node not able to handle the request.
    Node,
    /// Assertion failed.
    Assertion,
    /// Result too large to return.
    ResultTooLarge,
    /// Request timed out.
    RequestTimeout,
    /// Request was cancelled by the node.
    RequestCancel,
    /// Failed to write to a socket.
    WriteUv,
    /// Out of memory.
    Memory,
    /// Internal error.
    Internal,
    /// Any code without a named variant.
    Custom(i8),
}

impl ExceptionKind {
    /// Maps a numeric error code onto its exception kind.
    #[must_use]
    pub const fn from_code(code: i8) -> Self {
        match code {
            -64 => Self::Cancelled,
            -63 => Self::Operation,
            -62 => Self::NumArguments,
            -61 => Self::Type,
            -60 => Self::Value,
            -59 => Self::Overflow,
            -58 => Self::ZeroDiv,
            -57 => Self::MaxQuota,
            -56 => Self::Auth,
            -55 => Self::Forbidden,
            -54 => Self::Lookup,
            -53 => Self::BadData,
            -52 => Self::Syntax,
            -51 => Self::Node,
            -50 => Self::Assertion,
            -6 => Self::ResultTooLarge,
            -5 => Self::RequestTimeout,
            -4 => Self::RequestCancel,
            -3 => Self::WriteUv,
            -2 => Self::Memory,
            -1 => Self::Internal,
            other => Self::Custom(other),
        }
    }

    /// Returns the numeric code written on the wire.
    #[must_use]
    pub const fn code(self) -> i8 {
        match self {
            Self::Cancelled => -64,
            Self::Operation => -63,
            Self::NumArguments => -62,
            Self::Type => -61,
            Self::Value => -60,
            Self::Overflow => -59,
            Self::ZeroDiv => -58,
            Self::MaxQuota => -57,
            Self::Auth => -56,
            Self::Forbidden => -55,
            Self::Lookup => -54,
            Self::BadData => -53,
            Self::Syntax => -52,
            Self::Node => -51,
            Self::Assertion => -50,
            Self::ResultTooLarge => -6,
            Self::RequestTimeout => -5,
            Self::RequestCancel => -4,
            Self::WriteUv => -3,
            Self::Memory => -2,
            Self::Internal => -1,
            Self::Custom(code) => code,
        }
    }

    /// Returns the name ThingsDB uses for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "CANCELLED_ERROR",
            Self::Operation => "OPERATION_ERROR",
            Self::NumArguments => "NUM_ARGUMENTS_ERROR",
            Self::Type => "TYPE_ERROR",
            Self::Value => "VALUE_ERROR",
            Self::Overflow => "OVERFLOW_ERROR",
            Self::ZeroDiv => "ZERO_DIV_ERROR",
            Self::MaxQuota => "MAX_QUOTA_ERROR",
            Self::Auth => "AUTH_ERROR",
            Self::Forbidden => "FORBIDDEN_ERROR",
            Self::Lookup => "LOOKUP_ERROR",
            Self::BadData => "BAD_DATA_ERROR",
            Self::Syntax => "SYNTAX_ERROR",
            Self::Node => "NODE_ERROR",
            Self::Assertion => "ASSERT_ERROR",
            Self::ResultTooLarge => "RESULT_TOO_LARGE",
            Self::RequestTimeout => "REQUEST_TIMEOUT",
            Self::RequestCancel => "REQUEST_CANCEL",
            Self::WriteUv => "WRITE_UV_ERROR",
            Self::Memory => "MEMORY_ERROR",
            Self::Internal => "INTERNAL_ERROR",
            Self::Custom(_) => "CUSTOM_ERROR",
        }
    }
}

impl From<i8> for ExceptionKind {
    fn from(code: i8) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} ({})", self.as_str(), self.code())
    }
}
