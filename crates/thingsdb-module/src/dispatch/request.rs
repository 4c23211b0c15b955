//! Request envelope decoding and validation.

use serde::Deserialize;

use crate::backend::Vars;

use super::errors::RequestError;

/// Request as decoded from a request package.
///
/// `nil` values count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct RequestEnvelope {
    /// Scope to run in.
    #[serde(default)]
    pub scope: Option<String>,
    /// Code to evaluate (QUERY).
    #[serde(default)]
    pub code: Option<String>,
    /// Procedure to run (RUN).
    #[serde(default)]
    pub name: Option<String>,
    /// Variables for a QUERY.
    #[serde(default)]
    pub vars: Option<Vars>,
    /// Arguments for a RUN.
    #[serde(default)]
    pub args: Option<rmpv::Value>,
}

/// Validated backend operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Evaluate code with named variables.
    Query {
        /// Scope to run in.
        scope: String,
        /// Code to evaluate.
        code: String,
        /// Variables bound by name.
        vars: Option<Vars>,
    },
    /// Run a stored procedure.
    Run {
        /// Scope to run in.
        scope: String,
        /// Procedure name.
        name: String,
        /// Procedure arguments.
        args: Option<rmpv::Value>,
    },
}

impl Operation {
    /// Short label used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Run { .. } => "run",
        }
    }
}

impl RequestEnvelope {
    /// Decodes a request package payload.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Malformed`] if the payload is empty or is not a
    /// request map.
    pub fn parse(data: &[u8]) -> Result<Self, RequestError> {
        if data.is_empty() {
            return Err(RequestError::malformed("empty request"));
        }
        rmp_serde::from_slice(data).map_err(RequestError::from_decode_error)
    }

    /// Turns the envelope into an operation.
    ///
    /// Checks run in order and the first failure wins: code/name presence,
    /// code and name together, payload kind against operation, then the scope.
    /// A missing scope falls back to `default_scope`.
    ///
    /// # Errors
    ///
    /// Returns the [`RequestError`] for the first failed check.
    pub fn into_operation(self, default_scope: Option<&str>) -> Result<Operation, RequestError> {
        let Self {
            scope,
            code,
            name,
            vars,
            args,
        } = self;

        let resolve_scope = |requested: Option<String>| {
            requested
                .or_else(|| default_scope.map(str::to_owned))
                .ok_or(RequestError::MissingScope)
        };

        match (code, name) {
            (None, None) => Err(RequestError::MissingCodeOrName),
            (Some(_), Some(_)) => Err(RequestError::BothCodeAndName),
            (Some(_), None) if args.is_some() => Err(RequestError::ArgsWithCode),
            (None, Some(_)) if vars.is_some() => Err(RequestError::VarsWithName),
            (Some(text), None) => Ok(Operation::Query {
                scope: resolve_scope(scope)?,
                code: text,
                vars,
            }),
            (None, Some(procedure)) => Ok(Operation::Run {
                scope: resolve_scope(scope)?,
                name: procedure,
                args,
            }),
        }
    }
}
