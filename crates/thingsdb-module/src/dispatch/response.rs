//! Translation of request results into reply packages.

use timod_protocol::{ExceptionKind, Package, ProtocolError};

use crate::backend::{BackendError, ResponseOutcome};

use super::errors::RequestError;

/// Builds the reply for a backend outcome.
///
/// Response bytes are forwarded as they are. Backend errors keep their code
/// and message; transport errors become `BAD_DATA_ERROR` exceptions.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if an exception payload cannot be
/// encoded.
pub fn translate_outcome(pid: u16, outcome: ResponseOutcome) -> Result<Package, ProtocolError> {
    match outcome {
        Ok(bytes) => Ok(Package::response_raw(pid, bytes)),
        Err(BackendError::Thingsdb { code, message }) => {
            Package::exception(pid, ExceptionKind::from_code(code), message)
        }
        Err(BackendError::Transport { message }) => Package::exception(
            pid,
            ExceptionKind::BadData,
            format!("unexpected error: {message}"),
        ),
    }
}

/// Builds the reply for a request refused before reaching the backend.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if the exception payload cannot be
/// encoded.
pub fn translate_rejection(pid: u16, error: &RequestError) -> Result<Package, ProtocolError> {
    Package::exception(pid, error.exception_kind(), error.to_string())
}

/// Builds the reply for any result of [`super::RequestDispatcher::handle`].
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if an exception payload cannot be
/// encoded.
pub fn reply_for(
    pid: u16,
    result: Result<ResponseOutcome, RequestError>,
) -> Result<Package, ProtocolError> {
    match result {
        Ok(outcome) => translate_outcome(pid, outcome),
        Err(error) => translate_rejection(pid, &error),
    }
}
