//! Errors raised while framing or moving packages between module and host.
//!
//! I/O errors are wrapped in `Arc` so the enum stays small and the terminal
//! transport event can be cloned into log records and reporters.

use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Failures of the host channel. All of them are fatal to the module loop.
#[derive(Debug, Clone, Error)]
pub enum ProtocolError {
    /// The host closed its end of the channel.
    #[error("host closed the module channel")]
    HostClosed,

    /// The header check byte does not match the package type.
    #[error("corrupt package header: type {proto} carries check byte {check}")]
    CorruptHeader {
        /// Raw package type byte.
        proto: u8,
        /// Raw check byte.
        check: u8,
    },

    /// The payload is larger than the module accepts or the header can express.
    #[error("package payload of {size} bytes exceeds the {max_size} byte limit")]
    PayloadTooLarge {
        /// Announced or actual payload size.
        size: usize,
        /// Maximum permitted size.
        max_size: usize,
    },

    /// Reading from or writing to the channel failed.
    #[error("I/O error on the module channel: {0}")]
    Io(#[source] Arc<io::Error>),

    /// A reply payload could not be encoded as MessagePack.
    #[error("failed to encode package payload: {message}")]
    Encode {
        /// Encoder failure description.
        message: String,
    },
}

impl ProtocolError {
    /// Creates a payload-too-large error.
    #[must_use]
    pub const fn payload_too_large(size: usize, max_size: usize) -> Self {
        Self::PayloadTooLarge { size, max_size }
    }
}

impl From<io::Error> for ProtocolError {
    fn from(error: io::Error) -> Self {
        Self::Io(Arc::new(error))
    }
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(error: rmp_serde::encode::Error) -> Self {
        Self::Encode {
            message: error.to_string(),
        }
    }
}
