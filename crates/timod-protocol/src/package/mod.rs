//! Package framing for the module channel.
//!
//! A package is written as a fixed header followed by its payload. The header
//! check byte lets the reader detect a desynchronised stream early instead of
//! interpreting arbitrary payload bytes as a length.

use std::io::{self, Read, Write};

use crate::error::ProtocolError;
use crate::exception::ExceptionKind;

/// Size of the package header in bytes.
pub const HEADER_LEN: usize = 8;

/// Largest payload the module accepts from the host.
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Package kinds exchanged between the host and a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Proto {
    /// Host to module: configuration payload.
    ModuleConf,
    /// Module to host: configuration applied.
    ModuleConfOk,
    /// Module to host: configuration rejected.
    ModuleConfErr,
    /// Host to module: request payload.
    ModuleReq,
    /// Module to host: raw response payload.
    ModuleRes,
    /// Module to host: `[code, message]` exception payload.
    ModuleErr,
    /// Any type byte the module does not know.
    Unknown(u8),
}

impl Proto {
    /// Decodes a package type byte.
    #[must_use]
    pub const fn from_byte(value: u8) -> Self {
        match value {
            64 => Self::ModuleConf,
            65 => Self::ModuleConfOk,
            66 => Self::ModuleConfErr,
            80 => Self::ModuleReq,
            81 => Self::ModuleRes,
            82 => Self::ModuleErr,
            other => Self::Unknown(other),
        }
    }

    /// Returns the type byte written in the header.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::ModuleConf => 64,
            Self::ModuleConfOk => 65,
            Self::ModuleConfErr => 66,
            Self::ModuleReq => 80,
            Self::ModuleRes => 81,
            Self::ModuleErr => 82,
            Self::Unknown(value) => value,
        }
    }
}

/// A single framed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pid: u16,
    proto: Proto,
    data: Vec<u8>,
}

impl Package {
    /// Creates a package from its parts.
    #[must_use]
    pub const fn new(pid: u16, proto: Proto, data: Vec<u8>) -> Self {
        Self { pid, proto, data }
    }

    /// Reply acknowledging a configuration.
    #[must_use]
    pub const fn conf_ok() -> Self {
        Self::new(0, Proto::ModuleConfOk, Vec::new())
    }

    /// Reply rejecting a configuration.
    #[must_use]
    pub const fn conf_err() -> Self {
        Self::new(0, Proto::ModuleConfErr, Vec::new())
    }

    /// Success reply carrying already encoded MessagePack bytes.
    ///
    /// The payload is passed through untouched.
    #[must_use]
    pub const fn response_raw(pid: u16, data: Vec<u8>) -> Self {
        Self::new(pid, Proto::ModuleRes, data)
    }

    /// Exception reply for the request identified by `pid`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Encode`] if the payload cannot be encoded.
    pub fn exception(
        pid: u16,
        kind: ExceptionKind,
        message: impl AsRef<str>,
    ) -> Result<Self, ProtocolError> {
        let data = rmp_serde::to_vec(&(kind.code(), message.as_ref()))?;
        Ok(Self::new(pid, Proto::ModuleErr, data))
    }

    /// Correlation id of the package.
    #[must_use]
    pub const fn pid(&self) -> u16 {
        self.pid
    }

    /// Package kind.
    #[must_use]
    pub const fn proto(&self) -> Proto {
        self.proto
    }

    /// Payload bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the package and returns its payload.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Reads one package from `reader`.
    ///
    /// Returns `Ok(None)` only when the stream ends before the first header
    /// byte.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::CorruptHeader`] when the check byte does not
    /// match, [`ProtocolError::PayloadTooLarge`] for oversized payloads, and
    /// [`ProtocolError::Io`] when the stream fails or ends mid-package,
    /// including part way through a header.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>, ProtocolError> {
        let mut header = [0_u8; HEADER_LEN];
        let (first, rest) = header.split_at_mut(1);
        match reader.read_exact(first) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(error) => return Err(error.into()),
        }
        reader.read_exact(rest)?;

        let [l0, l1, l2, l3, p0, p1, proto, check] = header;
        if proto ^ 0xFF != check {
            return Err(ProtocolError::CorruptHeader { proto, check });
        }

        let length = usize::try_from(u32::from_le_bytes([l0, l1, l2, l3]))
            .unwrap_or(usize::MAX);
        if length > MAX_PAYLOAD_BYTES {
            return Err(ProtocolError::payload_too_large(length, MAX_PAYLOAD_BYTES));
        }

        let mut data = vec![0_u8; length];
        reader.read_exact(&mut data)?;

        Ok(Some(Self::new(
            u16::from_le_bytes([p0, p1]),
            Proto::from_byte(proto),
            data,
        )))
    }

    /// Encodes the header and payload into a single buffer.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::PayloadTooLarge`] if the payload length does
    /// not fit in the header.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let length = u32::try_from(self.data.len())
            .map_err(|_| ProtocolError::payload_too_large(self.data.len(), u32::MAX as usize))?;
        let proto = self.proto.as_byte();

        let mut buffer = Vec::with_capacity(HEADER_LEN + self.data.len());
        buffer.extend_from_slice(&length.to_le_bytes());
        buffer.extend_from_slice(&self.pid.to_le_bytes());
        buffer.push(proto);
        buffer.push(proto ^ 0xFF);
        buffer.extend_from_slice(&self.data);
        Ok(buffer)
    }

    /// Writes the package to `writer` and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), ProtocolError> {
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        Ok(())
    }
}
