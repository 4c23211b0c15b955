//! Host-side protocol spoken by ThingsDB external modules.
//!
//! A module is a child process of the ThingsDB node. The node writes packages
//! to the module's standard input and reads replies from its standard output.
//! Every package is an 8-byte little-endian header followed by a MessagePack
//! payload:
//!
//! | Bytes | Field |
//! |-------|-------|
//! | 0..4  | payload length (`u32`) |
//! | 4..6  | correlation id (`u16`) |
//! | 6     | package type |
//! | 7     | check byte (`type ^ 0xFF`) |
//!
//! The crate provides the [`Package`] codec, the [`Proto`] package kinds, the
//! [`ExceptionKind`] enumeration used in error replies, and a small stdio
//! transport ([`spawn_reader`] plus [`PackageWriter`]) that feeds inbound
//! packages to a dispatch loop while letting concurrent workers reply.
//!
//! # Example
//!
//! ```
//! use timod_protocol::{ExceptionKind, Package, Proto};
//!
//! let reply = Package::exception(7, ExceptionKind::BadData, "missing code or name")
//!     .expect("encode exception");
//! assert_eq!(reply.pid(), 7);
//! assert_eq!(reply.proto(), Proto::ModuleErr);
//! ```

mod error;
mod exception;
pub mod package;
pub mod transport;

pub use self::error::ProtocolError;
pub use self::exception::ExceptionKind;
pub use self::package::{HEADER_LEN, MAX_PAYLOAD_BYTES, Package, Proto};
pub use self::transport::{PackageWriter, TransportEvent, TransportReceiver, spawn_reader};
