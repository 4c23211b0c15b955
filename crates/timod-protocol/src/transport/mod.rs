//! Stdio transport between the host node and the module.
//!
//! Inbound packages are decoded on a dedicated reader thread and forwarded to
//! the dispatch loop over a channel. The channel ends with exactly one
//! [`TransportEvent::Failed`] event, after which the reader thread exits.
//! Outbound packages go through a cloneable [`PackageWriter`] so that request
//! workers can reply concurrently without interleaving frames.

use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, RecvError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::error::ProtocolError;
use crate::package::Package;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Events delivered to the dispatch loop.
#[derive(Debug)]
pub enum TransportEvent {
    /// A package arrived from the host.
    Package(Package),
    /// The channel failed; no further events follow.
    Failed(ProtocolError),
}

/// Receiving half of the transport, owned by the dispatch loop.
#[derive(Debug)]
pub struct TransportReceiver {
    events: Receiver<TransportEvent>,
    reader: Option<JoinHandle<()>>,
}

impl TransportReceiver {
    /// Creates a receiver over an existing channel.
    ///
    /// Useful when events are produced by something other than
    /// [`spawn_reader`], such as an in-memory test harness.
    #[must_use]
    pub const fn from_channel(events: Receiver<TransportEvent>) -> Self {
        Self {
            events,
            reader: None,
        }
    }

    /// Blocks until the next event arrives.
    ///
    /// A producer that disappears without reporting a failure is reported as
    /// [`ProtocolError::HostClosed`].
    pub fn recv(&self) -> TransportEvent {
        self.events
            .recv()
            .unwrap_or_else(|RecvError| TransportEvent::Failed(ProtocolError::HostClosed))
    }

    /// Detaches the reader thread, if any.
    ///
    /// The reader blocks on the host stream, so it cannot be joined while the
    /// host keeps the stream open. Dropping the handle lets the process exit.
    pub fn detach(mut self) {
        drop(self.reader.take());
    }
}

/// Spawns the reader thread decoding packages from `reader`.
///
/// # Errors
///
/// Returns an error if the operating system refuses to spawn the thread.
pub fn spawn_reader<R>(reader: R) -> io::Result<TransportReceiver>
where
    R: Read + Send + 'static,
{
    let (sender, events) = mpsc::channel();
    let handle = thread::Builder::new()
        .name(String::from("timod-reader"))
        .spawn(move || read_packages(reader, &sender))?;
    Ok(TransportReceiver {
        events,
        reader: Some(handle),
    })
}

fn read_packages<R: Read>(mut reader: R, sender: &Sender<TransportEvent>) {
    loop {
        let event = match Package::read_from(&mut reader) {
            Ok(Some(package)) => TransportEvent::Package(package),
            Ok(None) => TransportEvent::Failed(ProtocolError::HostClosed),
            Err(error) => TransportEvent::Failed(error),
        };
        let terminal = matches!(event, TransportEvent::Failed(_));
        if sender.send(event).is_err() {
            debug!(target: TRANSPORT_TARGET, "dispatch loop gone; reader stopping");
            return;
        }
        if terminal {
            return;
        }
    }
}

/// Shared writer serialising outbound packages.
#[derive(Clone)]
pub struct PackageWriter {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PackageWriter {
    /// Wraps an output stream.
    #[must_use]
    pub fn new<W>(writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writer over the process standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writes one package as a single, flushed frame.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or writing fails.
    pub fn send(&self, package: &Package) -> Result<(), ProtocolError> {
        let frame = package.encode()?;
        // Frames are encoded before locking and written with one `write_all`.
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(&frame)?;
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for PackageWriter {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.debug_struct("PackageWriter").finish_non_exhaustive()
    }
}
