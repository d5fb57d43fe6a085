//! Long-lived duplex pipes and the leases relays hold on them.
//!
//! A [`DuplexPipe`] outlives every relay swap. A relay borrows the halves it
//! needs through a lease; while one relay holds a half, any other attempt to
//! lease it fails with [`TransportError::PipeBusy`] instead of interleaving
//! bytes. Dropping the lease hands the half back untouched, including any
//! bytes still buffered in it.

use std::fmt;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use stls_core::io::{ByteCounter, RelayMetrics};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::TransportError;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One side of a connection: a byte reader and a byte writer.
///
/// Cloning yields another handle to the same pipe.
#[derive(Clone)]
pub struct DuplexPipe {
    reader: Arc<Mutex<BoxReader>>,
    writer: Arc<Mutex<BoxWriter>>,
}

impl DuplexPipe {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Arc::new(Mutex::new(Box::new(reader))),
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Split a bidirectional stream (e.g. a `TcpStream`) into a pipe.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }

    pub fn lease_reader(&self) -> Result<LeasedReader, TransportError> {
        self.reader
            .clone()
            .try_lock_owned()
            .map(LeasedReader)
            .map_err(|_| TransportError::PipeBusy)
    }

    pub fn lease_writer(&self) -> Result<LeasedWriter, TransportError> {
        self.writer
            .clone()
            .try_lock_owned()
            .map(LeasedWriter)
            .map_err(|_| TransportError::PipeBusy)
    }

    /// Lease both halves as one bidirectional stream.
    pub fn lease(&self) -> Result<PipeIo, TransportError> {
        Ok(PipeIo {
            reader: self.lease_reader()?,
            writer: self.lease_writer()?,
            read_bytes: ByteCounter::new(),
        })
    }

    /// Whether any half is currently leased.
    pub fn is_leased(&self) -> bool {
        self.reader.try_lock().is_err() || self.writer.try_lock().is_err()
    }
}

impl fmt::Debug for DuplexPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexPipe")
            .field("leased", &self.is_leased())
            .finish()
    }
}

/// Exclusive access to a pipe's reader.
pub struct LeasedReader(OwnedMutexGuard<BoxReader>);

impl AsyncRead for LeasedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().0).poll_read(cx, buf)
    }
}

/// Exclusive access to a pipe's writer.
pub struct LeasedWriter(OwnedMutexGuard<BoxWriter>);

impl AsyncWrite for LeasedWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut *self.get_mut().0).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().0).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().0).poll_shutdown(cx)
    }
}

/// Both halves of a pipe leased together, handed to the TLS wrapping service.
///
/// Counts the bytes read through it so a failed handshake can report what
/// it consumed.
pub struct PipeIo {
    reader: LeasedReader,
    writer: LeasedWriter,
    read_bytes: ByteCounter,
}

impl PipeIo {
    /// Counter of bytes read so far; stays valid after the `PipeIo` is moved.
    pub fn read_counter(&self) -> ByteCounter {
        self.read_bytes.clone()
    }
}

impl AsyncRead for PipeIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let res = Pin::new(&mut this.reader).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = res {
            this.read_bytes
                .record_transfer((buf.filled().len() - before) as u64);
        }
        res
    }
}

impl AsyncWrite for PipeIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().writer).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    #[tokio::test]
    async fn test_lease_is_exclusive() {
        let (_peer, local) = duplex(64);
        let pipe = DuplexPipe::from_stream(local);

        let reader = pipe.lease_reader().unwrap();
        assert!(pipe.is_leased());
        assert!(matches!(pipe.lease_reader(), Err(TransportError::PipeBusy)));
        assert!(matches!(pipe.lease(), Err(TransportError::PipeBusy)));
        // The writer half is independent.
        let _writer = pipe.lease_writer().unwrap();

        drop(reader);
        pipe.lease_reader().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_lease_keeps_buffered_bytes() {
        let (mut peer, local) = duplex(64);
        let pipe = DuplexPipe::from_stream(local);
        peer.write_all(b"abcdef").await.unwrap();

        let mut first = pipe.lease_reader().unwrap();
        let mut buf = [0u8; 3];
        first.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"abc");
        drop(first);

        let mut second = pipe.lease_reader().unwrap();
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"def");
    }

    #[tokio::test]
    async fn test_pipe_io_counts_reads() {
        let (mut peer, local) = duplex(64);
        let pipe = DuplexPipe::from_stream(local);
        let mut io = pipe.lease().unwrap();
        let counter = io.read_counter();

        peer.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        io.read_exact(&mut buf).await.unwrap();
        io.write_all(b"ok").await.unwrap();

        let mut reply = [0u8; 2];
        peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"ok");
        assert_eq!(counter.get(), 5);
    }
}
