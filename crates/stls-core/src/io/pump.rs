//! One-directional copy pump with explicit stop, abort and pause signals.
//!
//! Every relay worker drives one [`Pump`]: read a chunk, write it in full,
//! flush, repeat. Metrics recording is abstracted via the `RelayMetrics`
//! trait so callers can count bytes without the pump knowing where they go.
//!
//! Signals are checked at two different points:
//!
//! - `stop` only interrupts a *pending read*. Tokio readers do not consume
//!   bytes from a read future that never completed, so a stopped pump leaves
//!   every unread byte in its source for whoever leases it next.
//! - `abort` interrupts anything, including a write blocked on back-pressure.
//!   A chunk cut short this way is lost; this is the hard-cancel path.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use super::PauseGate;

/// Trait for recording relay metrics.
pub trait RelayMetrics: Send + Sync {
    /// Record bytes delivered (written and flushed) to the destination.
    fn record_transfer(&self, bytes: u64);
}

/// No-op metrics implementation for cases where metrics aren't needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl RelayMetrics for NoOpMetrics {
    #[inline]
    fn record_transfer(&self, _bytes: u64) {}
}

/// Shared counter of delivered bytes.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes recorded so far.
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl RelayMetrics for ByteCounter {
    #[inline]
    fn record_transfer(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }
}

/// Why a pump stopped running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Exit {
    /// The source reported end-of-stream.
    Eof,
    /// A graceful stop was requested.
    Stopped,
    /// The abort token fired.
    Cancelled,
    /// The source or destination reported an I/O fault.
    Fault { kind: io::ErrorKind, message: String },
}

impl Exit {
    pub fn fault(err: &io::Error) -> Self {
        Exit::Fault {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Exit::Fault { .. })
    }
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Eof => f.write_str("eof"),
            Exit::Stopped => f.write_str("stopped"),
            Exit::Cancelled => f.write_str("cancelled"),
            Exit::Fault { kind, message } => write!(f, "fault ({:?}): {}", kind, message),
        }
    }
}

/// Control signals observed by a running pump.
#[derive(Debug, Clone)]
pub struct Signals {
    /// Graceful stop. A child of `abort`, so an abort also stops.
    pub stop: CancellationToken,
    /// Hard cancel.
    pub abort: CancellationToken,
    /// Optional pause gate (receivers only).
    pub pause: Option<PauseGate>,
}

impl Signals {
    /// Derive pump signals from a parent cancellation token.
    pub fn new(parent: &CancellationToken) -> Self {
        let abort = parent.child_token();
        Self {
            stop: abort.child_token(),
            abort,
            pause: None,
        }
    }

    pub fn with_pause(mut self, gate: PauseGate) -> Self {
        self.pause = Some(gate);
        self
    }

    fn interrupted(&self) -> Exit {
        if self.abort.is_cancelled() {
            Exit::Cancelled
        } else {
            Exit::Stopped
        }
    }
}

/// A reader/writer pair plus the chunk buffer moving bytes between them.
pub struct Pump<R, W> {
    reader: R,
    writer: W,
    buf: Box<[u8]>,
}

impl<R, W> Pump<R, W> {
    pub fn new(reader: R, writer: W, buffer_size: usize) -> Self {
        Self {
            reader,
            writer,
            buf: vec![0u8; buffer_size.max(1)].into_boxed_slice(),
        }
    }

    /// Give back the source and destination.
    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R, W> Pump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Copy until end-of-stream, a fault, or a signal.
    ///
    /// Byte order is preserved exactly. A chunk that was read is written and
    /// flushed before a graceful stop is honoured.
    pub async fn run<M: RelayMetrics + ?Sized>(&mut self, signals: &Signals, metrics: &M) -> Exit {
        loop {
            if let Some(gate) = &signals.pause
                && gate.is_paused()
            {
                tokio::select! {
                    biased;
                    _ = signals.stop.cancelled() => return signals.interrupted(),
                    _ = gate.resumed() => continue,
                }
            }

            let read = tokio::select! {
                biased;
                _ = signals.stop.cancelled() => return signals.interrupted(),
                _ = paused(signals.pause.as_ref()) => continue,
                read = self.reader.read(&mut self.buf) => read,
            };
            let n = match read {
                Ok(0) => {
                    return match self.flush(signals).await {
                        Ok(()) => Exit::Eof,
                        Err(exit) => exit,
                    };
                }
                Ok(n) => n,
                Err(e) => return Exit::fault(&e),
            };

            let delivered = tokio::select! {
                biased;
                _ = signals.abort.cancelled() => return Exit::Cancelled,
                res = write_chunk(&mut self.writer, &self.buf[..n]) => res,
            };
            if let Err(e) = delivered {
                return Exit::fault(&e);
            }
            metrics.record_transfer(n as u64);
        }
    }

    async fn flush(&mut self, signals: &Signals) -> Result<(), Exit> {
        tokio::select! {
            biased;
            _ = signals.abort.cancelled() => Err(Exit::Cancelled),
            res = self.writer.flush() => res.map_err(|e| Exit::fault(&e)),
        }
    }
}

async fn write_chunk<W: AsyncWrite + Unpin>(writer: &mut W, chunk: &[u8]) -> io::Result<()> {
    writer.write_all(chunk).await?;
    writer.flush().await
}

async fn paused(gate: Option<&PauseGate>) {
    match gate {
        Some(gate) => gate.paused().await,
        None => std::future::pending().await,
    }
}
