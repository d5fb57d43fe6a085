//! Secure transport adapter for stls.
//!
//! Moves bytes between a socket-facing pipe and an application-facing pipe,
//! either verbatim or through a TLS session, and switches between the two
//! on demand without losing or reordering bytes.
//!
//! # Layout
//!
//! - [`pipe`]: duplex pipes whose halves are leased to one relay at a time.
//! - [`worker`]: directional workers and their [`Sender`] / [`Receiver`] handles.
//! - [`relay`]: [`PlainRelay`] and [`SecureRelay`] behind the [`Relay`] trait.
//! - [`tls`]: the [`StreamWrapper`] seam and its rustls implementation.
//! - [`cert`]: server certificates.
//! - [`adapter`]: [`SecureTransport`], which owns the active relay.

pub mod adapter;
pub mod cert;
pub mod error;
pub mod pipe;
pub mod relay;
pub mod tls;
pub mod worker;

pub use adapter::SecureTransport;
pub use cert::Certificate;
pub use error::TransportError;
pub use pipe::{DuplexPipe, LeasedReader, LeasedWriter, PipeIo};
pub use relay::{PlainRelay, Relay, SecureRelay, Security};
pub use stls_core::io::Exit;
pub use tls::{RustlsWrapper, StreamWrapper, TlsIo};
pub use tokio_util::sync::CancellationToken;
pub use worker::{Receiver, Sender, WorkerState};
