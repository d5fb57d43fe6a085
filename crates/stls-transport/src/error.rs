//! Error types for the transport crate.

use stls_core::errors;
use thiserror::Error;

/// Errors that can occur in transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("certificate generation failed: {0}")]
    CertGeneration(String),

    #[error("security transition already in progress")]
    Busy,

    /// The secure relay could not be built. `consumed` socket bytes were
    /// read by the failed attempt and cannot be replayed.
    #[error("TLS handshake failed after consuming {consumed} socket bytes: {source}")]
    Handshake {
        consumed: u64,
        #[source]
        source: Box<TransportError>,
    },

    #[error("TLS handshake timed out")]
    HandshakeTimeout,

    #[error("operation cancelled")]
    Cancelled,

    #[error("pipe is leased to another relay")]
    PipeBusy,

    #[error("worker already exited")]
    WorkerExited,

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl TransportError {
    /// Whether this error stems from a cancellation signal rather than a fault.
    pub fn is_cancelled(&self) -> bool {
        match self {
            TransportError::Cancelled => true,
            TransportError::Handshake { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Stable classification for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Io(_) => errors::ERROR_IO,
            TransportError::Tls(_) => errors::ERROR_TLS,
            TransportError::Config(_) | TransportError::CertGeneration(_) => errors::ERROR_CONFIG,
            TransportError::Busy => errors::ERROR_BUSY,
            TransportError::Handshake { source, .. } if source.is_cancelled() => {
                errors::ERROR_CANCELLED
            }
            TransportError::Handshake { .. } => errors::ERROR_TLS_HANDSHAKE,
            TransportError::HandshakeTimeout => errors::ERROR_TIMEOUT,
            TransportError::Cancelled => errors::ERROR_CANCELLED,
            TransportError::PipeBusy => errors::ERROR_PIPE,
            TransportError::WorkerExited | TransportError::Join(_) => errors::ERROR_WORKER,
        }
    }
}
