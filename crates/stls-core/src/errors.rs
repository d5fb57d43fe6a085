//! Error type constants for metrics and logging.
//!
//! These constants provide consistent error classification across all crates.

/// TLS handshake error.
pub const ERROR_TLS_HANDSHAKE: &str = "tls_handshake";
/// TLS record-layer or configuration error.
pub const ERROR_TLS: &str = "tls";
/// I/O error.
pub const ERROR_IO: &str = "io";
/// Timeout error.
pub const ERROR_TIMEOUT: &str = "timeout";
/// Configuration error.
pub const ERROR_CONFIG: &str = "config";
/// Operation aborted through a cancellation token.
pub const ERROR_CANCELLED: &str = "cancelled";
/// A security transition was requested while another one was running.
pub const ERROR_BUSY: &str = "busy";
/// A pipe half was still leased to another relay.
pub const ERROR_PIPE: &str = "pipe";
/// Worker lifecycle violation (start after stop, panicked task).
pub const ERROR_WORKER: &str = "worker";
