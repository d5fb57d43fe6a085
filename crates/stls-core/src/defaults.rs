//! Default configuration values.
//!
//! Centralized default constants for use across all crates.

// ============================================================================
// Relay Defaults
// ============================================================================

/// Default per-direction relay buffer size (16 KiB, one TLS record of plaintext).
pub const DEFAULT_RELAY_BUFFER_SIZE: usize = 16384;
/// Smallest accepted relay buffer size.
pub const MIN_RELAY_BUFFER_SIZE: usize = 1024;
/// Largest accepted relay buffer size (1 MiB).
pub const MAX_RELAY_BUFFER_SIZE: usize = 1024 * 1024;

// ============================================================================
// TLS Defaults
// ============================================================================

/// Default minimum TLS version.
pub const DEFAULT_TLS_MIN_VERSION: &str = "tls12";
/// Default maximum TLS version.
pub const DEFAULT_TLS_MAX_VERSION: &str = "tls13";
/// Default TLS handshake timeout in seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
/// Send a TLS close_notify alert when leaving a secure session.
pub const DEFAULT_CLOSE_NOTIFY: bool = false;
