//! # stls
//!
//! A secure transport adapter for connection-oriented protocols that switch
//! a live connection between plaintext and TLS (FTP `AUTH TLS` / `CCC`,
//! SMTP/IMAP `STARTTLS`).
//!
//! ## Crates
//!
//! - [`stls_core`] - Default values, error kinds and the directional copy pump
//! - [`stls_config`] - Configuration loading and validation
//! - [`stls_transport`] - Relays, TLS wrapping and the [`SecureTransport`] adapter
//!
//! [`SecureTransport`]: stls_transport::SecureTransport

pub use stls_config as config;
pub use stls_core as core;
pub use stls_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use stls_config::{Config, load_config, validate_config};
    pub use stls_transport::{
        CancellationToken, Certificate, DuplexPipe, SecureTransport, Security, TransportError,
    };
}
