//! Configuration type definitions for the relay and the TLS session.

use serde::{Deserialize, Serialize};

use crate::defaults::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub tls: TlsConfig,
}

/// Relay worker settings shared by plain and secure relays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Per-direction copy buffer size (bytes).
    #[serde(default = "default_relay_buffer_size")]
    pub buffer_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_relay_buffer_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Server certificate file path (PEM format).
    #[serde(default)]
    pub cert: Option<String>,
    /// Server private key file path (PEM format).
    #[serde(default)]
    pub key: Option<String>,
    /// ALPN protocols to advertise.
    #[serde(default)]
    pub alpn: Vec<String>,
    /// Minimum TLS version (tls12, tls13). Default: tls12
    #[serde(default = "default_min_tls_version")]
    pub min_version: String,
    /// Maximum TLS version (tls12, tls13). Default: tls13
    #[serde(default = "default_max_tls_version")]
    pub max_version: String,
    /// Upper bound on a single TLS handshake.
    #[serde(default = "default_handshake_timeout_secs")]
    pub handshake_timeout_secs: u64,
    /// Send close_notify when a secure relay is stopped (e.g. on downgrade).
    #[serde(default = "default_close_notify")]
    pub close_notify: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert: None,
            key: None,
            alpn: Vec::new(),
            min_version: default_min_tls_version(),
            max_version: default_max_tls_version(),
            handshake_timeout_secs: default_handshake_timeout_secs(),
            close_notify: default_close_notify(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.relay.buffer_size, 16384);
        assert!(cfg.tls.cert.is_none());
        assert_eq!(cfg.tls.min_version, "tls12");
        assert_eq!(cfg.tls.max_version, "tls13");
        assert_eq!(cfg.tls.handshake_timeout_secs, 10);
        assert!(!cfg.tls.close_notify);
    }

    #[test]
    fn config_deserialize_empty() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.relay.buffer_size, 16384);
        assert!(cfg.tls.alpn.is_empty());
    }
}
