//! Configuration validation logic.

use crate::Config;
use crate::defaults::{max_relay_buffer_size, min_relay_buffer_size};
use crate::loader::ConfigError;

pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.relay.buffer_size < min_relay_buffer_size() {
        return Err(ConfigError::Validation(format!(
            "relay.buffer_size must be >= {}",
            min_relay_buffer_size()
        )));
    }
    if config.relay.buffer_size > max_relay_buffer_size() {
        return Err(ConfigError::Validation(format!(
            "relay.buffer_size must be <= {}",
            max_relay_buffer_size()
        )));
    }
    match (&config.tls.cert, &config.tls.key) {
        (Some(cert), _) if cert.trim().is_empty() => {
            return Err(ConfigError::Validation("tls.cert is empty".into()));
        }
        (_, Some(key)) if key.trim().is_empty() => {
            return Err(ConfigError::Validation("tls.key is empty".into()));
        }
        (Some(_), None) | (None, Some(_)) => {
            return Err(ConfigError::Validation(
                "tls.cert and tls.key must be set together".into(),
            ));
        }
        _ => {}
    }
    // Validate TLS versions
    let valid_versions = ["tls12", "tls13"];
    if !valid_versions.contains(&config.tls.min_version.as_str()) {
        return Err(ConfigError::Validation(format!(
            "tls.min_version must be one of: {:?}",
            valid_versions
        )));
    }
    if !valid_versions.contains(&config.tls.max_version.as_str()) {
        return Err(ConfigError::Validation(format!(
            "tls.max_version must be one of: {:?}",
            valid_versions
        )));
    }
    if config.tls.min_version == "tls13" && config.tls.max_version == "tls12" {
        return Err(ConfigError::Validation(
            "tls.min_version cannot be greater than tls.max_version".into(),
        ));
    }
    if config.tls.handshake_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "tls.handshake_timeout_secs must be > 0".into(),
        ));
    }
    if config.tls.alpn.iter().any(|p| p.is_empty() || p.len() > 255) {
        return Err(ConfigError::Validation(
            "tls.alpn entries must be 1..=255 bytes".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejects(config: &Config, needle: &str) {
        match validate_config(config) {
            Err(ConfigError::Validation(msg)) => assert!(msg.contains(needle), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        validate_config(&Config::default()).unwrap();
    }

    #[test]
    fn buffer_bounds() {
        let mut cfg = Config::default();
        cfg.relay.buffer_size = 512;
        rejects(&cfg, "relay.buffer_size");
        cfg.relay.buffer_size = 2 * 1024 * 1024;
        rejects(&cfg, "relay.buffer_size");
    }

    #[test]
    fn cert_and_key_paired() {
        let mut cfg = Config::default();
        cfg.tls.cert = Some("cert.pem".into());
        rejects(&cfg, "set together");
        cfg.tls.key = Some(" ".into());
        rejects(&cfg, "tls.key is empty");
        cfg.tls.key = Some("key.pem".into());
        validate_config(&cfg).unwrap();
    }

    #[test]
    fn version_ordering() {
        let mut cfg = Config::default();
        cfg.tls.min_version = "tls13".into();
        cfg.tls.max_version = "tls12".into();
        rejects(&cfg, "cannot be greater");
        cfg.tls.max_version = "ssl3".into();
        rejects(&cfg, "tls.max_version");
    }

    #[test]
    fn zero_handshake_timeout() {
        let mut cfg = Config::default();
        cfg.tls.handshake_timeout_secs = 0;
        rejects(&cfg, "handshake_timeout_secs");
    }
}
