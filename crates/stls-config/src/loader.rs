//! Configuration file loading and error types.
//!
//! A config file is parsed according to its extension, relative certificate
//! and key paths are anchored at the file's own directory, and the result is
//! validated before it is handed out.

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Config, TlsConfig, validate_config};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported config extension {0:?} (expected json, jsonc, yaml, yml or toml)")]
    UnsupportedFormat(String),
    #[error("invalid config: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    /// JSON, with `//` and `/* */` comments allowed.
    Json,
    Yaml,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        match ext {
            "json" | "jsonc" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            "toml" => Ok(Format::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    fn parse(self, data: &str) -> Result<Config, ConfigError> {
        match self {
            Format::Json => {
                let stripped = json_comments::StripComments::new(data.as_bytes());
                Ok(serde_json::from_reader(stripped)?)
            }
            Format::Yaml => Ok(serde_yaml::from_str(data)?),
            Format::Toml => Ok(toml::from_str(data)?),
        }
    }
}

/// Load, anchor and validate a config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let format = Format::from_path(path)?;
    let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config = format.parse(&data)?;
    if let Some(base) = path.parent() {
        anchor_tls_paths(&mut config.tls, base);
    }
    validate_config(&config)?;
    Ok(config)
}

/// Resolve relative `tls.cert` / `tls.key` against `base`.
fn anchor_tls_paths(tls: &mut TlsConfig, base: &Path) {
    for slot in [&mut tls.cert, &mut tls.key] {
        if let Some(file) = slot.as_mut()
            && !file.trim().is_empty()
            && Path::new(file.as_str()).is_relative()
        {
            *file = base.join(file.as_str()).to_string_lossy().into_owned();
        }
    }
}
