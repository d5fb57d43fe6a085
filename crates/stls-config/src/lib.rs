//! Configuration loading and validation for the secure transport adapter.

mod defaults;
mod loader;
mod types;
mod validate;

pub use loader::{ConfigError, load_config};
pub use types::*;
pub use validate::validate_config;
