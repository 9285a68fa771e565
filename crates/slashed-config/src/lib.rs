//! # Slashed Configuration
//!
//! Setting resolution with support for:
//! - Explicit in-process settings
//! - An environment file (`KEY=VALUE` lines)
//! - On-disk configuration modules (YAML, TOML, JSON)
//! - Lookup expressions with fallback chains (`env:PORT|8000`)

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod env_file;
pub mod expr;
pub mod loader;
pub mod resolver;

pub use expr::{is_solvable, Expr, Source};
pub use loader::{load_from_file, load_from_str, ModuleLoader};
pub use resolver::{ConfigResolver, ConfigResolverBuilder, Lookup};

use slashed_core::{Error, Result};
use std::path::Path;

/// Configuration format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// TOML format
    Toml,
    /// JSON format
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| Error::config("Unable to detect config format"))?;

        match ext {
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            "toml" => Ok(ConfigFormat::Toml),
            "json" => Ok(ConfigFormat::Json),
            _ => Err(Error::config(format!("Unsupported config format: {ext}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_detect_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.yaml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert_eq!(
            ConfigFormat::from_path(&PathBuf::from("config.json")).unwrap(),
            ConfigFormat::Json
        );
    }

    #[test]
    fn test_unsupported_format() {
        let result = ConfigFormat::from_path(&PathBuf::from("config.txt"));
        assert!(result.is_err());
    }
}
