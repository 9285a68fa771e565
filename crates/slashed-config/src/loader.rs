//! On-disk configuration modules
//!
//! A module is one file in the configuration directory, named after the
//! first segment of a setting key: `database.host` lives in
//! `config/database.yaml` (or `.yml`, `.toml`, `.json`). Modules are read
//! lazily and kept for the lifetime of the loader.

use crate::ConfigFormat;
use dashmap::DashMap;
use serde_json::Value;
use slashed_core::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions probed for a module, in order
const EXTENSIONS: [&str; 4] = ["yaml", "yml", "toml", "json"];

/// Load a configuration file
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Value> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).map_err(|e| {
        Error::config(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    let format = ConfigFormat::from_path(path)?;

    load_from_str(&content, format)
}

/// Parse configuration text
pub fn load_from_str(content: &str, format: ConfigFormat) -> Result<Value> {
    let value = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse YAML: {e}")))?,
        ConfigFormat::Toml => toml::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))?,
        ConfigFormat::Json => serde_json::from_str(content)
            .map_err(|e| Error::config(format!("Failed to parse JSON: {e}")))?,
    };

    Ok(value)
}

/// Lazy, caching loader for configuration modules
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    dir: PathBuf,
    cache: DashMap<String, Option<Arc<Value>>>,
}

impl ModuleLoader {
    /// Create a loader over a configuration directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: DashMap::new(),
        }
    }

    /// Configuration directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load a module by name
    ///
    /// `Ok(None)` means no such module. Unreadable or malformed files are
    /// errors.
    pub fn load(&self, name: &str) -> Result<Option<Arc<Value>>> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(cached.value().clone());
        }

        let module = self.read(name)?.map(Arc::new);
        self.cache.insert(name.to_string(), module.clone());
        Ok(module)
    }

    fn read(&self, name: &str) -> Result<Option<Value>> {
        if name.is_empty() || name.contains(&['/', '\\'][..]) || name.starts_with('.') {
            return Ok(None);
        }

        for ext in EXTENSIONS {
            let path = self.dir.join(format!("{name}.{ext}"));
            match fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {
                    tracing::debug!(module = name, path = %path.display(), "Loading config module");
                    return load_from_file(&path).map(Some);
                }
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(Error::config(format!(
                        "Failed to stat config file {}: {e}",
                        path.display()
                    )))
                }
            }
        }

        Ok(None)
    }
}
