//! Three-tier setting resolution
//!
//! Plain keys are looked up in explicit settings first, then in the
//! environment file, then in on-disk configuration modules. Keys containing
//! a colon are [expressions](crate::expr) and are solved instead. Values
//! read from modules are re-resolved, so a module may point at the
//! environment or at paths indirectly:
//!
//! ```yaml
//! # config/database.yaml
//! url: env:DATABASE_URL|local.db
//! dir: path:data
//! ```

use crate::env_file;
use crate::expr::{is_solvable, Expr, Source};
use crate::loader::ModuleLoader;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use slashed_core::{Error, Result, Settings};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Nesting limit for expressions that refer to other expressions
const MAX_DEPTH: usize = 32;

/// Outcome of an on-disk lookup, for callers that need to tell misses apart
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The key resolved to a value
    Found(Value),
    /// No module with that name exists
    ModuleMissing {
        /// Module name
        module: String,
    },
    /// The module exists but the path does not
    PathMissing {
        /// Module name
        module: String,
        /// First segment that could not be followed
        segment: String,
    },
}

/// Setting resolver over explicit values, the environment file and
/// configuration modules
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    basedir: PathBuf,
    values: HashMap<String, Value>,
    env: HashMap<String, String>,
    modules: ModuleLoader,
}

impl ConfigResolver {
    /// Start building a resolver rooted at `basedir`
    pub fn builder(basedir: impl Into<PathBuf>) -> ConfigResolverBuilder {
        ConfigResolverBuilder::new(basedir)
    }

    /// Resolver with default environment file and configuration directory
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self::builder(basedir).build()
    }

    /// Base directory paths are resolved against
    pub fn basedir(&self) -> &Path {
        &self.basedir
    }

    /// Configuration module directory
    pub fn config_dir(&self) -> &Path {
        self.modules.dir()
    }

    /// Raw environment-file entry
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Resolve a key or expression
    ///
    /// `Ok(None)` is a normal outcome. Errors only come from configuration
    /// modules that exist but cannot be read.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.lookup(key, 0)
    }

    /// Resolve and deserialize a setting
    ///
    /// String values are also tried as JSON text, so `PORT=8000` from the
    /// environment file reads as a number.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };

        match serde_json::from_value::<T>(value.clone()) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(err) => match value.as_str() {
                Some(text) => serde_json::from_str(text).map(Some).map_err(|_| err.into()),
                None => Err(err.into()),
            },
        }
    }

    /// Store an explicit setting; returns the stored value
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Value {
        let value = value.into();
        self.values.insert(key.into(), value.clone());
        value
    }

    /// Diagnose an on-disk lookup without the usual miss swallowing
    pub fn explain(&self, key: &str) -> Result<Lookup> {
        match self.locate(key)? {
            Lookup::Found(raw) => Ok(match self.resolve_value(raw, 0)? {
                Some(value) => Lookup::Found(value),
                None => Lookup::Found(Value::Null),
            }),
            miss => Ok(miss),
        }
    }

    fn lookup(&self, key: &str, depth: usize) -> Result<Option<Value>> {
        if depth > MAX_DEPTH {
            return Err(Error::config(format!(
                "Setting '{key}' nests expressions deeper than {MAX_DEPTH} levels"
            )));
        }

        if let Some(expr) = Expr::parse(key) {
            return self.solve(&expr, depth);
        }

        if let Some(value) = self.values.get(key) {
            return Ok(Some(value.clone()));
        }

        if let Some(value) = self.env.get(key) {
            return Ok(Some(Value::String(value.clone())));
        }

        self.search_config(key, depth)
    }

    fn solve(&self, expr: &Expr, depth: usize) -> Result<Option<Value>> {
        for source in expr.alternatives() {
            let solution = match source {
                Source::Literal(value) => return Ok(Some(Value::String(value.clone()))),
                Source::Env(key) => self.env.get(key).cloned().map(Value::String),
                Source::Path(path) => Some(Value::String(
                    self.resolve_path(path).to_string_lossy().into_owned(),
                )),
                Source::Config(key) => self.lookup(key, depth + 1)?,
                Source::Unknown { method, .. } => {
                    tracing::trace!(method = %method, "Unknown lookup method");
                    None
                }
            };

            if solution.is_some() {
                return Ok(solution);
            }
        }

        Ok(None)
    }

    fn search_config(&self, key: &str, depth: usize) -> Result<Option<Value>> {
        match self.locate(key)? {
            Lookup::Found(raw) => self.resolve_value(raw, depth),
            _ => Ok(None),
        }
    }

    fn locate(&self, key: &str) -> Result<Lookup> {
        let (module, path) = match key.split_once('.') {
            Some((module, path)) => (module, Some(path)),
            None => (key, None),
        };

        let Some(root) = self.modules.load(module)? else {
            return Ok(Lookup::ModuleMissing {
                module: module.to_string(),
            });
        };

        let mut current: &Value = &root;
        for segment in path.into_iter().flat_map(|path| path.split('.')) {
            let child = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };

            match child {
                Some(child) => current = child,
                None => {
                    return Ok(Lookup::PathMissing {
                        module: module.to_string(),
                        segment: segment.to_string(),
                    })
                }
            }
        }

        Ok(Lookup::Found(current.clone()))
    }

    /// Solve expression leaves, rebuilding mappings and sequences
    fn resolve_value(&self, value: Value, depth: usize) -> Result<Option<Value>> {
        match value {
            Value::String(text) if is_solvable(&text) => self.lookup(&text, depth + 1),
            Value::Object(map) => {
                let mut solved = Map::with_capacity(map.len());
                for (key, child) in map {
                    if let Some(child) = self.resolve_value(child, depth)? {
                        solved.insert(key, child);
                    }
                }
                Ok(Some(Value::Object(solved)))
            }
            Value::Array(items) => {
                let solved = items
                    .into_iter()
                    .map(|item| Ok(self.resolve_value(item, depth)?.unwrap_or(Value::Null)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Value::Array(solved)))
            }
            other => Ok(Some(other)),
        }
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let base = self
            .values
            .get("basedir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.basedir.clone());
        absolutize(&base, Path::new(path))
    }
}

impl Settings for ConfigResolver {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        ConfigResolver::get(self, key)
    }
}

/// Builder for [`ConfigResolver`]
#[derive(Debug)]
pub struct ConfigResolverBuilder {
    basedir: PathBuf,
    env_file: Option<PathBuf>,
    config_dir: Option<PathBuf>,
    values: HashMap<String, Value>,
}

impl ConfigResolverBuilder {
    /// Create a builder rooted at `basedir`
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self {
            basedir: basedir.into(),
            env_file: None,
            config_dir: None,
            values: HashMap::new(),
        }
    }

    /// Environment file location, relative to the base directory unless
    /// absolute (default `.env`)
    pub fn env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    /// Configuration module directory, relative to the base directory
    /// unless absolute (default `config`)
    pub fn config_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_dir = Some(path.into());
        self
    }

    /// Preset an explicit setting
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Build the resolver, reading the environment file once
    ///
    /// A missing or unreadable environment file leaves the environment
    /// tier empty.
    pub fn build(self) -> ConfigResolver {
        let basedir = absolutize(&current_dir(), &self.basedir);

        let env_path = absolutize(
            &basedir,
            self.env_file.as_deref().unwrap_or_else(|| Path::new(".env")),
        );
        let env = match env_file::load(&env_path) {
            Ok(env) => {
                tracing::debug!(
                    path = %env_path.display(),
                    vars = env.len(),
                    "Loaded environment file"
                );
                env
            }
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %env_path.display(), "No environment file found");
                HashMap::new()
            }
            Err(e) => {
                tracing::warn!(
                    path = %env_path.display(),
                    error = %e,
                    "Ignoring unreadable environment file"
                );
                HashMap::new()
            }
        };

        let config_dir = absolutize(
            &basedir,
            self.config_dir.as_deref().unwrap_or_else(|| Path::new("config")),
        );

        let mut values = self.values;
        values
            .entry("basedir".to_string())
            .or_insert_with(|| Value::String(basedir.to_string_lossy().into_owned()));

        ConfigResolver {
            basedir,
            values,
            env,
            modules: ModuleLoader::new(config_dir),
        }
    }
}

fn current_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}

/// Join `path` onto `base` unless absolute, then fold `.` and `..`
fn absolutize(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
