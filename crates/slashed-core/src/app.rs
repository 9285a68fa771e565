//! Application-wide state shared by every request
//!
//! The [`App`] is built once, wrapped in an `Arc` and handed to every
//! [`Context`](crate::Context). It carries the three templates that
//! request-scoped views fall back to, and the [`Settings`] source.

use crate::error::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Read access to application settings
///
/// Implemented by the configuration resolver; the core only ever reads.
pub trait Settings: Send + Sync + fmt::Debug {
    /// Look up a setting; `Ok(None)` when nothing is configured
    fn get(&self, key: &str) -> Result<Option<Value>>;
}

impl Settings for HashMap<String, Value> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(HashMap::get(self, key).cloned())
    }
}

/// Shared defaults for one kind of request-scoped view
///
/// Values set here are visible to every request without being copied;
/// a value set on a view shadows the template entry for that request only.
#[derive(Debug, Clone, Default)]
pub struct Template {
    values: HashMap<String, Value>,
}

impl Template {
    /// Create an empty template
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a default value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a default value
    pub fn set(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Remove a default value
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    /// Number of defaults
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no defaults are set
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The three templates: context, request and response
#[derive(Debug, Clone, Default)]
pub struct Templates {
    /// Defaults for [`Context`](crate::Context)
    pub context: Template,
    /// Defaults for [`RequestView`](crate::RequestView)
    pub request: Template,
    /// Defaults for [`ResponseView`](crate::ResponseView)
    pub response: Template,
}

/// Immutable application state referenced by every request
pub struct App {
    templates: Templates,
    settings: Arc<dyn Settings>,
    env: Option<String>,
}

impl App {
    /// Create the shared application state
    pub fn new(templates: Templates, settings: Arc<dyn Settings>) -> Self {
        Self {
            templates,
            settings,
            env: None,
        }
    }

    /// Set the deployment environment name
    pub fn with_env(mut self, env: Option<String>) -> Self {
        self.env = env;
        self
    }

    /// Shared templates
    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Look up a setting
    pub fn setting(&self, key: &str) -> Result<Option<Value>> {
        self.settings.get(key)
    }

    /// Deployment environment name, if configured
    pub fn env(&self) -> Option<&str> {
        self.env.as_deref()
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("templates", &self.templates)
            .field("env", &self.env)
            .finish()
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new(Templates::default(), Arc::new(HashMap::new()))
    }
}
