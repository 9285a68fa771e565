//! Application builder
//!
//! Collects middleware, templates and settings, then compiles them into an
//! immutable [`AppHandler`].

use crate::handler::AppHandler;
use crate::logger::RequestLogger;
use crate::server::Server;
use crate::shutdown::SignalHandler;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use slashed_config::ConfigResolver;
use slashed_core::{
    from_fn, App, Context, Error, Middleware, Next, Pipeline, Result, Template, Templates,
};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::ToSocketAddrs;

/// Config key prefix for middleware groups
const GROUPS_KEY: &str = "middleware.groups";

enum Entry {
    Middleware(Arc<dyn Middleware>),
    Named(String),
    Group(String),
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Middleware(m) => f.debug_tuple("Middleware").field(m).finish(),
            Entry::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Entry::Group(name) => f.debug_tuple("Group").field(name).finish(),
        }
    }
}

/// Application root
///
/// ```ignore
/// let mut app = Application::new(".");
/// app.use_named("logger")
///     .use_fn(|ctx, next| Box::pin(async move {
///         ctx.set_body("hello");
///         next.run(ctx).await
///     }));
/// app.listen("127.0.0.1:8000").await?;
/// ```
pub struct Application {
    config: ConfigResolver,
    templates: Templates,
    entries: Vec<Entry>,
    registry: HashMap<String, Arc<dyn Middleware>>,
}

impl Application {
    /// Create an application rooted at `basedir`
    pub fn new(basedir: impl Into<PathBuf>) -> Self {
        Self::with_config(ConfigResolver::new(basedir))
    }

    /// Create an application over a prepared resolver
    pub fn with_config(config: ConfigResolver) -> Self {
        let mut registry: HashMap<String, Arc<dyn Middleware>> = HashMap::new();
        registry.insert("logger".to_string(), Arc::new(RequestLogger::new()));

        Self {
            config,
            templates: Templates::default(),
            entries: Vec::new(),
            registry,
        }
    }

    /// Setting resolver
    pub fn config(&self) -> &ConfigResolver {
        &self.config
    }

    /// Resolve a setting or expression
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        self.config.get(key)
    }

    /// Resolve a setting and deserialize it
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.config.get_as(key)
    }

    /// Store an explicit setting
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Value {
        self.config.set(key, value)
    }

    /// Deployment environment name (`env` in the environment file)
    pub fn env(&self) -> Option<String> {
        self.config.env_var("env").map(str::to_string)
    }

    /// Append a middleware
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> &mut Self {
        self.use_shared(Arc::new(middleware))
    }

    /// Append an already shared middleware
    pub fn use_shared(&mut self, middleware: Arc<dyn Middleware>) -> &mut Self {
        tracing::debug!(
            middleware = ?middleware,
            position = self.entries.len(),
            "Middleware added"
        );
        self.entries.push(Entry::Middleware(middleware));
        self
    }

    /// Append a closure middleware
    pub fn use_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
    {
        self.use_middleware(from_fn(f))
    }

    /// Append a registered middleware by name
    ///
    /// The name is resolved when the handler is compiled.
    pub fn use_named(&mut self, name: impl Into<String>) -> &mut Self {
        self.entries.push(Entry::Named(name.into()));
        self
    }

    /// Append the middleware listed under `middleware.groups.<name>`
    pub fn use_group(&mut self, name: impl Into<String>) -> &mut Self {
        self.entries.push(Entry::Group(name.into()));
        self
    }

    /// Register a named middleware
    pub fn register(
        &mut self,
        name: impl Into<String>,
        middleware: impl Middleware + 'static,
    ) -> &mut Self {
        self.registry.insert(name.into(), Arc::new(middleware));
        self
    }

    /// Run an extension against the application
    pub fn extend<F>(&mut self, extension: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        extension(self);
        self
    }

    /// Shared templates
    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Defaults every context falls back to
    pub fn context_template_mut(&mut self) -> &mut Template {
        &mut self.templates.context
    }

    /// Defaults every request view falls back to
    pub fn request_template_mut(&mut self) -> &mut Template {
        &mut self.templates.request
    }

    /// Defaults every response view falls back to
    pub fn response_template_mut(&mut self) -> &mut Template {
        &mut self.templates.response
    }

    /// Number of middleware entries added so far
    pub fn middleware_count(&self) -> usize {
        self.entries.len()
    }

    /// Compile into a request handler
    ///
    /// Fails with a configuration error when a named middleware or group
    /// cannot be resolved. Later changes to the application do not affect
    /// the returned handler.
    pub fn handler(&self) -> Result<AppHandler> {
        let mut chain = Vec::with_capacity(self.entries.len());

        for entry in &self.entries {
            match entry {
                Entry::Middleware(middleware) => chain.push(Arc::clone(middleware)),
                Entry::Named(name) => chain.push(self.lookup(name)?),
                Entry::Group(group) => {
                    for name in self.group(group)? {
                        chain.push(self.lookup(&name)?);
                    }
                }
            }
        }

        let app =
            App::new(self.templates.clone(), Arc::new(self.config.clone())).with_env(self.env());
        tracing::debug!(middleware_count = chain.len(), "Application compiled");

        Ok(AppHandler::new(Arc::new(app), Pipeline::new(chain)))
    }

    /// Compile and serve on `addr` until SIGINT/SIGTERM
    pub async fn listen<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        let server = Server::new(self.handler()?);
        tokio::spawn(SignalHandler::new(server.shutdown_signal()).run());
        server.run(addr).await
    }

    fn lookup(&self, name: &str) -> Result<Arc<dyn Middleware>> {
        self.registry
            .get(name)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown middleware \"{name}\"")))
    }

    fn group(&self, group: &str) -> Result<Vec<String>> {
        let key = format!("{GROUPS_KEY}.{group}");
        let names = match self.config.get(&key)? {
            Some(Value::Array(names)) => names,
            Some(_) => {
                return Err(Error::config(format!(
                    "Middleware group \"{group}\" must be a list of names"
                )))
            }
            None => return Err(Error::config(format!("Unknown middleware group \"{group}\""))),
        };

        names
            .into_iter()
            .map(|name| match name {
                Value::String(name) => Ok(name),
                other => Err(Error::config(format!(
                    "Middleware group \"{group}\" contains a non-name entry: {other}"
                ))),
            })
            .collect()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut registered: Vec<&str> = self.registry.keys().map(String::as_str).collect();
        registered.sort_unstable();

        f.debug_struct("Application")
            .field("basedir", &self.config.basedir())
            .field("entries", &self.entries)
            .field("registered", &registered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn application() -> (tempfile::TempDir, Application) {
        let dir = tempfile::tempdir().unwrap();
        let app = Application::new(dir.path());
        (dir, app)
    }

    #[test]
    fn test_logger_is_registered() {
        let (_dir, mut app) = application();
        app.use_named("logger");
        assert_eq!(app.middleware_count(), 1);
        assert!(app.handler().is_ok());
    }

    #[test]
    fn test_unknown_name_fails_compile() {
        let (_dir, mut app) = application();
        app.use_named("missing");
        assert!(matches!(app.handler(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_group_from_settings() {
        let (_dir, mut app) = application();
        app.set("middleware.groups.web", json!(["logger", "logger"]));
        app.use_group("web");
        assert!(app.handler().is_ok());
    }

    #[test]
    fn test_unknown_group_fails_compile() {
        let (_dir, mut app) = application();
        app.use_group("api");
        assert!(matches!(app.handler(), Err(Error::Configuration(_))));

        let (_dir, mut app) = application();
        app.set("middleware.groups.api", json!("logger"));
        app.use_group("api");
        assert!(matches!(app.handler(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_set_then_get() {
        let (_dir, mut app) = application();
        assert_eq!(app.set("answer", 42), json!(42));
        assert_eq!(app.get("answer").unwrap(), Some(json!(42)));
        assert_eq!(app.get_as::<u16>("answer").unwrap(), Some(42));
    }

    #[test]
    fn test_extend_customizes_templates() {
        let (_dir, mut app) = application();
        app.extend(|app| {
            app.context_template_mut().set("site", json!("slashed"));
            app.response_template_mut().set("cache", json!("no-store"));
        });

        let handler = app.handler().unwrap();
        assert_eq!(handler.app().templates().context.get("site"), Some(&json!("slashed")));
        assert_eq!(handler.app().templates().response.get("cache"), Some(&json!("no-store")));
    }

    #[test]
    fn test_env_from_environment_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "env=staging\n").unwrap();

        let app = Application::new(dir.path());
        assert_eq!(app.env().as_deref(), Some("staging"));
        assert_eq!(app.handler().unwrap().app().env(), Some("staging"));
    }
}
