//! Minimal method/path router
//!
//! Routes match on the request method and the exact path, ignoring a
//! trailing slash. The first matching route handles the request; a miss
//! falls through to the next middleware.

use async_trait::async_trait;
use http::Method;
use slashed_core::{Context, Middleware, Next, Result};
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
struct Route {
    /// `None` matches every method
    method: Option<Method>,
    path: String,
    handler: Arc<dyn Middleware>,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> bool {
        let method_ok = match &self.method {
            None => true,
            Some(m) if m == method => true,
            Some(m) => *m == Method::GET && *method == Method::HEAD,
        };
        method_ok && self.path == normalize(path)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .finish()
    }
}

/// Route table builder
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route for one method
    pub fn route(mut self, method: Method, path: &str, handler: impl Middleware + 'static) -> Self {
        self.push(Some(method), path, Arc::new(handler));
        self
    }

    /// GET route; also answers HEAD
    pub fn get(self, path: &str, handler: impl Middleware + 'static) -> Self {
        self.route(Method::GET, path, handler)
    }

    /// POST route
    pub fn post(self, path: &str, handler: impl Middleware + 'static) -> Self {
        self.route(Method::POST, path, handler)
    }

    /// PUT route
    pub fn put(self, path: &str, handler: impl Middleware + 'static) -> Self {
        self.route(Method::PUT, path, handler)
    }

    /// DELETE route
    pub fn delete(self, path: &str, handler: impl Middleware + 'static) -> Self {
        self.route(Method::DELETE, path, handler)
    }

    /// HEAD route
    pub fn head(self, path: &str, handler: impl Middleware + 'static) -> Self {
        self.route(Method::HEAD, path, handler)
    }

    /// Route for every method
    pub fn all(mut self, path: &str, handler: impl Middleware + 'static) -> Self {
        self.push(None, path, Arc::new(handler));
        self
    }

    /// Mount another router's routes under a path prefix
    pub fn nest(mut self, prefix: &str, router: Router) -> Self {
        let prefix = normalize(prefix);
        for route in router.routes {
            let path = match (prefix.as_str(), route.path.as_str()) {
                ("/", path) => path.to_string(),
                (prefix, "/") => prefix.to_string(),
                (prefix, path) => format!("{prefix}{path}"),
            };
            self.routes.push(Route { path, ..route });
        }
        self
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route was added
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Freeze the table into a single middleware
    pub fn routes(self) -> Routes {
        Routes {
            routes: Arc::from(self.routes),
        }
    }

    fn push(&mut self, method: Option<Method>, path: &str, handler: Arc<dyn Middleware>) {
        let path = normalize(path);
        tracing::debug!(method = ?method, path = %path, "Route added");
        self.routes.push(Route {
            method,
            path,
            handler,
        });
    }
}

/// Compiled route table
#[derive(Debug, Clone)]
pub struct Routes {
    routes: Arc<[Route]>,
}

#[async_trait]
impl Middleware for Routes {
    async fn call(&self, ctx: &mut Context, next: Next) -> Result<()> {
        let found = self
            .routes
            .iter()
            .find(|route| route.matches(ctx.method(), ctx.path()))
            .map(|route| Arc::clone(&route.handler));

        match found {
            Some(handler) => handler.call(ctx, next).await,
            None => next.run(ctx).await,
        }
    }
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/users/"), "/users");
        assert_eq!(normalize("users"), "/users");
    }

    #[derive(Debug)]
    struct Pass;

    #[async_trait]
    impl Middleware for Pass {
        async fn call(&self, ctx: &mut Context, next: Next) -> Result<()> {
            next.run(ctx).await
        }
    }

    #[test]
    fn test_nest_prefixes_paths() {
        let api = Router::new().get("/", Pass).post("/users/", Pass);
        let router = Router::new().get("/health", Pass).nest("/api/", api);

        let paths: Vec<&str> = router.routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/health", "/api", "/api/users"]);
        assert_eq!(router.len(), 3);
    }

    #[test]
    fn test_route_matching() {
        let router = Router::new().get("/users", Pass).all("/any", Pass);

        assert!(router.routes[0].matches(&Method::GET, "/users/"));
        assert!(router.routes[0].matches(&Method::HEAD, "/users"));
        assert!(!router.routes[0].matches(&Method::POST, "/users"));
        assert!(!router.routes[0].matches(&Method::GET, "/users/1"));
        assert!(router.routes[1].matches(&Method::DELETE, "/any"));
    }
}
