//! Per-request context and its request/response views

use crate::app::{App, Template};
use crate::body::Body;
use crate::error::{Error, HttpError, Result};
use crate::transport::{RawRequest, RawResponse};
use bytes::Bytes;
use http::{header::HeaderName, HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Scratch key/value map, fresh for every request
pub type State = HashMap<String, Value>;

/// Request-local overrides that fall back to a shared template
#[derive(Debug, Default)]
struct Locals {
    values: HashMap<String, Value>,
}

impl Locals {
    fn get<'a>(&'a self, template: &'a Template, key: &str) -> Option<&'a Value> {
        self.values.get(key).or_else(|| template.get(key))
    }

    fn set(&mut self, key: String, value: Value) {
        self.values.insert(key, value);
    }
}

/// Request-scoped view over the raw request
#[derive(Debug)]
pub struct RequestView {
    app: Arc<App>,
    raw: RawRequest,
    original_url: String,
    locals: Locals,
}

impl RequestView {
    /// Owning application
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Raw transport request
    pub fn raw(&self) -> &RawRequest {
        &self.raw
    }

    /// Mutable raw transport request
    pub fn raw_mut(&mut self) -> &mut RawRequest {
        &mut self.raw
    }

    /// Request method
    pub fn method(&self) -> &Method {
        self.raw.method()
    }

    /// Request target (path and query)
    pub fn url(&self) -> &str {
        self.raw.url()
    }

    /// URL captured when the context was created
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// Request path
    pub fn path(&self) -> &str {
        self.raw.uri().path()
    }

    /// Raw query string
    pub fn query(&self) -> Option<&str> {
        self.raw.uri().query()
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        self.raw.headers()
    }

    /// Single header value as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Read a property, falling back to the request template
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.locals.get(&self.app.templates().request, key)
    }

    /// Set a request-local property
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.locals.set(key.into(), value);
    }

    /// Buffer the whole request body
    ///
    /// The body can be read once; later calls return empty bytes.
    pub async fn bytes(&mut self) -> Result<Bytes> {
        match self.raw.take_body() {
            Some(body) => {
                let collected = body.collect().await.map_err(|err| {
                    Error::from(HttpError::from_error(err).with_status(400))
                })?;
                Ok(collected.to_bytes())
            }
            None => Ok(Bytes::new()),
        }
    }

    /// Buffer and parse the request body as JSON
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|err| HttpError::from_error(err).with_status(400).into())
    }
}

/// Request-scoped view over the raw response
#[derive(Debug)]
pub struct ResponseView {
    app: Arc<App>,
    raw: RawResponse,
    body: Option<Body>,
    explicit_status: bool,
    locals: Locals,
}

impl ResponseView {
    /// Owning application
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Raw transport response
    pub fn raw(&self) -> &RawResponse {
        &self.raw
    }

    /// Mutable raw transport response
    pub fn raw_mut(&mut self) -> &mut RawResponse {
        &mut self.raw
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.raw.status()
    }

    /// Set response status
    pub fn set_status(&mut self, status: StatusCode) {
        self.explicit_status = true;
        self.raw.set_status(status);
    }

    /// Whether a handler chose the status
    pub fn has_explicit_status(&self) -> bool {
        self.explicit_status
    }

    /// Single header value as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Set a response header
    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.raw.headers_mut().insert(name, value);
    }

    /// Set `Content-Length`
    pub fn set_length(&mut self, length: usize) {
        self.raw.set_content_length(length);
    }

    /// Body chosen so far
    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Choose the body; a body-less response still resolves to 404
    ///
    /// Setting the first body switches the initial 404 to 200, unless a
    /// handler set the status itself.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        if self.body.is_none()
            && !self.explicit_status
            && self.raw.status() == StatusCode::NOT_FOUND
        {
            self.raw.set_status(StatusCode::OK);
        }
        self.body = Some(body.into());
    }

    /// Remove and return the body
    pub fn take_body(&mut self) -> Option<Body> {
        self.body.take()
    }

    /// Read a property, falling back to the response template
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.locals.get(&self.app.templates().response, key)
    }

    /// Set a response-local property
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.locals.set(key.into(), value);
    }
}

/// Per-request unit of work handed to every middleware
///
/// Built fresh for each request from the application's templates. Values
/// set through [`set`](Self::set), [`RequestView::set`] and
/// [`ResponseView::set`] stay local to this request.
#[derive(Debug)]
pub struct Context {
    id: Uuid,
    app: Arc<App>,
    original_url: String,
    locals: Locals,
    /// Request view
    pub request: RequestView,
    /// Response view
    pub response: ResponseView,
    /// Scratch state for handlers
    pub state: State,
}

impl Context {
    /// Build the object graph for one request
    pub fn new(app: Arc<App>, raw_request: RawRequest, raw_response: RawResponse) -> Self {
        let original_url = raw_request.url().to_string();

        Self {
            id: Uuid::new_v4(),
            request: RequestView {
                app: Arc::clone(&app),
                raw: raw_request,
                original_url: original_url.clone(),
                locals: Locals::default(),
            },
            response: ResponseView {
                app: Arc::clone(&app),
                raw: raw_response,
                body: None,
                explicit_status: false,
                locals: Locals::default(),
            },
            app,
            original_url,
            locals: Locals::default(),
            state: State::new(),
        }
    }

    /// Unique id of this request
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Owning application
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// URL captured when the context was created
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// Read a property, falling back to the context template
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.locals.get(&self.app.templates().context, key)
    }

    /// Set a context-local property
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.locals.set(key.into(), value);
    }

    /// Request method
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Request target (path and query)
    pub fn url(&self) -> &str {
        self.request.url()
    }

    /// Request path
    pub fn path(&self) -> &str {
        self.request.path()
    }

    /// Body chosen so far
    pub fn body(&self) -> Option<&Body> {
        self.response.body()
    }

    /// Choose the response body
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.response.set_body(body);
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// Set response status
    pub fn set_status(&mut self, status: StatusCode) {
        self.response.set_status(status);
    }

    /// Build a status-bearing error to return from a handler
    pub fn throw(&self, status: StatusCode, message: impl Into<String>) -> Error {
        HttpError::new(message).with_status(status.as_u16()).into()
    }

    /// Hand the raw response back to the transport
    pub fn into_raw_response(self) -> RawResponse {
        self.response.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::Templates;
    use http_body_util::Full;
    use serde_json::json;

    fn raw(method: Method, uri: &str, body: &'static str) -> RawRequest {
        RawRequest::from_http(
            http::Request::builder()
                .method(method)
                .uri(uri)
                .body(Full::new(Bytes::from(body)))
                .unwrap(),
        )
    }

    fn app_with_defaults() -> Arc<App> {
        let mut templates = Templates::default();
        templates.context.set("site", json!("slashed"));
        templates.request.set("locale", json!("en"));
        templates.response.set("cache", json!("no-store"));
        Arc::new(App::new(templates, Arc::new(HashMap::new())))
    }

    #[test]
    fn test_context_delegates_to_templates() {
        let app = app_with_defaults();
        let ctx = Context::new(app, raw(Method::GET, "/", ""), RawResponse::new());

        assert_eq!(ctx.get("site"), Some(&json!("slashed")));
        assert_eq!(ctx.request.get("locale"), Some(&json!("en")));
        assert_eq!(ctx.response.get("cache"), Some(&json!("no-store")));
        assert!(ctx.get("locale").is_none());
    }

    #[test]
    fn test_local_values_do_not_leak() {
        let app = app_with_defaults();
        let mut first = Context::new(
            Arc::clone(&app),
            raw(Method::GET, "/a", ""),
            RawResponse::new(),
        );
        let second = Context::new(
            Arc::clone(&app),
            raw(Method::GET, "/b", ""),
            RawResponse::new(),
        );

        first.set("site", json!("override"));
        first.request.set("locale", json!("fr"));
        first.state.insert("user".to_string(), json!(42));

        assert_eq!(first.get("site"), Some(&json!("override")));
        assert_eq!(first.request.get("locale"), Some(&json!("fr")));

        assert_eq!(second.get("site"), Some(&json!("slashed")));
        assert_eq!(second.request.get("locale"), Some(&json!("en")));
        assert!(second.state.is_empty());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_original_url_is_captured_once() {
        let ctx = Context::new(
            Arc::new(App::default()),
            raw(Method::GET, "/search?q=rust", ""),
            RawResponse::new(),
        );

        assert_eq!(ctx.original_url(), "/search?q=rust");
        assert_eq!(ctx.request.original_url(), "/search?q=rust");
        assert_eq!(ctx.path(), "/search");
        assert_eq!(ctx.request.query(), Some("q=rust"));
    }

    #[test]
    fn test_set_body_switches_default_status() {
        let mut ctx = Context::new(
            Arc::new(App::default()),
            raw(Method::GET, "/", ""),
            RawResponse::new(),
        );
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);

        ctx.set_body("hello");
        assert_eq!(ctx.status(), StatusCode::OK);

        ctx.set_status(StatusCode::CREATED);
        ctx.set_body("again");
        assert_eq!(ctx.status(), StatusCode::CREATED);
    }

    #[test]
    fn test_explicit_not_found_survives_body() {
        let mut ctx = Context::new(
            Arc::new(App::default()),
            raw(Method::GET, "/users/7", ""),
            RawResponse::new(),
        );
        assert!(!ctx.response.has_explicit_status());

        ctx.set_status(StatusCode::NOT_FOUND);
        ctx.set_body(json!({"error": "no such user"}));

        assert!(ctx.response.has_explicit_status());
        assert_eq!(ctx.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_request_json_body() {
        let mut ctx = Context::new(
            Arc::new(App::default()),
            raw(Method::POST, "/users", r#"{"name":"ada"}"#),
            RawResponse::new(),
        );

        let value: Value = ctx.request.json().await.unwrap();
        assert_eq!(value, json!({"name": "ada"}));

        let again = ctx.request.bytes().await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_json_is_bad_request() {
        let mut ctx = Context::new(
            Arc::new(App::default()),
            raw(Method::POST, "/users", "not json"),
            RawResponse::new(),
        );

        let err = ctx.request.json::<Value>().await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
