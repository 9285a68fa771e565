//! Per-request entry point
//!
//! [`AppHandler`] is what a transport invokes for every request: it builds
//! the context, runs the pipeline, resolves the response and routes every
//! failure through the error finalizer.

use crate::finalize::finalize;
use crate::respond::respond;
use bytes::Bytes;
use slashed_core::{
    App, BoxError, Context, Pipeline, RawRequest, RawResponse, ResponseBody, Result,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// Compiled request handler, cheap to clone per connection
#[derive(Clone)]
pub struct AppHandler {
    app: Arc<App>,
    pipeline: Pipeline,
}

impl std::fmt::Debug for AppHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppHandler")
            .field("app", &self.app)
            .field("middleware_count", &self.pipeline.len())
            .finish()
    }
}

impl AppHandler {
    /// Create a handler over a compiled pipeline
    pub fn new(app: Arc<App>, pipeline: Pipeline) -> Self {
        Self { app, pipeline }
    }

    /// Shared application state
    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Build a fresh context for one request
    pub fn create_context(&self, raw_request: RawRequest, raw_response: RawResponse) -> Context {
        Context::new(Arc::clone(&self.app), raw_request, raw_response)
    }

    /// Handle a single HTTP request
    ///
    /// Always yields a complete response, except when the response head was
    /// already committed before a failure: the error then tells the
    /// transport to drop the connection.
    pub async fn handle<B>(&self, req: http::Request<B>) -> Result<http::Response<ResponseBody>>
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let mut ctx = self.create_context(RawRequest::from_http(req), RawResponse::new());
        let span = tracing::debug_span!(
            "request",
            id = %ctx.id(),
            method = %ctx.method(),
            url = %ctx.url()
        );

        async move {
            let start = Instant::now();

            let outcome = match self.pipeline.run(&mut ctx).await {
                Ok(()) => respond(&mut ctx),
                Err(err) => Err(err),
            };

            if let Err(err) = outcome {
                if let Err(write_err) = finalize(&mut ctx, Some(err)) {
                    tracing::error!(error = %write_err, "Failed to write error response");
                    ctx.response.raw_mut().destroy();
                }
            }

            tracing::trace!(
                status = ctx.status().as_u16(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Request handled"
            );

            ctx.into_raw_response().into_http()
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use http_body_util::{BodyExt, Full};
    use slashed_core::{from_fn, Error, Middleware};

    fn request(method: Method, uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn handler(chain: Vec<Arc<dyn Middleware>>) -> AppHandler {
        AppHandler::new(Arc::new(App::default()), Pipeline::new(chain))
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_not_found() {
        let response = handler(Vec::new())
            .handle(request(Method::GET, "/somepath"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert!(String::from_utf8_lossy(&body).contains("Cannot GET &#x2F;somepath"));
    }

    #[tokio::test]
    async fn test_body_is_written() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(from_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.set_body("ok");
                Ok(())
            })
        }))];

        let response = handler(chain)
            .handle(request(Method::GET, "/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_failure_after_flush_drops_connection() {
        let chain: Vec<Arc<dyn Middleware>> = vec![Arc::new(from_fn(|ctx, _next| {
            Box::pin(async move {
                ctx.response.raw_mut().flush_headers();
                Err(Error::thrown("too late"))
            })
        }))];

        let result = handler(chain).handle(request(Method::GET, "/")).await;
        assert!(matches!(result, Err(Error::TransportWrite(_))));
    }
}
