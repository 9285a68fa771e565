//! Transport-level request and response objects
//!
//! [`RawRequest`] and [`RawResponse`] stand in for the socket-level HTTP
//! objects handed over by the server. The runtime never owns the socket:
//! a finished [`RawResponse`] is converted back into an [`http::Response`]
//! and the transport decides how the bytes hit the wire.

use crate::body::BodyStream;
use crate::error::{BoxError, Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri, Version};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::ext::ReasonPhrase;

/// Body type handed back to the transport
pub type ResponseBody = UnsyncBoxBody<Bytes, BoxError>;

/// Body type read from the transport
pub type RequestBody = UnsyncBoxBody<Bytes, BoxError>;

/// Incoming request as received from the transport
#[derive(Debug)]
pub struct RawRequest {
    parts: http::request::Parts,
    body: Option<RequestBody>,
}

impl RawRequest {
    /// Take ownership of an HTTP request with any body type
    pub fn from_http<B>(req: http::Request<B>) -> Self
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        Self {
            parts,
            body: Some(body.map_err(|err| -> BoxError { err.into() }).boxed_unsync()),
        }
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.parts.method
    }

    /// Request URI
    pub fn uri(&self) -> &Uri {
        &self.parts.uri
    }

    /// Request target as sent on the request line (path and query)
    pub fn url(&self) -> &str {
        self.parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// HTTP version
    pub fn version(&self) -> Version {
        self.parts.version
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.parts.headers
    }

    /// Request extensions set by the transport
    pub fn extensions(&self) -> &http::Extensions {
        &self.parts.extensions
    }

    /// Take the body stream; `None` once it has been consumed
    pub fn take_body(&mut self) -> Option<RequestBody> {
        self.body.take()
    }
}

/// Outgoing response as it will be handed to the transport
///
/// Headers count as sent once [`flush_headers`](Self::flush_headers) or a
/// terminal write has happened. Only one terminal write is accepted.
#[derive(Debug)]
pub struct RawResponse {
    status: StatusCode,
    reason: Option<String>,
    headers: HeaderMap,
    headers_sent: bool,
    body: Option<ResponseBody>,
    destroyed: bool,
}

impl RawResponse {
    /// Fresh response: 404 until someone decides otherwise
    pub fn new() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            reason: None,
            headers: HeaderMap::new(),
            headers_sent: false,
            body: None,
            destroyed: false,
        }
    }

    /// Response status
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Set response status
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    /// Reason phrase chosen for the status line
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Set the reason phrase
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = Some(reason.into());
    }

    /// Response headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable response headers
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Set the `Content-Length` header
    pub fn set_content_length(&mut self, length: usize) {
        self.headers
            .insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }

    /// Whether the status line and headers have been committed
    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    /// Commit the status line and headers
    pub fn flush_headers(&mut self) {
        self.headers_sent = true;
    }

    /// Whether a terminal write already happened
    pub fn is_finished(&self) -> bool {
        self.body.is_some()
    }

    /// End the response with the given bytes
    pub fn end(&mut self, bytes: impl Into<Bytes>) -> Result<()> {
        let body = Full::new(bytes.into())
            .map_err(|never| match never {})
            .boxed_unsync();
        self.finish(body)
    }

    /// End the response without a body
    pub fn end_empty(&mut self) -> Result<()> {
        let body = Empty::<Bytes>::new()
            .map_err(|never| match never {})
            .boxed_unsync();
        self.finish(body)
    }

    /// Connect a stream to the response
    pub fn pipe(&mut self, stream: BodyStream) -> Result<()> {
        let body = StreamBody::new(stream.map_ok(Frame::data)).boxed_unsync();
        self.finish(body)
    }

    /// Tear down the underlying connection instead of responding
    pub fn destroy(&mut self) {
        self.destroyed = true;
    }

    /// Whether the connection has been torn down
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    fn finish(&mut self, body: ResponseBody) -> Result<()> {
        if self.destroyed {
            return Err(Error::TransportWrite("connection destroyed".to_string()));
        }
        if self.body.is_some() {
            return Err(Error::TransportWrite("response already ended".to_string()));
        }
        self.headers_sent = true;
        self.body = Some(body);
        Ok(())
    }

    /// Hand the finished response to the transport
    ///
    /// Fails with [`Error::TransportWrite`] when the connection was
    /// destroyed; the transport is expected to drop the connection.
    pub fn into_http(self) -> Result<http::Response<ResponseBody>> {
        if self.destroyed {
            return Err(Error::TransportWrite(
                "connection destroyed after headers were sent".to_string(),
            ));
        }

        let body = match self.body {
            Some(body) => body,
            None => Empty::<Bytes>::new()
                .map_err(|never| match never {})
                .boxed_unsync(),
        };

        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;

        let custom_reason = self
            .reason
            .filter(|reason| Some(reason.as_str()) != self.status.canonical_reason());
        if let Some(reason) = custom_reason {
            match ReasonPhrase::try_from(reason) {
                Ok(phrase) => {
                    response.extensions_mut().insert(phrase);
                }
                Err(_) => tracing::debug!(status = %self.status, "Ignoring invalid reason phrase"),
            }
        }
        Ok(response)
    }
}

impl Default for RawResponse {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    #[test]
    fn test_raw_request_url() {
        let req = http::Request::builder()
            .method(Method::POST)
            .uri("http://localhost:8000/users?page=2")
            .body(Full::new(Bytes::from("payload")))
            .unwrap();

        let raw = RawRequest::from_http(req);
        assert_eq!(raw.method(), &Method::POST);
        assert_eq!(raw.url(), "/users?page=2");
    }

    #[test]
    fn test_single_terminal_write() {
        let mut res = RawResponse::new();
        assert!(!res.headers_sent());

        res.end("first").unwrap();
        assert!(res.headers_sent());
        assert!(res.is_finished());

        let second = res.end("second");
        assert!(matches!(second, Err(Error::TransportWrite(_))));
    }

    #[tokio::test]
    async fn test_pipe_stream() {
        let mut res = RawResponse::new();
        res.set_status(StatusCode::OK);

        let chunks: Vec<Result<Bytes, BoxError>> =
            vec![Ok(Bytes::from("hello ")), Ok(Bytes::from("world"))];
        res.pipe(Box::pin(stream::iter(chunks))).unwrap();

        let response = res.into_http().unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hello world");
    }

    #[test]
    fn test_reason_phrase_reaches_transport() {
        let mut res = RawResponse::new();
        res.set_status(StatusCode::IM_A_TEAPOT);
        res.set_reason("Short And Stout");
        res.end_empty().unwrap();

        let response = res.into_http().unwrap();
        let phrase = response.extensions().get::<ReasonPhrase>().unwrap();
        assert_eq!(phrase.as_bytes(), b"Short And Stout");
    }

    #[test]
    fn test_canonical_reason_adds_no_extension() {
        let mut res = RawResponse::new();
        res.set_reason("Not Found");
        res.end_empty().unwrap();

        let response = res.into_http().unwrap();
        assert!(response.extensions().get::<ReasonPhrase>().is_none());
    }

    #[test]
    fn test_destroyed_response_is_not_sent() {
        let mut res = RawResponse::new();
        res.flush_headers();
        res.destroy();

        assert!(res.end("late").is_err());
        assert!(matches!(res.into_http(), Err(Error::TransportWrite(_))));
    }
}
