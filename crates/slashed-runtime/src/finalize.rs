//! Terminal error responses
//!
//! Every failure of the dispatch chain or of response resolution ends up
//! here. The finalizer either writes an HTML error page or, when the
//! response head is already on the wire, tears the connection down.

use askama::Template;
use http::{header, HeaderValue, Method, StatusCode};
use slashed_core::{Context, Error, Result};

/// Error page
#[derive(Template)]
#[template(path = "error.html", escape = "none")]
struct ErrorPage<'a> {
    status: u16,
    title: &'a str,
    trace: &'a str,
}

/// Escape text for embedding in HTML
///
/// Covers `& < > " '` plus backtick, forward slash and `=`.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            '/' => escaped.push_str("&#x2F;"),
            '`' => escaped.push_str("&#x60;"),
            '=' => escaped.push_str("&#x3D;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Escape a trace and keep its layout: line breaks become `<br>`, pairs of
/// spaces keep their width
fn format_trace(trace: &str) -> String {
    escape_html(trace)
        .replace('\n', "<br>")
        .replace("  ", " &nbsp;")
}

/// Render the HTML error document
pub fn render_document(status: StatusCode, title: &str, trace: &str) -> String {
    let title = escape_html(title);
    let trace = format_trace(trace);
    let page = ErrorPage {
        status: status.as_u16(),
        title: &title,
        trace: &trace,
    };

    page.render().unwrap_or_else(|err| {
        tracing::error!(error = %err, "Failed to render error page");
        format!(
            "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Error {code}</title></head>\
             <body><h1><pre>Error {code}</pre></h1><pre>{title}</pre></body></html>",
            code = status.as_u16()
        )
    })
}

/// Reason phrase for a status code
pub fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Unknown Status")
}

/// Write the terminal error response for `err`, or a 404 when `None`
///
/// When the response head was already sent the connection is destroyed
/// instead and nothing is written.
pub fn finalize(ctx: &mut Context, err: Option<Error>) -> Result<()> {
    let err = err.unwrap_or_else(|| Error::NotFound {
        method: ctx.method().to_string(),
        url: ctx.url().to_string(),
    });
    let status = err.status();

    if ctx.response.raw().headers_sent() {
        tracing::warn!(
            request_id = %ctx.id(),
            error = %err,
            "Headers already sent, destroying connection"
        );
        ctx.response.raw_mut().destroy();
        return Ok(());
    }

    if status.is_server_error() {
        tracing::error!(
            request_id = %ctx.id(),
            status = status.as_u16(),
            error = %err,
            "Request failed"
        );
    } else {
        tracing::debug!(
            request_id = %ctx.id(),
            status = status.as_u16(),
            error = %err,
            "Request failed"
        );
    }

    let title = status_text(status);
    let document = render_document(status, title, &err.trace());
    let head = ctx.method() == Method::HEAD;

    let raw = ctx.response.raw_mut();
    raw.set_status(status);
    raw.set_reason(title);
    raw.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    raw.set_content_length(document.len());

    if head {
        raw.end_empty()
    } else {
        raw.end(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Full};
    use proptest::prelude::*;
    use slashed_core::{App, HttpError, RawRequest, RawResponse};
    use std::sync::Arc;

    fn context(method: Method, uri: &str) -> Context {
        let req = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(Bytes::new()))
            .unwrap();
        Context::new(
            Arc::new(App::default()),
            RawRequest::from_http(req),
            RawResponse::new(),
        )
    }

    async fn body_text(ctx: Context) -> (StatusCode, http::HeaderMap, String) {
        let response = ctx.into_raw_response().into_http().unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="/x?a=1&b='2'">`"#),
            "&lt;a href&#x3D;&quot;&#x2F;x?a&#x3D;1&amp;b&#x3D;&#39;2&#39;&quot;&gt;&#x60;"
        );
        assert_eq!(escape_html("plain text"), "plain text");
    }

    #[test]
    fn test_trace_layout() {
        assert_eq!(format_trace("a\n    b"), "a<br> &nbsp; &nbsp;b");
    }

    #[tokio::test]
    async fn test_not_found_page() {
        let mut ctx = context(Method::GET, "/somepath");
        finalize(&mut ctx, None).unwrap();
        assert_eq!(ctx.response.raw().reason(), Some("Not Found"));

        let (status, headers, body) = body_text(ctx).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(headers[header::CONTENT_TYPE], "text/html; charset=utf-8");
        assert_eq!(headers[header::CONTENT_LENGTH], body.len().to_string().as_str());
        assert!(body.contains("<title>Error 404</title>"));
        assert!(body.contains("<pre>Not Found</pre>"));
        assert!(body.contains("Cannot GET &#x2F;somepath"));
    }

    #[tokio::test]
    async fn test_status_from_handler_error() {
        let mut ctx = context(Method::POST, "/users");
        let err = HttpError::new("name is required").with_status(422);
        finalize(&mut ctx, Some(err.into())).unwrap();

        let (status, _, body) = body_text(ctx).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("<h1><pre>Error 422</pre></h1>"));
        assert!(body.contains("Unprocessable Entity"));
        assert!(body.contains("name is required"));
    }

    #[tokio::test]
    async fn test_raw_value_is_explained() {
        let mut ctx = context(Method::GET, "/");
        finalize(&mut ctx, Some(Error::thrown("boom"))).unwrap();

        let (status, _, body) = body_text(ctx).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("&quot;boom&quot;"));
        assert!(body.contains("is not an error object"));
    }

    #[tokio::test]
    async fn test_head_sends_headers_only() {
        let mut ctx = context(Method::HEAD, "/missing");
        finalize(&mut ctx, None).unwrap();

        let (status, headers, body) = body_text(ctx).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.is_empty());
        let length: usize = headers[header::CONTENT_LENGTH].to_str().unwrap().parse().unwrap();
        assert!(length > 0);
    }

    #[test]
    fn test_headers_sent_destroys_connection() {
        let mut ctx = context(Method::GET, "/");
        ctx.response.raw_mut().flush_headers();

        finalize(&mut ctx, Some(Error::thrown("late"))).unwrap();

        assert!(ctx.response.raw().is_destroyed());
        assert!(ctx.into_raw_response().into_http().is_err());
    }

    proptest! {
        #[test]
        fn prop_script_tags_never_survive(prefix in ".*", suffix in ".*") {
            let message = format!("{prefix}<script>alert(1)</script>{suffix}");
            let document = render_document(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                &message,
            );
            prop_assert!(!document.contains("<script>"));
        }
    }
}
