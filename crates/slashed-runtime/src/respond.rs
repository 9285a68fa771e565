//! Response resolution
//!
//! Turns the body a handler chose into exactly one terminal write on the
//! raw response.

use crate::finalize::finalize;
use http::{header, HeaderValue, Method};
use slashed_core::{Body, Context, Result};

/// Write the chosen body to the transport
///
/// A request without a body ends in the 404 page. HEAD requests never
/// carry a body.
pub fn respond(ctx: &mut Context) -> Result<()> {
    if ctx.method() == Method::HEAD {
        return respond_head(ctx);
    }

    let body = match ctx.response.take_body() {
        Some(body) => body,
        None => return finalize(ctx, None),
    };

    let headers_sent = ctx.response.raw().headers_sent();
    let raw = ctx.response.raw_mut();

    match body {
        Body::Bytes(bytes) => {
            default_content_type(raw, headers_sent, "application/octet-stream");
            raw.end(bytes)
        }
        Body::Text(text) => {
            let content_type = if text.trim_start().starts_with('<') {
                "text/html; charset=utf-8"
            } else {
                "text/plain; charset=utf-8"
            };
            default_content_type(raw, headers_sent, content_type);
            raw.end(text)
        }
        Body::Stream(stream) => raw.pipe(stream),
        Body::Json(value) => {
            let json = serde_json::to_vec(&value)?;
            if !headers_sent {
                raw.set_content_length(json.len());
            }
            default_content_type(raw, headers_sent, "application/json; charset=utf-8");
            raw.end(json)
        }
    }
}

fn respond_head(ctx: &mut Context) -> Result<()> {
    if !ctx.response.raw().headers_sent() {
        if let Some(body) = ctx.response.body().filter(|body| body.is_json()) {
            let length = match body.as_json() {
                Some(value) => serde_json::to_vec(value)?.len(),
                None => 0,
            };
            ctx.response.set_length(length);
        }
    }
    ctx.response.raw_mut().end_empty()
}

fn default_content_type(
    raw: &mut slashed_core::RawResponse,
    headers_sent: bool,
    value: &'static str,
) {
    if headers_sent || raw.headers().contains_key(header::CONTENT_TYPE) {
        return;
    }
    raw.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(value));
}
