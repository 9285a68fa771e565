//! Response body values set by handlers

use crate::error::{BoxError, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt, TryStreamExt};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Streaming body source, piped to the transport without buffering
pub type BodyStream = BoxStream<'static, Result<Bytes, BoxError>>;

/// Representation a handler asks the runtime to send
pub enum Body {
    /// Raw binary data, written verbatim
    Bytes(Bytes),
    /// Text, written verbatim
    Text(String),
    /// Streaming source
    Stream(BodyStream),
    /// Any other value, serialized to JSON text
    Json(Value),
}

impl Body {
    /// Serialize a value into a JSON body
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    /// Wrap a fallible byte stream
    pub fn stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        Body::Stream(stream.map_err(Into::into).boxed())
    }

    /// Whether the body counts as a JSON value for length computation
    ///
    /// Text, bytes and streams never do; neither do falsy JSON values
    /// (`null`, `false`, `0`) nor bare JSON strings.
    pub fn is_json(&self) -> bool {
        match self {
            Body::Json(Value::Null) | Body::Json(Value::Bool(false)) => false,
            Body::Json(Value::String(_)) => false,
            Body::Json(Value::Number(n)) => n.as_f64().map_or(true, |n| n != 0.0),
            Body::Json(_) => true,
            _ => false,
        }
    }

    /// Value of a JSON body
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Text of a text body
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Body::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Body::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Body::Stream(_) => f.write_str("Stream(..)"),
            Body::Json(value) => f.debug_tuple("Json").field(value).finish(),
        }
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Body::Json(value)
    }
}
