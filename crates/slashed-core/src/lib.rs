//! # Slashed Core
//!
//! Core types, traits, and error handling for the Slashed HTTP runtime.
//!
//! This crate provides the request lifecycle building blocks:
//! - Transport-level request/response objects
//! - The per-request [`Context`] and its request/response views
//! - The [`Middleware`] trait and the [`Pipeline`] dispatcher
//! - Error types

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod app;
pub mod body;
pub mod context;
pub mod error;
pub mod middleware;
pub mod transport;

pub use app::{App, Settings, Template, Templates};
pub use body::{Body, BodyStream};
pub use context::{Context, RequestView, ResponseView, State};
pub use error::{BoxError, Error, HttpError, Result};
pub use middleware::{from_fn, FnMiddleware, Middleware, Next, Pipeline};
pub use transport::{RawRequest, RawResponse, RequestBody, ResponseBody};

// Re-export commonly used HTTP types
pub use bytes::Bytes;
pub use http::{Method, StatusCode};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::body::Body;
    pub use crate::context::Context;
    pub use crate::error::{Error, HttpError, Result};
    pub use crate::middleware::{from_fn, Middleware, Next};
    pub use async_trait::async_trait;
}
