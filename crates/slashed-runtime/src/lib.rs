//! # Slashed Runtime
//!
//! Request lifecycle and application runtime:
//! - [`Application`] builder and middleware registry
//! - Response resolution and the HTML error finalizer
//! - A minimal method/path [`Router`]
//! - HTTP/1 server with graceful shutdown

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod application;
pub mod finalize;
pub mod handler;
pub mod logger;
pub mod respond;
pub mod router;
pub mod server;
pub mod shutdown;

pub use application::Application;
pub use finalize::{escape_html, finalize};
pub use handler::AppHandler;
pub use logger::{LoggingConfig, RequestLogger};
pub use respond::respond;
pub use router::{Router, Routes};
pub use server::Server;
pub use shutdown::{ShutdownSignal, SignalHandler};

pub use slashed_config::ConfigResolver;
pub use slashed_core::{
    from_fn, Body, Context, Error, HttpError, Method, Middleware, Next, Result, StatusCode,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::application::Application;
    pub use crate::router::Router;
    pub use slashed_core::prelude::*;
}
