//! Error types for the Slashed runtime

use http::StatusCode;
use std::fmt;

/// Boxed error used for transport bodies and wrapped causes
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the request lifecycle and configuration resolution
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed middleware list or failed mandatory configuration load
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A handler advanced the pipeline more than once
    #[error("next() invoked more than once by the same handler (position {index})")]
    DoubleInvocation {
        /// Pipeline position whose second dispatch was refused
        index: usize,
    },

    /// No handler produced a body
    #[error("Cannot {method} {url}")]
    NotFound {
        /// Request method
        method: String,
        /// Request URL as received
        url: String,
    },

    /// Structured error raised by a handler
    #[error(transparent)]
    Handler(#[from] HttpError),

    /// A handler raised a raw value that is not an error object
    #[error("the handler threw a raw value \"{0}\"; \"{0}\" is not an error object")]
    Thrown(String),

    /// Attempted write after the response head was flushed
    #[error("Transport write error: {0}")]
    TransportWrite(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Wrap a raw value raised by a handler, keeping its display form
    pub fn thrown(value: impl fmt::Display) -> Self {
        Error::Thrown(value.to_string())
    }

    /// Short name of the error class, used as the first line of a trace
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "ConfigurationError",
            Error::DoubleInvocation { .. } => "DoubleInvocationError",
            Error::NotFound { .. } => "NotFoundError",
            Error::Handler(_) | Error::Thrown(_) => "HandlerError",
            Error::TransportWrite(_) => "TransportWriteError",
            Error::Io(_) => "IoError",
            Error::Serialization(_) => "SerializationError",
            Error::Http(_) => "HttpError",
        }
    }

    /// Status code sent for this error
    ///
    /// Handler errors carrying an explicit status in `400..=599` keep it,
    /// synthetic not-found errors map to 404 and everything else is a 500.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Handler(err) => err.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Diagnostic text: kind and message, then one indented line per cause
    pub fn trace(&self) -> String {
        let mut trace = format!("{}: {}", self.kind(), self);
        let mut source = std::error::Error::source(self);
        let mut depth = 1;

        while let Some(cause) = source {
            trace.push('\n');
            trace.push_str(&"  ".repeat(depth * 2));
            trace.push_str("caused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
            depth += 1;
        }

        trace
    }
}

/// Status-bearing error raised by handlers
///
/// `status` wins over `status_code` when both are set and valid; values
/// outside `400..=599` are ignored.
#[derive(Debug)]
pub struct HttpError {
    message: String,
    status: Option<u16>,
    status_code: Option<u16>,
    source: Option<BoxError>,
}

impl HttpError {
    /// Create an error without an explicit status
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            status_code: None,
            source: None,
        }
    }

    /// Wrap an arbitrary error, using its display text as the message
    pub fn from_error(err: impl Into<BoxError>) -> Self {
        let source = err.into();
        Self {
            message: source.to_string(),
            status: None,
            status_code: None,
            source: Some(source),
        }
    }

    /// Set the preferred status field
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Set the fallback status-code field
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Resolved status code
    pub fn status(&self) -> StatusCode {
        [self.status, self.status_code]
            .into_iter()
            .flatten()
            .find(|code| (400..600).contains(code))
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}
