//! Request logging middleware

use async_trait::async_trait;
use slashed_core::{Context, Middleware, Next, Result};
use std::fmt;
use std::time::Instant;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Whether to log request headers
    pub log_headers: bool,
    /// Headers to redact (e.g., Authorization, Cookie)
    pub sensitive_headers: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_headers: false,
            sensitive_headers: vec![
                "authorization".to_string(),
                "cookie".to_string(),
                "set-cookie".to_string(),
                "x-api-key".to_string(),
            ],
        }
    }
}

/// Logs each request on the way in and its outcome on the way out
///
/// Registered under the name `logger` in every [`Application`].
///
/// [`Application`]: crate::Application
#[derive(Clone, Default)]
pub struct RequestLogger {
    config: LoggingConfig,
}

impl RequestLogger {
    /// Create a logger with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logger with custom config
    pub fn with_config(config: LoggingConfig) -> Self {
        Self { config }
    }

    fn redact<'a>(&self, name: &str, value: &'a str) -> &'a str {
        if self
            .config
            .sensitive_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name))
        {
            "[REDACTED]"
        } else {
            value
        }
    }
}

impl fmt::Debug for RequestLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogger")
            .field("log_headers", &self.config.log_headers)
            .finish()
    }
}

#[async_trait]
impl Middleware for RequestLogger {
    async fn call(&self, ctx: &mut Context, next: Next) -> Result<()> {
        let method = ctx.method().clone();
        let url = ctx.url().to_string();

        if self.config.log_headers {
            let headers: Vec<String> = ctx
                .request
                .headers()
                .iter()
                .map(|(name, value)| {
                    let value = value.to_str().unwrap_or("[invalid UTF-8]");
                    format!("{}: {}", name, self.redact(name.as_str(), value))
                })
                .collect();
            tracing::info!(
                request_id = %ctx.id(),
                method = %method,
                url = %url,
                headers = ?headers,
                "Incoming request"
            );
        } else {
            tracing::info!(
                request_id = %ctx.id(),
                method = %method,
                url = %url,
                "Incoming request"
            );
        }

        let start = Instant::now();
        let result = next.run(ctx).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => tracing::info!(
                request_id = %ctx.id(),
                method = %method,
                url = %url,
                status = ctx.status().as_u16(),
                duration_ms,
                "Request completed"
            ),
            Err(err) => tracing::warn!(
                request_id = %ctx.id(),
                method = %method,
                url = %url,
                status = err.status().as_u16(),
                duration_ms,
                error = %err,
                "Request failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redaction() {
        let logger = RequestLogger::new();
        assert_eq!(logger.redact("Authorization", "Bearer secret"), "[REDACTED]");
        assert_eq!(logger.redact("Accept", "text/html"), "text/html");
    }

    #[test]
    fn test_custom_sensitive_headers() {
        let logger = RequestLogger::with_config(LoggingConfig {
            log_headers: true,
            sensitive_headers: vec!["x-session".to_string()],
        });
        assert_eq!(logger.redact("X-Session", "abc"), "[REDACTED]");
        assert_eq!(logger.redact("Cookie", "a=b"), "a=b");
    }
}
