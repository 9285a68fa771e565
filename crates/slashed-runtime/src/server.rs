//! HTTP server
//!
//! Accepts TCP connections and serves each one over HTTP/1.1 with the
//! compiled [`AppHandler`]. A failed request whose head was already
//! committed surfaces as a service error, which makes hyper close the
//! connection.

use crate::handler::AppHandler;
use crate::shutdown::ShutdownSignal;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use slashed_core::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, ToSocketAddrs};

/// Default grace period for in-flight connections
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP server
#[derive(Debug)]
pub struct Server {
    handler: AppHandler,
    shutdown: ShutdownSignal,
    shutdown_timeout: Duration,
    active: Arc<AtomicUsize>,
}

/// Decrements the active connection count when dropped
struct ConnectionGuard(Arc<AtomicUsize>);

impl ConnectionGuard {
    fn new(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(active))
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Create a server around a compiled handler
    pub fn new(handler: AppHandler) -> Self {
        Self {
            handler,
            shutdown: ShutdownSignal::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Use an externally owned shutdown signal
    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Set the grace period for in-flight connections
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Get shutdown signal
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Number of open connections
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Bind to `addr` and serve until shutdown
    pub async fn run<A: ToSocketAddrs>(&self, addr: A) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to bind listener");
            e
        })?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(listen = %local_addr, "Server listening");

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.spawn_connection(stream, addr),
                        Err(e) => tracing::error!(error = %e, "Failed to accept connection"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.drain().await;
        Ok(())
    }

    fn spawn_connection(&self, stream: tokio::net::TcpStream, addr: SocketAddr) {
        tracing::trace!(peer = %addr, "Accepted connection");

        let handler = self.handler.clone();
        let guard = ConnectionGuard::new(&self.active);
        let shutdown = self.shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();

        tokio::spawn(async move {
            let _guard = guard;
            let service = hyper::service::service_fn(move |req: http::Request<Incoming>| {
                let handler = handler.clone();
                async move { handler.handle(req).await }
            });

            let io = TokioIo::new(stream);
            let conn = hyper::server::conn::http1::Builder::new().serve_connection(io, service);
            tokio::pin!(conn);

            // Idle keep-alive connections close at once, busy ones after the
            // in-flight response
            let result = if shutdown.is_triggered() {
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            } else {
                tokio::select! {
                    result = conn.as_mut() => result,
                    _ = shutdown_rx.recv() => {
                        tracing::trace!(peer = %addr, "Closing connection for shutdown");
                        conn.as_mut().graceful_shutdown();
                        conn.as_mut().await
                    }
                }
            };

            if let Err(e) = result {
                tracing::debug!(peer = %addr, error = %e, "Connection closed with error");
            }
        });
    }

    async fn drain(&self) {
        let start = Instant::now();
        tracing::info!(
            timeout_secs = self.shutdown_timeout.as_secs(),
            "Waiting for open connections to complete"
        );

        loop {
            let active = self.active_connections();
            if active == 0 {
                tracing::info!("All connections closed");
                break;
            }
            if start.elapsed() >= self.shutdown_timeout {
                tracing::warn!(
                    active_connections = active,
                    "Shutdown timeout reached, forcing shutdown"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        tracing::info!(
            shutdown_duration_ms = start.elapsed().as_millis() as u64,
            "Server stopped"
        );
    }
}
