//! Middleware trait and the dispatch chain

use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

/// Middleware trait for request processing
///
/// Code placed before `next.run(ctx).await` runs on the way in, code after
/// it runs on the way out, once every downstream middleware has finished.
/// Returning without calling `next` short-circuits the chain.
#[async_trait]
pub trait Middleware: Send + Sync + fmt::Debug {
    /// Process a request
    ///
    /// # Arguments
    ///
    /// * `ctx` - The per-request context
    /// * `next` - The remainder of the chain
    async fn call(&self, ctx: &mut Context, next: Next) -> Result<()>;
}

/// Middleware built from a closure
///
/// ```ignore
/// app.use_fn(|ctx, next| Box::pin(async move {
///     ctx.state.insert("seen".into(), true.into());
///     next.run(ctx).await
/// }));
/// ```
pub struct FnMiddleware<F> {
    f: F,
}

/// Wrap a closure as a [`Middleware`]
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    FnMiddleware { f }
}

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut Context, Next) -> BoxFuture<'a, Result<()>> + Send + Sync + 'static,
{
    async fn call(&self, ctx: &mut Context, next: Next) -> Result<()> {
        (self.f)(ctx, next).await
    }
}

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

/// Dispatch cursor shared by every `Next` of one request
#[derive(Debug)]
struct Cursor {
    /// Highest position that has begun execution
    position: AtomicIsize,
    /// First position dispatched twice, `-1` while none
    violation: AtomicIsize,
}

impl Cursor {
    fn new() -> Self {
        Self {
            position: AtomicIsize::new(-1),
            violation: AtomicIsize::new(-1),
        }
    }

    fn advance(&self, index: usize) -> Result<()> {
        let position = index as isize;
        let previous = self.position.fetch_max(position, Ordering::SeqCst);
        if position <= previous {
            tracing::warn!(index, "next() called more than once by the same middleware");
            let _ = self
                .violation
                .compare_exchange(-1, position, Ordering::SeqCst, Ordering::SeqCst);
            return Err(Error::DoubleInvocation { index });
        }
        Ok(())
    }

    fn violation(&self) -> Option<usize> {
        let violation = self.violation.load(Ordering::SeqCst);
        (violation >= 0).then_some(violation as usize)
    }
}

/// The remainder of the chain, handed to each middleware
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    cursor: Arc<Cursor>,
}

impl Next {
    /// Run the next middleware, or finish if the chain is exhausted
    ///
    /// Fails with [`Error::DoubleInvocation`] when called a second time by
    /// the same middleware.
    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        self.cursor.advance(self.index)?;

        let Some(middleware) = self.chain.get(self.index) else {
            return Ok(());
        };

        let next = Next {
            chain: Arc::clone(&self.chain),
            index: self.index + 1,
            cursor: Arc::clone(&self.cursor),
        };
        middleware.call(ctx, next).await
    }

    /// Position of the middleware this `Next` will run
    pub fn position(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("remaining", &self.chain.len().saturating_sub(self.index))
            .finish()
    }
}

/// Compiled, immutable middleware chain
#[derive(Clone)]
pub struct Pipeline {
    chain: Arc<[Arc<dyn Middleware>]>,
}

impl Pipeline {
    /// Compile a chain; insertion order is call order
    pub fn new(chain: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            chain: Arc::from(chain),
        }
    }

    /// Number of middleware
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Dispatch one request through the chain
    ///
    /// A second `next` call is a request-level failure even when the
    /// offending middleware discards the error it was handed.
    pub async fn run(&self, ctx: &mut Context) -> Result<()> {
        let cursor = Arc::new(Cursor::new());
        let next = Next {
            chain: Arc::clone(&self.chain),
            index: 0,
            cursor: Arc::clone(&cursor),
        };

        next.run(ctx).await?;

        match cursor.violation() {
            Some(index) => Err(Error::DoubleInvocation { index }),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("len", &self.chain.len())
            .finish()
    }
}
