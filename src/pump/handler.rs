//! The handler chain seam.
//!
//! The pump knows nothing about protocols. It calls one [`Handler`] per
//! connection and acts on the [`HandleOutcome`]: completed and failed
//! connections are closed by the pump, hijacked ones belong to whoever took
//! them.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use crate::net::context::ConnectionContext;
use crate::pump::error::BoxError;

/// What became of a connection after the handler chain ran.
#[derive(Debug)]
pub enum HandleOutcome {
    /// Done with the connection; the pump closes it.
    Completed,
    /// Ownership moved elsewhere (see `ConnectionContext::pipe`).
    Hijacked,
    /// Handling failed; the pump logs the cause and closes the connection.
    Failed(BoxError),
}

impl HandleOutcome {
    pub fn failed(err: impl Into<BoxError>) -> Self {
        HandleOutcome::Failed(err.into())
    }

    pub fn is_hijacked(&self) -> bool {
        matches!(self, HandleOutcome::Hijacked)
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            HandleOutcome::Completed => "completed",
            HandleOutcome::Hijacked => "hijacked",
            HandleOutcome::Failed(_) => "failed",
        }
    }
}

impl<E: Into<BoxError>> From<Result<(), E>> for HandleOutcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => HandleOutcome::Completed,
            Err(err) => HandleOutcome::failed(err),
        }
    }
}

/// A compiled handler chain. Called exactly once per accepted connection.
///
/// Implementations must eventually return; the pump imposes no timeout.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, cx: &mut ConnectionContext) -> HandleOutcome;
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, cx: &mut ConnectionContext) -> HandleOutcome {
        (**self).handle(cx).await
    }
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Box<H> {
    async fn handle(&self, cx: &mut ConnectionContext) -> HandleOutcome {
        (**self).handle(cx).await
    }
}

/// Terminal handler that pipes every connection to the pump's consumer.
///
/// On its own it makes the pump a plain pass-through; as the last link of a
/// route chain it forwards whatever no route claimed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

#[async_trait]
impl Handler for Passthrough {
    async fn handle(&self, cx: &mut ConnectionContext) -> HandleOutcome {
        cx.pipe().await
    }
}

/// Handler backed by a closure, see [`handler_fn`].
pub struct HandlerFn<F> {
    f: F,
}

/// Build a handler from a closure returning a boxed future.
///
/// ```ignore
/// let h = handler_fn(|cx| Box::pin(async move { cx.pipe().await }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut ConnectionContext) -> BoxFuture<'a, HandleOutcome>
        + Send
        + Sync
        + 'static,
{
    HandlerFn { f }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut ConnectionContext) -> BoxFuture<'a, HandleOutcome>
        + Send
        + Sync
        + 'static,
{
    async fn handle(&self, cx: &mut ConnectionContext) -> HandleOutcome {
        (self.f)(cx).await
    }
}
