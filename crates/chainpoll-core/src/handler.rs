//! Item handlers, the consumers a job hands each fetched batch to.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::{HandlerError, PollError};

/// Trait for user-provided batch handlers.
///
/// Delivery is at-least-once: a batch may be handed over again after a failed
/// cycle, so implementations must be idempotent.
#[async_trait]
pub trait Handler<I>: Send + Sync {
    async fn handle(&self, items: &[I]) -> Result<(), HandlerError>;

    /// Name used in logs and error messages.
    fn name(&self) -> &str;
}

/// The handlers registered for one job.
pub struct HandlerRegistry<I> {
    handlers: Vec<Arc<dyn Handler<I>>>,
}

impl<I: Send + Sync> HandlerRegistry<I> {
    pub fn new() -> Self {
        Self { handlers: vec![] }
    }

    pub fn register(&mut self, handler: Arc<dyn Handler<I>>) {
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run every handler on `items` concurrently and wait for all of them.
    ///
    /// Every handler runs to completion even if another one fails; the first
    /// failure (in registration order) is returned.
    pub async fn dispatch(&self, items: &[I]) -> Result<(), PollError> {
        let results = join_all(self.handlers.iter().map(|h| h.handle(items))).await;
        for (handler, result) in self.handlers.iter().zip(results) {
            if let Err(e) = result {
                return Err(PollError::Handler {
                    handler: handler.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl<I: Send + Sync> Default for HandlerRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts an async closure into a [`Handler`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

#[async_trait]
impl<I, F, Fut> Handler<I> for FnHandler<F>
where
    I: Clone + Send + Sync + 'static,
    F: Fn(Vec<I>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, items: &[I]) -> Result<(), HandlerError> {
        (self.f)(items.to_vec()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
