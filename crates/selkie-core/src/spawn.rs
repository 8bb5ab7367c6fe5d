//! Worker pool seam.
//!
//! The run loop owns no threads. Every task it produces is submitted through
//! [`Spawner`], and the pool behind it is sized and owned by the host. The
//! default bridge submits onto the ambient tokio runtime.

use futures::future::BoxFuture;
use std::sync::Arc;

/// A shared pool accepting short, non-blocking tasks.
///
/// `spawn` must not block and must not run the task inline on the caller's
/// stack; the run loop relies on submission returning promptly.
pub trait Spawner: Send + Sync + 'static {
    fn spawn(&self, task: BoxFuture<'static, ()>);
}

/// [`Spawner`] over the ambient tokio runtime.
///
/// Panics if used outside a runtime context, same as `tokio::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        tokio::spawn(task);
    }
}

impl<S: Spawner + ?Sized> Spawner for Arc<S> {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        (**self).spawn(task);
    }
}
