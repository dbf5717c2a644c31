//! The `tokio`-backed [`AsyncExecutor`] `meridian-core` spawns continuations
//! onto (`spec.md` §5, §6 Configuration).

use meridian_core::config::{AsyncExecutor, BoxFuture};

/// Hands every spawned future to the ambient `tokio` runtime. Must be
/// constructed from inside a running `tokio` runtime, same as
/// `tokio::spawn` itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioExecutor;

impl TokioExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl AsyncExecutor for TokioExecutor {
    fn spawn(&self, future: BoxFuture<'static, ()>) {
        tokio::spawn(future);
    }
}
