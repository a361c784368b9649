//! Connection acceptor.
//!
//! Every accepted connection becomes one session task. Where that task runs is
//! decided by an [`Executor`]: [`TokioExecutor`] spawns without limit,
//! [`BoundedExecutor`] caps how many sessions run at once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::board::RuleEngine;
use crate::session::{ServerContext, run_session};

/// A session ready to run.
pub type SessionTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub trait Executor: Send + Sync + 'static {
    fn execute(&self, task: SessionTask);
}

/// Spawn every session immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl Executor for TokioExecutor {
    fn execute(&self, task: SessionTask) {
        tokio::spawn(task);
    }
}

/// Run at most `max_sessions` sessions at a time. Extra connections are
/// accepted but wait for a free permit before being served.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    permits: Arc<Semaphore>,
}

impl BoundedExecutor {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_sessions)),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl Executor for BoundedExecutor {
    fn execute(&self, task: SessionTask) {
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
    }
}

/// Accept connections forever. Accept errors are logged and never stop the loop.
pub async fn serve<E, X>(listener: TcpListener, ctx: Arc<ServerContext<E>>, executor: X)
where
    E: RuleEngine,
    X: Executor,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "Accepting connections");
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "Accept failed");
                continue;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }
        tracing::debug!(%peer, "New connection");

        let ctx = ctx.clone();
        executor.execute(Box::pin(async move {
            match run_session(stream, ctx).await {
                Ok(()) => {}
                Err(e) if e.is_connection_error() => {
                    tracing::warn!(%peer, error = %e, "Connection error");
                }
                Err(e) => {
                    tracing::info!(%peer, error = %e, "Session closed");
                }
            }
        }));
    }
}
