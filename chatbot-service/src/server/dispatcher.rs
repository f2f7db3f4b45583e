//! Accept loop.
//!
//! The loop only accepts and hands off. Every connection gets its own task
//! that waits for a worker slot, so a full pool never stalls `accept`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket};

use super::connection::ConnectionHandler;
use super::pool::WorkerPool;

/// Pause after a failed `accept` (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bind `addr` with `SO_REUSEADDR` and the given listen backlog.
pub fn bind_listener(addr: SocketAddr, backlog: u32) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

pub struct ConnectionDispatcher {
    listener: TcpListener,
    pool: WorkerPool,
    handler: Arc<ConnectionHandler>,
}

impl ConnectionDispatcher {
    pub fn new(listener: TcpListener, pool: WorkerPool, handler: ConnectionHandler) -> Self {
        Self {
            listener,
            pool,
            handler: Arc::new(handler),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Accept connections until `shutdown` resolves. Individual connection
    /// failures never end the loop.
    ///
    /// On shutdown the listener is dropped and the pool closed: connections
    /// still waiting for a worker are closed without a reply, while those
    /// already being processed run to completion.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            workers = self.pool.capacity(),
            "Bot dispatcher accepting connections"
        );
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                accepted = self.listener.accept() => accepted,
                _ = &mut shutdown => break,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            };

            let pool = self.pool.clone();
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let _slot = match pool.acquire().await {
                    Ok(slot) => slot,
                    Err(e) => {
                        tracing::warn!(%peer, error = %e, "Dropping connection");
                        return;
                    }
                };
                tracing::debug!(
                    %peer,
                    busy = pool.busy(),
                    queued = pool.queued(),
                    "Worker picked up connection"
                );
                handler.handle(stream, peer).await;
            });
        }

        self.pool.close();
        tracing::info!(
            busy = self.pool.busy(),
            queued = self.pool.queued(),
            "Bot dispatcher stopped accepting connections"
        );
    }
}
