//! Demux server module
//!
//! Accepts connections on the single listen port and spawns one session
//! task per connection.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::common::{DemuxError, Result};
use super::dialer::Dialer;
use super::handler::{handle_connection, SessionContext};

/// Demux server structure
///
/// Owns the listener and the session context shared by every connection.
pub struct DemuxServer<D> {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: Arc<SessionContext<D>>,
}

impl<D: Dialer> DemuxServer<D> {
    /// Bind the listen address
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound. This is fatal for
    /// the process.
    pub async fn bind(listen_addr: SocketAddr, ctx: SessionContext<D>) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr).await.map_err(|e| {
            DemuxError::Config(format!("Could not open listener on {}: {}", listen_addr, e))
        })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            ctx: Arc::new(ctx),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared session context
    pub fn context(&self) -> &Arc<SessionContext<D>> {
        &self.ctx
    }

    /// Accept connections until the task is dropped
    ///
    /// Accept errors are logged and the loop continues; per-connection
    /// failures never reach this loop.
    pub async fn run(self) -> Result<()> {
        info!("Started listening: addr={}", self.local_addr);

        let mut tasks = JoinSet::new();

        loop {
            // Reap finished sessions and surface panics
            while let Some(result) = tasks.try_join_next() {
                if let Err(e) = result {
                    error!("Session task error: {}", e);
                }
            }

            match self.listener.accept().await {
                Ok((client_stream, client_addr)) => {
                    if let Err(e) = client_stream.set_nodelay(true) {
                        debug!("[{}] Could not set TCP_NODELAY: {}", client_addr, e);
                    }

                    let ctx = Arc::clone(&self.ctx);
                    tasks.spawn(handle_connection(client_stream, client_addr, ctx));
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::PlainDialer;
    use crate::protocol::DestinationMap;

    #[tokio::test]
    async fn test_bind_ephemeral_port() {
        let ctx = SessionContext::new(Vec::new(), Arc::new(DestinationMap::new()), PlainDialer);
        let server = DemuxServer::bind("127.0.0.1:0".parse().unwrap(), ctx).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
        assert!(server.context().detectors().is_empty());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = taken.local_addr().unwrap();

        let ctx = SessionContext::new(Vec::new(), Arc::new(DestinationMap::new()), PlainDialer);
        let result = DemuxServer::bind(addr, ctx).await;
        assert!(matches!(result, Err(DemuxError::Config(_))));
    }
}
