//! Backend dialing
//!
//! The session only sees the [`Dialer`] trait. Which implementation runs is
//! decided once at startup from the configuration and the platform's
//! capabilities.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use log::{info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use super::transparent;

/// Opens backend connections on behalf of a session
pub trait Dialer: Send + Sync + 'static {
    /// Connection type handed to the pipe engine
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Connect to `backend` for a client connected from `client`
    fn dial(
        &self,
        backend: SocketAddr,
        client: SocketAddr,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Ordinary outbound connect; the backend sees the proxy's address
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainDialer;

impl Dialer for PlainDialer {
    type Stream = TcpStream;

    async fn dial(&self, backend: SocketAddr, _client: SocketAddr) -> io::Result<TcpStream> {
        TcpStream::connect(backend).await
    }
}

/// Connect from the client's own address
#[derive(Debug, Clone, Copy, Default)]
pub struct TransparentDialer;

impl Dialer for TransparentDialer {
    type Stream = TcpStream;

    async fn dial(&self, backend: SocketAddr, client: SocketAddr) -> io::Result<TcpStream> {
        transparent::connect(backend, client).await
    }
}

/// Dialer chosen at startup
#[derive(Debug, Clone, Copy)]
pub enum BackendDialer {
    /// Source address spoofing
    Transparent(TransparentDialer),
    /// Plain connect
    Plain(PlainDialer),
}

impl BackendDialer {
    /// Pick the dialer for this process
    ///
    /// Falls back to plain dialing, with a single warning, when transparent
    /// mode is requested on a platform that cannot do it.
    pub fn select(transparent_requested: bool) -> Self {
        Self::select_with(transparent_requested, transparent::is_supported())
    }

    fn select_with(transparent_requested: bool, supported: bool) -> Self {
        match (transparent_requested, supported) {
            (true, true) => {
                info!("Using transparent proxying for backend connections");
                Self::Transparent(TransparentDialer)
            }
            (true, false) => {
                warn!("Transparent proxying is only supported on Linux; backends will see the proxy's address");
                Self::Plain(PlainDialer)
            }
            (false, _) => Self::Plain(PlainDialer),
        }
    }

    /// Whether connections keep the client's source address
    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::Transparent(_))
    }
}

impl Dialer for BackendDialer {
    type Stream = TcpStream;

    async fn dial(&self, backend: SocketAddr, client: SocketAddr) -> io::Result<TcpStream> {
        match self {
            Self::Transparent(dialer) => dialer.dial(backend, client).await,
            Self::Plain(dialer) => dialer.dial(backend, client).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_select_falls_back_without_support() {
        assert!(BackendDialer::select_with(true, true).is_transparent());
        assert!(!BackendDialer::select_with(true, false).is_transparent());
        assert!(!BackendDialer::select_with(false, true).is_transparent());
    }

    #[tokio::test]
    async fn test_plain_dialer_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client: SocketAddr = "192.0.2.10:5555".parse().unwrap();

        let stream = BackendDialer::Plain(PlainDialer).dial(addr, client).await.unwrap();
        let (_, peer) = listener.accept().await.unwrap();
        assert_eq!(stream.local_addr().unwrap(), peer);
    }

    #[tokio::test]
    async fn test_plain_dialer_reports_refusal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = PlainDialer.dial(addr, addr).await;
        assert!(result.is_err());
    }
}
