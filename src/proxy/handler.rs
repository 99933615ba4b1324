//! Connection handler module
//!
//! Drives one accepted connection through detection, backend dial, replay of
//! the sniffed bytes and the duplex pipe.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::common::{DemuxError, Result};
use crate::protocol::{DestinationMap, Detector};
use super::dialer::Dialer;
use super::forwarder::{proxy_data, PipeEnd};
use super::sniffer::{sniff, Sniffed};

/// Read-only state shared by every session of a server
pub struct SessionContext<D> {
    detectors: Vec<Arc<dyn Detector>>,
    destinations: Arc<DestinationMap>,
    dialer: D,
    detect_timeout: Option<Duration>,
}

impl<D: Dialer> SessionContext<D> {
    /// Create a context
    ///
    /// # Parameters
    ///
    /// * `detectors` - Enabled detectors, in tie-break order
    /// * `destinations` - Backend address per protocol name
    /// * `dialer` - Dialer selected at startup
    pub fn new(
        detectors: Vec<Arc<dyn Detector>>,
        destinations: Arc<DestinationMap>,
        dialer: D,
    ) -> Self {
        Self {
            detectors,
            destinations,
            dialer,
            detect_timeout: None,
        }
    }

    /// Bound the detection phase; `None` waits indefinitely
    pub fn with_detect_timeout(mut self, limit: Option<Duration>) -> Self {
        self.detect_timeout = limit;
        self
    }

    /// Enabled detectors
    pub fn detectors(&self) -> &[Arc<dyn Detector>] {
        &self.detectors
    }

    /// Destination map
    pub fn destinations(&self) -> &DestinationMap {
        &self.destinations
    }

    /// Selected dialer
    pub fn dialer(&self) -> &D {
        &self.dialer
    }
}

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading client bytes and running detectors
    Detecting,
    /// Resolving and connecting to the backend
    Dialing,
    /// Writing the sniffed bytes to the backend
    Replaying,
    /// Relaying in both directions
    Piping,
    /// Both connections dropped
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Detecting => "detecting",
            Self::Dialing => "dialing",
            Self::Replaying => "replaying",
            Self::Piping => "piping",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What a completed session did
#[derive(Debug)]
pub struct SessionSummary {
    /// Detected protocol
    pub protocol: &'static str,
    /// Backend the connection was forwarded to
    pub backend: SocketAddr,
    /// Sniffed bytes replayed before piping
    pub replayed: usize,
    /// Bytes piped client → backend after the replay
    pub upstream_bytes: u64,
    /// Bytes piped backend → client
    pub downstream_bytes: u64,
    /// How the pipe ended
    pub end: PipeEnd,
    /// Wall time from accept to close
    pub duration: Duration,
}

/// One client connection
///
/// The session owns the client stream until it is handed to the pipe, and
/// the backend stream once dialed. Both are dropped, and therefore closed,
/// on every exit path of [`Session::run`], which always leaves the session
/// in [`SessionState::Closed`].
pub struct Session<S, D> {
    client: Option<S>,
    client_addr: SocketAddr,
    ctx: Arc<SessionContext<D>>,
    state: SessionState,
}

impl<S, D> Session<S, D>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    D: Dialer,
{
    /// Create a session for an accepted connection
    pub fn new(client: S, client_addr: SocketAddr, ctx: Arc<SessionContext<D>>) -> Self {
        Self {
            client: Some(client),
            client_addr,
            ctx,
            state: SessionState::Detecting,
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    fn enter(&mut self, next: SessionState) {
        trace!("[{}] {} -> {}", self.client_addr, self.state, next);
        self.state = next;
    }

    /// Run the session to completion
    ///
    /// # Errors
    ///
    /// Detection, lookup, dial and replay failures end the session with the
    /// corresponding `DemuxError`. Errors after piping started are reported
    /// through [`SessionSummary::end`] instead. Running a closed session
    /// again fails with `NotConnected`.
    pub async fn run(&mut self) -> Result<SessionSummary> {
        let result = self.drive().await;

        // Whatever the outcome, the client stream is gone from here on.
        self.client = None;
        self.enter(SessionState::Closed);
        result
    }

    async fn drive(&mut self) -> Result<SessionSummary> {
        let started = Instant::now();
        let client_addr = self.client_addr;

        let Sniffed { protocol, prefix } = self.detect().await?;
        debug!("[{}] Protocol detected: {}", client_addr, protocol);

        self.enter(SessionState::Dialing);
        let backend_addr = self
            .ctx
            .destinations()
            .get(protocol)
            .copied()
            .ok_or_else(|| DemuxError::NoDestination(protocol.to_string()))?;

        let mut backend = self
            .ctx
            .dialer()
            .dial(backend_addr, client_addr)
            .await
            .map_err(|source| DemuxError::Dial { addr: backend_addr, source })?;
        debug!("[{}] Connected to backend {}", client_addr, backend_addr);

        self.enter(SessionState::Replaying);
        backend.write_all(&prefix).await?;
        debug!("[{}] Initial write of {} bytes completed, started copying data...", client_addr, prefix.len());

        self.enter(SessionState::Piping);
        let client = self.client.take().ok_or_else(closed)?;
        let report = proxy_data(client, backend).await;

        Ok(SessionSummary {
            protocol,
            backend: backend_addr,
            replayed: prefix.len(),
            upstream_bytes: report.upstream_bytes,
            downstream_bytes: report.downstream_bytes,
            end: report.end,
            duration: started.elapsed(),
        })
    }

    async fn detect(&mut self) -> Result<Sniffed> {
        let detectors = self.ctx.detectors.as_slice();
        let client = self.client.as_mut().ok_or_else(closed)?;
        match self.ctx.detect_timeout {
            Some(limit) => timeout(limit, sniff(client, detectors))
                .await
                .map_err(|_| DemuxError::DetectionTimeout(limit))?,
            None => sniff(client, detectors).await,
        }
    }
}

fn closed() -> DemuxError {
    DemuxError::Io(io::Error::new(io::ErrorKind::NotConnected, "session already closed"))
}

/// Handle a single client connection
///
/// Fire-and-forget entry point used by the accept loop: runs the session,
/// logs the outcome and records it in the `demux_sessions_total` counter.
/// Nothing is ever written back to a client that could not be forwarded.
///
/// # Parameters
///
/// * `client_stream` - Accepted client stream
/// * `client_addr` - Client's remote address
/// * `ctx` - Shared session context
pub async fn handle_connection<S, D>(client_stream: S, client_addr: SocketAddr, ctx: Arc<SessionContext<D>>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    D: Dialer,
{
    info!("[{}] Accepted", client_addr);

    let mut session = Session::new(client_stream, client_addr, ctx);
    match session.run().await {
        Ok(summary) => {
            counter!("demux_sessions_total", "outcome" => "forwarded").increment(1);
            counter!("demux_detected_total", "protocol" => summary.protocol).increment(1);
            info!(
                "[{}] Connection closed: protocol={} backend={} up={} down={} duration={}ms",
                client_addr,
                summary.protocol,
                summary.backend,
                summary.replayed as u64 + summary.upstream_bytes,
                summary.downstream_bytes,
                summary.duration.as_millis(),
            );
        }
        Err(e) => {
            counter!("demux_sessions_total", "outcome" => e.outcome()).increment(1);
            match &e {
                DemuxError::NoProtocolMatched { .. } => {
                    warn!("[{}] All protocols failed to detect: {}", client_addr, e)
                }
                DemuxError::BufferExhausted { .. } | DemuxError::DetectionTimeout(_) => {
                    warn!("[{}] Giving up on detection: {}", client_addr, e)
                }
                DemuxError::Io(io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("[{}] Client went away during detection", client_addr)
                }
                DemuxError::Io(_) => error!("[{}] Error in initial read or replay: {}", client_addr, e),
                _ => error!("[{}] {}", client_addr, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HttpDetector, OpenVpnDetector, SshDetector, TlsDetector};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    /// Hands out one in-memory backend and records every attempt
    #[derive(Default)]
    struct TestDialer {
        attempts: AtomicUsize,
        dialed: Mutex<Vec<(SocketAddr, SocketAddr)>>,
        backend: Mutex<Option<DuplexStream>>,
    }

    impl TestDialer {
        fn with_backend(backend: DuplexStream) -> Self {
            Self {
                backend: Mutex::new(Some(backend)),
                ..Self::default()
            }
        }
    }

    impl Dialer for TestDialer {
        type Stream = DuplexStream;

        async fn dial(&self, backend: SocketAddr, client: SocketAddr) -> io::Result<DuplexStream> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.dialed.lock().unwrap().push((backend, client));
            let stream = self.backend.lock().unwrap().take();
            stream.ok_or_else(|| io::Error::from(io::ErrorKind::ConnectionRefused))
        }
    }

    fn client_addr() -> SocketAddr {
        addr("198.51.100.7:50123")
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn context(dialer: TestDialer, destinations: &[(&str, &str)]) -> Arc<SessionContext<TestDialer>> {
        let destinations: DestinationMap = destinations
            .iter()
            .map(|(name, backend)| (name.to_string(), addr(backend)))
            .collect();
        let detectors: Vec<Arc<dyn Detector>> = vec![
            Arc::new(SshDetector),
            Arc::new(TlsDetector),
            Arc::new(HttpDetector),
        ];
        Arc::new(SessionContext::new(detectors, Arc::new(destinations), dialer))
    }

    #[tokio::test]
    async fn test_replays_sniffed_bytes_then_pipes() {
        let (backend, mut backend_peer) = duplex(4096);
        let ctx = context(TestDialer::with_backend(backend), &[("ssh", "127.0.0.1:2222")]);
        let (client, mut client_peer) = duplex(4096);

        let mut session = Session::new(client, client_addr(), Arc::clone(&ctx));
        let session = tokio::spawn(async move {
            let summary = session.run().await;
            (summary, session.state())
        });

        client_peer.write_all(b"SSH-").await.unwrap();
        tokio::task::yield_now().await;
        client_peer.write_all(b"2.0-libssh_0.8\r\n").await.unwrap();

        let banner = b"SSH-2.0-libssh_0.8\r\n";
        let mut received = vec![0u8; banner.len()];
        backend_peer.read_exact(&mut received).await.unwrap();
        assert_eq!(&received[..], &banner[..]);

        backend_peer.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await.unwrap();
        let mut reply = [0u8; 21];
        client_peer.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"SSH-2.0-OpenSSH_9.6\r\n");

        drop(client_peer);
        let (summary, state) = session.await.unwrap();
        let summary = summary.unwrap();
        assert_eq!(state, SessionState::Closed);
        assert_eq!(summary.protocol, "ssh");
        assert_eq!(summary.backend, addr("127.0.0.1:2222"));
        assert_eq!(summary.replayed as u64 + summary.upstream_bytes, banner.len() as u64);
        assert_eq!(summary.downstream_bytes, 21);

        assert_eq!(ctx.dialer().attempts.load(Ordering::SeqCst), 1);
        let dialed = ctx.dialer().dialed.lock().unwrap().clone();
        assert_eq!(dialed, vec![(addr("127.0.0.1:2222"), client_addr())]);
    }

    #[tokio::test]
    async fn test_no_match_never_dials() {
        let ctx = context(TestDialer::default(), &[("ssh", "127.0.0.1:22"), ("tls", "127.0.0.1:443")]);
        let (client, mut client_peer) = duplex(64);

        client_peer.write_all(&[0x00, 0x01, 0x02, 0x03]).await.unwrap();
        let mut session = Session::new(client, client_addr(), Arc::clone(&ctx));
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, DemuxError::NoProtocolMatched { received: 4 }));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(ctx.dialer().attempts.load(Ordering::SeqCst), 0);

        // The client side was closed without a response.
        let mut buf = [0u8; 1];
        assert_eq!(client_peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_destination_is_rejected() {
        // http is enabled as a detector but has no destination entry.
        let ctx = context(TestDialer::default(), &[("ssh", "127.0.0.1:22")]);
        let (client, mut client_peer) = duplex(64);

        client_peer.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        let err = Session::new(client, client_addr(), Arc::clone(&ctx)).run().await.unwrap_err();

        assert!(matches!(err, DemuxError::NoDestination(ref name) if name == "http"));
        assert_eq!(ctx.dialer().attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dial_failure() {
        let ctx = context(TestDialer::default(), &[("tls", "127.0.0.1:8443")]);
        let (client, mut client_peer) = duplex(64);

        client_peer.write_all(&[0x16, 0x03, 0x01, 0x00, 0x05]).await.unwrap();
        let err = Session::new(client, client_addr(), Arc::clone(&ctx)).run().await.unwrap_err();

        match err {
            DemuxError::Dial { addr, source } => {
                assert_eq!(addr, self::addr("127.0.0.1:8443"));
                assert_eq!(source.kind(), io::ErrorKind::ConnectionRefused);
            }
            other => panic!("expected dial error, got {other:?}"),
        }
        assert_eq!(ctx.dialer().attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detection_timeout() {
        let detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(SshDetector), Arc::new(OpenVpnDetector)];
        let ctx = Arc::new(
            SessionContext::new(detectors, Arc::new(DestinationMap::new()), TestDialer::default())
                .with_detect_timeout(Some(Duration::from_millis(50))),
        );
        let (client, mut client_peer) = duplex(64);

        client_peer.write_all(b"S").await.unwrap();
        let err = Session::new(client, client_addr(), Arc::clone(&ctx)).run().await.unwrap_err();

        assert!(matches!(err, DemuxError::DetectionTimeout(_)));
        assert_eq!(ctx.dialer().attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_handle_connection_swallows_errors() {
        let ctx = context(TestDialer::default(), &[("ssh", "127.0.0.1:22")]);
        let (client, mut client_peer) = duplex(64);
        client_peer.write_all(b"\xff\xff\xff\xff").await.unwrap();

        handle_connection(client, client_addr(), ctx).await;
    }

    #[test]
    fn test_new_session_starts_detecting() {
        let ctx = context(TestDialer::default(), &[]);
        let (client, _peer) = duplex(8);
        let session = Session::new(client, client_addr(), ctx);
        assert_eq!(session.state(), SessionState::Detecting);
    }

    #[tokio::test]
    async fn test_closed_session_cannot_run_again() {
        let ctx = context(TestDialer::default(), &[("ssh", "127.0.0.1:22")]);
        let (client, mut client_peer) = duplex(64);
        client_peer.write_all(b"\xff\xff\xff\xff").await.unwrap();

        let mut session = Session::new(client, client_addr(), Arc::clone(&ctx));
        assert!(session.run().await.is_err());

        let err = session.run().await.unwrap_err();
        assert!(matches!(err, DemuxError::Io(ref e) if e.kind() == io::ErrorKind::NotConnected));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(ctx.dialer().attempts.load(Ordering::SeqCst), 0);
    }
}
