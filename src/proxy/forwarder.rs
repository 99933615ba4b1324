//! Data forwarding module
//!
//! Relays bytes between the client and the backend with two spawned copy
//! tasks. Whichever direction stops first ends the session; the other
//! direction is aborted.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, error};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Copy buffer size for each direction
pub const PIPE_BUFFER_SIZE: usize = 0xFFFF;

/// Direction of a copy loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to backend
    Upstream,
    /// Backend to client
    Downstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upstream => write!(f, "client -> backend"),
            Self::Downstream => write!(f, "backend -> client"),
        }
    }
}

/// Why a copy loop stopped
#[derive(Debug)]
pub enum PipeEnd {
    /// Source reached end of stream
    Eof(Direction),
    /// Reading from the source failed
    ReadError(Direction, io::Error),
    /// Writing to the destination failed
    WriteError(Direction, io::Error),
}

impl PipeEnd {
    /// Direction that stopped
    pub fn direction(&self) -> Direction {
        match self {
            Self::Eof(d) | Self::ReadError(d, _) | Self::WriteError(d, _) => *d,
        }
    }

    /// Whether the pipe ended on a clean end of stream
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof(_))
    }
}

/// Single-fire completion signal shared by both copy loops
///
/// Only the first caller of [`PipeSignal::fire`] is reported; later calls are
/// dropped silently.
pub struct PipeSignal {
    fired: AtomicBool,
    tx: mpsc::Sender<PipeEnd>,
}

impl PipeSignal {
    /// Create a signal and the receiver that observes it
    pub fn new() -> (Arc<Self>, mpsc::Receiver<PipeEnd>) {
        let (tx, rx) = mpsc::channel(1);
        let signal = Arc::new(Self {
            fired: AtomicBool::new(false),
            tx,
        });
        (signal, rx)
    }

    /// Report that a copy loop stopped
    ///
    /// Returns true for the single caller that won the race.
    pub fn fire(&self, end: PipeEnd) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        match &end {
            PipeEnd::Eof(direction) => debug!("{} reached end of stream", direction),
            PipeEnd::ReadError(direction, e) => error!("Error reading ({}): {}", direction, e),
            PipeEnd::WriteError(direction, e) => error!("Error writing ({}): {}", direction, e),
        }

        // Capacity one and a single winner: this cannot be full. It only
        // fails if the session already went away, which is fine.
        let _ = self.tx.try_send(end);
        true
    }

    /// Whether the signal has fired
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// Outcome of a finished pipe
#[derive(Debug)]
pub struct PipeReport {
    /// First direction to stop and why
    pub end: PipeEnd,
    /// Bytes relayed from client to backend
    pub upstream_bytes: u64,
    /// Bytes relayed from backend to client
    pub downstream_bytes: u64,
}

/// Relay data between `client` and `backend` until either side stops
///
/// Both copy loops are aborted and joined before returning, so every half
/// of both streams has been dropped (and the sockets closed) by then.
pub async fn proxy_data<C, B>(client: C, backend: B) -> PipeReport
where
    C: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let (client_reader, client_writer) = tokio::io::split(client);
    let (backend_reader, backend_writer) = tokio::io::split(backend);

    let (signal, mut rx) = PipeSignal::new();
    let upstream_bytes = Arc::new(AtomicU64::new(0));
    let downstream_bytes = Arc::new(AtomicU64::new(0));

    let upstream = spawn_copy(
        client_reader,
        backend_writer,
        Direction::Upstream,
        Arc::clone(&signal),
        Arc::clone(&upstream_bytes),
    );
    let downstream = spawn_copy(
        backend_reader,
        client_writer,
        Direction::Downstream,
        signal,
        Arc::clone(&downstream_bytes),
    );

    // Only the copy tasks hold the signal now; the channel closes early
    // only if both of them died without firing.
    let end = match rx.recv().await {
        Some(end) => end,
        None => PipeEnd::ReadError(
            Direction::Upstream,
            io::Error::new(io::ErrorKind::Other, "copy tasks stopped without reporting"),
        ),
    };

    for task in [upstream, downstream] {
        task.abort();
        let _ = task.await;
    }

    PipeReport {
        end,
        upstream_bytes: upstream_bytes.load(Ordering::Relaxed),
        downstream_bytes: downstream_bytes.load(Ordering::Relaxed),
    }
}

fn spawn_copy<R, W>(
    mut reader: ReadHalf<R>,
    mut writer: WriteHalf<W>,
    direction: Direction,
    signal: Arc<PipeSignal>,
    transferred: Arc<AtomicU64>,
) -> JoinHandle<()>
where
    R: AsyncRead + Send + 'static,
    W: AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = vec![0u8; PIPE_BUFFER_SIZE];

        let end = loop {
            let n = match reader.read(&mut buffer).await {
                Ok(0) => break PipeEnd::Eof(direction),
                Ok(n) => n,
                Err(e) => break PipeEnd::ReadError(direction, e),
            };

            if let Err(e) = writer.write_all(&buffer[..n]).await {
                break PipeEnd::WriteError(direction, e);
            }
            transferred.fetch_add(n as u64, Ordering::Relaxed);
        };

        debug!("{} transferred {} bytes total", direction, transferred.load(Ordering::Relaxed));
        signal.fire(end);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_relays_both_directions() {
        let (client, mut client_peer) = duplex(1024);
        let (backend, mut backend_peer) = duplex(1024);

        let pipe = tokio::spawn(proxy_data(client, backend));

        client_peer.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        backend_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        backend_peer.write_all(b"pong!").await.unwrap();
        let mut buf = [0u8; 5];
        client_peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong!");

        drop(client_peer);
        let report = pipe.await.unwrap();
        assert!(report.end.is_eof());
        assert_eq!(report.end.direction(), Direction::Upstream);
        assert_eq!(report.upstream_bytes, 4);
        assert_eq!(report.downstream_bytes, 5);
    }

    #[tokio::test]
    async fn test_first_close_tears_down_other_side() {
        let (client, client_peer) = duplex(64);
        let (backend, mut backend_peer) = duplex(64);

        let pipe = tokio::spawn(proxy_data(client, backend));
        drop(client_peer);
        let report = pipe.await.unwrap();
        assert_eq!(report.end.direction(), Direction::Upstream);

        // The backend stream was dropped with the aborted tasks.
        let mut buf = [0u8; 1];
        assert_eq!(backend_peer.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_signal_fires_once() {
        let (signal, mut rx) = PipeSignal::new();

        assert!(signal.fire(PipeEnd::Eof(Direction::Downstream)));
        assert!(!signal.fire(PipeEnd::ReadError(
            Direction::Upstream,
            io::Error::from(io::ErrorKind::ConnectionReset),
        )));
        assert!(signal.has_fired());

        let end = rx.recv().await.unwrap();
        assert_eq!(end.direction(), Direction::Downstream);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_signal_single_winner_under_contention() {
        for _ in 0..100 {
            let (signal, mut rx) = PipeSignal::new();
            let barrier = Arc::new(tokio::sync::Barrier::new(2));

            let racers: Vec<_> = [Direction::Upstream, Direction::Downstream]
                .into_iter()
                .map(|direction| {
                    let signal = Arc::clone(&signal);
                    let barrier = Arc::clone(&barrier);
                    tokio::spawn(async move {
                        barrier.wait().await;
                        signal.fire(PipeEnd::WriteError(
                            direction,
                            io::Error::from(io::ErrorKind::BrokenPipe),
                        ))
                    })
                })
                .collect();

            let mut winners = 0;
            for racer in racers {
                if racer.await.unwrap() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);

            assert!(rx.recv().await.is_some());
            assert!(rx.try_recv().is_err());
        }
    }
}
