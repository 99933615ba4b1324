//! Detection loop
//!
//! Reads from the client into a fixed buffer and runs the enabled detectors
//! over the growing prefix until one matches, all of them reject, or the
//! buffer is full.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::common::{DemuxError, Result};
use crate::protocol::{Detection, Detector};

/// Capacity of the detection buffer
pub const DETECT_BUFFER_SIZE: usize = 512;

/// Result of a successful detection
#[derive(Debug, Clone)]
pub struct Sniffed {
    /// Name of the matching detector
    pub protocol: &'static str,
    /// Every byte read from the client so far; must be replayed to the backend
    pub prefix: Bytes,
}

/// Run detection over `reader`
///
/// # Errors
///
/// * `DemuxError::Io` on a read error, or `UnexpectedEof` if the client
///   closes before a verdict
/// * `DemuxError::NoProtocolMatched` when every detector rejects the prefix
/// * `DemuxError::BufferExhausted` when `DETECT_BUFFER_SIZE` bytes arrive
///   without a verdict
pub async fn sniff<R>(reader: &mut R, detectors: &[Arc<dyn Detector>]) -> Result<Sniffed>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::zeroed(DETECT_BUFFER_SIZE);
    let mut received = 0;

    loop {
        if received == DETECT_BUFFER_SIZE {
            return Err(DemuxError::BufferExhausted { capacity: DETECT_BUFFER_SIZE });
        }

        let n = reader.read(&mut buf[received..]).await?;
        if n == 0 {
            return Err(DemuxError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "client closed the connection during protocol detection",
            )));
        }

        received += n;
        debug!("Did new read: read_size={} total_read={}", n, received);
        trace!("Detection buffer: {:02X?}", &buf[..received]);

        let mut rejected = 0;
        for detector in detectors {
            match detector.detect(&buf[..received]) {
                Detection::Matched => {
                    buf.truncate(received);
                    return Ok(Sniffed {
                        protocol: detector.name(),
                        prefix: buf.freeze(),
                    });
                }
                Detection::NoMatch => rejected += 1,
                Detection::NeedMoreData => {}
            }
        }

        if rejected == detectors.len() {
            return Err(DemuxError::NoProtocolMatched { received });
        }
    }
}
