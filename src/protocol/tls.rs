//! TLS detector
//!
//! Looks for the handshake record type (0x16) followed by an SSLv3/TLS
//! record version. SSLv2-style hellos are not recognised.

use log::trace;

use super::detector::{Detection, Detector};

/// TLS handshake record type
const HANDSHAKE: u8 = 0x16;

/// Record version major byte shared by SSLv3 and every TLS version
const VERSION_MAJOR: u8 = 0x03;

/// Highest accepted record version minor byte (TLS 1.2 record layer)
const MAX_VERSION_MINOR: u8 = 0x03;

/// Detects a TLS ClientHello record header
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsDetector;

impl Detector for TlsDetector {
    fn name(&self) -> &'static str {
        "tls"
    }

    fn detect(&self, buf: &[u8]) -> Detection {
        if buf.len() < 3 {
            return Detection::NeedMoreData;
        }

        if buf[0] == HANDSHAKE && buf[1] == VERSION_MAJOR && buf[2] <= MAX_VERSION_MINOR {
            Detection::Matched
        } else {
            trace!("Not TLS: record header {:02X?}", &buf[..3]);
            Detection::NoMatch
        }
    }
}
