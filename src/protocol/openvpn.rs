//! OpenVPN (TCP mode) detector
//!
//! OpenVPN over TCP frames every packet with a 16-bit big-endian length.
//! The detector assumes the whole first packet arrives in a single read; a
//! split packet yields `NoMatch`.

use super::detector::{Detection, Detector};

/// Detects the length-prefixed first packet of an OpenVPN TCP session
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenVpnDetector;

impl Detector for OpenVpnDetector {
    fn name(&self) -> &'static str {
        "openvpn"
    }

    fn detect(&self, buf: &[u8]) -> Detection {
        if buf.len() < 2 {
            return Detection::NeedMoreData;
        }

        let packet_len = usize::from(u16::from_be_bytes([buf[0], buf[1]]));
        if packet_len == buf.len() - 2 {
            Detection::Matched
        } else {
            Detection::NoMatch
        }
    }
}
