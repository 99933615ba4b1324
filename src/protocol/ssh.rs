//! SSH detector

use super::detector::{Detection, Detector};

/// Start of the SSH version-exchange line
const BANNER_PREFIX: &[u8; 4] = b"SSH-";

/// Detects the SSH identification string sent by clients
#[derive(Debug, Clone, Copy, Default)]
pub struct SshDetector;

impl Detector for SshDetector {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn detect(&self, buf: &[u8]) -> Detection {
        if buf.len() < BANNER_PREFIX.len() {
            return Detection::NeedMoreData;
        }

        if buf.starts_with(BANNER_PREFIX) {
            Detection::Matched
        } else {
            Detection::NoMatch
        }
    }
}
