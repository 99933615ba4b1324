//! Protocol detector contract
//!
//! A detector classifies the bytes a client has sent so far. Detectors are
//! shared by every session, so they must not keep state between calls.

use std::fmt;

/// Verdict of a single detector over the current buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// The buffer unambiguously identifies the protocol
    Matched,
    /// The buffer is too short to decide
    NeedMoreData,
    /// The buffer already rules the protocol out
    NoMatch,
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Matched => write!(f, "matched"),
            Self::NeedMoreData => write!(f, "need more data"),
            Self::NoMatch => write!(f, "no match"),
        }
    }
}

/// Protocol detector trait
///
/// This trait defines the interface for protocol detection.
#[cfg_attr(test, mockall::automock)]
pub trait Detector: Send + Sync {
    /// Unique registration key, also used to pick the destination
    fn name(&self) -> &'static str;

    /// Classify the cumulative prefix read from the client
    ///
    /// `buf` always starts at the first byte of the connection. The result
    /// must depend only on its content and length.
    fn detect(&self, buf: &[u8]) -> Detection;
}

impl fmt::Debug for dyn Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Detector").field(&self.name()).finish()
    }
}

/// Returns true if `needle` occurs anywhere in `haystack`
pub(crate) fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        assert!(contains(b"xxGETyy", b"GET"));
        assert!(contains(b"GET", b"GET"));
        assert!(!contains(b"GE", b"GET"));
        assert!(!contains(b"anything", b""));
    }

    #[test]
    fn test_detection_display() {
        assert_eq!(Detection::NeedMoreData.to_string(), "need more data");
    }
}
