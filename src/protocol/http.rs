//! HTTP detector
//!
//! Matches on the `HTTP` token of a request/status line or on any request
//! method appearing in the buffer. It never asks for more data, so a client
//! that trickles its method token one byte at a time can be rejected.

use super::detector::{contains, Detection, Detector};

/// Token present in every HTTP/1.x request and status line
const HTTP_TOKEN: &[u8] = b"HTTP";

/// Request methods recognised on their own
const HTTP_METHODS: [&[u8]; 8] = [
    b"GET",
    b"PUT",
    b"HEAD",
    b"POST",
    b"TRACE",
    b"DELETE",
    b"CONNECT",
    b"OPTIONS",
];

/// Detects plain-text HTTP/1.x
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpDetector;

impl Detector for HttpDetector {
    fn name(&self) -> &'static str {
        "http"
    }

    fn detect(&self, buf: &[u8]) -> Detection {
        if contains(buf, HTTP_TOKEN) {
            return Detection::Matched;
        }

        if HTTP_METHODS.iter().any(|method| contains(buf, method)) {
            Detection::Matched
        } else {
            Detection::NoMatch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_methods() {
        assert_eq!(HttpDetector.detect(b"GET / HTTP/1.1\r\n"), Detection::Matched);
        assert_eq!(HttpDetector.detect(b"OPTIONS *"), Detection::Matched);
        assert_eq!(HttpDetector.detect(b"xxDELETExx"), Detection::Matched);
        assert_eq!(HttpDetector.detect(b"GET"), Detection::Matched);
    }

    #[test]
    fn test_http_token_anywhere() {
        assert_eq!(HttpDetector.detect(b"HTTP/1.1 200 OK"), Detection::Matched);
        assert_eq!(HttpDetector.detect(b"\x00\x01HTTP"), Detection::Matched);
    }

    #[test]
    fn test_http_never_waits() {
        assert_eq!(HttpDetector.detect(b"GE"), Detection::NoMatch);
        assert_eq!(HttpDetector.detect(b"\x16\x03"), Detection::NoMatch);
        assert_eq!(HttpDetector.detect(b"SSH-2.0-OpenSSH"), Detection::NoMatch);
        assert_eq!(HttpDetector.detect(b""), Detection::NoMatch);
    }
}
