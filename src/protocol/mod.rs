//! Protocol detection module
//!
//! This module provides the detectors that classify a connection from its
//! first bytes, and the registry that names them.
//!
//! Each detector is a pure function over the bytes received so far and
//! answers with a [`Detection`]: matched, need more data, or no match.

mod detector;
mod http;
mod openvpn;
mod registry;
mod ssh;
mod tls;

pub use detector::{Detection, Detector};
pub use http::HttpDetector;
pub use openvpn::OpenVpnDetector;
pub use registry::{install, registry, DestinationMap, ProtocolRegistry};
pub use ssh::SshDetector;
pub use tls::TlsDetector;

#[cfg(test)]
pub(crate) use detector::MockDetector;
