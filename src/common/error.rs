//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// TCP demultiplexer error type
#[derive(Error, Debug)]
pub enum DemuxError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error raised by the layered configuration loader
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    /// Two detectors were registered under the same name
    #[error("protocol '{0}' already exists")]
    DuplicateProtocol(String),

    /// The process-wide registry was installed twice
    #[error("protocol registry is already installed")]
    RegistryInstalled,

    /// Every enabled detector rejected the client's bytes
    #[error("no protocols detected after {received} bytes")]
    NoProtocolMatched {
        /// Bytes read from the client before giving up
        received: usize,
    },

    /// Detection buffer filled up without a decisive verdict
    #[error("detection buffer exhausted after {capacity} bytes without a verdict")]
    BufferExhausted {
        /// Capacity of the detection buffer
        capacity: usize,
    },

    /// Detection did not finish in time
    #[error("protocol detection timed out after {0:?}")]
    DetectionTimeout(Duration),

    /// A protocol was detected but has no backend configured
    #[error("no destination configured for protocol '{0}'")]
    NoDestination(String),

    /// Dialing the backend failed
    #[error("error dialing backend {addr}: {source}")]
    Dial {
        /// Backend address
        addr: SocketAddr,
        /// Underlying failure
        #[source]
        source: io::Error,
    },
}

impl DemuxError {
    /// Short label used for outcome counters
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NoProtocolMatched { .. } => "no_match",
            Self::BufferExhausted { .. } => "buffer_exhausted",
            Self::DetectionTimeout(_) => "detection_timeout",
            Self::NoDestination(_) => "no_destination",
            Self::Dial { .. } => "dial_failed",
            Self::Io(_) => "io_error",
            Self::Config(_)
            | Self::ConfigSource(_)
            | Self::DuplicateProtocol(_)
            | Self::RegistryInstalled => "error",
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `DemuxError`.
pub type Result<T> = std::result::Result<T, DemuxError>;
