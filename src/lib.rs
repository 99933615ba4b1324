//! tcp-demux: Protocol-Sniffing TCP Demultiplexer
//!
//! Accepts TCP connections on a single port, identifies the application
//! protocol from the first bytes the client sends, and relays the whole
//! connection to the backend configured for that protocol. Where the
//! platform allows it, the backend connection is bound to the client's own
//! address so backends see the real peer.
//!
//! # Main Features
//!
//! - TLS, SSH, HTTP and OpenVPN detection from the connection prefix
//! - Sniffed bytes replayed verbatim before any other data
//! - Transparent dialing on Linux, plain dialing elsewhere
//! - Layered configuration: defaults, JSON file, environment, command line
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tcp_demux::{DemuxServer, PlainDialer, ProtocolRegistry, Result, SessionContext};
//! use tcp_demux::config::DemuxConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let registry = tcp_demux::protocol::install(ProtocolRegistry::builtin()?)?;
//!
//!     let mut config = DemuxConfig { port: 4443, ..Default::default() };
//!     config.destinations.insert("ssh".into(), "127.0.0.1:22".into());
//!     config.destinations.insert("tls".into(), "127.0.0.1:8443".into());
//!
//!     let destinations = config.destination_map()?;
//!     let detectors = registry.enabled(&destinations);
//!     let ctx = SessionContext::new(detectors, Arc::new(destinations), PlainDialer);
//!
//!     DemuxServer::bind(config.listen_addr()?, ctx).await?.run().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod protocol;
pub mod proxy;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, DemuxError, Result};
pub use protocol::{Detection, Detector, ProtocolRegistry};
pub use proxy::{BackendDialer, DemuxServer, Dialer, PlainDialer, SessionContext};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
