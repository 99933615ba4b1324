//! Proxy service module
//!
//! This module implements the connection lifecycle: sniffing the first
//! bytes, dialing the matching backend (transparently where possible),
//! replaying the sniffed bytes and relaying data in both directions.

pub mod server;
mod dialer;
mod forwarder;
mod handler;
mod sniffer;
pub mod transparent;

pub use dialer::{BackendDialer, Dialer, PlainDialer, TransparentDialer};
pub use forwarder::{proxy_data, Direction, PipeEnd, PipeReport, PipeSignal, PIPE_BUFFER_SIZE};
pub use handler::{handle_connection, Session, SessionContext, SessionState, SessionSummary};
pub use server::DemuxServer;
pub use sniffer::{sniff, Sniffed, DETECT_BUFFER_SIZE};
