//! Common module
//!
//! This module contains shared errors and utility functions used throughout the application.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{DemuxError, Result};
pub use log::init_logger;
pub use net::{match_family, parse_socket_addr};
