//! Configuration module
//!
//! This module handles application configuration: loading it from a JSON
//! file and the environment, applying command line overrides, and validating
//! the result against the protocol registry.

mod defaults;
mod loader;
mod validator;

pub use self::defaults::{ENV_PREFIX, ENV_SEPARATOR, HOST_STR, LOG_LEVEL_STR};
pub use self::loader::ConfigLoader;
pub use self::validator::validate_config;

use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use serde::Deserialize;

use crate::common::{parse_socket_addr, DemuxError, Result};
use crate::protocol::DestinationMap;

/// Demultiplexer configuration
///
/// Every field has a default, so partial files and sparse environments are
/// valid input; [`validate_config`] decides whether the result is usable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DemuxConfig {
    /// Host to listen on
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Dial backends from the client's address
    pub transparent: bool,

    /// Log level
    pub log_level: String,

    /// Detection timeout in seconds (0 = wait indefinitely)
    pub detect_timeout: u64,

    /// Protocol name → backend `host:port`; empty values disable a protocol
    pub destinations: BTreeMap<String, String>,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            host: defaults::host(),
            port: defaults::port(),
            transparent: defaults::transparent(),
            log_level: defaults::log_level(),
            detect_timeout: defaults::detect_timeout(),
            destinations: BTreeMap::new(),
        }
    }
}

/// Values given explicitly on the command line
///
/// `None` leaves the loaded value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub transparent: Option<bool>,
    pub log_level: Option<String>,
    pub detect_timeout: Option<u64>,
    pub destinations: Vec<(String, String)>,
}

impl DemuxConfig {
    /// Apply command line overrides on top of this configuration
    pub fn merge(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(host) = overrides.host {
            self.host = host;
        }
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(transparent) = overrides.transparent {
            self.transparent = transparent;
        }
        if let Some(log_level) = overrides.log_level {
            self.log_level = log_level;
        }
        if let Some(detect_timeout) = overrides.detect_timeout {
            self.detect_timeout = detect_timeout;
        }
        for (name, addr) in overrides.destinations {
            self.destinations.insert(name.to_lowercase(), addr);
        }
        self
    }

    /// Resolved listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        match self.host.parse::<IpAddr>() {
            Ok(ip) => Ok(SocketAddr::new(ip, self.port)),
            Err(_) => parse_socket_addr(&format!("{}:{}", self.host, self.port)),
        }
    }

    /// Names of protocols with a non-empty destination, in name order
    pub fn enabled_names(&self) -> impl Iterator<Item = &str> {
        self.destinations
            .iter()
            .filter(|(_, addr)| !addr.trim().is_empty())
            .map(|(name, _)| name.as_str())
    }

    /// Resolve every non-empty destination
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the protocol whose address does
    /// not resolve.
    pub fn destination_map(&self) -> Result<DestinationMap> {
        self.destinations
            .iter()
            .filter(|(_, addr)| !addr.trim().is_empty())
            .map(|(name, addr)| {
                let resolved = parse_socket_addr(addr.trim()).map_err(|e| {
                    DemuxError::Config(format!("Invalid destination for '{}': {}", name, e))
                })?;
                Ok((name.to_lowercase(), resolved))
            })
            .collect()
    }

    /// Detection timeout, if enabled
    pub fn detect_timeout(&self) -> Option<Duration> {
        (self.detect_timeout > 0).then(|| Duration::from_secs(self.detect_timeout))
    }
}

/// Parse a `NAME=ADDR` command line destination
pub fn parse_destination(s: &str) -> Result<(String, String)> {
    match s.split_once('=') {
        Some((name, addr)) if !name.trim().is_empty() => {
            Ok((name.trim().to_lowercase(), addr.trim().to_string()))
        }
        _ => Err(DemuxError::Config(format!(
            "Invalid destination '{}': expected NAME=HOST:PORT",
            s
        ))),
    }
}
