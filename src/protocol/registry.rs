//! Protocol registry
//!
//! Maps protocol names to detectors. A registry is built once during
//! startup, optionally installed as the process-wide table, and never
//! modified afterwards.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use log::debug;
use once_cell::sync::OnceCell;

use crate::common::{DemuxError, Result};
use super::detector::Detector;
use super::{HttpDetector, OpenVpnDetector, SshDetector, TlsDetector};

/// Protocol name → resolved backend address
pub type DestinationMap = HashMap<String, SocketAddr>;

/// Process-wide registry, written once at startup
static REGISTRY: OnceCell<ProtocolRegistry> = OnceCell::new();

/// Table of detectors keyed by their unique name
#[derive(Default)]
pub struct ProtocolRegistry {
    detectors: BTreeMap<&'static str, Arc<dyn Detector>>,
}

impl ProtocolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every detector shipped with the crate
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();
        registry.register(TlsDetector)?;
        registry.register(SshDetector)?;
        registry.register(HttpDetector)?;
        registry.register(OpenVpnDetector)?;
        Ok(registry)
    }

    /// Register a detector
    ///
    /// # Errors
    ///
    /// Returns `DemuxError::DuplicateProtocol` if a detector with the same
    /// name is already registered. Callers treat this as fatal.
    pub fn register<D>(&mut self, detector: D) -> Result<()>
    where
        D: Detector + 'static,
    {
        self.register_arc(Arc::new(detector))
    }

    /// Register an already shared detector
    pub fn register_arc(&mut self, detector: Arc<dyn Detector>) -> Result<()> {
        let name = detector.name();
        if self.detectors.contains_key(name) {
            return Err(DemuxError::DuplicateProtocol(name.to_string()));
        }

        debug!("Registered protocol: {}", name);
        self.detectors.insert(name, detector);
        Ok(())
    }

    /// Look up a detector by name
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Detector>> {
        self.detectors.get(name)
    }

    /// Whether a detector is registered under `name`
    pub fn contains(&self, name: &str) -> bool {
        self.detectors.contains_key(name)
    }

    /// All registered detectors, in name order
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Detector>> {
        self.detectors.values()
    }

    /// All registered names, in order
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.detectors.keys().copied()
    }

    /// Number of registered detectors
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Detectors that have a destination configured
    ///
    /// The order is the registry's name order; when two detectors could
    /// match the same bytes the first one wins.
    pub fn enabled(&self, destinations: &DestinationMap) -> Vec<Arc<dyn Detector>> {
        self.all()
            .filter(|detector| destinations.contains_key(detector.name()))
            .cloned()
            .collect()
    }
}

/// Install `registry` as the process-wide table
///
/// # Errors
///
/// Returns `DemuxError::RegistryInstalled` if a registry was installed before.
pub fn install(registry: ProtocolRegistry) -> Result<&'static ProtocolRegistry> {
    REGISTRY
        .set(registry)
        .map_err(|_| DemuxError::RegistryInstalled)?;
    REGISTRY.get().ok_or(DemuxError::RegistryInstalled)
}

/// The process-wide registry, if it has been installed
pub fn registry() -> Option<&'static ProtocolRegistry> {
    REGISTRY.get()
}
