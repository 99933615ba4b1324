//! Configuration validator
//!
//! Checks a merged configuration before anything is bound or dialed.

use log::warn;

use super::DemuxConfig;
use crate::common::{DemuxError, Result};
use crate::protocol::ProtocolRegistry;

const VALID_LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Validate a configuration against the protocol registry
///
/// # Errors
///
/// Returns [`DemuxError::Config`] when the listen port is missing, no
/// protocol is enabled, a destination names an unregistered protocol, or a
/// destination or the listen address cannot be resolved. An unknown log
/// level is only warned about.
pub fn validate_config(config: &DemuxConfig, registry: &ProtocolRegistry) -> Result<()> {
    if config.port == 0 {
        return Err(DemuxError::Config("You must provide a listen port".to_string()));
    }

    config.listen_addr()?;

    if config.enabled_names().next().is_none() {
        return Err(DemuxError::Config(
            "No protocols were enabled; configure at least one destination".to_string(),
        ));
    }

    for name in config.destinations.keys() {
        if !registry.contains(&name.to_lowercase()) {
            return Err(DemuxError::Config(format!(
                "Unknown protocol '{}' (registered: {})",
                name,
                registry.names().collect::<Vec<_>>().join(", ")
            )));
        }
    }

    config.destination_map()?;

    if !VALID_LOG_LEVELS.contains(&config.log_level.to_lowercase().as_str()) {
        warn!(
            "Unknown log level '{}', expected one of: {}",
            config.log_level,
            VALID_LOG_LEVELS.join(", ")
        );
    }

    Ok(())
}
