//! Configuration loader
//!
//! Layers a JSON configuration file and `TCP_DEMUX_*` environment variables
//! over the built-in defaults. Command line values are applied afterwards
//! with [`DemuxConfig::merge`](super::DemuxConfig::merge).

use std::path::{Path, PathBuf};

use ::config::{Config, Environment, File, FileFormat};
use log::debug;

use super::defaults::{ENV_PREFIX, ENV_SEPARATOR};
use super::DemuxConfig;
use crate::common::{DemuxError, Result};

/// Builder for the file and environment configuration layers
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: bool,
}

impl ConfigLoader {
    /// Loader that yields the defaults only
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON configuration file
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Read `TCP_DEMUX_*` environment variables
    pub fn with_env(mut self, enabled: bool) -> Self {
        self.env = enabled;
        self
    }

    /// Build the layered configuration
    ///
    /// Later layers win: defaults, then the file, then the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or malformed, or if a value
    /// has the wrong type.
    pub fn load(&self) -> Result<DemuxConfig> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            if !path.exists() {
                return Err(DemuxError::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            debug!("Loading configuration from file: {}", path.display());
            builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Json));
        }

        if self.env {
            debug!("Loading configuration from environment ({}_*)", ENV_PREFIX);
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            );
        }

        let config = builder.build()?.try_deserialize::<DemuxConfig>()?;
        Ok(config)
    }
}
