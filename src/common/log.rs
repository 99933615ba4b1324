//! Logging helpers
//!
//! Wires the `log` facade to `env_logger`.

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level` when set. Calling this more than
/// once is harmless; only the first call installs the logger.
///
/// # Parameters
///
/// * `level` - Default log level
pub fn init_logger(level: &str) {
    INIT.call_once(|| {
        let env = env_logger::Env::default()
            .filter_or("RUST_LOG", level);

        // A test harness may already have installed a logger.
        let _ = env_logger::Builder::from_env(env).try_init();
    });
}
