//! tcp-demux Command Line Tool
//!
//! This binary is the command-line interface for tcp-demux.

use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use tcp_demux::common::{init_logger, Result};
use tcp_demux::config::{parse_destination, validate_config, ConfigLoader, ConfigOverrides};
use tcp_demux::protocol::{self, ProtocolRegistry};
use tcp_demux::{BackendDialer, DemuxServer, SessionContext, APP_NAME, VERSION};

/// tcp-demux: serve several TCP protocols from one port
#[derive(Parser, Debug)]
#[clap(author, version = VERSION, about, long_about = None)]
struct Args {
    /// Host to listen on [default: 0.0.0.0]
    #[clap(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[clap(short, long)]
    port: Option<u16>,

    /// Dial backends from the client's address (Linux only)
    #[clap(long, value_name = "BOOL")]
    transparent: Option<bool>,

    /// Backend for a protocol, e.g. `-d ssh=127.0.0.1:22`; repeatable
    #[clap(short, long = "destination", value_name = "NAME=ADDR", value_parser = parse_destination)]
    destinations: Vec<(String, String)>,

    /// Give up on detection after this many seconds (0 = never)
    #[clap(long, value_name = "SECONDS")]
    detect_timeout: Option<u64>,

    /// Log level [default: info]
    #[clap(long)]
    log_level: Option<String>,

    /// Load configuration from environment variables (TCP_DEMUX_*)
    #[clap(long)]
    from_env: bool,

    /// Load configuration from a JSON file
    #[clap(long)]
    config_file: Option<String>,

    /// List the registered protocols and exit
    #[clap(long)]
    list_protocols: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            transparent: self.transparent,
            log_level: self.log_level.clone(),
            detect_timeout: self.detect_timeout,
            destinations: self.destinations.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Duplicate protocol names are fatal before anything else happens
    let registry = protocol::install(ProtocolRegistry::builtin()?)?;

    let args = Args::parse();

    if args.list_protocols {
        init_logger(args.log_level.as_deref().unwrap_or("info"));
        info!("Registered protocols:");
        for name in registry.names() {
            info!("  {}", name);
        }
        return Ok(());
    }

    let mut loader = ConfigLoader::new().with_env(args.from_env);
    if let Some(path) = &args.config_file {
        loader = loader.with_file(path);
    }
    let config = loader.load()?.merge(args.overrides());

    init_logger(&config.log_level);
    info!("Starting {} v{}", APP_NAME, VERSION);

    validate_config(&config, registry)?;

    let destinations = config.destination_map()?;
    for (name, addr) in &destinations {
        info!("Destination: {} -> {}", name, addr);
    }

    let dialer = BackendDialer::select(config.transparent);
    let detectors = registry.enabled(&destinations);
    let ctx = SessionContext::new(detectors, Arc::new(destinations), dialer)
        .with_detect_timeout(config.detect_timeout());

    let server = DemuxServer::bind(config.listen_addr()?, ctx).await?;

    info!("Demux service ready, press Ctrl+C to stop");

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!("Demux service stopped: {}", e);
            }
            result
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Received Ctrl+C, shutting down"),
                Err(e) => warn!("Could not listen for Ctrl+C: {}", e),
            }
            Ok(())
        }
    }
}
