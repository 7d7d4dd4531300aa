//! unifi-names-dns binary entry point.

use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use unifi_names_dns::{telemetry, Config, DnsServer};

/// DNS server for clients known to a UniFi controller.
#[derive(Parser, Debug)]
#[command(name = "unifi-names-dns")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "unifi-names-dns.toml")]
    config: PathBuf,
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn wait_for_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!("unable to install SIGTERM handler: {}", e);
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    let _ = ctrl_c.await;

    info!("shutdown signal received");
    shutdown.cancel();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("UNIFI_NAMES")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    // Initialize telemetry
    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    let validated = config.validate()?;

    info!(
        config_file = %args.config.display(),
        listen_addr = %validated.listen_addr,
        controller = %validated.url,
        ttl_secs = validated.ttl.as_secs(),
        "Starting unifi-names-dns"
    );

    // Setup graceful shutdown
    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    // Run DNS server
    let server = DnsServer::new(validated)?;
    let result = server.run(shutdown).await;

    if let Err(e) = result {
        error!("DNS server error: {}", e);
        return Err(e.into());
    }

    info!("unifi-names-dns shutdown complete");
    Ok(())
}
