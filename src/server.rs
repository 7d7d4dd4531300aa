//! DNS server setup and lifecycle management.

use hickory_server::authority::Catalog;
use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::cache::RecordCache;
use crate::config::ValidatedConfig;
use crate::error::DnsError;
use crate::handler::UnifiNamesHandler;
use crate::resolver::Resolver;
use crate::unifi::{Directory, UnifiClient};

/// Interval for emitting state metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Idle timeout for TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Periodically emit state metrics.
async fn metrics_loop(cache: Arc<RecordCache>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(METRICS_INTERVAL);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                cache.emit_metrics();
                debug!(
                    a = cache.a_count(),
                    aaaa = cache.aaaa_count(),
                    "emitted state metrics"
                );
            }
            _ = shutdown.cancelled() => {
                debug!("metrics loop shutting down");
                return;
            }
        }
    }
}

/// DNS server answering for UniFi controller clients.
pub struct DnsServer {
    config: ValidatedConfig,
    resolver: Resolver,
}

impl DnsServer {
    /// Create a server talking to the configured controller.
    pub fn new(config: ValidatedConfig) -> Result<Self, DnsError> {
        let client = UnifiClient::new(
            config.url.clone(),
            config.site.clone(),
            config.username.clone(),
            config.password.clone(),
            config.fingerprint,
        )?;
        Ok(Self::with_directory(config, Arc::new(client)))
    }

    /// Create a server backed by an arbitrary directory.
    pub fn with_directory(config: ValidatedConfig, directory: Arc<dyn Directory>) -> Self {
        let zones = Arc::new(config.zones.clone());
        let cache = Arc::new(RecordCache::new(directory, zones.clone(), config.ttl));
        Self {
            config,
            resolver: Resolver::new(zones, cache),
        }
    }

    /// The record cache.
    pub fn cache(&self) -> &Arc<RecordCache> {
        self.resolver.cache()
    }

    /// Run the DNS server until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.listen_addr,
            controller = %self.config.url,
            site = %self.config.site,
            networks = self.config.zones.len(),
            pinned = self.config.fingerprint.is_some(),
            "Starting unifi-names-dns server"
        );
        if self.config.fingerprint.is_none() {
            info!("no controller fingerprint configured, certificate will not be verified");
        }

        // Unanswered requests fall through to an empty catalog, which refuses them.
        let handler = UnifiNamesHandler::new(self.resolver.clone(), Catalog::new());
        let mut server = ServerFuture::new(handler);

        // Bind UDP
        let udp_socket = UdpSocket::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        let tcp_listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "DNS TCP listening");
        server.register_listener(tcp_listener, TCP_TIMEOUT);

        let metrics_task = metrics_loop(self.cache().clone(), shutdown.clone());
        let metrics_handle = tokio::spawn(metrics_task);

        let shutdown_requested = tokio::select! {
            _ = shutdown.cancelled() => true,
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
                false
            }
        };

        if shutdown_requested {
            info!("DNS server shutdown requested");
            if let Err(e) = server.shutdown_gracefully().await {
                error!("DNS server error during shutdown: {}", e);
            }
        }

        shutdown.cancel();
        let _ = metrics_handle.await;

        info!("DNS server stopped");
        Ok(())
    }
}
