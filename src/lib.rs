//! unifi-names-dns - A DNS server for clients known to a UniFi controller.
//!
//! This crate answers A and AAAA queries for devices connected to a UniFi
//! network. It periodically logs in to the controller, pulls the client list,
//! turns each device's display name into a DNS label and publishes it under the
//! zone configured for the device's network.
//!
//! ## Features
//!
//! - TTL-driven refresh of the client list, at most one refresh in flight
//! - Optional SHA-1 pinning of the controller's certificate
//! - Stale records keep being served while the controller is unreachable
//! - Unanswered requests are handed to the next handler in the chain
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         unifi-names-dns                          │
//! │                                                                  │
//! │  ┌──────────────────┐    ┌──────────────────┐                   │
//! │  │ UniFi controller │───▶│   RecordCache    │                   │
//! │  │ login/sta/logout │    │   (snapshot)     │                   │
//! │  └──────────────────┘    └────────┬─────────┘                   │
//! │                                   │                              │
//! │                                   ▼                              │
//! │  UDP/TCP ──▶ UnifiNamesHandler ──▶ Resolver                      │
//! │                     │                                            │
//! │                     └── no answer ──▶ next handler (Catalog)     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Naming
//!
//! ```text
//! "Joe's Notebook" on network LAN, with LAN = "example.com"
//!   → joe-s-notebook.example.com.
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use unifi_names_dns::{Config, DnsServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config: Config = load_config();
//!     let server = DnsServer::new(config.validate().unwrap()).unwrap();
//!
//!     let shutdown = CancellationToken::new();
//!     server.run(shutdown).await.unwrap();
//! }
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod names;
pub mod records;
pub mod resolver;
pub mod server;
pub mod telemetry;
pub mod unifi;
pub mod zones;

// Re-export main types
pub use cache::RecordCache;
pub use config::{Config, DnsConfig, TelemetryConfig, UnifiConfig, ValidatedConfig};
pub use error::{DirectoryError, DnsError};
pub use handler::UnifiNamesHandler;
pub use resolver::Resolver;
pub use server::DnsServer;
pub use unifi::{Directory, Fingerprint, UnifiClient};
pub use zones::ZoneTable;
