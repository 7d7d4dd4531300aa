//! Error types for unifi-names-dns.

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors that can occur in the DNS server.
#[derive(Debug, Error)]
pub enum DnsError {
    /// IO error (network, file, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// DNS protocol error
    #[error("DNS protocol error: {0}")]
    Proto(#[from] hickory_proto::ProtoError),

    /// Controller directory error
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// A step of the controller session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStep {
    /// `POST /api/login`
    Login,
    /// `POST /api/s/<site>/stat/sta`
    ListClients,
    /// `POST /logout`
    Logout,
}

impl fmt::Display for FetchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FetchStep::Login => "login",
            FetchStep::ListClients => "list clients",
            FetchStep::Logout => "logout",
        })
    }
}

/// Errors raised while fetching the client directory from the controller.
///
/// Every variant aborts the whole fetch; partial client lists are never
/// returned.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The HTTP client could not be constructed.
    #[error("unable to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The TLS configuration could not be constructed.
    #[error("unable to build TLS config: {0}")]
    Tls(#[from] rustls::Error),

    /// Transport failure, including TLS handshake and pin mismatch.
    #[error("unable to perform {step} request: {source}")]
    Request {
        /// Step that failed.
        step: FetchStep,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The controller answered with something other than 200.
    #[error("{step} failed: expected status 200 got {status}")]
    Status {
        /// Step that failed.
        step: FetchStep,
        /// Status returned by the controller.
        status: StatusCode,
    },

    /// Login succeeded but no usable `unifises` cookie was set.
    #[error("login failed: invalid or no session cookie")]
    MissingSessionCookie,

    /// The client list body was not the expected JSON document.
    #[error("unable to decode client list: {0}")]
    Decode(#[source] reqwest::Error),

    /// The refresh task was cancelled by runtime shutdown.
    #[error("refresh task was cancelled")]
    RefreshCancelled,
}

impl DirectoryError {
    /// The session step this error belongs to, if any.
    pub fn step(&self) -> Option<FetchStep> {
        match self {
            DirectoryError::Request { step, .. } | DirectoryError::Status { step, .. } => {
                Some(*step)
            }
            DirectoryError::MissingSessionCookie => Some(FetchStep::Login),
            DirectoryError::Decode(_) => Some(FetchStep::ListClients),
            DirectoryError::Client(_)
            | DirectoryError::Tls(_)
            | DirectoryError::RefreshCancelled => None,
        }
    }
}
