//! UniFi controller client: login, client list, logout.
//!
//! TLS verification is replaced entirely by [`PinnedCertVerifier`]: with a
//! fingerprint configured only a leaf certificate whose SHA-1 digest matches
//! is accepted, without one any certificate is accepted.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::{Client, Response, StatusCode};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{ring, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tracing::{debug, warn};

use crate::error::{DirectoryError, FetchStep};
use crate::records::ClientEntry;

/// Overall timeout for each controller request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Name of the controller's session cookie.
const SESSION_COOKIE: &str = "unifises";

/// A source of client entries.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Fetch the full client list. Partial results are never returned.
    async fn fetch_clients(&self) -> Result<Vec<ClientEntry>, DirectoryError>;
}

/// SHA-1 digest of the controller's leaf certificate.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint([u8; 20]);

impl Fingerprint {
    /// Digest the DER encoding of a certificate.
    pub fn of_certificate(der: &[u8]) -> Self {
        Self(Sha1::digest(der).into())
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl From<[u8; 20]> for Fingerprint {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    /// Parse hex, optionally separated by colons (`de:ad:be:ef:...`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim().replace(':', ""))
            .map_err(|e| format!("unable to parse fingerprint: {e}"))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| {
                format!("fingerprint must be 20 bytes, got {}", b.len())
            })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

/// Certificate verifier that trusts by fingerprint instead of by CA chain.
///
/// Handshake signatures are still checked, so the peer has to hold the key
/// of the certificate it presents.
#[derive(Debug)]
pub struct PinnedCertVerifier {
    pin: Option<Fingerprint>,
    provider: Arc<CryptoProvider>,
}

impl PinnedCertVerifier {
    /// Create a verifier for the given pin.
    pub fn new(pin: Option<Fingerprint>, provider: Arc<CryptoProvider>) -> Self {
        Self { pin, provider }
    }
}

impl ServerCertVerifier for PinnedCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let Some(expected) = self.pin else {
            return Ok(ServerCertVerified::assertion());
        };

        let actual = Fingerprint::of_certificate(end_entity.as_ref());
        if actual != expected {
            warn!(
                %expected,
                %actual,
                "controller certificate fingerprint mismatch"
            );
            return Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ));
        }

        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Build the rustls client config used for controller connections.
pub fn tls_config(pin: Option<Fingerprint>) -> Result<ClientConfig, rustls::Error> {
    let provider = Arc::new(ring::default_provider());
    let verifier = Arc::new(PinnedCertVerifier::new(pin, provider.clone()));

    Ok(ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ClientList {
    #[serde(default)]
    data: Vec<ClientEntry>,
}

/// Client for one controller site.
#[derive(Clone)]
pub struct UnifiClient {
    base_url: String,
    site: String,
    username: String,
    password: String,
    tls: ClientConfig,
}

impl fmt::Debug for UnifiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiClient")
            .field("base_url", &self.base_url)
            .field("site", &self.site)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl UnifiClient {
    /// Create a client. `base_url` must not end with `/`.
    pub fn new(
        base_url: impl Into<String>,
        site: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        pin: Option<Fingerprint>,
    ) -> Result<Self, DirectoryError> {
        Ok(Self {
            base_url: base_url.into(),
            site: site.into(),
            username: username.into(),
            password: password.into(),
            tls: tls_config(pin)?,
        })
    }

    /// HTTP client with a fresh cookie jar, scoped to one session.
    fn session(&self) -> Result<Client, DirectoryError> {
        Client::builder()
            .use_preconfigured_tls(self.tls.clone())
            .cookie_store(true)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(DirectoryError::Client)
    }

    async fn login(&self, http: &Client) -> Result<(), DirectoryError> {
        let step = FetchStep::Login;
        let response = http
            .post(format!("{}/api/login", self.base_url))
            .header(REFERER, format!("{}/login", self.base_url))
            .json(&LoginRequest {
                username: &self.username,
                password: &self.password,
            })
            .send()
            .await
            .map_err(|source| DirectoryError::Request { step, source })?;
        let response = expect_ok(step, response)?;

        // Only an alphanumeric prefix of the value is required.
        let has_session = response.cookies().any(|cookie| {
            cookie.name() == SESSION_COOKIE
                && cookie.value().starts_with(|c: char| c.is_ascii_alphanumeric())
        });
        if !has_session {
            return Err(DirectoryError::MissingSessionCookie);
        }

        Ok(())
    }

    async fn list_clients(&self, http: &Client) -> Result<Vec<ClientEntry>, DirectoryError> {
        let step = FetchStep::ListClients;
        let response = http
            .post(format!("{}/api/s/{}/stat/sta", self.base_url, self.site))
            .send()
            .await
            .map_err(|source| DirectoryError::Request { step, source })?;
        let list: ClientList = expect_ok(step, response)?
            .json()
            .await
            .map_err(DirectoryError::Decode)?;

        Ok(list.data)
    }

    async fn logout(&self, http: &Client) -> Result<(), DirectoryError> {
        let step = FetchStep::Logout;
        let response = http
            .post(format!("{}/logout", self.base_url))
            .send()
            .await
            .map_err(|source| DirectoryError::Request { step, source })?;
        expect_ok(step, response)?;
        Ok(())
    }
}

fn expect_ok(step: FetchStep, response: Response) -> Result<Response, DirectoryError> {
    match response.status() {
        StatusCode::OK => Ok(response),
        status => Err(DirectoryError::Status { step, status }),
    }
}

#[async_trait]
impl Directory for UnifiClient {
    async fn fetch_clients(&self) -> Result<Vec<ClientEntry>, DirectoryError> {
        let http = self.session()?;

        self.login(&http).await?;
        let clients = self.list_clients(&http).await?;
        // Fail closed: a session that could not be closed discards its data.
        self.logout(&http).await?;

        debug!(
            clients = clients.len(),
            site = %self.site,
            "fetched controller clients"
        );
        Ok(clients)
    }
}
