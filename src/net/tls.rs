//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load one certificate/key pair per enabled HTTPS host
//! - Pick the certificate by SNI, falling back to the first host's
//! - Provide the process-wide crypto provider for inbound and outbound TLS

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;

use crate::config::schema::HostConfig;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("unsupported private key in {path}: {source}")]
    UnsupportedKey {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("private key {key} does not match certificate {cert}")]
    KeyMismatch { cert: PathBuf, key: PathBuf },

    #[error("{source} for host: {host}")]
    Host {
        host: String,
        #[source]
        source: Box<CertificateError>,
    },

    #[error("TLS configuration failed: {0}")]
    Config(#[from] rustls::Error),
}

/// The installed default provider, or aws-lc-rs when none is installed.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Load a PEM certificate chain and its private key.
pub fn load_certified_key(
    cert_path: &Path,
    key_path: &Path,
    provider: &CryptoProvider,
) -> Result<CertifiedKey, CertificateError> {
    let certs = read_certs(cert_path)?;
    let key = read_private_key(key_path)?;
    let signing_key = provider
        .key_provider
        .load_private_key(key)
        .map_err(|source| CertificateError::UnsupportedKey {
            path: key_path.to_path_buf(),
            source,
        })?;

    let certified = CertifiedKey::new(certs, signing_key);
    // Keys whose public half cannot be extracted are accepted as-is.
    if let Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::KeyMismatch)) =
        certified.keys_match()
    {
        return Err(CertificateError::KeyMismatch {
            cert: cert_path.to_path_buf(),
            key: key_path.to_path_buf(),
        });
    }
    Ok(certified)
}

fn open(path: &Path) -> Result<BufReader<File>, CertificateError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| CertificateError::Read { path: path.to_path_buf(), source })
}

fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| CertificateError::Read { path: path.to_path_buf(), source })?;
    if certs.is_empty() {
        return Err(CertificateError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, CertificateError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| CertificateError::Read { path: path.to_path_buf(), source })?
        .ok_or_else(|| CertificateError::NoPrivateKey(path.to_path_buf()))
}

/// Certificate selection by SNI for one HTTPS server.
pub struct SniResolver {
    by_name: HashMap<String, Arc<CertifiedKey>>,
    fallback: Option<Arc<CertifiedKey>>,
}

impl SniResolver {
    /// Load the key material of every enabled host.
    ///
    /// Later hosts win on duplicate names; the first loaded pair answers
    /// handshakes without SNI or with an unknown name.
    pub fn from_hosts(hosts: &[HostConfig], provider: &CryptoProvider) -> Result<Self, CertificateError> {
        let mut by_name = HashMap::new();
        let mut fallback = None;

        for host in hosts.iter().filter(|h| !h.disabled) {
            let key = load_certified_key(Path::new(&host.cert_path), Path::new(&host.key_path), provider)
                .map_err(|source| CertificateError::Host {
                    host: host.name.clone(),
                    source: Box::new(source),
                })?;
            let key = Arc::new(key);
            if fallback.is_none() {
                fallback = Some(Arc::clone(&key));
            }
            by_name.insert(host.name.to_ascii_lowercase(), key);
        }

        Ok(Self { by_name, fallback })
    }

    /// Hosts with their own certificate.
    pub fn host_count(&self) -> usize {
        self.by_name.len()
    }

    fn lookup(&self, server_name: Option<&str>) -> Option<Arc<CertifiedKey>> {
        server_name
            .and_then(|name| self.by_name.get(&name.to_ascii_lowercase()))
            .or(self.fallback.as_ref())
            .cloned()
    }
}

impl fmt::Debug for SniResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SniResolver")
            .field("names", &self.by_name.keys().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl ResolvesServerCert for SniResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let chosen = self.lookup(client_hello.server_name());
        if chosen.is_none() {
            tracing::debug!(sni = ?client_hello.server_name(), "No certificate for handshake");
        }
        chosen
    }
}

/// Check that every enabled host's key material loads.
pub fn check_hosts(hosts: &[HostConfig]) -> Result<(), CertificateError> {
    SniResolver::from_hosts(hosts, &crypto_provider()).map(|_| ())
}

/// Build the listener TLS configuration for an HTTPS server.
pub fn server_config(hosts: &[HostConfig]) -> Result<RustlsConfig, CertificateError> {
    let provider = crypto_provider();
    let resolver = SniResolver::from_hosts(hosts, &provider)?;
    if resolver.host_count() == 0 {
        tracing::warn!("HTTPS server has no enabled hosts, every handshake will fail");
    }

    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(resolver));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(RustlsConfig::from_config(Arc::new(config)))
}
