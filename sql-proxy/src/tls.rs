use std::path::Path;
use std::sync::Arc;

use rustls::ClientConfig;
use rustls::RootCertStore;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::PrivateKeyDer;
use rustls_pki_types::ServerName;
use rustls_pki_types::pem::PemObject;
use tokio_rustls::TlsConnector;
use tracing::debug;
use tracing::warn;

use crate::config::ProxyConfig;
use crate::error::HandlerError;

/// Client side of the proxy's upstream TLS session.
#[derive(Clone)]
pub(crate) struct UpstreamTls {
    pub(crate) connector: TlsConnector,
    pub(crate) server_name: ServerName<'static>,
}

impl std::fmt::Debug for UpstreamTls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamTls")
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

impl UpstreamTls {
    /// Build the connector from the configured CA and client identity.
    ///
    /// Trusts the CA file when given, the platform roots otherwise.
    pub(crate) fn from_config(config: &ProxyConfig) -> Result<Self, HandlerError> {
        let server_name = ServerName::try_from(config.hostname.clone()).map_err(|_| {
            HandlerError::InvalidServerName {
                hostname: config.hostname.clone(),
            }
        })?;

        let roots = match &config.upstream_ca_file {
            Some(path) => roots_from_file(path)?,
            None => native_roots()?,
        };

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(roots);
        let client_config = match (&config.upstream_cert_file, &config.upstream_key_file) {
            (Some(cert), Some(key)) => {
                builder.with_client_auth_cert(load_certs(cert)?, load_key(key)?)?
            }
            (None, None) => builder.with_no_client_auth(),
            _ => return Err(HandlerError::IncompleteClientIdentity),
        };

        Ok(Self {
            connector: TlsConnector::from(Arc::new(client_config)),
            server_name,
        })
    }
}

fn roots_from_file(path: &Path) -> Result<RootCertStore, HandlerError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert)?;
    }
    if roots.is_empty() {
        return Err(HandlerError::NoTrustAnchors);
    }
    Ok(roots)
}

fn native_roots() -> Result<RootCertStore, HandlerError> {
    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        warn!("failed to load a platform root certificate: {err}");
    }
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!(added, ignored, "loaded platform root certificates");
    if roots.is_empty() {
        return Err(HandlerError::NoTrustAnchors);
    }
    Ok(roots)
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, HandlerError> {
    let tls_material = |source| HandlerError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    };
    CertificateDer::pem_file_iter(path)
        .map_err(tls_material)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(tls_material)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, HandlerError> {
    PrivateKeyDer::from_pem_file(path).map_err(|source| HandlerError::TlsMaterial {
        path: path.to_path_buf(),
        source,
    })
}
