use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures that stop a listener from starting or keep running.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("sql proxy: cloudsql instance is not defined")]
    MissingCloudSqlInstance,

    #[error("sql proxy: failed to create dialer for cloudsql: {0}")]
    ManagedDialer(#[from] ManagedDialerError),

    #[error("sql proxy: {0}")]
    Handler(#[from] HandlerError),

    #[error("sql proxy: failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// Protocol handler construction failures.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("rds iam authentication requires an aws region")]
    RdsIamWithoutRegion,

    #[error("failed to load tls material from {path}: {source}")]
    TlsMaterial {
        path: PathBuf,
        #[source]
        source: rustls_pki_types::pem::Error,
    },

    #[error("client certificate and key must be configured together")]
    IncompleteClientIdentity,

    #[error("no trusted root certificates available for upstream tls")]
    NoTrustAnchors,

    #[error("invalid upstream server name {hostname:?}")]
    InvalidServerName { hostname: String },

    #[error("failed to build upstream tls configuration: {0}")]
    Tls(#[from] rustls::Error),
}

/// Managed connector construction failures.
#[derive(Debug, Error)]
pub enum ManagedDialerError {
    #[error("failed to read credentials file {path}: {source}")]
    ReadCredentials {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse credentials file {path}: {source}")]
    ParseCredentials {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("credentials file {path} holds a {kind:?} key, expected a service account")]
    CredentialsKind { path: PathBuf, kind: String },

    #[error("socket directory {path} is not usable: {source}")]
    SocketDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
