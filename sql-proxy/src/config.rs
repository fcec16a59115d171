use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::cloudsql::CloudSqlDialerFactory;
use crate::cloudsql::ManagedDialerFactory;
use crate::cloudsql::ManagedDialerOptions;
use crate::dialer::DialFn;
use crate::dialer::DialFuture;
use crate::error::ProxyError;

/// Backend as described by the connector's resource model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BackendDescriptor {
    pub hostname: String,
    pub port: u16,
    /// `postgres` selects the Postgres handler; anything else is MySQL.
    pub upstream_type: String,
    pub username: String,
    pub password: String,
    pub rds_iam: bool,
    pub aws_region: Option<String>,

    /// Reach the instance through the Cloud SQL connector instead of TCP.
    pub cloudsql: bool,
    /// Instance connection name, `project:region:instance`.
    pub cloudsql_instance: String,
    pub cloudsql_credentials_file: Option<PathBuf>,
    pub cloudsql_iam_auth: bool,

    /// Defaults to enabled when absent.
    pub upstream_tls: Option<bool>,
    pub upstream_ca_file: Option<PathBuf>,
    pub upstream_cert_file: Option<PathBuf>,
    pub upstream_key_file: Option<PathBuf>,
}

/// Per-listener configuration shared read-only by every handler task.
#[derive(Clone, Default)]
pub struct ProxyConfig {
    pub hostname: String,
    pub port: u16,
    pub upstream_type: String,
    pub username: String,
    pub password: String,
    pub rds_iam: bool,
    pub aws_region: Option<String>,
    pub upstream_ca_file: Option<PathBuf>,
    pub upstream_cert_file: Option<PathBuf>,
    pub upstream_key_file: Option<PathBuf>,
    pub upstream_tls: bool,
    /// Replaces the plain TCP dial when set.
    pub dialer: Option<DialFn>,
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("upstream_type", &self.upstream_type)
            .field("username", &self.username)
            .field("rds_iam", &self.rds_iam)
            .field("aws_region", &self.aws_region)
            .field("upstream_ca_file", &self.upstream_ca_file)
            .field("upstream_cert_file", &self.upstream_cert_file)
            .field("upstream_key_file", &self.upstream_key_file)
            .field("upstream_tls", &self.upstream_tls)
            .field("dialer", &self.dialer.as_ref().map(|_| "<override>"))
            .finish_non_exhaustive()
    }
}

/// Map a descriptor to a listener configuration, building the Cloud SQL
/// dialer when the descriptor asks for one.
pub fn build_proxy_config(descriptor: &BackendDescriptor) -> Result<ProxyConfig, ProxyError> {
    build_proxy_config_with(descriptor, &CloudSqlDialerFactory::default())
}

/// Same as [`build_proxy_config`] with a caller-chosen dialer factory.
pub fn build_proxy_config_with(
    descriptor: &BackendDescriptor,
    factory: &dyn ManagedDialerFactory,
) -> Result<ProxyConfig, ProxyError> {
    let mut config = ProxyConfig {
        hostname: descriptor.hostname.clone(),
        port: descriptor.port,
        upstream_type: descriptor.upstream_type.clone(),
        username: descriptor.username.clone(),
        password: descriptor.password.clone(),
        rds_iam: descriptor.rds_iam,
        aws_region: descriptor.aws_region.clone(),
        upstream_ca_file: descriptor.upstream_ca_file.clone(),
        upstream_cert_file: descriptor.upstream_cert_file.clone(),
        upstream_key_file: descriptor.upstream_key_file.clone(),
        upstream_tls: descriptor.upstream_tls.unwrap_or(true),
        dialer: None,
    };

    if descriptor.cloudsql {
        if descriptor.cloudsql_instance.is_empty() {
            return Err(ProxyError::MissingCloudSqlInstance);
        }

        let options = ManagedDialerOptions {
            credentials_file: descriptor.cloudsql_credentials_file.clone(),
            iam_auth: descriptor.cloudsql_iam_auth,
        };
        let managed = factory.create(&options)?;
        let instance = descriptor.cloudsql_instance.clone();
        info!(%instance, iam_auth = options.iam_auth, "using cloudsql connector");

        // The instance is fixed at configuration time; the dial arguments are
        // ignored.
        let dialer: DialFn = Arc::new(move |_network: &str, _address: &str| -> DialFuture {
            let managed = Arc::clone(&managed);
            let instance = instance.clone();
            Box::pin(async move { managed.dial(&instance).await })
        });
        config.dialer = Some(dialer);
    }

    Ok(config)
}
