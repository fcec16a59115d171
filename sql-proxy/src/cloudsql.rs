use std::fmt;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::UnixStream;
use tracing::debug;
use tracing::info;

use crate::dialer::UpstreamStream;
use crate::error::ManagedDialerError;

/// Where the Cloud SQL auth proxy publishes one socket per instance.
pub const DEFAULT_SOCKET_DIR: &str = "/cloudsql";

/// Socket file the auth proxy creates inside a Postgres instance directory.
const POSTGRES_SOCKET_NAME: &str = ".s.PGSQL.5432";

const SERVICE_ACCOUNT_KIND: &str = "service_account";

/// Connects to a managed database instance by its connection name.
#[async_trait]
pub trait ManagedDialer: Send + Sync {
    async fn dial(&self, instance: &str) -> io::Result<UpstreamStream>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedDialerOptions {
    /// Service account key file; ambient credentials are used when unset.
    pub credentials_file: Option<PathBuf>,
    /// Authenticate to the database with IAM instead of a password.
    pub iam_auth: bool,
}

/// Builds the managed dialer for a listener.
pub trait ManagedDialerFactory: Send + Sync {
    fn create(
        &self,
        options: &ManagedDialerOptions,
    ) -> Result<Arc<dyn ManagedDialer>, ManagedDialerError>;
}

/// `project:region:instance`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConnectionName {
    pub project: String,
    pub region: String,
    pub instance: String,
}

impl FromStr for InstanceConnectionName {
    type Err = io::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid cloudsql instance connection name {value:?}, expected project:region:instance"),
            )
        };
        // Domain-scoped projects carry their own colon: `example.com:proj`.
        let (project, rest) = value.rsplit_once(':').ok_or_else(invalid)?;
        let (project, region) = project.rsplit_once(':').ok_or_else(invalid)?;
        let instance = rest;
        if [project, region, instance].iter().any(|part| part.is_empty()) {
            return Err(invalid());
        }
        Ok(Self {
            project: project.to_string(),
            region: region.to_string(),
            instance: instance.to_string(),
        })
    }
}

impl fmt::Display for InstanceConnectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.project, self.region, self.instance)
    }
}

/// Fields of a service account key file the dialer cares about.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub client_email: Option<String>,
}

impl ServiceAccount {
    pub fn from_file(path: &Path) -> Result<Self, ManagedDialerError> {
        let contents =
            std::fs::read_to_string(path).map_err(|source| ManagedDialerError::ReadCredentials {
                path: path.to_path_buf(),
                source,
            })?;
        let account: Self = serde_json::from_str(&contents).map_err(|source| {
            ManagedDialerError::ParseCredentials {
                path: path.to_path_buf(),
                source,
            }
        })?;
        if account.kind != SERVICE_ACCOUNT_KIND {
            return Err(ManagedDialerError::CredentialsKind {
                path: path.to_path_buf(),
                kind: account.kind,
            });
        }
        Ok(account)
    }
}

/// Dials instances through the sockets of a local Cloud SQL auth proxy.
///
/// MySQL instances are exposed as a socket named after the instance; Postgres
/// instances as a directory holding `.s.PGSQL.5432`. The auth proxy owns
/// token exchange, so the service account and the IAM flag are validated at
/// construction and only annotate dial logs here.
#[derive(Debug, Clone)]
pub struct CloudSqlDialer {
    socket_dir: PathBuf,
    service_account: Option<ServiceAccount>,
    iam_auth: bool,
}

impl CloudSqlDialer {
    pub fn new(
        socket_dir: impl Into<PathBuf>,
        options: &ManagedDialerOptions,
    ) -> Result<Self, ManagedDialerError> {
        let socket_dir = socket_dir.into();
        if let Err(source) = std::fs::read_dir(&socket_dir) {
            return Err(ManagedDialerError::SocketDir {
                path: socket_dir,
                source,
            });
        }

        let service_account = options
            .credentials_file
            .as_deref()
            .map(ServiceAccount::from_file)
            .transpose()?;
        if let Some(account) = &service_account {
            info!(
                client_email = account.client_email.as_deref().unwrap_or("<unknown>"),
                "loaded cloudsql service account"
            );
        }

        Ok(Self {
            socket_dir,
            service_account,
            iam_auth: options.iam_auth,
        })
    }

    async fn socket_path(&self, name: &InstanceConnectionName) -> PathBuf {
        let path = self.socket_dir.join(name.to_string());
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_dir() => path.join(POSTGRES_SOCKET_NAME),
            _ => path,
        }
    }
}

#[async_trait]
impl ManagedDialer for CloudSqlDialer {
    async fn dial(&self, instance: &str) -> io::Result<UpstreamStream> {
        let name: InstanceConnectionName = instance.parse()?;
        let path = self.socket_path(&name).await;
        debug!(
            instance = %name,
            path = %path.display(),
            iam_auth = self.iam_auth,
            client_email = self
                .service_account
                .as_ref()
                .and_then(|account| account.client_email.as_deref())
                .unwrap_or("<ambient>"),
            "dialing cloudsql instance"
        );
        let stream = UnixStream::connect(&path).await?;
        Ok(Box::new(stream))
    }
}

/// Creates [`CloudSqlDialer`]s rooted at one socket directory.
#[derive(Debug, Clone)]
pub struct CloudSqlDialerFactory {
    socket_dir: PathBuf,
}

impl CloudSqlDialerFactory {
    pub fn new(socket_dir: impl Into<PathBuf>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
        }
    }
}

impl Default for CloudSqlDialerFactory {
    fn default() -> Self {
        Self::new(DEFAULT_SOCKET_DIR)
    }
}

impl ManagedDialerFactory for CloudSqlDialerFactory {
    fn create(
        &self,
        options: &ManagedDialerOptions,
    ) -> Result<Arc<dyn ManagedDialer>, ManagedDialerError> {
        let dialer = CloudSqlDialer::new(self.socket_dir.clone(), options)?;
        Ok(Arc::new(dialer))
    }
}
