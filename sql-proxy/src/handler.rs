use std::io;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tracing::debug;
use tracing::info;

use crate::config::ProxyConfig;
use crate::dialer::dial_upstream;
use crate::error::HandlerError;
use crate::postgres::PostgresHandler;

/// Wire protocol spoken by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    Postgres,
    Mysql,
}

impl UpstreamKind {
    /// Exactly `postgres` selects Postgres; everything else is MySQL.
    pub fn from_upstream_type(upstream_type: &str) -> Self {
        match upstream_type {
            "postgres" => Self::Postgres,
            _ => Self::Mysql,
        }
    }
}

/// Per-listener connection handler, fixed when the listener starts.
#[derive(Debug)]
pub enum ProtocolHandler {
    Postgres(PostgresHandler),
    Mysql(MysqlHandler),
}

impl ProtocolHandler {
    pub fn new(config: Arc<ProxyConfig>) -> Result<Self, HandlerError> {
        if config.rds_iam && config.aws_region.as_deref().is_none_or(str::is_empty) {
            return Err(HandlerError::RdsIamWithoutRegion);
        }

        let handler = match UpstreamKind::from_upstream_type(&config.upstream_type) {
            UpstreamKind::Postgres => Self::Postgres(PostgresHandler::new(config)?),
            UpstreamKind::Mysql => Self::Mysql(MysqlHandler::new(config)),
        };
        info!(
            kind = ?handler.kind(),
            upstream_tls = handler.upstream_tls(),
            "protocol handler ready"
        );
        Ok(handler)
    }

    pub fn kind(&self) -> UpstreamKind {
        match self {
            Self::Postgres(_) => UpstreamKind::Postgres,
            Self::Mysql(_) => UpstreamKind::Mysql,
        }
    }

    /// Whether the proxy itself encrypts the upstream leg.
    pub fn upstream_tls(&self) -> bool {
        match self {
            Self::Postgres(handler) => handler.upstream_tls(),
            Self::Mysql(_) => false,
        }
    }

    /// Serve one client connection until either side closes.
    pub async fn handle_client<S>(&self, conn: S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self {
            Self::Postgres(handler) => handler.handle_client(conn).await,
            Self::Mysql(handler) => handler.handle_client(conn).await,
        }
    }
}

/// Relays MySQL clients byte for byte.
///
/// The client negotiates TLS with the upstream inside the relayed stream.
#[derive(Debug)]
pub struct MysqlHandler {
    config: Arc<ProxyConfig>,
}

impl MysqlHandler {
    fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }

    async fn handle_client<S>(&self, mut client: S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut upstream = dial_upstream(&self.config).await?;
        let (sent, received) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
        debug!(sent, received, "mysql connection closed");
        Ok(())
    }
}
