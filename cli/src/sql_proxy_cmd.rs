use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Args;
use portal_sql_proxy::BackendDescriptor;
use portal_sql_proxy::build_proxy_config;
use portal_sql_proxy::serve;
use tokio::net::TcpListener;
use tokio::net::UnixListener;
use tracing::info;

#[derive(Debug, Args)]
pub struct SqlProxyCommand {
    /// TOML file describing the backend.
    #[arg(long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// `host:port`, or `unix:<path>` for a unix socket.
    #[arg(long = "listen", value_name = "ADDR")]
    pub listen: ListenAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    Tcp(String),
    Unix(PathBuf),
}

impl FromStr for ListenAddr {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        if let Some(path) = value.strip_prefix("unix:") {
            if path.is_empty() {
                return Err("unix listen address needs a socket path".to_string());
            }
            return Ok(Self::Unix(PathBuf::from(path)));
        }
        if value.is_empty() {
            return Err("listen address must not be empty".to_string());
        }
        Ok(Self::Tcp(value.to_string()))
    }
}

pub fn load_descriptor(path: &Path) -> anyhow::Result<BackendDescriptor> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read backend config {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse backend config {}", path.display()))
}

/// Runs until the listener fails.
pub async fn run_sql_proxy_command(command: SqlProxyCommand) -> anyhow::Result<()> {
    let descriptor = load_descriptor(&command.config)?;
    let config = build_proxy_config(&descriptor)?;

    let err = match command.listen {
        ListenAddr::Tcp(addr) => {
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("failed to listen on {addr}"))?;
            info!(%addr, "sql proxy listening");
            serve(listener, config).await
        }
        ListenAddr::Unix(path) => {
            let listener = UnixListener::bind(&path)
                .with_context(|| format!("failed to listen on {}", path.display()))?;
            info!(path = %path.display(), "sql proxy listening");
            serve(listener, config).await
        }
    };
    Err(err.into())
}
