use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::ProxyConfig;

/// Byte stream to an upstream database.
pub trait UpstreamIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> UpstreamIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type UpstreamStream = Box<dyn UpstreamIo>;

pub type DialFuture = Pin<Box<dyn Future<Output = io::Result<UpstreamStream>> + Send>>;

/// Dial override taking `(network, address)`.
pub type DialFn = Arc<dyn Fn(&str, &str) -> DialFuture + Send + Sync>;

/// Open a connection to the configured upstream.
///
/// Uses the dial override when one is installed, otherwise a plain TCP
/// connection to `hostname:port`.
pub async fn dial_upstream(config: &ProxyConfig) -> io::Result<UpstreamStream> {
    let address = format!("{}:{}", config.hostname, config.port);
    if let Some(dial) = &config.dialer {
        debug!("dialing upstream through override");
        return dial("tcp", &address).await;
    }

    debug!(%address, "dialing upstream");
    let stream = TcpStream::connect((config.hostname.as_str(), config.port)).await?;
    stream.set_nodelay(true)?;
    Ok(Box::new(stream))
}
