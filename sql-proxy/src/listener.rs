use std::io;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::net::UnixListener;
use tokio::net::UnixStream;

/// An already-bound listener the proxy accepts clients from.
#[async_trait]
pub trait Listener: Send {
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Next client connection and a printable peer address.
    async fn accept(&mut self) -> io::Result<(Self::Conn, String)>;
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpStream;

    async fn accept(&mut self) -> io::Result<(Self::Conn, String)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        stream.set_nodelay(true)?;
        Ok((stream, peer.to_string()))
    }
}

#[async_trait]
impl Listener for UnixListener {
    type Conn = UnixStream;

    async fn accept(&mut self) -> io::Result<(Self::Conn, String)> {
        let (stream, peer) = UnixListener::accept(self).await?;
        let peer = peer
            .as_pathname()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "unix:unnamed".to_string());
        Ok((stream, peer))
    }
}
