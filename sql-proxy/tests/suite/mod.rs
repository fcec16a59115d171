#![allow(clippy::unwrap_used, clippy::expect_used)]

mod serve;

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use portal_sql_proxy::ProxyConfig;
use portal_sql_proxy::ProxyError;
use portal_sql_proxy::serve;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

pub(crate) fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Upstream that echoes every connection back to itself.
pub(crate) async fn echo_upstream() -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    Ok(addr)
}

/// Start `serve` on a fresh loopback listener.
pub(crate) async fn spawn_proxy(
    config: ProxyConfig,
) -> io::Result<(SocketAddr, JoinHandle<ProxyError>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let task = tokio::spawn(serve(listener, config));
    Ok((addr, task))
}

pub(crate) fn upstream_config(upstream_type: &str, upstream: SocketAddr) -> ProxyConfig {
    ProxyConfig {
        hostname: upstream.ip().to_string(),
        port: upstream.port(),
        upstream_type: upstream_type.to_string(),
        upstream_tls: false,
        ..Default::default()
    }
}

pub(crate) async fn round_trip(addr: SocketAddr, payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(payload).await?;
    let mut echoed = vec![0u8; payload.len()];
    stream.read_exact(&mut echoed).await?;
    Ok(echoed)
}

/// Postgres startup packet for protocol 3.0 with a `user` parameter.
pub(crate) fn startup_packet(user: &str) -> Vec<u8> {
    let mut body = 196_608i32.to_be_bytes().to_vec();
    body.extend_from_slice(b"user\0");
    body.extend_from_slice(user.as_bytes());
    body.extend_from_slice(b"\0\0");
    let mut packet = ((body.len() + 4) as u32).to_be_bytes().to_vec();
    packet.extend(body);
    packet
}

pub(crate) fn ssl_request() -> Vec<u8> {
    let mut packet = 8u32.to_be_bytes().to_vec();
    packet.extend_from_slice(&80_877_103i32.to_be_bytes());
    packet
}

/// Read one length-prefixed startup packet, length word included.
pub(crate) async fn read_startup<S>(stream: &mut S) -> io::Result<Vec<u8>>
where
    S: tokio::io::AsyncRead + Unpin,
{
    let len = stream.read_u32().await?;
    let mut packet = len.to_be_bytes().to_vec();
    packet.resize(len as usize, 0);
    stream.read_exact(&mut packet[4..]).await?;
    Ok(packet)
}
