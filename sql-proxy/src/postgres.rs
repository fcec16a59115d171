use std::io;
use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use tracing::trace;

use crate::config::ProxyConfig;
use crate::dialer::UpstreamStream;
use crate::dialer::dial_upstream;
use crate::error::HandlerError;
use crate::tls::UpstreamTls;

pub(crate) const SSL_REQUEST_CODE: i32 = 80877103;
pub(crate) const GSSENC_REQUEST_CODE: i32 = 80877104;

/// Upper bound the server itself applies to startup packets.
const MAX_STARTUP_PACKET_LEN: usize = 10_000;
/// Length word plus request code.
const MIN_STARTUP_PACKET_LEN: usize = 8;

const ENCRYPTION_ACCEPTED: u8 = b'S';
const ENCRYPTION_DECLINED: u8 = b'N';

/// Relays Postgres clients, optionally upgrading the upstream leg to TLS.
///
/// Encryption requests from the client are declined; securing the client
/// leg belongs to the listener. The upstream leg is upgraded with an
/// SSLRequest when TLS is enabled and the connection is not already carried
/// by a managed connector.
#[derive(Debug)]
pub struct PostgresHandler {
    config: Arc<ProxyConfig>,
    tls: Option<UpstreamTls>,
}

impl PostgresHandler {
    pub(crate) fn new(config: Arc<ProxyConfig>) -> Result<Self, HandlerError> {
        let tls = if config.upstream_tls && config.dialer.is_none() {
            Some(UpstreamTls::from_config(&config)?)
        } else {
            None
        };
        Ok(Self { config, tls })
    }

    pub(crate) fn upstream_tls(&self) -> bool {
        self.tls.is_some()
    }

    pub(crate) async fn handle_client<S>(&self, mut client: S) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let startup = read_startup_packet(&mut client).await?;

        let upstream = dial_upstream(&self.config).await?;
        let mut upstream = match &self.tls {
            Some(tls) => negotiate_tls(upstream, tls).await?,
            None => upstream,
        };
        upstream.write_all(&startup).await?;
        upstream.flush().await?;

        let (sent, received) = tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
        debug!(sent, received, "postgres connection closed");
        Ok(())
    }
}

/// Read startup packets until one that is not an encryption request,
/// declining each encryption request on the way.
async fn read_startup_packet<S>(client: &mut S) -> io::Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let len = client.read_u32().await?;
        let len = usize::try_from(len)
            .ok()
            .filter(|len| (MIN_STARTUP_PACKET_LEN..=MAX_STARTUP_PACKET_LEN).contains(len))
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("invalid startup packet length {len}"),
                )
            })?;
        let code = client.read_i32().await?;

        match code {
            SSL_REQUEST_CODE | GSSENC_REQUEST_CODE => {
                trace!(code, "declining client encryption request");
                client.write_all(&[ENCRYPTION_DECLINED]).await?;
                client.flush().await?;
            }
            _ => {
                let mut packet = Vec::with_capacity(len);
                packet.extend_from_slice(&(len as u32).to_be_bytes());
                packet.extend_from_slice(&code.to_be_bytes());
                packet.resize(len, 0);
                client.read_exact(&mut packet[MIN_STARTUP_PACKET_LEN..]).await?;
                return Ok(packet);
            }
        }
    }
}

async fn negotiate_tls(mut upstream: UpstreamStream, tls: &UpstreamTls) -> io::Result<UpstreamStream> {
    let mut request = Vec::with_capacity(MIN_STARTUP_PACKET_LEN);
    request.extend_from_slice(&(MIN_STARTUP_PACKET_LEN as u32).to_be_bytes());
    request.extend_from_slice(&SSL_REQUEST_CODE.to_be_bytes());
    upstream.write_all(&request).await?;
    upstream.flush().await?;

    let reply = upstream.read_u8().await?;
    if reply != ENCRYPTION_ACCEPTED {
        return Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "upstream refused tls",
        ));
    }

    let stream = tls
        .connector
        .connect(tls.server_name.clone(), upstream)
        .await?;
    debug!("upstream tls established");
    Ok(Box::new(stream))
}
