use std::sync::Arc;

use tracing::debug;
use tracing::error;
use tracing::info;

use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::handler::ProtocolHandler;
use crate::listener::Listener;

/// Accept clients from `listener` until accepting fails.
///
/// The protocol handler is built once before the first accept; a handler
/// that cannot be built is returned without accepting anything. Every client
/// is served on its own task and its outcome is only logged.
pub async fn serve<L>(mut listener: L, config: ProxyConfig) -> ProxyError
where
    L: Listener,
{
    let handler = match ProtocolHandler::new(Arc::new(config)) {
        Ok(handler) => Arc::new(handler),
        Err(err) => {
            error!("failed to create protocol handler: {err}");
            return err.into();
        }
    };
    info!(kind = ?handler.kind(), "sql proxy accepting connections");

    loop {
        let (conn, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                error!("failed to accept connection: {err}");
                return ProxyError::Accept(err);
            }
        };
        debug!(%peer, "accepted connection");

        let handler = Arc::clone(&handler);
        tokio::spawn(async move {
            match handler.handle_client(conn).await {
                Ok(()) => debug!(%peer, "connection finished"),
                Err(err) => debug!(%peer, "connection ended with error: {err}"),
            }
        });
    }
}
