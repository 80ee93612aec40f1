//! Gateway listener and per-connection relay tasks.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::relay::{pipe, AuthDecision, ConnectionAuthorizer};
use crate::models::gateway::GatewaySession;
use crate::{AppError, Result};

/// Forwards an external port to the loopback-only control port.
pub struct DebugPortGateway {
    listener: TcpListener,
    upstream: SocketAddr,
    authorizer: Option<Arc<dyn ConnectionAuthorizer>>,
}

impl DebugPortGateway {
    /// Bind `0.0.0.0:<external_port>` forwarding to `127.0.0.1:<internal_port>`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` if the external port cannot be bound.
    pub async fn bind(
        external_port: u16,
        internal_port: u16,
        authorizer: Option<Arc<dyn ConnectionAuthorizer>>,
    ) -> Result<Self> {
        let listen = SocketAddr::from((Ipv4Addr::UNSPECIFIED, external_port));
        let upstream = SocketAddr::from((Ipv4Addr::LOCALHOST, internal_port));
        Self::bind_addr(listen, upstream, authorizer).await
    }

    /// Bind an explicit listen address forwarding to `upstream`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Bind` if `listen` cannot be bound.
    pub async fn bind_addr(
        listen: SocketAddr,
        upstream: SocketAddr,
        authorizer: Option<Arc<dyn ConnectionAuthorizer>>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen)
            .await
            .map_err(|err| AppError::Bind(format!("gateway cannot bind {listen}: {err}")))?;

        Ok(Self {
            listener,
            upstream,
            authorizer,
        })
    }

    /// Address actually bound (resolves port `0`).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawn the accept loop. Each client gets its own relay task.
    #[must_use]
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        let span = info_span!(
            "gateway",
            upstream = %self.upstream,
            auth = self.authorizer.is_some()
        );

        tokio::spawn(
            async move {
                info!(
                    listen = ?self.listener.local_addr().ok(),
                    "gateway listening"
                );
                loop {
                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!("gateway shutting down");
                            break;
                        }
                        accept_result = self.listener.accept() => {
                            match accept_result {
                                Ok((stream, peer)) => {
                                    let session = GatewaySession::open(peer);
                                    tokio::spawn(handle_connection(
                                        stream,
                                        session,
                                        self.upstream,
                                        self.authorizer.clone(),
                                    ));
                                }
                                Err(err) => {
                                    warn!(%err, "gateway accept failed");
                                }
                            }
                        }
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// Authorize (if configured) and relay one client connection.
async fn handle_connection(
    mut client: TcpStream,
    session: GatewaySession,
    upstream: SocketAddr,
    authorizer: Option<Arc<dyn ConnectionAuthorizer>>,
) {
    let span = info_span!("gateway_session", session_id = %session.id, peer = %session.peer);
    async move {
        let preamble = if let Some(authorizer) = authorizer {
            match authorizer.authorize(&mut client).await {
                Ok(AuthDecision::Forward { preamble }) => preamble,
                Ok(AuthDecision::Reject { response }) => {
                    debug!("client rejected by authorizer");
                    if let Err(err) = client.write_all(&response).await {
                        debug!(%err, "failed to write rejection");
                    }
                    let _ = client.shutdown().await;
                    return;
                }
                Err(err) => {
                    debug!(%err, "client dropped during authorization");
                    return;
                }
            }
        } else {
            Vec::new()
        };

        let mut upstream_stream = match TcpStream::connect(upstream).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(%err, "control port unreachable");
                return;
            }
        };

        match pipe(&mut client, &mut upstream_stream, &preamble).await {
            Ok(stats) => debug!(
                to_upstream = stats.to_upstream,
                to_client = stats.to_client,
                "gateway session closed"
            ),
            Err(err) => debug!(%err, "gateway session ended with error"),
        }
    }
    .instrument(span)
    .await;
}
