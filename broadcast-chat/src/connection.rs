//! Per-connection orchestration.
//!
//! Drives one connection through `Connecting -> Authenticating -> Active
//! -> Closing -> Closed`, pairing an ingress loop on the current task
//! with an egress task spawned for the session.

use std::{net::SocketAddr, sync::Arc};

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    config::ServerConfig,
    egress,
    error::SessionError,
    ingress::{self, IngressExit},
    message::{ServerFrame, write_message},
    registry::Registry,
    session::{self, ConnectionState},
};

/// Everything a connection needs from the server that accepted it.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    pub registry: Registry,
    pub config: Arc<ServerConfig>,
    pub shutdown: CancellationToken,
}

impl ConnectionContext {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            registry: Registry::new(),
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}

pub async fn serve<R, W>(
    mut reader: R,
    mut writer: W,
    peer: Option<SocketAddr>,
    ctx: ConnectionContext,
) -> Result<IngressExit, SessionError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let ConnectionContext {
        registry,
        config,
        shutdown,
    } = ctx;
    let state = ConnectionState::Connecting.advance(ConnectionState::Authenticating);

    let username =
        match ingress::authenticate(&mut reader, &config.tokens, config.idle_timeout).await {
            Ok(username) => username,
            Err(err) => {
                if let SessionError::PermissionDenied { username } = &err {
                    warn!(?peer, user = %username, "access denied");
                    reject(&mut writer, "Invalid token").await;
                }
                let state = state.advance(ConnectionState::Closed);
                debug!(?peer, ?state, error = %err, "connection finished before a session existed");
                return Err(err);
            }
        };

    let (session, queue) = session::open(
        registry.next_id(),
        &username,
        config.queue_capacity,
        &shutdown,
    );
    registry.add(session.clone()).await;
    let state = state.advance(ConnectionState::Active);
    info!(?peer, session = session.id(), user = %username, "user connected");

    let egress = tokio::spawn(egress::run(
        queue,
        writer,
        session.clone(),
        registry.clone(),
        config.echo,
    ));

    let ingress_result = ingress::run(&mut reader, &session, &registry, config.idle_timeout).await;
    let state = state.advance(ConnectionState::Closing);

    registry.remove(session.id()).await;
    session.close();

    let egress_result = match egress.await {
        Ok(result) => result,
        Err(err) => {
            warn!(session = session.id(), error = ?err, "egress task failed");
            Ok(())
        }
    };

    match &ingress_result {
        Ok(exit) => info!(
            ?peer,
            session = session.id(),
            user = %username,
            reason = ?exit,
            "user disconnected"
        ),
        Err(err) => info!(
            ?peer,
            session = session.id(),
            user = %username,
            error = %err,
            "user disconnected"
        ),
    }
    let state = state.advance(ConnectionState::Closed);
    debug!(?peer, session = session.id(), ?state, "connection finished");

    let exit = ingress_result?;
    egress_result?;
    Ok(exit)
}

async fn reject<W>(writer: &mut W, reason: &str)
where
    W: AsyncWrite + Unpin,
{
    let frame = ServerFrame::PermissionDenied {
        reason: reason.to_string(),
    };
    if let Err(err) = write_message(writer, &frame).await {
        debug!(?err, "failed to send permission denied");
    }
    if let Err(err) = writer.shutdown().await {
        debug!(?err, "failed to close rejected connection");
    }
}
