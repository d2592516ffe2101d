use std::{future::Future, net::SocketAddr};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{
    config::ServerConfig,
    connection::{self, ConnectionContext},
    error::{ConfigError, SessionError},
    registry::Registry,
};

pub struct Server {
    listener: TcpListener,
    ctx: ConnectionContext,
}

impl Server {
    pub fn new(listener: TcpListener, config: ServerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            listener,
            ctx: ConnectionContext::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle onto the live session set, for observing the server from outside.
    pub fn registry(&self) -> Registry {
        self.ctx.registry.clone()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, ctx } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&ctx).await;
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &ctx);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

async fn handle_shutdown(ctx: &ConnectionContext) {
    let active = ctx.registry.len().await;
    info!(active, "server shutting down");
    ctx.shutdown.cancel();
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, ctx: &ConnectionContext) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, ctx),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, ctx: &ConnectionContext) {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        match connection::serve(BufReader::new(reader), writer, Some(peer), ctx).await {
            Ok(_) | Err(SessionError::PermissionDenied { .. }) => {}
            Err(err) => warn!(peer = %peer, error = %err, "client connection closed with error"),
        }
    });
}
