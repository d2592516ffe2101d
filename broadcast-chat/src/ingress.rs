//! Reading side of a connection: credentials first, then chat messages.

use std::time::Duration;

use tokio::{io::AsyncBufRead, select, time::timeout};
use tracing::debug;

use crate::{
    auth::TokenSet,
    error::SessionError,
    fanout::fanout,
    message::{Message, read_message},
    registry::Registry,
    session::SessionHandle,
};

/// How the read loop of an active session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngressExit {
    PeerClosed,
    Quit,
    Cancelled,
}

/// Reads the credentials frame and returns the claimed username when the token is valid.
pub async fn authenticate<R>(
    reader: &mut R,
    tokens: &TokenSet,
    idle_timeout: Option<Duration>,
) -> Result<String, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let credentials = next_message(reader, idle_timeout)
        .await?
        .ok_or(SessionError::ClosedBeforeAuth)?;

    if !tokens.contains(&credentials.text) {
        return Err(SessionError::PermissionDenied {
            username: credentials.sender,
        });
    }

    Ok(credentials.sender)
}

/// Feeds every inbound message to fan-out until the peer leaves or the session is closed.
///
/// The sender field is overwritten with the session's authenticated
/// username so a client cannot speak under another name.
pub async fn run<R>(
    reader: &mut R,
    session: &SessionHandle,
    registry: &Registry,
    idle_timeout: Option<Duration>,
) -> Result<IngressExit, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let inbound = select! {
            biased;
            _ = session.closed() => return Ok(IngressExit::Cancelled),
            inbound = next_message(reader, idle_timeout) => inbound?,
        };

        let Some(inbound) = inbound else {
            return Ok(IngressExit::PeerClosed);
        };

        let message = Message::new(session.username(), inbound.text);
        let quit = message.is_quit();
        let report = fanout(registry, session.id(), message).await;
        debug!(
            session = session.id(),
            delivered = report.delivered,
            evicted = report.evicted.len(),
            "fanned out message"
        );

        if quit {
            return Ok(IngressExit::Quit);
        }
    }
}

async fn next_message<R>(
    reader: &mut R,
    idle_timeout: Option<Duration>,
) -> Result<Option<Message>, SessionError>
where
    R: AsyncBufRead + Unpin,
{
    let read = read_message::<_, Message>(reader);
    let message = match idle_timeout {
        Some(limit) => timeout(limit, read)
            .await
            .map_err(|_| SessionError::IdleTimeout(limit))??,
        None => read.await?,
    };
    Ok(message)
}
