//! Writing side of a connection: drains the session's outbound queue to the peer.

use std::time::Duration;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    select,
    time::timeout,
};
use tracing::debug;

use crate::{
    config::EchoPolicy,
    error::SessionError,
    message::{ServerFrame, write_message},
    registry::Registry,
    session::{OutboundQueue, SessionHandle},
};

/// Upper bound on the final writer shutdown, so a peer that stopped reading
/// cannot keep a closed session alive.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Runs until the session is closed or a write fails.
///
/// Writes race the session's close signal: a peer that stops reading
/// blocks the write, and eviction or server shutdown must still end
/// this task. A failed write means the peer is gone, so the session is
/// deregistered and closed here to wake the paired ingress.
pub async fn run<W>(
    mut queue: OutboundQueue,
    mut writer: W,
    session: SessionHandle,
    registry: Registry,
    echo: EchoPolicy,
) -> Result<(), SessionError>
where
    W: AsyncWrite + Unpin,
{
    let mut result = Ok(());

    while let Some(delivery) = queue.next().await {
        if echo == EchoPolicy::ExceptSender && delivery.origin == session.id() {
            continue;
        }

        let frame = ServerFrame::from(delivery.message);
        let written = select! {
            biased;
            _ = session.closed() => break,
            written = write_message(&mut writer, &frame) => written,
        };
        if let Err(err) = written {
            debug!(session = session.id(), ?err, "failed to deliver message to client");
            registry.remove(session.id()).await;
            session.close();
            result = Err(SessionError::Transport(err));
            break;
        }
    }

    match timeout(SHUTDOWN_GRACE, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(session = session.id(), ?err, "failed to shut down client writer"),
        Err(_) => debug!(session = session.id(), "client writer shutdown timed out"),
    }

    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{io::BufReader, time::timeout};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        fanout::fanout,
        message::{Message, read_message},
        session,
    };

    #[tokio::test]
    async fn writes_queued_messages_in_order() {
        let registry = Registry::new();
        let root = CancellationToken::new();
        let (alice, queue) = session::open(registry.next_id(), "alice", 8, &root);
        registry.add(alice.clone()).await;

        let (client, server) = tokio::io::duplex(4096);
        let egress = tokio::spawn(run(queue, server, alice.clone(), registry.clone(), EchoPolicy::All));

        fanout(&registry, 99, Message::new("bob", "first")).await;
        fanout(&registry, 99, Message::new("bob", "second")).await;

        let mut reader = BufReader::new(client);
        for text in ["first", "second"] {
            let frame = timeout(Duration::from_secs(1), read_message::<_, ServerFrame>(&mut reader))
                .await
                .expect("frame in time")
                .expect("read frame")
                .expect("frame present");
            assert_eq!(
                frame,
                ServerFrame::Chat {
                    sender: "bob".into(),
                    text: text.into()
                }
            );
        }

        alice.close();
        egress.await.expect("join egress").expect("egress result");

        let eof = read_message::<_, ServerFrame>(&mut reader)
            .await
            .expect("read after close");
        assert!(eof.is_none(), "writer is shut down once the session closes");
    }

    #[tokio::test]
    async fn except_sender_drops_own_messages() {
        let registry = Registry::new();
        let root = CancellationToken::new();
        let (alice, queue) = session::open(registry.next_id(), "alice", 8, &root);
        registry.add(alice.clone()).await;

        let (client, server) = tokio::io::duplex(4096);
        let egress = tokio::spawn(run(
            queue,
            server,
            alice.clone(),
            registry.clone(),
            EchoPolicy::ExceptSender,
        ));

        fanout(&registry, alice.id(), Message::new("alice", "mine")).await;
        fanout(&registry, 42, Message::new("bob", "theirs")).await;

        let mut reader = BufReader::new(client);
        let frame = timeout(Duration::from_secs(1), read_message::<_, ServerFrame>(&mut reader))
            .await
            .expect("frame in time")
            .expect("read frame")
            .expect("frame present");
        assert_eq!(
            frame,
            ServerFrame::Chat {
                sender: "bob".into(),
                text: "theirs".into()
            }
        );

        alice.close();
        egress.await.expect("join egress").expect("egress result");
    }

    #[tokio::test]
    async fn close_interrupts_a_blocked_write() {
        let registry = Registry::new();
        let root = CancellationToken::new();
        let (alice, queue) = session::open(registry.next_id(), "alice", 8, &root);
        registry.add(alice.clone()).await;

        // The peer never reads, so a frame larger than the pipe blocks the write.
        let (_client, server) = tokio::io::duplex(16);
        let egress = tokio::spawn(run(queue, server, alice.clone(), registry.clone(), EchoPolicy::All));
        fanout(&registry, 7, Message::new("bob", "x".repeat(256))).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!egress.is_finished());

        alice.close();
        let result = timeout(Duration::from_secs(2), egress)
            .await
            .expect("egress exits after close")
            .expect("join egress");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn write_failure_deregisters_and_closes_session() {
        let registry = Registry::new();
        let root = CancellationToken::new();
        let (alice, queue) = session::open(registry.next_id(), "alice", 8, &root);
        registry.add(alice.clone()).await;

        let (client, server) = tokio::io::duplex(64);
        drop(client);

        let egress = tokio::spawn(run(queue, server, alice.clone(), registry.clone(), EchoPolicy::All));
        fanout(&registry, 7, Message::new("bob", "into the void")).await;

        let result = timeout(Duration::from_secs(1), egress)
            .await
            .expect("egress exits")
            .expect("join egress");
        assert!(matches!(result, Err(SessionError::Transport(_))));
        assert!(alice.is_closed());
        assert!(!registry.contains(alice.id()).await);
    }
}
