//! Server-side state for one authenticated connection.
//!
//! A session is split in two on creation. The [`SessionHandle`] is the
//! cloneable half stored in the registry and used by fan-out to enqueue
//! deliveries. The [`OutboundQueue`] is the receiving half, owned by the
//! connection's egress task. Both share a cancellation token so that
//! either handler can stop its partner.

use std::sync::Arc;

use thiserror::Error;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::message::Message;

pub type SessionId = u64;

/// A queued message together with the session it was received from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub origin: SessionId,
    pub message: Message,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("outbound queue is full")]
    Full,
    #[error("outbound queue is closed")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    username: Arc<str>,
    outbound: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Pushes without waiting; a full queue is reported instead of blocking fan-out.
    pub fn enqueue(&self, delivery: Delivery) -> Result<(), EnqueueError> {
        if self.cancel.is_cancelled() {
            return Err(EnqueueError::Closed);
        }
        self.outbound.try_send(delivery).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }

    /// Signals both handlers of this session to stop. Safe to call repeatedly.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn closed(&self) {
        self.cancel.cancelled().await
    }
}

#[derive(Debug)]
pub struct OutboundQueue {
    receiver: mpsc::Receiver<Delivery>,
    cancel: CancellationToken,
}

impl OutboundQueue {
    /// Waits for the next delivery. Returns `None` once the session is closed.
    pub async fn next(&mut self) -> Option<Delivery> {
        select! {
            biased;
            _ = self.cancel.cancelled() => None,
            delivery = self.receiver.recv() => delivery,
        }
    }
}

/// Creates the two halves of a session.
///
/// The session's token is a child of `parent`, so cancelling the parent
/// (server shutdown) closes every session opened from it.
pub fn open(
    id: SessionId,
    username: &str,
    capacity: usize,
    parent: &CancellationToken,
) -> (SessionHandle, OutboundQueue) {
    let (outbound, receiver) = mpsc::channel(capacity);
    let cancel = parent.child_token();
    let handle = SessionHandle {
        id,
        username: Arc::from(username),
        outbound,
        cancel: cancel.clone(),
    };
    (handle, OutboundQueue { receiver, cancel })
}

/// Lifecycle of a single client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Active,
    Closing,
    Closed,
}

impl ConnectionState {
    pub fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Authenticating, Active)
                | (Authenticating, Closed)
                | (Active, Closing)
                | (Closing, Closed)
        )
    }

    #[must_use]
    pub fn advance(self, next: ConnectionState) -> ConnectionState {
        debug_assert!(
            self.can_advance_to(next),
            "illegal connection transition {self:?} -> {next:?}"
        );
        next
    }
}
