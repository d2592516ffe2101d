//! Broadcast engine.
//!
//! A message is pushed onto the outbound queue of every session that is
//! registered when the snapshot is taken, the sender included. Pushing
//! never waits: a session whose bounded queue is full is evicted instead
//! of stalling delivery to everyone else.

use tracing::{debug, warn};

use crate::{
    message::Message,
    registry::Registry,
    session::{Delivery, EnqueueError, SessionId},
};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub evicted: Vec<SessionId>,
}

pub async fn fanout(registry: &Registry, origin: SessionId, message: Message) -> FanoutReport {
    let recipients = registry.snapshot_all().await;
    let mut report = FanoutReport::default();

    for session in &recipients {
        let delivery = Delivery {
            origin,
            message: message.clone(),
        };
        match session.enqueue(delivery) {
            Ok(()) => report.delivered += 1,
            Err(EnqueueError::Full) => {
                warn!(
                    session = session.id(),
                    user = session.username(),
                    "outbound queue full; disconnecting slow client"
                );
                session.close();
                report.evicted.push(session.id());
            }
            Err(EnqueueError::Closed) => {
                debug!(session = session.id(), "skipping session that is shutting down");
            }
        }
    }

    for id in &report.evicted {
        registry.remove(*id).await;
    }

    report
}
