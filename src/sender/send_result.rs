use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::config::node::Node;
use crate::sender::message_sender::MessageSender;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SendFailure {
    #[error("no destination of the route is alive")]
    NoAliveDestination,
    #[error("no acknowledgement before the final timeout")]
    Exhausted,
    #[error("rejected by {0}, and there is no further destination")]
    Rejected(Node),
    #[error("cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SendResult {
    Acknowledged {
        responder: Node,
        /// time between the last transmission and the ACK's arrival
        rtt: Duration,
        /// time between the first transmission and the ACK's arrival
        elapsed: Duration,
    },
    /// a fire-and-forget message (ACK, NACK, HEARTBEAT) was handed to the transport
    Dispatched,
    Failed(SendFailure),
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, SendResult::Failed(_))
    }

    pub fn responder(&self) -> Option<&Node> {
        match self {
            SendResult::Acknowledged { responder, .. } => Some(responder),
            _ => None,
        }
    }
}

/// The caller's handle to an outgoing message. It resolves once the message's sender reaches a
///  terminal state.
pub struct SendHandle {
    sender: Arc<MessageSender>,
    receiver: oneshot::Receiver<SendResult>,
    resolved: Option<SendResult>,
}

impl SendHandle {
    pub(crate) fn new(sender: Arc<MessageSender>, receiver: oneshot::Receiver<SendResult>) -> SendHandle {
        SendHandle {
            sender,
            receiver,
            resolved: None,
        }
    }

    pub fn message_id(&self) -> Option<&str> {
        self.sender.message_id()
    }

    /// waits for the send's outcome
    pub async fn result(self) -> SendResult {
        if let Some(resolved) = self.resolved {
            return resolved;
        }
        self.receiver.await
            .unwrap_or(SendResult::Failed(SendFailure::Cancelled))
    }

    /// the send's outcome if it is already known, without waiting
    pub fn try_result(&mut self) -> Option<SendResult> {
        if self.resolved.is_none() {
            self.resolved = match self.receiver.try_recv() {
                Ok(result) => Some(result),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Closed) => Some(SendResult::Failed(SendFailure::Cancelled)),
            };
        }
        self.resolved.clone()
    }

    /// Stops the send if it is still in flight. Returns `true` if this stopped a pending
    ///  retransmission or failover. Cancelling while only the final timeout is pending stops the
    ///  send as well, but returns `false`.
    pub async fn cancel(&self) -> bool {
        self.sender.cancel().await
    }
}
