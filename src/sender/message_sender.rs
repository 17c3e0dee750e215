use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::node::Node;
use crate::message::codec;
use crate::message::message::{Message, MessageType};
use crate::sender::send_chain::{SendChain, SendChainElement};
use crate::sender::send_result::{SendFailure, SendResult};
use crate::sender::SenderContext;

struct SenderState {
    chain: SendChain,
    current: Option<SendChainElement>,
    /// incremented for every transmission - a timer only acts if this has not changed since it
    ///  was armed
    attempt: u64,
    timer: Option<JoinHandle<()>>,
    started: bool,
    /// false once a terminal outcome was reached
    active: bool,
    first_sent_at: Option<Instant>,
    last_sent_at: Option<Instant>,
    result: Option<oneshot::Sender<SendResult>>,
}

/// The retransmission state machine for a single outgoing message. It owns the message's send
///  chain and works through it, driven by timeouts, ACK and NACK:
///
/// * ACK: the send succeeded
/// * NACK: the current destination rejected the message, move on to the next destination (if any)
/// * timeout: move on to the next element of the chain (if any), which may be a retransmission to
///    the same destination or the first transmission to the next destination
///
/// ACK, NACK, timeouts and cancellation can race. They are serialized by a per-sender mutex,
///  and the `active` flag ensures that exactly one of them makes the terminal decision. Timer
///  cancellation is best effort: a timer that fires anyway finds the sender inactive (or finds
///  that another transmission happened in the meantime) and does nothing.
pub struct MessageSender {
    message: Message,
    context: Arc<SenderContext>,
    state: Mutex<SenderState>,
}

impl Debug for MessageSender {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MessageSender{{{:?} {:?}}}", self.message.message_type, self.message.id)
    }
}

impl MessageSender {
    pub fn new(message: Message, chain: SendChain, context: Arc<SenderContext>) -> (Arc<MessageSender>, oneshot::Receiver<SendResult>) {
        let (result_sender, result_receiver) = oneshot::channel();

        let sender = MessageSender {
            message,
            context,
            state: Mutex::new(SenderState {
                chain,
                current: None,
                attempt: 0,
                timer: None,
                started: false,
                active: true,
                first_sent_at: None,
                last_sent_at: None,
                result: Some(result_sender),
            }),
        };
        (Arc::new(sender), result_receiver)
    }

    pub fn message_id(&self) -> Option<&str> {
        self.message.id.as_deref()
    }

    /// Regular messages wait for ACK / NACK, everything else is fire-and-forget
    pub fn awaits_response(&self) -> bool {
        self.message.message_type == MessageType::Normal && self.message.id.is_some()
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.active
    }

    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.started {
            warn!("{:?} was started twice - ignoring", self);
            return;
        }
        state.started = true;

        match state.chain.next_element() {
            Some(element) => {
                state.current = Some(element);
                self.transmit_current(&mut state).await;
            }
            None => {
                debug!("{:?}: no alive destination", self);
                self.context.stats.on_timed_out();
                self.finish(&mut state, SendResult::Failed(SendFailure::NoAliveDestination));
            }
        }
    }

    pub async fn ack_arrived(&self, responder: &Node) {
        let mut state = self.state.lock().await;
        if !state.active {
            debug!("{:?}: ACK from {} after the send was finished - ignoring", self, responder);
            Self::cancel_timer(&mut state);
            self.context.registry.unregister(self);
            return;
        }

        let now = Instant::now();
        let rtt = state.last_sent_at.map(|t| now - t).unwrap_or_default();
        let elapsed = state.first_sent_at.map(|t| now - t).unwrap_or_default();
        debug!("{:?}: ACK from {} after {:?}", self, responder, rtt);

        self.context.stats.on_acknowledged(rtt);
        self.finish(&mut state, SendResult::Acknowledged {
            responder: responder.clone(),
            rtt,
            elapsed,
        });
    }

    /// A NACK means the current destination rejected the message, so retrying it is pointless:
    ///  all remaining elements for that destination are skipped.
    pub async fn nack_arrived(self: &Arc<Self>, from: &Node) {
        let mut state = self.state.lock().await;
        if !state.active {
            debug!("{:?}: NACK from {} after the send was finished - ignoring", self, from);
            return;
        }

        let Some(current) = state.current.clone() else {
            warn!("{:?}: NACK from {} before the first transmission - ignoring", self, from);
            return;
        };
        if &current.destination != from {
            debug!("{:?}: late NACK from {} while waiting for {} - ignoring", self, from, current.destination);
            return;
        }

        Self::cancel_timer(&mut state);

        match state.chain.next_element_skipping(from) {
            Some(next) => {
                debug!("{:?}: NACK from {}, trying {}", self, from, next.destination);
                state.current = Some(next);
                self.transmit_current(&mut state).await;
            }
            None => {
                info!("{:?}: NACK from {}, no further destination", self, from);
                self.context.stats.on_rejected();
                self.finish(&mut state, SendResult::Failed(SendFailure::Rejected(from.clone())));
            }
        }
    }

    /// Returns `true` if cancelling stopped a pending retransmission (or failover), `false` if the
    ///  send was finished already or only its final timeout was pending
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.lock().await;
        if !state.active {
            return false;
        }

        let timer_pending = state.timer.as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false);
        let stopped_retransmit = timer_pending && !state.chain.is_empty();

        debug!("{:?}: cancelled", self);
        self.context.stats.on_cancelled();
        self.finish(&mut state, SendResult::Failed(SendFailure::Cancelled));
        stopped_retransmit
    }

    /// Boxed to break the type cycle between transmitting (which arms a timer) and the timer
    ///  (which transmits)
    fn timer_fired(self: Arc<Self>, attempt: u64) -> Pin<Box<dyn Future<Output=()> + Send>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !state.active || state.attempt != attempt {
                trace!("{:?}: stale timer - ignoring", self);
                return;
            }

            // this is the timer's own task, so it must not be aborted
            state.timer = None;

            match state.chain.next_element() {
                Some(next) => {
                    trace!("{:?}: timeout, next transmission to {} (retransmit #{})", self, next.destination, next.retransmit_index);
                    state.current = Some(next);
                    self.transmit_current(&mut state).await;
                }
                None => {
                    info!("{:?}: final timeout", self);
                    self.context.stats.on_timed_out();
                    self.finish(&mut state, SendResult::Failed(SendFailure::Exhausted));
                }
            }
        })
    }

    async fn transmit_current(self: &Arc<Self>, state: &mut SenderState) {
        let Some(element) = state.current.clone() else {
            return;
        };

        let now = Instant::now();
        state.first_sent_at.get_or_insert(now);
        state.last_sent_at = Some(now);
        state.attempt += 1;
        self.context.stats.on_sent(self.message.message_type, element.failover, element.retransmit_index);

        if !state.active {
            debug!("{:?}: no longer active - skipping transmission to {}", self, element.destination);
            return;
        }

        let mut wire = self.message.clone();
        wire.retransmit_count = element.retransmit_index;
        wire.failover = element.failover;

        let send_result = match codec::serialize(&wire) {
            Ok(serialized) => self.context.transport.send_datagram(&element.destination, serialized.as_bytes()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &send_result {
            // a timer (if any) takes care of moving on
            warn!("{:?}: error sending to {}: {}", self, element.destination, e);
            self.context.stats.on_transport_error();
        }

        match element.timeout {
            Some(timeout) => {
                let attempt = state.attempt;
                let this = self.clone();
                state.timer = Some(tokio::spawn(async move {
                    time::sleep(timeout).await;
                    this.timer_fired(attempt).await;
                }));
            }
            None => {
                let result = match send_result {
                    Ok(()) => SendResult::Dispatched,
                    Err(e) => SendResult::Failed(SendFailure::Transport(e.to_string())),
                };
                self.finish(state, result);
            }
        }
    }

    fn cancel_timer(state: &mut SenderState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    /// terminal transition - the caller holds the lock and has checked that the sender is active
    fn finish(&self, state: &mut SenderState, result: SendResult) {
        state.active = false;
        Self::cancel_timer(state);

        match state.result.take() {
            Some(result_sender) => {
                // the caller may have dropped its handle
                let _ = result_sender.send(result);
            }
            None => warn!("{:?}: second terminal outcome {:?} - this is a bug", self, result),
        }

        self.context.registry.unregister(self);
    }
}
