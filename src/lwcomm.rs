use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::anyhow;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tokio::{select, time};
use tracing::{debug, info, trace, warn};

use crate::config::lwcomm_config::LwCommConfig;
use crate::config::node::Node;
use crate::liveness::heartbeat_map::heartbeat_partners;
use crate::liveness::heartbeat_tracker::HeartbeatTracker;
use crate::liveness::NodeLiveness;
use crate::message::codec;
use crate::message::message::{Message, MessageType};
use crate::sender::message_sender::MessageSender;
use crate::sender::send_chain::SendChain;
use crate::sender::send_result::SendHandle;
use crate::sender::{launch, SenderContext};
use crate::stats::{LwCommStats, StatsSnapshot};
use crate::transport::udp_transport::UdpTransport;
use crate::transport::{DatagramHandler, Transport};
use crate::util::random::{Random, RngRandom};

/// Optional per-message data for [LwComm::send]
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub group_id: Option<String>,
    /// overrides the route's default queue
    pub target_queue: Option<String>,
    pub tag: Option<String>,
}

/// Application-level receiver for regular messages, registered per target queue.
///
/// Returning `Ok` acknowledges the message to its sender, returning an error rejects it (NACK).
///  This is called on a receive worker, so it holds up one of a bounded number of workers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: &Message) -> anyhow::Result<()>;
}

/// The LwComm service: sending messages on routes with acknowledgement, retransmission and
///  failover, dispatching received messages, and exchanging heartbeats.
///
/// An instance is created explicitly and passed around as an `Arc`. It does nothing on its own
///  until [LwComm::run] is called, which runs the transport's receive loop and the heartbeat loop.
pub struct LwComm {
    config: Arc<LwCommConfig>,
    local_node: Node,
    context: Arc<SenderContext>,
    heartbeat_tracker: Arc<HeartbeatTracker>,
    liveness: Arc<dyn NodeLiveness>,
    listeners: RwLock<FxHashMap<String, Arc<dyn MessageListener>>>,
}

impl Debug for LwComm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LwComm{{{:?}}}", self.local_node)
    }
}

impl LwComm {
    /// binds a UDP socket for the local node and creates an instance on top of it
    pub async fn bind_udp(config: LwCommConfig) -> anyhow::Result<Arc<LwComm>> {
        config.validate()?;
        let transport = Arc::new(UdpTransport::new(&config).await?);
        LwComm::new(config, transport)
    }

    /// Node liveness is taken from heartbeats received by this instance
    pub fn new(config: LwCommConfig, transport: Arc<dyn Transport>) -> anyhow::Result<Arc<LwComm>> {
        Self::create(config, transport, None)
    }

    /// Node liveness is decided by an external mechanism. Received heartbeats are still tracked,
    ///  but they do not affect sending.
    pub fn with_liveness(config: LwCommConfig, transport: Arc<dyn Transport>, liveness: Arc<dyn NodeLiveness>) -> anyhow::Result<Arc<LwComm>> {
        Self::create(config, transport, Some(liveness))
    }

    fn create(config: LwCommConfig, transport: Arc<dyn Transport>, liveness: Option<Arc<dyn NodeLiveness>>) -> anyhow::Result<Arc<LwComm>> {
        config.validate()?;
        let local_node = config.local_node()?.clone();

        let partners = heartbeat_partners(&config.routes, &local_node);
        let heartbeat_tracker = Arc::new(HeartbeatTracker::new(partners, config.heartbeat_timeout));
        let liveness = liveness.unwrap_or_else(|| heartbeat_tracker.clone() as Arc<dyn NodeLiveness>);

        info!("starting LwComm as node {:?}", local_node);
        Ok(Arc::new(LwComm {
            config: Arc::new(config),
            local_node,
            context: Arc::new(SenderContext::new(transport, Arc::new(LwCommStats::default()))),
            heartbeat_tracker,
            liveness,
            listeners: Default::default(),
        }))
    }

    pub fn config(&self) -> &LwCommConfig {
        &self.config
    }

    pub fn local_node(&self) -> &Node {
        &self.local_node
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.context.stats.snapshot()
    }

    /// number of sent messages waiting for ACK or NACK
    pub fn num_in_flight(&self) -> usize {
        self.context.registry.len()
    }

    pub fn is_alive(&self, node: &Node) -> bool {
        self.liveness.is_alive(node)
    }

    /// liveness of the nodes this node exchanges heartbeats with
    pub fn heartbeat_liveness(&self) -> FxHashMap<Node, bool> {
        self.heartbeat_tracker.current_liveness()
    }

    pub async fn register_listener(&self, queue: impl Into<String>, listener: Arc<dyn MessageListener>) {
        let queue = queue.into();
        if self.listeners.write().await.insert(queue.clone(), listener).is_some() {
            warn!("replaced the listener for queue {:?}", queue);
        }
    }

    pub async fn deregister_listener(&self, queue: &str) {
        if self.listeners.write().await.remove(queue).is_none() {
            debug!("no listener registered for queue {:?}", queue);
        }
    }

    /// Sends a message on a route. Errors are returned for requests that can never succeed (unknown
    ///  route, this node is not a source of the route, unsupported delivery mode, a message that
    ///  can not be serialized). Everything else, including the case that no destination is alive,
    ///  is reported through the returned handle.
    pub async fn send(&self, route_name: &str, payload: impl Into<String>, options: SendOptions) -> anyhow::Result<SendHandle> {
        let route = self.config.route(route_name)
            .ok_or_else(|| anyhow!("unknown route {:?}", route_name))?;

        let chain = SendChain::for_normal_send::<RngRandom>(&self.local_node, route, self.liveness.as_ref())?;

        let message = Message::normal(RngRandom::alphanumeric_token(self.config.message_id_len), &self.local_node)
            .with_payload(payload)
            .with_target_queue(options.target_queue.or_else(|| route.default_queue.clone()))
            .with_target_route(Some(route.name.clone()))
            .with_group_id(options.group_id)
            .with_tag(options.tag);

        // no network activity for a message that can never be sent
        codec::serialize(&message)?;

        debug!("sending message {:?} on route {} ({} transmissions max)", message.id, route.name, chain.len());
        Ok(launch(&self.context, message, chain).await)
    }

    /// Runs the transport's receive loop and the heartbeat loop. This returns only if the
    ///  transport fails.
    pub async fn run(self: &Arc<Self>) -> anyhow::Result<()> {
        let handler: Arc<dyn DatagramHandler> = self.clone();
        select! {
            result = self.context.transport.recv_loop(handler) => result,
            _ = self.heartbeat_loop() => Ok(()),
        }
    }

    /// Cancels all messages that are still in flight
    pub async fn shutdown(&self) {
        let senders = self.context.registry.senders();
        info!("shutting down LwComm for {:?}, cancelling {} messages in flight", self.local_node, senders.len());
        for sender in senders {
            sender.cancel().await;
        }
    }

    async fn heartbeat_loop(&self) {
        let targets = heartbeat_partners(&self.config.routes, &self.local_node)
            .into_iter()
            .collect::<Vec<_>>();
        debug!("sending heartbeats to {:?}", targets);

        let mut ticks = time::interval(self.config.heartbeat_interval);
        loop {
            ticks.tick().await;
            self.send_heartbeats(&targets).await;
        }
    }

    async fn send_heartbeats(&self, targets: &[Node]) {
        for target in targets {
            launch(&self.context, Message::heartbeat(&self.local_node), SendChain::for_heartbeat(target)).await;
        }
    }

    async fn dispatch(&self, msg: Message, sender_addr: SocketAddr) {
        self.context.stats.on_received(msg.message_type);
        if !msg.is_valid() {
            warn!("dropping invalid message from {:?}", sender_addr);
            return;
        }

        let Some(from) = msg.from.as_deref().and_then(|name| self.config.node(name)) else {
            warn!("dropping {:?} message {:?} from unknown node {:?} ({:?})", msg.message_type, msg.id, msg.from, sender_addr);
            return;
        };
        self.heartbeat_tracker.on_sign_of_life(from);

        match msg.message_type {
            MessageType::Ack => {
                match self.lookup_sender(&msg) {
                    Some(sender) => sender.ack_arrived(from).await,
                    None => debug!("ACK for unknown message {:?} from {} - probably a late or duplicate ACK", msg.id, from),
                }
            }
            MessageType::Nack => {
                match self.lookup_sender(&msg) {
                    Some(sender) => sender.nack_arrived(from).await,
                    None => debug!("NACK for unknown message {:?} from {} - probably a late or duplicate NACK", msg.id, from),
                }
            }
            MessageType::Heartbeat => {
                trace!("heartbeat from {}", from);
            }
            MessageType::Normal => {
                self.on_normal_message(&msg).await;
            }
            MessageType::Invalid => {}
        }
    }

    fn lookup_sender(&self, msg: &Message) -> Option<Arc<MessageSender>> {
        msg.id.as_deref()
            .and_then(|id| self.context.registry.lookup(id))
    }

    async fn on_normal_message(&self, msg: &Message) {
        let listener = match &msg.target_queue {
            Some(queue) => self.listeners.read().await.get(queue).cloned(),
            None => None,
        };

        let accepted = match listener {
            Some(listener) => match listener.on_message(msg).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("message {:?} was rejected by its listener: {}", msg.id, e);
                    false
                }
            },
            None => {
                warn!("no listener for queue {:?} - rejecting message {:?}", msg.target_queue, msg.id);
                false
            }
        };

        let response = if accepted {
            Message::ack_for(msg, &self.local_node)
        }
        else {
            Message::nack_for(msg, &self.local_node)
        };

        match SendChain::for_ack(msg, &self.config.nodes) {
            Ok(chain) => {
                launch(&self.context, response, chain).await;
            }
            Err(e) => warn!("can not respond to message {:?}: {}", msg.id, e),
        }
    }
}

#[async_trait]
impl DatagramHandler for LwComm {
    async fn on_datagram_received(&self, buf: &[u8], sender: SocketAddr) {
        let msg = codec::parse(buf);
        self.dispatch(msg, sender).await;
    }
}
