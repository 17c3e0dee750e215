pub mod udp_transport;

use std::net::SocketAddr;
use std::sync::Arc;
use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

use crate::config::node::Node;

/// The datagram transport underneath LwComm: it sends raw bytes to a node, and it delivers raw
///  received datagrams to a [DatagramHandler]. Reliability (ack, retransmit, failover) is handled
///  above this abstraction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fire-and-forget: success means the datagram was handed to the network, not that it arrived
    async fn send_datagram(&self, to: &Node, buf: &[u8]) -> anyhow::Result<()>;

    /// Runs until the transport fails irrecoverably. Errors receiving individual datagrams are
    ///  logged and do not end the loop.
    async fn recv_loop(&self, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()>;
}

/// This trait decouples the transport from the handling of a datagram once it is received.
///
/// It is passed around as an `Arc<dyn ...>` to minimize dependencies of [Transport] implementations.
#[async_trait]
pub trait DatagramHandler: Send + Sync {
    async fn on_datagram_received(&self, buf: &[u8], sender: SocketAddr);
}
