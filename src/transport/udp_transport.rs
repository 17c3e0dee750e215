use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::{anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use rustc_hash::FxHashMap;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::Semaphore;
use tracing::{debug, error, trace};

use crate::config::lwcomm_config::LwCommConfig;
use crate::config::node::Node;
use crate::transport::{DatagramHandler, Transport};

pub struct UdpTransport {
    socket: UdpSocket,
    node_addrs: FxHashMap<Node, SocketAddr>,
    max_datagram_size: usize,
    /// limits the number of datagrams that are processed concurrently
    receive_permits: Arc<Semaphore>,
}

impl Debug for UdpTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UdpTransport{{{:?}}}", self.socket.local_addr().ok())
    }
}

impl UdpTransport {
    /// Binds the local node's UDP port and resolves all configured nodes' addresses. Resolution
    ///  happens only here, so a node whose address changes requires a restart.
    pub async fn new(config: &LwCommConfig) -> anyhow::Result<UdpTransport> {
        let local = config.local_node()?;
        let socket = UdpSocket::bind((local.host.as_str(), local.port)).await
            .map_err(|e| anyhow!("error binding UDP socket for {:?}: {}", local, e))?;

        let mut node_addrs = FxHashMap::default();
        for node in &config.nodes {
            let addr = lookup_host((node.host.as_str(), node.port)).await?
                .next()
                .ok_or_else(|| anyhow!("could not resolve address of node {:?}", node))?;
            debug!("node {} resolved to {:?}", node, addr);
            node_addrs.insert(node.clone(), addr);
        }

        Ok(UdpTransport {
            socket,
            node_addrs,
            max_datagram_size: config.max_datagram_size,
            receive_permits: Arc::new(Semaphore::new(config.receive_worker_count)),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_datagram(&self, to: &Node, buf: &[u8]) -> anyhow::Result<()> {
        if buf.len() > self.max_datagram_size {
            bail!("datagram of {} bytes exceeds the maximum of {} bytes", buf.len(), self.max_datagram_size);
        }
        let addr = self.node_addrs.get(to)
            .ok_or_else(|| anyhow!("unknown node {:?}", to))?;

        trace!("sending {} bytes to {} at {:?}", buf.len(), to, addr);
        self.socket.send_to(buf, *addr).await?;
        Ok(())
    }

    async fn recv_loop(&self, handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.max_datagram_size];
        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((n, sender)) => {
                    trace!("received datagram from {:?}, len {}", sender, n);
                    let datagram = Bytes::copy_from_slice(&buf[..n]);

                    let permit = self.receive_permits.clone().acquire_owned().await?;
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler.on_datagram_received(&datagram, sender).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("error receiving datagram: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use super::*;

    struct ChannelHandler(mpsc::UnboundedSender<(Vec<u8>, SocketAddr)>);

    #[async_trait]
    impl DatagramHandler for ChannelHandler {
        async fn on_datagram_received(&self, buf: &[u8], sender: SocketAddr) {
            self.0.send((buf.to_vec(), sender)).ok();
        }
    }

    fn config(local: &str, port_a: u16, port_b: u16) -> LwCommConfig {
        LwCommConfig::new(local, vec![
            Node::new("a", "127.0.0.1", port_a),
            Node::new("b", "127.0.0.1", port_b),
        ], vec![])
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        // bind to ephemeral ports first to find free ones
        let probe_a = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let probe_b = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port_a = probe_a.local_addr().unwrap().port();
        let port_b = probe_b.local_addr().unwrap().port();
        drop(probe_a);
        drop(probe_b);

        let transport_a = UdpTransport::new(&config("a", port_a, port_b)).await.unwrap();
        let transport_b = Arc::new(UdpTransport::new(&config("b", port_a, port_b)).await.unwrap());

        let (send, mut recv) = mpsc::unbounded_channel();
        let handler = Arc::new(ChannelHandler(send));
        let b = transport_b.clone();
        let recv_loop = tokio::spawn(async move { b.recv_loop(handler).await });

        transport_a.send_datagram(&Node::new("b", "127.0.0.1", port_b), b"hello").await.unwrap();

        let (data, sender) = timeout(Duration::from_secs(5), recv.recv()).await.unwrap().unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(sender.port(), port_a);

        recv_loop.abort();
    }

    #[tokio::test]
    async fn test_send_rejects_unknown_node_and_oversized() {
        let mut config = config("a", 0, 0);
        config.max_datagram_size = 4;
        let transport = UdpTransport::new(&config).await.unwrap();

        assert!(transport.send_datagram(&Node::new("x", "127.0.0.1", 1), b"abc").await.is_err());
        assert!(transport.send_datagram(&Node::new("b", "127.0.0.1", 0), b"abcde").await.is_err());
    }
}
