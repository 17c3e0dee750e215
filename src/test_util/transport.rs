use std::sync::Arc;
use anyhow::bail;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::node::Node;
use crate::transport::{DatagramHandler, Transport};

/// A [Transport] that records every datagram instead of sending it. Sending can be switched to
///  fail for testing error handling, and failed sends are not recorded.
#[derive(Default)]
pub struct TrackingMockTransport {
    sent: RwLock<Vec<(Node, String)>>,
    fail_sends: RwLock<bool>,
}

impl TrackingMockTransport {
    pub fn new() -> TrackingMockTransport {
        Default::default()
    }

    pub async fn fail_sends(&self, fail: bool) {
        *self.fail_sends.write().await = fail;
    }

    pub async fn sent(&self) -> Vec<(Node, String)> {
        self.sent.read().await.clone()
    }

    /// removes and returns all datagrams recorded so far
    pub async fn take_sent(&self) -> Vec<(Node, String)> {
        std::mem::take(&mut *self.sent.write().await)
    }

    pub async fn assert_sent_to(&self, expected: &[&Node]) {
        let actual = self.sent.read().await
            .iter()
            .map(|(to, _)| to.clone())
            .collect::<Vec<_>>();
        let expected = expected.iter()
            .map(|&n| n.clone())
            .collect::<Vec<_>>();
        assert_eq!(actual, expected);
    }
}

#[async_trait]
impl Transport for TrackingMockTransport {
    async fn send_datagram(&self, to: &Node, buf: &[u8]) -> anyhow::Result<()> {
        if *self.fail_sends.read().await {
            bail!("simulated send failure");
        }
        let text = String::from_utf8_lossy(buf).into_owned();
        self.sent.write().await.push((to.clone(), text));
        Ok(())
    }

    async fn recv_loop(&self, _handler: Arc<dyn DatagramHandler>) -> anyhow::Result<()> {
        std::future::pending().await
    }
}
