use std::time::Duration;
use anyhow::{anyhow, bail};
use rustc_hash::FxHashSet;

use crate::config::node::Node;
use crate::config::route::Route;

#[derive(Debug, Clone)]
pub struct LwCommConfig {
    /// name of the node this process runs as - it must be one of `nodes`
    pub local_node: String,
    pub nodes: Vec<Node>,
    pub routes: Vec<Route>,

    pub heartbeat_interval: Duration,
    /// a node is considered dead if no heartbeat arrived from it for this long
    pub heartbeat_timeout: Duration,

    /// upper bound for the number of received datagrams that are processed concurrently
    pub receive_worker_count: usize,
    pub max_datagram_size: usize,
    pub message_id_len: usize,
}

impl LwCommConfig {
    pub fn new(local_node: impl Into<String>, nodes: Vec<Node>, routes: Vec<Route>) -> LwCommConfig {
        LwCommConfig {
            local_node: local_node.into(),
            nodes,
            routes,
            heartbeat_interval: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(3),
            receive_worker_count: 16,
            max_datagram_size: 65507,
            message_id_len: 12,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut node_names = FxHashSet::default();
        for node in &self.nodes {
            if node.name.is_empty() || node.name.contains(char::is_whitespace) {
                bail!("invalid node name {:?}", node.name);
            }
            if !node_names.insert(node.name.as_str()) {
                bail!("duplicate node {:?}", node.name);
            }
        }
        if !node_names.contains(self.local_node.as_str()) {
            bail!("local node {:?} is not a configured node", self.local_node);
        }

        let mut route_names = FxHashSet::default();
        for route in &self.routes {
            if !route_names.insert(route.name.as_str()) {
                bail!("duplicate route {:?}", route.name);
            }

            for node in route.sources.iter().chain(route.destinations.iter()) {
                if !node_names.contains(node.name.as_str()) {
                    bail!("route {:?} refers to unknown node {:?}", route.name, node.name);
                }
            }

            let mut destinations = FxHashSet::default();
            for node in &route.destinations {
                if !destinations.insert(node) {
                    bail!("route {:?} has duplicate destination {:?}", route.name, node.name);
                }
            }
        }

        if self.heartbeat_interval.is_zero() {
            bail!("heartbeat interval must be positive");
        }
        if self.heartbeat_timeout <= self.heartbeat_interval {
            bail!("heartbeat timeout must be longer than the heartbeat interval");
        }
        if self.receive_worker_count == 0 {
            bail!("receive worker count must be positive");
        }
        if self.message_id_len == 0 {
            bail!("message id length must be positive");
        }

        Ok(())
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter()
            .find(|n| n.name == name)
    }

    pub fn route(&self, name: &str) -> Option<&Route> {
        self.routes.iter()
            .find(|r| r.name == name)
    }

    pub fn local_node(&self) -> anyhow::Result<&Node> {
        self.node(&self.local_node)
            .ok_or_else(|| anyhow!("local node {:?} is not a configured node", self.local_node))
    }
}
