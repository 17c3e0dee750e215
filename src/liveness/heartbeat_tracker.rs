use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::node::Node;
use crate::liveness::NodeLiveness;

/// Liveness table for this node's heartbeat partners: a tracked node is alive while the most
///  recent sign of life from it is younger than a fixed timeout. Nodes that are not tracked
///  (i.e. there is no heartbeat relationship with them) are reported alive.
///
/// Tracking starts at construction, giving every node one full timeout for its first heartbeat.
pub struct HeartbeatTracker {
    timeout: Duration,
    last_seen: RwLock<FxHashMap<Node, Instant>>,
}

impl HeartbeatTracker {
    pub fn new(tracked_nodes: impl IntoIterator<Item=Node>, timeout: Duration) -> HeartbeatTracker {
        let now = Instant::now();
        let last_seen = tracked_nodes.into_iter()
            .map(|n| (n, now))
            .collect();

        HeartbeatTracker {
            timeout,
            last_seen: RwLock::new(last_seen),
        }
    }

    fn is_fresh(&self, last_seen: Instant) -> bool {
        last_seen.elapsed() < self.timeout
    }

    /// Called for every message received from `from`, heartbeat or otherwise - any sign of life
    ///  counts
    pub fn on_sign_of_life(&self, from: &Node) {
        let mut last_seen = self.last_seen.write()
            .unwrap_or_else(PoisonError::into_inner);

        match last_seen.get_mut(from) {
            Some(timestamp) => {
                if !self.is_fresh(*timestamp) {
                    info!("node {} is alive again", from);
                }
                *timestamp = Instant::now();
            }
            None => debug!("sign of life from untracked node {}", from),
        }
    }

    pub fn current_liveness(&self) -> FxHashMap<Node, bool> {
        self.last_seen.read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(node, &timestamp)| (node.clone(), self.is_fresh(timestamp)))
            .collect()
    }
}

impl NodeLiveness for HeartbeatTracker {
    fn is_alive(&self, node: &Node) -> bool {
        self.last_seen.read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node)
            .map(|&timestamp| self.is_fresh(timestamp))
            .unwrap_or(true)
    }
}
