use crate::config::node::Node;

pub mod heartbeat_map;
pub mod heartbeat_tracker;

/// Decides whether a node is currently considered alive. Send chains sample this once when they
///  are built.
///
/// Any `Fn(&Node) -> bool` is a [NodeLiveness], which is convenient for testing.
pub trait NodeLiveness: Send + Sync {
    fn is_alive(&self, node: &Node) -> bool;
}

impl <F: Fn(&Node) -> bool + Send + Sync> NodeLiveness for F {
    fn is_alive(&self, node: &Node) -> bool {
        self(node)
    }
}
