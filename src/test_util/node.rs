use crate::config::node::Node;

/// convenience function for test code: a [Node] on localhost, with a port derived from its name.
///  Nodes are identified by name, so the port does not matter for most tests.
pub fn test_node(name: &str) -> Node {
    let port = name.bytes()
        .fold(10_000u16, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u16) % 50_000 + 10_000);
    Node::new(name, "127.0.0.1", port)
}
