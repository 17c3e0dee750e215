use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// A [Node] is a cluster member that can send and receive LwComm messages. Nodes are created
///  from static configuration and never change afterwards.
///
/// Identity is the node's name: equality and hashing ignore host and port.
#[derive(Clone)]
pub struct Node {
    pub name: String,
    pub host: String,
    pub port: u16,
}

impl Node {
    pub fn new(name: impl Into<String>, host: impl Into<String>, port: u16) -> Node {
        Node {
            name: name.into(),
            host: host.into(),
            port,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl Debug for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}@{}:{}]", self.name, self.host, self.port)
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashSet;
    use super::*;

    #[test]
    fn test_identity_is_name_only() {
        let a = Node::new("a", "127.0.0.1", 1000);
        let a_moved = Node::new("a", "10.0.0.1", 2000);
        let b = Node::new("b", "127.0.0.1", 1000);

        assert_eq!(a, a_moved);
        assert_ne!(a, b);

        let set: FxHashSet<Node> = [a, a_moved, b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_debug() {
        assert_eq!(format!("{:?}", Node::new("a", "localhost", 7000)), "[a@localhost:7000]");
        assert_eq!(format!("{}", Node::new("a", "localhost", 7000)), "a");
    }
}
