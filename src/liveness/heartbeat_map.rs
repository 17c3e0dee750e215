use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::node::Node;
use crate::config::route::Route;

/// For every node that is a destination of some route, the set of nodes that are possible sources
///  of those routes. These are the nodes it requires heartbeats from.
pub fn heartbeat_map(routes: &[Route]) -> FxHashMap<Node, FxHashSet<Node>> {
    let mut result: FxHashMap<Node, FxHashSet<Node>> = FxHashMap::default();
    for route in routes {
        for destination in &route.destinations {
            result.entry(destination.clone())
                .or_default()
                .extend(route.sources.iter().cloned());
        }
    }
    result
}

/// The destinations of all routes that have `node` as a possible source, i.e. the nodes that
///  expect heartbeats from `node`.
pub fn nodes_expecting_heartbeat_from(routes: &[Route], node: &Node) -> FxHashSet<Node> {
    routes.iter()
        .filter(|r| r.is_source(node))
        .flat_map(|r| r.destinations.iter().cloned())
        .collect()
}

/// The nodes `node` exchanges heartbeats with in both directions: the sources of routes it is a
///  destination of, and the destinations of routes it is a source of. The latter is what makes
///  a sending node aware of its destinations' liveness.
pub fn heartbeat_partners(routes: &[Route], node: &Node) -> FxHashSet<Node> {
    let mut result = nodes_expecting_heartbeat_from(routes, node);
    if let Some(senders) = heartbeat_map(routes).remove(node) {
        result.extend(senders);
    }
    result.remove(node);
    result
}

#[cfg(test)]
mod tests {
    use crate::config::route::{DeliveryMode, RetransmitPattern};
    use super::*;

    fn node(name: &str) -> Node {
        Node::new(name, "localhost", 7000)
    }

    fn nodes(names: &[&str]) -> FxHashSet<Node> {
        names.iter().map(|n| node(n)).collect()
    }

    fn route(name: &str, sources: &[&str], destinations: &[&str]) -> Route {
        Route::new(
            name,
            sources.iter().map(|n| node(n)).collect(),
            destinations.iter().map(|n| node(n)).collect(),
            DeliveryMode::Failover,
            RetransmitPattern::new(vec![100]).unwrap(),
        )
    }

    fn routes() -> Vec<Route> {
        vec![
            route("r1", &["a", "b"], &["c", "d"]),
            route("r2", &["a"], &["e"]),
            route("r3", &["c"], &["a", "d"]),
        ]
    }

    #[test]
    fn test_heartbeat_map() {
        let map = heartbeat_map(&routes());

        assert_eq!(map.len(), 4);
        assert_eq!(map.get(&node("c")), Some(&nodes(&["a", "b"])));
        assert_eq!(map.get(&node("d")), Some(&nodes(&["a", "b", "c"])));
        assert_eq!(map.get(&node("e")), Some(&nodes(&["a"])));
        assert_eq!(map.get(&node("a")), Some(&nodes(&["c"])));
        assert_eq!(map.get(&node("b")), None);
    }

    #[test]
    fn test_nodes_expecting_heartbeat_from() {
        let routes = routes();
        assert_eq!(nodes_expecting_heartbeat_from(&routes, &node("a")), nodes(&["c", "d", "e"]));
        assert_eq!(nodes_expecting_heartbeat_from(&routes, &node("b")), nodes(&["c", "d"]));
        assert_eq!(nodes_expecting_heartbeat_from(&routes, &node("c")), nodes(&["a", "d"]));
        assert_eq!(nodes_expecting_heartbeat_from(&routes, &node("e")), nodes(&[]));
    }

    #[test]
    fn test_heartbeat_partners() {
        let routes = routes();
        assert_eq!(heartbeat_partners(&routes, &node("a")), nodes(&["c", "d", "e"]));
        assert_eq!(heartbeat_partners(&routes, &node("b")), nodes(&["c", "d"]));
        assert_eq!(heartbeat_partners(&routes, &node("c")), nodes(&["a", "b", "d"]));
        assert_eq!(heartbeat_partners(&routes, &node("e")), nodes(&["a"]));
        assert_eq!(heartbeat_partners(&routes, &node("unknown")), nodes(&[]));
    }

    #[test]
    fn test_heartbeat_partners_one_way_route() {
        let routes = vec![route("r", &["a"], &["b"])];
        assert_eq!(heartbeat_partners(&routes, &node("a")), nodes(&["b"]));
        assert_eq!(heartbeat_partners(&routes, &node("b")), nodes(&["a"]));
    }

    #[test]
    fn test_heartbeat_partners_excludes_self() {
        let routes = vec![route("r", &["a", "b"], &["a", "c"])];
        assert_eq!(heartbeat_partners(&routes, &node("a")), nodes(&["b", "c"]));
    }

    #[test]
    fn test_empty() {
        assert!(heartbeat_map(&[]).is_empty());
        assert!(nodes_expecting_heartbeat_from(&[], &node("a")).is_empty());
        assert!(heartbeat_partners(&[], &node("a")).is_empty());
    }
}
