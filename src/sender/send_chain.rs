use std::collections::VecDeque;
use std::time::Duration;
use anyhow::{anyhow, bail};
use tracing::debug;

use crate::config::node::Node;
use crate::config::route::{DeliveryMode, Route};
use crate::liveness::NodeLiveness;
use crate::message::message::Message;
use crate::util::random::{shuffle, Random};

/// One UDP transmission attempt of an outgoing message
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SendChainElement {
    pub destination: Node,
    /// delay after this element's transmission before moving on to the next element. `None`
    ///  means no timer is armed, i.e. fire-and-forget.
    pub timeout: Option<Duration>,
    /// 0-based position in the current destination's retransmit sequence
    pub retransmit_index: u32,
    /// true for all elements targeting a destination other than the first one
    pub failover: bool,
}

/// The ordered sequence of transmission attempts for a single outgoing message. A chain is
///  built once when sending starts, and it is consumed front to back by the message's sender.
///
/// Destination order is fixed at build time: liveness changes while the message is in flight
///  do not affect it.
#[derive(Debug, Default, Clone)]
pub struct SendChain {
    elements: VecDeque<SendChainElement>,
}

impl SendChain {
    /// Builds the chain for a regular message on a route: every alive destination gets one element
    ///  per retransmit offset, destinations in declared order (FAILOVER) or in random order
    ///  (LOADBALANCE).
    ///
    /// An empty chain (no alive destinations) is not an error - the send fails without any
    ///  network activity. Sending from a node that is not a source of the route, and sending on a
    ///  MULTICAST route, are rejected.
    pub fn for_normal_send<R: Random>(local: &Node, route: &Route, liveness: &dyn NodeLiveness) -> anyhow::Result<SendChain> {
        if !route.is_source(local) {
            bail!("node {} is not a source of route {} - can not send on it", local, route.name);
        }

        let mut destinations = match route.mode {
            DeliveryMode::Multicast => bail!("delivery mode MULTICAST is not implemented (route {})", route.name),
            DeliveryMode::Failover | DeliveryMode::LoadBalance => {
                route.destinations.iter()
                    .filter(|d| liveness.is_alive(d))
                    .cloned()
                    .collect::<Vec<_>>()
            }
        };

        if route.mode == DeliveryMode::LoadBalance {
            shuffle::<R, _>(&mut destinations);
        }

        debug!("send chain for route {}: destinations {:?}", route.name, destinations);

        let mut elements = VecDeque::with_capacity(destinations.len() * route.retransmit_pattern.len());
        for (destination_index, destination) in destinations.into_iter().enumerate() {
            for (retransmit_index, timeout) in route.retransmit_pattern.deltas().enumerate() {
                elements.push_back(SendChainElement {
                    destination: destination.clone(),
                    timeout: Some(timeout),
                    retransmit_index: retransmit_index as u32,
                    failover: destination_index > 0,
                });
            }
        }

        Ok(SendChain { elements })
    }

    /// a single fire-and-forget element, addressed to the node the original message came from
    pub fn for_ack(original: &Message, nodes: &[Node]) -> anyhow::Result<SendChain> {
        let from = original.from.as_deref()
            .ok_or_else(|| anyhow!("message {:?} has no 'From' - can not respond to it", original.id))?;
        let recipient = nodes.iter()
            .find(|n| n.name == from)
            .ok_or_else(|| anyhow!("message {:?} is from unknown node {:?} - can not respond to it", original.id, from))?;

        Ok(Self::single_fire_and_forget(recipient.clone()))
    }

    pub fn for_heartbeat(target: &Node) -> SendChain {
        Self::single_fire_and_forget(target.clone())
    }

    fn single_fire_and_forget(destination: Node) -> SendChain {
        SendChain {
            elements: [SendChainElement {
                destination,
                timeout: None,
                retransmit_index: 0,
                failover: false,
            }].into(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// the next element, regardless of its destination
    pub fn next_element(&mut self) -> Option<SendChainElement> {
        self.elements.pop_front()
    }

    /// the next element for a destination other than `rejected_by`. All remaining elements for
    ///  `rejected_by` are dropped, so the chain never returns to it.
    pub fn next_element_skipping(&mut self, rejected_by: &Node) -> Option<SendChainElement> {
        self.elements.retain(|e| &e.destination != rejected_by);
        self.elements.pop_front()
    }

    pub fn elements(&self) -> impl Iterator<Item=&SendChainElement> {
        self.elements.iter()
    }
}
