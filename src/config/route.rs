use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;
use anyhow::{anyhow, bail};

use crate::config::node::Node;


#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DeliveryMode {
    /// random order among the alive destinations
    LoadBalance,
    /// declared order of destinations
    Failover,
    /// reserved - sending on a multicast route is rejected
    Multicast,
}

impl FromStr for DeliveryMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOADBALANCE" => Ok(DeliveryMode::LoadBalance),
            "FAILOVER" => Ok(DeliveryMode::Failover),
            "MULTICAST" => Ok(DeliveryMode::Multicast),
            other => Err(anyhow!("unknown delivery mode {:?}", other)),
        }
    }
}

/// Retransmit offsets in milliseconds, each measured from the *first* transmission to a given
///  destination. For `[200,500,1000]`, a message is sent at t=0, retransmitted at t=200ms and
///  t=500ms, and the destination is given up on at t=1000ms.
///
/// Offsets are positive and strictly increasing, so the deltas between them (which is what a
///  relative-delay timer needs) are always positive.
#[derive(Clone, Eq, PartialEq)]
pub struct RetransmitPattern {
    offsets_millis: Vec<u64>,
}

impl RetransmitPattern {
    pub fn new(offsets_millis: Vec<u64>) -> anyhow::Result<RetransmitPattern> {
        if offsets_millis.is_empty() {
            bail!("retransmit pattern must have at least one value");
        }

        let mut previous = 0;
        for &offset in &offsets_millis {
            if offset <= previous {
                bail!("retransmit pattern must be positive and strictly increasing: {:?}", offsets_millis);
            }
            previous = offset;
        }

        Ok(RetransmitPattern { offsets_millis })
    }

    pub fn offsets_millis(&self) -> &[u64] {
        &self.offsets_millis
    }

    pub fn len(&self) -> usize {
        self.offsets_millis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets_millis.is_empty()
    }

    /// The per-attempt timeouts as relative delays, i.e. `offset[i] - offset[i-1]` with
    ///  `offset[-1] = 0`
    pub fn deltas(&self) -> impl Iterator<Item=Duration> + '_ {
        let mut previous = 0;
        self.offsets_millis.iter()
            .map(move |&offset| {
                let delta = offset - previous;
                previous = offset;
                Duration::from_millis(delta)
            })
    }
}

impl Debug for RetransmitPattern {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.offsets_millis)
    }
}

impl FromStr for RetransmitPattern {
    type Err = anyhow::Error;

    /// parses the comma-separated configuration form, e.g. `"200,500,1000"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut offsets = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let offset = part.parse::<u64>()
                .map_err(|e| anyhow!("invalid retransmit offset {:?}: {}", part, e))?;
            offsets.push(offset);
        }
        RetransmitPattern::new(offsets)
    }
}


/// A [Route] is a named, static description of where messages go: which nodes may send on it,
///  the destinations in declared order, how destinations are picked and when to retransmit.
///
/// Identity is the route's name.
#[derive(Clone, Debug)]
pub struct Route {
    pub name: String,
    pub sources: Vec<Node>,
    pub destinations: Vec<Node>,
    pub mode: DeliveryMode,
    pub retransmit_pattern: RetransmitPattern,
    pub default_queue: Option<String>,
}

impl Route {
    pub fn new(name: impl Into<String>, sources: Vec<Node>, destinations: Vec<Node>, mode: DeliveryMode, retransmit_pattern: RetransmitPattern) -> Route {
        Route {
            name: name.into(),
            sources,
            destinations,
            mode,
            retransmit_pattern,
            default_queue: None,
        }
    }

    pub fn with_default_queue(mut self, queue: impl Into<String>) -> Route {
        self.default_queue = Some(queue.into());
        self
    }

    pub fn is_source(&self, node: &Node) -> bool {
        self.sources.contains(node)
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
