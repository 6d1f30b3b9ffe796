/// Cluster topology: writable nodes and how one is picked for a new
/// connection
pub mod directory;

use std::fmt;
use std::hash::{Hash, Hasher};

use rand::seq::SliceRandom;

/// One writable endpoint of the cluster.
///
/// Nodes are only ever constructed by the directory's refresh cycle (or from
/// the coordinator entry in the configuration); callers receive clones.
/// Identity is the host:port pair; credentials are carried along but do not
/// participate in equality.
#[derive(Debug, Clone)]
pub struct Node {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl Node {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Picks the node a new connection should target.
///
/// The default is uniform random choice, which doubles as the failover
/// mechanism: a bad node causes scattered failures until it drops out of the
/// directory on the next refresh. Smarter policies (health scoring,
/// least-connections) can be injected without touching the pool.
pub trait NodeSelector: Send + Sync {
    fn select<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node>;
}

/// Uniform random selection over the current node list
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSelector;

impl NodeSelector for RandomSelector {
    fn select<'a>(&self, nodes: &'a [Node]) -> Option<&'a Node> {
        nodes.choose(&mut rand::thread_rng())
    }
}
