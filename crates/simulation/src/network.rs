//! Simulated validator network.

use std::collections::HashSet;

use glacia_consensus::test_utils::{genesis_id, TestBlock, GENESIS_HEIGHT};
use glacia_consensus::{ConsensusError, Decidable, Parameters, Topological};
use glacia_types::{Bag, BlockId, Status};
use prometheus::Registry;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

/// Configuration for a simulated network.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Consensus parameters shared by every node.
    pub params: Parameters,
    /// Number of blocks in the shared tree.
    pub num_blocks: usize,
    /// Whether each node issues the shared blocks in its own random
    /// (dependency-respecting) order, giving nodes divergent initial
    /// preferences.
    pub shuffle_issue_order: bool,
}

/// Identity and linkage of one shared block.
#[derive(Debug, Clone, Copy)]
struct BlockSpec {
    id: BlockId,
    parent: BlockId,
    height: u64,
}

struct Node {
    engine: Topological<TestBlock>,
    /// This node's own block handles, in spec order.
    blocks: Vec<TestBlock>,
}

/// A set of independent consensus instances polled against each other.
pub struct Network {
    config: NetworkConfig,
    rng: ChaCha8Rng,
    specs: Vec<BlockSpec>,
    nodes: Vec<Node>,
}

impl Network {
    /// Create a network with a seeded random block tree and no nodes.
    pub fn new(config: NetworkConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let specs = Self::random_tree(&mut rng, config.num_blocks);
        Self {
            config,
            rng,
            specs,
            nodes: Vec::new(),
        }
    }

    /// Generate a random block tree: every block picks a random parent
    /// among the blocks generated before it, or the genesis anchor.
    fn random_tree(rng: &mut ChaCha8Rng, num_blocks: usize) -> Vec<BlockSpec> {
        let mut specs: Vec<BlockSpec> = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            let pick = rng.gen_range(0..=specs.len());
            let (parent, parent_height) = if pick == 0 {
                (genesis_id(), GENESIS_HEIGHT)
            } else {
                let parent = specs[pick - 1];
                (parent.id, parent.height)
            };
            specs.push(BlockSpec {
                id: BlockId::new(rng.gen()),
                parent,
                height: parent_height + 1,
            });
        }
        specs
    }

    /// Add one node: a fresh engine holding its own copies of the
    /// shared blocks.
    pub fn add_node(&mut self) -> Result<(), ConsensusError> {
        let mut engine = Topological::default();
        engine.initialize(
            self.config.params,
            genesis_id(),
            GENESIS_HEIGHT,
            0,
            &Registry::new(),
        )?;

        let order = self.issue_order();
        let mut blocks = vec![None; self.specs.len()];
        for index in order {
            let spec = self.specs[index];
            let block = TestBlock::new(spec.id, spec.parent, spec.height);
            engine.add(block.clone())?;
            blocks[index] = Some(block);
        }

        self.nodes.push(Node {
            engine,
            blocks: blocks.into_iter().flatten().collect(),
        });
        debug!(nodes = self.nodes.len(), "added simulated node");
        Ok(())
    }

    /// Pick the order in which a node issues the shared blocks.
    ///
    /// Either spec order (identical across nodes) or a random
    /// topological order in which parents still precede children.
    fn issue_order(&mut self) -> Vec<usize> {
        if !self.config.shuffle_issue_order {
            return (0..self.specs.len()).collect();
        }

        let mut issued: HashSet<BlockId> = HashSet::new();
        issued.insert(genesis_id());
        let mut remaining: Vec<usize> = (0..self.specs.len()).collect();
        let mut order = Vec::with_capacity(self.specs.len());
        while !remaining.is_empty() {
            let ready: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|&i| issued.contains(&self.specs[i].parent))
                .collect();
            let pick = ready[self.rng.gen_range(0..ready.len())];
            issued.insert(self.specs[pick].id);
            remaining.retain(|&i| i != pick);
            order.push(pick);
        }
        order
    }

    /// Run one poll round: a random unfinalized node samples `k` peers
    /// (with replacement) for their preferences and records the bag.
    pub fn round(&mut self) -> Result<(), ConsensusError> {
        let running: Vec<usize> = (0..self.nodes.len())
            .filter(|&i| !self.nodes[i].engine.finalized())
            .collect();
        let Some(&first) = running.first() else {
            return Ok(());
        };
        let target = if running.len() == 1 {
            first
        } else {
            running[self.rng.gen_range(0..running.len())]
        };

        let mut bag = Bag::new();
        for _ in 0..self.config.params.k {
            let peer = self.rng.gen_range(0..self.nodes.len());
            bag.add(self.nodes[peer].engine.preference());
        }
        self.nodes[target].engine.record_poll(&bag)
    }

    /// Run rounds until every node is finalized or `max_rounds` is hit.
    /// Returns the number of rounds executed.
    pub fn run_to_finality(&mut self, max_rounds: usize) -> Result<usize, ConsensusError> {
        for round in 0..max_rounds {
            if self.all_finalized() {
                return Ok(round);
            }
            self.round()?;
        }
        Ok(max_rounds)
    }

    /// Whether every node has decided every block it issued.
    pub fn all_finalized(&self) -> bool {
        self.nodes.iter().all(|n| n.engine.finalized())
    }

    /// Whether every node agrees on the accepted chain.
    pub fn in_agreement(&self) -> bool {
        let Some(first) = self.nodes.first() else {
            return true;
        };
        let (tip, height) = first.engine.last_accepted();
        self.nodes.iter().all(|n| {
            n.engine.last_accepted() == (tip, height)
                && (0..=height).all(|h| {
                    n.engine.preference_at_height(h) == first.engine.preference_at_height(h)
                })
        })
    }

    /// Number of nodes in the network.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of blocks in the shared tree.
    pub fn num_blocks(&self) -> usize {
        self.specs.len()
    }

    /// The last accepted block of node `index`.
    pub fn last_accepted(&self, index: usize) -> (BlockId, u64) {
        self.nodes[index].engine.last_accepted()
    }

    /// The current preference of node `index`.
    pub fn preference(&self, index: usize) -> BlockId {
        self.nodes[index].engine.preference()
    }

    /// Snapshot of node `index`'s decided blocks as `(id, accepted)`
    /// pairs, for safety assertions across rounds.
    pub fn decisions(&self, index: usize) -> Vec<(BlockId, bool)> {
        self.nodes[index]
            .blocks
            .iter()
            .filter(|b| b.status().is_decided())
            .map(|b| (b.id(), b.status() == Status::Accepted))
            .collect()
    }
}
