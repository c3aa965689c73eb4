//! Consensus interface and construction seam.

use glacia_types::{Bag, BlockId};
use prometheus::Registry;

use crate::block::Block;
use crate::error::ConsensusError;
use crate::params::Parameters;
use crate::topological::Topological;

/// Health snapshot of a consensus instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Health {
    /// Number of currently processing blocks.
    pub processing: usize,
    /// Tail of the preferred chain.
    pub preference: BlockId,
    /// Whether every issued block has been decided.
    pub finalized: bool,
    /// Finalized, or processing within the configured optimum.
    pub healthy: bool,
}

/// A linear chain consensus instance.
///
/// Implemented by [`Topological`]; the trait exists so the test suite
/// and the node wiring can run against any implementation.
pub trait Consensus<B: Block> {
    /// Initialize from the last accepted block, registering metrics with
    /// the injected registry.
    fn initialize(
        &mut self,
        params: Parameters,
        last_accepted_id: BlockId,
        last_accepted_height: u64,
        last_accepted_time: u64,
        registry: &Registry,
    ) -> Result<(), ConsensusError>;

    /// The parameters this instance runs with.
    fn parameters(&self) -> &Parameters;

    /// Issue a block. The parent must already have been issued or be the
    /// last accepted block.
    fn add(&mut self, block: B) -> Result<(), ConsensusError>;

    /// Record the result of one network poll.
    fn record_poll(&mut self, votes: &Bag<BlockId>) -> Result<(), ConsensusError>;

    /// Tail of the currently preferred chain.
    fn preference(&self) -> BlockId;

    /// The block on the preferred path at `height`, if any.
    fn preference_at_height(&self, height: u64) -> Option<BlockId>;

    /// Whether `id` lies on the preferred chain.
    fn is_preferred(&self, id: &BlockId) -> bool;

    /// Number of currently processing blocks.
    fn num_processing(&self) -> usize;

    /// Whether `id` is currently processing.
    fn processing(&self, id: &BlockId) -> bool;

    /// The last accepted block and its height.
    fn last_accepted(&self) -> (BlockId, u64);

    /// Whether every issued block has been decided.
    fn finalized(&self) -> bool;

    /// Health snapshot for the node's health service.
    fn health_check(&self) -> Health;
}

impl<B: Block> Consensus<B> for Topological<B> {
    fn initialize(
        &mut self,
        params: Parameters,
        last_accepted_id: BlockId,
        last_accepted_height: u64,
        last_accepted_time: u64,
        registry: &Registry,
    ) -> Result<(), ConsensusError> {
        Topological::initialize(
            self,
            params,
            last_accepted_id,
            last_accepted_height,
            last_accepted_time,
            registry,
        )
    }

    fn parameters(&self) -> &Parameters {
        Topological::parameters(self)
    }

    fn add(&mut self, block: B) -> Result<(), ConsensusError> {
        Topological::add(self, block)
    }

    fn record_poll(&mut self, votes: &Bag<BlockId>) -> Result<(), ConsensusError> {
        Topological::record_poll(self, votes)
    }

    fn preference(&self) -> BlockId {
        Topological::preference(self)
    }

    fn preference_at_height(&self, height: u64) -> Option<BlockId> {
        Topological::preference_at_height(self, height)
    }

    fn is_preferred(&self, id: &BlockId) -> bool {
        Topological::is_preferred(self, id)
    }

    fn num_processing(&self) -> usize {
        Topological::num_processing(self)
    }

    fn processing(&self, id: &BlockId) -> bool {
        Topological::processing(self, id)
    }

    fn last_accepted(&self) -> (BlockId, u64) {
        Topological::last_accepted(self)
    }

    fn finalized(&self) -> bool {
        Topological::finalized(self)
    }

    fn health_check(&self) -> Health {
        Topological::health_check(self)
    }
}

/// Creates consensus instances.
pub trait Factory<B: Block> {
    /// The engine type this factory builds.
    type Engine: Consensus<B>;

    /// Create an uninitialized engine.
    fn new_engine(&self) -> Self::Engine;
}

/// Factory for [`Topological`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopologicalFactory;

impl<B: Block> Factory<B> for TopologicalFactory {
    type Engine = Topological<B>;

    fn new_engine(&self) -> Topological<B> {
        Topological::default()
    }
}
