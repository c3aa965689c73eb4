//! Error types for the consensus engine.

use glacia_types::BlockId;
use thiserror::Error;

use crate::block::CallbackError;
use crate::params::ParametersError;

/// Errors surfaced by the consensus engine.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// `add` referenced a parent that is neither processing nor the last
    /// accepted block. This includes parents that were already rejected:
    /// a transitively unreachable parent is indistinguishable from an
    /// unknown one.
    #[error("unknown parent {parent} for block {block}")]
    UnknownParentBlock {
        /// The block being added.
        block: BlockId,
        /// Its claimed parent.
        parent: BlockId,
    },

    /// `add` was called with a block ID that was already issued or
    /// already decided.
    #[error("block {0} was already added to consensus")]
    DuplicateBlock(BlockId),

    /// Parameter validation failed at initialization.
    #[error("invalid parameters: {0}")]
    InvalidParameters(#[from] ParametersError),

    /// Metric registration failed at initialization, usually a name
    /// collision with an already-registered collector. Fatal: the chain
    /// must not start on this instance.
    #[error("metrics registration failed: {0}")]
    MetricsRegistration(#[from] prometheus::Error),

    /// A block's `accept` or `reject` callback returned an error during
    /// a poll cascade. The cascade may have partially completed, so the
    /// instance is poisoned and must not be used again.
    #[error("block decision callback failed: {0}")]
    DecisionCallback(#[source] CallbackError),

    /// The instance was poisoned by an earlier callback failure; the
    /// owning chain must halt instead of retrying.
    #[error("consensus instance poisoned by earlier callback failure")]
    Poisoned,
}
