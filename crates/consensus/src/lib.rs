//! Metastable chain consensus engine.
//!
//! Validators repeatedly sample their peers for the block each peer
//! currently prefers, then feed the resulting vote multiset into a local
//! consensus instance. The instance tracks confidence in competing chain
//! branches and finalizes a branch once its confidence is irreversible.
//!
//! # Architecture
//!
//! - [`Parameters`]: validated protocol thresholds.
//! - [`Block`]: the collaborator interface the VM layer implements.
//! - `snowball`: the binary confidence-accumulation primitive that sits
//!   at every fork decision.
//! - `tree`: the conflict trie, an arena of unary chain segments and
//!   binary fork decisions keyed by the bit at which sibling IDs diverge.
//! - [`Topological`]: the stateful engine exposing `add` / `record_poll`
//!   and the read-only accessors, owning the trie rooted at the last
//!   accepted block.
//!
//! The engine is synchronous and single-threaded: the owning chain's
//! message loop serializes all calls under its own lock, and the only
//! potentially slow work is the injected [`Block::accept`] /
//! [`Block::reject`] callbacks.

mod block;
mod consensus;
mod error;
mod metrics;
mod params;
mod snowball;
mod topological;
mod tree;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use block::{Block, CallbackError, Decidable};
pub use consensus::{Consensus, Factory, Health, TopologicalFactory};
pub use error::ConsensusError;
pub use params::{Parameters, ParametersError};
pub use topological::Topological;
