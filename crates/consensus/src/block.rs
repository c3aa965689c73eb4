//! Block collaborator interface.
//!
//! Blocks are produced and verified by the VM layer before being issued
//! into consensus; the engine only reads their identity and linkage and
//! drives their decision callbacks.

use glacia_types::{BlockId, Status};

/// Error type returned by decision callbacks.
///
/// The engine does not interpret callback failures beyond treating them
/// as fatal, so implementations may surface any error they like.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Something consensus can decide on.
pub trait Decidable {
    /// The unique identifier of this item.
    fn id(&self) -> BlockId;

    /// The current decision status.
    ///
    /// Only the consensus engine moves a block out of
    /// [`Status::Undecided`], and it does so exactly once.
    fn status(&self) -> Status;

    /// Finalize this item as part of the canonical chain.
    ///
    /// Called synchronously from `record_poll`; a slow callback stalls
    /// the whole chain, so implementations must be fast or hand off work
    /// internally. An error poisons the consensus instance.
    fn accept(&mut self) -> Result<(), CallbackError>;

    /// Finalize this item as losing; it will never re-enter consensus.
    fn reject(&mut self) -> Result<(), CallbackError>;
}

/// A block in the linear chain.
///
/// `height` is always the parent's height plus one; the VM layer
/// guarantees this before issuing the block.
pub trait Block: Decidable {
    /// The ID of this block's parent.
    fn parent(&self) -> BlockId;

    /// The height of this block in the chain (genesis is 0).
    fn height(&self) -> u64;
}
