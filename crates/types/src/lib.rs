//! Core types for Glacia consensus.
//!
//! This crate holds the leaf types shared by the consensus engine and its
//! callers: block identifiers, decision status, and the duplicate-aware
//! vote multiset delivered by the sampling layer.

mod bag;
mod id;
mod status;

pub use bag::Bag;
pub use id::{BlockId, HexError};
pub use status::Status;
