//! Randomized multi-node agreement harness.
//!
//! This crate drives many independent consensus instances against the
//! same block tree with randomized round-robin polling. Given the same
//! seed it produces identical results every run, so convergence and
//! agreement properties can be asserted deterministically.
//!
//! Each simulated node owns its own copies of the shared blocks and its
//! own engine; every round one node polls `k` uniformly sampled peers
//! for their current preference and records the resulting vote bag.

mod network;

pub use network::{Network, NetworkConfig};
