//! Consensus parameters and validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Protocol thresholds for a consensus instance.
///
/// The first four fields drive the engine itself. The remaining knobs are
/// consumed by the external poll scheduler, which consults
/// `num_processing()` to decide how many polls to keep outstanding; the
/// engine only validates and echoes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// Number of peers sampled per poll.
    pub k: u64,

    /// Minimum votes for a branch to become the tentatively preferred
    /// choice.
    pub alpha_preference: u64,

    /// Minimum votes required to increment a branch's confidence counter.
    pub alpha_confidence: u64,

    /// Number of consecutive confidence increments required to finalize.
    pub beta: u64,

    /// Number of polls to keep outstanding while blocks are processing.
    pub concurrent_repolls: u64,

    /// Number of blocks that should be processing at once.
    pub optimal_processing: usize,

    /// Maximum number of blocks allowed to be outstanding.
    pub max_outstanding_items: usize,

    /// Maximum time a block may spend processing before the chain is
    /// considered unhealthy.
    pub max_item_processing_time: Duration,
}

impl Parameters {
    /// Check the parameter invariants.
    ///
    /// Construction-time validation: a violated invariant is an error
    /// surfaced to the caller, never a runtime panic.
    pub fn verify(&self) -> Result<(), ParametersError> {
        if self.alpha_preference == 0 {
            return Err(ParametersError::AlphaPreferenceZero);
        }
        if self.alpha_confidence < self.alpha_preference {
            return Err(ParametersError::AlphaConfidenceTooSmall {
                alpha_confidence: self.alpha_confidence,
                alpha_preference: self.alpha_preference,
            });
        }
        if self.k < self.alpha_confidence {
            return Err(ParametersError::AlphaConfidenceTooLarge {
                alpha_confidence: self.alpha_confidence,
                k: self.k,
            });
        }
        if self.beta == 0 {
            return Err(ParametersError::BetaZero);
        }
        if self.concurrent_repolls == 0 || self.concurrent_repolls > self.beta {
            return Err(ParametersError::ConcurrentRepollsOutOfRange {
                concurrent_repolls: self.concurrent_repolls,
                beta: self.beta,
            });
        }
        if self.optimal_processing == 0 {
            return Err(ParametersError::OptimalProcessingZero);
        }
        if self.max_outstanding_items == 0 {
            return Err(ParametersError::MaxOutstandingItemsZero);
        }
        if self.max_item_processing_time.is_zero() {
            return Err(ParametersError::MaxItemProcessingTimeZero);
        }
        Ok(())
    }
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            k: 20,
            alpha_preference: 15,
            alpha_confidence: 15,
            beta: 20,
            concurrent_repolls: 4,
            optimal_processing: 10,
            max_outstanding_items: 256,
            max_item_processing_time: Duration::from_secs(30),
        }
    }
}

/// A violated parameter invariant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParametersError {
    /// `alpha_preference` must be positive.
    #[error("alpha_preference must be greater than 0")]
    AlphaPreferenceZero,

    /// `alpha_confidence` must be at least `alpha_preference`.
    #[error("alpha_confidence ({alpha_confidence}) < alpha_preference ({alpha_preference})")]
    AlphaConfidenceTooSmall {
        /// Configured confidence threshold.
        alpha_confidence: u64,
        /// Configured preference threshold.
        alpha_preference: u64,
    },

    /// `alpha_confidence` cannot exceed the sample size.
    #[error("alpha_confidence ({alpha_confidence}) > k ({k})")]
    AlphaConfidenceTooLarge {
        /// Configured confidence threshold.
        alpha_confidence: u64,
        /// Configured sample size.
        k: u64,
    },

    /// `beta` must be positive.
    #[error("beta must be greater than 0")]
    BetaZero,

    /// `concurrent_repolls` must be in `1..=beta`.
    #[error("concurrent_repolls ({concurrent_repolls}) not in 1..=beta ({beta})")]
    ConcurrentRepollsOutOfRange {
        /// Configured repoll count.
        concurrent_repolls: u64,
        /// Configured finalization threshold.
        beta: u64,
    },

    /// `optimal_processing` must be positive.
    #[error("optimal_processing must be greater than 0")]
    OptimalProcessingZero,

    /// `max_outstanding_items` must be positive.
    #[error("max_outstanding_items must be greater than 0")]
    MaxOutstandingItemsZero,

    /// `max_item_processing_time` must be positive.
    #[error("max_item_processing_time must be greater than 0")]
    MaxItemProcessingTimeZero,
}
