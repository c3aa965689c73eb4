//! Snowball decision primitives.
//!
//! Every node of the conflict trie carries one of these counters. A
//! unary decision covers a chain segment with no known conflict; when a
//! conflict appears the segment's decision is extended into a binary
//! decision between the two diverging branches.

use crate::params::Parameters;

/// Confidence counter for a chain segment with no live alternative.
///
/// This is the degenerate form of [`BinaryDecision`]: the single
/// alternative accumulates confidence whenever its vote count reaches
/// `alpha_confidence`, and there is no competing side to flip to.
#[derive(Debug, Clone, Default)]
pub struct UnaryDecision {
    confidence: u64,
    finalized: bool,
}

impl UnaryDecision {
    /// Create a fresh decision with no accumulated confidence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current consecutive-success count.
    #[allow(dead_code)]
    pub fn confidence(&self) -> u64 {
        self.confidence
    }

    /// Whether confidence has reached `beta`.
    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Feed one poll's accumulated vote count into the decision.
    ///
    /// Returns whether this call made progress.
    pub fn record_votes(&mut self, params: &Parameters, count: u64) -> bool {
        if self.finalized {
            return false;
        }
        if count >= params.alpha_confidence {
            self.confidence += 1;
            self.finalized = self.confidence >= params.beta;
            return true;
        }
        false
    }

    /// Convert this decision into the binary decision created when the
    /// segment forks.
    ///
    /// The existing branch keeps the confidence it accumulated while it
    /// was unopposed and starts as the preferred side; `existing_bit` is
    /// the existing branch's ID bit at the divergence position.
    pub fn extend(&self, existing_bit: u8) -> BinaryDecision {
        BinaryDecision {
            preference: existing_bit as usize,
            confidence: self.confidence,
            finalized: self.finalized,
        }
    }
}

/// Confidence counter between two conflicting alternatives.
///
/// The two alternatives are indexed 0 and 1, matching the value of the
/// divergence bit in the branches' block IDs.
#[derive(Debug, Clone)]
pub struct BinaryDecision {
    preference: usize,
    confidence: u64,
    finalized: bool,
}

impl BinaryDecision {
    /// The currently preferred alternative (0 or 1).
    pub fn preference(&self) -> usize {
        self.preference
    }

    /// Current consecutive-success count for the preferred alternative.
    #[allow(dead_code)]
    pub fn confidence(&self) -> u64 {
        self.confidence
    }

    /// Whether confidence has reached `beta`.
    pub fn finalized(&self) -> bool {
        self.finalized
    }

    /// Feed one poll's per-alternative vote counts into the decision.
    ///
    /// If the preferred side reached `alpha_confidence`, confidence
    /// advances. Otherwise, if the other side reached
    /// `alpha_preference`, the preference flips and confidence restarts
    /// at 1. Any other outcome leaves the decision untouched. Returns
    /// whether this call made progress.
    pub fn record_votes(&mut self, params: &Parameters, votes: [u64; 2]) -> bool {
        if self.finalized {
            return false;
        }
        if votes[self.preference] >= params.alpha_confidence {
            self.confidence += 1;
            self.finalized = self.confidence >= params.beta;
            return true;
        }
        if votes[1 - self.preference] >= params.alpha_preference {
            self.preference = 1 - self.preference;
            self.confidence = 1;
            self.finalized = self.confidence >= params.beta;
            return true;
        }
        false
    }
}
