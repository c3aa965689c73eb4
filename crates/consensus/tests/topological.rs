//! Consensus engine behavior tests.
//!
//! These exercise the full add / record_poll / cascade surface of the
//! engine against rigged in-memory blocks, including the documented
//! error and poisoning paths.

use std::time::Duration;

use glacia_consensus::test_utils::{genesis_id, id_with_bits, TestBlock, GENESIS_HEIGHT};
use glacia_consensus::{
    ConsensusError, Decidable, Factory, Parameters, Topological, TopologicalFactory,
};
use glacia_types::{Bag, BlockId, Status};
use prometheus::Registry;
use tracing_test::traced_test;

fn params(k: u64, alpha_preference: u64, alpha_confidence: u64, beta: u64) -> Parameters {
    Parameters {
        k,
        alpha_preference,
        alpha_confidence,
        beta,
        concurrent_repolls: 1,
        optimal_processing: 1,
        max_outstanding_items: 16,
        max_item_processing_time: Duration::from_secs(10),
    }
}

fn engine_with_registry(p: Parameters, registry: &Registry) -> Topological<TestBlock> {
    let mut sm = TopologicalFactory.new_engine();
    sm.initialize(p, genesis_id(), GENESIS_HEIGHT, 0, registry)
        .unwrap();
    sm
}

fn engine(p: Parameters) -> Topological<TestBlock> {
    engine_with_registry(p, &Registry::new())
}

fn votes(blocks: &[&TestBlock]) -> Bag<BlockId> {
    blocks.iter().map(|b| b.id()).collect()
}

fn metric_text(registry: &Registry) -> String {
    prometheus::TextEncoder::new()
        .encode_to_string(&registry.gather())
        .unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
// Initialization and issuance
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn initialize_sets_last_accepted_state() {
    let sm = engine(params(1, 1, 1, 3));

    assert_eq!(sm.preference(), genesis_id());
    assert_eq!(sm.last_accepted(), (genesis_id(), GENESIS_HEIGHT));
    assert_eq!(sm.num_processing(), 0);
    assert!(sm.finalized());
    assert_eq!(sm.parameters().beta, 3);
}

#[test]
fn initialize_rejects_invalid_parameters() {
    let mut sm: Topological<TestBlock> = TopologicalFactory.new_engine();
    let mut p = params(1, 1, 1, 1);
    p.alpha_preference = 0;

    let err = sm
        .initialize(p, genesis_id(), GENESIS_HEIGHT, 0, &Registry::new())
        .unwrap_err();
    assert!(matches!(err, ConsensusError::InvalidParameters(_)));
}

#[test]
fn num_processing_tracks_adds_and_decisions() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);

    assert_eq!(sm.num_processing(), 0);

    sm.add(block.clone()).unwrap();
    assert_eq!(sm.num_processing(), 1);
    assert!(sm.processing(&block.id()));

    sm.record_poll(&votes(&[&block])).unwrap();
    assert_eq!(sm.num_processing(), 0);
    assert!(!sm.processing(&block.id()));
    assert_eq!(block.status(), Status::Accepted);
}

#[test]
fn add_to_tail_updates_preference() {
    let mut sm = engine(params(1, 1, 1, 3));
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);

    sm.add(block.clone()).unwrap();

    assert_eq!(sm.preference(), block.id());
    assert!(sm.is_preferred(&block.id()));
    assert_eq!(sm.preference_at_height(1), Some(block.id()));
}

#[test]
fn add_to_non_tail_keeps_preference() {
    let mut sm = engine(params(1, 1, 1, 3));
    let genesis = TestBlock::genesis();
    let first = TestBlock::child(&genesis, 1);
    let second = TestBlock::child(&genesis, 2);

    sm.add(first.clone()).unwrap();
    sm.add(second.clone()).unwrap();

    assert_eq!(sm.preference(), first.id());
    assert!(sm.is_preferred(&first.id()));
    assert!(!sm.is_preferred(&second.id()));
}

#[test]
fn add_on_unknown_parent_fails() {
    let mut sm = engine(params(1, 1, 1, 3));
    let unknown = TestBlock::new(BlockId::from_bytes(b"unknown"), BlockId::ZERO, 7);
    let orphan = TestBlock::child(&unknown, 1);

    let err = sm.add(orphan).unwrap_err();
    assert!(matches!(err, ConsensusError::UnknownParentBlock { .. }));
    assert_eq!(sm.num_processing(), 0);
}

#[test]
fn add_duplicate_block_fails() {
    let mut sm = engine(params(1, 1, 1, 3));
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);

    sm.add(block.clone()).unwrap();
    let err = sm.add(block.clone()).unwrap_err();
    assert!(matches!(err, ConsensusError::DuplicateBlock(_)));
    assert_eq!(sm.num_processing(), 1);
}

#[test]
fn add_decided_block_fails() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);

    sm.add(block.clone()).unwrap();
    sm.record_poll(&votes(&[&block])).unwrap();
    assert_eq!(block.status(), Status::Accepted);

    // A fresh handle with the same identity is still a duplicate.
    let replay = TestBlock::new(block.id(), genesis_id(), 1);
    let err = sm.add(replay).unwrap_err();
    assert!(matches!(err, ConsensusError::DuplicateBlock(_)));
}

#[test]
fn add_under_rejected_parent_fails() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let winner = TestBlock::child(&genesis, 1);
    let loser = TestBlock::child(&genesis, 2);

    sm.add(winner.clone()).unwrap();
    sm.add(loser.clone()).unwrap();
    sm.record_poll(&votes(&[&winner])).unwrap();
    assert_eq!(loser.status(), Status::Rejected);

    // The rejected branch is transitively unreachable.
    let orphan = TestBlock::child(&loser, 1);
    let err = sm.add(orphan).unwrap_err();
    assert!(matches!(err, ConsensusError::UnknownParentBlock { .. }));
}

#[test]
fn status_and_processing_queries() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let accepted = TestBlock::child(&genesis, 1);
    let rejected = TestBlock::child(&genesis, 2);
    let unissued = TestBlock::child(&genesis, 3);

    assert!(!sm.processing(&accepted.id()));
    assert!(!sm.is_preferred(&accepted.id()));

    sm.add(accepted.clone()).unwrap();
    sm.add(rejected.clone()).unwrap();
    assert!(sm.processing(&accepted.id()));
    assert!(sm.processing(&rejected.id()));

    sm.record_poll(&votes(&[&accepted])).unwrap();

    assert!(!sm.processing(&accepted.id()));
    assert!(!sm.processing(&rejected.id()));
    assert!(!sm.processing(&unissued.id()));

    // Accepted blocks stay on the preferred chain; rejected and
    // unissued blocks do not.
    assert!(sm.is_preferred(&accepted.id()));
    assert!(!sm.is_preferred(&rejected.id()));
    assert!(!sm.is_preferred(&unissued.id()));
    assert_eq!(sm.preference_at_height(1), Some(accepted.id()));
}

// ═══════════════════════════════════════════════════════════════════════
// Polling
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn record_poll_accepts_single_block_after_beta() {
    let mut sm = engine(params(1, 1, 1, 2));
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);
    sm.add(block.clone()).unwrap();

    sm.record_poll(&votes(&[&block])).unwrap();
    assert_eq!(sm.num_processing(), 1);
    assert_eq!(block.status(), Status::Undecided);

    sm.record_poll(&votes(&[&block])).unwrap();
    assert_eq!(sm.num_processing(), 0);
    assert_eq!(block.status(), Status::Accepted);
    assert_eq!(sm.last_accepted(), (block.id(), 1));
}

#[test]
fn record_poll_accepts_and_rejects_siblings() {
    let mut sm = engine(params(1, 1, 1, 2));
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&genesis, 2);
    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();

    sm.record_poll(&votes(&[&a])).unwrap();
    assert_eq!(a.status(), Status::Undecided);
    assert_eq!(b.status(), Status::Undecided);

    sm.record_poll(&votes(&[&a])).unwrap();
    assert_eq!(a.status(), Status::Accepted);
    assert_eq!(b.status(), Status::Rejected);
    assert!(sm.finalized());
}

#[test]
fn record_poll_split_vote_changes_nothing() {
    let registry = Registry::new();
    let mut sm = engine_with_registry(params(2, 2, 2, 1), &registry);
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&genesis, 2);
    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();

    let preference = sm.preference();
    sm.record_poll(&votes(&[&a, &b])).unwrap();

    assert_eq!(sm.preference(), preference);
    assert_eq!(sm.num_processing(), 2);
    assert_eq!(a.status(), Status::Undecided);
    assert_eq!(b.status(), Status::Undecided);

    let text = metric_text(&registry);
    assert!(text.contains("polls_failed 1"));
    assert!(text.contains("polls_successful 0"));

    // An unanimous follow-up poll still finalizes.
    sm.record_poll(&votes(&[&a, &a])).unwrap();
    assert_eq!(a.status(), Status::Accepted);
    assert_eq!(b.status(), Status::Rejected);
}

#[test]
fn record_poll_when_finalized_is_a_noop() {
    let mut sm = engine(params(1, 1, 1, 1));

    let mut bag = Bag::new();
    bag.add(genesis_id());
    sm.record_poll(&bag).unwrap();

    assert!(sm.finalized());
    assert_eq!(sm.preference(), genesis_id());
}

#[test]
fn record_poll_ignores_invalid_votes() {
    let mut sm = engine(params(1, 1, 1, 2));
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);
    sm.add(block.clone()).unwrap();

    let mut unknown = Bag::new();
    unknown.add(BlockId::from_bytes(b"never issued"));
    sm.record_poll(&unknown).unwrap();

    assert_eq!(sm.preference(), block.id());
    assert_eq!(sm.num_processing(), 1);
    assert_eq!(block.status(), Status::Undecided);

    // Invalid votes never count toward confidence either: two valid
    // polls are still required.
    sm.record_poll(&votes(&[&block])).unwrap();
    assert_eq!(block.status(), Status::Undecided);
    sm.record_poll(&votes(&[&block])).unwrap();
    assert_eq!(block.status(), Status::Accepted);
}

#[traced_test]
#[test]
fn record_poll_rejects_transitively() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&genesis, 2);
    let c = TestBlock::child(&b, 1);
    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();
    sm.add(c.clone()).unwrap();

    // One poll for a decides everything: accepting a rejects b and its
    // whole descendant subtree in the same call.
    sm.record_poll(&votes(&[&a])).unwrap();

    assert_eq!(a.status(), Status::Accepted);
    assert_eq!(b.status(), Status::Rejected);
    assert_eq!(c.status(), Status::Rejected);
    assert_eq!(sm.num_processing(), 0);
    assert_eq!(sm.last_accepted(), (a.id(), 1));
}

#[test]
fn record_poll_flip_resets_confidence() {
    let mut sm = engine(params(1, 1, 1, 3));
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&genesis, 2);
    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();

    // Two successes for a: confidence 2 of 3.
    sm.record_poll(&votes(&[&a])).unwrap();
    sm.record_poll(&votes(&[&a])).unwrap();
    assert_eq!(a.status(), Status::Undecided);
    assert!(sm.is_preferred(&a.id()));

    // Flipping to b discards that confidence; b needs beta consecutive
    // successes of its own.
    sm.record_poll(&votes(&[&b])).unwrap();
    assert!(sm.is_preferred(&b.id()));
    assert_eq!(b.status(), Status::Undecided);

    sm.record_poll(&votes(&[&b])).unwrap();
    assert_eq!(b.status(), Status::Undecided);

    sm.record_poll(&votes(&[&b])).unwrap();
    assert_eq!(b.status(), Status::Accepted);
    assert_eq!(a.status(), Status::Rejected);
}

#[test]
fn record_poll_transitive_voting() {
    // The 5-block diamond: 0 -> 1 -> 2 and 0 -> 3 -> 4.
    let mut sm = engine(params(3, 3, 3, 1));
    let genesis = TestBlock::genesis();
    let b0 = TestBlock::child(&genesis, 0);
    let b1 = TestBlock::child(&b0, 1);
    let b2 = TestBlock::child(&b1, 2);
    let b3 = TestBlock::child(&b0, 3);
    let b4 = TestBlock::child(&b3, 4);
    for blk in [&b0, &b1, &b2, &b3, &b4] {
        sm.add((*blk).clone()).unwrap();
    }

    // Votes for 0, 2 and 4 all reach block 0, which finalizes; the two
    // branches each hold a single vote and stay undecided.
    sm.record_poll(&votes(&[&b0, &b2, &b4])).unwrap();

    assert_eq!(b0.status(), Status::Accepted);
    assert_eq!(sm.last_accepted(), (b0.id(), 1));
    assert_eq!(b1.status(), Status::Undecided);
    assert_eq!(b3.status(), Status::Undecided);
    assert_eq!(sm.num_processing(), 4);

    // A unanimous vote for 2 finalizes the 1 -> 2 branch and rejects
    // the other branch transitively.
    sm.record_poll(&votes(&[&b2, &b2, &b2])).unwrap();

    assert_eq!(b1.status(), Status::Accepted);
    assert_eq!(b2.status(), Status::Accepted);
    assert_eq!(b3.status(), Status::Rejected);
    assert_eq!(b4.status(), Status::Rejected);
    assert_eq!(sm.num_processing(), 0);
    assert_eq!(sm.last_accepted(), (b2.id(), 3));
    assert_eq!(sm.preference(), b2.id());
}

#[test]
fn record_poll_diverged_voting() {
    // Three siblings with hand-picked IDs so the third lands inside the
    // existing fork's subtree: a and b diverge at bit 0, b and c at
    // bit 1.
    let mut sm = engine(params(1, 1, 1, 2));
    let genesis = TestBlock::genesis();
    let a = TestBlock::child_with_id(&genesis, id_with_bits(&[0]));
    let b = TestBlock::child_with_id(&genesis, id_with_bits(&[1]));
    let c = TestBlock::child_with_id(&genesis, id_with_bits(&[2]));

    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();
    sm.record_poll(&votes(&[&b])).unwrap();
    assert!(sm.is_preferred(&b.id()));

    sm.add(c.clone()).unwrap();

    // Two polls for c: the first flips the inner fork to c, the second
    // finalizes both fork decisions on c's side.
    sm.record_poll(&votes(&[&c])).unwrap();
    assert!(sm.is_preferred(&c.id()));
    assert_eq!(c.status(), Status::Undecided);

    sm.record_poll(&votes(&[&c])).unwrap();

    assert_eq!(a.status(), Status::Rejected);
    assert_eq!(b.status(), Status::Rejected);
    assert_eq!(c.status(), Status::Accepted);
    assert_eq!(sm.num_processing(), 0);
}

#[test]
fn record_poll_changes_preferred_chain() {
    let mut sm = engine(params(1, 1, 1, 10));
    let genesis = TestBlock::genesis();
    let a1 = TestBlock::child(&genesis, 1);
    let a2 = TestBlock::child(&a1, 1);
    let b1 = TestBlock::child(&genesis, 2);
    let b2 = TestBlock::child(&b1, 2);
    for blk in [&a1, &a2, &b1, &b2] {
        sm.add((*blk).clone()).unwrap();
    }

    assert_eq!(sm.preference(), a2.id());
    assert!(sm.is_preferred(&a1.id()));
    assert!(sm.is_preferred(&a2.id()));

    sm.record_poll(&votes(&[&b2])).unwrap();

    assert_eq!(sm.preference(), b2.id());
    assert!(!sm.is_preferred(&a1.id()));
    assert!(!sm.is_preferred(&a2.id()));
    assert!(sm.is_preferred(&b1.id()));
    assert!(sm.is_preferred(&b2.id()));
    assert_eq!(sm.preference_at_height(1), Some(b1.id()));
    assert_eq!(sm.preference_at_height(2), Some(b2.id()));

    sm.record_poll(&votes(&[&a2])).unwrap();
    assert_eq!(sm.preference(), a2.id());
}

#[test]
fn record_poll_counts_each_vote_once_per_ancestor() {
    // Regression shape for transitive vote aggregation: two votes for
    // different children must reach the shared parent as exactly two
    // votes, never more.
    let mut sm = engine(params(3, 2, 3, 1));
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&a, 1);
    let c = TestBlock::child(&a, 2);
    for blk in [&a, &b, &c] {
        sm.add((*blk).clone()).unwrap();
    }

    // a aggregates 2 votes, below alpha_confidence = 3: nothing may
    // finalize.
    sm.record_poll(&votes(&[&b, &c])).unwrap();
    assert_eq!(a.status(), Status::Undecided);
    assert_eq!(sm.num_processing(), 3);

    // Three votes for b finalize a and b and reject c.
    sm.record_poll(&votes(&[&b, &b, &b])).unwrap();
    assert_eq!(a.status(), Status::Accepted);
    assert_eq!(b.status(), Status::Accepted);
    assert_eq!(c.status(), Status::Rejected);
    assert_eq!(sm.num_processing(), 0);
}

#[test]
fn record_poll_with_default_parameters() {
    let p = Parameters::default();
    p.verify().unwrap();

    let mut sm = engine(p);
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);
    sm.add(block.clone()).unwrap();

    let mut bag = Bag::new();
    bag.add_count(block.id(), p.alpha_confidence);
    for _ in 0..p.beta {
        assert_eq!(block.status(), Status::Undecided);
        sm.record_poll(&bag).unwrap();
    }
    assert_eq!(block.status(), Status::Accepted);
}

#[test]
fn last_accepted_follows_the_chain() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let a1 = TestBlock::child(&genesis, 1);
    let a2 = TestBlock::child(&a1, 1);
    sm.add(a1.clone()).unwrap();
    sm.add(a2.clone()).unwrap();

    assert_eq!(sm.last_accepted(), (genesis_id(), GENESIS_HEIGHT));

    // A single vote for the tail accepts the whole segment in ascending
    // height order.
    sm.record_poll(&votes(&[&a2])).unwrap();

    assert_eq!(sm.last_accepted(), (a2.id(), 2));
    assert_eq!(sm.preference_at_height(0), Some(genesis_id()));
    assert_eq!(sm.preference_at_height(1), Some(a1.id()));
    assert_eq!(sm.preference_at_height(2), Some(a2.id()));
    assert_eq!(sm.preference_at_height(3), None);
}

#[test]
fn preference_at_height_before_history_is_none() {
    let mut sm: Topological<TestBlock> = TopologicalFactory.new_engine();
    sm.initialize(params(1, 1, 1, 1), genesis_id(), 10, 0, &Registry::new())
        .unwrap();

    // Heights below the initialization point have no resolvable
    // history.
    assert_eq!(sm.preference_at_height(3), None);
    assert_eq!(sm.preference_at_height(10), Some(genesis_id()));
}

// ═══════════════════════════════════════════════════════════════════════
// Metrics
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn initialize_fails_on_metric_name_collision() {
    let registry = Registry::new();
    let collider = prometheus::IntGauge::new("blks_processing", "collides").unwrap();
    registry.register(Box::new(collider)).unwrap();

    let mut sm: Topological<TestBlock> = TopologicalFactory.new_engine();
    let err = sm
        .initialize(params(1, 1, 1, 1), genesis_id(), GENESIS_HEIGHT, 0, &registry)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::MetricsRegistration(_)));
}

#[test]
fn two_instances_cannot_share_a_registry() {
    let registry = Registry::new();
    let _sm = engine_with_registry(params(1, 1, 1, 1), &registry);

    let mut second: Topological<TestBlock> = TopologicalFactory.new_engine();
    let err = second
        .initialize(params(1, 1, 1, 1), genesis_id(), GENESIS_HEIGHT, 0, &registry)
        .unwrap_err();
    assert!(matches!(err, ConsensusError::MetricsRegistration(_)));
}

#[test]
fn metrics_track_decisions_and_polls() {
    let registry = Registry::new();
    let mut sm = engine_with_registry(params(1, 1, 1, 1), &registry);
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&genesis, 2);
    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();

    let text = metric_text(&registry);
    assert!(text.contains("blks_processing 2"));

    sm.record_poll(&votes(&[&a])).unwrap();

    let text = metric_text(&registry);
    assert!(text.contains("blks_processing 0"));
    assert!(text.contains("blks_accepted_count 1"));
    assert!(text.contains("blks_rejected_count 1"));
    assert!(text.contains("polls_successful 1"));
    assert!(text.contains("polls_failed 0"));
}

// ═══════════════════════════════════════════════════════════════════════
// Callback failures and poisoning
// ═══════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn error_on_accept_poisons_the_instance() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let block = TestBlock::child(&genesis, 1);
    block.fail_on_accept();
    sm.add(block.clone()).unwrap();

    let err = sm.record_poll(&votes(&[&block])).unwrap_err();
    assert!(matches!(err, ConsensusError::DecisionCallback(_)));

    // Every further call fails fast; the chain must halt.
    let err = sm.record_poll(&votes(&[&block])).unwrap_err();
    assert!(matches!(err, ConsensusError::Poisoned));

    let another = TestBlock::child(&genesis, 2);
    let err = sm.add(another).unwrap_err();
    assert!(matches!(err, ConsensusError::Poisoned));
}

#[test]
fn error_on_reject_sibling_poisons_the_instance() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&genesis, 2);
    b.fail_on_reject();
    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();

    let err = sm.record_poll(&votes(&[&a])).unwrap_err();
    assert!(matches!(err, ConsensusError::DecisionCallback(_)));
    assert_eq!(b.status(), Status::Undecided);

    let err = sm.record_poll(&votes(&[&a])).unwrap_err();
    assert!(matches!(err, ConsensusError::Poisoned));
}

#[test]
fn error_on_transitive_rejection_poisons_the_instance() {
    let mut sm = engine(params(1, 1, 1, 1));
    let genesis = TestBlock::genesis();
    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&genesis, 2);
    let c = TestBlock::child(&b, 1);
    c.fail_on_reject();
    sm.add(a.clone()).unwrap();
    sm.add(b.clone()).unwrap();
    sm.add(c.clone()).unwrap();

    let err = sm.record_poll(&votes(&[&a])).unwrap_err();
    assert!(matches!(err, ConsensusError::DecisionCallback(_)));

    let err = sm.record_poll(&votes(&[&a])).unwrap_err();
    assert!(matches!(err, ConsensusError::Poisoned));
}

// ═══════════════════════════════════════════════════════════════════════
// Safety
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn at_most_one_block_accepted_per_height() {
    let mut sm = engine(params(1, 1, 1, 2));
    let genesis = TestBlock::genesis();
    let siblings: Vec<TestBlock> = (0..4).map(|i| TestBlock::child(&genesis, i)).collect();
    for blk in &siblings {
        sm.add(blk.clone()).unwrap();
    }

    for _ in 0..2 {
        sm.record_poll(&votes(&[&siblings[2]])).unwrap();
    }

    let accepted: Vec<&TestBlock> = siblings
        .iter()
        .filter(|b| b.status() == Status::Accepted)
        .collect();
    assert_eq!(accepted.len(), 1);
    assert_eq!(accepted[0].id(), siblings[2].id());
    assert!(siblings
        .iter()
        .filter(|b| b.id() != siblings[2].id())
        .all(|b| b.status() == Status::Rejected));
}

#[test]
fn health_check_reflects_processing_load() {
    let mut sm = engine(params(1, 1, 1, 10));
    let genesis = TestBlock::genesis();

    let health = sm.health_check();
    assert!(health.healthy);
    assert!(health.finalized);

    let a = TestBlock::child(&genesis, 1);
    let b = TestBlock::child(&a, 1);
    sm.add(a).unwrap();
    sm.add(b).unwrap();

    // optimal_processing is 1; two outstanding blocks is over target.
    let health = sm.health_check();
    assert!(!health.finalized);
    assert!(!health.healthy);
    assert_eq!(health.processing, 2);
}
