//! Topological consensus engine.
//!
//! The engine owns the conflict trie rooted at the last accepted block.
//! `add` threads new blocks into the trie, splitting unary segments into
//! binary forks where sibling IDs diverge; `record_poll` aggregates a
//! vote multiset over the trie, advances the per-node decisions, and
//! cascades accept/reject callbacks once a branch finalizes.

use std::collections::HashMap;

use glacia_types::{Bag, BlockId, Status};
use prometheus::Registry;
use tracing::{debug, info, warn};

use crate::block::Block;
use crate::consensus::Health;
use crate::error::ConsensusError;
use crate::metrics::Metrics;
use crate::params::Parameters;
use crate::snowball::UnaryDecision;
use crate::tree::{Arena, BinaryNode, ConsensusNode, NodeRef, UnaryNode};

/// A processing block and its position in the trie.
struct BlockEntry<B> {
    block: B,
    node: NodeRef,
}

/// The chain consensus instance.
///
/// Single-threaded by design: the owning chain's message loop serializes
/// `add` and `record_poll` under its own lock, so the engine holds no
/// internal synchronization.
pub struct Topological<B: Block> {
    params: Parameters,
    metrics: Option<Metrics>,

    /// Node storage for the conflict trie.
    arena: Arena,
    /// Top of the trie; conceptually the last accepted block.
    root: NodeRef,

    /// Processing blocks by ID.
    blocks: HashMap<BlockId, BlockEntry<B>>,
    /// Terminal decisions for every block this instance has decided,
    /// including the block it was initialized from.
    decided: HashMap<BlockId, Status>,
    /// Accepted block per height, for historical preference lookups.
    accepted_heights: HashMap<u64, BlockId>,
    /// Preferred processing block per height, refreshed after each poll.
    preferred_heights: HashMap<u64, BlockId>,

    /// Tail of the preferred chain.
    preference: BlockId,
    last_accepted: BlockId,
    last_accepted_height: u64,
    last_accepted_time: u64,

    /// Set when a decision callback fails mid-cascade; the instance must
    /// not be used afterwards.
    poisoned: bool,
}

impl<B: Block> Default for Topological<B> {
    fn default() -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(ConsensusNode::Unary(UnaryNode::new(Vec::new())));
        Self {
            params: Parameters::default(),
            metrics: None,
            arena,
            root,
            blocks: HashMap::new(),
            decided: HashMap::new(),
            accepted_heights: HashMap::new(),
            preferred_heights: HashMap::new(),
            preference: BlockId::ZERO,
            last_accepted: BlockId::ZERO,
            last_accepted_height: 0,
            last_accepted_time: 0,
            poisoned: false,
        }
    }
}

impl<B: Block> Topological<B> {
    /// Initialize the instance from the last accepted block.
    ///
    /// Validates `params`, registers the metric set with `registry`, and
    /// resets all consensus state. A metric name collision is a fatal
    /// error: the chain must not start on this instance.
    pub fn initialize(
        &mut self,
        params: Parameters,
        last_accepted_id: BlockId,
        last_accepted_height: u64,
        last_accepted_time: u64,
        registry: &Registry,
    ) -> Result<(), ConsensusError> {
        params.verify()?;
        let metrics = Metrics::register(registry)?;

        *self = Self::default();
        self.params = params;
        self.metrics = Some(metrics);
        self.last_accepted = last_accepted_id;
        self.last_accepted_height = last_accepted_height;
        self.last_accepted_time = last_accepted_time;
        self.preference = last_accepted_id;
        self.decided.insert(last_accepted_id, Status::Accepted);
        self.accepted_heights
            .insert(last_accepted_height, last_accepted_id);

        info!(
            last_accepted = %last_accepted_id,
            height = last_accepted_height,
            "initialized consensus instance"
        );
        Ok(())
    }

    /// The parameters this instance was initialized with.
    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    /// Issue a block into consensus.
    ///
    /// The parent must be processing or be the last accepted block;
    /// anything else (unknown, historical, or already rejected) fails
    /// with [`ConsensusError::UnknownParentBlock`].
    pub fn add(&mut self, block: B) -> Result<(), ConsensusError> {
        if self.poisoned {
            return Err(ConsensusError::Poisoned);
        }

        let id = block.id();
        if self.blocks.contains_key(&id) || self.decided.contains_key(&id) {
            return Err(ConsensusError::DuplicateBlock(id));
        }

        let parent = block.parent();
        let height = block.height();
        let node = if parent == self.last_accepted {
            self.insert_at_root(id)
        } else if let Some(parent_node) = self.blocks.get(&parent).map(|e| e.node) {
            self.insert_below(parent_node, parent, id)
        } else {
            return Err(ConsensusError::UnknownParentBlock { block: id, parent });
        };

        // A block extending the preferred tail becomes the new tail; no
        // other insertion can move the preferred path.
        if parent == self.preference {
            self.preferred_heights.insert(height, id);
            self.preference = id;
        }

        self.blocks.insert(id, BlockEntry { block, node });
        if let Some(m) = &self.metrics {
            m.processing.set(self.blocks.len() as i64);
        }

        debug!(block = %id, parent = %parent, height, "added block");
        Ok(())
    }

    /// Record the result of one network poll.
    ///
    /// Votes for unknown block IDs are dropped. Each remaining vote
    /// counts exactly once toward every trie node on its path to the
    /// root; nodes whose aggregated count clears the alpha thresholds
    /// advance, and any branch whose path to the root becomes fully
    /// finalized is accepted, rejecting its competitors transitively.
    pub fn record_poll(&mut self, votes: &Bag<BlockId>) -> Result<(), ConsensusError> {
        if self.poisoned {
            return Err(ConsensusError::Poisoned);
        }

        // Per-node direct vote counts; unknown votes are not an error.
        let mut direct: HashMap<NodeRef, u64> = HashMap::new();
        for (id, count) in votes.iter() {
            if let Some(entry) = self.blocks.get(id) {
                *direct.entry(entry.node).or_insert(0) += count;
            }
        }

        let mut progress = false;
        let root = self.root;
        self.apply_votes(root, &direct, &mut progress);

        if let Some(m) = &self.metrics {
            if progress {
                m.polls_successful.inc();
            } else {
                m.polls_failed.inc();
            }
        }
        debug!(successful = progress, votes = votes.len(), "recorded poll");

        self.resolve_decided()?;

        self.refresh_preference();
        if let Some(m) = &self.metrics {
            m.processing.set(self.blocks.len() as i64);
        }
        Ok(())
    }

    /// Tail of the currently preferred chain.
    pub fn preference(&self) -> BlockId {
        self.preference
    }

    /// The block on the preferred path at `height`, accepted history
    /// included. `None` if no block has reached that height or the path
    /// there was rejected.
    pub fn preference_at_height(&self, height: u64) -> Option<BlockId> {
        if height <= self.last_accepted_height {
            return self.accepted_heights.get(&height).copied();
        }
        self.preferred_heights.get(&height).copied()
    }

    /// Whether `id` lies on the preferred chain, accepted history
    /// included.
    pub fn is_preferred(&self, id: &BlockId) -> bool {
        if self.decided.get(id) == Some(&Status::Accepted) {
            return true;
        }
        match self.blocks.get(id) {
            Some(entry) => self.preferred_heights.get(&entry.block.height()) == Some(id),
            None => false,
        }
    }

    /// Number of currently processing blocks.
    pub fn num_processing(&self) -> usize {
        self.blocks.len()
    }

    /// Whether `id` is currently processing.
    pub fn processing(&self, id: &BlockId) -> bool {
        self.blocks.contains_key(id)
    }

    /// The last accepted block and its height.
    pub fn last_accepted(&self) -> (BlockId, u64) {
        (self.last_accepted, self.last_accepted_height)
    }

    /// Timestamp of the block this instance was initialized from.
    pub fn last_accepted_time(&self) -> u64 {
        self.last_accepted_time
    }

    /// Whether every issued block has been decided.
    pub fn finalized(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Health snapshot for the node's health service.
    pub fn health_check(&self) -> Health {
        let processing = self.blocks.len();
        let finalized = processing == 0;
        Health {
            processing,
            preference: self.preference,
            finalized,
            healthy: finalized || processing <= self.params.optimal_processing,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Trie maintenance
    // ═══════════════════════════════════════════════════════════════════

    /// Insert a child of the last accepted block.
    fn insert_at_root(&mut self, id: BlockId) -> NodeRef {
        let root = self.root;
        let segment = match self.arena.get(root) {
            ConsensusNode::Unary(seg) => seg
                .blocks
                .first()
                .map(|head| (*head, seg.decision.clone())),
            ConsensusNode::Binary(_) => return self.insert_into_fork(root, id),
        };

        match segment {
            // Fresh root segment: the block extends the accepted chain.
            None => {
                if let ConsensusNode::Unary(seg) = self.arena.get_mut(root) {
                    seg.blocks.push(id);
                }
                root
            }
            // The block conflicts with the whole root segment: fork
            // above it.
            Some((head, decision)) => {
                let bit = head
                    .first_difference(&id)
                    .expect("sibling ids are distinct");
                let fork_decision = decision.extend(head.bit(bit));
                let branch = self
                    .arena
                    .insert(ConsensusNode::Unary(UnaryNode::new(vec![id])));
                let mut children = [root; 2];
                children[id.bit(bit) as usize] = branch;
                self.root = self.arena.insert(ConsensusNode::Binary(BinaryNode {
                    bit,
                    decision: fork_decision,
                    children,
                }));
                branch
            }
        }
    }

    /// Insert a child of a processing block living in segment `seg_ref`.
    fn insert_below(&mut self, seg_ref: NodeRef, parent: BlockId, id: BlockId) -> NodeRef {
        let ConsensusNode::Unary(seg) = self.arena.get(seg_ref) else {
            unreachable!("blocks live in unary segments");
        };
        let pos = seg
            .blocks
            .iter()
            .position(|b| *b == parent)
            .expect("parent indexed in its segment");
        let last = pos + 1 == seg.blocks.len();
        let child = seg.child;

        if last {
            match child {
                // Unconflicted extension of the segment.
                None => {
                    if let ConsensusNode::Unary(seg) = self.arena.get_mut(seg_ref) {
                        seg.blocks.push(id);
                    }
                    seg_ref
                }
                // The parent already forks; the block is a new sibling
                // branch in that fork.
                Some(fork) => self.insert_into_fork(fork, id),
            }
        } else {
            self.split_segment(seg_ref, pos, id)
        }
    }

    /// Split a segment at a mid-segment parent: the suffix below `pos`
    /// becomes one branch of a new fork, the new block the other.
    fn split_segment(&mut self, seg_ref: NodeRef, pos: usize, id: BlockId) -> NodeRef {
        let (tail_blocks, tail_child, decision) = {
            let ConsensusNode::Unary(seg) = self.arena.get_mut(seg_ref) else {
                unreachable!("blocks live in unary segments");
            };
            let tail_blocks = seg.blocks.split_off(pos + 1);
            let tail_child = seg.child.take();
            (tail_blocks, tail_child, seg.decision.clone())
        };

        let tail_head = tail_blocks[0];
        let bit = tail_head
            .first_difference(&id)
            .expect("sibling ids are distinct");
        let fork_decision = decision.extend(tail_head.bit(bit));

        let tail_ref = self.arena.insert(ConsensusNode::Unary(UnaryNode {
            blocks: tail_blocks,
            decision,
            child: tail_child,
        }));
        // Re-point the moved blocks at their new segment.
        if let ConsensusNode::Unary(tail) = self.arena.get(tail_ref) {
            for moved in &tail.blocks {
                self.blocks
                    .get_mut(moved)
                    .expect("segment block is processing")
                    .node = tail_ref;
            }
        }

        let branch = self
            .arena
            .insert(ConsensusNode::Unary(UnaryNode::new(vec![id])));
        let mut children = [tail_ref; 2];
        children[id.bit(bit) as usize] = branch;
        let fork = self.arena.insert(ConsensusNode::Binary(BinaryNode {
            bit,
            decision: fork_decision,
            children,
        }));

        if let ConsensusNode::Unary(seg) = self.arena.get_mut(seg_ref) {
            seg.child = Some(fork);
        }
        branch
    }

    /// Insert a new sibling branch into an existing fork trie.
    ///
    /// Descends by the new ID's bits at each fork until reaching the
    /// branch the block conflicts with, then splits that branch at the
    /// first bit where the two IDs diverge. That bit is disjoint from
    /// every bit on the descent path, since both IDs agree on those.
    fn insert_into_fork(&mut self, fork: NodeRef, id: BlockId) -> NodeRef {
        enum Step {
            Descend(usize, [NodeRef; 2]),
            Split(BlockId, UnaryDecision),
        }

        let mut parent_ref = fork;
        let mut parent_slot = 0usize;
        let mut cur = fork;
        loop {
            let step = match self.arena.get(cur) {
                ConsensusNode::Binary(b) => Step::Descend(b.bit, b.children),
                ConsensusNode::Unary(seg) => {
                    Step::Split(seg.blocks[0], seg.decision.clone())
                }
            };
            match step {
                Step::Descend(bit, children) => {
                    let slot = id.bit(bit) as usize;
                    parent_ref = cur;
                    parent_slot = slot;
                    cur = children[slot];
                }
                Step::Split(head, decision) => {
                    let bit = head
                        .first_difference(&id)
                        .expect("sibling ids are distinct");
                    let fork_decision = decision.extend(head.bit(bit));
                    let branch = self
                        .arena
                        .insert(ConsensusNode::Unary(UnaryNode::new(vec![id])));
                    let mut children = [cur; 2];
                    children[id.bit(bit) as usize] = branch;
                    let split = self.arena.insert(ConsensusNode::Binary(BinaryNode {
                        bit,
                        decision: fork_decision,
                        children,
                    }));
                    if let ConsensusNode::Binary(parent) = self.arena.get_mut(parent_ref) {
                        parent.children[parent_slot] = split;
                    }
                    return branch;
                }
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Polling
    // ═══════════════════════════════════════════════════════════════════

    /// Aggregate subtree vote counts bottom-up and feed them into each
    /// touched node's decision.
    ///
    /// Child counts are summed into parents exactly once per vote, so a
    /// descendant's vote never inflates an ancestor's count more than
    /// once per poll, however many voted blocks share that ancestor.
    fn apply_votes(
        &mut self,
        r: NodeRef,
        direct: &HashMap<NodeRef, u64>,
        progress: &mut bool,
    ) -> u64 {
        enum Shape {
            Unary(Option<NodeRef>),
            Binary([NodeRef; 2]),
        }
        let shape = match self.arena.get(r) {
            ConsensusNode::Unary(seg) => Shape::Unary(seg.child),
            ConsensusNode::Binary(b) => Shape::Binary(b.children),
        };

        match shape {
            Shape::Unary(child) => {
                let below = child
                    .map(|c| self.apply_votes(c, direct, progress))
                    .unwrap_or(0);
                let count = below + direct.get(&r).copied().unwrap_or(0);
                if count > 0 {
                    let params = self.params;
                    if let ConsensusNode::Unary(seg) = self.arena.get_mut(r) {
                        *progress |= seg.decision.record_votes(&params, count);
                    }
                }
                count
            }
            Shape::Binary(children) => {
                let votes0 = self.apply_votes(children[0], direct, progress);
                let votes1 = self.apply_votes(children[1], direct, progress);
                if votes0 + votes1 > 0 {
                    let params = self.params;
                    if let ConsensusNode::Binary(b) = self.arena.get_mut(r) {
                        *progress |= b.decision.record_votes(&params, [votes0, votes1]);
                    }
                }
                votes0 + votes1
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Finalization cascade
    // ═══════════════════════════════════════════════════════════════════

    /// Resolve finalized decisions at the top of the trie.
    ///
    /// A finalized root segment accepts its blocks in ascending height
    /// order; a finalized root fork rejects the losing branch's entire
    /// subtree and promotes the winner. Repeats until the top of the
    /// trie is undecided.
    fn resolve_decided(&mut self) -> Result<(), ConsensusError> {
        enum Resolution {
            Pending,
            AcceptSegment {
                ids: Vec<BlockId>,
                child: Option<NodeRef>,
            },
            ResolveFork {
                winner: NodeRef,
                loser: NodeRef,
            },
        }

        loop {
            let root = self.root;
            let resolution = match self.arena.get(root) {
                ConsensusNode::Unary(seg) => {
                    if seg.decision.finalized() && !seg.blocks.is_empty() {
                        Resolution::AcceptSegment {
                            ids: seg.blocks.clone(),
                            child: seg.child,
                        }
                    } else {
                        Resolution::Pending
                    }
                }
                ConsensusNode::Binary(b) => {
                    if b.decision.finalized() {
                        let preference = b.decision.preference();
                        Resolution::ResolveFork {
                            winner: b.children[preference],
                            loser: b.children[1 - preference],
                        }
                    } else {
                        Resolution::Pending
                    }
                }
            };

            match resolution {
                Resolution::Pending => break,
                Resolution::AcceptSegment { ids, child } => {
                    for id in ids {
                        self.accept_block(id)?;
                    }
                    match child {
                        Some(next) => {
                            self.arena.remove(root);
                            self.root = next;
                        }
                        None => {
                            // Nothing processing remains below; restart
                            // the frontier segment.
                            if let ConsensusNode::Unary(seg) = self.arena.get_mut(root) {
                                seg.blocks.clear();
                                seg.decision = UnaryDecision::new();
                            }
                            break;
                        }
                    }
                }
                Resolution::ResolveFork { winner, loser } => {
                    self.reject_subtree(loser)?;
                    self.arena.remove(root);
                    self.root = winner;
                }
            }
        }
        Ok(())
    }

    /// Accept one block and advance the accepted frontier.
    fn accept_block(&mut self, id: BlockId) -> Result<(), ConsensusError> {
        let mut entry = self
            .blocks
            .remove(&id)
            .expect("accepted block is processing");
        let height = entry.block.height();

        if let Err(err) = entry.block.accept() {
            self.poisoned = true;
            warn!(block = %id, height, "accept callback failed, poisoning instance");
            return Err(ConsensusError::DecisionCallback(err));
        }

        self.decided.insert(id, Status::Accepted);
        self.accepted_heights.insert(height, id);
        self.last_accepted = id;
        self.last_accepted_height = height;
        if let Some(m) = &self.metrics {
            m.accepted.inc();
        }
        info!(block = %id, height, "accepted block");
        Ok(())
    }

    /// Reject every block in a losing subtree.
    ///
    /// Order within the subtree is unspecified; every descendant of a
    /// rejected block is moot regardless.
    fn reject_subtree(&mut self, start: NodeRef) -> Result<(), ConsensusError> {
        let mut stack = vec![start];
        while let Some(r) = stack.pop() {
            match self.arena.remove(r) {
                ConsensusNode::Unary(seg) => {
                    if let Some(child) = seg.child {
                        stack.push(child);
                    }
                    for id in seg.blocks {
                        self.reject_block(id)?;
                    }
                }
                ConsensusNode::Binary(b) => {
                    stack.push(b.children[0]);
                    stack.push(b.children[1]);
                }
            }
        }
        Ok(())
    }

    /// Reject one block.
    fn reject_block(&mut self, id: BlockId) -> Result<(), ConsensusError> {
        let mut entry = self
            .blocks
            .remove(&id)
            .expect("rejected block is processing");

        if let Err(err) = entry.block.reject() {
            self.poisoned = true;
            warn!(block = %id, "reject callback failed, poisoning instance");
            return Err(ConsensusError::DecisionCallback(err));
        }

        self.decided.insert(id, Status::Rejected);
        if let Some(m) = &self.metrics {
            m.rejected.inc();
        }
        debug!(block = %id, "rejected block");
        Ok(())
    }

    /// Recompute the preferred path cache from the trie.
    fn refresh_preference(&mut self) {
        self.preferred_heights.clear();
        let mut tip = self.last_accepted;
        let mut cur = self.root;
        loop {
            match self.arena.get(cur) {
                ConsensusNode::Unary(seg) => {
                    for id in &seg.blocks {
                        let height = self.blocks[id].block.height();
                        self.preferred_heights.insert(height, *id);
                        tip = *id;
                    }
                    match seg.child {
                        Some(child) => cur = child,
                        None => break,
                    }
                }
                ConsensusNode::Binary(b) => {
                    cur = b.children[b.decision.preference()];
                }
            }
        }
        self.preference = tip;
    }
}
