//! Test helpers: rigged in-memory blocks.
//!
//! `TestBlock` is a shared-handle block whose decision callbacks can be
//! made to fail, so tests can observe cascades and poisoning without a
//! real VM behind the engine.

use std::cell::RefCell;
use std::rc::Rc;

use glacia_types::{BlockId, Status};

use crate::block::{Block, CallbackError, Decidable};

/// Height of the conventional test genesis block.
pub const GENESIS_HEIGHT: u64 = 0;

/// The conventional test genesis ID.
pub fn genesis_id() -> BlockId {
    BlockId::from_bytes(b"genesis")
}

struct Inner {
    id: BlockId,
    parent: BlockId,
    height: u64,
    status: Status,
    fail_accept: bool,
    fail_reject: bool,
}

/// An in-memory block with shared, observable state.
///
/// Clones share the same underlying state, so a test can keep a handle
/// while the engine owns another and still observe status transitions.
#[derive(Clone)]
pub struct TestBlock {
    inner: Rc<RefCell<Inner>>,
}

impl TestBlock {
    /// Create a block with an explicit identity and linkage.
    pub fn new(id: BlockId, parent: BlockId, height: u64) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id,
                parent,
                height,
                status: Status::Undecided,
                fail_accept: false,
                fail_reject: false,
            })),
        }
    }

    /// The conventional test genesis block.
    pub fn genesis() -> Self {
        Self::new(genesis_id(), BlockId::ZERO, GENESIS_HEIGHT)
    }

    /// Build a child of `parent` with an ID derived from `seed`.
    pub fn child(parent: &TestBlock, seed: u64) -> Self {
        let parent_id = parent.id();
        let mut bytes = Vec::with_capacity(40);
        bytes.extend_from_slice(parent_id.as_bytes());
        bytes.extend_from_slice(&seed.to_le_bytes());
        Self::new(
            BlockId::from_bytes(&bytes),
            parent_id,
            parent.height() + 1,
        )
    }

    /// Build a child of `parent` with an explicitly chosen ID, for tests
    /// that need control over divergence bits.
    pub fn child_with_id(parent: &TestBlock, id: BlockId) -> Self {
        Self::new(id, parent.id(), parent.height() + 1)
    }

    /// Make the next `accept` call fail.
    pub fn fail_on_accept(&self) {
        self.inner.borrow_mut().fail_accept = true;
    }

    /// Make the next `reject` call fail.
    pub fn fail_on_reject(&self) {
        self.inner.borrow_mut().fail_reject = true;
    }
}

impl Decidable for TestBlock {
    fn id(&self) -> BlockId {
        self.inner.borrow().id
    }

    fn status(&self) -> Status {
        self.inner.borrow().status
    }

    fn accept(&mut self) -> Result<(), CallbackError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_accept {
            return Err("rigged accept failure".into());
        }
        assert_eq!(
            inner.status,
            Status::Undecided,
            "block {} decided twice",
            inner.id
        );
        inner.status = Status::Accepted;
        Ok(())
    }

    fn reject(&mut self) -> Result<(), CallbackError> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_reject {
            return Err("rigged reject failure".into());
        }
        assert_eq!(
            inner.status,
            Status::Undecided,
            "block {} decided twice",
            inner.id
        );
        inner.status = Status::Rejected;
        Ok(())
    }
}

impl Block for TestBlock {
    fn parent(&self) -> BlockId {
        self.inner.borrow().parent
    }

    fn height(&self) -> u64 {
        self.inner.borrow().height
    }
}

/// Build an ID with exactly the given bits set, for divergence-bit
/// control in trie tests.
pub fn id_with_bits(bits: &[usize]) -> BlockId {
    let mut bytes = [0u8; 32];
    for &bit in bits {
        assert!(bit < BlockId::NUM_BITS);
        bytes[bit / 8] |= 1 << (bit % 8);
    }
    BlockId::new(bytes)
}
