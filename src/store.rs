//! Storage seams for blocks and cases, plus an in-memory implementation.
//!
//! Every method returns `Result`: a failing store is an error, never an empty
//! answer.  `Ok(None)` from [`BlockStore::last_block`] is the only signal that
//! a case has no chain yet.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::block::{Block, Case, CaseUpdate, CaseWrite};
use crate::error::{CustodyError, Result};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Append-only block log.  Per-case order is append order.
pub trait BlockStore {
    fn last_block(&self, case_id: &str) -> Result<Option<Block>>;
    /// Append a block.  Rejects a block whose id is already stored.
    fn append_block(&self, block: &Block) -> Result<()>;
    fn blocks_for_case(&self, case_id: &str) -> Result<Vec<Block>>;
    fn all_blocks(&self) -> Result<Vec<Block>>;
}

pub trait CaseStore {
    fn get_case(&self, case_id: &str) -> Result<Option<Case>>;
    fn insert_case(&self, case: &Case) -> Result<()>;
    fn update_case(&self, case_id: &str, update: &CaseUpdate) -> Result<Case>;
    fn all_cases(&self) -> Result<Vec<Case>>;
}

/// A store that can append a block and write its case as one unit.
pub trait CustodyStore: BlockStore + CaseStore {
    /// Append `block` and apply `write` atomically.
    ///
    /// `parent_id` is the id of the block `block` links to (`None` for a
    /// genesis block).  If the case tail no longer matches it, nothing is
    /// written and [`CustodyError::Conflict`] is returned.
    fn commit(&self, block: &Block, parent_id: Option<&str>, write: &CaseWrite) -> Result<Case>;
}

pub(crate) fn check_commit_shape(block: &Block, write: &CaseWrite) -> Result<()> {
    if block.case_id != write.case_id() {
        return Err(CustodyError::Validation(format!(
            "block case {} does not match case write {}",
            block.case_id,
            write.case_id()
        )));
    }
    Ok(())
}

pub(crate) fn check_parent(case_id: &str, tail_id: Option<&str>, parent_id: Option<&str>) -> Result<()> {
    if tail_id != parent_id {
        return Err(CustodyError::Conflict(format!(
            "case {case_id} tail is {} but block links to {}",
            tail_id.unwrap_or("<empty>"),
            parent_id.unwrap_or("<genesis>")
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    blocks: Vec<Block>,
    cases: Vec<Case>,
}

/// Process-local store.  Useful for tests and embedding.
///
/// [`MemoryStore::set_unavailable`] makes every call fail with
/// [`CustodyError::Store`] to exercise outage handling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CustodyError::Store("memory store unavailable".into()));
        }
        Ok(())
    }

    /// Overwrite a stored block in place, bypassing append-only rules.
    ///
    /// Simulates out-of-band alteration of history; returns `false` if no
    /// block has that id.
    pub fn tamper_block<F: FnOnce(&mut Block)>(&self, block_id: &str, f: F) -> bool {
        let mut state = self.state.lock();
        match state.blocks.iter_mut().find(|b| b.id == block_id) {
            Some(b) => {
                f(b);
                true
            }
            None => false,
        }
    }
}

fn tail_id<'a>(blocks: &'a [Block], case_id: &str) -> Option<&'a str> {
    blocks
        .iter()
        .rev()
        .find(|b| b.case_id == case_id)
        .map(|b| b.id.as_str())
}

fn push_unique(state: &mut MemoryState, block: &Block) -> Result<()> {
    if state.blocks.iter().any(|b| b.id == block.id) {
        return Err(CustodyError::Validation(format!("duplicate block id {}", block.id)));
    }
    state.blocks.push(block.clone());
    Ok(())
}

fn update_in(state: &mut MemoryState, case_id: &str, update: &CaseUpdate) -> Result<Case> {
    let case = state
        .cases
        .iter_mut()
        .find(|c| c.id == case_id)
        .ok_or_else(|| CustodyError::NotFound(format!("case {case_id}")))?;
    case.apply(update);
    Ok(case.clone())
}

impl BlockStore for MemoryStore {
    fn last_block(&self, case_id: &str) -> Result<Option<Block>> {
        self.guard()?;
        let state = self.state.lock();
        Ok(state.blocks.iter().rev().find(|b| b.case_id == case_id).cloned())
    }

    fn append_block(&self, block: &Block) -> Result<()> {
        self.guard()?;
        push_unique(&mut self.state.lock(), block)
    }

    fn blocks_for_case(&self, case_id: &str) -> Result<Vec<Block>> {
        self.guard()?;
        let state = self.state.lock();
        Ok(state
            .blocks
            .iter()
            .filter(|b| b.case_id == case_id)
            .cloned()
            .collect())
    }

    fn all_blocks(&self) -> Result<Vec<Block>> {
        self.guard()?;
        Ok(self.state.lock().blocks.clone())
    }
}

impl CaseStore for MemoryStore {
    fn get_case(&self, case_id: &str) -> Result<Option<Case>> {
        self.guard()?;
        let state = self.state.lock();
        Ok(state.cases.iter().find(|c| c.id == case_id).cloned())
    }

    fn insert_case(&self, case: &Case) -> Result<()> {
        self.guard()?;
        let mut state = self.state.lock();
        if state.cases.iter().any(|c| c.id == case.id) {
            return Err(CustodyError::Conflict(format!("case {} already exists", case.id)));
        }
        state.cases.push(case.clone());
        Ok(())
    }

    fn update_case(&self, case_id: &str, update: &CaseUpdate) -> Result<Case> {
        self.guard()?;
        update_in(&mut self.state.lock(), case_id, update)
    }

    fn all_cases(&self) -> Result<Vec<Case>> {
        self.guard()?;
        Ok(self.state.lock().cases.clone())
    }
}

impl CustodyStore for MemoryStore {
    fn commit(&self, block: &Block, parent_id: Option<&str>, write: &CaseWrite) -> Result<Case> {
        self.guard()?;
        check_commit_shape(block, write)?;

        let mut state = self.state.lock();
        check_parent(&block.case_id, tail_id(&state.blocks, &block.case_id), parent_id)?;
        if state.blocks.iter().any(|b| b.id == block.id) {
            return Err(CustodyError::Validation(format!("duplicate block id {}", block.id)));
        }

        // The block is pushed last: any failure above leaves state untouched.
        let case = match write {
            CaseWrite::Create(case) => {
                if state.cases.iter().any(|c| c.id == case.id) {
                    return Err(CustodyError::Conflict(format!("case {} already exists", case.id)));
                }
                state.cases.push(case.clone());
                case.clone()
            }
            CaseWrite::Update { case_id, update } => update_in(&mut state, case_id, update)?,
        };
        state.blocks.push(block.clone());
        Ok(case)
    }
}
