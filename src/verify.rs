//! Chain verification and cross-case integrity aggregation.
//!
//! Both entry points are total: every problem is reported as a
//! [`ChainFinding`], nothing is raised.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::block::{Block, GENESIS_PREV_HASH};
use crate::canonical::{self, Encoding};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// First block does not carry the genesis back-link.
    Genesis,
    /// Back-link does not match the preceding block: tamper or fork.
    Linkage,
    /// A required field is empty.
    Structural,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainFinding {
    /// 0-based position in the verified sequence.
    pub index: usize,
    pub kind: FindingKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub block_count: usize,
    pub findings: Vec<ChainFinding>,
}

impl ChainReport {
    /// Index of the first back-link failure, if any.
    pub fn first_break(&self) -> Option<usize> {
        self.findings
            .iter()
            .find(|f| f.kind != FindingKind::Structural)
            .map(|f| f.index)
    }
}

fn required_fields(b: &Block) -> [(&str, &'static str); 7] {
    [
        (b.id.as_str(), "missing block id"),
        (b.case_id.as_str(), "missing case id"),
        (b.from.as_str(), "missing sender"),
        (b.to.as_str(), "missing recipient"),
        (b.timestamp.as_str(), "missing timestamp"),
        (b.file_hash.as_str(), "missing file hash"),
        (b.action.as_str(), "missing action"),
    ]
}

/// Replay one case's blocks in stored order.
pub fn verify_chain<'a, I>(blocks: I, encoding: Encoding) -> ChainReport
where
    I: IntoIterator<Item = &'a Block>,
{
    let mut findings = Vec::new();
    let mut prev: Option<&Block> = None;
    let mut count = 0usize;

    for (i, block) in blocks.into_iter().enumerate() {
        count += 1;
        match prev {
            None => {
                if block.previous_hash != GENESIS_PREV_HASH {
                    findings.push(ChainFinding {
                        index: i,
                        kind: FindingKind::Genesis,
                        message: "genesis block should have previous hash of 0".into(),
                    });
                }
            }
            Some(p) => {
                if block.previous_hash != canonical::block_hash(p, encoding) {
                    findings.push(ChainFinding {
                        index: i,
                        kind: FindingKind::Linkage,
                        message: format!(
                            "block #{} has invalid previous hash link — possible tampering",
                            i + 1
                        ),
                    });
                }
            }
        }

        for (value, message) in required_fields(block) {
            if value.is_empty() {
                findings.push(ChainFinding {
                    index: i,
                    kind: FindingKind::Structural,
                    message: message.into(),
                });
            }
        }
        prev = Some(block);
    }

    ChainReport {
        valid: findings.is_empty(),
        block_count: count,
        findings,
    }
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegritySummary {
    pub total_blocks: usize,
    pub total_cases: usize,
    pub verified_chains: usize,
    pub tampered_chains: usize,
}

fn partition(blocks: &[Block]) -> HashMap<&str, Vec<&Block>> {
    let mut by_case: HashMap<&str, Vec<&Block>> = HashMap::new();
    for b in blocks {
        by_case.entry(b.case_id.as_str()).or_default().push(b);
    }
    by_case
}

/// Verify every case present in `blocks`, keyed by case id.
///
/// Per-case order is the order blocks appear in `blocks`.
pub fn audit_all(blocks: &[Block], encoding: Encoding) -> BTreeMap<String, ChainReport> {
    partition(blocks)
        .into_iter()
        .map(|(case_id, chain)| {
            (
                case_id.to_string(),
                verify_chain(chain.iter().copied(), encoding),
            )
        })
        .collect()
}

pub fn integrity_summary(blocks: &[Block], encoding: Encoding) -> IntegritySummary {
    let mut summary = IntegritySummary {
        total_blocks: blocks.len(),
        ..Default::default()
    };
    for chain in partition(blocks).into_values() {
        summary.total_cases += 1;
        if verify_chain(chain.iter().copied(), encoding).valid {
            summary.verified_chains += 1;
        } else {
            summary.tampered_chains += 1;
        }
    }
    summary
}
