//! Custody operations over a [`CustodyStore`].
//!
//! Every append runs under the per-case lock: load the case, derive the draft
//! and case update from that copy, read the tail, build the block, then commit
//! block and case write as one unit with the tail id as the expected parent.
//! Two writers on the same case can therefore never both link to the same
//! tail, and no write is computed from a case another writer has since
//! changed.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::block::{
    Block, BlockDraft, Case, CaseDetails, CaseStatus, CaseUpdate, CaseWrite, EvidenceFile,
    HospitalReport, LabReport,
};
use crate::builder::ChainBuilder;
use crate::canonical::Encoding;
use crate::error::{CustodyError, OptionExt as _, Result};
use crate::signing::{self, SignatureCheck, Signer};
use crate::store::CustodyStore;
use crate::util;
use crate::verify::{self, ChainReport, IntegritySummary};

pub const HOLDER_SYSTEM: &str = "System";
pub const HOLDER_POLICE: &str = "Police";
pub const HOLDER_LAB: &str = "Lab";
pub const HOLDER_HOSPITAL: &str = "Hospital";
pub const HOLDER_COURT: &str = "Court";

/// What a transfer does to the case status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransferStatusPolicy {
    /// Every transfer sets `in-progress`, even out of `verified` or `closed`.
    #[default]
    AlwaysInProgress,
    /// `verified` and `closed` cases keep their status across transfers.
    PreserveTerminal,
}

impl TransferStatusPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlwaysInProgress => "always-in-progress",
            Self::PreserveTerminal => "preserve-terminal",
        }
    }

    fn status_after_transfer(&self, current: CaseStatus) -> Option<CaseStatus> {
        match self {
            Self::PreserveTerminal if current.is_terminal() => None,
            _ => Some(CaseStatus::InProgress),
        }
    }
}

impl std::str::FromStr for TransferStatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "always-in-progress" => Ok(Self::AlwaysInProgress),
            "preserve-terminal" => Ok(Self::PreserveTerminal),
            other => Err(format!("unknown transfer status policy '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct NewCase {
    /// Generated when `None`.
    pub case_id: Option<String>,
    pub title: String,
    pub description: String,
    pub details: CaseDetails,
    pub evidence_files: Vec<EvidenceFile>,
}

#[derive(Debug, Clone, Default)]
pub struct LabFindings {
    pub test_performed: String,
    pub findings: String,
    pub report_file: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MedicalFindings {
    pub medical_details: String,
    pub post_mortem: Option<String>,
    pub report_file: Option<String>,
}

/// A committed block together with the case state written alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub case: Case,
    pub block: Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureReport {
    pub index: usize,
    pub block_id: String,
    pub action: String,
    pub check: SignatureCheck,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub case_id: String,
    pub chain_holder: String,
    pub previous_holder: String,
    pub repaired: bool,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

pub struct CustodyService<S> {
    store: S,
    builder: ChainBuilder,
    policy: TransferStatusPolicy,
    case_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S> std::fmt::Debug for CustodyService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyService")
            .field("encoding", &self.builder.encoding())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<S: CustodyStore> CustodyService<S> {
    pub fn new(store: S, encoding: Encoding) -> Self {
        Self {
            store,
            builder: ChainBuilder::new(encoding),
            policy: TransferStatusPolicy::default(),
            case_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: TransferStatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn encoding(&self) -> Encoding {
        self.builder.encoding()
    }

    pub fn policy(&self) -> TransferStatusPolicy {
        self.policy
    }

    /// Run `f` while holding the lock for `case_id`.
    ///
    /// The map entry is dropped again once no other caller holds or waits on
    /// it, so the map only holds cases with work in flight.
    fn with_case_lock<T>(&self, case_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self
            .case_locks
            .lock()
            .entry(case_id.to_string())
            .or_default()
            .clone();
        let out = {
            let _guard = lock.lock();
            f()
        };

        // Handles are only released under the map lock, so the last one out
        // sees the map's reference alone.
        let mut locks = self.case_locks.lock();
        drop(lock);
        if locks.get(case_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(case_id);
        }
        out
    }

    fn load_case(&self, case_id: &str) -> Result<Case> {
        self.store
            .get_case(case_id)?
            .required_found(&format!("case {case_id}"))
    }

    /// Build and commit the next block for `case_id`.
    ///
    /// Callers hold the case lock and have read the case under it.  `write`
    /// sees the built block so report fields can carry its timestamp and
    /// signature.
    fn commit_next<F>(&self, case_id: &str, draft: BlockDraft, signer: &dyn Signer, write: F) -> Result<CustodyRecord>
    where
        F: FnOnce(&Block) -> CaseWrite,
    {
        let last = self.store.last_block(case_id)?;
        let block = self.builder.build_after(last.as_ref(), draft, Some(signer));
        let parent_id = last.as_ref().map(|b| b.id.as_str());
        let case = self.store.commit(&block, parent_id, &write(&block))?;

        info!(
            case_id = %case_id,
            block_id = %block.id,
            action = %block.action,
            from = %block.from,
            to = %block.to,
            signer = %signer.identity(),
            "custody block appended"
        );
        Ok(CustodyRecord { case, block })
    }

    /// Append a block whose draft and case write depend on the current case.
    fn append<D, W>(&self, case_id: &str, signer: &dyn Signer, draft: D, write: W) -> Result<CustodyRecord>
    where
        D: FnOnce(&Case) -> Result<BlockDraft>,
        W: FnOnce(&Case, &Block) -> CaseUpdate,
    {
        self.with_case_lock(case_id, || {
            let case = self.load_case(case_id)?;
            let draft = draft(&case)?;
            self.commit_next(case_id, draft, signer, |block| CaseWrite::Update {
                case_id: case_id.to_string(),
                update: write(&case, block),
            })
        })
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Open a case and write its genesis block (`System -> Police`).
    pub fn create_case(&self, new: NewCase, signer: &dyn Signer) -> Result<CustodyRecord> {
        let case_id = new.case_id.unwrap_or_else(util::new_case_id);
        util::validate_case_id(&case_id)?;
        if new.title.trim().is_empty() {
            return Err(CustodyError::Validation("case title must not be empty".into()));
        }
        let first = new.evidence_files.first().ok_or_else(|| {
            CustodyError::Validation(format!("case {case_id} needs at least one evidence file"))
        })?;
        if first.hash.is_empty() {
            return Err(CustodyError::Validation("evidence file hash must not be empty".into()));
        }

        let draft = BlockDraft::new(&case_id, HOLDER_SYSTEM, HOLDER_POLICE, "Case Created", &first.hash)
            .with_file(&first.name, first.size);
        let case = Case {
            id: case_id.clone(),
            title: new.title,
            description: new.description,
            details: new.details,
            status: CaseStatus::Pending,
            current_holder: HOLDER_POLICE.to_string(),
            created_by: signer.identity().to_string(),
            created_at: util::now_utc_rfc3339(),
            evidence_files: new.evidence_files,
            lab_report: None,
            hospital_report: None,
        };
        self.with_case_lock(&case_id, || {
            if self.store.get_case(&case_id)?.is_some() {
                return Err(CustodyError::Conflict(format!("case {case_id} already exists")));
            }
            self.commit_next(&case_id, draft, signer, move |_| CaseWrite::Create(case))
        })
    }

    /// Move custody of a case from `from` to `to`.
    pub fn transfer(&self, case_id: &str, from: &str, to: &str, signer: &dyn Signer) -> Result<CustodyRecord> {
        util::validate_holder(from, "sender")?;
        util::validate_holder(to, "recipient")?;
        self.append(
            case_id,
            signer,
            |case| {
                if case.current_holder != from {
                    warn!(
                        case_id = %case_id,
                        holder = %case.current_holder,
                        from = %from,
                        "transfer sender is not the recorded holder"
                    );
                }
                Ok(BlockDraft::new(case_id, from, to, format!("Transferred to {to}"), case.primary_file_hash()))
            },
            |case, _| CaseUpdate {
                current_holder: Some(to.to_string()),
                status: self.policy.status_after_transfer(case.status),
                ..Default::default()
            },
        )
    }

    pub fn submit_lab_report(
        &self,
        case_id: &str,
        findings: LabFindings,
        signer: &dyn Signer,
    ) -> Result<CustodyRecord> {
        if findings.test_performed.trim().is_empty() || findings.findings.trim().is_empty() {
            return Err(CustodyError::Validation(
                "lab report needs the test performed and its findings".into(),
            ));
        }
        self.append(
            case_id,
            signer,
            |case| Ok(BlockDraft::new(case_id, HOLDER_LAB, HOLDER_LAB, "Lab Report Added", case.primary_file_hash())),
            |_, block| CaseUpdate {
                lab_report: Some(LabReport {
                    test_performed: findings.test_performed,
                    findings: findings.findings,
                    report_file: findings.report_file,
                    added_at: block.timestamp.clone(),
                    signature: block.signature.clone(),
                }),
                ..Default::default()
            },
        )
    }

    pub fn submit_hospital_report(
        &self,
        case_id: &str,
        findings: MedicalFindings,
        signer: &dyn Signer,
    ) -> Result<CustodyRecord> {
        if findings.medical_details.trim().is_empty() {
            return Err(CustodyError::Validation("medical report needs medical details".into()));
        }
        self.append(
            case_id,
            signer,
            |case| {
                Ok(BlockDraft::new(
                    case_id,
                    HOLDER_HOSPITAL,
                    HOLDER_HOSPITAL,
                    "Medical Report Added",
                    case.primary_file_hash(),
                ))
            },
            |_, block| CaseUpdate {
                hospital_report: Some(HospitalReport {
                    medical_details: findings.medical_details,
                    post_mortem: findings.post_mortem,
                    report_file: findings.report_file,
                    added_at: block.timestamp.clone(),
                    signature: block.signature.clone(),
                }),
                ..Default::default()
            },
        )
    }

    /// Court verification.  Refused with [`CustodyError::Tampered`] unless the
    /// chain verifies; nothing is written in that case.  The audit runs under
    /// the case lock, so the verification block links to the audited tail.
    pub fn verify_case(&self, case_id: &str, signer: &dyn Signer) -> Result<CustodyRecord> {
        self.append(
            case_id,
            signer,
            |case| {
                let report = self.audit_case(case_id)?;
                if !report.valid {
                    warn!(case_id = %case_id, findings = report.findings.len(), "verification refused: chain does not verify");
                    let detail = report
                        .findings
                        .first()
                        .map(|f| f.message.clone())
                        .unwrap_or_default();
                    return Err(CustodyError::Tampered(format!("case {case_id}: {detail}")));
                }
                Ok(BlockDraft::new(case_id, HOLDER_COURT, HOLDER_COURT, "Case Verified", case.primary_file_hash()))
            },
            |_, _| CaseUpdate {
                status: Some(CaseStatus::Verified),
                ..Default::default()
            },
        )
    }

    pub fn close_case(&self, case_id: &str, signer: &dyn Signer) -> Result<CustodyRecord> {
        self.append(
            case_id,
            signer,
            |case| Ok(BlockDraft::new(case_id, HOLDER_COURT, HOLDER_COURT, "Case Closed", case.primary_file_hash())),
            |_, _| CaseUpdate {
                status: Some(CaseStatus::Closed),
                ..Default::default()
            },
        )
    }

    /// Rewrite the case holder from the chain when the two disagree.
    ///
    /// The chain is authoritative; no block is appended.
    pub fn reconcile(&self, case_id: &str) -> Result<ReconcileOutcome> {
        self.with_case_lock(case_id, || {
            let case = self.load_case(case_id)?;
            let tail = self
                .store
                .last_block(case_id)?
                .required_found(&format!("chain for case {case_id}"))?;

            let repaired = case.current_holder != tail.to;
            if repaired {
                warn!(
                    case_id = %case_id,
                    case_holder = %case.current_holder,
                    chain_holder = %tail.to,
                    "case holder disagrees with chain, rewriting from chain"
                );
                self.store.update_case(
                    case_id,
                    &CaseUpdate {
                        current_holder: Some(tail.to.clone()),
                        ..Default::default()
                    },
                )?;
            }
            Ok(ReconcileOutcome {
                case_id: case_id.to_string(),
                chain_holder: tail.to,
                previous_holder: case.current_holder,
                repaired,
            })
        })
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn audit_case(&self, case_id: &str) -> Result<ChainReport> {
        let blocks = self.store.blocks_for_case(case_id)?;
        Ok(verify::verify_chain(&blocks, self.encoding()))
    }

    pub fn integrity_summary(&self) -> Result<IntegritySummary> {
        let blocks = self.store.all_blocks()?;
        Ok(verify::integrity_summary(&blocks, self.encoding()))
    }

    /// Check each block's signature against the key claimed for it.
    pub fn check_signatures(&self, case_id: &str, signer_key: &str) -> Result<Vec<SignatureReport>> {
        let blocks = self.store.blocks_for_case(case_id)?;
        Ok(blocks
            .iter()
            .enumerate()
            .map(|(index, b)| SignatureReport {
                index,
                block_id: b.id.clone(),
                action: b.action.clone(),
                check: signing::verify_block_signature(b, signer_key, self.encoding()),
            })
            .collect())
    }

    pub fn cases_by_holder(&self, holder: &str) -> Result<Vec<Case>> {
        Ok(self
            .store
            .all_cases()?
            .into_iter()
            .filter(|c| c.current_holder == holder)
            .collect())
    }

    pub fn cases_by_status(&self, status: CaseStatus) -> Result<Vec<Case>> {
        Ok(self
            .store
            .all_cases()?
            .into_iter()
            .filter(|c| c.status == status)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::IdentitySigner;
    use crate::store::{BlockStore as _, CaseStore as _, MemoryStore};
    use crate::verify::FindingKind;

    fn evidence() -> EvidenceFile {
        EvidenceFile {
            hash: util::sha256_hex(b"crime scene photo"),
            name: "scene.jpg".into(),
            size: 17,
            content_type: "image/jpeg".into(),
            uploaded_by: "police@trustvault.com".into(),
            uploaded_at: util::now_utc_rfc3339(),
        }
    }

    fn new_case(id: &str) -> NewCase {
        NewCase {
            case_id: Some(id.into()),
            title: "Warehouse fire".into(),
            description: "Suspected arson".into(),
            evidence_files: vec![evidence()],
            ..Default::default()
        }
    }

    fn service() -> CustodyService<MemoryStore> {
        CustodyService::new(MemoryStore::new(), Encoding::default())
    }

    #[test]
    fn create_case_writes_genesis_and_case() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let rec = svc.create_case(new_case("C1"), &police).unwrap();

        assert!(rec.block.is_genesis_link());
        assert_eq!(rec.block.from, "System");
        assert_eq!(rec.block.to, "Police");
        assert_eq!(rec.block.file_name.as_deref(), Some("scene.jpg"));
        assert_eq!(rec.case.status, CaseStatus::Pending);
        assert_eq!(rec.case.current_holder, "Police");
        assert_eq!(rec.case.created_by, "police@trustvault.com");
        assert!(svc.audit_case("C1").unwrap().valid);
    }

    #[test]
    fn create_case_requires_evidence() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let mut nc = new_case("C1");
        nc.evidence_files.clear();
        assert!(matches!(svc.create_case(nc, &police), Err(CustodyError::Validation(_))));
        assert!(svc.store().all_blocks().unwrap().is_empty());
    }

    #[test]
    fn duplicate_case_is_conflict() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        assert!(svc.create_case(new_case("C1"), &police).unwrap_err().is_conflict());
    }

    #[test]
    fn transfer_updates_holder_and_links_chain() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let genesis = svc.create_case(new_case("C1"), &police).unwrap().block;
        let rec = svc.transfer("C1", "Police", "Lab", &police).unwrap();

        assert_eq!(rec.block.action, "Transferred to Lab");
        assert_eq!(rec.block.file_hash, genesis.file_hash);
        assert_eq!(rec.case.current_holder, "Lab");
        assert_eq!(rec.case.status, CaseStatus::InProgress);
        assert_eq!(svc.audit_case("C1").unwrap().block_count, 2);
    }

    #[test]
    fn transfer_of_unknown_case_is_not_found() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        assert!(matches!(
            svc.transfer("nope", "Police", "Lab", &police),
            Err(CustodyError::NotFound(_))
        ));
    }

    // Default policy reopens closed cases on transfer.  Kept deliberately;
    // PreserveTerminal is the opt-in alternative.
    #[test]
    fn transfer_out_of_closed_case_follows_policy() {
        let police = IdentitySigner::new("police@trustvault.com");
        let court = IdentitySigner::new("court@trustvault.com");

        let svc = service();
        svc.create_case(new_case("C1"), &police).unwrap();
        svc.close_case("C1", &court).unwrap();
        let rec = svc.transfer("C1", "Court", "Police", &court).unwrap();
        assert_eq!(rec.case.status, CaseStatus::InProgress);

        let svc = service().with_policy(TransferStatusPolicy::PreserveTerminal);
        svc.create_case(new_case("C1"), &police).unwrap();
        svc.close_case("C1", &court).unwrap();
        let rec = svc.transfer("C1", "Court", "Police", &court).unwrap();
        assert_eq!(rec.case.status, CaseStatus::Closed);
        assert_eq!(rec.case.current_holder, "Police");
    }

    #[test]
    fn reports_carry_block_timestamp_and_signature() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let lab = IdentitySigner::new("lab@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        let rec = svc
            .submit_lab_report(
                "C1",
                LabFindings {
                    test_performed: "Accelerant GC-MS".into(),
                    findings: "Gasoline residue".into(),
                    report_file: None,
                },
                &lab,
            )
            .unwrap();
        let report = rec.case.lab_report.unwrap();
        assert_eq!(report.added_at, rec.block.timestamp);
        assert_eq!(report.signature, rec.block.signature);
        assert_eq!(rec.block.action, "Lab Report Added");
        // Reports do not move custody.
        assert_eq!(rec.case.current_holder, "Police");
    }

    #[test]
    fn verify_case_refuses_tampered_chain() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let court = IdentitySigner::new("court@trustvault.com");
        let genesis = svc.create_case(new_case("C1"), &police).unwrap().block;
        svc.transfer("C1", "Police", "Court", &police).unwrap();

        assert!(svc.store().tamper_block(&genesis.id, |b| b.file_hash = "ffff".into()));
        let err = svc.verify_case("C1", &court).unwrap_err();
        assert!(matches!(err, CustodyError::Tampered(_)));
        assert_eq!(svc.store().blocks_for_case("C1").unwrap().len(), 2);
        assert_ne!(svc.load_case("C1").unwrap().status, CaseStatus::Verified);

        let report = svc.audit_case("C1").unwrap();
        assert_eq!(report.findings[0].kind, FindingKind::Linkage);
        assert_eq!(report.first_break(), Some(1));
    }

    #[test]
    fn verify_case_marks_clean_chain_verified() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let court = IdentitySigner::new("court@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        let rec = svc.verify_case("C1", &court).unwrap();
        assert_eq!(rec.case.status, CaseStatus::Verified);
        assert_eq!(svc.cases_by_status(CaseStatus::Verified).unwrap().len(), 1);
    }

    #[test]
    fn signatures_check_against_claimed_key() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let lab = IdentitySigner::new("lab@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        svc.transfer("C1", "Police", "Lab", &lab).unwrap();

        let checks = svc.check_signatures("C1", "police@trustvault.com").unwrap();
        assert_eq!(checks[0].check, SignatureCheck::Valid);
        assert_eq!(checks[1].check, SignatureCheck::Invalid);
    }

    #[test]
    fn reconcile_rewrites_holder_from_chain() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        svc.transfer("C1", "Police", "Lab", &police).unwrap();
        svc.store()
            .update_case(
                "C1",
                &CaseUpdate {
                    current_holder: Some("Hospital".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let out = svc.reconcile("C1").unwrap();
        assert!(out.repaired);
        assert_eq!(out.previous_holder, "Hospital");
        assert_eq!(svc.cases_by_holder("Lab").unwrap().len(), 1);
        assert!(!svc.reconcile("C1").unwrap().repaired);
    }

    #[test]
    fn store_outage_fails_append_without_genesis_fallback() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        svc.store().set_unavailable(true);
        assert!(matches!(
            svc.transfer("C1", "Police", "Lab", &police),
            Err(CustodyError::Store(_))
        ));
        svc.store().set_unavailable(false);
        assert_eq!(svc.store().blocks_for_case("C1").unwrap().len(), 1);
    }

    #[test]
    fn create_case_keeps_incident_details() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        let mut nc = new_case("C1");
        nc.details = CaseDetails {
            location: Some("Pier 4 warehouse".into()),
            evidence_type: Some(crate::block::EvidenceType::Physical),
            evidence_description: Some("Burnt fuel can".into()),
            ..Default::default()
        };
        svc.create_case(nc, &police).unwrap();
        svc.transfer("C1", "Police", "Lab", &police).unwrap();

        let stored = svc.load_case("C1").unwrap();
        assert_eq!(stored.details.location.as_deref(), Some("Pier 4 warehouse"));
        assert_eq!(stored.details.evidence_type, Some(crate::block::EvidenceType::Physical));
        assert_eq!(stored.details.suspect_details, None);
    }

    #[test]
    fn case_locks_are_released_after_use() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        svc.transfer("C1", "Police", "Lab", &police).unwrap();
        assert!(svc.transfer("C1", "Lab", "", &police).is_err());
        svc.reconcile("C1").unwrap();
        assert!(svc.reconcile("unknown").is_err());
        assert!(svc.close_case("unknown", &police).is_err());
        assert!(svc.case_locks.lock().is_empty());
    }

    #[test]
    fn lock_entry_survives_while_another_caller_holds_it() {
        let svc = service();
        let police = IdentitySigner::new("police@trustvault.com");
        svc.create_case(new_case("C1"), &police).unwrap();
        svc.with_case_lock("C1", || {
            assert_eq!(svc.case_locks.lock().len(), 1);
            svc.with_case_lock("C2", || Ok(())).unwrap();
            assert!(svc.case_locks.lock().contains_key("C1"));
            assert!(!svc.case_locks.lock().contains_key("C2"));
            Ok(())
        })
        .unwrap();
        assert!(svc.case_locks.lock().is_empty());
    }
}
