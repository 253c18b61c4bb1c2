//! Custody records: immutable chain blocks and the mutable case projection.

use serde::{Deserialize, Serialize};

/// `previousHash` value carried by the first block of every case chain.
pub const GENESIS_PREV_HASH: &str = "0";

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// One immutable record in a case's custody chain.
///
/// Serialized with camelCase keys so stored chains keep the field names the
/// hashing rules are written against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    pub case_id: String,
    pub from: String,
    pub to: String,
    pub timestamp: String,
    pub file_hash: String,
    pub previous_hash: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Block {
    pub fn is_genesis_link(&self) -> bool {
        self.previous_hash == GENESIS_PREV_HASH
    }
}

/// Caller-supplied part of a new block.  Everything else (id, timestamp,
/// back-link, signature) is assigned by the builder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockDraft {
    pub case_id: String,
    pub from: String,
    pub to: String,
    pub action: String,
    pub file_hash: String,
    pub file_name: Option<String>,
    pub file_size: Option<u64>,
}

impl BlockDraft {
    pub fn new(
        case_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        action: impl Into<String>,
        file_hash: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            from: from.into(),
            to: to.into(),
            action: action.into(),
            file_hash: file_hash.into(),
            file_name: None,
            file_size: None,
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, size: u64) -> Self {
        self.file_name = Some(name.into());
        self.file_size = Some(size);
        self
    }
}

// ---------------------------------------------------------------------------
// Case
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    Pending,
    InProgress,
    Verified,
    Closed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Verified => "verified",
            Self::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified | Self::Closed)
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in-progress" => Ok(Self::InProgress),
            "verified" => Ok(Self::Verified),
            "closed" => Ok(Self::Closed),
            other => Err(format!("unknown case status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceFile {
    pub hash: String,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub uploaded_by: String,
    pub uploaded_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabReport {
    pub test_performed: String,
    pub findings: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_file: Option<String>,
    pub added_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalReport {
    pub medical_details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_mortem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_file: Option<String>,
    pub added_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Evidence classification recorded at intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceType {
    Physical,
    Digital,
    Biological,
    Documentary,
    Weapon,
    Other,
}

impl EvidenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Physical => "physical",
            Self::Digital => "digital",
            Self::Biological => "biological",
            Self::Documentary => "documentary",
            Self::Weapon => "weapon",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for EvidenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EvidenceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "physical" => Ok(Self::Physical),
            "digital" => Ok(Self::Digital),
            "biological" => Ok(Self::Biological),
            "documentary" => Ok(Self::Documentary),
            "weapon" => Ok(Self::Weapon),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown evidence type '{other}'")),
        }
    }
}

/// Incident details captured when a case is opened.  All optional; absent
/// keys are omitted from stored case JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspect_details: Option<String>,
    /// Incident date as entered, not validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_type: Option<EvidenceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_description: Option<String>,
}

/// Mutable projection of a case's current state.  The chain is authoritative;
/// `current_holder` mirrors the `to` of the latest transfer block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Case {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub details: CaseDetails,
    pub status: CaseStatus,
    pub current_holder: String,
    pub created_by: String,
    pub created_at: String,
    #[serde(default)]
    pub evidence_files: Vec<EvidenceFile>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_report: Option<LabReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hospital_report: Option<HospitalReport>,
}

impl Case {
    /// Hash of the first evidence file, or empty if the case has none.
    pub fn primary_file_hash(&self) -> &str {
        self.evidence_files
            .first()
            .map(|f| f.hash.as_str())
            .unwrap_or("")
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &CaseUpdate) {
        if let Some(ref holder) = update.current_holder {
            self.current_holder = holder.clone();
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(ref report) = update.lab_report {
            self.lab_report = Some(report.clone());
        }
        if let Some(ref report) = update.hospital_report {
            self.hospital_report = Some(report.clone());
        }
    }
}

/// Partial case fields written alongside a block append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseUpdate {
    pub current_holder: Option<String>,
    pub status: Option<CaseStatus>,
    pub lab_report: Option<LabReport>,
    pub hospital_report: Option<HospitalReport>,
}

impl CaseUpdate {
    pub fn is_empty(&self) -> bool {
        self.current_holder.is_none()
            && self.status.is_none()
            && self.lab_report.is_none()
            && self.hospital_report.is_none()
    }
}

/// The case half of a combined block + case commit.
#[derive(Debug, Clone)]
pub enum CaseWrite {
    Create(Case),
    Update { case_id: String, update: CaseUpdate },
}

impl CaseWrite {
    pub fn case_id(&self) -> &str {
        match self {
            Self::Create(c) => &c.id,
            Self::Update { case_id, .. } => case_id,
        }
    }
}
