//! Hashing helpers, identifiers, time, and input validation.

use std::io::Read as _;
use std::path::{Path, PathBuf};

use rand::distr::Alphanumeric;
use rand::Rng as _;
use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::error::{CustodyError, Result};

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Stream a file through SHA-256 and return the lowercase hex digest.
///
/// This is the content hasher used once per evidence artifact at intake; the
/// chain itself only ever hashes structured block fields.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = std::fs::File::open(path)
        .map_err(|e| CustodyError::Validation(format!("open evidence {}: {e}", path.display())))?;
    let mut h = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = f
            .read(&mut buf)
            .map_err(|e| CustodyError::Validation(format!("read evidence {}: {e}", path.display())))?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(hex::encode(h.finalize()))
}

// ---------------------------------------------------------------------------
// Time / identifiers
// ---------------------------------------------------------------------------

pub fn now_utc_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

pub fn new_block_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `CASE-<unix millis>-<4 random alphanumerics>`.
pub fn new_case_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect();
    format!("CASE-{millis}-{suffix}")
}

// ---------------------------------------------------------------------------
// Validation helpers
// ---------------------------------------------------------------------------

/// Case ids: starts with alphanumeric, then up to 127 more alphanumeric /
/// hyphen / dot / underscore characters.
static CASE_ID_RE: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
    regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-_.]{0,127}$").unwrap()
});

pub fn validate_case_id(case_id: &str) -> Result<()> {
    if case_id.is_empty() {
        return Err(CustodyError::Validation("case id must not be empty".into()));
    }
    if !CASE_ID_RE.is_match(case_id) {
        return Err(CustodyError::Validation(format!(
            "invalid case id '{case_id}': 1-128 chars, alphanumeric/hyphen/dot/underscore"
        )));
    }
    Ok(())
}

/// Holder names are free-form but must be non-blank.
pub fn validate_holder(holder: &str, label: &str) -> Result<()> {
    if holder.trim().is_empty() {
        return Err(CustodyError::Validation(format!("{label} must not be empty")));
    }
    Ok(())
}

/// Validate that a path is not empty and does not contain null bytes.
pub fn validate_path(p: &Path, label: &str) -> Result<()> {
    let s = p.to_string_lossy();
    if s.is_empty() {
        return Err(CustodyError::Validation(format!("{label} path is empty")));
    }
    if s.contains('\0') {
        return Err(CustodyError::Validation(format!("{label} path contains null byte")));
    }
    Ok(())
}

/// Canonicalize a path if it exists, otherwise return it unchanged.
pub fn canonicalize_if_exists(p: &Path, label: &str) -> Result<PathBuf> {
    validate_path(p, label)?;
    if p.exists() {
        std::fs::canonicalize(p)
            .map_err(|e| CustodyError::Validation(format!("{label} path invalid: {e}")))
    } else {
        Ok(p.to_path_buf())
    }
}

// ---------------------------------------------------------------------------
// Version constants (set by build.rs)
// ---------------------------------------------------------------------------

pub const GIT_HASH: &str = env!("TRUSTVAULT_GIT_HASH");
pub const BUILD_TS: &str = env!("TRUSTVAULT_BUILD_TS");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version_string() -> String {
    format!("TrustVault v{VERSION} (git {GIT_HASH}, built {BUILD_TS})")
}
