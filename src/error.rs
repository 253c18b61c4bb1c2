//! Structured error types for the custody ledger.
//!
//! Every fallible library function returns [`Result<T>`] carrying a
//! [`CustodyError`].  Chain-integrity findings are *not* errors: the verifier
//! reports them as data (see [`crate::verify`]).  Errors are reserved for
//! conditions the caller must act on, such as an unavailable store.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Primary error enum
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum CustodyError {
    /// The backing store failed.  Never to be confused with "no prior block".
    #[error("store: {0}")]
    Store(String),

    #[error("config: {0}")]
    Config(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Another writer appended to the case chain between lookup and commit.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The operation requires an intact chain and verification failed.
    #[error("tampered chain: {0}")]
    Tampered(String),

    /// Direct database errors (auto-converted via `?` in the ledger module).
    #[error("database: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, CustodyError>;

impl CustodyError {
    /// True when retrying the same operation against fresh state may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

// ---------------------------------------------------------------------------
// Context extension traits
// ---------------------------------------------------------------------------

/// Tags an arbitrary error with the subsystem it came from.
///
/// ```ignore
/// std::fs::read(path).ctx_store("read ledger backup")?;
/// ```
pub trait ResultExt<T> {
    fn ctx_store(self, msg: &str) -> Result<T>;
    fn ctx_config(self, msg: &str) -> Result<T>;
    fn ctx_validation(self, msg: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn ctx_store(self, msg: &str) -> Result<T> {
        self.map_err(|e| CustodyError::Store(format!("{msg}: {e}")))
    }
    fn ctx_config(self, msg: &str) -> Result<T> {
        self.map_err(|e| CustodyError::Config(format!("{msg}: {e}")))
    }
    fn ctx_validation(self, msg: &str) -> Result<T> {
        self.map_err(|e| CustodyError::Validation(format!("{msg}: {e}")))
    }
}

/// Same as [`ResultExt`] but for `Option<T>` (converts `None` into an error).
pub trait OptionExt<T> {
    fn required_found(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required_found(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| CustodyError::NotFound(msg.to_string()))
    }
}
