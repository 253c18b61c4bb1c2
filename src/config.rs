//! TOML configuration file support.
//!
//! Loads from (in order):
//! 1. `trustvault.toml` next to the executable
//! 2. `~/.config/trustvault/config.toml`
//! 3. Environment variable overrides (e.g. `TRUSTVAULT_DB_KEY`)
//!
//! CLI arguments always take precedence over config file values.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::canonical::Encoding;
use crate::custody::TransferStatusPolicy;
use crate::error::{CustodyError, Result, ResultExt as _};

// ---------------------------------------------------------------------------
// Config structs (map 1-to-1 with the TOML sections)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub paths: PathsConfig,
    pub chain: ChainConfig,
    pub custody: CustodyConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub db: PathBuf,
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Encoding for newly created ledgers.  Existing ledgers keep the
    /// encoding recorded in their meta table.
    pub encoding: Encoding,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    pub transfer_status: TransferStatusPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// JSON-lines log file.  Empty string means no file logging.
    pub json_log_file: String,
    pub json_stdout: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub db_key: Option<String>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            db: PathBuf::from("trustvault-ledger.db"),
            export_dir: PathBuf::from("trustvault-exports"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_log_file: String::new(),
            json_stdout: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl VaultConfig {
    /// Try to load from a specific path.  Returns `Ok(default)` if the file
    /// does not exist; returns `Err` if the file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .ctx_config(&format!("read config file {}", path.display()))?;
        toml::from_str(&text).ctx_config("parse config TOML")
    }

    /// Load config using the standard search order:
    /// 1. Explicit path (if given)
    /// 2. `trustvault.toml` next to the running binary
    /// 3. `~/.config/trustvault/config.toml`
    /// 4. Built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(p) = explicit {
            return Self::load_from(p);
        }

        if let Ok(exe) = std::env::current_exe() {
            let candidate = exe.with_file_name("trustvault.toml");
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        if let Some(home) = std::env::var_os("HOME") {
            let candidate = PathBuf::from(home)
                .join(".config")
                .join("trustvault")
                .join("config.toml");
            if candidate.exists() {
                return Self::load_from(&candidate);
            }
        }

        Ok(Self::default())
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars<F: Fn(&str) -> Option<String>>(&mut self, var: F) -> Result<()> {
        if let Some(key) = var("TRUSTVAULT_DB_KEY") {
            self.security.db_key = Some(key);
        }
        if let Some(db) = var("TRUSTVAULT_DB") {
            self.paths.db = PathBuf::from(db);
        }
        if let Some(level) = var("TRUSTVAULT_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(enc) = var("TRUSTVAULT_ENCODING") {
            self.chain.encoding = enc
                .parse()
                .map_err(|e: String| CustodyError::Config(format!("TRUSTVAULT_ENCODING: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = VaultConfig::default();
        assert_eq!(cfg.paths.db, PathBuf::from("trustvault-ledger.db"));
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.chain.encoding, Encoding::LengthPrefixed);
        assert_eq!(cfg.custody.transfer_status, TransferStatusPolicy::AlwaysInProgress);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let cfg = VaultConfig::load_from(Path::new("nonexistent_file_xyz.toml")).unwrap();
        assert!(cfg.security.db_key.is_none());
    }

    #[test]
    fn parse_partial_toml() {
        let toml_str = r#"
[chain]
encoding = "legacy"

[custody]
transfer_status = "preserve-terminal"
"#;
        let cfg: VaultConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.chain.encoding, Encoding::Legacy);
        assert_eq!(cfg.custody.transfer_status, TransferStatusPolicy::PreserveTerminal);
        assert_eq!(cfg.paths.db, PathBuf::from("trustvault-ledger.db"));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("bad.toml");
        std::fs::write(&p, "[chain]\nencoding = \"rot13\"\n").unwrap();
        assert!(matches!(VaultConfig::load_from(&p), Err(CustodyError::Config(_))));
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = VaultConfig::default();
        cfg.apply_vars(|name| match name {
            "TRUSTVAULT_DB" => Some("/var/lib/trustvault/ledger.db".into()),
            "TRUSTVAULT_ENCODING" => Some("legacy".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(cfg.paths.db, PathBuf::from("/var/lib/trustvault/ledger.db"));
        assert_eq!(cfg.chain.encoding, Encoding::Legacy);

        let err = cfg
            .apply_vars(|name| (name == "TRUSTVAULT_ENCODING").then(|| "base64".to_string()))
            .unwrap_err();
        assert!(matches!(err, CustodyError::Config(_)));
    }
}
