use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde::Serialize;
use tracing::{info, warn};

use trustvault_core::{
    block::{CaseDetails, CaseStatus, EvidenceFile, EvidenceType},
    canonical::Encoding,
    config::VaultConfig,
    custody::{CustodyService, LabFindings, MedicalFindings, NewCase},
    ledger::{self, SqliteLedger},
    signing::IdentitySigner,
    store::CaseStore as _,
    util,
};

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "trustvault",
    version = util::VERSION,
    about = "Tamper-evident chain-of-custody ledger for evidence handling"
)]
struct Cli {
    /// Path to the ledger database (SQLite / SQLCipher).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Read the DB encryption key from this environment variable.
    #[arg(long, global = true, default_value = "TRUSTVAULT_DB_KEY")]
    db_key_env: String,

    /// Read the acting signer identity from this environment variable.
    #[arg(long, global = true, default_value = "TRUSTVAULT_SIGNER")]
    signer_env: String,

    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a new, empty ledger database.
    InitLedger {
        /// Canonical encoding for the new ledger (defaults to config).
        #[arg(long)]
        encoding: Option<Encoding>,
    },

    /// Open a case with its evidence files and write the genesis block.
    CreateCase {
        #[arg(long)]
        case_id: Option<String>,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Evidence file to hash at intake (repeatable).
        #[arg(long = "evidence", required = true)]
        evidence: Vec<PathBuf>,
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
        #[arg(long)]
        suspect_details: Option<String>,
        /// Incident date as recorded by the officer.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        location: Option<String>,
        /// physical | digital | biological | documentary | weapon | other
        #[arg(long)]
        evidence_type: Option<EvidenceType>,
        #[arg(long)]
        evidence_description: Option<String>,
    },

    /// Transfer custody of a case to another holder.
    Transfer {
        #[arg(long)]
        case_id: String,
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },

    /// Attach a signed lab report to a case.
    LabReport {
        #[arg(long)]
        case_id: String,
        #[arg(long)]
        test: String,
        #[arg(long)]
        findings: String,
        #[arg(long)]
        report_file: Option<String>,
    },

    /// Attach a signed medical report to a case.
    HospitalReport {
        #[arg(long)]
        case_id: String,
        #[arg(long)]
        details: String,
        #[arg(long)]
        post_mortem: Option<String>,
        #[arg(long)]
        report_file: Option<String>,
    },

    /// Court verification: refused unless the case chain verifies.
    VerifyCase {
        #[arg(long)]
        case_id: String,
    },

    CloseCase {
        #[arg(long)]
        case_id: String,
    },

    /// Verify one case chain and print the findings.
    AuditCase {
        #[arg(long)]
        case_id: String,
    },

    /// Verify every case chain and print the totals.
    Integrity,

    /// Check each block signature of a case against a claimed signer key.
    CheckSignatures {
        #[arg(long)]
        case_id: String,
        #[arg(long)]
        key: String,
    },

    /// Rewrite a case's holder from its chain if the two disagree.
    Reconcile {
        #[arg(long)]
        case_id: String,
    },

    ListCases {
        #[arg(long)]
        holder: Option<String>,
        #[arg(long)]
        status: Option<CaseStatus>,
    },

    /// Print the SHA-256 of a file.
    HashFile {
        path: PathBuf,
    },

    /// Export the ledger to a JSON backup file.
    ExportLedger {
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Import a ledger from a JSON backup into a new database.
    ImportLedger {
        #[arg(long)]
        json: PathBuf,
        /// Path for the new database (must not already exist).
        #[arg(long)]
        target_db: PathBuf,
    },

    /// Print version information.
    Version,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg = VaultConfig::load(cli.config.as_deref()).context("load config")?;
    cfg.apply_env().context("apply environment overrides")?;

    init_logging(&cfg.logging)?;

    let db_path = cli.db.clone().unwrap_or(cfg.paths.db.clone());
    util::validate_path(&db_path, "db")?;
    let db_key = std::env::var(&cli.db_key_env)
        .ok()
        .or(cfg.security.db_key.clone())
        .map(|s| SecretString::new(s.into()));

    match cli.cmd {
        Commands::InitLedger { encoding } => {
            anyhow::ensure!(
                !db_path.exists(),
                "ledger {} already exists -- will not overwrite",
                db_path.display()
            );
            let encoding = encoding.unwrap_or(cfg.chain.encoding);
            let ledger = SqliteLedger::create_new(&db_path, db_key.as_ref(), encoding)
                .context("create ledger")?;
            info!(ledger_id = %ledger.meta().ledger_id, "ledger initialized");
        }

        Commands::CreateCase {
            case_id,
            title,
            description,
            evidence,
            content_type,
            suspect_details,
            date,
            location,
            evidence_type,
            evidence_description,
        } => {
            let signer = signer_from_env(&cli.signer_env)?;
            let evidence_files = evidence
                .iter()
                .map(|p| intake_evidence(p, &content_type, &signer))
                .collect::<Result<Vec<_>>>()?;
            let svc = open_service(&db_path, db_key.as_ref(), &cfg)?;
            let rec = svc
                .create_case(
                    NewCase {
                        case_id,
                        title,
                        description,
                        details: CaseDetails {
                            suspect_details,
                            date,
                            location,
                            evidence_type,
                            evidence_description,
                        },
                        evidence_files,
                    },
                    &signer,
                )
                .context("create case")?;
            print_json(&rec)?;
        }

        Commands::Transfer { case_id, from, to } => {
            let signer = signer_from_env(&cli.signer_env)?;
            let svc = open_service(&db_path, db_key.as_ref(), &cfg)?;
            let rec = svc
                .transfer(&case_id, &from, &to, &signer)
                .with_context(|| format!("transfer case {case_id}"))?;
            print_json(&rec)?;
        }

        Commands::LabReport {
            case_id,
            test,
            findings,
            report_file,
        } => {
            let signer = signer_from_env(&cli.signer_env)?;
            let svc = open_service(&db_path, db_key.as_ref(), &cfg)?;
            let rec = svc
                .submit_lab_report(
                    &case_id,
                    LabFindings {
                        test_performed: test,
                        findings,
                        report_file,
                    },
                    &signer,
                )
                .context("submit lab report")?;
            print_json(&rec)?;
        }

        Commands::HospitalReport {
            case_id,
            details,
            post_mortem,
            report_file,
        } => {
            let signer = signer_from_env(&cli.signer_env)?;
            let svc = open_service(&db_path, db_key.as_ref(), &cfg)?;
            let rec = svc
                .submit_hospital_report(
                    &case_id,
                    MedicalFindings {
                        medical_details: details,
                        post_mortem,
                        report_file,
                    },
                    &signer,
                )
                .context("submit hospital report")?;
            print_json(&rec)?;
        }

        Commands::VerifyCase { case_id } => {
            let signer = signer_from_env(&cli.signer_env)?;
            let svc = open_service(&db_path, db_key.as_ref(), &cfg)?;
            let rec = svc
                .verify_case(&case_id, &signer)
                .with_context(|| format!("verify case {case_id}"))?;
            print_json(&rec)?;
        }

        Commands::CloseCase { case_id } => {
            let signer = signer_from_env(&cli.signer_env)?;
            let svc = open_service(&db_path, db_key.as_ref(), &cfg)?;
            let rec = svc
                .close_case(&case_id, &signer)
                .with_context(|| format!("close case {case_id}"))?;
            print_json(&rec)?;
        }

        Commands::AuditCase { case_id } => {
            let svc = open_existing_service(&db_path, db_key.as_ref(), &cfg)?;
            let report = svc.audit_case(&case_id).context("audit case")?;
            print_json(&report)?;
            if !report.valid {
                warn!(case_id = %case_id, findings = report.findings.len(), "case chain failed verification");
                std::process::exit(1);
            }
        }

        Commands::Integrity => {
            let svc = open_existing_service(&db_path, db_key.as_ref(), &cfg)?;
            let summary = svc.integrity_summary().context("integrity summary")?;
            print_json(&summary)?;
            if summary.tampered_chains > 0 {
                std::process::exit(1);
            }
        }

        Commands::CheckSignatures { case_id, key } => {
            let svc = open_existing_service(&db_path, db_key.as_ref(), &cfg)?;
            let checks = svc
                .check_signatures(&case_id, &key)
                .context("check signatures")?;
            print_json(&checks)?;
        }

        Commands::Reconcile { case_id } => {
            let svc = open_existing_service(&db_path, db_key.as_ref(), &cfg)?;
            let outcome = svc
                .reconcile(&case_id)
                .with_context(|| format!("reconcile case {case_id}"))?;
            print_json(&outcome)?;
        }

        Commands::ListCases { holder, status } => {
            let svc = open_existing_service(&db_path, db_key.as_ref(), &cfg)?;
            let mut cases = match (&holder, status) {
                (Some(h), _) => svc.cases_by_holder(h)?,
                (None, Some(s)) => svc.cases_by_status(s)?,
                (None, None) => svc.store().all_cases()?,
            };
            if let Some(s) = status {
                cases.retain(|c| c.status == s);
            }
            print_json(&cases)?;
        }

        Commands::HashFile { path } => {
            util::validate_path(&path, "file")?;
            println!("{}", util::hash_file(&path)?);
        }

        Commands::ExportLedger { out } => {
            let ledger =
                SqliteLedger::open_existing(&db_path, db_key.as_ref()).context("open ledger")?;
            let out = match out {
                Some(p) => p,
                None => {
                    std::fs::create_dir_all(&cfg.paths.export_dir).with_context(|| {
                        format!("create export dir {}", cfg.paths.export_dir.display())
                    })?;
                    cfg.paths
                        .export_dir
                        .join(format!("trustvault-{}.json", ledger.meta().ledger_id))
                }
            };
            ledger::export_ledger_json(&ledger, &out).context("export ledger")?;
            println!("{}", out.display());
        }

        Commands::ImportLedger { json, target_db } => {
            anyhow::ensure!(
                !target_db.exists(),
                "target database {} already exists -- will not overwrite",
                target_db.display()
            );
            let imported = ledger::import_ledger_json(&json, &target_db, db_key.as_ref())
                .context("import ledger")?;
            info!(
                ledger_id = %imported.meta().ledger_id,
                "ledger imported to {}",
                target_db.display()
            );
        }

        Commands::Version => {
            println!("{}", util::version_string());
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_service(
    db_path: &Path,
    db_key: Option<&SecretString>,
    cfg: &VaultConfig,
) -> Result<CustodyService<SqliteLedger>> {
    let ledger = SqliteLedger::open_or_create(db_path, db_key, cfg.chain.encoding)
        .context("open/create ledger")?;
    Ok(service_over(ledger, cfg))
}

fn open_existing_service(
    db_path: &Path,
    db_key: Option<&SecretString>,
    cfg: &VaultConfig,
) -> Result<CustodyService<SqliteLedger>> {
    let ledger = SqliteLedger::open_existing(db_path, db_key).context("open ledger")?;
    Ok(service_over(ledger, cfg))
}

fn service_over(ledger: SqliteLedger, cfg: &VaultConfig) -> CustodyService<SqliteLedger> {
    let encoding = ledger.encoding();
    if encoding != cfg.chain.encoding {
        info!(ledger = %encoding, configured = %cfg.chain.encoding, "using encoding recorded in ledger");
    }
    CustodyService::new(ledger, encoding).with_policy(cfg.custody.transfer_status)
}

/// The identity provider hands over the signer through the environment.
fn signer_from_env(var: &str) -> Result<IdentitySigner> {
    let identity = std::env::var(var)
        .with_context(|| format!("signer identity not set (export {var})"))?;
    anyhow::ensure!(!identity.trim().is_empty(), "signer identity in {var} is empty");
    Ok(IdentitySigner::new(identity))
}

fn intake_evidence(path: &Path, content_type: &str, signer: &IdentitySigner) -> Result<EvidenceFile> {
    use trustvault_core::signing::Signer as _;

    let path = util::canonicalize_if_exists(path, "evidence")?;
    let hash = util::hash_file(&path)?;
    let size = std::fs::metadata(&path)
        .with_context(|| format!("stat {}", path.display()))?
        .len();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(file = %name, size, hash = %hash, "evidence hashed");
    Ok(EvidenceFile {
        hash,
        name,
        size,
        content_type: content_type.to_string(),
        uploaded_by: signer.identity().to_string(),
        uploaded_at: util::now_utc_rfc3339(),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}

fn init_logging(cfg: &trustvault_core::config::LoggingConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.level));

    let registry = tracing_subscriber::registry().with(filter);

    // Command output goes to stdout, so human-readable logs go to stderr.
    if cfg.json_stdout {
        let json_layer = tracing_subscriber::fmt::layer().json();
        registry.with(json_layer).init();
    } else if !cfg.json_log_file.is_empty() {
        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.json_log_file)
            .with_context(|| format!("open json log file {}", cfg.json_log_file))?;
        let file_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::sync::Mutex::new(log_file));
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(file_layer).with(console_layer).init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        registry.with(console_layer).init();
    }
    Ok(())
}
