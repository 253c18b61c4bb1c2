//! SQLite-backed custody store (SQLCipher-compatible).
//!
//! Blocks live in an append-only table guarded by triggers; cases are stored
//! as JSON documents keyed by id.  A combined block + case write runs in one
//! `IMMEDIATE` transaction, so the chain and its projection never diverge
//! through a partial write.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use pbkdf2::pbkdf2_hmac;
use rusqlite::{params, Connection, OptionalExtension as _, Row, Transaction, TransactionBehavior};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use crate::block::{Block, Case, CaseUpdate, CaseWrite};
use crate::canonical::Encoding;
use crate::error::{CustodyError, Result, ResultExt as _};
use crate::store::{check_commit_shape, check_parent, BlockStore, CaseStore, CustodyStore};
use crate::verify;

pub const LEDGER_SCHEMA_VERSION: i64 = 1;

const SCHEMA_SQL: &str = r#"
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=FULL;
    PRAGMA foreign_keys=ON;

    CREATE TABLE IF NOT EXISTS meta(
      k TEXT PRIMARY KEY,
      v TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS blocks(
      seq INTEGER PRIMARY KEY AUTOINCREMENT,
      id TEXT NOT NULL UNIQUE,
      case_id TEXT NOT NULL,
      from_holder TEXT NOT NULL,
      to_holder TEXT NOT NULL,
      ts_utc TEXT NOT NULL,
      file_hash TEXT NOT NULL,
      previous_hash TEXT NOT NULL,
      action TEXT NOT NULL,
      file_name TEXT,
      file_size INTEGER,
      signature TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_blocks_case ON blocks(case_id, seq);

    CREATE TRIGGER IF NOT EXISTS blocks_no_update BEFORE UPDATE ON blocks
    BEGIN SELECT RAISE(ABORT, 'blocks are append-only'); END;

    CREATE TRIGGER IF NOT EXISTS blocks_no_delete BEFORE DELETE ON blocks
    BEGIN SELECT RAISE(ABORT, 'blocks are append-only'); END;

    CREATE TABLE IF NOT EXISTS cases(
      id TEXT PRIMARY KEY,
      case_json TEXT NOT NULL,
      updated_at_utc TEXT NOT NULL
    );
"#;

const BLOCK_COLUMNS: &str = "id, case_id, from_holder, to_holder, ts_utc, file_hash, \
                             previous_hash, action, file_name, file_size, signature";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerMeta {
    pub ledger_id: Uuid,
    pub created_at_utc: String,
    pub schema_version: i64,
    pub encoding: Encoding,
    pub sqlcipher_cipher_version: Option<String>,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

pub struct SqliteLedger {
    conn: Mutex<Connection>,
    meta: LedgerMeta,
}

impl std::fmt::Debug for SqliteLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLedger")
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}

impl SqliteLedger {
    /// Create a fresh ledger.  `encoding` is fixed for the ledger's lifetime.
    pub fn create_new(
        db_path: &Path,
        db_key: Option<&SecretString>,
        encoding: Encoding,
    ) -> Result<Self> {
        let meta = LedgerMeta {
            ledger_id: Uuid::new_v4(),
            created_at_utc: crate::util::now_utc_rfc3339(),
            schema_version: LEDGER_SCHEMA_VERSION,
            encoding,
            sqlcipher_cipher_version: None,
        };
        let ledger = Self::initialize(db_path, db_key, meta)?;
        info!(ledger_id = %ledger.meta.ledger_id, encoding = %encoding, "ledger created");
        Ok(ledger)
    }

    fn initialize(db_path: &Path, db_key: Option<&SecretString>, mut meta: LedgerMeta) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CustodyError::Store(format!("create db parent dir {}: {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .map_err(|e| CustodyError::Store(format!("open db {}: {e}", db_path.display())))?;
        // One salt per database, used for key derivation and kept beside it.
        let new_salt = match db_key {
            Some(_) => {
                let salt = generate_db_salt();
                write_db_salt(db_path, &salt)?;
                Some(salt)
            }
            None => None,
        };
        meta.sqlcipher_cipher_version =
            apply_sqlcipher_key_and_probe(&conn, db_key, new_salt.as_ref().map(|s| s.as_slice()))?;

        conn.execute_batch(SCHEMA_SQL).ctx_store("create tables")?;

        put_meta(&conn, "ledger_id", &meta.ledger_id.to_string())?;
        put_meta(&conn, "created_at_utc", &meta.created_at_utc)?;
        put_meta(&conn, "schema_version", &meta.schema_version.to_string())?;
        put_meta(&conn, "encoding", meta.encoding.as_str())?;
        if let Some(ref cv) = meta.sqlcipher_cipher_version {
            put_meta(&conn, "sqlcipher_cipher_version", cv)?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
            meta,
        })
    }

    pub fn open_existing(db_path: &Path, db_key: Option<&SecretString>) -> Result<Self> {
        if !db_path.exists() {
            return Err(CustodyError::Store(format!(
                "ledger {} does not exist",
                db_path.display()
            )));
        }
        let conn = Connection::open(db_path)
            .map_err(|e| CustodyError::Store(format!("open db {}: {e}", db_path.display())))?;
        let stored_salt = match db_key {
            Some(_) => Some(read_db_salt(db_path)?),
            None => None,
        };
        let cipher_version = apply_sqlcipher_key_and_probe(&conn, db_key, stored_salt.as_deref())?;

        let ledger_id = get_meta(&conn, "ledger_id")?;
        let created_at_utc = get_meta(&conn, "created_at_utc")?;
        let schema_version: i64 = get_meta(&conn, "schema_version")?
            .parse()
            .ctx_store("parse schema_version")?;
        if schema_version != LEDGER_SCHEMA_VERSION {
            return Err(CustodyError::Store(format!(
                "unsupported schema_version {schema_version} (expected {LEDGER_SCHEMA_VERSION})"
            )));
        }
        let encoding: Encoding = get_meta(&conn, "encoding")?
            .parse()
            .map_err(CustodyError::Store)?;

        let stored_cipher: Option<String> = conn
            .query_row("SELECT v FROM meta WHERE k='sqlcipher_cipher_version'", [], |row| row.get(0))
            .optional()?;

        let meta = LedgerMeta {
            ledger_id: Uuid::parse_str(&ledger_id).ctx_store("parse ledger_id uuid")?,
            created_at_utc,
            schema_version,
            encoding,
            sqlcipher_cipher_version: cipher_version.or(stored_cipher),
        };
        Ok(Self {
            conn: Mutex::new(conn),
            meta,
        })
    }

    /// Open the ledger at `db_path`, creating it with `encoding` if absent.
    pub fn open_or_create(
        db_path: &Path,
        db_key: Option<&SecretString>,
        encoding: Encoding,
    ) -> Result<Self> {
        if db_path.exists() {
            Self::open_existing(db_path, db_key)
        } else {
            Self::create_new(db_path, db_key, encoding)
        }
    }

    pub fn meta(&self) -> &LedgerMeta {
        &self.meta
    }

    pub fn encoding(&self) -> Encoding {
        self.meta.encoding
    }

    pub fn block_count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))
            .ctx_store("count blocks")?;
        Ok(n as u64)
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

fn put_meta(conn: &Connection, k: &str, v: &str) -> Result<()> {
    conn.execute("INSERT OR REPLACE INTO meta(k,v) VALUES (?1,?2)", params![k, v])?;
    Ok(())
}

fn get_meta(conn: &Connection, k: &str) -> Result<String> {
    conn.query_row("SELECT v FROM meta WHERE k=?1", params![k], |row| row.get(0))
        .ctx_store(&format!("read {k}"))
}

fn row_to_block(row: &Row<'_>) -> rusqlite::Result<Block> {
    let file_size: Option<i64> = row.get(9)?;
    Ok(Block {
        id: row.get(0)?,
        case_id: row.get(1)?,
        from: row.get(2)?,
        to: row.get(3)?,
        timestamp: row.get(4)?,
        file_hash: row.get(5)?,
        previous_hash: row.get(6)?,
        action: row.get(7)?,
        file_name: row.get(8)?,
        file_size: file_size.map(|n| n as u64),
        signature: row.get(10)?,
    })
}

fn insert_block(conn: &Connection, block: &Block) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT seq FROM blocks WHERE id=?1", params![block.id], |row| row.get(0))
        .optional()?;
    if exists.is_some() {
        return Err(CustodyError::Validation(format!("duplicate block id {}", block.id)));
    }
    let file_size = block
        .file_size
        .map(i64::try_from)
        .transpose()
        .ctx_validation("file size out of range")?;
    conn.execute(
        &format!("INSERT INTO blocks({BLOCK_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)"),
        params![
            block.id,
            block.case_id,
            block.from,
            block.to,
            block.timestamp,
            block.file_hash,
            block.previous_hash,
            block.action,
            block.file_name,
            file_size,
            block.signature,
        ],
    )
    .ctx_store("insert block")?;
    Ok(())
}

fn query_blocks(conn: &Connection, case_id: Option<&str>) -> Result<Vec<Block>> {
    let sql = match case_id {
        Some(_) => format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE case_id=?1 ORDER BY seq ASC"),
        None => format!("SELECT {BLOCK_COLUMNS} FROM blocks ORDER BY seq ASC"),
    };
    let mut stmt = conn.prepare(&sql).ctx_store("prepare select blocks")?;
    let rows = match case_id {
        Some(id) => stmt.query_map(params![id], row_to_block),
        None => stmt.query_map([], row_to_block),
    }
    .ctx_store("query blocks")?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn tail_id(conn: &Connection, case_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT id FROM blocks WHERE case_id=?1 ORDER BY seq DESC LIMIT 1",
            params![case_id],
            |row| row.get(0),
        )
        .optional()?)
}

fn load_case(conn: &Connection, case_id: &str) -> Result<Option<Case>> {
    let json: Option<String> = conn
        .query_row("SELECT case_json FROM cases WHERE id=?1", params![case_id], |row| row.get(0))
        .optional()?;
    json.map(|j| serde_json::from_str(&j).ctx_store(&format!("parse case {case_id}")))
        .transpose()
}

fn insert_case_row(conn: &Connection, case: &Case) -> Result<()> {
    if load_case(conn, &case.id)?.is_some() {
        return Err(CustodyError::Conflict(format!("case {} already exists", case.id)));
    }
    let json = serde_json::to_string(case).ctx_store("serialize case")?;
    conn.execute(
        "INSERT INTO cases(id, case_json, updated_at_utc) VALUES (?1,?2,?3)",
        params![case.id, json, crate::util::now_utc_rfc3339()],
    )
    .ctx_store("insert case")?;
    Ok(())
}

fn update_case_row(conn: &Connection, case_id: &str, update: &CaseUpdate) -> Result<Case> {
    let mut case = load_case(conn, case_id)?
        .ok_or_else(|| CustodyError::NotFound(format!("case {case_id}")))?;
    case.apply(update);
    let json = serde_json::to_string(&case).ctx_store("serialize case")?;
    conn.execute(
        "UPDATE cases SET case_json=?2, updated_at_utc=?3 WHERE id=?1",
        params![case_id, json, crate::util::now_utc_rfc3339()],
    )
    .ctx_store("update case")?;
    Ok(case)
}

fn begin(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .ctx_store("begin tx")
}

// ---------------------------------------------------------------------------
// Store traits
// ---------------------------------------------------------------------------

impl BlockStore for SqliteLedger {
    fn last_block(&self, case_id: &str) -> Result<Option<Block>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {BLOCK_COLUMNS} FROM blocks WHERE case_id=?1 ORDER BY seq DESC LIMIT 1"
                ),
                params![case_id],
                row_to_block,
            )
            .optional()?)
    }

    fn append_block(&self, block: &Block) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = begin(&mut conn)?;
        insert_block(&tx, block)?;
        tx.commit().ctx_store("commit tx")
    }

    fn blocks_for_case(&self, case_id: &str) -> Result<Vec<Block>> {
        query_blocks(&self.conn.lock(), Some(case_id))
    }

    fn all_blocks(&self) -> Result<Vec<Block>> {
        query_blocks(&self.conn.lock(), None)
    }
}

impl CaseStore for SqliteLedger {
    fn get_case(&self, case_id: &str) -> Result<Option<Case>> {
        load_case(&self.conn.lock(), case_id)
    }

    fn insert_case(&self, case: &Case) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = begin(&mut conn)?;
        insert_case_row(&tx, case)?;
        tx.commit().ctx_store("commit tx")
    }

    fn update_case(&self, case_id: &str, update: &CaseUpdate) -> Result<Case> {
        let mut conn = self.conn.lock();
        let tx = begin(&mut conn)?;
        let case = update_case_row(&tx, case_id, update)?;
        tx.commit().ctx_store("commit tx")?;
        Ok(case)
    }

    fn all_cases(&self) -> Result<Vec<Case>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT case_json FROM cases ORDER BY rowid ASC")
            .ctx_store("prepare select cases")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .ctx_store("query cases")?;
        let mut out = Vec::new();
        for json in rows {
            out.push(serde_json::from_str(&json?).ctx_store("parse case")?);
        }
        Ok(out)
    }
}

impl CustodyStore for SqliteLedger {
    fn commit(&self, block: &Block, parent_id: Option<&str>, write: &CaseWrite) -> Result<Case> {
        check_commit_shape(block, write)?;

        let mut conn = self.conn.lock();
        let tx = begin(&mut conn)?;
        let tail = tail_id(&tx, &block.case_id)?;
        check_parent(&block.case_id, tail.as_deref(), parent_id)?;

        let case = match write {
            CaseWrite::Create(case) => {
                insert_case_row(&tx, case)?;
                case.clone()
            }
            CaseWrite::Update { case_id, update } => update_case_row(&tx, case_id, update)?,
        };
        insert_block(&tx, block)?;
        tx.commit().ctx_store("commit tx")?;

        info!(case_id = %block.case_id, block_id = %block.id, action = %block.action, "committed block");
        Ok(case)
    }
}

// ---------------------------------------------------------------------------
// Backup / restore
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
struct LedgerExport {
    format: String,
    exported_at_utc: String,
    meta: LedgerMeta,
    blocks: Vec<Block>,
    cases: Vec<Case>,
}

const EXPORT_FORMAT: &str = "trustvault-ledger-backup-v1";

/// Export the full ledger (meta + blocks + cases) to a JSON file for backup.
pub fn export_ledger_json(ledger: &SqliteLedger, out_path: &Path) -> Result<()> {
    let export = LedgerExport {
        format: EXPORT_FORMAT.to_string(),
        exported_at_utc: crate::util::now_utc_rfc3339(),
        meta: ledger.meta().clone(),
        blocks: ledger.all_blocks()?,
        cases: ledger.all_cases()?,
    };
    let json = serde_json::to_vec_pretty(&export).ctx_store("serialize ledger export")?;
    std::fs::write(out_path, json)
        .map_err(|e| CustodyError::Store(format!("write export {}: {e}", out_path.display())))?;
    info!(
        path = %out_path.display(),
        blocks = export.blocks.len(),
        cases = export.cases.len(),
        "ledger exported"
    );
    Ok(())
}

/// Import a JSON backup into a new database.
///
/// Blocks are replayed byte-for-byte in their exported order.  The backup is
/// verified before anything is written; a backup holding any tampered chain
/// is refused.
pub fn import_ledger_json(
    json_path: &Path,
    db_path: &Path,
    db_key: Option<&SecretString>,
) -> Result<SqliteLedger> {
    let json_bytes = std::fs::read(json_path)
        .map_err(|e| CustodyError::Store(format!("read import {}: {e}", json_path.display())))?;
    let export: LedgerExport =
        serde_json::from_slice(&json_bytes).ctx_store("parse ledger backup")?;
    if export.format != EXPORT_FORMAT {
        return Err(CustodyError::Store(format!(
            "unsupported backup format '{}'",
            export.format
        )));
    }

    let reports = verify::audit_all(&export.blocks, export.meta.encoding);
    let tampered: Vec<&str> = reports
        .iter()
        .filter(|(_, r)| !r.valid)
        .map(|(id, _)| id.as_str())
        .collect();
    if !tampered.is_empty() {
        warn!(cases = ?tampered, "refusing to import tampered chains");
        return Err(CustodyError::Tampered(format!(
            "backup contains tampered chains: {}",
            tampered.join(", ")
        )));
    }

    if db_path.exists() {
        return Err(CustodyError::Conflict(format!(
            "import target {} already exists",
            db_path.display()
        )));
    }
    let meta = LedgerMeta {
        sqlcipher_cipher_version: None,
        ..export.meta.clone()
    };
    let ledger = match populate_import(db_path, db_key, meta, &export) {
        Ok(ledger) => ledger,
        Err(e) => {
            warn!(db = %db_path.display(), error = %e, "import failed, removing partial database");
            remove_db_files(db_path);
            return Err(e);
        }
    };
    info!(
        ledger_id = %ledger.meta.ledger_id,
        blocks = export.blocks.len(),
        cases = export.cases.len(),
        "ledger imported and verified"
    );
    Ok(ledger)
}

fn populate_import(
    db_path: &Path,
    db_key: Option<&SecretString>,
    meta: LedgerMeta,
    export: &LedgerExport,
) -> Result<SqliteLedger> {
    let ledger = SqliteLedger::initialize(db_path, db_key, meta)?;
    {
        let mut conn = ledger.conn.lock();
        let tx = begin(&mut conn)?;
        for b in &export.blocks {
            insert_block(&tx, b)?;
        }
        for c in &export.cases {
            insert_case_row(&tx, c)?;
        }
        tx.commit().ctx_store("commit import")?;
    }
    Ok(ledger)
}

/// Remove a database together with its WAL, shared-memory and salt files.
fn remove_db_files(db_path: &Path) {
    let mut paths = vec![db_path.to_path_buf(), salt_path(db_path)];
    for suffix in ["-wal", "-shm"] {
        let mut name = db_path.as_os_str().to_owned();
        name.push(suffix);
        paths.push(PathBuf::from(name));
    }
    for p in paths {
        if let Err(e) = std::fs::remove_file(&p) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %p.display(), error = %e, "could not remove file");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SQLCipher helpers
// ---------------------------------------------------------------------------

fn apply_sqlcipher_key_and_probe(
    conn: &Connection,
    db_key: Option<&SecretString>,
    salt: Option<&[u8]>,
) -> Result<Option<String>> {
    if let Some(key) = db_key {
        let salt = salt.ok_or_else(|| CustodyError::Store("missing db salt for encrypted database".into()))?;
        let derived = derive_db_key(key.expose_secret(), salt);
        let pragma_key = format!("x'{}'", hex::encode(derived));
        let _ = conn.execute("PRAGMA key = ?1;", params![pragma_key]);
        let _ = conn.execute_batch(
            r#"
            PRAGMA cipher_compatibility = 4;
            PRAGMA cipher_memory_security = ON;
            "#,
        );
    }

    let cipher_version: Option<String> = conn
        .query_row("PRAGMA cipher_version;", [], |row| row.get(0))
        .optional()
        .unwrap_or(None);

    if db_key.is_some() && cipher_version.is_none() {
        return Err(CustodyError::Store(
            "database key provided but SQLCipher not active (cipher_version probe failed)".into(),
        ));
    }
    if let Some(ref cv) = cipher_version {
        info!(sqlcipher_cipher_version = %cv, "SQLCipher detected");
    }
    Ok(cipher_version)
}

/// Salt length for per-database key derivation.
const DB_SALT_LEN: usize = 16;

/// The salt sits beside the database because it is needed before the
/// database can be decrypted.
fn salt_path(db_path: &Path) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(".salt");
    PathBuf::from(name)
}

fn write_db_salt(db_path: &Path, salt: &[u8]) -> Result<()> {
    let p = salt_path(db_path);
    std::fs::write(&p, hex::encode(salt))
        .map_err(|e| CustodyError::Store(format!("write salt {}: {e}", p.display())))
}

fn read_db_salt(db_path: &Path) -> Result<Vec<u8>> {
    let p = salt_path(db_path);
    let text = std::fs::read_to_string(&p)
        .map_err(|e| CustodyError::Store(format!("read salt {}: {e}", p.display())))?;
    hex::decode(text.trim()).ctx_store("decode db salt")
}

fn derive_db_key(passphrase: &str, salt: &[u8]) -> [u8; 32] {
    const ITERATIONS: u32 = 100_000;
    let mut out = [0u8; 32];
    pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, ITERATIONS, &mut out);
    out
}

fn generate_db_salt() -> [u8; DB_SALT_LEN] {
    use rand::RngCore as _;
    let mut salt = [0u8; DB_SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    salt
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{BlockDraft, CaseStatus};
    use crate::builder::ChainBuilder;
    use tempfile::tempdir;

    fn case(id: &str) -> Case {
        Case {
            id: id.into(),
            title: "Warehouse fire".into(),
            description: String::new(),
            details: Default::default(),
            status: CaseStatus::Pending,
            current_holder: "Police".into(),
            created_by: "police@trustvault.com".into(),
            created_at: crate::util::now_utc_rfc3339(),
            evidence_files: vec![],
            lab_report: None,
            hospital_report: None,
        }
    }

    fn genesis(ledger: &SqliteLedger, case_id: &str) -> Block {
        ChainBuilder::new(ledger.encoding()).build_after(
            None,
            BlockDraft::new(case_id, "System", "Police", "Case Created", "abc123")
                .with_file("scene.jpg", 2048),
            None,
        )
    }

    #[test]
    fn create_and_open_ledger() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("test.db");
        let ledger = SqliteLedger::create_new(&db, None, Encoding::Legacy).unwrap();
        let meta = ledger.meta().clone();
        drop(ledger);

        let reopened = SqliteLedger::open_existing(&db, None).unwrap();
        assert_eq!(reopened.meta().ledger_id, meta.ledger_id);
        assert_eq!(reopened.encoding(), Encoding::Legacy);
    }

    #[test]
    fn open_missing_ledger_is_store_error() {
        let dir = tempdir().unwrap();
        let err = SqliteLedger::open_existing(&dir.path().join("nope.db"), None).unwrap_err();
        assert!(matches!(err, CustodyError::Store(_)));
    }

    #[test]
    fn commit_round_trips_block_and_case() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::create_new(&dir.path().join("t.db"), None, Encoding::default()).unwrap();
        let b = genesis(&ledger, "C1");
        let stored = ledger.commit(&b, None, &CaseWrite::Create(case("C1"))).unwrap();
        assert_eq!(stored.id, "C1");

        assert_eq!(ledger.last_block("C1").unwrap(), Some(b.clone()));
        assert_eq!(ledger.blocks_for_case("C1").unwrap(), vec![b]);
        assert_eq!(ledger.get_case("C1").unwrap().unwrap().current_holder, "Police");
        assert!(ledger.last_block("C2").unwrap().is_none());
        assert_eq!(ledger.block_count().unwrap(), 1);
    }

    #[test]
    fn failed_case_write_rolls_back_block() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::create_new(&dir.path().join("t.db"), None, Encoding::default()).unwrap();
        let b = genesis(&ledger, "C1");
        let err = ledger
            .commit(&b, None, &CaseWrite::Update { case_id: "C1".into(), update: CaseUpdate::default() })
            .unwrap_err();
        assert!(matches!(err, CustodyError::NotFound(_)));
        assert_eq!(ledger.block_count().unwrap(), 0);
    }

    #[test]
    fn stale_parent_is_conflict() {
        let dir = tempdir().unwrap();
        let ledger = SqliteLedger::create_new(&dir.path().join("t.db"), None, Encoding::default()).unwrap();
        let b = genesis(&ledger, "C1");
        ledger.commit(&b, None, &CaseWrite::Create(case("C1"))).unwrap();
        let fork = genesis(&ledger, "C1");
        let err = ledger
            .commit(&fork, None, &CaseWrite::Update { case_id: "C1".into(), update: CaseUpdate::default() })
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn blocks_table_rejects_updates() {
        let dir = tempdir().unwrap();
        let db = dir.path().join("t.db");
        let ledger = SqliteLedger::create_new(&db, None, Encoding::default()).unwrap();
        ledger.append_block(&genesis(&ledger, "C1")).unwrap();
        drop(ledger);

        let conn = Connection::open(&db).unwrap();
        let err = conn
            .execute("UPDATE blocks SET action='Case Deleted'", [])
            .unwrap_err();
        assert!(err.to_string().contains("append-only"));
    }

    #[test]
    fn db_key_without_sqlcipher_is_rejected() {
        if cfg!(feature = "sqlcipher") {
            return;
        }
        let dir = tempdir().unwrap();
        let key = SecretString::new("passphrase".into());
        let err = SqliteLedger::create_new(&dir.path().join("enc.db"), Some(&key), Encoding::default())
            .unwrap_err();
        assert!(err.to_string().contains("SQLCipher not active"));
    }
}
