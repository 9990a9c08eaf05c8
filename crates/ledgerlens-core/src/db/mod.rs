//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `accounts` - Linked bank accounts/cards
//! - `categories` - Categories and merchant rules
//! - `import_jobs` - Import job lifecycle and skipped-row ledger
//! - `transactions` - Transaction CRUD, review updates, anomaly fields

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::info;

use crate::error::{Error, Result};

mod accounts;
mod categories;
mod import_jobs;
mod transactions;

pub(crate) use categories::active_rules;
pub use import_jobs::PersistedImport;
pub(crate) use transactions::{transactions_in_window, write_anomaly_annotations};
pub use transactions::{TransactionFilter, TransactionInsertResult};

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "LEDGERLENS_DB_KEY";

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Fixed application salt - changing this would invalidate all existing encrypted databases
    const APP_SALT: &[u8; 16] = b"ledgerlens-salt1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap_or_default()
}

pub(crate) fn parse_time(s: Option<String>) -> Option<NaiveTime> {
    s.and_then(|t| NaiveTime::parse_from_str(&t, "%H:%M:%S").ok())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `LEDGERLENS_DB_KEY` environment variable to be set.
    /// Returns an error if it is not; use `new_unencrypted()` for
    /// development/testing without encryption.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };

        // Every pooled connection gets the key, foreign keys and a busy timeout,
        // so concurrent writers queue instead of failing with SQLITE_BUSY.
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(pragma) = &key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS as u64))?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because SQLCipher
    /// has issues with in-memory databases in the connection pool.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "ledgerlens_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove any existing file
        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path)
    }

    /// Check if the database is encrypted
    pub fn is_encrypted(&self) -> Result<bool> {
        let conn = self.conn()?;
        // SQLCipher sets cipher_version if encryption is active
        let result: rusqlite::Result<String> =
            conn.query_row("PRAGMA cipher_version;", [], |row| row.get(0));
        Ok(result.is_ok() && std::env::var(DB_KEY_ENV).is_ok())
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the writer during imports
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;

            -- Linked bank accounts / cards
            CREATE TABLE IF NOT EXISTS accounts (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                bank_name TEXT,
                card_last_four TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_accounts_user ON accounts(user_id);

            -- Spending categories
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(user_id, name)
            );

            -- Merchant-text-to-category rules, evaluated in id order
            CREATE TABLE IF NOT EXISTS merchant_rules (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                pattern TEXT NOT NULL,
                match_type TEXT NOT NULL DEFAULT 'partial'
                    CHECK (match_type IN ('exact', 'partial')),
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_merchant_rules_user ON merchant_rules(user_id, is_active);

            -- One row per upload
            CREATE TABLE IF NOT EXISTS import_jobs (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                filename TEXT NOT NULL,
                file_type TEXT NOT NULL CHECK (file_type IN ('csv', 'pdf')),
                status TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
                statement_period TEXT,
                account_id INTEGER REFERENCES accounts(id) ON DELETE SET NULL,
                bank_name TEXT,
                card_last_four TEXT,
                total_transactions INTEGER NOT NULL DEFAULT 0,     -- rows attempted
                processed_transactions INTEGER NOT NULL DEFAULT 0, -- rows parsed
                filtered_rows INTEGER NOT NULL DEFAULT 0,          -- summary rows dropped
                duplicate_rows INTEGER NOT NULL DEFAULT 0,         -- parsed but already imported
                total_amount REAL NOT NULL DEFAULT 0,
                error_message TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                completed_at DATETIME,
                -- completed_at is set iff the job reached a terminal state
                CHECK ((status IN ('completed', 'failed')) = (completed_at IS NOT NULL))
            );

            CREATE INDEX IF NOT EXISTS idx_import_jobs_user ON import_jobs(user_id, created_at);

            -- Rows attempted but not imported
            CREATE TABLE IF NOT EXISTS import_skipped_rows (
                id INTEGER PRIMARY KEY,
                import_job_id INTEGER NOT NULL REFERENCES import_jobs(id) ON DELETE CASCADE,
                page INTEGER,
                line INTEGER NOT NULL,
                date_text TEXT NOT NULL,
                amount_text TEXT NOT NULL,
                merchant_text TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_skipped_rows_job ON import_skipped_rows(import_job_id);

            -- Ledger entries
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id INTEGER NOT NULL,
                date TEXT NOT NULL,                       -- YYYY-MM-DD
                time TEXT,                                -- HH:MM:SS
                amount REAL NOT NULL,                     -- debit positive, credit negative
                merchant TEXT NOT NULL,
                description TEXT,
                category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                bank_name TEXT,
                card_last_four TEXT,
                source TEXT NOT NULL DEFAULT 'manual',
                status TEXT NOT NULL DEFAULT 'pending',
                is_anomaly INTEGER NOT NULL DEFAULT 0,
                anomaly_score REAL NOT NULL DEFAULT 0,
                anomaly_severity TEXT,
                anomaly_explanation TEXT,
                import_job_id INTEGER REFERENCES import_jobs(id) ON DELETE CASCADE,
                import_hash TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_transactions_job ON transactions(import_job_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_import_hash
                ON transactions(user_id, import_hash) WHERE import_hash IS NOT NULL;
            "#,
        )?;

        info!("Database migrations complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests;
