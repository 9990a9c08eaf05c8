//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Resolve the config file
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use ledgerlens_core::{db::Database, LedgerConfig};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path is not valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load an explicit config file, the user override, or built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<LedgerConfig> {
    LedgerConfig::load(path).context("Failed to load config")
}

/// Parse a YYYY-MM-DD argument, defaulting to today
pub fn parse_day(arg: Option<&str>) -> Result<NaiveDate> {
    match arg {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("Invalid date '{}' (expected YYYY-MM-DD)", s)),
        None => Ok(Local::now().date_naive()),
    }
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    open_db(db_path, no_encrypt)?;

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Add merchant rules: ledgerlens rules add starbucks --category Coffee");
    println!("  2. Import a statement: ledgerlens import --file statement.pdf");
    println!("  3. Flag unusual spending: ledgerlens anomalies recalc");

    Ok(())
}
