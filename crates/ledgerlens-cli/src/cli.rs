//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// LedgerLens - Import bank statements and flag unusual spending
#[derive(Parser)]
#[command(name = "ledgerlens")]
#[command(about = "Statement import and anomaly scoring for your ledger", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "ledgerlens.db", global = true)]
    pub db: PathBuf,

    /// Config file (defaults to ~/.config/ledgerlens/config.toml, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// User whose ledger to operate on
    #[arg(short, long, default_value = "1", global = true)]
    pub user: i64,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set LEDGERLENS_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Import a CSV or PDF statement
    Import {
        /// Statement file (.csv or .pdf)
        #[arg(short, long)]
        file: PathBuf,

        /// Bank name applied to every imported row
        #[arg(short, long)]
        bank: Option<String>,

        /// Card last four digits applied to every imported row
        #[arg(short, long)]
        card: Option<String>,

        /// Statement period label, e.g. "Jan 2024" (also sets the year for dates without one)
        #[arg(short, long)]
        period: Option<String>,

        /// Linked account ID (fills bank and card when not given)
        #[arg(short, long)]
        account: Option<i64>,

        /// Print the job and created transactions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import job history
    Jobs {
        #[command(subcommand)]
        action: Option<JobsAction>,
    },

    /// List and review transactions
    Transactions {
        #[command(subcommand)]
        action: Option<TransactionsAction>,
    },

    /// Manage categories
    Categories {
        #[command(subcommand)]
        action: Option<CategoriesAction>,
    },

    /// Manage merchant categorization rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Manage linked accounts
    Accounts {
        #[command(subcommand)]
        action: Option<AccountsAction>,
    },

    /// Re-apply merchant rules to all transactions
    Automate,

    /// Anomaly scoring
    Anomalies {
        #[command(subcommand)]
        action: Option<AnomaliesAction>,
    },
}

#[derive(Subcommand)]
pub enum JobsAction {
    /// List recent import jobs
    List {
        /// Maximum number of jobs to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show one job with its skipped rows
    Show {
        /// Job ID
        id: i64,
    },

    /// Delete a job and every transaction it created
    Delete {
        /// Job ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum TransactionsAction {
    /// List transactions (newest first)
    List {
        /// Maximum number of transactions to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Only transactions from this import job
        #[arg(long)]
        job: Option<i64>,

        /// Only flagged anomalies
        #[arg(long)]
        anomalies: bool,
    },

    /// Enter a transaction by hand
    Add {
        /// Date (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Amount (positive = debit, negative = credit)
        #[arg(long, allow_hyphen_values = true)]
        amount: f64,

        /// Merchant name
        #[arg(long)]
        merchant: String,

        /// Optional description
        #[arg(long)]
        description: Option<String>,

        /// Category name
        #[arg(long)]
        category: Option<String>,
    },

    /// Set status and/or category on one or more transactions
    Review {
        /// Transaction IDs
        #[arg(required = true)]
        ids: Vec<i64>,

        /// New status: pending, processed, reviewed
        #[arg(short, long)]
        status: Option<String>,

        /// Category name
        #[arg(short, long)]
        category: Option<String>,

        /// Clear the category
        #[arg(long, conflicts_with = "category")]
        clear_category: bool,
    },

    /// Delete one or more transactions
    Delete {
        /// Transaction IDs
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
pub enum CategoriesAction {
    /// List categories
    List,

    /// Add a category
    Add {
        /// Category name
        name: String,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// List rules in evaluation order
    List,

    /// Add a rule
    Add {
        /// Text to look for in the merchant name
        pattern: String,

        /// Category name (created if missing)
        #[arg(short, long)]
        category: String,

        /// Match the whole merchant name instead of a substring
        #[arg(long)]
        exact: bool,
    },

    /// Enable or disable a rule
    Toggle {
        /// Rule ID
        id: i64,

        /// Disable instead of enable
        #[arg(long)]
        off: bool,
    },

    /// Delete a rule
    Delete {
        /// Rule ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum AccountsAction {
    /// List accounts
    List,

    /// Add an account
    Add {
        /// Account name
        name: String,

        /// Bank name
        #[arg(short, long)]
        bank: Option<String>,

        /// Card last four digits
        #[arg(short, long)]
        card: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum AnomaliesAction {
    /// List flagged transactions
    List {
        /// Lookback window in months (defaults to config)
        #[arg(short, long)]
        months: Option<u32>,

        /// End of the window (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        as_of: Option<String>,
    },

    /// Recompute scores for the window
    Recalc {
        /// Lookback window in months (defaults to config)
        #[arg(short, long)]
        months: Option<u32>,

        /// End of the window (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        as_of: Option<String>,
    },
}
