//! LedgerLens Core Library
//!
//! Statement import and anomaly scoring for the LedgerLens ledger:
//! - Database access and migrations (SQLCipher, pooled)
//! - Format routing and CSV/PDF row extraction with layered fallbacks
//! - Row normalization (dates, signed amounts, merchant text)
//! - Rule-based merchant categorization
//! - Import job lifecycle with atomic persistence
//! - Isolation-forest anomaly scoring with readable explanations

pub mod anomaly;
pub mod categorize;
pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod models;
pub mod pipeline;

pub use anomaly::{AnomalyScorer, RecalculationSummary};
pub use categorize::{run_automation, AutomationResult, CategorizationEngine};
pub use config::{AnomalyConfig, ImportConfig, LedgerConfig};
pub use db::{Database, PersistedImport, TransactionFilter};
pub use error::{Error, Result};
pub use import::{route_format, ParsedRow};
pub use pipeline::{ImportJobManager, ImportOutcome, UploadRequest};
