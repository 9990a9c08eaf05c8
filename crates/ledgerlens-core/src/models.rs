//! Domain models for LedgerLens

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A user's bank account or card, optionally linked to imports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub bank_name: Option<String>,
    pub card_last_four: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Statement file type, chosen from the upload's extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Pdf,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Pdf => "pdf",
        }
    }

    /// Source tag given to transactions imported from this file type
    pub fn source(&self) -> TransactionSource {
        match self {
            Self::Csv => TransactionSource::ImportedCsv,
            Self::Pdf => TransactionSource::ImportedPdf,
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "pdf" => Ok(Self::Pdf),
            _ => Err(format!("Unknown file type: {}", s)),
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Import job lifecycle status
///
/// `pending -> processing -> {completed | failed}`. Completed and failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::str::FromStr for ImportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown import status: {}", s)),
        }
    }
}

impl std::fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One upload's tracked lifecycle record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub id: i64,
    pub user_id: i64,
    pub filename: String,
    pub file_type: FileType,
    pub status: ImportStatus,
    pub statement_period: Option<String>,
    pub account_id: Option<i64>,
    pub bank_name: Option<String>,
    pub card_last_four: Option<String>,
    /// Rows attempted (summary rows excluded)
    pub total_transactions: i64,
    /// Rows that normalized successfully, duplicates included
    pub processed_transactions: i64,
    /// Summary/total/balance rows dropped before normalization
    pub filtered_rows: i64,
    /// Parsed rows already present in the ledger
    pub duplicate_rows: i64,
    /// Signed sum of successfully parsed amounts
    pub total_amount: f64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    /// Rows that were attempted but failed to normalize
    pub fn skipped_rows(&self) -> i64 {
        self.total_transactions - self.processed_transactions
    }

    /// Completed with a visible discrepancy between attempted and parsed rows
    pub fn is_partial(&self) -> bool {
        self.status == ImportStatus::Completed && self.skipped_rows() > 0
    }
}

/// Caller-supplied metadata for a new import job
#[derive(Debug, Clone, Default)]
pub struct NewImportJob {
    pub user_id: i64,
    pub filename: String,
    pub statement_period: Option<String>,
    pub account_id: Option<i64>,
    pub bank_name: Option<String>,
    pub card_last_four: Option<String>,
}

/// Final counters written when a job completes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImportTotals {
    pub total_transactions: i64,
    pub processed_transactions: i64,
    pub filtered_rows: i64,
    pub duplicate_rows: i64,
    pub total_amount: f64,
}

/// Transaction source - how it was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    #[default]
    Manual,
    ImportedCsv,
    ImportedPdf,
}

impl TransactionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::ImportedCsv => "imported_csv",
            Self::ImportedPdf => "imported_pdf",
        }
    }
}

impl std::str::FromStr for TransactionSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manual" => Ok(Self::Manual),
            "imported_csv" => Ok(Self::ImportedCsv),
            "imported_pdf" => Ok(Self::ImportedPdf),
            _ => Err(format!("Unknown transaction source: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review status of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Processed,
    Reviewed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Reviewed => "reviewed",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processed" => Ok(Self::Processed),
            "reviewed" => Ok(Self::Reviewed),
            _ => Err(format!("Unknown transaction status: {}", s)),
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A durable ledger entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    /// Positive = debit (spending), negative = credit (refund, payment)
    pub amount: f64,
    pub merchant: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub bank_name: Option<String>,
    pub card_last_four: Option<String>,
    pub source: TransactionSource,
    pub status: TransactionStatus,
    pub is_anomaly: bool,
    pub anomaly_score: f64,
    pub anomaly_severity: Option<Severity>,
    pub anomaly_explanation: Option<String>,
    /// None for manually entered rows
    pub import_job_id: Option<i64>,
    /// Hash for deduplication (imported rows only)
    pub import_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A transaction ready for insertion
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: i64,
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub amount: f64,
    pub merchant: String,
    pub description: Option<String>,
    pub category_id: Option<i64>,
    pub bank_name: Option<String>,
    pub card_last_four: Option<String>,
    pub source: TransactionSource,
    pub import_hash: Option<String>,
}

/// Partial update applied by review actions
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub status: Option<TransactionStatus>,
    /// `Some(None)` clears the category
    pub category_id: Option<Option<i64>>,
    pub merchant: Option<String>,
    pub description: Option<Option<String>>,
}

/// A user-defined spending category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// How a merchant rule compares its pattern (always case-insensitive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Exact,
    #[default]
    Partial,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Partial => "partial",
        }
    }
}

impl std::str::FromStr for MatchType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "partial" | "contains" => Ok(Self::Partial),
            _ => Err(format!("Unknown match type: {}", s)),
        }
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Merchant-text-to-category mapping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantRule {
    pub id: i64,
    pub user_id: i64,
    pub pattern: String,
    pub match_type: MatchType,
    pub category_id: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Discrete anomaly classification derived from the continuous score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Medium and high are flagged as anomalies
    pub fn is_flagged(&self) -> bool {
        *self >= Self::Medium
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Anomaly fields computed for one transaction by a recalculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAnnotation {
    pub transaction_id: i64,
    pub score: f64,
    pub severity: Severity,
    pub is_anomaly: bool,
    pub explanation: Option<String>,
}

/// Why a parsed row was dropped during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSkipReason {
    InvalidDate,
    InvalidAmount,
    MissingMerchant,
}

impl RowSkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidDate => "invalid_date",
            Self::InvalidAmount => "invalid_amount",
            Self::MissingMerchant => "missing_merchant",
        }
    }
}

impl std::str::FromStr for RowSkipReason {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "invalid_date" => Ok(Self::InvalidDate),
            "invalid_amount" => Ok(Self::InvalidAmount),
            "missing_merchant" => Ok(Self::MissingMerchant),
            _ => Err(format!("Unknown skip reason: {}", s)),
        }
    }
}

impl std::fmt::Display for RowSkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A row that was attempted but not imported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedRow {
    pub id: i64,
    pub import_job_id: i64,
    pub page: Option<i64>,
    pub line: i64,
    pub date_text: String,
    pub amount_text: String,
    pub merchant_text: String,
    pub reason: RowSkipReason,
    pub created_at: DateTime<Utc>,
}

/// A skipped row before it is recorded against a job
#[derive(Debug, Clone, PartialEq)]
pub struct NewSkippedRow {
    pub page: Option<i64>,
    pub line: i64,
    pub date_text: String,
    pub amount_text: String,
    pub merchant_text: String,
    pub reason: RowSkipReason,
}
