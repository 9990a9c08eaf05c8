//! Import job orchestration
//!
//! One call to [`ImportJobManager::upload`] routes the file, extracts and
//! normalizes its rows, categorizes them, and persists the transactions
//! together with the job's final counters. Everything happens on the
//! calling thread; only PDF text extraction runs on a helper thread so it
//! can be bounded by a timeout.
//!
//! Expected document problems (unreadable file, nothing extractable) end
//! with a `failed` job and an `Ok` outcome. Anything else marks the job
//! failed and is returned as an error.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::categorize::CategorizationEngine;
use crate::config::ImportConfig;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::import::{extract_rows, route_format, RowNormalizer};
use crate::models::{
    FileType, ImportJob, ImportStatus, ImportTotals, NewImportJob, NewSkippedRow, NewTransaction,
    Transaction,
};

/// An uploaded statement plus caller-supplied job metadata
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub user_id: i64,
    pub filename: String,
    pub bytes: Vec<u8>,
    pub bank_name: Option<String>,
    pub card_last_four: Option<String>,
    /// Free-form label such as "Jan 2024"
    pub statement_period: Option<String>,
    pub account_id: Option<i64>,
}

/// What one upload produced
#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub job: ImportJob,
    /// Newly created transactions (empty for failed jobs and pure re-imports)
    pub transactions: Vec<Transaction>,
    pub skipped: Vec<NewSkippedRow>,
    /// Extraction strategy that produced the rows
    pub strategy: Option<&'static str>,
}

impl ImportOutcome {
    /// Nothing was created; callers show this as an empty result, not an error
    pub fn is_empty_result(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Stable identity of an imported row
///
/// `occurrence` separates identical purchases within one statement, so a
/// re-import of the same file maps onto the same hashes.
pub fn import_hash(
    user_id: i64,
    date: NaiveDate,
    amount: f64,
    merchant: &str,
    occurrence: usize,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(
        format!(
            "{}|{}|{:.2}|{}|{}",
            user_id,
            date,
            amount,
            merchant.trim().to_lowercase(),
            occurrence
        )
        .as_bytes(),
    );
    hex::encode(hasher.finalize())
}

/// Drives one upload through the job lifecycle
pub struct ImportJobManager<'a> {
    db: &'a Database,
    config: ImportConfig,
}

impl<'a> ImportJobManager<'a> {
    pub fn new(db: &'a Database, config: ImportConfig) -> Self {
        Self { db, config }
    }

    /// Import one statement
    ///
    /// Fails with `UnsupportedFormat` before any job exists when the
    /// extension is not `.csv` or `.pdf`.
    pub fn upload(&self, request: UploadRequest) -> Result<ImportOutcome> {
        let file_type = route_format(&request.filename)?;
        let new_job = self.job_metadata(&request)?;

        let job = self.db.create_import_job(file_type, &new_job)?;
        info!(
            "Import job {} created for '{}' ({})",
            job.id, job.filename, file_type
        );
        let job = self.db.start_import_job(job.id)?;

        match self.process(&job, file_type, &request) {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_document_failure() => {
                warn!("Import job {} failed: {}", job.id, e);
                let job =
                    self.db
                        .fail_import_job(job.id, &e.to_string(), &ImportTotals::default(), &[])?;
                Ok(ImportOutcome {
                    job,
                    transactions: Vec::new(),
                    skipped: Vec::new(),
                    strategy: None,
                })
            }
            Err(e) => {
                error!("Import job {} aborted: {}", job.id, e);
                // A failed save has already marked the job
                let still_processing = matches!(
                    self.db.get_import_job(job.user_id, job.id),
                    Ok(Some(current)) if current.status == ImportStatus::Processing
                );
                if still_processing {
                    self.mark_failed(job.id, &format!("Import failed: {}", e));
                }
                Err(e)
            }
        }
    }

    /// Best-effort failure marking on the error path
    fn mark_failed(&self, job_id: i64, message: &str) {
        if let Err(mark_err) =
            self.db
                .fail_import_job(job_id, message, &ImportTotals::default(), &[])
        {
            error!("Could not mark import job {} failed: {}", job_id, mark_err);
        }
    }

    /// Fill bank/card defaults from the linked account
    fn job_metadata(&self, request: &UploadRequest) -> Result<NewImportJob> {
        let mut job = NewImportJob {
            user_id: request.user_id,
            filename: request.filename.clone(),
            statement_period: request.statement_period.clone(),
            account_id: request.account_id,
            bank_name: request.bank_name.clone(),
            card_last_four: request.card_last_four.clone(),
        };

        if let Some(account_id) = request.account_id {
            let account = self
                .db
                .get_account(request.user_id, account_id)?
                .ok_or_else(|| Error::NotFound(format!("Account {}", account_id)))?;
            job.bank_name = job.bank_name.or(account.bank_name);
            job.card_last_four = job.card_last_four.or(account.card_last_four);
        }
        Ok(job)
    }

    fn process(
        &self,
        job: &ImportJob,
        file_type: FileType,
        request: &UploadRequest,
    ) -> Result<ImportOutcome> {
        let document = extract_rows(file_type, &request.bytes, &self.config)?;

        let normalizer = RowNormalizer::for_period(
            job.statement_period.as_deref(),
            Utc::now().year(),
        );
        let engine = CategorizationEngine::for_user(self.db, job.user_id)?;

        let mut transactions = Vec::with_capacity(document.rows.len());
        let mut skipped = Vec::new();
        let mut occurrences: HashMap<(NaiveDate, i64, String), usize> = HashMap::new();
        let mut total_amount = 0.0;

        for row in &document.rows {
            let normalized = match normalizer.normalize(row) {
                Ok(n) => n,
                Err(reason) => {
                    skipped.push(NewSkippedRow {
                        page: row.page.map(|p| p as i64),
                        line: row.line as i64,
                        date_text: row.date_text.clone(),
                        amount_text: row.amount_text.clone(),
                        merchant_text: row.merchant_text.clone(),
                        reason,
                    });
                    continue;
                }
            };

            let key = (
                normalized.date,
                (normalized.amount * 100.0).round() as i64,
                normalized.merchant.to_lowercase(),
            );
            let occurrence = occurrences.entry(key).or_insert(0);
            let hash = import_hash(
                job.user_id,
                normalized.date,
                normalized.amount,
                &normalized.merchant,
                *occurrence,
            );
            *occurrence += 1;

            total_amount += normalized.amount;
            transactions.push(NewTransaction {
                user_id: job.user_id,
                date: normalized.date,
                time: normalized.time,
                amount: normalized.amount,
                category_id: engine.categorize(&normalized.merchant),
                merchant: normalized.merchant,
                description: normalized.description,
                bank_name: job.bank_name.clone(),
                card_last_four: job.card_last_four.clone(),
                source: file_type.source(),
                import_hash: Some(hash),
            });
        }

        let totals = ImportTotals {
            total_transactions: document.rows.len() as i64,
            processed_transactions: transactions.len() as i64,
            filtered_rows: document.filtered as i64,
            duplicate_rows: 0,
            total_amount: (total_amount * 100.0).round() / 100.0,
        };

        if transactions.is_empty() {
            let message = Error::NoExtractableRows(format!(
                "all {} rows failed to parse",
                document.rows.len()
            ))
            .to_string();
            warn!("Import job {} failed: {}", job.id, message);
            let job = self
                .db
                .fail_import_job(job.id, &message, &totals, &skipped)?;
            return Ok(ImportOutcome {
                job,
                transactions: Vec::new(),
                skipped,
                strategy: Some(document.strategy),
            });
        }

        let persisted = match self
            .db
            .persist_import(job.id, &transactions, &skipped, &totals)
        {
            Ok(persisted) => persisted,
            Err(e) => {
                self.mark_failed(job.id, &format!("Failed to save transactions: {}", e));
                return Err(e);
            }
        };

        info!(
            "Import job {} completed via {}: {} attempted, {} parsed, {} new, {} duplicates, {} summary rows filtered",
            job.id,
            document.strategy,
            totals.total_transactions,
            totals.processed_transactions,
            persisted.transactions.len(),
            persisted.duplicates,
            totals.filtered_rows
        );
        if persisted.job.is_partial() {
            warn!(
                "Import job {} skipped {} of {} rows",
                job.id,
                persisted.job.skipped_rows(),
                persisted.job.total_transactions
            );
        }

        Ok(ImportOutcome {
            job: persisted.job,
            transactions: persisted.transactions,
            skipped,
            strategy: Some(document.strategy),
        })
    }
}
