//! Import job lifecycle and skipped-row ledger

use rusqlite::{params, Connection, OptionalExtension};

use super::transactions::{insert_transaction_in, TransactionInsertResult, TRANSACTION_COLUMNS};
use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{
    FileType, ImportJob, ImportStatus, ImportTotals, NewImportJob, NewSkippedRow, NewTransaction,
    SkippedRow, Transaction,
};

const JOB_COLUMNS: &str = "id, user_id, filename, file_type, status, statement_period, account_id, \
     bank_name, card_last_four, total_transactions, processed_transactions, filtered_rows, \
     duplicate_rows, total_amount, error_message, created_at, completed_at";

/// Everything written when a job completes
#[derive(Debug, Clone)]
pub struct PersistedImport {
    pub job: ImportJob,
    /// Newly inserted transactions, in insertion order
    pub transactions: Vec<Transaction>,
    pub duplicates: usize,
}

fn get_job_in(conn: &Connection, job_id: i64) -> Result<Option<ImportJob>> {
    let job = conn
        .query_row(
            &format!("SELECT {} FROM import_jobs WHERE id = ?", JOB_COLUMNS),
            params![job_id],
            Database::row_to_import_job,
        )
        .optional()?;
    Ok(job)
}

/// Check that `job_id` may move to `next`, returning the current job
fn require_transition(conn: &Connection, job_id: i64, next: ImportStatus) -> Result<ImportJob> {
    let job = get_job_in(conn, job_id)?
        .ok_or_else(|| Error::NotFound(format!("Import job {}", job_id)))?;
    if !job.status.can_transition_to(next) {
        return Err(Error::InvalidTransition(format!(
            "import job {} cannot move from {} to {}",
            job_id, job.status, next
        )));
    }
    Ok(job)
}

fn insert_skipped_rows(conn: &Connection, job_id: i64, rows: &[NewSkippedRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO import_skipped_rows
            (import_job_id, page, line, date_text, amount_text, merchant_text, reason)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )?;
    for row in rows {
        stmt.execute(params![
            job_id,
            row.page,
            row.line,
            row.date_text,
            row.amount_text,
            row.merchant_text,
            row.reason.as_str(),
        ])?;
    }
    Ok(())
}

impl Database {
    /// Create a job in `pending` status
    pub fn create_import_job(&self, file_type: FileType, job: &NewImportJob) -> Result<ImportJob> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO import_jobs (user_id, filename, file_type, statement_period, account_id,
                                     bank_name, card_last_four)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                job.user_id,
                job.filename,
                file_type.as_str(),
                job.statement_period,
                job.account_id,
                job.bank_name,
                job.card_last_four,
            ],
        )?;
        let id = conn.last_insert_rowid();
        get_job_in(&conn, id)?.ok_or_else(|| Error::NotFound(format!("Import job {}", id)))
    }

    /// `pending -> processing`
    pub fn start_import_job(&self, job_id: i64) -> Result<ImportJob> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        require_transition(&tx, job_id, ImportStatus::Processing)?;
        tx.execute(
            "UPDATE import_jobs SET status = 'processing' WHERE id = ? AND status = 'pending'",
            params![job_id],
        )?;
        let job = get_job_in(&tx, job_id)?
            .ok_or_else(|| Error::NotFound(format!("Import job {}", job_id)))?;
        tx.commit()?;
        Ok(job)
    }

    /// `processing -> failed`, recording the reason and any rows that were skipped
    pub fn fail_import_job(
        &self,
        job_id: i64,
        message: &str,
        totals: &ImportTotals,
        skipped: &[NewSkippedRow],
    ) -> Result<ImportJob> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        require_transition(&tx, job_id, ImportStatus::Failed)?;

        tx.execute(
            r#"
            UPDATE import_jobs SET
                status = 'failed',
                error_message = ?,
                total_transactions = ?,
                processed_transactions = ?,
                filtered_rows = ?,
                duplicate_rows = ?,
                total_amount = ?,
                completed_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                message,
                totals.total_transactions,
                totals.processed_transactions,
                totals.filtered_rows,
                totals.duplicate_rows,
                totals.total_amount,
                job_id,
            ],
        )?;
        insert_skipped_rows(&tx, job_id, skipped)?;

        let job = get_job_in(&tx, job_id)?
            .ok_or_else(|| Error::NotFound(format!("Import job {}", job_id)))?;
        tx.commit()?;
        Ok(job)
    }

    /// `processing -> completed`, persisting transactions, skipped rows and totals atomically
    ///
    /// Transactions whose import hash already exists are not inserted; they are
    /// counted in `duplicate_rows`. On any error nothing is written and the job
    /// stays in `processing`.
    pub fn persist_import(
        &self,
        job_id: i64,
        transactions: &[NewTransaction],
        skipped: &[NewSkippedRow],
        totals: &ImportTotals,
    ) -> Result<PersistedImport> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        require_transition(&tx, job_id, ImportStatus::Completed)?;

        let mut inserted_ids = Vec::with_capacity(transactions.len());
        let mut duplicates = 0usize;
        for new_tx in transactions {
            match insert_transaction_in(&tx, Some(job_id), new_tx)? {
                TransactionInsertResult::Inserted(id) => inserted_ids.push(id),
                TransactionInsertResult::Duplicate(_) => duplicates += 1,
            }
        }
        insert_skipped_rows(&tx, job_id, skipped)?;

        tx.execute(
            r#"
            UPDATE import_jobs SET
                status = 'completed',
                total_transactions = ?,
                processed_transactions = ?,
                filtered_rows = ?,
                duplicate_rows = ?,
                total_amount = ?,
                completed_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                totals.total_transactions,
                totals.processed_transactions,
                totals.filtered_rows,
                duplicates as i64,
                totals.total_amount,
                job_id,
            ],
        )?;

        let mut stmt = tx.prepare(&format!(
            "SELECT {} FROM transactions WHERE import_job_id = ? ORDER BY id",
            TRANSACTION_COLUMNS
        ))?;
        let created = stmt
            .query_map(params![job_id], Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        drop(stmt);

        let job = get_job_in(&tx, job_id)?
            .ok_or_else(|| Error::NotFound(format!("Import job {}", job_id)))?;
        tx.commit()?;

        Ok(PersistedImport {
            job,
            transactions: created,
            duplicates,
        })
    }

    /// Get a job by ID, scoped to its owner
    pub fn get_import_job(&self, user_id: i64, job_id: i64) -> Result<Option<ImportJob>> {
        let conn = self.conn()?;
        Ok(get_job_in(&conn, job_id)?.filter(|j| j.user_id == user_id))
    }

    /// List a user's jobs, newest first
    pub fn list_import_jobs(&self, user_id: i64, limit: i64) -> Result<Vec<ImportJob>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM import_jobs WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
            JOB_COLUMNS
        ))?;
        let jobs = stmt
            .query_map(params![user_id, limit], Self::row_to_import_job)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Rows a job attempted but did not import
    pub fn list_skipped_rows(&self, job_id: i64) -> Result<Vec<SkippedRow>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, import_job_id, page, line, date_text, amount_text, merchant_text, reason, created_at
            FROM import_skipped_rows
            WHERE import_job_id = ?
            ORDER BY page, line, id
            "#,
        )?;
        let rows = stmt
            .query_map(params![job_id], |row| {
                let reason: String = row.get(7)?;
                let created_at: String = row.get(8)?;
                Ok(SkippedRow {
                    id: row.get(0)?,
                    import_job_id: row.get(1)?,
                    page: row.get(2)?,
                    line: row.get(3)?,
                    date_text: row.get(4)?,
                    amount_text: row.get(5)?,
                    merchant_text: row.get(6)?,
                    reason: reason.parse().map_err(|e: String| {
                        rusqlite::Error::FromSqlConversionFailure(
                            7,
                            rusqlite::types::Type::Text,
                            e.into(),
                        )
                    })?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Delete a job; its transactions and skipped rows go with it
    pub fn delete_import_job(&self, user_id: i64, job_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM import_jobs WHERE id = ? AND user_id = ?",
            params![job_id, user_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Import job {}", job_id)));
        }
        Ok(())
    }

    fn row_to_import_job(row: &rusqlite::Row) -> rusqlite::Result<ImportJob> {
        let file_type: String = row.get(3)?;
        let status: String = row.get(4)?;
        let created_at: String = row.get(15)?;
        let completed_at: Option<String> = row.get(16)?;
        Ok(ImportJob {
            id: row.get(0)?,
            user_id: row.get(1)?,
            filename: row.get(2)?,
            file_type: file_type.parse().unwrap_or(FileType::Csv),
            status: status.parse().unwrap_or_default(),
            statement_period: row.get(5)?,
            account_id: row.get(6)?,
            bank_name: row.get(7)?,
            card_last_four: row.get(8)?,
            total_transactions: row.get(9)?,
            processed_transactions: row.get(10)?,
            filtered_rows: row.get(11)?,
            duplicate_rows: row.get(12)?,
            total_amount: row.get(13)?,
            error_message: row.get(14)?,
            created_at: parse_datetime(&created_at),
            completed_at: completed_at.as_deref().map(parse_datetime),
        })
    }
}
