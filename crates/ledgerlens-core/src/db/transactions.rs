//! Transaction operations

use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{parse_date, parse_datetime, parse_time, Database};
use crate::error::{Error, Result};
use crate::models::{
    AnomalyAnnotation, NewTransaction, Transaction, TransactionStatus, TransactionUpdate,
};

pub(crate) const TRANSACTION_COLUMNS: &str = "id, user_id, date, time, amount, merchant, description, category_id, \
     bank_name, card_last_four, source, status, is_anomaly, anomaly_score, anomaly_severity, \
     anomaly_explanation, import_job_id, import_hash, created_at";

/// Result of inserting a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionInsertResult {
    /// Transaction was inserted successfully, contains new transaction ID
    Inserted(i64),
    /// Transaction was a duplicate, contains existing transaction ID
    Duplicate(i64),
}

/// Filters for listing transactions
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub import_job_id: Option<i64>,
    pub status: Option<TransactionStatus>,
    pub category_id: Option<i64>,
    pub anomalies_only: bool,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
}

/// Insert one transaction, skipping it when its import hash already exists
pub(crate) fn insert_transaction_in(
    conn: &Connection,
    import_job_id: Option<i64>,
    tx: &NewTransaction,
) -> Result<TransactionInsertResult> {
    if let Some(hash) = &tx.import_hash {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM transactions WHERE user_id = ? AND import_hash = ?",
                params![tx.user_id, hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(existing_id) = existing {
            return Ok(TransactionInsertResult::Duplicate(existing_id));
        }
    }

    conn.execute(
        r#"
        INSERT INTO transactions (user_id, date, time, amount, merchant, description, category_id,
                                  bank_name, card_last_four, source, import_job_id, import_hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            tx.user_id,
            tx.date.to_string(),
            tx.time.map(|t| t.format("%H:%M:%S").to_string()),
            tx.amount,
            tx.merchant,
            tx.description,
            tx.category_id,
            tx.bank_name,
            tx.card_last_four,
            tx.source.as_str(),
            import_job_id,
            tx.import_hash,
        ],
    )?;

    Ok(TransactionInsertResult::Inserted(conn.last_insert_rowid()))
}

pub(crate) fn get_transaction_in(conn: &Connection, id: i64) -> Result<Option<Transaction>> {
    let tx = conn
        .query_row(
            &format!("SELECT {} FROM transactions WHERE id = ?", TRANSACTION_COLUMNS),
            params![id],
            Database::row_to_transaction,
        )
        .optional()?;
    Ok(tx)
}

/// All of a user's transactions dated within `[from, to]`, oldest first
pub(crate) fn transactions_in_window(
    conn: &Connection,
    user_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions WHERE user_id = ? AND date >= ? AND date <= ? ORDER BY date, id",
        TRANSACTION_COLUMNS
    ))?;
    let rows = stmt
        .query_map(
            params![user_id, from.to_string(), to.to_string()],
            Database::row_to_transaction,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Overwrite anomaly fields for every transaction in the window
///
/// Rows without an annotation are reset to score 0 and unflagged.
pub(crate) fn write_anomaly_annotations(
    conn: &Connection,
    user_id: i64,
    from: NaiveDate,
    to: NaiveDate,
    annotations: &[AnomalyAnnotation],
) -> Result<()> {
    conn.execute(
        r#"
        UPDATE transactions
        SET is_anomaly = 0, anomaly_score = 0, anomaly_severity = NULL, anomaly_explanation = NULL
        WHERE user_id = ? AND date >= ? AND date <= ?
        "#,
        params![user_id, from.to_string(), to.to_string()],
    )?;

    let mut stmt = conn.prepare(
        r#"
        UPDATE transactions
        SET is_anomaly = ?, anomaly_score = ?, anomaly_severity = ?, anomaly_explanation = ?
        WHERE id = ? AND user_id = ?
        "#,
    )?;
    for a in annotations {
        stmt.execute(params![
            a.is_anomaly,
            a.score,
            a.severity.as_str(),
            a.explanation,
            a.transaction_id,
            user_id,
        ])?;
    }
    Ok(())
}

fn category_belongs(conn: &Connection, user_id: i64, category_id: i64) -> Result<()> {
    let owner: Option<i64> = conn
        .query_row(
            "SELECT user_id FROM categories WHERE id = ?",
            params![category_id],
            |row| row.get(0),
        )
        .optional()?;
    if owner != Some(user_id) {
        return Err(Error::NotFound(format!("Category {}", category_id)));
    }
    Ok(())
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl Database {
    /// Insert a manually entered transaction
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        let conn = self.conn()?;
        if let Some(category_id) = tx.category_id {
            category_belongs(&conn, tx.user_id, category_id)?;
        }
        match insert_transaction_in(&conn, None, tx)? {
            TransactionInsertResult::Inserted(id) => Ok(id),
            TransactionInsertResult::Duplicate(id) => Err(Error::InvalidData(format!(
                "Transaction duplicates existing transaction {}",
                id
            ))),
        }
    }

    /// Get a transaction by ID, scoped to its owner
    pub fn get_transaction(&self, user_id: i64, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        Ok(get_transaction_in(&conn, id)?.filter(|t| t.user_id == user_id))
    }

    /// List a user's transactions, newest first
    pub fn list_transactions(
        &self,
        user_id: i64,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>> {
        let mut sql = format!(
            "SELECT {} FROM transactions WHERE user_id = ?",
            TRANSACTION_COLUMNS
        );
        let mut values: Vec<Value> = vec![Value::Integer(user_id)];

        if let Some(job_id) = filter.import_job_id {
            sql.push_str(" AND import_job_id = ?");
            values.push(Value::Integer(job_id));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(category_id) = filter.category_id {
            sql.push_str(" AND category_id = ?");
            values.push(Value::Integer(category_id));
        }
        if filter.anomalies_only {
            sql.push_str(" AND is_anomaly = 1");
        }
        if let Some(from) = filter.from {
            sql.push_str(" AND date >= ?");
            values.push(Value::Text(from.to_string()));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND date <= ?");
            values.push(Value::Text(to.to_string()));
        }
        sql.push_str(" ORDER BY date DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            values.push(Value::Integer(limit));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values), Self::row_to_transaction)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Flagged transactions in `[from, to]`, most anomalous first
    pub fn list_anomalies(
        &self,
        user_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE user_id = ? AND is_anomaly = 1 AND date >= ? AND date <= ?
            ORDER BY anomaly_score DESC, date DESC, id
            "#,
            TRANSACTION_COLUMNS
        ))?;
        let rows = stmt
            .query_map(
                params![user_id, from.to_string(), to.to_string()],
                Self::row_to_transaction,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Apply a review update to one transaction
    pub fn update_transaction(
        &self,
        user_id: i64,
        id: i64,
        update: &TransactionUpdate,
    ) -> Result<Transaction> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing = get_transaction_in(&tx, id)?
            .filter(|t| t.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))?;

        if let Some(Some(category_id)) = update.category_id {
            category_belongs(&tx, user_id, category_id)?;
        }
        let merchant = match &update.merchant {
            Some(m) if m.trim().is_empty() => {
                return Err(Error::InvalidData("Merchant cannot be empty".to_string()))
            }
            Some(m) => m.split_whitespace().collect::<Vec<_>>().join(" "),
            None => existing.merchant,
        };

        tx.execute(
            r#"
            UPDATE transactions
            SET status = ?, category_id = ?, merchant = ?, description = ?
            WHERE id = ?
            "#,
            params![
                update.status.unwrap_or(existing.status).as_str(),
                update.category_id.unwrap_or(existing.category_id),
                merchant,
                update.description.clone().unwrap_or(existing.description),
                id,
            ],
        )?;

        let updated = get_transaction_in(&tx, id)?
            .ok_or_else(|| Error::NotFound(format!("Transaction {}", id)))?;
        tx.commit()?;
        Ok(updated)
    }

    /// Set status and/or category on many transactions at once
    ///
    /// Returns the number of rows changed. IDs owned by other users are ignored.
    pub fn bulk_update_transactions(
        &self,
        user_id: i64,
        ids: &[i64],
        status: Option<TransactionStatus>,
        category_id: Option<Option<i64>>,
    ) -> Result<usize> {
        if ids.is_empty() || (status.is_none() && category_id.is_none()) {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        if let Some(Some(cid)) = category_id {
            category_belongs(&tx, user_id, cid)?;
        }

        let mut sets = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(status) = status {
            sets.push("status = ?");
            values.push(Value::Text(status.as_str().to_string()));
        }
        if let Some(category) = category_id {
            sets.push("category_id = ?");
            values.push(category.map(Value::Integer).unwrap_or(Value::Null));
        }
        values.push(Value::Integer(user_id));
        values.extend(ids.iter().map(|id| Value::Integer(*id)));

        let sql = format!(
            "UPDATE transactions SET {} WHERE user_id = ? AND id IN ({})",
            sets.join(", "),
            placeholders(ids.len())
        );
        let changed = tx.execute(&sql, params_from_iter(values))?;
        tx.commit()?;
        Ok(changed)
    }

    /// Delete one transaction
    pub fn delete_transaction(&self, user_id: i64, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM transactions WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Transaction {}", id)));
        }
        Ok(())
    }

    /// Delete many transactions; returns how many were removed
    pub fn bulk_delete_transactions(&self, user_id: i64, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let mut values: Vec<Value> = vec![Value::Integer(user_id)];
        values.extend(ids.iter().map(|id| Value::Integer(*id)));
        let deleted = conn.execute(
            &format!(
                "DELETE FROM transactions WHERE user_id = ? AND id IN ({})",
                placeholders(ids.len())
            ),
            params_from_iter(values),
        )?;
        Ok(deleted)
    }

    /// Count a user's transactions
    pub fn count_transactions(&self, user_id: i64) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE user_id = ?",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub(crate) fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date_str: String = row.get(2)?;
        let time_str: Option<String> = row.get(3)?;
        let source_str: String = row.get(10)?;
        let status_str: String = row.get(11)?;
        let severity_str: Option<String> = row.get(14)?;
        let created_at_str: String = row.get(18)?;
        Ok(Transaction {
            id: row.get(0)?,
            user_id: row.get(1)?,
            date: parse_date(&date_str),
            time: parse_time(time_str),
            amount: row.get(4)?,
            merchant: row.get(5)?,
            description: row.get(6)?,
            category_id: row.get(7)?,
            bank_name: row.get(8)?,
            card_last_four: row.get(9)?,
            source: source_str.parse().unwrap_or_default(),
            status: status_str.parse().unwrap_or_default(),
            is_anomaly: row.get(12)?,
            anomaly_score: row.get(13)?,
            anomaly_severity: severity_str.and_then(|s| s.parse().ok()),
            anomaly_explanation: row.get(15)?,
            import_job_id: row.get(16)?,
            import_hash: row.get(17)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}
