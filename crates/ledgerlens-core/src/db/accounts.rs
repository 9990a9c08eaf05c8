//! Account operations

use rusqlite::{params, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::Account;

const ACCOUNT_COLUMNS: &str = "id, user_id, name, bank_name, card_last_four, created_at";

impl Database {
    /// Create an account for a user
    pub fn create_account(
        &self,
        user_id: i64,
        name: &str,
        bank_name: Option<&str>,
        card_last_four: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO accounts (user_id, name, bank_name, card_last_four) VALUES (?, ?, ?, ?)",
            params![user_id, name, bank_name, card_last_four],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List a user's accounts
    pub fn list_accounts(&self, user_id: i64) -> Result<Vec<Account>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM accounts WHERE user_id = ? ORDER BY name",
            ACCOUNT_COLUMNS
        ))?;

        let accounts = stmt
            .query_map(params![user_id], Self::row_to_account)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(accounts)
    }

    /// Get an account by ID, scoped to its owner
    pub fn get_account(&self, user_id: i64, id: i64) -> Result<Option<Account>> {
        let conn = self.conn()?;
        let account = conn
            .query_row(
                &format!(
                    "SELECT {} FROM accounts WHERE id = ? AND user_id = ?",
                    ACCOUNT_COLUMNS
                ),
                params![id, user_id],
                Self::row_to_account,
            )
            .optional()?;
        Ok(account)
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        let created_at: String = row.get(5)?;
        Ok(Account {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            bank_name: row.get(3)?,
            card_last_four: row.get(4)?,
            created_at: parse_datetime(&created_at),
        })
    }
}
