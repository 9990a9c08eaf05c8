//! Category and merchant rule operations

use rusqlite::{params, Connection, OptionalExtension};

use super::{parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::{Category, MatchType, MerchantRule};

const RULE_COLUMNS: &str = "id, user_id, pattern, match_type, category_id, is_active, created_at";

/// Active rules for a user in evaluation (creation) order
pub(crate) fn active_rules(conn: &Connection, user_id: i64) -> Result<Vec<MerchantRule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM merchant_rules WHERE user_id = ? AND is_active = 1 ORDER BY id",
        RULE_COLUMNS
    ))?;
    let rules = stmt
        .query_map(params![user_id], Database::row_to_rule)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rules)
}

impl Database {
    /// Create a category, or return the existing one with the same name
    pub fn upsert_category(&self, user_id: i64, name: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("Category name cannot be empty".to_string()));
        }

        let conn = self.conn()?;
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM categories WHERE user_id = ? AND name = ?",
                params![user_id, name],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO categories (user_id, name) VALUES (?, ?)",
            params![user_id, name],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List a user's categories by name
    pub fn list_categories(&self, user_id: i64) -> Result<Vec<Category>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, name, created_at FROM categories WHERE user_id = ? ORDER BY name",
        )?;
        let categories = stmt
            .query_map(params![user_id], |row| {
                let created_at: String = row.get(3)?;
                Ok(Category {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    name: row.get(2)?,
                    created_at: parse_datetime(&created_at),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Look up a category by name (case-insensitive)
    pub fn find_category(&self, user_id: i64, name: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        let id = conn
            .query_row(
                "SELECT id FROM categories WHERE user_id = ? AND LOWER(name) = LOWER(?)",
                params![user_id, name.trim()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Create a merchant rule; the category must belong to the same user
    pub fn create_merchant_rule(
        &self,
        user_id: i64,
        pattern: &str,
        match_type: MatchType,
        category_id: i64,
    ) -> Result<i64> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(Error::InvalidData("Rule pattern cannot be empty".to_string()));
        }

        let conn = self.conn()?;
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

        conn.execute(
            "INSERT INTO merchant_rules (user_id, pattern, match_type, category_id) VALUES (?, ?, ?, ?)",
            params![user_id, pattern, match_type.as_str(), category_id],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// List all of a user's rules (active and inactive) in evaluation order
    pub fn list_merchant_rules(&self, user_id: i64) -> Result<Vec<MerchantRule>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM merchant_rules WHERE user_id = ? ORDER BY id",
            RULE_COLUMNS
        ))?;
        let rules = stmt
            .query_map(params![user_id], Self::row_to_rule)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    /// Active rules in evaluation order
    pub fn list_active_merchant_rules(&self, user_id: i64) -> Result<Vec<MerchantRule>> {
        let conn = self.conn()?;
        active_rules(&conn, user_id)
    }

    /// Enable or disable a rule
    pub fn set_merchant_rule_active(&self, user_id: i64, rule_id: i64, active: bool) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE merchant_rules SET is_active = ? WHERE id = ? AND user_id = ?",
            params![active, rule_id, user_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("Merchant rule {}", rule_id)));
        }
        Ok(())
    }

    /// Delete a rule
    pub fn delete_merchant_rule(&self, user_id: i64, rule_id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM merchant_rules WHERE id = ? AND user_id = ?",
            params![rule_id, user_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!("Merchant rule {}", rule_id)));
        }
        Ok(())
    }

    pub(crate) fn row_to_rule(row: &rusqlite::Row) -> rusqlite::Result<MerchantRule> {
        let match_type: String = row.get(3)?;
        let created_at: String = row.get(6)?;
        Ok(MerchantRule {
            id: row.get(0)?,
            user_id: row.get(1)?,
            pattern: row.get(2)?,
            match_type: match_type.parse().unwrap_or_default(),
            category_id: row.get(4)?,
            is_active: row.get(5)?,
            created_at: parse_datetime(&created_at),
        })
    }
}
