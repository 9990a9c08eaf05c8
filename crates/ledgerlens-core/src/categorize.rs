//! Rule-based merchant categorization
//!
//! A user's active merchant rules are evaluated in creation order and the
//! first match wins. Exact rules compare the whole merchant string and
//! partial rules look for the pattern inside it, both case-insensitively.
//! A merchant that matches nothing is left uncategorized.

use rusqlite::params;
use tracing::{debug, info};

use crate::db::{active_rules, Database};
use crate::error::Result;
use crate::models::{MatchType, MerchantRule};

/// Outcome of re-running categorization over a user's history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutomationResult {
    /// Transactions looked at
    pub examined: usize,
    /// Transactions some active rule matched
    pub matched: usize,
    /// Transactions whose category actually changed
    pub updated: usize,
}

/// Whether `rule` matches `merchant`
pub fn rule_matches(rule: &MerchantRule, merchant: &str) -> bool {
    let merchant = merchant.trim().to_lowercase();
    let pattern = rule.pattern.trim().to_lowercase();
    if pattern.is_empty() {
        return false;
    }
    match rule.match_type {
        MatchType::Exact => merchant == pattern,
        MatchType::Partial => merchant.contains(&pattern),
    }
}

/// Evaluates a fixed snapshot of rules
#[derive(Debug, Clone, Default)]
pub struct CategorizationEngine {
    rules: Vec<MerchantRule>,
}

impl CategorizationEngine {
    /// Build from rules; inactive ones are dropped and the rest sorted by id
    pub fn new(mut rules: Vec<MerchantRule>) -> Self {
        rules.retain(|r| r.is_active);
        rules.sort_by_key(|r| r.id);
        Self { rules }
    }

    /// Load a user's active rules
    pub fn for_user(db: &Database, user_id: i64) -> Result<Self> {
        Ok(Self::new(db.list_active_merchant_rules(user_id)?))
    }

    pub fn rules(&self) -> &[MerchantRule] {
        &self.rules
    }

    /// Category of the first matching rule, if any
    pub fn categorize(&self, merchant: &str) -> Option<i64> {
        self.rules
            .iter()
            .find(|rule| rule_matches(rule, merchant))
            .map(|rule| rule.category_id)
    }
}

/// Reapply the user's active rules to every one of their transactions
///
/// A matching rule overwrites the current category. Transactions no rule
/// matches keep whatever category they have. Running twice with the same
/// rules changes nothing the second time.
pub fn run_automation(db: &Database, user_id: i64) -> Result<AutomationResult> {
    let mut conn = db.conn()?;
    let tx = conn.transaction()?;

    let engine = CategorizationEngine::new(active_rules(&tx, user_id)?);
    let mut result = AutomationResult::default();

    let rows: Vec<(i64, String, Option<i64>)> = {
        let mut stmt =
            tx.prepare("SELECT id, merchant, category_id FROM transactions WHERE user_id = ?")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows
    };

    {
        let mut update = tx.prepare("UPDATE transactions SET category_id = ? WHERE id = ?")?;
        for (id, merchant, current) in &rows {
            result.examined += 1;
            let Some(category_id) = engine.categorize(merchant) else {
                continue;
            };
            result.matched += 1;
            if *current != Some(category_id) {
                update.execute(params![category_id, id])?;
                result.updated += 1;
                debug!("Transaction {} -> category {}", id, category_id);
            }
        }
    }

    tx.commit()?;
    info!(
        "Automation for user {}: {} examined, {} matched, {} updated",
        user_id, result.examined, result.matched, result.updated
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rule(id: i64, pattern: &str, match_type: MatchType, category_id: i64) -> MerchantRule {
        MerchantRule {
            id,
            user_id: 1,
            pattern: pattern.to_string(),
            match_type,
            category_id,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_match_is_case_insensitive_full_string() {
        let r = rule(1, "Starbucks", MatchType::Exact, 10);
        assert!(rule_matches(&r, "STARBUCKS"));
        assert!(rule_matches(&r, " starbucks "));
        assert!(!rule_matches(&r, "STARBUCKS COFFEE"));
    }

    #[test]
    fn test_partial_match_is_substring() {
        let r = rule(1, "grab", MatchType::Partial, 10);
        assert!(rule_matches(&r, "GRAB *RIDE 1234"));
        assert!(rule_matches(&r, "Paid via GrabPay"));
        assert!(!rule_matches(&r, "GOJEK"));
    }

    #[test]
    fn test_first_rule_by_creation_order_wins() {
        // Given out of order to check sorting
        let engine = CategorizationEngine::new(vec![
            rule(5, "coffee", MatchType::Partial, 30),
            rule(2, "starbucks", MatchType::Partial, 20),
        ]);
        assert_eq!(engine.categorize("Starbucks Coffee"), Some(20));
        assert_eq!(engine.categorize("Toast Box Coffee"), Some(30));
        assert_eq!(engine.categorize("NTUC"), None);
    }

    #[test]
    fn test_inactive_rules_ignored() {
        let mut inactive = rule(1, "ntuc", MatchType::Partial, 10);
        inactive.is_active = false;
        let engine = CategorizationEngine::new(vec![inactive, rule(2, "ntuc", MatchType::Partial, 20)]);
        assert_eq!(engine.rules().len(), 1);
        assert_eq!(engine.categorize("NTUC Fairprice"), Some(20));
    }

    #[test]
    fn test_empty_pattern_never_matches() {
        let engine = CategorizationEngine::new(vec![rule(1, "  ", MatchType::Partial, 10)]);
        assert_eq!(engine.categorize("anything"), None);
    }
}
