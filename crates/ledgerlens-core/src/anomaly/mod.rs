//! Anomaly scoring over a user's recent transactions
//!
//! Recalculation loads every transaction in the window, fits a seeded
//! isolation forest over `[amount, category, merchant frequency]`, buckets
//! the scores into severities and overwrites the stored annotations. The
//! load, score and write steps share one immediate transaction so a
//! concurrent import cannot slip rows in between.
//!
//! Explanations are computed from the data, not the model: the amount is
//! compared with its merchant's and its category's average in the window
//! and the larger deviation is reported.

pub mod forest;

use std::collections::HashMap;

use chrono::{Months, NaiveDate};
use rusqlite::{params, TransactionBehavior};
use tracing::{debug, info};

use crate::config::AnomalyConfig;
use crate::db::{transactions_in_window, write_anomaly_annotations, Database};
use crate::error::{Error, Result};
use crate::models::{AnomalyAnnotation, Severity, Transaction};

pub use forest::IsolationForest;

/// What one recalculation did
#[derive(Debug, Clone, PartialEq)]
pub struct RecalculationSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub examined: usize,
    /// False when the window had too few transactions to score
    pub scored: bool,
    pub medium: usize,
    pub high: usize,
}

impl RecalculationSummary {
    pub fn flagged(&self) -> usize {
        self.medium + self.high
    }
}

/// `[as_of - months, as_of]`
pub fn window(as_of: NaiveDate, months: u32) -> Result<(NaiveDate, NaiveDate)> {
    let from = as_of
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| Error::InvalidData(format!("window of {} months is out of range", months)))?;
    Ok((from, as_of))
}

/// Feature vector per transaction, in input order
fn features(transactions: &[Transaction]) -> Vec<Vec<f64>> {
    let mut categories: Vec<i64> = transactions.iter().filter_map(|t| t.category_id).collect();
    categories.sort_unstable();
    categories.dedup();

    let mut merchant_counts: HashMap<String, usize> = HashMap::new();
    for t in transactions {
        *merchant_counts.entry(merchant_key(&t.merchant)).or_insert(0) += 1;
    }

    let n = transactions.len() as f64;
    transactions
        .iter()
        .map(|t| {
            let category = t
                .category_id
                .and_then(|c| categories.binary_search(&c).ok())
                .map(|i| i as f64 + 1.0)
                .unwrap_or(0.0);
            let frequency = merchant_counts[&merchant_key(&t.merchant)] as f64 / n;
            vec![t.amount, category, frequency]
        })
        .collect()
}

fn merchant_key(merchant: &str) -> String {
    merchant.trim().to_lowercase()
}

/// Map a score to a severity bucket
pub fn severity_for(score: f64, config: &AnomalyConfig) -> Severity {
    if score >= config.high_threshold {
        Severity::High
    } else if score >= config.medium_threshold {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Human-readable reason for `transactions[index]` standing out
///
/// `transactions` must be in (date, id) order.
pub fn explain(
    transactions: &[Transaction],
    index: usize,
    category_names: &HashMap<i64, String>,
) -> String {
    let target = &transactions[index];
    let key = merchant_key(&target.merchant);
    let others = || {
        transactions
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != index)
            .map(|(_, t)| t)
    };

    let merchant_avg = mean(
        others()
            .filter(|t| merchant_key(&t.merchant) == key)
            .map(|t| t.amount),
    );
    let category_avg = target.category_id.and_then(|cid| {
        mean(
            others()
                .filter(|t| t.category_id == Some(cid))
                .map(|t| t.amount),
        )
    });
    let prior = transactions[..index]
        .iter()
        .filter(|t| merchant_key(&t.merchant) == key)
        .count();

    let merchant_dev = merchant_avg.map(|avg| (target.amount - avg, avg));
    let category_dev = category_avg.map(|avg| (target.amount - avg, avg));

    let mut text = match (merchant_dev, category_dev) {
        (Some((md, mavg)), Some((cd, _))) if md.abs() >= cd.abs() => {
            describe(target.amount, md, mavg, &format!("at {}", target.merchant))
        }
        (_, Some((cd, cavg))) => {
            let name = target
                .category_id
                .and_then(|cid| category_names.get(&cid))
                .map(String::as_str)
                .unwrap_or("this category");
            describe(target.amount, cd, cavg, &format!("in {}", name))
        }
        (Some((md, mavg)), None) => {
            describe(target.amount, md, mavg, &format!("at {}", target.merchant))
        }
        (None, None) => {
            let avg = mean(others().map(|t| t.amount)).unwrap_or(0.0);
            describe(target.amount, target.amount - avg, avg, "across all transactions")
        }
    };

    if prior <= 1 {
        text.push_str(&format!(
            "; new merchant ({} prior transaction{} in window)",
            prior,
            if prior == 1 { "" } else { "s" }
        ));
    }
    text
}

fn describe(amount: f64, deviation: f64, average: f64, scope: &str) -> String {
    let direction = if deviation >= 0.0 { "above" } else { "below" };
    if average.abs() >= 0.01 {
        format!(
            "{:.2} is {:.2} {} the average of {:.2} {} ({:.0}%)",
            amount,
            deviation.abs(),
            direction,
            average,
            scope,
            deviation / average.abs() * 100.0
        )
    } else {
        format!(
            "{:.2} is {:.2} {} the average of {:.2} {}",
            amount,
            deviation.abs(),
            direction,
            average,
            scope
        )
    }
}

/// Scores a user's transaction history
pub struct AnomalyScorer<'a> {
    db: &'a Database,
    config: AnomalyConfig,
}

impl<'a> AnomalyScorer<'a> {
    pub fn new(db: &'a Database, config: AnomalyConfig) -> Self {
        Self { db, config }
    }

    /// Recompute and overwrite annotations for `[as_of - months, as_of]`
    pub fn recalculate(
        &self,
        user_id: i64,
        months: u32,
        as_of: NaiveDate,
    ) -> Result<RecalculationSummary> {
        let (from, to) = window(as_of, months)?;

        let mut conn = self.db.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let transactions = transactions_in_window(&tx, user_id, from, to)?;
        let mut summary = RecalculationSummary {
            from,
            to,
            examined: transactions.len(),
            scored: false,
            medium: 0,
            high: 0,
        };

        if transactions.len() < self.config.min_transactions {
            debug!(
                "Only {} transactions in window for user {}; clearing scores",
                transactions.len(),
                user_id
            );
            write_anomaly_annotations(&tx, user_id, from, to, &[])?;
            tx.commit()?;
            return Ok(summary);
        }

        let category_names: HashMap<i64, String> = {
            let mut stmt = tx.prepare("SELECT id, name FROM categories WHERE user_id = ?")?;
            let rows = stmt
                .query_map(params![user_id], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<HashMap<_, _>, _>>()?;
            rows
        };

        let data = features(&transactions);
        let forest = IsolationForest::fit(
            &data,
            self.config.trees,
            self.config.sample_size,
            self.config.seed,
        );

        let annotations: Vec<AnomalyAnnotation> = transactions
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let score = forest.score(&data[i]);
                let severity = severity_for(score, &self.config);
                let flagged = severity.is_flagged();
                AnomalyAnnotation {
                    transaction_id: t.id,
                    score,
                    severity,
                    is_anomaly: flagged,
                    explanation: flagged.then(|| explain(&transactions, i, &category_names)),
                }
            })
            .collect();

        for a in &annotations {
            match a.severity {
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => {}
            }
        }
        summary.scored = true;

        write_anomaly_annotations(&tx, user_id, from, to, &annotations)?;
        tx.commit()?;

        info!(
            "Anomaly scores for user {} ({} to {}): {} examined, {} high, {} medium",
            user_id, from, to, summary.examined, summary.high, summary.medium
        );
        Ok(summary)
    }

    /// Flagged transactions in the window, most anomalous first
    pub fn list_anomalies(
        &self,
        user_id: i64,
        months: u32,
        as_of: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let (from, to) = window(as_of, months)?;
        self.db.list_anomalies(user_id, from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tx(id: i64, day: u32, amount: f64, merchant: &str, category: Option<i64>) -> Transaction {
        Transaction {
            id,
            user_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            time: None,
            amount,
            merchant: merchant.to_string(),
            description: None,
            category_id: category,
            bank_name: None,
            card_last_four: None,
            source: Default::default(),
            status: Default::default(),
            is_anomaly: false,
            anomaly_score: 0.0,
            anomaly_severity: None,
            anomaly_explanation: None,
            import_job_id: None,
            import_hash: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_window_subtracts_calendar_months() {
        let as_of = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
        let (from, to) = window(as_of, 3).unwrap();
        assert_eq!(from, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(to, as_of);
    }

    #[test]
    fn test_severity_buckets() {
        let config = AnomalyConfig::default();
        assert_eq!(severity_for(0.70, &config), Severity::High);
        assert_eq!(severity_for(0.62, &config), Severity::High);
        assert_eq!(severity_for(0.58, &config), Severity::Medium);
        assert_eq!(severity_for(0.55, &config), Severity::Medium);
        assert_eq!(severity_for(0.50, &config), Severity::Low);
    }

    #[test]
    fn test_features_shape() {
        let txs = vec![
            tx(1, 1, 10.0, "Kopitiam", Some(7)),
            tx(2, 2, 12.0, "kopitiam ", Some(7)),
            tx(3, 3, 500.0, "Apple Store", None),
            tx(4, 4, 20.0, "Grab", Some(3)),
        ];
        let f = features(&txs);
        assert_eq!(f[0], vec![10.0, 2.0, 0.5]);
        assert_eq!(f[2], vec![500.0, 0.0, 0.25]);
        assert_eq!(f[3][1], 1.0);
    }

    #[test]
    fn test_explain_uses_larger_deviation() {
        let names = HashMap::from([(1, "Groceries".to_string())]);
        let txs = vec![
            tx(1, 1, 40.0, "NTUC", Some(1)),
            tx(2, 2, 50.0, "NTUC", Some(1)),
            tx(3, 3, 5.0, "Cold Storage", Some(1)),
            tx(4, 4, 300.0, "NTUC", Some(1)),
        ];
        // Merchant average 45 (dev 255) vs category average 31.67 (dev 268.33)
        let text = explain(&txs, 3, &names);
        assert!(text.contains("in Groceries"), "{}", text);
        assert!(text.contains("above"));
        assert!(!text.contains("new merchant"));
    }

    #[test]
    fn test_explain_new_merchant() {
        let names = HashMap::new();
        let txs = vec![
            tx(1, 1, 40.0, "NTUC", None),
            tx(2, 2, 50.0, "NTUC", None),
            tx(3, 3, 1500.0, "Unknown Electronics Store", None),
        ];
        let text = explain(&txs, 2, &names);
        assert!(text.contains("across all transactions"), "{}", text);
        assert!(text.contains("new merchant (0 prior transactions in window)"));
    }
}
