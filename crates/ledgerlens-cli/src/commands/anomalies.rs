//! Anomaly scoring commands

use anyhow::Result;
use ledgerlens_core::{db::Database, models::Severity, AnomalyScorer, LedgerConfig};

use super::{format_amount, parse_day, truncate};

pub fn cmd_anomalies_recalc(
    db: &Database,
    config: &LedgerConfig,
    user_id: i64,
    months: Option<u32>,
    as_of: Option<&str>,
) -> Result<()> {
    let as_of = parse_day(as_of)?;
    let months = months.unwrap_or(config.anomaly.window_months);

    println!("🔍 Scoring transactions from the last {} months...", months);
    let scorer = AnomalyScorer::new(db, config.anomaly.clone());
    let summary = scorer.recalculate(user_id, months, as_of)?;

    if !summary.scored {
        println!(
            "   Only {} transactions between {} and {}; need at least {} to score",
            summary.examined, summary.from, summary.to, config.anomaly.min_transactions
        );
        println!("   Existing scores in the window were cleared.");
        return Ok(());
    }

    println!("✅ Scored {} transactions", summary.examined);
    println!("   🔴 High:   {}", summary.high);
    println!("   🟠 Medium: {}", summary.medium);
    if summary.flagged() > 0 {
        println!();
        println!("   See them with: ledgerlens anomalies list");
    }
    Ok(())
}

pub fn cmd_anomalies_list(
    db: &Database,
    config: &LedgerConfig,
    user_id: i64,
    months: Option<u32>,
    as_of: Option<&str>,
) -> Result<()> {
    let as_of = parse_day(as_of)?;
    let months = months.unwrap_or(config.anomaly.window_months);

    let scorer = AnomalyScorer::new(db, config.anomaly.clone());
    let anomalies = scorer.list_anomalies(user_id, months, as_of)?;

    if anomalies.is_empty() {
        println!("No anomalies flagged in the last {} months.", months);
        println!("   Run 'ledgerlens anomalies recalc' after importing statements.");
        return Ok(());
    }

    println!();
    println!("🚨 Unusual Transactions ({})", anomalies.len());
    println!("   ─────────────────────────────────────────────────────────────");
    for tx in anomalies {
        let icon = match tx.anomaly_severity {
            Some(Severity::High) => "🔴",
            _ => "🟠",
        };
        println!(
            "   {} [{}] {} │ {:>10} │ {} (score {:.3})",
            icon,
            tx.id,
            tx.date,
            format_amount(tx.amount),
            truncate(&tx.merchant, 36),
            tx.anomaly_score
        );
        if let Some(explanation) = &tx.anomaly_explanation {
            println!("        {}", explanation);
        }
    }
    Ok(())
}
