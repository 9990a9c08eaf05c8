//! Transaction command implementations

use anyhow::{Context, Result};
use ledgerlens_core::{
    db::{Database, TransactionFilter},
    models::{NewTransaction, Severity, TransactionSource, TransactionStatus},
};

use super::{format_amount, parse_day, truncate};

/// Resolve a category name to its ID for this user
fn resolve_category(db: &Database, user_id: i64, name: &str) -> Result<i64> {
    db.find_category(user_id, name)?.ok_or_else(|| {
        anyhow::anyhow!(
            "Category '{}' not found. Create it with: ledgerlens categories add \"{}\"",
            name,
            name
        )
    })
}

fn severity_marker(severity: Option<Severity>, flagged: bool) -> &'static str {
    match (flagged, severity) {
        (true, Some(Severity::High)) => "🔴",
        (true, _) => "🟠",
        _ => "  ",
    }
}

pub fn cmd_transactions_list(
    db: &Database,
    user_id: i64,
    limit: i64,
    job: Option<i64>,
    anomalies_only: bool,
) -> Result<()> {
    let filter = TransactionFilter {
        import_job_id: job,
        anomalies_only,
        limit: Some(limit),
        ..TransactionFilter::default()
    };
    let transactions = db.list_transactions(user_id, &filter)?;

    if transactions.is_empty() {
        println!("No transactions found. Import some with:");
        println!("  ledgerlens import --file statement.csv");
        return Ok(());
    }

    let categories = db.list_categories(user_id)?;
    let category_name = |id: Option<i64>| {
        id.and_then(|id| categories.iter().find(|c| c.id == id))
            .map(|c| c.name.as_str())
            .unwrap_or("-")
    };

    println!();
    println!("📝 Recent Transactions");
    println!("   ─────────────────────────────────────────────────────────────");

    for tx in transactions {
        println!(
            "   {} [{}] {} │ {:>10} │ {:<32} │ {:<12} │ {}",
            severity_marker(tx.anomaly_severity, tx.is_anomaly),
            tx.id,
            tx.date,
            format_amount(tx.amount),
            truncate(&tx.merchant, 32),
            truncate(category_name(tx.category_id), 12),
            tx.status
        );
    }

    Ok(())
}

pub fn cmd_transactions_add(
    db: &Database,
    user_id: i64,
    date: &str,
    amount: f64,
    merchant: &str,
    description: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    let date = parse_day(Some(date))?;
    let merchant = merchant.split_whitespace().collect::<Vec<_>>().join(" ");
    if merchant.is_empty() {
        anyhow::bail!("Merchant cannot be empty");
    }
    let category_id = category
        .map(|name| resolve_category(db, user_id, name))
        .transpose()?;

    let id = db
        .insert_transaction(&NewTransaction {
            user_id,
            date,
            time: None,
            amount: (amount * 100.0).round() / 100.0,
            merchant: merchant.clone(),
            description: description.map(str::to_string),
            category_id,
            bank_name: None,
            card_last_four: None,
            source: TransactionSource::Manual,
            import_hash: None,
        })
        .context("Failed to add transaction")?;

    println!("✅ Added transaction {}:", id);
    println!("   {} │ {:>10} │ {}", date, format_amount(amount), merchant);
    Ok(())
}

pub fn cmd_transactions_review(
    db: &Database,
    user_id: i64,
    ids: &[i64],
    status: Option<&str>,
    category: Option<&str>,
    clear_category: bool,
) -> Result<()> {
    let status: Option<TransactionStatus> = status
        .map(|s| s.parse().map_err(|e: String| anyhow::anyhow!(e)))
        .transpose()?;
    let category_id = match (category, clear_category) {
        (Some(name), _) => Some(Some(resolve_category(db, user_id, name)?)),
        (None, true) => Some(None),
        (None, false) => None,
    };

    if status.is_none() && category_id.is_none() {
        anyhow::bail!("Nothing to change: pass --status, --category or --clear-category");
    }

    let changed = db.bulk_update_transactions(user_id, ids, status, category_id)?;
    println!("✅ Updated {} of {} transactions", changed, ids.len());
    Ok(())
}

pub fn cmd_transactions_delete(db: &Database, user_id: i64, ids: &[i64]) -> Result<()> {
    let deleted = if let [id] = ids {
        db.delete_transaction(user_id, *id)?;
        1
    } else {
        db.bulk_delete_transactions(user_id, ids)?
    };
    println!("🗑️  Deleted {} transaction(s)", deleted);
    Ok(())
}
