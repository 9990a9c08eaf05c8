//! Statement import command

use std::path::PathBuf;

use anyhow::{Context, Result};
use ledgerlens_core::{
    db::Database,
    models::{ImportStatus, RowSkipReason},
    ImportJobManager, ImportOutcome, LedgerConfig, UploadRequest,
};

use super::{format_amount, truncate};

/// Arguments for one import
#[derive(Debug, Clone)]
pub struct ImportArgs {
    pub user_id: i64,
    pub file: PathBuf,
    pub bank: Option<String>,
    pub card: Option<String>,
    pub period: Option<String>,
    pub account: Option<i64>,
}

pub fn cmd_import(
    db: &Database,
    config: &LedgerConfig,
    args: &ImportArgs,
    json: bool,
) -> Result<()> {
    let bytes = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read file: {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| args.file.display().to_string());

    if !json {
        println!("📥 Importing {}...", filename);
    }

    let manager = ImportJobManager::new(db, config.import.clone());
    let outcome = manager
        .upload(UploadRequest {
            user_id: args.user_id,
            filename,
            bytes,
            bank_name: args.bank.clone(),
            card_last_four: args.card.clone(),
            statement_period: args.period.clone(),
            account_id: args.account,
        })
        .context("Import failed")?;

    if json {
        let value = serde_json::json!({
            "job": outcome.job,
            "transactions": outcome.transactions,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_outcome(&outcome);
    Ok(())
}

fn reason_label(reason: RowSkipReason) -> &'static str {
    match reason {
        RowSkipReason::InvalidDate => "unreadable date",
        RowSkipReason::InvalidAmount => "unreadable amount",
        RowSkipReason::MissingMerchant => "no merchant",
    }
}

fn print_outcome(outcome: &ImportOutcome) {
    let job = &outcome.job;

    if job.status == ImportStatus::Failed {
        println!("❌ Import job {} failed", job.id);
        if let Some(message) = &job.error_message {
            println!("   {}", message);
        }
        if job.total_transactions > 0 {
            println!(
                "   Attempted {} rows, none could be parsed",
                job.total_transactions
            );
        }
        return;
    }

    if let Some(strategy) = outcome.strategy {
        println!("   Parsed with {}", strategy);
    }

    if outcome.is_empty_result() {
        println!("⚠️  Import job {} created no new transactions", job.id);
    } else if job.is_partial() {
        println!(
            "⚠️  Import job {} partially complete: {} of {} rows parsed",
            job.id, job.processed_transactions, job.total_transactions
        );
    } else {
        println!("✅ Import job {} complete!", job.id);
    }

    println!("   Imported: {}", outcome.transactions.len());
    if job.duplicate_rows > 0 {
        println!("   Skipped (duplicates): {}", job.duplicate_rows);
    }
    if job.filtered_rows > 0 {
        println!("   Filtered (totals/balances): {}", job.filtered_rows);
    }
    println!("   Total amount: {:.2}", job.total_amount);

    if !outcome.skipped.is_empty() {
        println!();
        println!("   Rows not imported:");
        for row in &outcome.skipped {
            let location = match row.page {
                Some(page) => format!("page {} line {}", page, row.line),
                None => format!("line {}", row.line),
            };
            println!(
                "   - {}: {} │ {} │ {} ({})",
                location,
                row.date_text,
                row.amount_text,
                truncate(&row.merchant_text, 30),
                reason_label(row.reason)
            );
        }
    }

    let categorized = outcome
        .transactions
        .iter()
        .filter(|t| t.category_id.is_some())
        .count();
    if !outcome.transactions.is_empty() {
        println!();
        println!(
            "   Categorized by rules: {} of {}",
            categorized,
            outcome.transactions.len()
        );
        for tx in outcome.transactions.iter().take(10) {
            println!(
                "   {} │ {:>10} │ {}",
                tx.date,
                format_amount(tx.amount),
                truncate(&tx.merchant, 40)
            );
        }
        if outcome.transactions.len() > 10 {
            println!("   ... and {} more", outcome.transactions.len() - 10);
        }
    }
}
