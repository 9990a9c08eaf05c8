//! Import job history commands

use anyhow::Result;
use ledgerlens_core::{db::Database, models::ImportStatus};

use super::truncate;

fn status_icon(status: ImportStatus) -> &'static str {
    match status {
        ImportStatus::Pending => "⏳",
        ImportStatus::Processing => "🔄",
        ImportStatus::Completed => "✅",
        ImportStatus::Failed => "❌",
    }
}

pub fn cmd_jobs_list(db: &Database, user_id: i64, limit: i64) -> Result<()> {
    let jobs = db.list_import_jobs(user_id, limit)?;

    if jobs.is_empty() {
        println!("No imports yet. Import a statement with:");
        println!("  ledgerlens import --file statement.csv");
        return Ok(());
    }

    println!();
    println!("📂 Import Jobs");
    println!("   ─────────────────────────────────────────────────────────────");

    for job in jobs {
        let counts = if job.is_partial() {
            format!(
                "{}/{} rows ⚠️",
                job.processed_transactions, job.total_transactions
            )
        } else {
            format!("{} rows", job.processed_transactions)
        };
        println!(
            "   {} [{}] {} │ {:<4} │ {:<14} │ {}",
            status_icon(job.status),
            job.id,
            job.created_at.format("%Y-%m-%d %H:%M"),
            job.file_type,
            counts,
            truncate(&job.filename, 32)
        );
    }

    Ok(())
}

pub fn cmd_jobs_show(db: &Database, user_id: i64, id: i64) -> Result<()> {
    let job = db
        .get_import_job(user_id, id)?
        .ok_or_else(|| anyhow::anyhow!("Import job {} not found", id))?;

    println!();
    println!("{} Import job {} - {}", status_icon(job.status), job.id, job.status);
    println!("   File:        {} ({})", job.filename, job.file_type);
    if let Some(period) = &job.statement_period {
        println!("   Period:      {}", period);
    }
    if let Some(bank) = &job.bank_name {
        println!("   Bank:        {}", bank);
    }
    if let Some(card) = &job.card_last_four {
        println!("   Card:        •••• {}", card);
    }
    println!("   Attempted:   {}", job.total_transactions);
    println!("   Parsed:      {}", job.processed_transactions);
    println!("   Duplicates:  {}", job.duplicate_rows);
    println!("   Filtered:    {}", job.filtered_rows);
    println!("   Total:       {:.2}", job.total_amount);
    println!("   Created:     {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(done) = job.completed_at {
        println!("   Finished:    {}", done.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(message) = &job.error_message {
        println!("   Error:       {}", message);
    }

    let skipped = db.list_skipped_rows(job.id)?;
    if !skipped.is_empty() {
        println!();
        println!("   Skipped rows:");
        for row in skipped {
            let location = match row.page {
                Some(page) => format!("p{} l{}", page, row.line),
                None => format!("l{}", row.line),
            };
            println!(
                "   - {:<8} {} │ {} │ {} ({})",
                location,
                row.date_text,
                row.amount_text,
                truncate(&row.merchant_text, 30),
                row.reason
            );
        }
    }

    Ok(())
}

pub fn cmd_jobs_delete(db: &Database, user_id: i64, id: i64) -> Result<()> {
    let job = db
        .get_import_job(user_id, id)?
        .ok_or_else(|| anyhow::anyhow!("Import job {} not found", id))?;

    db.delete_import_job(user_id, id)?;

    println!(
        "🗑️  Deleted import job {} ({}) and its transactions",
        job.id, job.filename
    );
    Ok(())
}
