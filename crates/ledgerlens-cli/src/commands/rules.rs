//! Category, merchant rule, account and automation commands

use anyhow::Result;
use ledgerlens_core::{db::Database, models::MatchType, run_automation};

use super::truncate;

pub fn cmd_categories_list(db: &Database, user_id: i64) -> Result<()> {
    let categories = db.list_categories(user_id)?;
    if categories.is_empty() {
        println!("No categories yet. Add one with:");
        println!("  ledgerlens categories add Groceries");
        return Ok(());
    }

    println!();
    println!("🏷️  Categories");
    for category in categories {
        println!("   [{}] {}", category.id, category.name);
    }
    Ok(())
}

pub fn cmd_categories_add(db: &Database, user_id: i64, name: &str) -> Result<()> {
    let id = db.upsert_category(user_id, name)?;
    println!("✅ Category '{}' ({})", name.trim(), id);
    Ok(())
}

pub fn cmd_rules_list(db: &Database, user_id: i64) -> Result<()> {
    let rules = db.list_merchant_rules(user_id)?;
    if rules.is_empty() {
        println!("No merchant rules yet. Add one with:");
        println!("  ledgerlens rules add starbucks --category Coffee");
        return Ok(());
    }

    let categories = db.list_categories(user_id)?;

    println!();
    println!("📐 Merchant Rules (first match wins)");
    println!("   ─────────────────────────────────────────────────────────────");
    for rule in rules {
        let category = categories
            .iter()
            .find(|c| c.id == rule.category_id)
            .map(|c| c.name.as_str())
            .unwrap_or("?");
        println!(
            "   {} [{}] {:<7} {:<30} → {}",
            if rule.is_active { "✓" } else { "✗" },
            rule.id,
            rule.match_type,
            truncate(&rule.pattern, 30),
            category
        );
    }
    Ok(())
}

pub fn cmd_rules_add(
    db: &Database,
    user_id: i64,
    pattern: &str,
    category: &str,
    exact: bool,
) -> Result<()> {
    let category_id = db.upsert_category(user_id, category)?;
    let match_type = if exact {
        MatchType::Exact
    } else {
        MatchType::Partial
    };
    let id = db.create_merchant_rule(user_id, pattern, match_type, category_id)?;

    println!(
        "✅ Rule {}: {} '{}' → {}",
        id,
        match_type,
        pattern.trim(),
        category.trim()
    );
    println!("   Apply it to existing transactions with: ledgerlens automate");
    Ok(())
}

pub fn cmd_rules_toggle(db: &Database, user_id: i64, id: i64, active: bool) -> Result<()> {
    db.set_merchant_rule_active(user_id, id, active)?;
    println!(
        "✅ Rule {} {}",
        id,
        if active { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub fn cmd_rules_delete(db: &Database, user_id: i64, id: i64) -> Result<()> {
    db.delete_merchant_rule(user_id, id)?;
    println!("🗑️  Deleted rule {}", id);
    Ok(())
}

pub fn cmd_accounts_list(db: &Database, user_id: i64) -> Result<()> {
    let accounts = db.list_accounts(user_id)?;
    if accounts.is_empty() {
        println!("No accounts yet. Add one with:");
        println!("  ledgerlens accounts add \"Everyday Card\" --bank DBS --card 1234");
        return Ok(());
    }

    println!();
    println!("🏦 Accounts");
    for account in accounts {
        let card = account
            .card_last_four
            .as_deref()
            .map(|c| format!(" •••• {}", c))
            .unwrap_or_default();
        println!(
            "   [{}] {} ({}{})",
            account.id,
            account.name,
            account.bank_name.as_deref().unwrap_or("unknown bank"),
            card
        );
    }
    Ok(())
}

pub fn cmd_accounts_add(
    db: &Database,
    user_id: i64,
    name: &str,
    bank: Option<&str>,
    card: Option<&str>,
) -> Result<()> {
    let id = db.create_account(user_id, name, bank, card)?;
    println!("✅ Account '{}' ({})", name, id);
    println!("   Import against it with: ledgerlens import --file statement.pdf --account {}", id);
    Ok(())
}

pub fn cmd_automate(db: &Database, user_id: i64) -> Result<()> {
    println!("⚙️  Applying merchant rules...");
    let result = run_automation(db, user_id)?;
    println!("✅ Automation complete!");
    println!("   Examined: {}", result.examined);
    println!("   Matched:  {}", result.matched);
    println!("   Updated:  {}", result.updated);
    Ok(())
}
