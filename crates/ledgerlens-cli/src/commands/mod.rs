//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, load_config)
//! - `import` - Statement import
//! - `jobs` - Import job history (list, show, delete)
//! - `transactions` - Transaction commands (list, add, review, delete)
//! - `rules` - Categories, merchant rules, accounts, automation
//! - `anomalies` - Anomaly recalculation and listing

pub mod anomalies;
pub mod core;
pub mod import;
pub mod jobs;
pub mod rules;
pub mod transactions;

// Re-export command functions for main.rs
pub use anomalies::*;
pub use core::*;
pub use import::*;
pub use jobs::*;
pub use rules::*;
pub use transactions::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Signed amount, red for debits and green for credits
pub fn format_amount(amount: f64) -> String {
    if amount < 0.0 {
        format!("\x1b[32m-{:.2}\x1b[0m", amount.abs())
    } else {
        format!("\x1b[31m{:.2}\x1b[0m", amount)
    }
}
