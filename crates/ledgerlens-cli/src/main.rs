//! LedgerLens CLI - Statement import and anomaly scoring
//!
//! Usage:
//!   ledgerlens init                        Initialize database
//!   ledgerlens import --file statement.pdf Import a CSV or PDF statement
//!   ledgerlens automate                    Re-apply merchant rules
//!   ledgerlens anomalies recalc            Recompute anomaly scores

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let user = cli.user;
    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Import {
            file,
            bank,
            card,
            period,
            account,
            json,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            commands::cmd_import(
                &db,
                &config,
                &commands::ImportArgs {
                    user_id: user,
                    file,
                    bank,
                    card,
                    period,
                    account,
                },
                json,
            )
        }
        Commands::Jobs { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_jobs_list(&db, user, 20),
                Some(JobsAction::List { limit }) => commands::cmd_jobs_list(&db, user, limit),
                Some(JobsAction::Show { id }) => commands::cmd_jobs_show(&db, user, id),
                Some(JobsAction::Delete { id }) => commands::cmd_jobs_delete(&db, user, id),
            }
        }
        Commands::Transactions { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_transactions_list(&db, user, 20, None, false),
                Some(TransactionsAction::List {
                    limit,
                    job,
                    anomalies,
                }) => commands::cmd_transactions_list(&db, user, limit, job, anomalies),
                Some(TransactionsAction::Add {
                    date,
                    amount,
                    merchant,
                    description,
                    category,
                }) => commands::cmd_transactions_add(
                    &db,
                    user,
                    &date,
                    amount,
                    &merchant,
                    description.as_deref(),
                    category.as_deref(),
                ),
                Some(TransactionsAction::Review {
                    ids,
                    status,
                    category,
                    clear_category,
                }) => commands::cmd_transactions_review(
                    &db,
                    user,
                    &ids,
                    status.as_deref(),
                    category.as_deref(),
                    clear_category,
                ),
                Some(TransactionsAction::Delete { ids }) => {
                    commands::cmd_transactions_delete(&db, user, &ids)
                }
            }
        }
        Commands::Categories { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(CategoriesAction::List) => commands::cmd_categories_list(&db, user),
                Some(CategoriesAction::Add { name }) => {
                    commands::cmd_categories_add(&db, user, &name)
                }
            }
        }
        Commands::Rules { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(RulesAction::List) => commands::cmd_rules_list(&db, user),
                Some(RulesAction::Add {
                    pattern,
                    category,
                    exact,
                }) => commands::cmd_rules_add(&db, user, &pattern, &category, exact),
                Some(RulesAction::Toggle { id, off }) => {
                    commands::cmd_rules_toggle(&db, user, id, !off)
                }
                Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, user, id),
            }
        }
        Commands::Accounts { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None | Some(AccountsAction::List) => commands::cmd_accounts_list(&db, user),
                Some(AccountsAction::Add { name, bank, card }) => commands::cmd_accounts_add(
                    &db,
                    user,
                    &name,
                    bank.as_deref(),
                    card.as_deref(),
                ),
            }
        }
        Commands::Automate => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_automate(&db, user)
        }
        Commands::Anomalies { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config(cli.config.as_deref())?;
            match action {
                None => commands::cmd_anomalies_list(&db, &config, user, None, None),
                Some(AnomaliesAction::List { months, as_of }) => {
                    commands::cmd_anomalies_list(&db, &config, user, months, as_of.as_deref())
                }
                Some(AnomaliesAction::Recalc { months, as_of }) => {
                    commands::cmd_anomalies_recalc(&db, &config, user, months, as_of.as_deref())
                }
            }
        }
    }
}
