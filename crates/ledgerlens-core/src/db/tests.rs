//! Database tests

use super::*;
use crate::models::*;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rusqlite::params;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn new_tx(user_id: i64, day: &str, amount: f64, merchant: &str) -> NewTransaction {
        NewTransaction {
            user_id,
            date: date(day),
            time: None,
            amount,
            merchant: merchant.to_string(),
            description: None,
            category_id: None,
            bank_name: None,
            card_last_four: None,
            source: TransactionSource::ImportedCsv,
            import_hash: Some(format!("{}-{}-{}", day, amount, merchant)),
        }
    }

    fn processing_job(db: &Database, user_id: i64) -> ImportJob {
        let job = db
            .create_import_job(
                FileType::Csv,
                &NewImportJob {
                    user_id,
                    filename: "jan.csv".into(),
                    ..NewImportJob::default()
                },
            )
            .unwrap();
        db.start_import_job(job.id).unwrap()
    }

    fn skipped(line: i64) -> NewSkippedRow {
        NewSkippedRow {
            page: None,
            line,
            date_text: "not a date".into(),
            amount_text: "12.00".into(),
            merchant_text: "SHOP".into(),
            reason: RowSkipReason::InvalidDate,
        }
    }

    #[test]
    fn test_in_memory_db() {
        let db = Database::in_memory().unwrap();
        assert!(db.list_accounts(1).unwrap().is_empty());
        assert_eq!(db.count_transactions(1).unwrap(), 0);
    }

    #[test]
    fn test_schema_tables_exist() {
        let db = Database::in_memory().unwrap();
        let conn = db.conn().unwrap();
        for table in [
            "accounts",
            "categories",
            "merchant_rules",
            "import_jobs",
            "import_skipped_rows",
            "transactions",
        ] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                    params![table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_account_crud_scoped_to_user() {
        let db = Database::in_memory().unwrap();
        let id = db
            .create_account(1, "Visa", Some("DBS"), Some("1234"))
            .unwrap();

        let account = db.get_account(1, id).unwrap().unwrap();
        assert_eq!(account.bank_name.as_deref(), Some("DBS"));
        assert_eq!(account.card_last_four.as_deref(), Some("1234"));

        assert!(db.get_account(2, id).unwrap().is_none());
        assert_eq!(db.list_accounts(1).unwrap().len(), 1);
        assert!(db.list_accounts(2).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_category_returns_existing() {
        let db = Database::in_memory().unwrap();
        let id = db.upsert_category(1, "Groceries").unwrap();
        assert_eq!(db.upsert_category(1, " Groceries ").unwrap(), id);
        assert_ne!(db.upsert_category(2, "Groceries").unwrap(), id);
        assert_eq!(db.find_category(1, "groceries").unwrap(), Some(id));
        assert!(db.upsert_category(1, "  ").is_err());
    }

    #[test]
    fn test_merchant_rule_requires_owned_category() {
        let db = Database::in_memory().unwrap();
        let theirs = db.upsert_category(2, "Travel").unwrap();
        let err = db
            .create_merchant_rule(1, "GRAB", MatchType::Partial, theirs)
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_merchant_rule_toggle_and_delete() {
        let db = Database::in_memory().unwrap();
        let cat = db.upsert_category(1, "Transport").unwrap();
        let first = db
            .create_merchant_rule(1, "GRAB", MatchType::Partial, cat)
            .unwrap();
        let second = db
            .create_merchant_rule(1, "Comfort Taxi", MatchType::Exact, cat)
            .unwrap();

        let rules = db.list_merchant_rules(1).unwrap();
        assert_eq!(
            rules.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![first, second]
        );
        assert_eq!(rules[1].match_type, MatchType::Exact);

        db.set_merchant_rule_active(1, first, false).unwrap();
        let active = db.list_active_merchant_rules(1).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, second);

        assert!(db.set_merchant_rule_active(2, first, true).is_err());
        db.delete_merchant_rule(1, second).unwrap();
        assert!(db.delete_merchant_rule(1, second).is_err());
        assert_eq!(db.list_merchant_rules(1).unwrap().len(), 1);
    }

    #[test]
    fn test_job_starts_pending() {
        let db = Database::in_memory().unwrap();
        let job = db
            .create_import_job(
                FileType::Pdf,
                &NewImportJob {
                    user_id: 1,
                    filename: "statement.pdf".into(),
                    statement_period: Some("Jan 2024".into()),
                    ..NewImportJob::default()
                },
            )
            .unwrap();
        assert_eq!(job.status, ImportStatus::Pending);
        assert_eq!(job.file_type, FileType::Pdf);
        assert!(job.completed_at.is_none());
        assert_eq!(job.statement_period.as_deref(), Some("Jan 2024"));
    }

    #[test]
    fn test_job_transitions_are_enforced() {
        let db = Database::in_memory().unwrap();
        let job = db
            .create_import_job(
                FileType::Csv,
                &NewImportJob {
                    user_id: 1,
                    filename: "a.csv".into(),
                    ..NewImportJob::default()
                },
            )
            .unwrap();

        // Cannot complete or fail a job that never started
        let err = db
            .persist_import(job.id, &[], &[], &ImportTotals::default())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        let err = db
            .fail_import_job(job.id, "boom", &ImportTotals::default(), &[])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));

        let started = db.start_import_job(job.id).unwrap();
        assert_eq!(started.status, ImportStatus::Processing);
        assert!(matches!(
            db.start_import_job(job.id),
            Err(Error::InvalidTransition(_))
        ));

        let failed = db
            .fail_import_job(job.id, "unreadable", &ImportTotals::default(), &[])
            .unwrap();
        assert_eq!(failed.status, ImportStatus::Failed);
        assert!(failed.completed_at.is_some());
        assert_eq!(failed.error_message.as_deref(), Some("unreadable"));

        // Terminal
        assert!(matches!(
            db.persist_import(job.id, &[], &[], &ImportTotals::default()),
            Err(Error::InvalidTransition(_))
        ));
        assert!(matches!(
            db.start_import_job(9999),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_completed_at_invariant_enforced_by_schema() {
        let db = Database::in_memory().unwrap();
        let job = processing_job(&db, 1);
        let conn = db.conn().unwrap();
        let result = conn.execute(
            "UPDATE import_jobs SET status = 'completed' WHERE id = ?",
            params![job.id],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_persist_import_writes_everything() {
        let db = Database::in_memory().unwrap();
        let job = processing_job(&db, 1);

        let txs = vec![
            new_tx(1, "2024-01-05", 45.20, "NTUC Fairprice"),
            new_tx(1, "2024-01-06", 1500.00, "Unknown Electronics Store"),
        ];
        let totals = ImportTotals {
            total_transactions: 3,
            processed_transactions: 2,
            filtered_rows: 1,
            duplicate_rows: 0,
            total_amount: 1545.20,
        };
        let persisted = db
            .persist_import(job.id, &txs, &[skipped(4)], &totals)
            .unwrap();

        assert_eq!(persisted.job.status, ImportStatus::Completed);
        assert!(persisted.job.completed_at.is_some());
        assert_eq!(persisted.job.total_transactions, 3);
        assert_eq!(persisted.job.processed_transactions, 2);
        assert_eq!(persisted.job.filtered_rows, 1);
        assert!((persisted.job.total_amount - 1545.20).abs() < 1e-9);
        assert_eq!(persisted.transactions.len(), 2);
        assert!(persisted
            .transactions
            .iter()
            .all(|t| t.import_job_id == Some(job.id)));

        let skipped_rows = db.list_skipped_rows(job.id).unwrap();
        assert_eq!(skipped_rows.len(), 1);
        assert_eq!(skipped_rows[0].reason, RowSkipReason::InvalidDate);
        assert_eq!(skipped_rows[0].date_text, "not a date");
    }

    #[test]
    fn test_persist_import_counts_duplicates() {
        let db = Database::in_memory().unwrap();
        let first = processing_job(&db, 1);
        let tx = new_tx(1, "2024-01-05", 45.20, "NTUC Fairprice");
        db.persist_import(first.id, &[tx.clone()], &[], &ImportTotals::default())
            .unwrap();

        let second = processing_job(&db, 1);
        let persisted = db
            .persist_import(second.id, &[tx], &[], &ImportTotals::default())
            .unwrap();
        assert!(persisted.transactions.is_empty());
        assert_eq!(persisted.duplicates, 1);
        assert_eq!(persisted.job.duplicate_rows, 1);
        assert_eq!(db.count_transactions(1).unwrap(), 1);

        // Same hash for another user is not a duplicate
        let other = processing_job(&db, 2);
        let mut theirs = new_tx(2, "2024-01-05", 45.20, "NTUC Fairprice");
        theirs.import_hash = Some("2024-01-05-45.2-NTUC Fairprice".into());
        let persisted = db
            .persist_import(other.id, &[theirs], &[], &ImportTotals::default())
            .unwrap();
        assert_eq!(persisted.transactions.len(), 1);
    }

    #[test]
    fn test_failed_persist_leaves_job_processing() {
        let db = Database::in_memory().unwrap();
        let job = processing_job(&db, 1);
        {
            let conn = db.conn().unwrap();
            conn.execute_batch("DROP TABLE import_skipped_rows;").unwrap();
        }

        let txs = vec![new_tx(1, "2024-01-05", 45.20, "NTUC Fairprice")];
        let result = db.persist_import(job.id, &txs, &[skipped(2)], &ImportTotals::default());
        assert!(matches!(result, Err(Error::Database(_))));

        let job = db.get_import_job(1, job.id).unwrap().unwrap();
        assert_eq!(job.status, ImportStatus::Processing);
        assert_eq!(db.count_transactions(1).unwrap(), 0);
    }

    #[test]
    fn test_delete_job_cascades() {
        let db = Database::in_memory().unwrap();
        let job = processing_job(&db, 1);
        db.persist_import(
            job.id,
            &[new_tx(1, "2024-01-05", 45.20, "NTUC Fairprice")],
            &[skipped(3)],
            &ImportTotals::default(),
        )
        .unwrap();

        assert!(matches!(
            db.delete_import_job(2, job.id),
            Err(Error::NotFound(_))
        ));
        db.delete_import_job(1, job.id).unwrap();
        assert_eq!(db.count_transactions(1).unwrap(), 0);
        assert!(db.list_skipped_rows(job.id).unwrap().is_empty());
        assert!(db.get_import_job(1, job.id).unwrap().is_none());
    }

    #[test]
    fn test_list_import_jobs_newest_first() {
        let db = Database::in_memory().unwrap();
        let a = processing_job(&db, 1);
        let b = processing_job(&db, 1);
        processing_job(&db, 2);

        let jobs = db.list_import_jobs(1, 10).unwrap();
        assert_eq!(jobs.iter().map(|j| j.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(db.list_import_jobs(1, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_manual_transaction_entry() {
        let db = Database::in_memory().unwrap();
        let mut tx = new_tx(1, "2024-02-01", 12.50, "Kopitiam");
        tx.source = TransactionSource::Manual;
        tx.import_hash = None;
        tx.time = chrono::NaiveTime::from_hms_opt(12, 30, 0);
        let id = db.insert_transaction(&tx).unwrap();

        let stored = db.get_transaction(1, id).unwrap().unwrap();
        assert_eq!(stored.source, TransactionSource::Manual);
        assert_eq!(stored.status, TransactionStatus::Pending);
        assert_eq!(stored.import_job_id, None);
        assert_eq!(stored.time, chrono::NaiveTime::from_hms_opt(12, 30, 0));
        assert_eq!(stored.anomaly_score, 0.0);
        assert!(!stored.is_anomaly);

        assert!(db.get_transaction(2, id).unwrap().is_none());
    }

    #[test]
    fn test_list_transactions_filters() {
        let db = Database::in_memory().unwrap();
        let job = processing_job(&db, 1);
        db.persist_import(
            job.id,
            &[
                new_tx(1, "2024-01-05", 45.20, "NTUC Fairprice"),
                new_tx(1, "2024-02-10", 8.00, "Kopitiam"),
            ],
            &[],
            &ImportTotals::default(),
        )
        .unwrap();
        let mut manual = new_tx(1, "2024-03-01", 20.0, "Cash");
        manual.import_hash = None;
        db.insert_transaction(&manual).unwrap();

        let all = db
            .list_transactions(1, &TransactionFilter::default())
            .unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].merchant, "Cash");

        let from_job = db
            .list_transactions(
                1,
                &TransactionFilter {
                    import_job_id: Some(job.id),
                    ..TransactionFilter::default()
                },
            )
            .unwrap();
        assert_eq!(from_job.len(), 2);

        let february = db
            .list_transactions(
                1,
                &TransactionFilter {
                    from: Some(date("2024-02-01")),
                    to: Some(date("2024-02-29")),
                    ..TransactionFilter::default()
                },
            )
            .unwrap();
        assert_eq!(february.len(), 1);
        assert_eq!(february[0].merchant, "Kopitiam");

        let limited = db
            .list_transactions(
                1,
                &TransactionFilter {
                    limit: Some(1),
                    ..TransactionFilter::default()
                },
            )
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_update_transaction_review() {
        let db = Database::in_memory().unwrap();
        let cat = db.upsert_category(1, "Groceries").unwrap();
        let mut tx = new_tx(1, "2024-01-05", 45.20, "NTUC");
        tx.import_hash = None;
        let id = db.insert_transaction(&tx).unwrap();

        let updated = db
            .update_transaction(
                1,
                id,
                &TransactionUpdate {
                    status: Some(TransactionStatus::Reviewed),
                    category_id: Some(Some(cat)),
                    merchant: Some("  NTUC   Fairprice ".into()),
                    description: Some(Some("weekly shop".into())),
                },
            )
            .unwrap();
        assert_eq!(updated.status, TransactionStatus::Reviewed);
        assert_eq!(updated.category_id, Some(cat));
        assert_eq!(updated.merchant, "NTUC Fairprice");
        assert_eq!(updated.description.as_deref(), Some("weekly shop"));

        // Clearing the category
        let cleared = db
            .update_transaction(
                1,
                id,
                &TransactionUpdate {
                    category_id: Some(None),
                    ..TransactionUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(cleared.category_id, None);
        assert_eq!(cleared.status, TransactionStatus::Reviewed);

        assert!(matches!(
            db.update_transaction(2, id, &TransactionUpdate::default()),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            db.update_transaction(
                1,
                id,
                &TransactionUpdate {
                    merchant: Some("   ".into()),
                    ..TransactionUpdate::default()
                }
            ),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_bulk_update_and_delete() {
        let db = Database::in_memory().unwrap();
        let cat = db.upsert_category(1, "Food").unwrap();
        let mut ids = Vec::new();
        for (i, m) in ["A Shop", "B Shop", "C Shop"].iter().enumerate() {
            let mut tx = new_tx(1, "2024-01-05", 10.0 + i as f64, m);
            tx.import_hash = None;
            ids.push(db.insert_transaction(&tx).unwrap());
        }
        let mut other = new_tx(2, "2024-01-05", 1.0, "Theirs");
        other.import_hash = None;
        let other_id = db.insert_transaction(&other).unwrap();

        let changed = db
            .bulk_update_transactions(
                1,
                &[ids[0], ids[1], other_id],
                Some(TransactionStatus::Processed),
                Some(Some(cat)),
            )
            .unwrap();
        assert_eq!(changed, 2);
        let t = db.get_transaction(1, ids[0]).unwrap().unwrap();
        assert_eq!(t.status, TransactionStatus::Processed);
        assert_eq!(t.category_id, Some(cat));
        assert_eq!(
            db.get_transaction(2, other_id).unwrap().unwrap().status,
            TransactionStatus::Pending
        );

        assert_eq!(db.bulk_update_transactions(1, &ids, None, None).unwrap(), 0);

        db.delete_transaction(1, ids[2]).unwrap();
        assert!(db.delete_transaction(1, ids[2]).is_err());
        assert_eq!(
            db.bulk_delete_transactions(1, &[ids[0], ids[1], other_id])
                .unwrap(),
            2
        );
        assert_eq!(db.count_transactions(1).unwrap(), 0);
        assert_eq!(db.count_transactions(2).unwrap(), 1);
    }

    #[test]
    fn test_deleting_category_clears_transactions() {
        let db = Database::in_memory().unwrap();
        let cat = db.upsert_category(1, "Food").unwrap();
        let mut tx = new_tx(1, "2024-01-05", 10.0, "Hawker");
        tx.import_hash = None;
        tx.category_id = Some(cat);
        let id = db.insert_transaction(&tx).unwrap();

        let conn = db.conn().unwrap();
        conn.execute("DELETE FROM categories WHERE id = ?", params![cat])
            .unwrap();
        drop(conn);

        assert_eq!(db.get_transaction(1, id).unwrap().unwrap().category_id, None);
    }

    #[test]
    fn test_derive_key_is_stable() {
        let a = derive_key("correct horse").unwrap();
        let b = derive_key("correct horse").unwrap();
        let c = derive_key("battery staple").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
