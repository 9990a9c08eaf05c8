//! Statement import: format routing, row extraction, and normalization
//!
//! Every parser emits the same [`ParsedRow`] shape so the later stages do not
//! care where a row came from. PDF documents run an ordered list of
//! strategies; each one returns rows or an explicit [`Extraction::NoRows`],
//! and the first strategy with rows wins.

use std::path::Path;

use tracing::{debug, info};

use crate::config::ImportConfig;
use crate::error::{Error, Result};
use crate::models::FileType;

pub mod columns;
pub mod delimited;
pub mod fallback;
pub mod normalize;
pub mod pdf;

pub use columns::{classify, classify_with_samples, AmountColumns, ColumnMapping};
pub use normalize::{NormalizedRow, RowNormalizer};

/// Raw values pulled out of a statement, before any typing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRow {
    pub date_text: String,
    pub amount_text: String,
    /// Amount was read from a dedicated credit column
    pub credit_column: bool,
    pub merchant_text: String,
    pub description_text: Option<String>,
    /// 1-based page for PDF rows
    pub page: Option<usize>,
    /// 1-based line (CSV record line, or line within the page)
    pub line: usize,
}

/// Summary/statement-structure phrases that never describe a transaction
pub const SUMMARY_KEYWORDS: &[&str] = &[
    "total",
    "subtotal",
    "balance",
    "previous balance",
    "opening balance",
    "closing balance",
    "balance b/f",
    "balance c/f",
    "brought forward",
    "carried forward",
    "new credits",
    "new debits",
    "minimum payment",
    "credit limit",
    "available credit",
    "amount due",
    "summary",
    "statement",
    "payment received",
    "auto payment",
];

/// Case-insensitive substring match against [`SUMMARY_KEYWORDS`]
pub fn is_summary_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    SUMMARY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

impl ParsedRow {
    /// A statement total, subtotal, or balance line rather than a transaction
    pub fn is_summary(&self) -> bool {
        is_summary_text(&self.merchant_text)
            || self.description_text.as_deref().is_some_and(is_summary_text)
            || is_summary_text(&self.date_text)
            || is_summary_text(&self.amount_text)
    }
}

/// Rows produced by one strategy
#[derive(Debug, Clone, Default)]
pub struct ExtractedRows {
    pub rows: Vec<ParsedRow>,
    /// Summary rows dropped before they were attempted
    pub filtered: usize,
}

/// Outcome of one extraction strategy
#[derive(Debug, Clone)]
pub enum Extraction {
    Rows(ExtractedRows),
    NoRows,
}

impl Extraction {
    /// `Rows` when at least one row survived filtering
    pub fn from_rows(rows: Vec<ParsedRow>, filtered: usize) -> Self {
        if rows.is_empty() {
            Self::NoRows
        } else {
            Self::Rows(ExtractedRows { rows, filtered })
        }
    }
}

/// A way of finding transaction rows in extracted page text
pub trait PageStrategy {
    fn name(&self) -> &'static str;

    /// Never fails on malformed input; unusable text yields `NoRows`
    fn extract(&self, pages: &[String]) -> Extraction;
}

/// Rows extracted from a whole document, tagged with the strategy that found them
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub rows: Vec<ParsedRow>,
    pub filtered: usize,
    pub strategy: &'static str,
}

/// Pick the parser for an upload by its file extension
pub fn route_format(filename: &str) -> Result<FileType> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match extension.as_deref() {
        Some("csv") => Ok(FileType::Csv),
        Some("pdf") => Ok(FileType::Pdf),
        Some(other) => Err(Error::UnsupportedFormat(format!(
            "'.{}' files are not supported (expected .csv or .pdf)",
            other
        ))),
        None => Err(Error::UnsupportedFormat(format!(
            "'{}' has no file extension (expected .csv or .pdf)",
            filename
        ))),
    }
}

/// The PDF strategies, in the order they are tried
pub fn pdf_strategies() -> Vec<Box<dyn PageStrategy>> {
    vec![
        Box::new(pdf::TableExtractor),
        Box::new(fallback::LinePatternParser),
        Box::new(fallback::ColumnPairingParser),
    ]
}

/// Run strategies in order; the first one that yields rows wins
pub fn run_strategies(
    strategies: &[Box<dyn PageStrategy>],
    pages: &[String],
) -> Result<ExtractedDocument> {
    for strategy in strategies {
        match strategy.extract(pages) {
            Extraction::Rows(found) => {
                info!(
                    "{} found {} rows ({} summary rows filtered)",
                    strategy.name(),
                    found.rows.len(),
                    found.filtered
                );
                return Ok(ExtractedDocument {
                    rows: found.rows,
                    filtered: found.filtered,
                    strategy: strategy.name(),
                });
            }
            Extraction::NoRows => debug!("{} found no rows", strategy.name()),
        }
    }

    Err(Error::NoExtractableRows(
        "neither table extraction nor text fallback found any transactions".to_string(),
    ))
}

/// Extract parsed rows from an uploaded document
pub fn extract_rows(
    file_type: FileType,
    bytes: &[u8],
    config: &ImportConfig,
) -> Result<ExtractedDocument> {
    match file_type {
        FileType::Csv => match delimited::extract(bytes, config.header_scan_rows)? {
            Extraction::Rows(found) => Ok(ExtractedDocument {
                rows: found.rows,
                filtered: found.filtered,
                strategy: "csv",
            }),
            Extraction::NoRows => Err(Error::NoExtractableRows(
                "the CSV header was recognized but no transaction rows followed".to_string(),
            )),
        },
        FileType::Pdf => {
            let pages = pdf::load_pages(bytes, config.pdf_timeout)?;
            debug!("Extracted text from {} PDF pages", pages.len());
            run_strategies(&pdf_strategies(), &pages)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, usize);

    impl PageStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn extract(&self, _pages: &[String]) -> Extraction {
            let rows = (0..self.1)
                .map(|i| ParsedRow {
                    merchant_text: format!("{} {}", self.0, i),
                    ..ParsedRow::default()
                })
                .collect();
            Extraction::from_rows(rows, 0)
        }
    }

    #[test]
    fn test_route_format() {
        assert_eq!(route_format("statement.csv").unwrap(), FileType::Csv);
        assert_eq!(route_format("Jan 2024.PDF").unwrap(), FileType::Pdf);
        assert!(matches!(
            route_format("statement.xlsx"),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(matches!(
            route_format("statement"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_summary_detection() {
        assert!(is_summary_text("TOTAL"));
        assert!(is_summary_text("Sub-total"));
        assert!(is_summary_text("Previous Balance"));
        assert!(!is_summary_text("NTUC Fairprice"));
        assert!(is_summary_text("PAYMENT RECEIVED - THANK YOU"));
        assert!(is_summary_text("Auto Payment via GIRO"));
        assert!(is_summary_text("Statement Date"));
        assert!(!is_summary_text("GIRO PAYMENT TO SP SERVICES"));

        let row = ParsedRow {
            date_text: "2024-01-07".into(),
            amount_text: "TOTAL".into(),
            ..ParsedRow::default()
        };
        assert!(row.is_summary());
    }

    #[test]
    fn test_first_strategy_with_rows_wins() {
        let strategies: Vec<Box<dyn PageStrategy>> = vec![
            Box::new(Fixed("empty", 0)),
            Box::new(Fixed("second", 2)),
            Box::new(Fixed("third", 5)),
        ];
        let doc = run_strategies(&strategies, &[]).unwrap();
        assert_eq!(doc.strategy, "second");
        assert_eq!(doc.rows.len(), 2);
    }

    #[test]
    fn test_no_strategy_rows_is_no_extractable_rows() {
        let strategies: Vec<Box<dyn PageStrategy>> = vec![Box::new(Fixed("empty", 0))];
        let err = run_strategies(&strategies, &[]).unwrap_err();
        assert!(matches!(err, Error::NoExtractableRows(_)));
    }
}
