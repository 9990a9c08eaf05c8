//! Line-oriented fallback parsers for PDF text without a recognizable table
//!
//! [`LinePatternParser`] reads `DATE  MERCHANT ...  AMOUNT` lines directly.
//! [`ColumnPairingParser`] handles layouts where dates and amounts are printed
//! in separate columns that the text extractor emits as separate runs; it
//! pairs them in reading order. Neither parser raises on malformed text:
//! lines that do not match are skipped.

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use super::{is_summary_text, Extraction, PageStrategy, ParsedRow};

const MONTHS: &str = "(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\\.?";

fn date_pattern() -> String {
    format!(
        r"\d{{4}}-\d{{2}}-\d{{2}}|\d{{1,2}}[/.-]\d{{1,2}}(?:[/.-]\d{{2,4}})?|\d{{1,2}}[ -]{m}(?:[ -]\d{{2,4}})?|{m} \d{{1,2}}(?:,? \d{{4}})?",
        m = MONTHS
    )
}

/// Currency codes accepted in front of an amount; any other capitalised word
/// belongs to the merchant
const CURRENCY_CODES: &str = "SGD|USD|EUR|GBP|MYR|AUD|NZD|CAD|HKD|JPY|CNY|RMB|INR|IDR|THB|PHP|VND|KRW|TWD|CHF";

fn amount_pattern() -> String {
    format!(
        r"\(?(?:(?:{codes}) ?|[A-Z]{{1,2}}\$ ?|[$€£¥₹] ?)?-?(?:[$€£¥₹] ?)?\d{{1,3}}(?:,\d{{3}})*(?:\d+)?\.\d{{2}}\)?-?(?: ?(?:CR|DR|Cr|Dr))?",
        codes = CURRENCY_CODES
    )
}

/// `DATE MERCHANT AMOUNT [BALANCE]` on one line
fn line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i:^\s*(?P<date>{date}))\s+(?P<merchant>.+?)\s+(?P<amount>{amt})(?:\s+(?P<balance>{amt}))?\s*$",
            date = date_pattern(),
            amt = amount_pattern()
        ))
        .expect("statement line regex")
    })
}

/// A second (posting) date at the start of the merchant text
fn leading_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)^(?:{})\s+", date_pattern())).expect("leading date regex")
    })
}

/// Short dotted date followed by upper-case merchant text
fn dotted_entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(\d{2}\.\d{2}\.\d{2})\s+([A-Z0-9*'\- ]+)").expect("dotted entry regex")
    })
}

fn standalone_amount_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\(?\d{1,3}(?:,\d{3})*\.\d{2}\)?(?:CR|DR)?$").expect("amount regex")
    })
}

/// Merchant text that cannot be a transaction description
fn is_rejected_merchant(merchant: &str) -> bool {
    let trimmed = merchant.trim();
    trimmed.chars().count() < 3
        || trimmed.chars().all(|c| c.is_ascii_digit() || c.is_whitespace())
        || trimmed.to_uppercase().contains("FOREIGN AMOUNT")
}

/// Parse one statement line; `None` when the line is not a transaction line
pub fn parse_line(line: &str) -> Option<ParsedRow> {
    let caps = line_re().captures(line)?;
    let date = caps.name("date")?.as_str().trim();
    let mut merchant = caps.name("merchant")?.as_str().trim();
    let amount = caps.name("amount")?.as_str().trim();

    if let Some(m) = leading_date_re().find(merchant) {
        merchant = merchant[m.end()..].trim();
    }
    if is_rejected_merchant(merchant) {
        return None;
    }

    Some(ParsedRow {
        date_text: date.to_string(),
        amount_text: amount.to_string(),
        credit_column: false,
        merchant_text: merchant.split_whitespace().collect::<Vec<_>>().join(" "),
        description_text: None,
        page: None,
        line: 0,
    })
}

/// Regex scan of each page line for date + merchant + trailing amount
#[derive(Debug, Clone, Copy, Default)]
pub struct LinePatternParser;

impl PageStrategy for LinePatternParser {
    fn name(&self) -> &'static str {
        "text line fallback"
    }

    fn extract(&self, pages: &[String]) -> Extraction {
        let mut rows = Vec::new();
        let mut filtered = 0;

        for (page_idx, text) in pages.iter().enumerate() {
            for (line_idx, line) in text.lines().enumerate() {
                let Some(mut row) = parse_line(line) else {
                    continue;
                };
                row.page = Some(page_idx + 1);
                row.line = line_idx + 1;
                if row.is_summary() {
                    filtered += 1;
                    continue;
                }
                rows.push(row);
            }
        }

        debug!("Line fallback matched {} rows", rows.len());
        Extraction::from_rows(rows, filtered)
    }
}

/// Pairs `DD.MM.YY MERCHANT` entries with standalone amounts in reading order
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnPairingParser;

impl ColumnPairingParser {
    fn extract_page(page_no: usize, text: &str, rows: &mut Vec<ParsedRow>) -> usize {
        let mut entries = Vec::new();
        let mut amounts = Vec::new();

        for (line_idx, line) in text.lines().enumerate() {
            for caps in dotted_entry_re().captures_iter(line) {
                if let (Some(date), Some(merchant)) = (caps.get(1), caps.get(2)) {
                    entries.push((line_idx + 1, date.as_str(), merchant.as_str().trim()));
                }
            }
            amounts.extend(
                line.split_whitespace()
                    .filter(|token| standalone_amount_re().is_match(token)),
            );
        }

        let mut filtered = 0;
        for ((line, date, merchant), amount) in entries.into_iter().zip(amounts) {
            if is_summary_text(merchant) {
                filtered += 1;
                continue;
            }
            if is_rejected_merchant(merchant) {
                continue;
            }
            rows.push(ParsedRow {
                date_text: date.to_string(),
                amount_text: amount.to_string(),
                credit_column: false,
                merchant_text: merchant.split_whitespace().collect::<Vec<_>>().join(" "),
                description_text: None,
                page: Some(page_no),
                line,
            });
        }
        filtered
    }
}

impl PageStrategy for ColumnPairingParser {
    fn name(&self) -> &'static str {
        "column pairing fallback"
    }

    fn extract(&self, pages: &[String]) -> Extraction {
        let mut rows = Vec::new();
        let mut filtered = 0;
        for (i, text) in pages.iter().enumerate() {
            filtered += Self::extract_page(i + 1, text, &mut rows);
        }
        Extraction::from_rows(rows, filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_rows(text: &str) -> Vec<ParsedRow> {
        match LinePatternParser.extract(&[text.to_string()]) {
            Extraction::Rows(found) => found.rows,
            Extraction::NoRows => Vec::new(),
        }
    }

    #[test]
    fn test_basic_line() {
        let row = parse_line("05/01/2024 NTUC FAIRPRICE 45.20").unwrap();
        assert_eq!(row.date_text, "05/01/2024");
        assert_eq!(row.merchant_text, "NTUC FAIRPRICE");
        assert_eq!(row.amount_text, "45.20");
    }

    #[test]
    fn test_date_variants() {
        assert_eq!(parse_line("05-01-2024 GRAB RIDE 12.00").unwrap().date_text, "05-01-2024");
        assert_eq!(parse_line("05 Jan 2024 GRAB RIDE 12.00").unwrap().date_text, "05 Jan 2024");
        assert_eq!(parse_line("05 JAN GRAB RIDE 12.00").unwrap().date_text, "05 JAN");
        assert_eq!(parse_line("Jan 05, 2024 GRAB RIDE 12.00").unwrap().date_text, "Jan 05, 2024");
        assert_eq!(parse_line("2024-01-05 GRAB RIDE 12.00").unwrap().date_text, "2024-01-05");
    }

    #[test]
    fn test_amount_variants() {
        assert_eq!(parse_line("05/01/2024 AMAZON 1,234.56").unwrap().amount_text, "1,234.56");
        assert_eq!(parse_line("05/01/2024 AMAZON $88.10").unwrap().amount_text, "$88.10");
        assert_eq!(parse_line("05/01/2024 REFUND (20.00)").unwrap().amount_text, "(20.00)");
        assert_eq!(parse_line("05/01/2024 PAYMENT 500.00 CR").unwrap().amount_text, "500.00 CR");
    }

    #[test]
    fn test_trailing_capitalised_word_stays_in_merchant() {
        let row = parse_line("05/01/2024 COLD STORAGE JEM 45.20").unwrap();
        assert_eq!(row.merchant_text, "COLD STORAGE JEM");
        assert_eq!(row.amount_text, "45.20");

        let row = parse_line("05/01/2024 AMAZON US USD 88.10").unwrap();
        assert_eq!(row.merchant_text, "AMAZON US");
        assert_eq!(row.amount_text, "USD 88.10");
    }

    #[test]
    fn test_balance_column_is_not_amount() {
        let row = parse_line("05/01/2024 STARBUCKS 5.00 1,234.56").unwrap();
        assert_eq!(row.merchant_text, "STARBUCKS");
        assert_eq!(row.amount_text, "5.00");
    }

    #[test]
    fn test_posting_date_dropped_from_merchant() {
        let row = parse_line("05/01 06/01 STARBUCKS COFFEE 5.00").unwrap();
        assert_eq!(row.date_text, "05/01");
        assert_eq!(row.merchant_text, "STARBUCKS COFFEE");
    }

    #[test]
    fn test_lines_without_trailing_amount_are_skipped() {
        assert!(parse_line("05/01/2024 NTUC FAIRPRICE").is_none());
        assert!(parse_line("05/01/2024 NTUC FAIRPRICE 45").is_none());
        assert!(parse_line("Page 1 of 3").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn test_rejected_merchants() {
        assert!(parse_line("05/01/2024 AB 45.20").is_none());
        assert!(parse_line("05/01/2024 123456 45.20").is_none());
        assert!(parse_line("05/01/2024 FOREIGN AMOUNT USD 45.20").is_none());
    }

    #[test]
    fn test_extract_filters_summary_lines() {
        let text = "\
Statement of Account
05/01/2024 NTUC FAIRPRICE 45.20
06/01/2024 UNKNOWN ELECTRONICS STORE 1,500.00
07/01/2024 TOTAL 1,545.20
garbage line 12
";
        let rows = line_rows(text);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[1].merchant_text, "UNKNOWN ELECTRONICS STORE");
    }

    #[test]
    fn test_column_pairing() {
        let text = "\
05.01.24 GRAB RIDE
06.01.24 NTUC FAIRPRICE
Amount
12.50
45.20
";
        match ColumnPairingParser.extract(&[text.to_string()]) {
            Extraction::Rows(found) => {
                assert_eq!(found.rows.len(), 2);
                assert_eq!(found.rows[0].merchant_text, "GRAB RIDE");
                assert_eq!(found.rows[0].amount_text, "12.50");
                assert_eq!(found.rows[1].amount_text, "45.20");
            }
            Extraction::NoRows => panic!("expected rows"),
        }
    }
}
