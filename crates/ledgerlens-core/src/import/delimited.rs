//! CSV statement reader
//!
//! Finds the header row among the first few records (banks often prepend
//! account details), classifies it by header names, and emits one
//! [`ParsedRow`] per data record. Cell contents are never used to pick
//! columns here.

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::debug;

use super::columns::{self, AmountColumns, ColumnMapping};
use super::{Extraction, ParsedRow};
use crate::error::{Error, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

fn cell(record: &StringRecord, index: Option<usize>) -> String {
    index
        .and_then(|i| record.get(i))
        .map(|s| s.split_whitespace().collect::<Vec<_>>().join(" "))
        .unwrap_or_default()
}

/// Read the amount cell(s) for a record according to the mapping
fn amount_cell(record: &StringRecord, amount: AmountColumns) -> (String, bool) {
    match amount {
        AmountColumns::Single(i) => (cell(record, Some(i)), false),
        AmountColumns::Split { debit, credit } => {
            let debit_text = cell(record, debit);
            if !debit_text.is_empty() {
                return (debit_text, false);
            }
            let credit_text = cell(record, credit);
            let is_credit = !credit_text.is_empty();
            (credit_text, is_credit)
        }
    }
}

fn to_parsed_row(record: &StringRecord, mapping: &ColumnMapping, line: usize) -> ParsedRow {
    let (amount_text, credit_column) = match mapping.amount {
        Some(amount) => amount_cell(record, amount),
        None => (String::new(), false),
    };
    let description = cell(record, mapping.description);

    ParsedRow {
        date_text: cell(record, mapping.date),
        amount_text,
        credit_column,
        merchant_text: cell(record, mapping.merchant),
        description_text: (!description.is_empty()).then_some(description),
        page: None,
        line,
    }
}

/// Extract rows from CSV bytes
///
/// Fails with `UnreadableDocument` for empty input and `NoExtractableRows`
/// when no header is recognized within `header_scan_rows` records. Rows with
/// bad dates or amounts are still emitted; normalization decides to skip them.
/// Fields that are not valid UTF-8 are decoded lossily.
pub fn extract(bytes: &[u8], header_scan_rows: usize) -> Result<Extraction> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(Error::UnreadableDocument("the file is empty".to_string()));
    }

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(bytes);

    let mut mapping: Option<ColumnMapping> = None;
    let mut rows = Vec::new();
    let mut filtered = 0;

    for (index, result) in rdr.byte_records().enumerate() {
        let raw = result?;
        let line = raw
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 1);
        // Legacy-encoded bytes become U+FFFD instead of failing the document
        let record = StringRecord::from_byte_record_lossy(raw);

        let Some(mapping) = mapping.as_ref() else {
            if index >= header_scan_rows {
                break;
            }
            let fields: Vec<&str> = record.iter().collect();
            let candidate = columns::classify(&fields[..]);
            if candidate.is_usable() {
                debug!("CSV header found on line {}: {:?}", line, candidate);
                mapping = Some(candidate);
            }
            continue;
        };

        if record.iter().all(|c| c.is_empty()) {
            continue;
        }

        let row = to_parsed_row(&record, mapping, line);
        if row.is_summary() {
            debug!("Filtered summary row on line {}", line);
            filtered += 1;
            continue;
        }
        rows.push(row);
    }

    if mapping.is_none() {
        return Err(Error::NoExtractableRows(format!(
            "no recognizable header row (date, amount, merchant) in the first {} rows",
            header_scan_rows
        )));
    }

    Ok(Extraction::from_rows(rows, filtered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(csv: &str) -> Vec<ParsedRow> {
        match extract(csv.as_bytes(), 15).unwrap() {
            Extraction::Rows(found) => found.rows,
            Extraction::NoRows => Vec::new(),
        }
    }

    #[test]
    fn test_simple_header() {
        let csv = "date,amount,merchant,description
2024-01-05,45.20,NTUC Fairprice,groceries
2024-01-06,1500.00,Unknown Electronics Store,";
        let parsed = rows(csv);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].date_text, "2024-01-05");
        assert_eq!(parsed[0].amount_text, "45.20");
        assert_eq!(parsed[0].merchant_text, "NTUC Fairprice");
        assert_eq!(parsed[0].description_text.as_deref(), Some("groceries"));
        assert_eq!(parsed[1].description_text, None);
        assert_eq!(parsed[1].line, 3);
    }

    #[test]
    fn test_total_row_filtered() {
        let csv = "date,amount,merchant,description
2024-01-05,45.20,NTUC Fairprice,groceries
2024-01-07,TOTAL,,";
        match extract(csv.as_bytes(), 15).unwrap() {
            Extraction::Rows(found) => {
                assert_eq!(found.rows.len(), 1);
                assert_eq!(found.filtered, 1);
            }
            Extraction::NoRows => panic!("expected rows"),
        }
    }

    #[test]
    fn test_payment_received_row_filtered() {
        let csv = "date,amount,merchant
2024-01-05,45.20,NTUC Fairprice
2024-01-10,-500.00,PAYMENT RECEIVED - THANK YOU
2024-01-11,-200.00,AUTO PAYMENT GIRO";
        match extract(csv.as_bytes(), 15).unwrap() {
            Extraction::Rows(found) => {
                assert_eq!(found.rows.len(), 1);
                assert_eq!(found.filtered, 2);
            }
            Extraction::NoRows => panic!("expected rows"),
        }
    }

    #[test]
    fn test_header_after_preamble() {
        let csv = "Account Number,12345678
Statement Period,Jan 2024

Transaction Date,Description,Withdrawals,Deposits,Balance
05/01/2024,GRAB *RIDE,12.50,,987.50
06/01/2024,SALARY,,3000.00,3987.50";
        let parsed = rows(csv);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].amount_text, "12.50");
        assert!(!parsed[0].credit_column);
        assert_eq!(parsed[1].amount_text, "3000.00");
        assert!(parsed[1].credit_column);
    }

    #[test]
    fn test_malformed_rows_are_still_emitted() {
        let csv = "Date,Description,Amount
not a date,COFFEE,4.50
2024-01-02,TEA,abc";
        assert_eq!(rows(csv).len(), 2);
    }

    #[test]
    fn test_blank_rows_ignored() {
        let csv = "Date,Description,Amount\n,,\n2024-01-02,TEA,3.00\n";
        let parsed = rows(csv);
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_bom_and_whitespace() {
        let csv = "\u{feff}Date , Merchant , Amount\n 2024-01-02 ,  KOPI   KING , 3.00 \n";
        let parsed = rows(csv);
        assert_eq!(parsed[0].merchant_text, "KOPI KING");
        assert_eq!(parsed[0].date_text, "2024-01-02");
    }

    #[test]
    fn test_invalid_utf8_field_is_decoded_lossily() {
        let csv = b"date,amount,merchant\n2024-01-05,45.20,NTUC\n2024-01-06,3.50,Caf\xe9 Nero\n";
        let parsed = match extract(csv, 15).unwrap() {
            Extraction::Rows(found) => found.rows,
            Extraction::NoRows => panic!("expected rows"),
        };
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].merchant_text, "NTUC");
        assert_eq!(parsed[1].merchant_text, "Caf\u{fffd} Nero");
        assert_eq!(parsed[1].amount_text, "3.50");
        assert_eq!(parsed[1].line, 3);
    }

    #[test]
    fn test_empty_file_is_unreadable() {
        assert!(matches!(
            extract(b"  \n", 15),
            Err(Error::UnreadableDocument(_))
        ));
    }

    #[test]
    fn test_missing_header_is_no_rows() {
        let csv = "foo,bar\n1,2\n";
        assert!(matches!(
            extract(csv.as_bytes(), 15),
            Err(Error::NoExtractableRows(_))
        ));
    }
}
