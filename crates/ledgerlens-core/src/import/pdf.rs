//! PDF statement text loading and table extraction
//!
//! Text is pulled per page with `pdf-extract`, which keeps the horizontal
//! spacing of table layouts. A table is a header line recognized by the
//! column classifier followed by body lines; each body cell is assigned to the
//! header column it overlaps. Lines without a date in the date column are
//! continuations of the previous row's description (wrapped cells).

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};

use super::columns::{self, AmountColumns, ColumnMapping};
use super::{is_summary_text, Extraction, PageStrategy, ParsedRow};
use crate::error::{Error, Result};

/// Bytes searched for the `%PDF-` marker
const HEADER_SEARCH_BYTES: usize = 1024;

/// Load per-page text from PDF bytes, bounded by `timeout`
///
/// Extraction runs on a worker thread. On timeout the worker is abandoned and
/// the document fails; a panic inside the PDF parser is reported as an
/// unreadable document.
pub fn load_pages(bytes: &[u8], timeout: Duration) -> Result<Vec<String>> {
    if bytes.is_empty() {
        return Err(Error::UnreadableDocument("the file is empty".to_string()));
    }
    let head = &bytes[..bytes.len().min(HEADER_SEARCH_BYTES)];
    if !head.windows(5).any(|w| w == b"%PDF-") {
        return Err(Error::UnreadableDocument(
            "the file is not a PDF document".to_string(),
        ));
    }

    let data = bytes.to_vec();
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("pdf-extract".to_string())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                pdf_extract::extract_text_from_mem_by_pages(&data).map_err(|e| e.to_string())
            }));
            let _ = tx.send(result);
        })?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(Ok(pages))) => Ok(pages),
        Ok(Ok(Err(e))) => Err(Error::UnreadableDocument(format!(
            "could not read PDF: {}",
            e
        ))),
        Ok(Err(_)) => Err(Error::UnreadableDocument(
            "the PDF parser crashed on this document".to_string(),
        )),
        Err(RecvTimeoutError::Timeout) => {
            warn!("PDF extraction exceeded {:?}, abandoning", timeout);
            Err(Error::ExtractionTimeout(timeout.as_secs()))
        }
        Err(RecvTimeoutError::Disconnected) => Err(Error::UnreadableDocument(
            "PDF extraction stopped unexpectedly".to_string(),
        )),
    }
}

/// Runs of text separated by at least two spaces (or a tab)
fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\S+(?: \S+)*").expect("cell regex"))
}

/// A date-looking token at the start of a cell
fn date_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:\d{4}-\d{2}-\d{2}|\d{1,2}[/.-]\d{1,2}(?:[/.-]\d{2,4})?|\d{1,2}[ -](?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]* \d{1,2})\b",
        )
        .expect("date token regex")
    })
}

/// One text cell with its character span on the line
#[derive(Debug, Clone, PartialEq)]
struct Cell {
    text: String,
    start: usize,
    end: usize,
}

/// Split a line into cells on runs of two or more spaces
fn split_cells(line: &str) -> Vec<Cell> {
    let line = line.replace('\t', "    ");
    cell_re()
        .find_iter(&line)
        .map(|m| {
            let start = line[..m.start()].chars().count();
            Cell {
                text: m.as_str().to_string(),
                start,
                end: start + m.as_str().chars().count(),
            }
        })
        .collect()
}

pub(crate) fn looks_like_date(text: &str) -> bool {
    date_token_re().is_match(text.trim())
}

/// A recognized table header and the spans of its columns
#[derive(Debug, Clone)]
struct TableHeader {
    mapping: ColumnMapping,
    spans: Vec<(usize, usize)>,
}

impl TableHeader {
    fn detect(line: &str) -> Option<Self> {
        let cells = split_cells(line);
        if cells.len() < 3 {
            return None;
        }
        let texts: Vec<&str> = cells.iter().map(|c| c.text.as_str()).collect();
        let mapping = columns::classify(&texts[..]);
        if !mapping.is_usable() {
            return None;
        }
        Some(Self {
            mapping,
            spans: cells.iter().map(|c| (c.start, c.end)).collect(),
        })
    }

    /// Column whose span overlaps the cell most, else the nearest one
    fn column_for(&self, cell: &Cell) -> usize {
        let overlap = |&(s, e): &(usize, usize)| -> isize {
            cell.end.min(e) as isize - cell.start.max(s) as isize
        };
        let center = |s: usize, e: usize| (s + e) as isize;
        let cell_center = center(cell.start, cell.end);

        let best = self
            .spans
            .iter()
            .enumerate()
            .max_by_key(|(_, span)| overlap(*span))
            .filter(|(_, span)| overlap(*span) > 0)
            .map(|(i, _)| i);

        best.unwrap_or_else(|| {
            self.spans
                .iter()
                .enumerate()
                .min_by_key(|(_, span)| (center(span.0, span.1) - cell_center).abs())
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
    }

    /// Cells sit only under the merchant/description columns and touch no other span
    fn is_text_only(&self, cells: &[Cell]) -> bool {
        let text_columns = [self.mapping.merchant, self.mapping.description];
        !cells.is_empty()
            && cells.iter().all(|cell| {
                self.spans.iter().enumerate().all(|(i, &(s, e))| {
                    text_columns.contains(&Some(i))
                        || (cell.end.min(e) as isize - cell.start.max(s) as isize) <= 0
                })
            })
    }

    /// Assign body cells to header columns; several cells may share one column
    fn assign(&self, cells: &[Cell]) -> Vec<String> {
        let mut assigned = vec![String::new(); self.spans.len()];
        if cells.len() == self.spans.len() {
            for (slot, cell) in assigned.iter_mut().zip(cells) {
                *slot = cell.text.clone();
            }
            return assigned;
        }
        for cell in cells {
            let slot = &mut assigned[self.column_for(cell)];
            if !slot.is_empty() {
                slot.push(' ');
            }
            slot.push_str(&cell.text);
        }
        assigned
    }
}

fn get(cells: &[String], index: Option<usize>) -> String {
    index
        .and_then(|i| cells.get(i))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn amount_from(cells: &[String], amount: Option<AmountColumns>) -> (String, bool) {
    match amount {
        Some(AmountColumns::Single(i)) => (get(cells, Some(i)), false),
        Some(AmountColumns::Split { debit, credit }) => {
            let debit_text = get(cells, debit);
            if !debit_text.is_empty() {
                return (debit_text, false);
            }
            let credit_text = get(cells, credit);
            let is_credit = !credit_text.is_empty();
            (credit_text, is_credit)
        }
        None => (String::new(), false),
    }
}

/// Table extraction over PDF page text
#[derive(Debug, Clone, Copy, Default)]
pub struct TableExtractor;

impl TableExtractor {
    fn extract_page(&self, page_no: usize, text: &str, rows: &mut Vec<ParsedRow>) -> usize {
        let mut header: Option<TableHeader> = None;
        let mut page_rows: Vec<ParsedRow> = Vec::new();
        let mut filtered = 0;

        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(found) = TableHeader::detect(line) {
                debug!("Table header on page {} line {}", page_no, idx + 1);
                header = Some(found);
                continue;
            }
            let Some(table) = header.as_ref() else {
                continue;
            };

            let raw_cells = split_cells(line);
            let cells = table.assign(&raw_cells);
            let date_text = get(&cells, table.mapping.date);
            let (amount_text, credit_column) = amount_from(&cells, table.mapping.amount);

            if !looks_like_date(&date_text) && amount_text.is_empty() {
                // Footers and other full-width text are not part of any row
                if is_summary_text(line) || !table.is_text_only(&raw_cells) {
                    debug!("Ignored non-row text on page {} line {}", page_no, idx + 1);
                    continue;
                }
                // Wrapped description text belongs to the row above
                if let Some(prev) = page_rows.last_mut() {
                    let extra = line.split_whitespace().collect::<Vec<_>>().join(" ");
                    prev.merchant_text = format!("{} {}", prev.merchant_text, extra)
                        .trim()
                        .to_string();
                }
                continue;
            }

            let merchant_text = get(&cells, table.mapping.merchant)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            let description = get(&cells, table.mapping.description);

            page_rows.push(ParsedRow {
                date_text,
                amount_text,
                credit_column,
                merchant_text,
                description_text: (!description.is_empty()).then_some(description),
                page: Some(page_no),
                line: idx + 1,
            });
        }

        for row in page_rows {
            if row.is_summary() {
                filtered += 1;
            } else {
                rows.push(row);
            }
        }
        filtered
    }
}

impl PageStrategy for TableExtractor {
    fn name(&self) -> &'static str {
        "pdf table extraction"
    }

    fn extract(&self, pages: &[String]) -> Extraction {
        let mut rows = Vec::new();
        let mut filtered = 0;
        for (i, text) in pages.iter().enumerate() {
            filtered += self.extract_page(i + 1, text, &mut rows);
        }
        Extraction::from_rows(rows, filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_rows(pages: &[&str]) -> (Vec<ParsedRow>, usize) {
        let pages: Vec<String> = pages.iter().map(|p| p.to_string()).collect();
        match TableExtractor.extract(&pages) {
            Extraction::Rows(found) => (found.rows, found.filtered),
            Extraction::NoRows => (Vec::new(), 0),
        }
    }

    #[test]
    fn test_split_cells() {
        let cells = split_cells("05/01/2024   GRAB RIDE      12.50");
        let texts: Vec<&str> = cells.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["05/01/2024", "GRAB RIDE", "12.50"]);
        assert_eq!(cells[1].start, 13);
    }

    #[test]
    fn test_looks_like_date() {
        assert!(looks_like_date("05/01/2024"));
        assert!(looks_like_date("05 Jan"));
        assert!(looks_like_date("Jan 05, 2024"));
        assert!(looks_like_date("2024-01-05"));
        assert!(!looks_like_date("GRAB"));
        assert!(!looks_like_date("12.50"));
    }

    #[test]
    fn test_simple_table() {
        let page = "\
ACME BANK CREDIT CARD STATEMENT
Date          Description                 Amount
05/01/2024    NTUC FAIRPRICE              45.20
06/01/2024    UNKNOWN ELECTRONICS STORE   1,500.00
              SUBTOTAL                    1,545.20
";
        let (rows, filtered) = table_rows(&[page]);
        assert_eq!(rows.len(), 2);
        assert_eq!(filtered, 1);
        assert_eq!(rows[0].merchant_text, "NTUC FAIRPRICE");
        assert_eq!(rows[1].amount_text, "1,500.00");
        assert_eq!(rows[1].page, Some(1));
    }

    #[test]
    fn test_wrapped_description_is_merged() {
        let page = "\
Date          Description                 Amount
05/01/2024    AMAZON MARKETPLACE          88.10
              SEATTLE WA
06/01/2024    KOPI KING                   3.20
";
        let (rows, _) = table_rows(&[page]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].merchant_text, "AMAZON MARKETPLACE SEATTLE WA");
    }

    #[test]
    fn test_footer_is_not_merged_into_last_row() {
        let page = "\
Date          Description                 Amount
05/01/2024    NTUC FAIRPRICE              45.20
06/01/2024    GRAB RIDE                   12.00
Total amount due is payable by the due date
Page 1 of 2
";
        let (rows, filtered) = table_rows(&[page]);
        let merchants: Vec<&str> = rows.iter().map(|r| r.merchant_text.as_str()).collect();
        assert_eq!(merchants, vec!["NTUC FAIRPRICE", "GRAB RIDE"]);
        assert_eq!(filtered, 0);
    }

    #[test]
    fn test_indented_summary_text_is_not_merged() {
        let page = "\
Date          Description                 Amount
05/01/2024    KOPI KING                   3.20
              Previous balance carried
";
        let (rows, _) = table_rows(&[page]);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].merchant_text, "KOPI KING");
    }

    #[test]
    fn test_missing_cell_assigned_by_position() {
        let page = "\
Date          Description          Withdrawal     Deposit       Balance
05/01/2024    GRAB RIDE            12.50                        987.50
06/01/2024    SALARY                              3,000.00      3,987.50
";
        let (rows, _) = table_rows(&[page]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].amount_text, "12.50");
        assert!(!rows[0].credit_column);
        assert_eq!(rows[1].amount_text, "3,000.00");
        assert!(rows[1].credit_column);
    }

    #[test]
    fn test_tables_on_multiple_pages() {
        let page1 = "Date   Description   Amount\n05/01/2024   SHOP ONE   1.00\n";
        let page2 = "Date   Description   Amount\n07/01/2024   SHOP TWO   2.00\n";
        let (rows, _) = table_rows(&[page1, page2]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].page, Some(2));
    }

    #[test]
    fn test_no_table_is_no_rows() {
        let page = "05/01/2024 NTUC FAIRPRICE 45.20\n06/01/2024 GRAB 12.00\n";
        let (rows, _) = table_rows(&[page]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_only_summary_rows_is_no_rows() {
        let page = "Date   Description   Amount\n       TOTAL         45.20\n";
        let (rows, _) = table_rows(&[page]);
        assert!(rows.is_empty());
    }

    #[test]
    fn test_load_pages_rejects_non_pdf() {
        assert!(matches!(
            load_pages(b"", Duration::from_secs(1)),
            Err(Error::UnreadableDocument(_))
        ));
        assert!(matches!(
            load_pages(b"date,amount\n", Duration::from_secs(1)),
            Err(Error::UnreadableDocument(_))
        ));
    }

    #[test]
    fn test_load_pages_corrupt_pdf() {
        let result = load_pages(b"%PDF-1.4\n garbage without objects", Duration::from_secs(10));
        assert!(matches!(
            result,
            Err(Error::UnreadableDocument(_)) | Err(Error::ExtractionTimeout(_))
        ));
    }
}
