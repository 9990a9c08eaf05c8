//! ParsedRow -> typed transaction fields
//!
//! Sign convention: debits (spending) are positive, credits (refunds,
//! payments, deposits) are negative. Both CSV and PDF rows go through here,
//! so the convention holds for every imported transaction.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate, NaiveTime};
use regex::Regex;

use super::ParsedRow;
use crate::models::RowSkipReason;

/// Accepted date formats, tried in order; the first successful parse wins
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d-%b-%Y",
    "%d %b, %Y",
    "%b %d, %Y",
    "%b %d %Y",
    "%Y/%m/%d",
    "%d/%m/%y",
    "%d-%m-%y",
    "%d.%m.%y",
    "%d %b %y",
    "%d-%b-%y",
    "%m/%d/%Y",
];

/// Formats without a year; the reference year is appended before parsing
pub const YEARLESS_FORMATS: &[&str] = &["%d %b", "%d-%b", "%b %d", "%d/%m", "%d-%m", "%d.%m"];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M%p"];

/// Four-digit years below this are a `%Y` misread of a two-digit year
const MIN_YEAR: i32 = 1900;

fn time_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(.+?)[ T](\d{1,2}:\d{2}(?::\d{2})?(?:\s?[AaPp][Mm])?)$")
            .expect("time regex")
    })
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").expect("year regex"))
}

fn currency_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:[A-Z]{3}\s*|[A-Z]{1,2}\$\s*|[$€£¥₹]\s*)").expect("currency regex")
    })
}

fn currency_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*(?:[A-Z]{3}|[$€£¥₹])$").expect("currency regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+(?:\.\d+)?|\.\d+)$").expect("number regex"))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    let upper = s.to_uppercase();
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(&upper, fmt).ok())
}

fn parse_date_only(s: &str, reference_year: i32) -> Option<NaiveDate> {
    let s = s.trim_end_matches(|c: char| c == ',' || c == '.');

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            if date.year() >= MIN_YEAR {
                return Some(date);
            }
        }
    }

    let with_year = format!("{} {}", s, reference_year);
    YEARLESS_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(&with_year, &format!("{} %Y", fmt)).ok()
    })
}

/// Parse date text (with an optional trailing time)
///
/// Yearless dates such as `05 Jan` take `reference_year`.
pub fn parse_date(text: &str, reference_year: i32) -> Option<(NaiveDate, Option<NaiveTime>)> {
    let text = collapse_whitespace(text);
    if text.is_empty() {
        return None;
    }

    if let Some(date) = parse_date_only(&text, reference_year) {
        return Some((date, None));
    }

    let caps = time_suffix_re().captures(&text)?;
    let date = parse_date_only(caps.get(1)?.as_str().trim(), reference_year)?;
    let time = parse_time(caps.get(2)?.as_str())?;
    Some((date, Some(time)))
}

/// Parse amount text into a signed, two-place amount
///
/// Parentheses, a leading or trailing minus, and a `CR` suffix mark a credit;
/// `DR` marks a debit. `credit_column` forces a credit regardless of text.
/// Digit runs too large for an `f64` are rejected.
pub fn parse_amount(text: &str, credit_column: bool) -> Option<f64> {
    let upper = text.trim().to_uppercase();
    let mut s = upper.as_str();
    let mut negative = false;

    if let Some(rest) = s.strip_suffix("CR") {
        negative = true;
        s = rest.trim_end();
    } else if let Some(rest) = s.strip_suffix("DR") {
        s = rest.trim_end();
    }

    if let Some(inner) = s.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
        negative = true;
        s = inner.trim();
    }

    // Sign may sit on either side of the currency marker: -$12.00, $-12.00, 12.00-
    let mut cleaned = s.to_string();
    for _ in 0..2 {
        let trimmed = cleaned.trim();
        let next = if let Some(rest) = trimmed.strip_prefix('-') {
            negative = true;
            rest.to_string()
        } else if let Some(rest) = trimmed.strip_prefix('+') {
            rest.to_string()
        } else {
            currency_prefix_re().replace(trimmed, "").into_owned()
        };
        cleaned = next;
    }
    cleaned = currency_suffix_re().replace(cleaned.trim(), "").into_owned();
    if let Some(rest) = cleaned.trim().strip_suffix('-') {
        negative = true;
        cleaned = rest.to_string();
    }

    let digits: String = cleaned.chars().filter(|c| !matches!(c, ',' | ' ')).collect();
    if !number_re().is_match(&digits) {
        return None;
    }

    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let rounded = (value * 100.0).round() / 100.0;
    Some(if negative || credit_column {
        -rounded
    } else {
        rounded
    })
}

/// Trim and collapse merchant whitespace
pub fn clean_merchant(text: &str) -> String {
    collapse_whitespace(text)
}

/// First plausible statement year in a period label like "Jan 2024" or "2024-01"
pub fn year_from_period(period: &str) -> Option<i32> {
    year_re()
        .find(period)
        .and_then(|m| m.as_str().parse().ok())
}

/// Canonical fields of one row
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
    pub amount: f64,
    pub merchant: String,
    pub description: Option<String>,
}

/// Normalizes rows for one import
#[derive(Debug, Clone)]
pub struct RowNormalizer {
    reference_year: i32,
}

impl RowNormalizer {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    /// Reference year from the statement period label, else `fallback_year`
    pub fn for_period(statement_period: Option<&str>, fallback_year: i32) -> Self {
        Self::new(
            statement_period
                .and_then(year_from_period)
                .unwrap_or(fallback_year),
        )
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn normalize(&self, row: &ParsedRow) -> Result<NormalizedRow, RowSkipReason> {
        let (date, time) =
            parse_date(&row.date_text, self.reference_year).ok_or(RowSkipReason::InvalidDate)?;
        let amount =
            parse_amount(&row.amount_text, row.credit_column).ok_or(RowSkipReason::InvalidAmount)?;

        let description = row
            .description_text
            .as_deref()
            .map(collapse_whitespace)
            .filter(|d| !d.is_empty());
        let merchant = clean_merchant(&row.merchant_text);

        let (merchant, description) = if merchant.is_empty() {
            match description {
                Some(desc) => (desc, None),
                None => return Err(RowSkipReason::MissingMerchant),
            }
        } else {
            (merchant, description)
        };

        Ok(NormalizedRow {
            date,
            time,
            amount,
            merchant,
            description,
        })
    }
}
