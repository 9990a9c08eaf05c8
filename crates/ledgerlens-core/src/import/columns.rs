//! Header-based column role classification
//!
//! Maps a row of header strings to the semantic roles a statement row needs
//! (date, amount, merchant, description). Roles that cannot be assigned
//! confidently come back as `None` rather than guessed.
//!
//! Keyword lists are ordered by preference: earlier entries win ties between
//! columns with the same match quality.

/// Bumped whenever a keyword list changes, so stored mappings can be compared
pub const KEYWORDS_VERSION: u32 = 1;

pub const DATE_KEYWORDS: &[&str] = &[
    "transaction date",
    "date of transaction",
    "date of trans",
    "trans date",
    "txn date",
    "posting date",
    "post date",
    "value date",
    "date",
];

pub const AMOUNT_KEYWORDS: &[&str] = &[
    "amount (sgd)",
    "amount(sgd)",
    "transaction amount",
    "amount",
];

pub const DEBIT_KEYWORDS: &[&str] = &["debit", "withdrawal", "money out"];

pub const CREDIT_KEYWORDS: &[&str] = &["credit", "deposit", "money in"];

pub const MERCHANT_KEYWORDS: &[&str] = &["merchant", "payee", "merchant name"];

pub const DESCRIPTION_KEYWORDS: &[&str] = &[
    "description",
    "particulars",
    "transaction details",
    "details",
    "narrative",
    "memo",
];

/// Headers that look numeric but never hold the transaction amount
pub const NON_AMOUNT_KEYWORDS: &[&str] = &["balance", "limit", "reward", "points"];

/// Where a row's amount comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountColumns {
    /// One signed amount column
    Single(usize),
    /// Separate debit and credit columns (at least one present)
    Split {
        debit: Option<usize>,
        credit: Option<usize>,
    },
}

impl AmountColumns {
    fn claims(&self, index: usize) -> bool {
        match *self {
            Self::Single(i) => i == index,
            Self::Split { debit, credit } => debit == Some(index) || credit == Some(index),
        }
    }
}

/// Role-to-index mapping for one header row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnMapping {
    pub date: Option<usize>,
    pub amount: Option<AmountColumns>,
    pub merchant: Option<usize>,
    pub description: Option<usize>,
}

impl ColumnMapping {
    /// Enough roles resolved to read transactions: date, amount, and some text
    pub fn is_usable(&self) -> bool {
        self.date.is_some()
            && self.amount.is_some()
            && (self.merchant.is_some() || self.description.is_some())
    }

    fn claims(&self, index: usize) -> bool {
        self.date == Some(index)
            || self.merchant == Some(index)
            || self.description == Some(index)
            || self.amount.is_some_and(|a| a.claims(index))
    }
}

/// Match strength between a header and one keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum MatchQuality {
    Contains = 1,
    Affix = 2,
    Exact = 3,
}

/// Score = (quality, keyword preference); higher is better
type Score = (MatchQuality, usize);

/// Lowercase, trim, collapse whitespace and drop decorative punctuation
pub fn normalize_header(header: &str) -> String {
    let lowered = header.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c == ':' || c == '*' || c == '.' || c == '#')
        .trim()
        .to_string()
}

fn keyword_score(header: &str, keywords: &[&str]) -> Option<Score> {
    keywords
        .iter()
        .enumerate()
        .filter_map(|(i, kw)| {
            let quality = if header == *kw {
                MatchQuality::Exact
            } else if header.starts_with(kw) || header.ends_with(kw) {
                MatchQuality::Affix
            } else if header.contains(kw) {
                MatchQuality::Contains
            } else {
                return None;
            };
            Some((quality, keywords.len() - i))
        })
        .max()
}

/// Best-scoring column for a keyword set; `None` when absent or tied
fn best_column(
    headers: &[String],
    keywords: &[&str],
    skip: impl Fn(usize) -> bool,
) -> Option<usize> {
    let mut scored: Vec<(Score, usize)> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| !skip(*i))
        .filter_map(|(i, h)| keyword_score(h, keywords).map(|s| (s, i)))
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    match scored.as_slice() {
        [] => None,
        [(_, only)] => Some(*only),
        [(best, idx), (second, _), ..] if best > second => Some(*idx),
        _ => None,
    }
}

fn is_non_amount(header: &str) -> bool {
    NON_AMOUNT_KEYWORDS.iter().any(|kw| header.contains(kw))
}

fn is_debit_or_credit(header: &str) -> bool {
    keyword_score(header, DEBIT_KEYWORDS).is_some()
        || keyword_score(header, CREDIT_KEYWORDS).is_some()
}

fn resolve_amount(headers: &[String]) -> Option<AmountColumns> {
    // Explicit "amount" labels beat debit/credit splits. A header such as
    // "Debit Amount" belongs to the split, not the single column.
    let single = best_column(headers, AMOUNT_KEYWORDS, |i| {
        is_non_amount(&headers[i]) || is_debit_or_credit(&headers[i])
    });
    if let Some(idx) = single {
        return Some(AmountColumns::Single(idx));
    }

    let debit = best_column(headers, DEBIT_KEYWORDS, |i| is_non_amount(&headers[i]));
    let credit = best_column(headers, CREDIT_KEYWORDS, |i| {
        is_non_amount(&headers[i]) || Some(i) == debit
    });
    match (debit, credit) {
        (None, None) => None,
        _ => Some(AmountColumns::Split { debit, credit }),
    }
}

/// Classify a header row into a role mapping
pub fn classify(headers: &[impl AsRef<str>]) -> ColumnMapping {
    let headers: Vec<String> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();

    let mut mapping = ColumnMapping {
        amount: resolve_amount(&headers),
        ..ColumnMapping::default()
    };

    mapping.date = best_column(&headers, DATE_KEYWORDS, |i| mapping.claims(i));

    // Merchant must never land on a column already claimed as date or amount
    mapping.merchant = best_column(&headers, MERCHANT_KEYWORDS, |i| mapping.claims(i));
    if mapping.merchant.is_none() {
        mapping.merchant = best_column(&headers, DESCRIPTION_KEYWORDS, |i| mapping.claims(i));
    } else {
        mapping.description =
            best_column(&headers, DESCRIPTION_KEYWORDS, |i| mapping.claims(i));
    }

    mapping
}

/// Whether a cell reads as a money amount
pub fn looks_numeric(cell: &str) -> bool {
    let cleaned: String = cell
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_alphabetic())
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '(' | ')' | '$' | '-' | '+'))
        .collect();
    !cleaned.is_empty()
        && cleaned.contains('.')
        && cleaned.chars().all(|c| c.is_ascii_digit() || c == '.')
        && cleaned.matches('.').count() == 1
}

/// Classify headers, then fill an unresolved amount from sample rows
///
/// Only consulted when no header carries an amount label: the rightmost
/// unclaimed column whose non-empty samples are all numeric becomes the amount.
pub fn classify_with_samples(headers: &[impl AsRef<str>], samples: &[Vec<String>]) -> ColumnMapping {
    let mut mapping = classify(headers);
    if mapping.amount.is_some() || samples.is_empty() {
        return mapping;
    }

    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h.as_ref())).collect();
    let candidate = (0..headers.len()).rev().find(|&i| {
        if mapping.claims(i) || is_non_amount(&normalized[i]) {
            return false;
        }
        let mut cells = samples
            .iter()
            .filter_map(|row| row.get(i))
            .filter(|c| !c.trim().is_empty())
            .peekable();
        cells.peek().is_some() && cells.all(|c| looks_numeric(c))
    });

    if let Some(idx) = candidate {
        mapping.amount = Some(AmountColumns::Single(idx));
    }
    mapping
}
