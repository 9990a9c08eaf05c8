//! Error types for LedgerLens

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Unreadable document: {0}")]
    UnreadableDocument(String),

    #[error("Document extraction exceeded {0} seconds")]
    ExtractionTimeout(u64),

    #[error("No transactions could be extracted: {0}")]
    NoExtractableRows(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// Data-quality failures that fail the import job instead of propagating
    pub fn is_document_failure(&self) -> bool {
        matches!(
            self,
            Error::UnreadableDocument(_)
                | Error::ExtractionTimeout(_)
                | Error::NoExtractableRows(_)
                | Error::Csv(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
