//! Error types and handling for the pdfveil library

use std::io;
use thiserror::Error;

/// Custom result type for redaction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for redaction operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Rewrite session already open")]
    SessionAlreadyOpen,

    #[error("Rewrite session not open")]
    SessionNotOpen,

    #[error("Tokenizer is closed")]
    TokenizerClosed,

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for caller mistakes that are reported synchronously and never retried.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::InvalidArgument(_)
                | Error::Config(_)
                | Error::SessionAlreadyOpen
                | Error::SessionNotOpen
                | Error::TokenizerClosed
        )
    }
}
