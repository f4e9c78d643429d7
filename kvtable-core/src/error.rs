use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A record handed to `save` without a usable primary key.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A textual filter that could not be parsed.
    #[error("Query syntax error: {0}")]
    QuerySyntax(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns a stable error code for this error variant.
    /// These codes are stable and can be used by callers for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Io(_) => "IO_ERROR",
            Error::Corruption(_) => "CORRUPTION",
            Error::ChecksumMismatch => "CHECKSUM_MISMATCH",
            Error::InvalidArgument(_) => "INVALID_ARGUMENT",
            Error::InvalidRecord(_) => "INVALID_RECORD",
            Error::QuerySyntax(_) => "QUERY_SYNTAX",
            Error::Codec(_) => "CODEC_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns true if this error is potentially retryable.
    ///
    /// Only engine I/O failures are transient; everything else is a logical or
    /// data error that will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Io(_) => true,

            Error::Corruption(_)
            | Error::ChecksumMismatch
            | Error::InvalidArgument(_)
            | Error::InvalidRecord(_)
            | Error::QuerySyntax(_)
            | Error::Codec(_)
            | Error::Internal(_) => false,
        }
    }

    /// Adds context to an error by wrapping it in an Internal error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use kvtable_core::Error;
    ///
    /// fn write_blob() -> Result<(), Error> {
    ///     Err(Error::Io(std::io::Error::new(
    ///         std::io::ErrorKind::NotFound,
    ///         "file not found"
    ///     )))
    /// }
    ///
    /// fn rebuild() -> Result<(), Error> {
    ///     write_blob().map_err(|e| e.with_context("failed to rebuild index"))
    /// }
    /// ```
    pub fn with_context(self, context: &str) -> Error {
        Error::Internal(format!("{}: {}", context, self))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
