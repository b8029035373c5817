//! Error types for transcript building, splice site derivation and table persistence.

use std::path::Path;

use thiserror::Error;

use crate::annotation::io::ParseError;

/// The annotation table does not have the shape or content the pipeline relies on.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("missing required column '{column}'")]
    MissingColumn { column: String },

    #[error("column '{column}' has type {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: String,
    },

    #[error("column '{column}' is null at row {row}")]
    NullValue { column: String, row: usize },

    #[error("column '{column}' at row {row}: coordinate {value} does not fit in u32")]
    CoordinateRange {
        column: String,
        row: usize,
        value: i64,
    },

    #[error("column 'Frame' at row {row}: {value} is not a reading frame (0, 1 or 2)")]
    InvalidFrame { row: usize, value: i64 },

    #[error("column '{column}' at row {row}: unknown strand '{value}'")]
    InvalidStrand {
        column: String,
        row: usize,
        value: String,
    },

    #[error("row {row} on {chromosome}: start {start} is not before end {end}")]
    InvalidInterval {
        row: usize,
        chromosome: String,
        start: u32,
        end: u32,
    },

    #[error("row {row} has {found} extra attribute values, table declares {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    /// Rows of one transcript disagree, or its exons cannot yield valid introns.
    #[error("malformed transcript '{transcript_id}': {reason}")]
    MalformedGroup {
        transcript_id: String,
        reason: String,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("unsupported table format for '{path}' (expected .feather, .arrow or .parquet)")]
    UnsupportedFormat { path: String },
}

impl Error {
    /// Wrap an I/O error so the message names the file involved.
    pub(crate) fn io_at(path: &Path, e: std::io::Error) -> Self {
        Error::Io(std::io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
