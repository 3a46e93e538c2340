use std::path::PathBuf;

use thiserror::Error;

use crate::eeio::tools::units::UnitError;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur while the
/// tool loads, transforms, or reports on an input-output database.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON parsing or serialization fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::XlsxError),

    /// Raised when a sheet does not follow the expected conventions.
    #[error("invalid workbook structure: {0}")]
    InvalidWorkbook(String),

    /// Raised when the project paths file lacks a dataset entry.
    #[error("project paths do not define dataset '{0}'")]
    MissingDataset(String),

    /// Raised when a label does not exist in the table classification.
    #[error("unknown {kind} '{label}'")]
    UnknownLabel { kind: String, label: String },

    /// Raised when an aggregation workbook leaves a label without a group.
    #[error("{level} '{label}' has no aggregation group")]
    Unmapped { level: String, label: String },

    /// Raised when a scenario name is not present in the database.
    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    /// Raised when the Leontief matrix of a scenario cannot be inverted.
    #[error("Leontief matrix is singular for scenario '{0}'")]
    Singular(String),

    /// Raised when a positional selection falls outside the selected data.
    #[error("index {index} out of range for {len} values")]
    IndexOutOfRange { index: usize, len: usize },

    /// Raised when a unit expression cannot be parsed or converted.
    #[error("unit error: {0}")]
    Unit(#[from] UnitError),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when a chart is written to a directory that does not exist.
    #[error("output directory not found: {0}")]
    MissingOutputDirectory(PathBuf),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}
