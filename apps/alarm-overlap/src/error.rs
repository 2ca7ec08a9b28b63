use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where a timestamp or number failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseScope {
    /// Spreadsheet row number (header is row 1).
    Row(usize),
    /// Every data row of the table failed.
    Global,
}

impl fmt::Display for ParseScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseScope::Row(row) => write!(f, "row {row}"),
            ParseScope::Global => write!(f, "all rows"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{table} is missing required column(s): {}", .missing_columns.join(", "))]
    Schema {
        table: String,
        missing_columns: Vec<String>,
    },
    #[error("{table}: {scope} could not be parsed: {message}")]
    Parse {
        table: String,
        scope: ParseScope,
        message: String,
    },
    #[error("{table} has no data rows")]
    EmptyInput { table: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("unsupported file format: {0}")]
    Format(String),
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),
    #[error("xlsx export error: {0}")]
    XlsxExport(#[from] rust_xlsxwriter::XlsxError),
    #[error("json export error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for problems with the uploaded data rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            EngineError::Schema { .. } | EngineError::Parse { .. } | EngineError::EmptyInput { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
