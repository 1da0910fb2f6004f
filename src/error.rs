use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuncastError {
    #[error("Row {row}: malformed {field} timestamp '{value}': {source}")]
    Parse {
        row: usize,
        field: &'static str,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("Row {row}: step '{step}' has negative execution time ({seconds}s)")]
    DataQuality {
        row: usize,
        step: String,
        seconds: f64,
    },

    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Feature schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuncastError>;
