use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnnotatorError {
    #[error("Ticker lookup failed for {ticker}: {reason}")]
    TickerLookup { ticker: String, reason: String },

    #[error("Metrics lookup failed for firm {firm_id}: {reason}")]
    MetricsLookup { firm_id: String, reason: String },

    #[error("Conversational model error: {0}")]
    Model(String),

    #[error("No user input and no local commands")]
    EmptyInput,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid configuration value for {key}: {details}")]
    Config { key: String, details: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AnnotatorError>;
