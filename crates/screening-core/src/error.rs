use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScreenError {
    #[error("Insufficient data for {ticker}: missing {}", fields.join(", "))]
    InsufficientData { ticker: String, fields: Vec<String> },

    #[error("Division by zero: {field} denominator is not positive")]
    DivisionByZero { field: String },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Superseded by a later record for {0}")]
    Superseded(String),

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Empty batch: no financial records to screen")]
    EmptyBatch,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ScreenError {
    pub fn insufficient(ticker: &str, fields: &[&str]) -> Self {
        ScreenError::InsufficientData {
            ticker: ticker.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }
}
