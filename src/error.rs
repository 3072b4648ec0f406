use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaultForgeError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Data Validation Error: {0}")]
    Validation(String),

    #[error("Parse Error: {0}")]
    Parse(String),

    #[error("Unsupported State: {0}")]
    UnsupportedState(String),

    #[error("Numerical Error: {0}")]
    Numerical(String),
}

pub type FfResult<T> = Result<T, FaultForgeError>;
