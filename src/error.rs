use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("query failed: {message}")]
    Query { message: String },

    #[error("query did not reach a terminal state within {waited_secs}s")]
    QueryTimeout { waited_secs: u64 },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("another pipeline run holds the lock")]
    RunLocked,

    #[error("service error: {message}")]
    Api { message: String },
}

pub type Result<T> = std::result::Result<T, EtlError>;
