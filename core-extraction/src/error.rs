use thiserror::Error;

/// Construction errors. Extraction itself never fails with an error: a
/// backend that cannot deliver is skipped and an exhausted chain yields `None`.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("No extraction backends configured")]
    NoBackends,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bridge error: {0}")]
    Bridge(#[from] bridge_traits::error::BridgeError),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
