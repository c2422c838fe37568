use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("instrument not found: {0}")]
    NotFound(String),
    #[error("engine is not running")]
    NotRunning,
    #[error("invalid instrument {id}: {reason}")]
    InvalidInstrument { id: String, reason: String },
    #[error("duplicate instrument id: {0}")]
    DuplicateInstrument(String),
    #[error("catalog error: {0}")]
    Catalog(String),
    #[error("invalid config value for {key}: {value}")]
    Config { key: String, value: String },
}
