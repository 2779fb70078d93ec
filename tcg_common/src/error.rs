//! Error types shared by the card identification and price sync crates

use thiserror::Error;

/// Errors raised while loading or building the card catalog
#[derive(Debug, Error)]
pub enum CommonError {
    /// Catalog file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Catalog file is not valid JSON
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Two catalog entries share the same card id
    #[error("Duplicate card id in catalog: {0}")]
    DuplicateCard(String),
}

/// Result alias for catalog operations
pub type CommonResult<T> = std::result::Result<T, CommonError>;
