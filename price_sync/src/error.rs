//! Error types for price_sync

use crate::pricing::PricingError;
use thiserror::Error;

/// Unified error type for price_sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// Database operation failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Pricing collaborator failed
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),
    /// Card id is not part of the catalog
    #[error("Unknown card: {0}")]
    UnknownCard(String),
}

/// Result alias for price_sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
