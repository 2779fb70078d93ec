//! Shared types for trading card identification and pricing
//!
//! Holds the card catalog, the price-row model and the condition / printing /
//! language vocabularies used by both `card_identify` and `price_sync`.

pub mod catalog;
pub mod error;
pub mod models;

pub use catalog::Catalog;
pub use error::{CommonError, CommonResult};
pub use models::{
    normalize_collector_number, Card, Condition, Game, Language, PriceRow, Printing,
};
