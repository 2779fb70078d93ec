//! Pricing provider seam
//!
//! The scheduler talks to the provider only through [`PricingSource`]:
//! one call to learn the provider ids of a set's cards, one call to fetch
//! current prices for a batch of known ids.

pub mod justtcg;

use async_trait::async_trait;
use std::collections::HashMap;
use tcg_common::{normalize_collector_number, Card, Game, PriceRow};
use thiserror::Error;

pub use justtcg::JustTcgClient;

/// Errors returned by a pricing source
#[derive(Debug, Error)]
pub enum PricingError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Unexpected HTTP status: {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error("Failed to parse provider response: {0}")]
    Parse(#[from] serde_json::Error),
    /// The provider refused the call because the request quota is spent
    #[error("Provider request quota exceeded")]
    QuotaExceeded,
    #[error("Provider error: {0}")]
    Api(String),
    #[error("Temporary failure: {0}")]
    Transient(String),
}

impl PricingError {
    pub fn is_quota(&self) -> bool {
        matches!(self, PricingError::QuotaExceeded)
    }
}

/// Cards sharing a group key, looked up with a single discovery call
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryGroup {
    pub key: String,
    pub game: Game,
    pub set_code: String,
    pub set_name: String,
}

impl DiscoveryGroup {
    pub fn for_card(card: &Card) -> Self {
        Self {
            key: card.group_key().to_string(),
            game: card.game,
            set_code: card.set_code.clone(),
            set_name: card.set_name.clone(),
        }
    }
}

/// Provider ids of one set, keyed by collector number and by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetDirectory {
    by_number: HashMap<String, String>,
    by_name: HashMap<String, String>,
    truncated: bool,
}

impl SetDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider card. The first entry for a number or name wins.
    pub fn insert(&mut self, number: &str, name: &str, external_id: &str) {
        if !number.trim().is_empty() {
            self.by_number
                .entry(normalize_collector_number(number))
                .or_insert_with(|| external_id.to_string());
        }
        let name = normalize_card_name(name);
        if !name.is_empty() {
            self.by_name
                .entry(name)
                .or_insert_with(|| external_id.to_string());
        }
    }

    /// Provider id for a catalog card: by collector number, then by name
    pub fn lookup(&self, card: &Card) -> Option<&str> {
        if !card.number.trim().is_empty() {
            if let Some(id) = self.by_number.get(&card.normalized_number()) {
                return Some(id);
            }
        }
        self.by_name
            .get(&normalize_card_name(&card.name))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_number.len().max(self.by_name.len())
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty() && self.by_name.is_empty()
    }

    /// Flag a listing the provider cut short. A card missing from a
    /// truncated directory may still exist in the set.
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

/// Fold a card name into the spelling shared by catalog and provider
pub fn normalize_card_name(name: &str) -> String {
    let folded = name
        .to_lowercase()
        .replace('♀', " f")
        .replace('♂', " m")
        .replace('é', "e")
        .replace('δ', " delta")
        .replace(&['\'', '’', '.'][..], "")
        .replace('-', " ")
        .replace("impostor", "imposter");
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One card to price, identified by its provider id
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLookup {
    pub card_id: String,
    pub external_id: String,
}

/// Result of a batch price call
#[derive(Debug, Clone, Default)]
pub struct BatchPrices {
    /// Rows keyed back to catalog card ids
    pub rows: Vec<PriceRow>,
    /// Daily requests left as reported by the provider
    pub daily_remaining: Option<u32>,
}

impl BatchPrices {
    pub fn rows_for<'a>(&'a self, card_id: &'a str) -> impl Iterator<Item = &'a PriceRow> + 'a {
        self.rows.iter().filter(move |r| r.card_id == card_id)
    }
}

#[async_trait]
pub trait PricingSource: Send + Sync {
    /// Map every card of a set to the provider's id
    async fn resolve_external_ids(&self, group: &DiscoveryGroup) -> Result<SetDirectory, PricingError>;

    /// Fetch current prices for cards whose provider ids are known
    async fn fetch_batch_prices(&self, lookups: &[PriceLookup]) -> Result<BatchPrices, PricingError>;
}
