//! Immutable in-memory card catalog
//!
//! Loaded once at startup and shared by reference afterwards. Positions in
//! the catalog are stable and double as the tie-breaker for match ordering.

use crate::error::{CommonError, CommonResult};
use crate::models::{Card, Game};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// All known cards, addressable by position and by id
#[derive(Debug, Default)]
pub struct Catalog {
    cards: Vec<Card>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    /// Build a catalog from card records, rejecting duplicate ids
    pub fn from_cards(cards: Vec<Card>) -> CommonResult<Self> {
        let mut by_id = HashMap::with_capacity(cards.len());
        for (pos, card) in cards.iter().enumerate() {
            if by_id.insert(card.id.clone(), pos).is_some() {
                return Err(CommonError::DuplicateCard(card.id.clone()));
            }
        }
        Ok(Self { cards, by_id })
    }

    /// Load catalog from a JSON file containing an array of cards
    pub fn load_json<P: AsRef<Path>>(path: P) -> CommonResult<Self> {
        let path = path.as_ref();
        log::info!("Loading card catalog from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let cards: Vec<Card> = serde_json::from_str(&content)?;
        let catalog = Self::from_cards(cards)?;

        log::info!(
            "Loaded {} cards ({} sets)",
            catalog.len(),
            catalog.set_codes(None).len()
        );
        Ok(catalog)
    }

    /// Look up a card by id
    pub fn get(&self, card_id: &str) -> Option<&Card> {
        self.by_id.get(card_id).map(|&pos| &self.cards[pos])
    }

    /// Card at a catalog position
    pub fn at(&self, position: usize) -> Option<&Card> {
        self.cards.get(position)
    }

    /// Catalog position of a card id
    pub fn position(&self, card_id: &str) -> Option<usize> {
        self.by_id.get(card_id).copied()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Iterate over all cards in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.iter()
    }

    /// Distinct lowercase set codes, optionally restricted to one game
    pub fn set_codes(&self, game: Option<Game>) -> BTreeSet<String> {
        self.cards
            .iter()
            .filter(|c| game.map_or(true, |g| c.game == g))
            .filter(|c| !c.set_code.is_empty())
            .map(|c| c.set_code.to_lowercase())
            .collect()
    }
}
