//! Card identification from scanned text
//!
//! [`TextParser`] turns noisy scan text into [`ParsedMetadata`];
//! [`CardIndex`] ranks catalog cards against it. Both are immutable once
//! built and can be shared freely between threads.

pub mod card_index;
pub mod set_tables;
pub mod text_parser;

pub use card_index::{
    tokenize, CandidateScore, CardIndex, MatchOutcome, MatchedField, DEFAULT_RESULT_LIMIT,
    FULL_SCAN_THRESHOLD,
};
pub use text_parser::{ParsedMetadata, TextParser, MAX_INPUT_BYTES};

use serde::Serialize;
use tcg_common::Game;

/// Parsed scan together with its ranked catalog matches
#[derive(Debug, Clone, Serialize)]
pub struct Identification {
    pub metadata: ParsedMetadata,
    pub outcome: MatchOutcome,
}

/// Build a parser that also recognizes every set code in the index's catalog
pub fn parser_for(index: &CardIndex, game: Game) -> TextParser {
    TextParser::new(game).with_known_set_codes(index.catalog().set_codes(Some(game)))
}

/// Card index paired with one parser per game.
///
/// The parsers learn the catalog's set codes once at construction, so
/// [`Identifier::identify`] only pays for parsing and the index lookup.
#[derive(Debug)]
pub struct Identifier {
    index: CardIndex,
    pokemon: TextParser,
    mtg: TextParser,
}

impl Identifier {
    pub fn new(index: CardIndex) -> Self {
        let pokemon = parser_for(&index, Game::Pokemon);
        let mtg = parser_for(&index, Game::Mtg);
        Self { index, pokemon, mtg }
    }

    pub fn index(&self) -> &CardIndex {
        &self.index
    }

    pub fn parser(&self, game: Game) -> &TextParser {
        match game {
            Game::Pokemon => &self.pokemon,
            Game::Mtg => &self.mtg,
        }
    }

    /// Parse scan text and rank catalog candidates for it
    pub fn identify(&self, text: &str, game: Game, set_filter: Option<&str>) -> Identification {
        let metadata = self.parser(game).parse(text);
        let outcome = self.index.match_metadata(&metadata, set_filter);
        log::info!(
            "Identified {:?}: {} candidate(s){}",
            metadata.name,
            outcome.candidates.len(),
            if outcome.used_full_scan { " (full scan)" } else { "" }
        );
        Identification { metadata, outcome }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tcg_common::{Card, Catalog};

    fn card(id: &str, game: Game, name: &str, set_code: &str, number: &str) -> Card {
        Card {
            id: id.to_string(),
            game,
            name: name.to_string(),
            set_code: set_code.to_string(),
            set_name: String::new(),
            number: number.to_string(),
            rarity: String::new(),
            hp: None,
            finishes: Vec::new(),
            external_id: None,
            price_usd: 0.0,
            price_foil_usd: 0.0,
        }
    }

    #[test]
    fn parsers_are_built_once_and_reused() {
        let catalog = Catalog::from_cards(vec![
            card("one-1", Game::Mtg, "Elesh Norn", "ONE", "1"),
            card("swsh4-25", Game::Pokemon, "Charizard VMAX", "swsh4", "025"),
        ])
        .unwrap();
        let identifier = Identifier::new(CardIndex::build(Arc::new(catalog)));

        let first = identifier.parser(Game::Mtg) as *const TextParser;
        identifier.identify("Elesh Norn\nONE", Game::Mtg, None);
        identifier.identify("Elesh Norn\nONE", Game::Mtg, None);
        assert!(std::ptr::eq(first, identifier.parser(Game::Mtg)));
        assert_eq!(identifier.parser(Game::Mtg).parse("Elesh Norn\nONE").set_code, "one");
    }

    #[test]
    fn index_hit_skips_full_scan() {
        let cards = (0..2_000)
            .map(|i| card(&format!("mon-{i}"), Game::Pokemon, &format!("Mon{i}"), "sv1", "1"))
            .collect();
        let identifier = Identifier::new(CardIndex::build(Arc::new(
            Catalog::from_cards(cards).unwrap(),
        )));

        let result = identifier.identify("Mon7", Game::Pokemon, None);
        assert!(!result.outcome.used_full_scan);
        assert_eq!(result.outcome.best().unwrap().card_id, "mon-7");
    }
}
