//! Inverted-index card matcher with a full-scan fallback
//!
//! The index maps normalized word tokens to catalog positions. It only
//! narrows the search: whenever the best index candidate scores below
//! [`FULL_SCAN_THRESHOLD`] the whole catalog is scored instead, so a weak
//! or missing index hit can never hide a better card.

use crate::text_parser::ParsedMetadata;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tcg_common::{normalize_collector_number, Card, Catalog};

/// Best index score below which the full catalog is rescored
pub const FULL_SCAN_THRESHOLD: u32 = 500;
pub const DEFAULT_RESULT_LIMIT: usize = 50;

const EXACT_NAME_WEIGHT: u32 = 1000;
const PARTIAL_NAME_WEIGHT: u32 = 400;
const NUMBER_WEIGHT: u32 = 300;
const SET_CODE_WEIGHT: u32 = 250;
const RARITY_BONUS: u32 = 25;
const HP_BONUS: u32 = 25;

/// Card attribute that contributed to a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedField {
    ExactName,
    PartialName,
    Number,
    SetCode,
    Rarity,
    Hp,
}

/// One scored catalog card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateScore {
    /// Position in the catalog, also the tie-breaker
    pub position: usize,
    pub card_id: String,
    pub score: u32,
    pub matched: Vec<MatchedField>,
}

/// Ranked candidates plus how they were found
#[derive(Debug, Clone, Default, Serialize)]
pub struct MatchOutcome {
    /// Sorted by score descending, ties by catalog position
    pub candidates: Vec<CandidateScore>,
    pub used_full_scan: bool,
    /// Best score the index path produced, if it ran at all
    pub index_best_score: Option<u32>,
}

impl MatchOutcome {
    pub fn best(&self) -> Option<&CandidateScore> {
        self.candidates.first()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Immutable word index over a shared catalog
#[derive(Debug)]
pub struct CardIndex {
    catalog: Arc<Catalog>,
    postings: HashMap<String, Vec<usize>>,
    result_limit: usize,
}

impl CardIndex {
    /// Index every card's name, set code, set name and number
    pub fn build(catalog: Arc<Catalog>) -> Self {
        let mut postings: HashMap<String, Vec<usize>> = HashMap::new();
        for (position, card) in catalog.iter().enumerate() {
            for token in card_tokens(card) {
                postings.entry(token).or_default().push(position);
            }
        }
        log::info!(
            "Built card index: {} cards, {} distinct tokens",
            catalog.len(),
            postings.len()
        );
        Self {
            catalog,
            postings,
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }

    pub fn with_result_limit(mut self, limit: usize) -> Self {
        self.result_limit = limit.max(1);
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn token_count(&self) -> usize {
        self.postings.len()
    }

    /// Catalog positions indexed under a token
    pub fn postings(&self, token: &str) -> &[usize] {
        self.postings.get(token).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rank catalog cards against parsed metadata.
    ///
    /// `set_filter` restricts scoring to one set code on both the index and
    /// the full-scan path.
    pub fn match_metadata(
        &self,
        metadata: &ParsedMetadata,
        set_filter: Option<&str>,
    ) -> MatchOutcome {
        if self.catalog.is_empty() {
            return MatchOutcome::default();
        }

        let query = Query::new(metadata);
        let eligible = |card: &Card| {
            card.game == metadata.game
                && set_filter.map_or(true, |set| card.set_code.eq_ignore_ascii_case(set.trim()))
        };

        let mut index_best_score = None;
        if !query.tokens.is_empty() {
            let positions: BTreeSet<usize> = query
                .tokens
                .iter()
                .flat_map(|token| self.postings(token).iter().copied())
                .collect();

            let candidates = self.score_positions(&query, positions.into_iter(), &eligible);
            let best = candidates.first().map_or(0, |c| c.score);
            index_best_score = Some(best);

            if best >= FULL_SCAN_THRESHOLD {
                log::debug!("Index hit for {:?}: best score {}", metadata.name, best);
                return MatchOutcome {
                    candidates: self.truncate(candidates),
                    used_full_scan: false,
                    index_best_score,
                };
            }
            log::debug!(
                "Index best score {} below {} for {:?}, falling back to full scan",
                best,
                FULL_SCAN_THRESHOLD,
                metadata.name
            );
        } else {
            log::debug!("No usable query tokens, scanning full catalog");
        }

        let candidates = self.score_positions(&query, 0..self.catalog.len(), &eligible);
        MatchOutcome {
            candidates: self.truncate(candidates),
            used_full_scan: true,
            index_best_score,
        }
    }

    fn score_positions<I, F>(
        &self,
        query: &Query,
        positions: I,
        eligible: &F,
    ) -> Vec<CandidateScore>
    where
        I: Iterator<Item = usize>,
        F: Fn(&Card) -> bool,
    {
        let mut scored: Vec<CandidateScore> = positions
            .filter_map(|position| {
                let card = self.catalog.at(position)?;
                if !eligible(card) {
                    return None;
                }
                let (score, matched) = score_card(query, card);
                (score > 0).then(|| CandidateScore {
                    position,
                    card_id: card.id.clone(),
                    score,
                    matched,
                })
            })
            .collect();
        scored.sort_by_key(|c| (Reverse(c.score), c.position));
        scored
    }

    fn truncate(&self, mut candidates: Vec<CandidateScore>) -> Vec<CandidateScore> {
        candidates.truncate(self.result_limit);
        candidates
    }
}

// ── Scoring ─────────────────────────────────────────────────────────────

/// Query fields normalized once per match
struct Query {
    tokens: HashSet<String>,
    name_tokens: Vec<String>,
    number: String,
    set_code: String,
    rarity: String,
    hp: String,
}

impl Query {
    fn new(metadata: &ParsedMetadata) -> Self {
        let name_tokens = tokenize(&metadata.name);
        let tokens = name_tokens
            .iter()
            .cloned()
            .chain(tokenize(&metadata.set_code))
            .chain(tokenize(&metadata.set_name))
            .chain(tokenize(&metadata.number))
            .collect();
        Self {
            tokens,
            name_tokens,
            number: metadata.normalized_number(),
            set_code: metadata.set_code.trim().to_lowercase(),
            rarity: metadata.rarity.trim().to_lowercase(),
            hp: metadata.hp.trim().to_string(),
        }
    }
}

/// Pure scoring function; higher is better, zero means unrelated
fn score_card(query: &Query, card: &Card) -> (u32, Vec<MatchedField>) {
    let mut score = 0;
    let mut matched = Vec::new();

    if !query.name_tokens.is_empty() {
        let card_name = tokenize(&card.name);
        if card_name == query.name_tokens {
            score += EXACT_NAME_WEIGHT;
            matched.push(MatchedField::ExactName);
        } else {
            let overlap = query
                .name_tokens
                .iter()
                .filter(|t| card_name.contains(*t))
                .count() as u32;
            if overlap > 0 {
                let denom = query.name_tokens.len().max(card_name.len()) as u32;
                score += PARTIAL_NAME_WEIGHT * overlap / denom;
                matched.push(MatchedField::PartialName);
            }
        }
    }

    if !query.number.is_empty() && normalize_collector_number(&card.number) == query.number {
        score += NUMBER_WEIGHT;
        matched.push(MatchedField::Number);
    }

    if !query.set_code.is_empty() && card.set_code.eq_ignore_ascii_case(&query.set_code) {
        score += SET_CODE_WEIGHT;
        matched.push(MatchedField::SetCode);
    }

    if !query.rarity.is_empty() && card.rarity.trim().eq_ignore_ascii_case(&query.rarity) {
        score += RARITY_BONUS;
        matched.push(MatchedField::Rarity);
    }

    if !query.hp.is_empty() && card.hp.as_deref().map(str::trim) == Some(query.hp.as_str()) {
        score += HP_BONUS;
        matched.push(MatchedField::Hp);
    }

    (score, matched)
}

// ── Tokenization ────────────────────────────────────────────────────────

/// Lowercase alphanumeric words; apostrophes are dropped so "Farfetch’d"
/// and "Farfetch'd" agree, and numeric words lose leading zeros.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(&['\'', '’', '‘'][..], "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| {
            if word.chars().all(|c| c.is_ascii_digit()) {
                normalize_collector_number(word)
            } else {
                word.to_string()
            }
        })
        .collect()
}

fn card_tokens(card: &Card) -> HashSet<String> {
    [&card.name, &card.set_code, &card.set_name, &card.number]
        .into_iter()
        .flat_map(|field| tokenize(field))
        .collect()
}

#[cfg(test)]
#[path = "card_index_tests.rs"]
mod tests;
