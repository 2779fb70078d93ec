//! Heuristic parser turning raw scan text into structured card attributes
//!
//! The parser never fails: anything it cannot recognize is left empty and
//! lowers the reported confidence instead.

use crate::set_tables;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tcg_common::{normalize_collector_number, Game, Language, Printing};

/// Longer inputs are truncated before any regex runs
pub const MAX_INPUT_BYTES: usize = 10_000;

const NAME_WEIGHT: f64 = 0.4;
const SET_WEIGHT: f64 = 0.3;
const NUMBER_WEIGHT: f64 = 0.3;

lazy_static! {
    static ref COLLECTOR_NUMBER: Regex =
        Regex::new(r"(?:^|\s)(\d{1,4})\s*/\s*(\d{1,3})\b").expect("valid regex");
    static ref PREFIXED_NUMBER: Regex =
        Regex::new(r"(?i)\b((?:TG|GG|SV)\d{1,3})\s*/\s*((?:TG|GG|SV)?\d{1,3})\b")
            .expect("valid regex");
    static ref POKEMON_SET_CODE: Regex = Regex::new(
        r"(?i)\b(SWSH\d{1,2}(?:PT5)?|SV\d{1,2}(?:PT5)?|XY\d{1,2}|SM\d{1,2}(?:PT5)?|BW\d{1,2}|DP\d|HGSS\d|PL\d|EX\d{1,2}|PGO|CEL25)\b"
    )
    .expect("valid regex");
    static ref PTCGO_CODE: Regex =
        Regex::new(r"\b(BS|JU|FO|B2|TR|LC|G1|G2|N1|N2|N3|N4|SI|AQ|SK)\b").expect("valid regex");
    static ref HP_VALUE: Regex = Regex::new(
        r"(?i)\b(HP|KP|PV|PS)\s*(\d{2,3})\b|\b(\d{2,3})\s*(HP|KP|PV|PS)\b"
    )
    .expect("valid regex");
    static ref FIRST_EDITION: Regex =
        Regex::new(r"(?i)\b(?:1ST\s+EDITION|EDITION\s+1)\b").expect("valid regex");
    static ref NAME_NOISE: Regex = Regex::new(
        r"(?i)\b\d{1,4}\s*/\s*\d{1,3}\b|\b(?:HP|KP|PV|PS)\s*\d{2,3}\b|\b\d{2,3}\s*(?:HP|KP|PV|PS)\b|\bSTAGE\s*[12]\b|[©®™]"
    )
    .expect("valid regex");
    static ref VARIANT_PATTERNS: Vec<(&'static str, Regex)> = set_tables::VARIANT_KEYWORDS
        .iter()
        .map(|kw| {
            let pattern = format!(r"(?i)\b{}\b", kw.replace(' ', r"\s+"));
            (*kw, Regex::new(&pattern).expect("valid regex"))
        })
        .collect();
}

/// Structured attributes extracted from one scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedMetadata {
    pub game: Game,
    pub name: String,
    /// Collector number as printed ("025", "TG17")
    pub number: String,
    pub set_total: String,
    /// Lowercase set code, empty when unresolved
    pub set_code: String,
    pub set_name: String,
    /// Every set the evidence allows, best guess first
    pub candidate_sets: Vec<String>,
    pub hp: String,
    pub foil_indicators: Vec<String>,
    pub rarity: String,
    pub language: Language,
    pub first_edition: bool,
    pub all_lines: Vec<String>,
    /// Which rule resolved the set code
    pub match_reason: String,
    pub confidence: f64,
}

impl ParsedMetadata {
    /// Metadata with every field empty
    pub fn empty(game: Game) -> Self {
        Self {
            game,
            name: String::new(),
            number: String::new(),
            set_total: String::new(),
            set_code: String::new(),
            set_name: String::new(),
            candidate_sets: Vec::new(),
            hp: String::new(),
            foil_indicators: Vec::new(),
            rarity: String::new(),
            language: Language::English,
            first_edition: false,
            all_lines: Vec::new(),
            match_reason: String::new(),
            confidence: 0.0,
        }
    }

    /// Collector number without leading zeros, as used for matching
    pub fn normalized_number(&self) -> String {
        normalize_collector_number(&self.number)
    }

    /// True only when the text names an actual foil finish.
    ///
    /// Mechanic suffixes such as V or GX are recorded as indicators but do
    /// not imply a foil printing on their own.
    pub fn is_foil(&self) -> bool {
        self.foil_indicators
            .iter()
            .any(|ind| set_tables::FINISH_KEYWORDS.contains(&ind.as_str()))
    }

    pub fn suggested_printing(&self) -> Printing {
        Printing::from_legacy(self.is_foil(), self.first_edition)
    }

    fn compute_confidence(&mut self) {
        let mut score: f64 = 0.0;
        if !self.name.is_empty() {
            score += NAME_WEIGHT;
        }
        if !self.set_code.is_empty() {
            score += SET_WEIGHT;
        }
        if !self.number.is_empty() {
            score += NUMBER_WEIGHT;
        }
        self.confidence = score.clamp(0.0, 1.0);
    }
}

/// Stateless text parser for one game
#[derive(Debug, Clone)]
pub struct TextParser {
    game: Game,
    known_set_codes: HashSet<String>,
}

impl TextParser {
    pub fn new(game: Game) -> Self {
        Self {
            game,
            known_set_codes: set_tables::known_set_codes(game),
        }
    }

    /// Extend the known-code table, typically with the catalog's set codes
    pub fn with_known_set_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_set_codes
            .extend(codes.into_iter().map(|c| c.as_ref().trim().to_lowercase()));
        self
    }

    pub fn game(&self) -> Game {
        self.game
    }

    /// Extract metadata from raw multi-line scan text
    pub fn parse(&self, text: &str) -> ParsedMetadata {
        let text = truncate_input(text);
        let mut metadata = ParsedMetadata::empty(self.game);

        metadata.all_lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if metadata.all_lines.is_empty() {
            return metadata;
        }

        let (name, name_line) = extract_name(&metadata.all_lines);
        metadata.name = name;

        if let Some((number, total)) = self.extract_number(&metadata.all_lines) {
            metadata.number = number;
            metadata.set_total = total;
        }

        let upper = metadata.all_lines.join("\n").to_uppercase();
        self.resolve_set(&mut metadata, &upper, name_line);

        if self.game == Game::Pokemon {
            if let Some((hp, token)) = extract_hp(&upper) {
                metadata.hp = hp;
                metadata.language = language_for_hp_token(&token);
            }
        }
        if contains_cjk(text) {
            metadata.language = Language::Japanese;
        }

        metadata.foil_indicators = VARIANT_PATTERNS
            .iter()
            .filter(|(_, re)| re.is_match(&upper))
            .map(|(kw, _)| kw.to_string())
            .collect();
        metadata.first_edition = FIRST_EDITION.is_match(&upper);
        metadata.rarity = self.extract_rarity(&upper, text);

        metadata.compute_confidence();
        log::debug!(
            "Parsed scan: name={:?} number={:?} set={:?} ({}) confidence={:.2}",
            metadata.name,
            metadata.number,
            metadata.set_code,
            metadata.match_reason,
            metadata.confidence
        );
        metadata
    }

    // ── Collector number ────────────────────────────────────────────────

    fn extract_number(&self, lines: &[String]) -> Option<(String, String)> {
        for line in lines {
            let line = normalize_ocr_digits(line);

            if let Some(caps) = PREFIXED_NUMBER.captures(&line) {
                return Some((caps[1].to_uppercase(), caps[2].to_uppercase()));
            }

            for caps in COLLECTOR_NUMBER.captures_iter(&line) {
                let total = &caps[2];
                // MTG power/toughness ("4/5") looks like a collector number
                if self.game == Game::Mtg && total.len() < 2 {
                    continue;
                }
                return Some((caps[1].to_string(), total.to_string()));
            }
        }
        None
    }

    // ── Set resolution ──────────────────────────────────────────────────

    fn resolve_set(&self, metadata: &mut ParsedMetadata, upper: &str, name_line: Option<usize>) {
        if let Some(code) = self.find_known_code(&metadata.all_lines, upper, name_line) {
            metadata.candidate_sets = vec![code.clone()];
            metadata.set_code = code;
            metadata.match_reason = "set_code".to_string();
            return;
        }

        if let Some((phrase, code)) = find_set_name(self.game, upper) {
            metadata.set_name = phrase.to_string();
            metadata.candidate_sets = vec![code.to_string()];
            metadata.set_code = code.to_string();
            metadata.match_reason = "set_name".to_string();
            return;
        }

        if self.game == Game::Pokemon {
            let original = metadata.all_lines.join("\n");
            if let Some(code) = find_ptcgo_code(&original) {
                metadata.candidate_sets = vec![code.to_string()];
                metadata.set_code = code.to_string();
                metadata.match_reason = "ptcgo_code".to_string();
                return;
            }
        }

        if !metadata.set_total.is_empty() {
            let possible = set_tables::sets_for_total(self.game, &metadata.set_total);
            if let Some(best) = set_tables::best_set_for_total(possible) {
                metadata.candidate_sets = std::iter::once(best.clone())
                    .chain(possible.iter().filter(|s| **s != best).map(|s| s.to_string()))
                    .collect();
                metadata.set_code = best;
                metadata.match_reason = "set_total".to_string();
            }
        }
    }

    /// Direct match against the known-code table.
    ///
    /// Pokémon codes follow a fixed shape and are matched case-insensitively.
    /// Other codes only count as standalone uppercase tokens outside the name
    /// line, so ordinary rules text ("draw one card") is never read as a code.
    fn find_known_code(
        &self,
        lines: &[String],
        upper: &str,
        name_line: Option<usize>,
    ) -> Option<String> {
        if self.game == Game::Pokemon {
            let found = POKEMON_SET_CODE
                .find_iter(upper)
                .map(|m| m.as_str().to_lowercase())
                .find(|code| self.known_set_codes.contains(code));
            if found.is_some() {
                return found;
            }
        }

        lines
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != name_line)
            .flat_map(|(_, line)| line.split(|c: char| !c.is_alphanumeric()))
            .filter(|token| (2..=6).contains(&token.len()))
            .filter(|token| {
                token.chars().any(|c| c.is_ascii_uppercase())
                    && !token.chars().any(|c| c.is_lowercase())
            })
            .map(str::to_lowercase)
            .find(|token| self.known_set_codes.contains(token))
    }

    // ── Rarity ──────────────────────────────────────────────────────────

    fn extract_rarity(&self, upper: &str, original: &str) -> String {
        let best = set_tables::rarities(self.game)
            .iter()
            .filter(|(phrase, _)| contains_phrase(upper, phrase))
            .max_by_key(|(phrase, _)| phrase.len());
        if let Some((_, display)) = best {
            return display.to_string();
        }

        if self.game == Game::Pokemon {
            if original.contains(&['★', '☆'][..]) {
                return "Rare".to_string();
            }
            if original.contains(&['◆', '◇'][..]) {
                return "Uncommon".to_string();
            }
            if original.contains('●') {
                return "Common".to_string();
            }
        }
        String::new()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

fn truncate_input(text: &str) -> &str {
    if text.len() <= MAX_INPUT_BYTES {
        return text;
    }
    let mut end = MAX_INPUT_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    log::debug!("Scan text truncated from {} to {} bytes", text.len(), end);
    &text[..end]
}

/// First line that still has content after noise removal, with its index
fn extract_name(lines: &[String]) -> (String, Option<usize>) {
    for (idx, line) in lines.iter().enumerate() {
        let cleaned = clean_name_line(line);
        if !cleaned.is_empty() {
            return (cleaned, Some(idx));
        }
    }
    (String::new(), None)
}

fn clean_name_line(line: &str) -> String {
    let stripped = NAME_NOISE.replace_all(line, " ");
    stripped
        .split_whitespace()
        .filter(|token| {
            let upper = token.to_uppercase();
            !set_tables::NAME_NOISE_TOKENS.contains(&upper.as_str())
                && !token.chars().all(|c| c.is_ascii_digit())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Replace letters commonly misread for digits when they touch a digit or '/'
fn normalize_ocr_digits(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let numeric = |c: Option<&char>| matches!(c, Some(c) if c.is_ascii_digit() || *c == '/');

    chars
        .iter()
        .enumerate()
        .map(|(i, &c)| {
            let prev = if i > 0 { chars.get(i - 1) } else { None };
            let next = chars.get(i + 1);
            if !(numeric(prev) || numeric(next)) {
                return c;
            }
            match c {
                'O' | 'o' => '0',
                'l' | 'I' => '1',
                _ => c,
            }
        })
        .collect()
}

fn extract_hp(upper: &str) -> Option<(String, String)> {
    HP_VALUE.captures_iter(upper).find_map(|caps| {
        let (token, value) = match (caps.get(1), caps.get(2), caps.get(3), caps.get(4)) {
            (Some(token), Some(value), _, _) => (token, value),
            (_, _, Some(value), Some(token)) => (token, value),
            _ => return None,
        };
        let hp: u32 = value.as_str().parse().ok()?;
        (10..=400)
            .contains(&hp)
            .then(|| (hp.to_string(), token.as_str().to_string()))
    })
}

fn language_for_hp_token(token: &str) -> Language {
    match token {
        "KP" => Language::German,
        "PV" => Language::French,
        "PS" => Language::Italian,
        _ => Language::English,
    }
}

fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(c as u32,
            0x3040..=0x309F   // hiragana
            | 0x30A0..=0x30FF // katakana
            | 0x4E00..=0x9FFF // CJK unified ideographs
        )
    })
}

/// Longest set-name phrase present as whole words
fn find_set_name(game: Game, upper: &str) -> Option<(&'static str, &'static str)> {
    set_tables::set_names(game)
        .iter()
        .filter(|(phrase, _)| contains_phrase(upper, phrase))
        .max_by_key(|(phrase, _)| phrase.len())
        .map(|(phrase, code)| (*phrase, *code))
}

fn find_ptcgo_code(original: &str) -> Option<&'static str> {
    PTCGO_CODE.find_iter(original).find_map(|m| {
        set_tables::POKEMON_PTCGO_CODES
            .iter()
            .find(|(code, _)| *code == m.as_str())
            .map(|(_, set)| *set)
    })
}

/// Substring match that requires non-alphanumeric characters on both sides
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, matched)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + matched.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pokemon() -> TextParser {
        TextParser::new(Game::Pokemon)
    }

    #[test]
    fn parses_charizard_scan() {
        let meta = pokemon().parse("Charizard VMAX\n025/185\nswsh4\n330 HP");
        assert_eq!(meta.name, "Charizard VMAX");
        assert_eq!(meta.number, "025");
        assert_eq!(meta.normalized_number(), "25");
        assert_eq!(meta.set_total, "185");
        assert_eq!(meta.set_code, "swsh4");
        assert_eq!(meta.match_reason, "set_code");
        assert_eq!(meta.hp, "330");
        assert_eq!(meta.language, Language::English);
        assert!(meta.foil_indicators.contains(&"VMAX".to_string()));
        assert!(!meta.is_foil());
        assert!((meta.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_text_yields_empty_metadata() {
        let meta = pokemon().parse("  \n\n ");
        assert_eq!(meta, ParsedMetadata::empty(Game::Pokemon));
        assert_eq!(meta.confidence, 0.0);
    }

    #[test]
    fn name_skips_noise_only_lines() {
        let meta = pokemon().parse("BASIC\nPikachu 60 HP\n");
        assert_eq!(meta.name, "Pikachu");
        assert_eq!(meta.hp, "60");
    }

    #[test]
    fn first_number_match_wins() {
        let meta = pokemon().parse("Eevee\n012/100\n099/100");
        assert_eq!(meta.number, "012");
        assert_eq!(meta.set_total, "100");
    }

    #[test]
    fn prefixed_trainer_gallery_numbers() {
        let meta = pokemon().parse("Umbreon VMAX\nTG23/TG30");
        assert_eq!(meta.number, "TG23");
        assert_eq!(meta.set_total, "TG30");
        assert_eq!(meta.normalized_number(), "TG23");
    }

    #[test]
    fn ocr_letters_inside_numbers_are_corrected() {
        let meta = pokemon().parse("Mew\nO25/l85");
        assert_eq!(meta.number, "025");
        assert_eq!(meta.set_total, "185");
    }

    #[test]
    fn mtg_ignores_power_toughness() {
        let parser = TextParser::new(Game::Mtg);
        let meta = parser.parse("Grizzly Bears\nCreature - Bear\n2/2\n0123/280 C");
        assert_eq!(meta.number, "0123");
        assert_eq!(meta.normalized_number(), "123");
        assert_eq!(meta.set_total, "280");
    }

    #[test]
    fn set_name_longest_phrase_wins() {
        let meta = pokemon().parse("Blastoise\nBase Set 2\n2/130");
        assert_eq!(meta.set_code, "base4");
        assert_eq!(meta.set_name, "BASE SET 2");
        assert_eq!(meta.match_reason, "set_name");
    }

    #[test]
    fn short_set_names_need_word_boundaries() {
        let meta = pokemon().parse("Onix\nBASEMENT DAMAGE 20");
        assert_ne!(meta.set_code, "base1");
    }

    #[test]
    fn ptcgo_code_resolves_wotc_sets() {
        let meta = pokemon().parse("Scyther\n10/64 JU");
        assert_eq!(meta.set_code, "base2");
        assert_eq!(meta.match_reason, "ptcgo_code");
    }

    #[test]
    fn total_table_lists_alternatives() {
        let meta = pokemon().parse("Dragonite\n100/198");
        assert_eq!(meta.set_code, "sv1");
        assert_eq!(meta.candidate_sets, vec!["sv1".to_string(), "swsh6".to_string()]);
        assert_eq!(meta.match_reason, "set_total");
    }

    #[test]
    fn unknown_total_leaves_set_blank() {
        let meta = pokemon().parse("Mystery\n5/999");
        assert!(meta.set_code.is_empty());
        assert!(meta.candidate_sets.is_empty());
        assert!((meta.confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn catalog_codes_extend_known_table() {
        let parser = TextParser::new(Game::Mtg).with_known_set_codes(["ONE", "mom"]);
        let meta = parser.parse("Elesh Norn\n0123/271 M\nONE • EN");
        assert_eq!(meta.set_code, "one");

        let meta = parser.parse("Divination\nDraw one card.\n055/271 C");
        assert!(meta.set_code.is_empty());
    }

    #[test]
    fn localized_hp_tokens_signal_language() {
        assert_eq!(pokemon().parse("Glurak\nKP 330").language, Language::German);
        assert_eq!(pokemon().parse("Dracaufeu\nPV 170").language, Language::French);
        assert_eq!(pokemon().parse("Charizard\nPS 120").language, Language::Italian);
        assert_eq!(pokemon().parse("リザードン\nHP 330").language, Language::Japanese);
    }

    #[test]
    fn hp_outside_range_is_ignored() {
        assert!(pokemon().parse("Test\nHP 999").hp.is_empty());
        assert!(pokemon().parse("Test\nHP 5").hp.is_empty());
    }

    #[test]
    fn foil_indicators_are_whole_word_and_case_insensitive() {
        let meta = pokemon().parse("Lugia V\nalternate full art\nreverse holo");
        assert!(meta.foil_indicators.contains(&"V".to_string()));
        assert!(meta.foil_indicators.contains(&"FULL ART".to_string()));
        assert!(meta.foil_indicators.contains(&"REVERSE HOLO".to_string()));
        assert!(meta.is_foil());
        assert_eq!(meta.suggested_printing(), Printing::Foil);

        let meta = pokemon().parse("Vulpix\nEvolves into Ninetales");
        assert!(!meta.foil_indicators.contains(&"V".to_string()));
    }

    #[test]
    fn first_edition_suggests_first_edition_printing() {
        let meta = pokemon().parse("Charizard\n1st Edition\nHolo\n4/102");
        assert!(meta.first_edition);
        assert_eq!(meta.suggested_printing(), Printing::FirstEdition);
    }

    #[test]
    fn rarity_uses_longest_phrase() {
        let meta = pokemon().parse("Mew ex\nSpecial Illustration Rare");
        assert_eq!(meta.rarity, "Special Illustration Rare");
        let meta = pokemon().parse("Pidgey\n●");
        assert_eq!(meta.rarity, "Common");
        let meta = TextParser::new(Game::Mtg).parse("Sheoldred\nMythic Rare");
        assert_eq!(meta.rarity, "Mythic Rare");
    }

    #[test]
    fn oversized_input_is_truncated_on_char_boundary() {
        let text = format!("Pikachu\n{}", "é".repeat(MAX_INPUT_BYTES));
        let meta = pokemon().parse(&text);
        assert_eq!(meta.name, "Pikachu");
        let total: usize = meta.all_lines.iter().map(|l| l.len() + 1).sum();
        assert!(total <= MAX_INPUT_BYTES + 1);
    }
}
