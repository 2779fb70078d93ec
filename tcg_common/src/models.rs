use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported trading card games
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Game {
    Pokemon,
    Mtg,
}

impl Game {
    pub fn as_str(&self) -> &'static str {
        match self {
            Game::Pokemon => "pokemon",
            Game::Mtg => "mtg",
        }
    }

    /// Parse a game name ("pokemon", "mtg", "magic")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pokemon" | "pokémon" | "ptcg" => Some(Game::Pokemon),
            "mtg" | "magic" | "magic-the-gathering" => Some(Game::Mtg),
            _ => None,
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical wear grade used for pricing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    #[serde(rename = "NM")]
    NearMint,
    #[serde(rename = "LP")]
    LightlyPlayed,
    #[serde(rename = "MP")]
    ModeratelyPlayed,
    #[serde(rename = "HP")]
    HeavilyPlayed,
    #[serde(rename = "DMG")]
    Damaged,
}

impl Condition {
    /// Short code stored in the database ("NM", "LP", ...)
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::NearMint => "NM",
            Condition::LightlyPlayed => "LP",
            Condition::ModeratelyPlayed => "MP",
            Condition::HeavilyPlayed => "HP",
            Condition::Damaged => "DMG",
        }
    }

    /// Parse either a short code or a pricing provider label ("Near Mint")
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "nm" | "near mint" => Some(Condition::NearMint),
            "lp" | "lightly played" => Some(Condition::LightlyPlayed),
            "mp" | "moderately played" => Some(Condition::ModeratelyPlayed),
            "hp" | "heavily played" => Some(Condition::HeavilyPlayed),
            "dmg" | "damaged" => Some(Condition::Damaged),
            _ => None,
        }
    }

    /// Map a collection grade (M, NM, EX, GD, LP, PL, PR) to a price condition.
    /// Unknown grades price as NM.
    pub fn from_collection_grade(grade: &str) -> Self {
        match grade.trim().to_uppercase().as_str() {
            "M" | "NM" => Condition::NearMint,
            "EX" | "LP" => Condition::LightlyPlayed,
            "GD" => Condition::ModeratelyPlayed,
            "PL" => Condition::HeavilyPlayed,
            "PR" => Condition::Damaged,
            _ => Condition::NearMint,
        }
    }

    pub fn all() -> &'static [Condition] {
        &[
            Condition::NearMint,
            Condition::LightlyPlayed,
            Condition::ModeratelyPlayed,
            Condition::HeavilyPlayed,
            Condition::Damaged,
        ]
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finish or print-run variant of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Printing {
    Normal,
    Foil,
    #[serde(rename = "1st Edition")]
    FirstEdition,
    Unlimited,
    #[serde(rename = "Reverse Holofoil")]
    ReverseHolofoil,
}

impl Printing {
    /// Label as used by the pricing provider and the database
    pub fn as_str(&self) -> &'static str {
        match self {
            Printing::Normal => "Normal",
            Printing::Foil => "Foil",
            Printing::FirstEdition => "1st Edition",
            Printing::Unlimited => "Unlimited",
            Printing::ReverseHolofoil => "Reverse Holofoil",
        }
    }

    /// Parse a printing label, accepting the common provider spellings
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Some(Printing::Normal),
            "foil" | "holo" | "holofoil" => Some(Printing::Foil),
            "1st edition" | "first edition" | "1st edition holofoil" => {
                Some(Printing::FirstEdition)
            }
            "unlimited" | "unlimited holofoil" => Some(Printing::Unlimited),
            "reverse holofoil" | "reverse holo" | "reverse" => Some(Printing::ReverseHolofoil),
            _ => None,
        }
    }

    /// True for actual foil/holographic finishes.
    ///
    /// 1st Edition is a print run, not a finish, so it is not a foil variant.
    pub fn is_foil_variant(&self) -> bool {
        matches!(self, Printing::Foil | Printing::ReverseHolofoil)
    }

    /// Convert the legacy foil / first-edition flags of a collection entry
    pub fn from_legacy(foil: bool, first_edition: bool) -> Self {
        if first_edition {
            Printing::FirstEdition
        } else if foil {
            Printing::Foil
        } else {
            Printing::Normal
        }
    }

    pub fn all() -> &'static [Printing] {
        &[
            Printing::Normal,
            Printing::Foil,
            Printing::FirstEdition,
            Printing::Unlimited,
            Printing::ReverseHolofoil,
        ]
    }
}

impl fmt::Display for Printing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents the supported card languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Language {
    #[default]
    English,
    Japanese,
    German,
    French,
    Italian,
}

impl Language {
    /// Returns the full name of the language (e.g., "English", "Japanese")
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Japanese => "Japanese",
            Language::German => "German",
            Language::French => "French",
            Language::Italian => "Italian",
        }
    }

    /// Returns the ISO 639-1 language code (e.g., "en", "ja")
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Japanese => "ja",
            Language::German => "de",
            Language::French => "fr",
            Language::Italian => "it",
        }
    }

    /// Parse a full name, ISO code or provider spelling. Unknown and empty
    /// values normalize to English, the catalog's default language.
    pub fn normalize(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "japanese" | "jp" | "ja" | "jpn" => Language::Japanese,
            "german" | "de" | "deu" | "ger" => Language::German,
            "french" | "fr" | "fra" | "fre" => Language::French,
            "italian" | "it" | "ita" => Language::Italian,
            _ => Language::English,
        }
    }

    pub fn all() -> &'static [Language] {
        &[
            Language::English,
            Language::Japanese,
            Language::German,
            Language::French,
            Language::Italian,
        ]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Catalog entry for a single card.
///
/// Identity fields never change after the catalog is loaded; only the
/// pricing-related fields (`external_id`, scalar base prices) may be
/// refreshed through a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub game: Game,
    pub name: String,
    #[serde(default)]
    pub set_code: String,
    #[serde(default)]
    pub set_name: String,
    /// Collector number as printed (e.g. "025", "TG17")
    #[serde(default)]
    pub number: String,
    #[serde(default)]
    pub rarity: String,
    #[serde(default)]
    pub hp: Option<String>,
    #[serde(default)]
    pub finishes: Vec<Printing>,
    /// Identifier used by the pricing provider, when already known
    #[serde(default)]
    pub external_id: Option<String>,
    /// Legacy scalar non-foil price
    #[serde(default)]
    pub price_usd: f64,
    /// Legacy scalar foil price
    #[serde(default)]
    pub price_foil_usd: f64,
}

impl Card {
    /// Key used to group cards for external id discovery: the set name,
    /// falling back to the set code.
    pub fn group_key(&self) -> &str {
        if self.set_name.trim().is_empty() {
            &self.set_code
        } else {
            &self.set_name
        }
    }

    /// Collector number without leading zeros ("025" -> "25", "000" -> "0")
    pub fn normalized_number(&self) -> String {
        normalize_collector_number(&self.number)
    }

    /// Copy of this card with refreshed scalar base prices
    pub fn with_base_prices(&self, price_usd: f64, price_foil_usd: f64) -> Self {
        Card {
            price_usd,
            price_foil_usd,
            ..self.clone()
        }
    }
}

/// Strip leading zeros from a collector number, keeping prefixes intact.
///
/// "025" -> "25", "0" -> "0", "TG07" -> "TG07".
pub fn normalize_collector_number(number: &str) -> String {
    let trimmed = number.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return trimmed.to_uppercase();
    }
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

/// Cached price for one (card, condition, printing, language) key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub card_id: String,
    pub condition: Condition,
    pub printing: Printing,
    pub language: Language,
    pub price_usd: f64,
    pub source: String,
    pub updated_at: DateTime<Utc>,
}

impl PriceRow {
    /// True if this row belongs to the given key tuple
    pub fn matches(&self, condition: Condition, printing: Printing, language: Language) -> bool {
        self.condition == condition && self.printing == printing && self.language == language
    }
}
