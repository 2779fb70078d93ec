//! Price resolution over cached price rows
//!
//! [`resolve`] is a pure function: it only reads rows that were already
//! fetched and the card's scalar base prices, and always returns a price
//! together with the [`Provenance`] of the rule that produced it.
//!
//! Rule order, first priced hit wins:
//! 1. exact (condition, printing, language) row
//! 2. same printing at NM
//! 3. equivalent printings, each at the requested condition then NM
//! 4. rules 1-3 again in English, flagged as a language fallback
//! 5. the scalar base price for the printing's finish
//! 6. the opposite finish's scalar base price
//! 7. unpriced, 0.0

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tcg_common::{Card, Condition, Language, PriceRow, Printing};

/// Rows older than this are refreshed by the scheduler
pub const STALE_AFTER_HOURS: i64 = 24;

/// Source label for prices taken from the catalog's scalar fields
pub const BASE_PRICE_SOURCE: &str = "catalog";

/// Which rule produced a resolved price
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum PriceTier {
    Exact,
    NearMint,
    EquivalentPrinting {
        printing: Printing,
        condition: Condition,
    },
    BasePrice,
    OppositeFinishBase,
    Unpriced,
}

/// The key a caller asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PriceKey {
    pub condition: Condition,
    pub printing: Printing,
    pub language: Language,
}

/// How a resolved price was found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Provenance {
    pub tier: PriceTier,
    pub requested: PriceKey,
    /// Language of the row actually used
    pub language: Language,
    pub language_fallback: bool,
    pub source: String,
}

impl Provenance {
    /// Number of dimensions substituted to reach this price
    pub fn fallback_steps(&self) -> usize {
        let tier_steps = match self.tier {
            PriceTier::Exact => 0,
            PriceTier::NearMint => 1,
            PriceTier::EquivalentPrinting { condition, .. } => {
                1 + usize::from(condition != self.requested.condition)
            }
            PriceTier::BasePrice => 1,
            PriceTier::OppositeFinishBase => 2,
            PriceTier::Unpriced => 3,
        };
        tier_steps + usize::from(self.language_fallback)
    }

    pub fn is_exact(&self) -> bool {
        self.tier == PriceTier::Exact && !self.language_fallback
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedPrice {
    pub price_usd: f64,
    pub provenance: Provenance,
}

/// Scalar prices of a card, non-foil and foil.
///
/// The catalog values are the base tier; scalars persisted after a refresh
/// override them field by field when non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BasePrices {
    pub normal: f64,
    pub foil: f64,
}

impl BasePrices {
    pub fn from_card(card: &Card) -> Self {
        Self {
            normal: card.price_usd,
            foil: card.price_foil_usd,
        }
    }

    pub fn overlay(self, stored: Option<BasePrices>) -> Self {
        match stored {
            Some(stored) => Self {
                normal: if stored.normal > 0.0 { stored.normal } else { self.normal },
                foil: if stored.foil > 0.0 { stored.foil } else { self.foil },
            },
            None => self,
        }
    }

    /// Scalars refreshed from freshly fetched NM rows, English first.
    /// A finish without an NM row keeps its previous value.
    pub fn with_near_mint_rows(self, rows: &[PriceRow]) -> Self {
        let pick = |foil: bool| {
            rows.iter()
                .filter(|r| {
                    r.condition == Condition::NearMint
                        && r.printing.is_foil_variant() == foil
                        && r.price_usd > 0.0
                })
                .min_by_key(|r| r.language != Language::English)
                .map(|r| r.price_usd)
        };
        Self {
            normal: pick(false).unwrap_or(self.normal),
            foil: pick(true).unwrap_or(self.foil),
        }
    }
}

/// Printings that may stand in for the requested one, in order.
///
/// Lists are explicit and never chained. 1st Edition and Reverse Holofoil
/// never reach the Foil price.
pub fn equivalent_printings(printing: Printing) -> &'static [Printing] {
    match printing {
        Printing::Foil => &[Printing::Normal],
        Printing::Normal => &[Printing::Unlimited, Printing::Foil],
        Printing::ReverseHolofoil => &[Printing::Normal],
        Printing::Unlimited => &[Printing::Normal],
        Printing::FirstEdition => &[Printing::Unlimited, Printing::Normal],
    }
}

/// Resolve the displayed price for a card from its cached rows
pub fn resolve(
    card: &Card,
    rows: &[PriceRow],
    condition: Condition,
    printing: Printing,
    language: Language,
) -> ResolvedPrice {
    resolve_with_base(
        card,
        rows,
        BasePrices::from_card(card),
        PriceKey {
            condition,
            printing,
            language,
        },
    )
}

/// Like [`resolve`], with explicitly supplied scalar base prices
pub fn resolve_with_base(
    card: &Card,
    rows: &[PriceRow],
    base: BasePrices,
    requested: PriceKey,
) -> ResolvedPrice {
    let card_rows: Vec<&PriceRow> = rows.iter().filter(|r| r.card_id == card.id).collect();

    if let Some(found) = resolve_rows(&card_rows, requested, requested.language) {
        return found;
    }
    if requested.language != Language::English {
        if let Some(found) = resolve_rows(&card_rows, requested, Language::English) {
            return found;
        }
    }

    resolve_base(base, requested)
}

fn resolve_rows(
    rows: &[&PriceRow],
    requested: PriceKey,
    language: Language,
) -> Option<ResolvedPrice> {
    let find = |condition: Condition, printing: Printing| {
        rows.iter()
            .copied()
            .find(|r| r.matches(condition, printing, language) && r.price_usd > 0.0)
    };
    let hit = |row: &PriceRow, tier: PriceTier| ResolvedPrice {
        price_usd: row.price_usd,
        provenance: Provenance {
            tier,
            requested,
            language,
            language_fallback: language != requested.language,
            source: row.source.clone(),
        },
    };

    if let Some(row) = find(requested.condition, requested.printing) {
        return Some(hit(row, PriceTier::Exact));
    }
    if let Some(row) = find(Condition::NearMint, requested.printing) {
        return Some(hit(row, PriceTier::NearMint));
    }
    for &printing in equivalent_printings(requested.printing) {
        for condition in [requested.condition, Condition::NearMint] {
            if let Some(row) = find(condition, printing) {
                return Some(hit(row, PriceTier::EquivalentPrinting { printing, condition }));
            }
        }
    }
    None
}

fn resolve_base(base: BasePrices, requested: PriceKey) -> ResolvedPrice {
    let (own, opposite) = if requested.printing.is_foil_variant() {
        (base.foil, base.normal)
    } else {
        (base.normal, base.foil)
    };

    let (price_usd, tier, source) = if own > 0.0 {
        (own, PriceTier::BasePrice, BASE_PRICE_SOURCE)
    } else if opposite > 0.0 {
        (opposite, PriceTier::OppositeFinishBase, BASE_PRICE_SOURCE)
    } else {
        (0.0, PriceTier::Unpriced, "")
    };

    ResolvedPrice {
        price_usd,
        provenance: Provenance {
            tier,
            requested,
            language: Language::English,
            language_fallback: requested.language != Language::English,
            source: source.to_string(),
        },
    }
}

/// True when a row last updated at `updated_at` should be refreshed
pub fn is_stale(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - updated_at > Duration::hours(STALE_AFTER_HOURS)
}

/// Every cached row for a card; when none exist, NM rows synthesized from
/// the scalar base prices so callers always have something to show.
pub fn all_condition_prices(
    card: &Card,
    rows: &[PriceRow],
    as_of: DateTime<Utc>,
) -> Vec<PriceRow> {
    let cached: Vec<PriceRow> = rows
        .iter()
        .filter(|r| r.card_id == card.id)
        .cloned()
        .collect();
    if !cached.is_empty() {
        return cached;
    }

    [
        (Printing::Normal, card.price_usd),
        (Printing::Foil, card.price_foil_usd),
    ]
    .into_iter()
    .filter(|(_, price)| *price > 0.0)
    .map(|(printing, price_usd)| PriceRow {
        card_id: card.id.clone(),
        condition: Condition::NearMint,
        printing,
        language: Language::English,
        price_usd,
        source: BASE_PRICE_SOURCE.to_string(),
        updated_at: as_of,
    })
    .collect()
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod tests;
