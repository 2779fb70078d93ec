//! Static lookup tables used by the text parser
//!
//! Set names, PTCGO codes, set totals and keyword vocabularies printed on
//! physical cards. Tables are ordered slices so lookups stay deterministic.

use std::collections::HashSet;
use tcg_common::Game;

/// Pokémon set name (as printed, uppercase) to set code
pub const POKEMON_SET_NAMES: &[(&str, &str)] = &[
    // Scarlet & Violet
    ("SCARLET & VIOLET", "sv1"),
    ("SCARLET AND VIOLET", "sv1"),
    ("PALDEA EVOLVED", "sv2"),
    ("OBSIDIAN FLAMES", "sv3"),
    ("SCARLET & VIOLET 151", "sv3pt5"),
    ("POKEMON 151", "sv3pt5"),
    ("PARADOX RIFT", "sv4"),
    ("PALDEAN FATES", "sv4pt5"),
    ("TEMPORAL FORCES", "sv5"),
    ("TWILIGHT MASQUERADE", "sv6"),
    ("SHROUDED FABLE", "sv6pt5"),
    ("STELLAR CROWN", "sv7"),
    ("SURGING SPARKS", "sv8"),
    ("PRISMATIC EVOLUTIONS", "sv8pt5"),
    ("JOURNEY TOGETHER", "sv9"),
    // Sword & Shield
    ("SWORD & SHIELD", "swsh1"),
    ("SWORD AND SHIELD", "swsh1"),
    ("REBEL CLASH", "swsh2"),
    ("DARKNESS ABLAZE", "swsh3"),
    ("CHAMPION'S PATH", "swsh3pt5"),
    ("CHAMPIONS PATH", "swsh3pt5"),
    ("VIVID VOLTAGE", "swsh4"),
    ("SHINING FATES", "swsh4pt5"),
    ("BATTLE STYLES", "swsh5"),
    ("CHILLING REIGN", "swsh6"),
    ("EVOLVING SKIES", "swsh7"),
    ("CELEBRATIONS", "cel25"),
    ("FUSION STRIKE", "swsh8"),
    ("BRILLIANT STARS", "swsh9"),
    ("ASTRAL RADIANCE", "swsh10"),
    ("POKEMON GO", "pgo"),
    ("LOST ORIGIN", "swsh11"),
    ("SILVER TEMPEST", "swsh12"),
    ("CROWN ZENITH", "swsh12pt5"),
    // Sun & Moon
    ("SUN & MOON", "sm1"),
    ("SUN AND MOON", "sm1"),
    ("GUARDIANS RISING", "sm2"),
    ("BURNING SHADOWS", "sm3"),
    ("SHINING LEGENDS", "sm3pt5"),
    ("CRIMSON INVASION", "sm4"),
    ("ULTRA PRISM", "sm5"),
    ("FORBIDDEN LIGHT", "sm6"),
    ("CELESTIAL STORM", "sm7"),
    ("DRAGON MAJESTY", "sm7pt5"),
    ("LOST THUNDER", "sm8"),
    ("TEAM UP", "sm9"),
    ("UNBROKEN BONDS", "sm10"),
    ("UNIFIED MINDS", "sm11"),
    ("HIDDEN FATES", "sm11pt5"),
    ("COSMIC ECLIPSE", "sm12"),
    // XY
    ("FLASHFIRE", "xy2"),
    ("FURIOUS FISTS", "xy3"),
    ("PHANTOM FORCES", "xy4"),
    ("PRIMAL CLASH", "xy5"),
    ("ROARING SKIES", "xy6"),
    ("ANCIENT ORIGINS", "xy7"),
    ("BREAKTHROUGH", "xy8"),
    ("BREAKPOINT", "xy9"),
    ("FATES COLLIDE", "xy10"),
    ("STEAM SIEGE", "xy11"),
    ("EVOLUTIONS", "xy12"),
    // Wizards of the Coast era
    ("BASE SET 2", "base4"),
    ("BASE SET", "base1"),
    ("BASE", "base1"),
    ("JUNGLE", "base2"),
    ("FOSSIL", "base3"),
    ("TEAM ROCKET", "base5"),
    ("LEGENDARY COLLECTION", "base6"),
    ("GYM HEROES", "gym1"),
    ("GYM CHALLENGE", "gym2"),
    ("NEO GENESIS", "neo1"),
    ("NEO DISCOVERY", "neo2"),
    ("NEO REVELATION", "neo3"),
    ("NEO DESTINY", "neo4"),
    ("EXPEDITION", "ecard1"),
    ("AQUAPOLIS", "ecard2"),
    ("SKYRIDGE", "ecard3"),
];

/// PTCGO two-letter codes printed on WotC-era and e-Card cards
pub const POKEMON_PTCGO_CODES: &[(&str, &str)] = &[
    ("BS", "base1"),
    ("JU", "base2"),
    ("FO", "base3"),
    ("B2", "base4"),
    ("TR", "base5"),
    ("LC", "base6"),
    ("G1", "gym1"),
    ("G2", "gym2"),
    ("N1", "neo1"),
    ("N2", "neo2"),
    ("N3", "neo3"),
    ("N4", "neo4"),
    ("SI", "si1"),
    ("AQ", "ecard2"),
    ("SK", "ecard3"),
];

/// Printed set total to possible set codes, newer sets first
pub const POKEMON_SET_TOTALS: &[(&str, &[&str])] = &[
    ("193", &["sv2"]),
    ("197", &["sv3"]),
    ("182", &["sv4"]),
    ("218", &["sv5"]),
    ("167", &["sv6"]),
    ("175", &["sv7"]),
    ("191", &["sv8"]),
    ("186", &["sv8pt5"]),
    ("169", &["sv9"]),
    ("202", &["swsh1"]),
    ("192", &["swsh2"]),
    ("185", &["swsh4"]),
    ("163", &["swsh5"]),
    ("203", &["swsh7"]),
    ("264", &["swsh8"]),
    ("172", &["swsh9"]),
    ("196", &["swsh11"]),
    ("195", &["swsh12"]),
    ("159", &["swsh12pt5"]),
    ("198", &["sv1", "swsh6"]),
    ("189", &["swsh10", "swsh3"]),
    ("156", &["sm5"]),
    ("131", &["sm6"]),
    ("168", &["sm7"]),
    ("214", &["sm8"]),
    ("181", &["sm9"]),
    ("234", &["sm10"]),
    ("236", &["sm11"]),
    ("271", &["sm12"]),
    ("69", &["sm7pt5"]),
    ("68", &["sm11pt5"]),
    ("119", &["xy4"]),
    ("164", &["xy5"]),
    ("162", &["xy8"]),
    ("125", &["xy10"]),
    ("102", &["base1", "hgss4"]),
    ("64", &["base2", "sv6pt5"]),
    ("62", &["base3"]),
    ("130", &["base4", "dp1"]),
    ("82", &["base5"]),
    ("83", &["base5"]),
    ("132", &["gym1", "dp3"]),
    ("129", &["gym2"]),
    ("75", &["neo2"]),
    ("66", &["neo3"]),
    ("165", &["sv3pt5", "ecard1"]),
    ("144", &["ecard3"]),
    ("73", &["swsh3pt5", "sm3pt5"]),
    ("72", &["swsh4pt5"]),
    ("78", &["pgo"]),
    ("25", &["cel25"]),
    ("91", &["sv4pt5"]),
    ("108", &["xy6", "xy12", "bw5"]),
    ("111", &["neo1", "xy3", "pl2"]),
    ("146", &["xy1", "dp6"]),
    ("147", &["sm3", "ecard2", "pl3"]),
    ("149", &["sm1", "bw7"]),
];

/// Extra Pokémon set codes printed on cards that do not appear in the name table
const POKEMON_EXTRA_CODES: &[&str] = &[
    "xy1", "bw1", "bw2", "bw3", "bw4", "bw5", "bw6", "bw7", "bw8", "bw9", "bw10", "bw11", "dp1",
    "dp2", "dp3", "dp4", "dp5", "dp6", "dp7", "hgss1", "hgss2", "hgss3", "hgss4", "pl1", "pl2",
    "pl3", "pl4", "pr-sw", "pr-sv",
];

/// Rarity phrase (uppercase) to display name, per game
pub const POKEMON_RARITIES: &[(&str, &str)] = &[
    ("SPECIAL ILLUSTRATION RARE", "Special Illustration Rare"),
    ("ILLUSTRATION RARE", "Illustration Rare"),
    ("SPECIAL ART RARE", "Special Art Rare"),
    ("SECRET RARE", "Secret Rare"),
    ("DOUBLE RARE", "Double Rare"),
    ("HYPER RARE", "Hyper Rare"),
    ("ULTRA RARE", "Ultra Rare"),
    ("RARE HOLO", "Rare Holo"),
    ("UNCOMMON", "Uncommon"),
    ("COMMON", "Common"),
    ("PROMO", "Promo"),
    ("RARE", "Rare"),
];

pub const MTG_RARITIES: &[(&str, &str)] = &[
    ("MYTHIC RARE", "Mythic Rare"),
    ("MYTHIC", "Mythic Rare"),
    ("UNCOMMON", "Uncommon"),
    ("COMMON", "Common"),
    ("SPECIAL", "Special"),
    ("RARE", "Rare"),
];

/// Foil / variant keywords, matched case-insensitively as whole words
pub const VARIANT_KEYWORDS: &[&str] = &[
    "V",
    "VMAX",
    "VSTAR",
    "GX",
    "EX",
    "HOLO",
    "HOLOFOIL",
    "REVERSE HOLO",
    "FOIL",
    "FULL ART",
    "ETCHED",
    "SHOWCASE",
    "BORDERLESS",
    "EXTENDED ART",
    "SECRET",
    "RAINBOW",
    "GOLD",
];

/// Keywords that name an actual foil finish (as opposed to a card mechanic)
pub const FINISH_KEYWORDS: &[&str] = &["HOLO", "HOLOFOIL", "REVERSE HOLO", "FOIL", "ETCHED"];

/// Tokens stripped from the name line
pub const NAME_NOISE_TOKENS: &[&str] = &[
    "HP", "KP", "PV", "PS", "BASIC", "STAGE", "STAGE1", "STAGE2", "EVOLVES", "©", "®", "™", "TM",
];

/// Known printed set codes for a game (lowercase)
pub fn known_set_codes(game: Game) -> HashSet<String> {
    match game {
        Game::Pokemon => POKEMON_SET_NAMES
            .iter()
            .map(|(_, code)| *code)
            .chain(POKEMON_SET_TOTALS.iter().flat_map(|(_, codes)| codes.iter().copied()))
            .chain(POKEMON_EXTRA_CODES.iter().copied())
            .map(str::to_string)
            .collect(),
        Game::Mtg => HashSet::new(),
    }
}

pub fn set_names(game: Game) -> &'static [(&'static str, &'static str)] {
    match game {
        Game::Pokemon => POKEMON_SET_NAMES,
        Game::Mtg => &[],
    }
}

pub fn rarities(game: Game) -> &'static [(&'static str, &'static str)] {
    match game {
        Game::Pokemon => POKEMON_RARITIES,
        Game::Mtg => MTG_RARITIES,
    }
}

/// Possible sets for a printed total, with or without leading zeros
pub fn sets_for_total(game: Game, total: &str) -> &'static [&'static str] {
    if game != Game::Pokemon {
        return &[];
    }
    let stripped = total.trim_start_matches('0');
    POKEMON_SET_TOTALS
        .iter()
        .find(|(t, _)| *t == total || *t == stripped)
        .map(|(_, sets)| *sets)
        .unwrap_or(&[])
}

/// Pick the most likely set when several share a total: modern sets first,
/// then the table order.
pub fn best_set_for_total(possible: &[&str]) -> Option<String> {
    possible
        .iter()
        .find(|s| s.starts_with("sv") || s.starts_with("swsh"))
        .or_else(|| possible.first())
        .map(|s| s.to_string())
}
