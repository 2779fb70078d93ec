use card_identify::{CardIndex, Identifier, FULL_SCAN_THRESHOLD};
use std::io::Write;
use std::sync::Arc;
use tcg_common::{Card, Catalog, Game};

fn create_test_card(id: &str, name: &str, set_code: &str, number: &str, hp: Option<&str>) -> Card {
    Card {
        id: id.to_string(),
        game: Game::Pokemon,
        name: name.to_string(),
        set_code: set_code.to_string(),
        set_name: String::new(),
        number: number.to_string(),
        rarity: "Rare".to_string(),
        hp: hp.map(str::to_string),
        finishes: Vec::new(),
        external_id: None,
        price_usd: 0.0,
        price_foil_usd: 0.0,
    }
}

// Generate a catalog with many look-alike cards around the real target
fn generate_catalog(size: usize) -> Vec<Card> {
    let names = ["Charizard", "Charmander", "Charmeleon", "Pikachu", "Eevee", "Mew"];
    let sets = ["swsh1", "swsh2", "swsh3", "sv1", "base1"];
    let mut cards: Vec<Card> = (0..size)
        .map(|i| {
            create_test_card(
                &format!("gen-{i}"),
                names[i % names.len()],
                sets[i % sets.len()],
                &format!("{:03}", i % 200),
                None,
            )
        })
        .collect();
    cards.push(create_test_card(
        "swsh4-025",
        "Charizard VMAX",
        "swsh4",
        "025",
        Some("330"),
    ));
    cards
}

fn build_identifier(cards: Vec<Card>) -> Identifier {
    Identifier::new(CardIndex::build(Arc::new(Catalog::from_cards(cards).unwrap())))
}

#[test]
fn test_charizard_scan_ranks_catalog_entry_first() {
    let identifier = build_identifier(generate_catalog(500));
    let result = identifier.identify(
        "Charizard VMAX\n025/185\nswsh4\n330 HP",
        Game::Pokemon,
        None,
    );

    assert_eq!(result.metadata.name, "Charizard VMAX");
    assert_eq!(result.metadata.number, "025");
    assert_eq!(result.metadata.set_total, "185");
    assert_eq!(result.metadata.set_code, "swsh4");
    assert_eq!(result.metadata.hp, "330");

    let best = result.outcome.best().unwrap();
    assert_eq!(best.card_id, "swsh4-025");
    assert!(!result.outcome.used_full_scan);
}

#[test]
fn test_results_always_sorted_by_score() {
    let identifier = build_identifier(generate_catalog(300));
    let scans = [
        "Charizard VMAX\n025/185\nswsh4\n330 HP",
        "Charmander\n004/102",
        "Eeve\n",
        "Mew ex\n151/165",
        "Totally unknown card\n999/999",
        "",
    ];
    for scan in scans {
        let result = identifier.identify(scan, Game::Pokemon, None);
        let scores: Vec<u32> = result.outcome.candidates.iter().map(|c| c.score).collect();
        assert!(
            scores.windows(2).all(|w| w[0] >= w[1]),
            "unsorted results for {scan:?}: {scores:?}"
        );
        let positions_for_ties = result
            .outcome
            .candidates
            .windows(2)
            .filter(|w| w[0].score == w[1].score)
            .all(|w| w[0].position < w[1].position);
        assert!(positions_for_ties, "ties not in catalog order for {scan:?}");
    }
}

#[test]
fn test_index_never_outperforms_full_scan() {
    let identifier = build_identifier(generate_catalog(300));
    for scan in ["Charzard\n", "Chari\n019/200", "Eev\nHP 70", "Mew\n"] {
        let result = identifier.identify(scan, Game::Pokemon, None);
        if let Some(index_best) = result.outcome.index_best_score {
            if index_best < FULL_SCAN_THRESHOLD {
                assert!(result.outcome.used_full_scan);
                let full_best = result.outcome.best().map_or(0, |c| c.score);
                assert!(full_best >= index_best, "full scan lost for {scan:?}");
            }
        }
    }
}

#[test]
fn test_set_filter_narrows_results() {
    let identifier = build_identifier(generate_catalog(100));
    let result = identifier.identify("Charizard\n", Game::Pokemon, Some("sv1"));
    assert!(!result.outcome.is_empty());
    let catalog = identifier.index().catalog();
    for candidate in &result.outcome.candidates {
        assert_eq!(catalog.at(candidate.position).unwrap().set_code, "sv1");
    }
}

#[test]
fn test_empty_catalog_is_not_an_error() {
    let identifier = build_identifier(Vec::new());
    let result = identifier.identify("Charizard VMAX\n025/185", Game::Pokemon, None);
    assert!(result.outcome.is_empty());
    assert_eq!(result.metadata.name, "Charizard VMAX");
}

#[test]
fn test_parser_learns_catalog_set_codes() {
    let mut card = create_test_card("one-1", "Elesh Norn", "ONE", "1", None);
    card.game = Game::Mtg;
    let identifier = build_identifier(vec![card]);

    let meta = identifier.parser(Game::Mtg).parse("Elesh Norn\n0001/271 M\nONE • EN");
    assert_eq!(meta.set_code, "one");

    let result = identifier.identify("Elesh Norn\n0001/271 M\nONE • EN", Game::Mtg, None);
    assert_eq!(result.outcome.best().unwrap().card_id, "one-1");
}

#[test]
fn test_identify_with_catalog_file() {
    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    write!(
        tmp,
        r#"[
            {{"id": "swsh4-025", "game": "pokemon", "name": "Charizard VMAX", "set_code": "swsh4", "number": "025"}},
            {{"id": "swsh4-020", "game": "pokemon", "name": "Charizard V", "set_code": "swsh4", "number": "019"}}
        ]"#
    )
    .unwrap();

    let catalog = Catalog::load_json(tmp.path()).unwrap();
    let identifier = Identifier::new(CardIndex::build(Arc::new(catalog)));
    let result = identifier.identify("Charizard V\n019/185", Game::Pokemon, None);
    assert_eq!(result.outcome.best().unwrap().card_id, "swsh4-020");
}
