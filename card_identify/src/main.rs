//! Card Identify - scan text to catalog matches
//!
//! Reads scan text from a file or stdin, matches it against a JSON card
//! catalog and prints the parsed metadata and ranked candidates as JSON.

use card_identify::{CardIndex, Identifier};
use clap::Parser;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tcg_common::{Catalog, Game};

/// Identify a trading card from scanned text
#[derive(Parser, Debug)]
#[command(name = "card_identify")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the card catalog (JSON array of cards)
    #[arg(short, long)]
    catalog: PathBuf,

    /// Game the scan belongs to (pokemon, mtg)
    #[arg(short, long, default_value = "pokemon")]
    game: String,

    /// Restrict matches to one set code
    #[arg(short, long)]
    set: Option<String>,

    /// Maximum number of candidates to print
    #[arg(long, default_value_t = card_identify::DEFAULT_RESULT_LIMIT)]
    limit: usize,

    /// File with the scan text (reads stdin when omitted)
    input: Option<PathBuf>,
}

#[derive(Serialize)]
struct CandidateView<'a> {
    card_id: &'a str,
    name: &'a str,
    set_code: &'a str,
    number: &'a str,
    score: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(&args) {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let game = Game::parse(&args.game).ok_or_else(|| format!("unknown game: {}", args.game))?;

    let text = match &args.input {
        Some(path) => std::fs::read_to_string(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let catalog = Arc::new(Catalog::load_json(&args.catalog)?);
    let index = CardIndex::build(Arc::clone(&catalog)).with_result_limit(args.limit);
    let identifier = Identifier::new(index);
    let result = identifier.identify(&text, game, args.set.as_deref());

    let candidates: Vec<CandidateView> = result
        .outcome
        .candidates
        .iter()
        .filter_map(|c| {
            let card = catalog.at(c.position)?;
            Some(CandidateView {
                card_id: &card.id,
                name: &card.name,
                set_code: &card.set_code,
                number: &card.number,
                score: c.score,
            })
        })
        .collect();

    let output = serde_json::json!({
        "metadata": result.metadata,
        "used_full_scan": result.outcome.used_full_scan,
        "suggested_printing": result.metadata.suggested_printing(),
        "candidates": candidates,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
