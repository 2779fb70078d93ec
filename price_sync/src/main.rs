//! Price Sync - keeps cached card prices fresh
//!
//! Loads the card catalog, opens the SQLite price cache and refreshes prices
//! from JustTCG in the background within the provider's request quota.

use chrono_tz::Tz;
use clap::Parser;
use price_sync::pricing::justtcg::MAX_BATCH_SIZE;
use price_sync::{
    JustTcgClient, PriceKey, PriceStore, RefreshScheduler, RefreshTier, SchedulerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tcg_common::{Catalog, Condition, Language, Printing};
use tokio_util::sync::CancellationToken;

/// Card price cache with quota-aware background refresh
#[derive(Parser, Debug)]
#[command(name = "price_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, default_value_t = default_db_path())]
    database: String,

    /// Card catalog (JSON array of cards)
    #[arg(short, long)]
    catalog: PathBuf,

    /// JustTCG API key
    #[arg(long, env = "JUSTTCG_API_KEY", hide_env_values = true, default_value = "")]
    api_key: String,

    /// Minutes between refresh cycles
    #[arg(long, default_value_t = 15)]
    interval_minutes: u64,

    /// Cards priced per cycle
    #[arg(long, default_value_t = MAX_BATCH_SIZE)]
    batch_size: usize,

    /// Provider requests allowed per day
    #[arg(long, default_value_t = 100)]
    daily_limit: u32,

    /// Provider requests allowed per month
    #[arg(long, default_value_t = 1000)]
    monthly_limit: u32,

    /// Timezone whose midnight resets the request quota
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// Card ids to queue for refresh at startup
    #[arg(long = "track", value_name = "CARD_ID")]
    track: Vec<String>,

    /// Run one cycle and exit (default: run continuously)
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Print the resolved price of one card and exit
    #[arg(long, value_name = "CARD_ID")]
    resolve: Option<String>,

    /// Condition for --resolve (NM, LP, MP, HP, DMG)
    #[arg(long, default_value = "NM")]
    condition: String,

    /// Printing for --resolve (Normal, Foil, 1st Edition, ...)
    #[arg(long, default_value = "Normal")]
    printing: String,

    /// Language for --resolve
    #[arg(long, default_value = "English")]
    language: String,
}

/// Returns the default database path: ~/.local/share/price_sync/prices.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("price_sync")
        .join("prices.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting price_sync...");
    log::info!("Database path: {}", db_path.display());

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create database directory: {}", e);
                std::process::exit(1);
            }
            log::info!("Created directory: {}", parent.display());
        }
    }

    let store = match PriceStore::open(&db_path) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let catalog = match Catalog::load_json(&args.catalog) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            log::error!("Failed to load catalog {}: {}", args.catalog.display(), e);
            std::process::exit(1);
        }
    };
    log::info!("Loaded catalog with {} cards", catalog.len());

    if let Some(card_id) = &args.resolve {
        print_price(&store, &catalog, card_id, &args);
        return;
    }

    let timezone: Tz = match args.timezone.parse() {
        Ok(tz) => tz,
        Err(e) => {
            log::error!("Unknown timezone {}: {}", args.timezone, e);
            std::process::exit(1);
        }
    };

    let batch_size = args.batch_size.clamp(1, MAX_BATCH_SIZE);
    if batch_size != args.batch_size {
        log::warn!("Batch size {} clamped to {}", args.batch_size, batch_size);
    }

    let config = SchedulerConfig {
        interval: Duration::from_secs(args.interval_minutes.max(1) * 60),
        batch_size,
        daily_limit: args.daily_limit,
        monthly_limit: args.monthly_limit,
        timezone,
        ..SchedulerConfig::default()
    };
    let source = Arc::new(JustTcgClient::new(args.api_key.clone()));
    let scheduler = Arc::new(RefreshScheduler::new(catalog, store, source, config));

    for card_id in &args.track {
        match scheduler.enqueue(card_id, RefreshTier::UserRequested) {
            Ok(position) => log::info!("Queued {} at position {}", card_id, position),
            Err(e) => log::warn!("Cannot queue {}: {}", card_id, e),
        }
    }

    if args.once {
        match scheduler.run_cycle().await {
            Ok(report) => log::info!("Cycle finished: {:?}", report),
            Err(e) => {
                log::error!("Cycle failed: {}", e);
                std::process::exit(1);
            }
        }
        let quota = scheduler.quota_status();
        log::info!(
            "Quota remaining: {}/{} (resets {})",
            quota.remaining,
            quota.limit,
            quota.reset_at
        );
        return;
    }

    log::info!(
        "Running in daemon mode, refreshing every {} minute(s)",
        args.interval_minutes
    );
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        log::info!("Shutdown requested");
        shutdown.cancel();
    });

    scheduler.run(cancel).await;
}

/// Resolve one card's price from the cache and print it as JSON
fn print_price(store: &PriceStore, catalog: &Catalog, card_id: &str, args: &Args) {
    let Some(card) = catalog.get(card_id) else {
        log::error!("Card {} is not in the catalog", card_id);
        std::process::exit(1);
    };
    let Some(condition) = Condition::parse(&args.condition) else {
        log::error!("Unknown condition: {}", args.condition);
        std::process::exit(1);
    };
    let Some(printing) = Printing::parse(&args.printing) else {
        log::error!("Unknown printing: {}", args.printing);
        std::process::exit(1);
    };
    let key = PriceKey {
        condition,
        printing,
        language: Language::normalize(&args.language),
    };

    match store.resolve_price(card, key) {
        Ok(resolved) => match serde_json::to_string_pretty(&resolved) {
            Ok(json) => println!("{json}"),
            Err(e) => log::error!("Failed to serialize price: {}", e),
        },
        Err(e) => {
            log::error!("Failed to resolve price: {}", e);
            std::process::exit(1);
        }
    }
}
