//! Tests for the refresh scheduler with an in-process pricing source

use super::*;
use crate::pricing::{BatchPrices, SetDirectory};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use tcg_common::{Condition, Game, Language, Printing};

#[derive(Default)]
struct FakeSource {
    /// group key -> (number, name, external id)
    sets: HashMap<String, Vec<(&'static str, &'static str, &'static str)>>,
    /// groups whose listing stops before the last card
    partial_groups: HashSet<String>,
    failing_groups: HashSet<String>,
    /// external id -> (condition, printing, price)
    prices: HashMap<String, Vec<(Condition, Printing, f64)>>,
    reject_batches: bool,
    daily_remaining: Option<u32>,
    panics_left: AtomicUsize,
    discovery_calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl FakeSource {
    fn with_set(mut self, key: &str, cards: Vec<(&'static str, &'static str, &'static str)>) -> Self {
        self.sets.insert(key.to_string(), cards);
        self
    }

    fn with_price(mut self, external_id: &str, printing: Printing, price: f64) -> Self {
        self.prices
            .entry(external_id.to_string())
            .or_default()
            .push((Condition::NearMint, printing, price));
        self
    }

    fn discoveries(&self) -> usize {
        self.discovery_calls.load(Ordering::SeqCst)
    }

    fn batches(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PricingSource for FakeSource {
    async fn resolve_external_ids(&self, group: &DiscoveryGroup) -> std::result::Result<SetDirectory, PricingError> {
        self.discovery_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("provider exploded");
        }
        if self.failing_groups.contains(&group.key) {
            return Err(PricingError::Transient("connection reset".to_string()));
        }
        let cards = self
            .sets
            .get(&group.key)
            .ok_or_else(|| PricingError::Api(format!("unknown set {}", group.key)))?;

        let mut directory = SetDirectory::new();
        for (number, name, id) in cards {
            directory.insert(number, name, id);
        }
        if self.partial_groups.contains(&group.key) {
            directory.mark_truncated();
        }
        Ok(directory)
    }

    async fn fetch_batch_prices(&self, lookups: &[PriceLookup]) -> std::result::Result<BatchPrices, PricingError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_batches {
            return Err(PricingError::QuotaExceeded);
        }
        let rows = lookups
            .iter()
            .flat_map(|lookup| {
                self.prices
                    .get(&lookup.external_id)
                    .into_iter()
                    .flatten()
                    .map(move |(condition, printing, price)| PriceRow {
                        card_id: lookup.card_id.clone(),
                        condition: *condition,
                        printing: *printing,
                        language: Language::English,
                        price_usd: *price,
                        source: "fake".to_string(),
                        updated_at: Utc::now(),
                    })
            })
            .collect();
        Ok(BatchPrices {
            rows,
            daily_remaining: self.daily_remaining,
        })
    }
}

fn card(id: &str, set_name: &str, number: &str, name: &str, external_id: Option<&str>) -> Card {
    Card {
        id: id.to_string(),
        game: Game::Pokemon,
        name: name.to_string(),
        set_code: String::new(),
        set_name: set_name.to_string(),
        number: number.to_string(),
        rarity: String::new(),
        hp: None,
        finishes: vec![Printing::Normal],
        external_id: external_id.map(str::to_string),
        price_usd: 0.0,
        price_foil_usd: 0.0,
    }
}

fn test_catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::from_cards(vec![
            card("vv-25", "Vivid Voltage", "025", "Pikachu", None),
            card("vv-26", "Vivid Voltage", "026", "Raichu", None),
            card("vv-44", "Vivid Voltage", "044", "Zapdos", None),
            card("be-1", "Brilliant Stars", "1", "Exeggcute", None),
            card("known", "Evolving Skies", "7", "Eevee", Some("900")),
        ])
        .unwrap(),
    )
}

fn full_source() -> FakeSource {
    FakeSource::default()
        .with_set(
            "Vivid Voltage",
            vec![("25", "Pikachu", "100"), ("26", "Raichu", "101"), ("44", "Zapdos", "102")],
        )
        .with_set("Brilliant Stars", vec![("1", "Exeggcute", "200")])
        .with_price("100", Printing::Normal, 1.5)
        .with_price("100", Printing::ReverseHolofoil, 3.0)
        .with_price("101", Printing::Normal, 0.5)
        .with_price("102", Printing::Normal, 2.0)
        .with_price("200", Printing::Normal, 0.25)
        .with_price("900", Printing::Normal, 4.0)
}

fn config(daily_limit: u32) -> SchedulerConfig {
    SchedulerConfig {
        interval: Duration::from_millis(20),
        restart_delay: Duration::from_millis(10),
        daily_limit,
        ..SchedulerConfig::default()
    }
}

fn scheduler(source: Arc<FakeSource>, daily_limit: u32) -> (RefreshScheduler, PriceStore) {
    let store = PriceStore::open_in_memory().unwrap();
    let scheduler = RefreshScheduler::new(test_catalog(), store.clone(), source, config(daily_limit));
    (scheduler, store)
}

// ── Quota ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn exhausted_quota_makes_no_calls_and_keeps_queue() {
    let source = Arc::new(full_source());
    let (scheduler, _store) = scheduler(source.clone(), 0);
    scheduler.enqueue("vv-25", RefreshTier::UserRequested).unwrap();
    scheduler.enqueue("known", RefreshTier::MissingPrice).unwrap();

    let report = scheduler.run_cycle().await.unwrap();

    assert!(report.skipped_for_quota);
    assert_eq!(source.discoveries(), 0);
    assert_eq!(source.batches(), 0);
    assert_eq!(scheduler.queue_len(), 2);
    assert_eq!(scheduler.status().stats.skipped_for_quota, 1);
    assert_eq!(scheduler.status().phase, RefreshPhase::Idle);
}

#[tokio::test]
async fn provider_quota_rejection_exhausts_local_quota() {
    let source = Arc::new(FakeSource {
        reject_batches: true,
        ..full_source()
    });
    let (scheduler, _store) = scheduler(source.clone(), 100);
    scheduler.enqueue("known", RefreshTier::UserRequested).unwrap();

    let err = scheduler.run_cycle().await.unwrap_err();
    assert!(matches!(err, SyncError::Pricing(PricingError::QuotaExceeded)));
    assert_eq!(scheduler.quota_status().remaining, 0);
    assert!(scheduler.status().stats.last_error.is_some());

    let report = scheduler.run_cycle().await.unwrap();
    assert!(report.skipped_for_quota);
    assert_eq!(source.batches(), 1);
}

#[tokio::test]
async fn provider_reported_remaining_tightens_quota() {
    let source = Arc::new(FakeSource {
        daily_remaining: Some(5),
        ..full_source()
    });
    let (scheduler, _store) = scheduler(source, 100);
    scheduler.enqueue("known", RefreshTier::UserRequested).unwrap();

    scheduler.run_cycle().await.unwrap();
    assert_eq!(scheduler.quota_status().remaining, 5);
}

#[tokio::test]
async fn each_call_consumes_one_unit() {
    let source = Arc::new(full_source());
    let (scheduler, _store) = scheduler(source, 100);
    for id in ["vv-25", "be-1", "known"] {
        scheduler.enqueue(id, RefreshTier::UserRequested).unwrap();
    }

    scheduler.run_cycle().await.unwrap();
    // Two discovery calls and one batch call
    assert_eq!(scheduler.quota_status().remaining, 97);
}

// ── Discovery ─────────────────────────────────────────────────────────

#[tokio::test]
async fn one_discovery_call_per_group() {
    let source = Arc::new(full_source());
    let (scheduler, store) = scheduler(source.clone(), 100);
    for id in ["vv-25", "vv-26", "vv-44", "be-1"] {
        scheduler.enqueue(id, RefreshTier::MissingPrice).unwrap();
    }

    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(source.discoveries(), 2);
    assert_eq!(source.batches(), 1);
    assert_eq!(report.discovered, 4);
    assert_eq!(report.cards_updated, 4);
    assert_eq!(
        store.card_state("vv-25").unwrap().unwrap().external_id.as_deref(),
        Some("100")
    );
    assert_eq!(store.get_rows("vv-25").unwrap().len(), 2);
}

#[tokio::test]
async fn known_ids_skip_discovery() {
    let source = Arc::new(full_source());
    let (scheduler, store) = scheduler(source.clone(), 100);
    scheduler.enqueue("known", RefreshTier::UserRequested).unwrap();

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(source.discoveries(), 0);
    assert_eq!(report.cards_updated, 1);
    assert_eq!(store.get_rows("known").unwrap()[0].price_usd, 4.0);
}

#[tokio::test]
async fn partial_discovery_failure_still_fetches_resolved_ids() {
    let mut source = full_source();
    source.failing_groups.insert("Vivid Voltage".to_string());
    let source = Arc::new(source);
    let (scheduler, store) = scheduler(source.clone(), 100);
    for id in ["vv-25", "vv-26", "be-1", "known"] {
        scheduler.enqueue(id, RefreshTier::MissingPrice).unwrap();
    }

    let report = scheduler.run_cycle().await.unwrap();

    assert_eq!(source.discoveries(), 2);
    assert_eq!(source.batches(), 1);
    assert_eq!(report.cards_updated, 2);
    assert!(store.get_rows("vv-25").unwrap().is_empty());
    assert!(store.get_rows("be-1").unwrap().len() == 1);
    // Transient failures are not unmatched cards
    assert!(scheduler.status().unmatched.is_empty());
}

#[tokio::test]
async fn cards_missing_from_their_set_are_unmatched() {
    let source = Arc::new(
        FakeSource::default()
            .with_set("Vivid Voltage", vec![("25", "Pikachu", "100")])
            .with_price("100", Printing::Normal, 1.5),
    );
    let (scheduler, _store) = scheduler(source.clone(), 100);
    scheduler.enqueue("vv-25", RefreshTier::MissingPrice).unwrap();
    scheduler.enqueue("vv-44", RefreshTier::MissingPrice).unwrap();

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.unmatched, 1);
    let unmatched = scheduler.status().unmatched;
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].card_id, "vv-44");
    assert_eq!(unmatched[0].group, "Vivid Voltage");

    // Not picked up again from the store while unmatched
    scheduler.run_cycle().await.unwrap();
    assert_eq!(source.discoveries(), 1);

    assert!(scheduler.clear_unmatched("vv-44"));
    scheduler.run_cycle().await.unwrap();
    assert_eq!(source.discoveries(), 2);
}

#[tokio::test]
async fn cards_missing_from_a_partial_listing_stay_tracked() {
    let mut source = FakeSource::default()
        .with_set("Vivid Voltage", vec![("25", "Pikachu", "100")])
        .with_price("100", Printing::Normal, 1.5);
    source.partial_groups.insert("Vivid Voltage".to_string());
    let source = Arc::new(source);
    let (scheduler, _store) = scheduler(source.clone(), 100);
    scheduler.enqueue("vv-25", RefreshTier::MissingPrice).unwrap();
    scheduler.enqueue("vv-44", RefreshTier::MissingPrice).unwrap();

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.discovered, 1);
    assert_eq!(report.unmatched, 0);
    assert_eq!(report.unresolved, 1);
    assert!(scheduler.status().unmatched.is_empty());

    // Still missing prices, so the store top-up brings it back
    let next = scheduler.run_cycle().await.unwrap();
    assert_eq!(next.dequeued, 1);
    assert_eq!(source.discoveries(), 2);
}

// ── Persisting ────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_updates_base_scalars() {
    let source = Arc::new(full_source());
    let (scheduler, store) = scheduler(source, 100);
    scheduler.enqueue("vv-25", RefreshTier::UserRequested).unwrap();

    scheduler.run_cycle().await.unwrap();

    let state = store.card_state("vv-25").unwrap().unwrap();
    assert_eq!(
        state.base,
        Some(BasePrices {
            normal: 1.5,
            foil: 3.0
        })
    );
    assert!(state.price_updated_at.is_some());
}

#[tokio::test]
async fn empty_price_response_still_marks_card_refreshed() {
    let source = Arc::new(FakeSource::default());
    let (scheduler, store) = scheduler(source.clone(), 100);
    scheduler.enqueue("known", RefreshTier::MissingPrice).unwrap();

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.cards_updated, 1);
    assert_eq!(report.rows_written, 0);
    assert!(store.cards_missing_prices(10).unwrap().is_empty());

    scheduler.run_cycle().await.unwrap();
    assert_eq!(source.batches(), 1);
}

#[tokio::test]
async fn stale_cards_are_refreshed_from_the_store() {
    let source = Arc::new(full_source());
    let (scheduler, store) = scheduler(source.clone(), 100);
    store.track_card("known", Some("900")).unwrap();
    store
        .upsert_card_prices(
            "known",
            &[],
            BasePrices::default(),
            Utc::now() - chrono::Duration::hours(48),
        )
        .unwrap();

    let report = scheduler.run_cycle().await.unwrap();
    assert_eq!(report.dequeued, 1);
    assert_eq!(report.cards_updated, 1);
    assert_eq!(source.batches(), 1);
}

// ── Queue and immediate refresh ───────────────────────────────────────

#[tokio::test]
async fn enqueue_rejects_unknown_cards() {
    let (scheduler, _store) = scheduler(Arc::new(full_source()), 100);
    let err = scheduler.enqueue("nope", RefreshTier::UserRequested).unwrap_err();
    assert!(matches!(err, SyncError::UnknownCard(_)));
}

#[tokio::test]
async fn enqueue_reports_position_by_priority() {
    let (scheduler, store) = scheduler(Arc::new(full_source()), 100);
    assert_eq!(scheduler.enqueue("vv-25", RefreshTier::StalePrice).unwrap(), 0);
    assert_eq!(scheduler.enqueue("vv-26", RefreshTier::UserRequested).unwrap(), 0);
    assert_eq!(scheduler.enqueue("vv-25", RefreshTier::StalePrice).unwrap(), 1);
    assert_eq!(scheduler.queue_len(), 2);
    assert_eq!(store.tracked_count().unwrap(), 2);
}

#[tokio::test]
async fn refresh_now_prices_one_card() {
    let source = Arc::new(full_source());
    let (scheduler, store) = scheduler(source.clone(), 100);
    scheduler.enqueue("vv-26", RefreshTier::MissingPrice).unwrap();
    scheduler.enqueue("known", RefreshTier::StalePrice).unwrap();

    let report = scheduler.refresh_now("known").await.unwrap();

    assert_eq!(report.cards_updated, 1);
    assert_eq!(source.discoveries(), 0);
    assert_eq!(scheduler.queue_len(), 1);
    assert_eq!(store.get_rows("known").unwrap().len(), 1);
}

#[tokio::test]
async fn refresh_now_without_quota_queues_the_card() {
    let source = Arc::new(full_source());
    let (scheduler, _store) = scheduler(source.clone(), 0);

    let report = scheduler.refresh_now("vv-25").await.unwrap();
    assert!(report.skipped_for_quota);
    assert_eq!(source.batches(), 0);
    assert_eq!(scheduler.queue_len(), 1);
}

#[tokio::test]
async fn refresh_now_keeps_card_when_discovery_fails() {
    let mut source = full_source();
    source.failing_groups.insert("Vivid Voltage".to_string());
    let source = Arc::new(source);
    let (scheduler, store) = scheduler(source.clone(), 100);

    let report = scheduler.refresh_now("vv-25").await.unwrap();
    assert_eq!(report.cards_updated, 0);

    assert!(store.card_state("vv-25").unwrap().is_some());
    assert_eq!(scheduler.queue_len(), 1);

    let next = scheduler.run_cycle().await.unwrap();
    assert_eq!(next.dequeued, 1);
    assert_eq!(source.discoveries(), 2);
}

#[tokio::test]
async fn refresh_now_unknown_card() {
    let (scheduler, _store) = scheduler(Arc::new(full_source()), 100);
    assert!(matches!(
        scheduler.refresh_now("nope").await,
        Err(SyncError::UnknownCard(_))
    ));
}

// ── Background loop ───────────────────────────────────────────────────

#[tokio::test]
async fn loop_recovers_from_a_panicking_cycle() {
    let source = Arc::new(FakeSource {
        panics_left: AtomicUsize::new(1),
        ..full_source()
    });
    let (scheduler, store) = scheduler(source.clone(), 100);
    let scheduler = Arc::new(scheduler);
    scheduler.enqueue("vv-25", RefreshTier::UserRequested).unwrap();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.clone().run(cancel.clone()));

    let priced = tokio::time::timeout(Duration::from_secs(5), async {
        while store.get_rows("vv-25").unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    cancel.cancel();
    handle.await.unwrap();

    assert!(priced.is_ok(), "card was never priced after the panic");
    let status = scheduler.status();
    assert_eq!(status.stats.panics, 1);
    assert_eq!(status.phase, RefreshPhase::Stopped);
}

#[tokio::test]
async fn cancelled_loop_stops() {
    let (scheduler, _store) = scheduler(Arc::new(full_source()), 100);
    let scheduler = Arc::new(scheduler);
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(1), scheduler.clone().run(cancel))
        .await
        .unwrap();
    assert_eq!(scheduler.status().phase, RefreshPhase::Stopped);
}
