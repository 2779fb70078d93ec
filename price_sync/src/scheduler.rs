//! Background price refresh
//!
//! Each cycle checks the request quota, tops the queue up from the store,
//! discovers missing provider ids (one call per set), fetches prices for a
//! batch with a single call and persists the rows card by card.
//!
//! Queue, quota, phase and statistics share one `std::sync::Mutex` that is
//! only taken between awaits. Cycles and [`RefreshScheduler::refresh_now`]
//! are serialized by an async gate.

use crate::database::PriceStore;
use crate::error::{Result, SyncError};
use crate::pricing::{DiscoveryGroup, PriceLookup, PricingError, PricingSource};
use crate::queue::{RefreshQueue, RefreshTier};
use crate::quota::{QuotaState, QuotaStatus, DEFAULT_DAILY_LIMIT, DEFAULT_MONTHLY_LIMIT};
use crate::resolver::{BasePrices, STALE_AFTER_HOURS};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tcg_common::{Card, Catalog, PriceRow};
use tokio_util::sync::CancellationToken;

/// Cards per batch price call when nothing else is configured
pub const DEFAULT_BATCH_SIZE: usize = 20;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between cycles
    pub interval: Duration,
    /// Most cards taken off the queue per cycle
    pub batch_size: usize,
    /// Pause before the loop restarts after a panic
    pub restart_delay: Duration,
    /// Age after which cached prices are refreshed again
    pub stale_after: chrono::Duration,
    pub daily_limit: u32,
    pub monthly_limit: u32,
    /// Timezone whose calendar days and months bound the quota
    pub timezone: Tz,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            batch_size: DEFAULT_BATCH_SIZE,
            restart_delay: Duration::from_secs(30),
            stale_after: chrono::Duration::hours(STALE_AFTER_HOURS),
            daily_limit: DEFAULT_DAILY_LIMIT,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            timezone: Tz::UTC,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPhase {
    Idle,
    CheckingQuota,
    Discovering,
    Batching,
    Persisting,
    Stopped,
}

/// Running totals since start
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshStats {
    pub cycles: u64,
    pub skipped_for_quota: u64,
    pub discovery_calls: u64,
    pub batch_calls: u64,
    pub cards_updated: u64,
    pub rows_written: u64,
    pub panics: u64,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Card whose set was listed successfully but did not contain it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedCard {
    pub card_id: String,
    pub name: String,
    pub number: String,
    pub group: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshStatus {
    pub phase: RefreshPhase,
    pub queue_len: usize,
    pub quota: QuotaStatus,
    pub stats: RefreshStats,
    pub unmatched: Vec<UnmatchedCard>,
}

/// Outcome of one cycle or immediate refresh
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CycleReport {
    pub skipped_for_quota: bool,
    pub dequeued: usize,
    pub discovery_calls: usize,
    pub discovered: usize,
    pub unmatched: usize,
    /// Cards absent from a truncated set listing, retried next cycle
    pub unresolved: usize,
    pub cards_updated: usize,
    pub rows_written: usize,
}

struct SchedulerState {
    queue: RefreshQueue,
    quota: QuotaState,
    phase: RefreshPhase,
    stats: RefreshStats,
    unmatched: BTreeMap<String, UnmatchedCard>,
}

pub struct RefreshScheduler {
    catalog: Arc<Catalog>,
    store: PriceStore,
    source: Arc<dyn PricingSource>,
    config: SchedulerConfig,
    state: Mutex<SchedulerState>,
    gate: tokio::sync::Mutex<()>,
}

impl RefreshScheduler {
    pub fn new(
        catalog: Arc<Catalog>,
        store: PriceStore,
        source: Arc<dyn PricingSource>,
        config: SchedulerConfig,
    ) -> Self {
        let quota = QuotaState::new(
            config.daily_limit,
            config.monthly_limit,
            config.timezone,
            Utc::now(),
        );
        Self {
            catalog,
            store,
            source,
            config,
            state: Mutex::new(SchedulerState {
                queue: RefreshQueue::new(),
                quota,
                phase: RefreshPhase::Idle,
                stats: RefreshStats::default(),
                unmatched: BTreeMap::new(),
            }),
            gate: tokio::sync::Mutex::new(()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: RefreshPhase) {
        self.state().phase = phase;
    }

    fn card(&self, card_id: &str) -> Result<&Card> {
        self.catalog
            .get(card_id)
            .ok_or_else(|| SyncError::UnknownCard(card_id.to_string()))
    }

    /// Queue a catalog card for refresh and start tracking it.
    /// Returns the card's position in the queue (0 = next).
    pub fn enqueue(&self, card_id: &str, tier: RefreshTier) -> Result<usize> {
        let card = self.card(card_id)?;
        if self.store.track_card(card_id, card.external_id.as_deref())? {
            debug!("Now tracking {}", card_id);
        }
        let position = self.state().queue.enqueue(card_id, tier, Utc::now());
        debug!("Queued {} as {:?} at position {}", card_id, tier, position);
        Ok(position)
    }

    pub fn queue_len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn quota_status(&self) -> QuotaStatus {
        let mut state = self.state();
        state.quota.roll(Utc::now());
        state.quota.status()
    }

    pub fn status(&self) -> RefreshStatus {
        let mut state = self.state();
        state.quota.roll(Utc::now());
        RefreshStatus {
            phase: state.phase,
            queue_len: state.queue.len(),
            quota: state.quota.status(),
            stats: state.stats.clone(),
            unmatched: state.unmatched.values().cloned().collect(),
        }
    }

    /// Forget an unmatched card so the store top-up picks it up again
    pub fn clear_unmatched(&self, card_id: &str) -> bool {
        self.state().unmatched.remove(card_id).is_some()
    }

    /// Run one refresh cycle
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let _gate = self.gate.lock().await;
        let now = Utc::now();

        if !self.check_quota(now) {
            return Ok(CycleReport {
                skipped_for_quota: true,
                ..CycleReport::default()
            });
        }

        let result = match self.top_up(now) {
            Ok(()) => {
                let batch: Vec<String> = self
                    .state()
                    .queue
                    .pop_batch(self.config.batch_size)
                    .into_iter()
                    .map(|r| r.card_id)
                    .collect();
                self.refresh_cards(&batch, now).await
            }
            Err(e) => Err(e),
        };
        self.finish_cycle(&result, now);
        result
    }

    /// Refresh one card right away, outside the queue order.
    ///
    /// Without quota the card is queued as user-requested instead, and so
    /// is a card the refresh could not price for any reason other than
    /// being absent from its provider set.
    pub async fn refresh_now(&self, card_id: &str) -> Result<CycleReport> {
        let card = self.card(card_id)?;
        let _gate = self.gate.lock().await;
        let now = Utc::now();

        if !self.check_quota(now) {
            self.enqueue(card_id, RefreshTier::UserRequested)?;
            return Ok(CycleReport {
                skipped_for_quota: true,
                ..CycleReport::default()
            });
        }

        if self.store.track_card(card_id, card.external_id.as_deref())? {
            debug!("Now tracking {}", card_id);
        }
        self.state().queue.remove(card_id);
        let result = self.refresh_cards(&[card_id.to_string()], now).await;
        self.finish_cycle(&result, now);

        let priced = matches!(&result, Ok(report) if report.cards_updated > 0);
        if !priced && !self.state().unmatched.contains_key(card_id) {
            let position = self.enqueue(card_id, RefreshTier::UserRequested)?;
            info!(
                "Refresh of {} did not complete, queued at position {}",
                card_id, position
            );
        }
        result
    }

    fn check_quota(&self, now: DateTime<Utc>) -> bool {
        let mut state = self.state();
        state.phase = RefreshPhase::CheckingQuota;
        state.quota.roll(now);
        if state.quota.is_exhausted() {
            debug!(
                "Pricing quota exhausted until {}, skipping refresh ({} queued)",
                state.quota.reset_at(),
                state.queue.len()
            );
            state.stats.skipped_for_quota += 1;
            state.phase = RefreshPhase::Idle;
            return false;
        }
        true
    }

    /// Queue tracked cards that were never priced or have gone stale.
    /// Unmatched cards are left out until cleared or requested by a user.
    fn top_up(&self, now: DateTime<Utc>) -> Result<()> {
        let limit = self.config.batch_size;
        let missing = self.store.cards_missing_prices(limit)?;
        let stale = self.store.stale_cards(now - self.config.stale_after, limit)?;

        let mut state = self.state();
        let mut added = 0;
        for (ids, tier) in [
            (missing, RefreshTier::MissingPrice),
            (stale, RefreshTier::StalePrice),
        ] {
            for card_id in ids {
                if state.unmatched.contains_key(&card_id) || state.queue.contains(&card_id) {
                    continue;
                }
                if self.catalog.get(&card_id).is_none() {
                    warn!("Tracked card {} is not in the catalog", card_id);
                    continue;
                }
                state.queue.enqueue(&card_id, tier, now);
                added += 1;
            }
        }
        if added > 0 {
            debug!("Queued {} tracked cards from the store", added);
        }
        Ok(())
    }

    async fn refresh_cards(&self, card_ids: &[String], now: DateTime<Utc>) -> Result<CycleReport> {
        let mut report = CycleReport {
            dequeued: card_ids.len(),
            ..CycleReport::default()
        };
        if card_ids.is_empty() {
            debug!("Refresh queue is empty");
            return Ok(report);
        }

        let mut lookups = Vec::new();
        let mut groups: BTreeMap<String, (DiscoveryGroup, Vec<&Card>)> = BTreeMap::new();
        for card_id in card_ids {
            let Some(card) = self.catalog.get(card_id) else {
                warn!("Skipping unknown card {}", card_id);
                continue;
            };
            let stored = self.store.card_state(card_id)?.and_then(|s| s.external_id);
            match stored.or_else(|| card.external_id.clone()) {
                Some(external_id) => lookups.push(PriceLookup {
                    card_id: card.id.clone(),
                    external_id,
                }),
                None => groups
                    .entry(card.group_key().to_string())
                    .or_insert_with(|| (DiscoveryGroup::for_card(card), Vec::new()))
                    .1
                    .push(card),
            }
        }

        if !groups.is_empty() {
            self.set_phase(RefreshPhase::Discovering);
            self.discover(groups, now, &mut lookups, &mut report).await?;
        }

        if lookups.is_empty() {
            debug!("No cards with provider ids to price");
            return Ok(report);
        }

        self.set_phase(RefreshPhase::Batching);
        if !self.state().quota.try_consume(now) {
            debug!("Quota spent during discovery, {} cards wait", lookups.len());
            return Ok(report);
        }
        let fetched = self.source.fetch_batch_prices(&lookups).await;
        {
            let mut state = self.state();
            state.stats.batch_calls += 1;
            match &fetched {
                Ok(batch) => {
                    if let Some(remaining) = batch.daily_remaining {
                        state.quota.observe_remaining(remaining);
                    }
                }
                Err(e) if e.is_quota() => state.quota.exhaust(now),
                Err(_) => {}
            }
        }
        let batch = fetched?;

        self.set_phase(RefreshPhase::Persisting);
        for lookup in &lookups {
            let rows: Vec<PriceRow> = batch.rows_for(&lookup.card_id).cloned().collect();
            let Some(card) = self.catalog.get(&lookup.card_id) else {
                continue;
            };
            let previous = self.store.card_state(&card.id)?.and_then(|s| s.base);
            let base = BasePrices::from_card(card)
                .overlay(previous)
                .with_near_mint_rows(&rows);
            report.rows_written += self.store.upsert_card_prices(&card.id, &rows, base, now)?;
            report.cards_updated += 1;
        }

        info!(
            "Refreshed {} cards ({} rows, {} ids discovered)",
            report.cards_updated, report.rows_written, report.discovered
        );
        Ok(report)
    }

    /// One discovery call per group. Failed groups are skipped for this
    /// cycle; a quota rejection stops discovery altogether.
    async fn discover(
        &self,
        groups: BTreeMap<String, (DiscoveryGroup, Vec<&Card>)>,
        now: DateTime<Utc>,
        lookups: &mut Vec<PriceLookup>,
        report: &mut CycleReport,
    ) -> Result<()> {
        for (key, (group, cards)) in groups {
            if !self.state().quota.try_consume(now) {
                debug!("No quota left to discover group {}", key);
                break;
            }
            report.discovery_calls += 1;
            let listed = self.source.resolve_external_ids(&group).await;
            self.state().stats.discovery_calls += 1;

            let directory = match listed {
                Ok(directory) => directory,
                Err(PricingError::QuotaExceeded) => {
                    warn!("Provider rejected discovery for {}: quota exceeded", key);
                    self.state().quota.exhaust(now);
                    break;
                }
                Err(e) => {
                    warn!("Discovery failed for group {}: {} (will retry)", key, e);
                    continue;
                }
            };

            for card in cards {
                match directory.lookup(card) {
                    Some(external_id) => {
                        self.store.set_external_id(&card.id, external_id)?;
                        self.state().unmatched.remove(&card.id);
                        debug!("Discovered provider id {} for {}", external_id, card.name);
                        report.discovered += 1;
                        lookups.push(PriceLookup {
                            card_id: card.id.clone(),
                            external_id: external_id.to_string(),
                        });
                    }
                    None if directory.is_truncated() => {
                        warn!(
                            "Card {} (#{}) not in the partial listing of group {} (will retry)",
                            card.name, card.number, key
                        );
                        report.unresolved += 1;
                    }
                    None => {
                        error!(
                            "Unmatched card {} (#{}) in group {}",
                            card.name, card.number, key
                        );
                        report.unmatched += 1;
                        self.state().unmatched.insert(
                            card.id.clone(),
                            UnmatchedCard {
                                card_id: card.id.clone(),
                                name: card.name.clone(),
                                number: card.number.clone(),
                                group: key.clone(),
                                reason: "not listed in the provider's set".to_string(),
                            },
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn finish_cycle(&self, result: &Result<CycleReport>, now: DateTime<Utc>) {
        let mut state = self.state();
        state.phase = RefreshPhase::Idle;
        state.stats.cycles += 1;
        state.stats.last_cycle_at = Some(now);
        match result {
            Ok(report) => {
                state.stats.cards_updated += report.cards_updated as u64;
                state.stats.rows_written += report.rows_written as u64;
                state.stats.last_error = None;
            }
            Err(e) => state.stats.last_error = Some(e.to_string()),
        }
    }

    /// Run cycles on the configured interval until `cancel` fires.
    ///
    /// A panicking cycle is logged and the loop restarts after
    /// `restart_delay`.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            "Price refresh running every {}s (batch size {})",
            self.config.interval.as_secs(),
            self.config.batch_size
        );

        loop {
            let outcome = AssertUnwindSafe(self.run_until_cancelled(&cancel))
                .catch_unwind()
                .await;
            match outcome {
                Ok(()) => break,
                Err(panic) => {
                    error!("Price refresh loop panicked: {}", panic_message(&*panic));
                    self.state().stats.panics += 1;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.restart_delay) => {
                            info!("Restarting price refresh loop");
                        }
                    }
                }
            }
        }

        self.set_phase(RefreshPhase::Stopped);
        info!("Price refresh stopped");
    }

    async fn run_until_cancelled(&self, cancel: &CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        error!("Price refresh cycle failed: {}", e);
                    }
                }
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
