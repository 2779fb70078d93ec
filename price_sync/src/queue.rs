//! Three-tier refresh queue of distinct card ids

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Refresh priority; higher variants are served first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshTier {
    StalePrice,
    MissingPrice,
    UserRequested,
}

impl RefreshTier {
    /// Highest priority first
    pub fn descending() -> [RefreshTier; 3] {
        [
            RefreshTier::UserRequested,
            RefreshTier::MissingPrice,
            RefreshTier::StalePrice,
        ]
    }

    fn slot(self) -> usize {
        match self {
            RefreshTier::UserRequested => 0,
            RefreshTier::MissingPrice => 1,
            RefreshTier::StalePrice => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshRequest {
    pub card_id: String,
    pub tier: RefreshTier,
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO per tier, each card id present at most once at its highest tier
#[derive(Debug, Default)]
pub struct RefreshQueue {
    tiers: [VecDeque<RefreshRequest>; 3],
    index: HashMap<String, RefreshTier>,
}

impl RefreshQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a card and return its overall position (0 = next).
    ///
    /// A card already queued at the same or a higher tier stays where it
    /// is; one queued lower moves up and keeps its original enqueue time.
    pub fn enqueue(&mut self, card_id: &str, tier: RefreshTier, now: DateTime<Utc>) -> usize {
        let request = match self.index.get(card_id).copied() {
            Some(current) if current >= tier => {
                return self.position(card_id).unwrap_or(0);
            }
            Some(current) => {
                let lane = &mut self.tiers[current.slot()];
                let mut existing = lane
                    .iter()
                    .position(|r| r.card_id == card_id)
                    .and_then(|idx| lane.remove(idx))
                    .unwrap_or_else(|| RefreshRequest {
                        card_id: card_id.to_string(),
                        tier,
                        enqueued_at: now,
                    });
                log::debug!("Upgrading {} from {:?} to {:?}", card_id, current, tier);
                existing.tier = tier;
                existing
            }
            None => RefreshRequest {
                card_id: card_id.to_string(),
                tier,
                enqueued_at: now,
            },
        };

        self.index.insert(card_id.to_string(), tier);
        self.tiers[tier.slot()].push_back(request);
        self.position(card_id).unwrap_or(0)
    }

    /// Remove up to `max` requests, highest tier first, FIFO within a tier
    pub fn pop_batch(&mut self, max: usize) -> Vec<RefreshRequest> {
        let mut batch = Vec::with_capacity(max.min(self.len()));
        for tier in RefreshTier::descending() {
            let lane = &mut self.tiers[tier.slot()];
            while batch.len() < max {
                let Some(request) = lane.pop_front() else {
                    break;
                };
                self.index.remove(&request.card_id);
                batch.push(request);
            }
        }
        batch
    }

    /// Drop a queued card; false when it was not queued
    pub fn remove(&mut self, card_id: &str) -> bool {
        let Some(tier) = self.index.remove(card_id) else {
            return false;
        };
        self.tiers[tier.slot()].retain(|r| r.card_id != card_id);
        true
    }

    /// Overall position of a queued card
    pub fn position(&self, card_id: &str) -> Option<usize> {
        let tier = *self.index.get(card_id)?;
        let ahead: usize = self.tiers[..tier.slot()].iter().map(VecDeque::len).sum();
        self.tiers[tier.slot()]
            .iter()
            .position(|r| r.card_id == card_id)
            .map(|idx| ahead + idx)
    }

    pub fn tier_of(&self, card_id: &str) -> Option<RefreshTier> {
        self.index.get(card_id).copied()
    }

    pub fn contains(&self, card_id: &str) -> bool {
        self.index.contains_key(card_id)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of queued cards at a tier
    pub fn tier_len(&self, tier: RefreshTier) -> usize {
        self.tiers[tier.slot()].len()
    }
}
