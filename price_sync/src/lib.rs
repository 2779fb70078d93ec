//! Price Sync - card price resolution and background refresh
//!
//! Caches per-condition price rows in SQLite, resolves a displayed price
//! for any (condition, printing, language) through an ordered fallback
//! chain, and keeps the cache fresh with a quota-aware refresh scheduler.

pub mod database;
pub mod error;
pub mod pricing;
pub mod queue;
pub mod quota;
pub mod resolver;
pub mod scheduler;

pub use database::{CardState, PriceStore};
pub use error::{Result, SyncError};
pub use pricing::{
    BatchPrices, DiscoveryGroup, JustTcgClient, PriceLookup, PricingError, PricingSource,
    SetDirectory,
};
pub use queue::{RefreshQueue, RefreshRequest, RefreshTier};
pub use quota::{QuotaState, QuotaStatus};
pub use resolver::{
    all_condition_prices, is_stale, resolve, resolve_with_base, BasePrices, PriceKey, PriceTier,
    Provenance, ResolvedPrice,
};
pub use scheduler::{
    CycleReport, RefreshPhase, RefreshScheduler, RefreshStats, RefreshStatus, SchedulerConfig,
    UnmatchedCard,
};
