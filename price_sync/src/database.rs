//! SQLite price-row store
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Every per-card write runs in one transaction, so readers never see a
//! card half refreshed. The `(card_id, condition, printing, language)`
//! unique index enforces one row per price key.

use crate::error::Result;
use crate::resolver::{resolve_with_base, BasePrices, PriceKey, ResolvedPrice};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tcg_common::{Card, Condition, Language, PriceRow, Printing};

/// Result type for raw database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `price_rows`: one cached price per (card, condition, printing, language)
/// - `tracked_cards`: cards in the collection with their pricing state
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS price_rows (
            card_id TEXT NOT NULL,
            condition TEXT NOT NULL,
            printing TEXT NOT NULL,
            language TEXT NOT NULL,
            price_usd REAL NOT NULL,
            source TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_price_rows_key
            ON price_rows(card_id, condition, printing, language);

        -- Scalar prices mirror the NM rows of the last refresh
        CREATE TABLE IF NOT EXISTS tracked_cards (
            card_id TEXT PRIMARY KEY,
            external_id TEXT,
            price_usd REAL,
            price_foil_usd REAL,
            price_updated_at TEXT,
            added_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_tracked_cards_updated
            ON tracked_cards(price_updated_at);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Insert or update a single price row
pub fn upsert_row(conn: &Connection, row: &PriceRow) -> DbResult<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO price_rows
         (card_id, condition, printing, language, price_usd, source, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(card_id, condition, printing, language) DO UPDATE SET
             price_usd = excluded.price_usd,
             source = excluded.source,
             updated_at = excluded.updated_at",
    )?;
    stmt.execute(params![
        &row.card_id,
        row.condition.as_str(),
        row.printing.as_str(),
        row.language.as_str(),
        row.price_usd,
        &row.source,
        format_timestamp(row.updated_at),
    ])?;
    Ok(())
}

/// Replace a card's refreshed prices atomically
///
/// Upserts every row, then records the refresh time and the scalar base
/// prices on the tracked card. Returns the number of rows written.
pub fn upsert_card_prices(
    conn: &mut Connection,
    card_id: &str,
    rows: &[PriceRow],
    base: BasePrices,
    refreshed_at: DateTime<Utc>,
) -> DbResult<usize> {
    let tx = conn.transaction()?;
    let count = upsert_card_prices_tx(&tx, card_id, rows, base, refreshed_at)?;
    tx.commit()?;
    Ok(count)
}

fn upsert_card_prices_tx(
    tx: &Transaction<'_>,
    card_id: &str,
    rows: &[PriceRow],
    base: BasePrices,
    refreshed_at: DateTime<Utc>,
) -> DbResult<usize> {
    let mut count = 0;
    for row in rows.iter().filter(|r| r.card_id == card_id) {
        upsert_row(tx, row)?;
        count += 1;
    }

    tx.execute(
        "INSERT INTO tracked_cards (card_id, price_usd, price_foil_usd, price_updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(card_id) DO UPDATE SET
             price_usd = excluded.price_usd,
             price_foil_usd = excluded.price_foil_usd,
             price_updated_at = excluded.price_updated_at",
        params![card_id, base.normal, base.foil, format_timestamp(refreshed_at)],
    )?;

    log::debug!("Stored {} price rows for {}", count, card_id);
    Ok(count)
}

/// All cached price rows for a card, in key order
pub fn get_rows(conn: &Connection, card_id: &str) -> DbResult<Vec<PriceRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT card_id, condition, printing, language, price_usd, source, updated_at
         FROM price_rows
         WHERE card_id = ?1
         ORDER BY condition, printing, language",
    )?;
    let rows: DbResult<Vec<PriceRow>> = stmt
        .query_map(params![card_id], price_row_from_row)?
        .collect();
    rows
}

fn price_row_from_row(row: &Row<'_>) -> DbResult<PriceRow> {
    let condition: String = row.get(1)?;
    let printing: String = row.get(2)?;
    let language: String = row.get(3)?;
    let updated_at: String = row.get(6)?;

    Ok(PriceRow {
        card_id: row.get(0)?,
        condition: Condition::parse(&condition)
            .ok_or_else(|| invalid_text(1, format!("unknown condition {condition:?}")))?,
        printing: Printing::parse(&printing)
            .ok_or_else(|| invalid_text(2, format!("unknown printing {printing:?}")))?,
        language: Language::normalize(&language),
        price_usd: row.get(4)?,
        source: row.get(5)?,
        updated_at: parse_timestamp(6, &updated_at)?,
    })
}

/// Fixed-width UTC timestamps, so text order is time order
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(idx: usize, value: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn invalid_text(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

/// Start tracking a card; existing entries keep their state
pub fn track_card(conn: &Connection, card_id: &str, external_id: Option<&str>) -> DbResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO tracked_cards (card_id, external_id) VALUES (?1, ?2)",
        params![card_id, external_id],
    )?;
    Ok(inserted > 0)
}

/// Record a discovered pricing-provider id
pub fn set_external_id(conn: &Connection, card_id: &str, external_id: &str) -> DbResult<()> {
    conn.execute(
        "INSERT INTO tracked_cards (card_id, external_id) VALUES (?1, ?2)
         ON CONFLICT(card_id) DO UPDATE SET external_id = excluded.external_id",
        params![card_id, external_id],
    )?;
    Ok(())
}

/// Pricing state persisted for a tracked card
#[derive(Debug, Clone, PartialEq)]
pub struct CardState {
    pub external_id: Option<String>,
    /// Scalars from the last refresh, absent before the first one
    pub base: Option<BasePrices>,
    pub price_updated_at: Option<DateTime<Utc>>,
}

pub fn card_state(conn: &Connection, card_id: &str) -> DbResult<Option<CardState>> {
    let raw = conn
        .query_row(
            "SELECT external_id, price_usd, price_foil_usd, price_updated_at
             FROM tracked_cards WHERE card_id = ?1",
            params![card_id],
            |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<f64>>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((external_id, normal, foil, updated_at)) = raw else {
        return Ok(None);
    };
    let base = match (normal, foil) {
        (None, None) => None,
        (normal, foil) => Some(BasePrices {
            normal: normal.unwrap_or(0.0),
            foil: foil.unwrap_or(0.0),
        }),
    };
    let price_updated_at = updated_at
        .map(|value| parse_timestamp(3, &value))
        .transpose()?;

    Ok(Some(CardState {
        external_id: external_id.filter(|id| !id.is_empty()),
        base,
        price_updated_at,
    }))
}

/// Tracked cards never refreshed and without cached rows, oldest first.
///
/// A refresh that returned no rows still sets `price_updated_at`, so such
/// cards come back through [`stale_cards`] instead of every cycle.
pub fn cards_missing_prices(conn: &Connection, limit: usize) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT t.card_id FROM tracked_cards t
         WHERE t.price_updated_at IS NULL
           AND NOT EXISTS (SELECT 1 FROM price_rows p WHERE p.card_id = t.card_id)
         ORDER BY t.added_at, t.card_id
         LIMIT ?1",
    )?;
    let ids: DbResult<Vec<String>> = stmt
        .query_map(params![limit as i64], |row| row.get(0))?
        .collect();
    ids
}

/// Tracked cards whose last refresh is older than `cutoff`, oldest first
pub fn stale_cards(
    conn: &Connection,
    cutoff: DateTime<Utc>,
    limit: usize,
) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT card_id FROM tracked_cards
         WHERE price_updated_at IS NOT NULL AND price_updated_at < ?1
         ORDER BY price_updated_at, card_id
         LIMIT ?2",
    )?;
    let ids: DbResult<Vec<String>> = stmt
        .query_map(params![format_timestamp(cutoff), limit as i64], |row| row.get(0))?
        .collect();
    ids
}

/// Get total count of tracked cards
pub fn get_tracked_count(conn: &Connection) -> DbResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM tracked_cards", [], |row| row.get(0))
}

/// Get total count of cached price rows
pub fn get_price_row_count(conn: &Connection) -> DbResult<i64> {
    conn.query_row("SELECT COUNT(*) FROM price_rows", [], |row| row.get(0))
}

// ── Shared store handle ────────────────────────────────────────────────

/// Thread-safe handle to the price database
///
/// The lock is taken per call and never held across an await point.
#[derive(Debug, Clone)]
pub struct PriceStore {
    conn: Arc<Mutex<Connection>>,
}

impl PriceStore {
    /// Open (or create) the database file and initialize the schema
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        log::info!("Opened database: {}", path.as_ref().display());
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_rows(&self, card_id: &str) -> Result<Vec<PriceRow>> {
        Ok(get_rows(&self.lock(), card_id)?)
    }

    pub fn upsert_row(&self, row: &PriceRow) -> Result<()> {
        Ok(upsert_row(&self.lock(), row)?)
    }

    pub fn upsert_card_prices(
        &self,
        card_id: &str,
        rows: &[PriceRow],
        base: BasePrices,
        refreshed_at: DateTime<Utc>,
    ) -> Result<usize> {
        Ok(upsert_card_prices(
            &mut self.lock(),
            card_id,
            rows,
            base,
            refreshed_at,
        )?)
    }

    pub fn track_card(&self, card_id: &str, external_id: Option<&str>) -> Result<bool> {
        Ok(track_card(&self.lock(), card_id, external_id)?)
    }

    pub fn set_external_id(&self, card_id: &str, external_id: &str) -> Result<()> {
        Ok(set_external_id(&self.lock(), card_id, external_id)?)
    }

    pub fn card_state(&self, card_id: &str) -> Result<Option<CardState>> {
        Ok(card_state(&self.lock(), card_id)?)
    }

    pub fn cards_missing_prices(&self, limit: usize) -> Result<Vec<String>> {
        Ok(cards_missing_prices(&self.lock(), limit)?)
    }

    pub fn stale_cards(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<Vec<String>> {
        Ok(stale_cards(&self.lock(), cutoff, limit)?)
    }

    pub fn tracked_count(&self) -> Result<i64> {
        Ok(get_tracked_count(&self.lock())?)
    }

    pub fn price_row_count(&self) -> Result<i64> {
        Ok(get_price_row_count(&self.lock())?)
    }

    /// Resolve a card's price from its cached rows, with the catalog's
    /// scalars overlaid by those stored at the last refresh
    pub fn resolve_price(&self, card: &Card, key: PriceKey) -> Result<ResolvedPrice> {
        let (rows, state) = {
            let conn = self.lock();
            (get_rows(&conn, &card.id)?, card_state(&conn, &card.id)?)
        };
        let base = BasePrices::from_card(card).overlay(state.and_then(|s| s.base));
        Ok(resolve_with_base(card, &rows, base, key))
    }
}
