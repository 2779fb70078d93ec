//! JustTCG API client
//!
//! Discovery lists a set's cards with `GET /cards`; prices for known
//! TCGplayer ids come from one `POST /cards` per batch.

use super::{BatchPrices, DiscoveryGroup, PriceLookup, PricingError, PricingSource, SetDirectory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tcg_common::{Condition, Game, Language, PriceRow, Printing};

pub const DEFAULT_BASE_URL: &str = "https://api.justtcg.com/v1";

/// Source label written on every row fetched from JustTCG
pub const SOURCE: &str = "justtcg";

/// Most cards a single batch request may ask for
pub const MAX_BATCH_SIZE: usize = 20;

/// Page size used when listing a set
const DISCOVERY_PAGE_LIMIT: usize = 250;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Vec<ApiCard>,
    #[serde(rename = "_metadata", default)]
    metadata: Option<ApiMetadata>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiCard {
    #[serde(default)]
    name: String,
    #[serde(default)]
    number: Option<String>,
    #[serde(rename = "tcgplayerId", default)]
    tcgplayer_id: Option<String>,
    #[serde(default)]
    variants: Vec<ApiVariant>,
}

#[derive(Debug, Deserialize)]
struct ApiVariant {
    #[serde(default)]
    printing: String,
    #[serde(default)]
    condition: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    price: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMetadata {
    #[serde(default)]
    api_daily_requests_remaining: Option<i64>,
    #[serde(default)]
    has_more: bool,
}

#[derive(Debug, Serialize)]
struct BatchItem<'a> {
    #[serde(rename = "tcgplayerId")]
    tcgplayer_id: &'a str,
}

pub struct JustTcgClient {
    client: Client,
    api_key: String,
    pub(crate) base_url: String,
}

impl JustTcgClient {
    pub fn new(api_key: String) -> Self {
        if api_key.is_empty() {
            warn!("JustTCG API key is empty; requests will be unauthenticated");
        }
        Self {
            client: Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    fn with_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        if self.api_key.is_empty() {
            request
        } else {
            request.header("X-API-Key", &self.api_key)
        }
    }

    async fn read_response(response: reqwest::Response) -> Result<ApiResponse, PricingError> {
        let status = response.status();
        debug!("JustTCG response status: {}", status);

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(PricingError::QuotaExceeded);
        }
        if status.is_server_error() {
            return Err(PricingError::Transient(format!("server returned {status}")));
        }
        if !status.is_success() {
            return Err(PricingError::HttpStatus(status));
        }

        let body = response.text().await?;
        let parsed: ApiResponse = serde_json::from_str(&body)?;
        if let Some(error) = parsed.error.as_deref().filter(|e| !e.is_empty()) {
            let code = parsed.code.as_deref().unwrap_or_default();
            return Err(PricingError::Api(format!("{error} {code}").trim().to_string()));
        }
        Ok(parsed)
    }
}

/// Provider name of a game
pub fn game_slug(game: Game) -> &'static str {
    match game {
        Game::Pokemon => "pokemon",
        Game::Mtg => "magic-the-gathering",
    }
}

/// Provider set id for a discovery group ("Vivid Voltage" ->
/// "vivid-voltage-pokemon"). Magic sets use their lowercase set code.
pub fn set_slug(group: &DiscoveryGroup) -> String {
    match group.game {
        Game::Pokemon => {
            let name = if group.set_name.trim().is_empty() {
                &group.set_code
            } else {
                &group.set_name
            };
            let slug = name
                .to_lowercase()
                .replace(&['\'', '’', ':', '.'][..], "")
                .replace('&', "and")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-");
            format!("{slug}-pokemon")
        }
        Game::Mtg => group.set_code.trim().to_lowercase(),
    }
}

/// Convert provider variants into price rows.
///
/// Variants with an unknown condition or a non-positive price are dropped;
/// unknown printings count as Normal.
fn variants_to_rows(card_id: &str, variants: &[ApiVariant], now: DateTime<Utc>) -> Vec<PriceRow> {
    variants
        .iter()
        .filter(|v| v.price > 0.0)
        .filter_map(|v| {
            let condition = Condition::parse(&v.condition)?;
            Some(PriceRow {
                card_id: card_id.to_string(),
                condition,
                printing: Printing::parse(&v.printing).unwrap_or(Printing::Normal),
                language: Language::normalize(v.language.as_deref().unwrap_or_default()),
                price_usd: v.price,
                source: SOURCE.to_string(),
                updated_at: now,
            })
        })
        .collect()
}

#[async_trait]
impl PricingSource for JustTcgClient {
    async fn resolve_external_ids(&self, group: &DiscoveryGroup) -> Result<SetDirectory, PricingError> {
        let slug = set_slug(group);
        let url = format!(
            "{}/cards?game={}&set={}&limit={}&include_price_history=false&include_statistics=",
            self.base_url,
            game_slug(group.game),
            urlencoding::encode(&slug),
            DISCOVERY_PAGE_LIMIT
        );
        debug!("Listing JustTCG set {} for group {}", slug, group.key);

        let response = self.with_headers(self.client.get(&url)).send().await?;
        let parsed = Self::read_response(response).await?;

        let mut directory = SetDirectory::new();
        for card in &parsed.data {
            if let Some(id) = card.tcgplayer_id.as_deref().filter(|id| !id.is_empty()) {
                directory.insert(card.number.as_deref().unwrap_or_default(), &card.name, id);
            }
        }
        if parsed.metadata.as_ref().is_some_and(|m| m.has_more) {
            warn!(
                "JustTCG: set {} has more than {} cards, listing is incomplete",
                slug, DISCOVERY_PAGE_LIMIT
            );
            directory.mark_truncated();
        }
        info!(
            "JustTCG: set {} lists {} cards ({} with ids)",
            slug,
            parsed.data.len(),
            directory.len()
        );
        Ok(directory)
    }

    async fn fetch_batch_prices(&self, lookups: &[PriceLookup]) -> Result<BatchPrices, PricingError> {
        if lookups.is_empty() {
            return Ok(BatchPrices::default());
        }
        if lookups.len() > MAX_BATCH_SIZE {
            return Err(PricingError::Api(format!(
                "batch of {} cards exceeds the limit of {}",
                lookups.len(),
                MAX_BATCH_SIZE
            )));
        }

        let body: Vec<BatchItem> = lookups
            .iter()
            .map(|l| BatchItem {
                tcgplayer_id: &l.external_id,
            })
            .collect();
        let url = format!(
            "{}/cards?include_price_history=false&include_statistics=",
            self.base_url
        );

        let response = self
            .with_headers(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        let parsed = Self::read_response(response).await?;

        // Responses may come back in any order; match on the provider id
        let by_external: HashMap<&str, &str> = lookups
            .iter()
            .map(|l| (l.external_id.as_str(), l.card_id.as_str()))
            .collect();

        let now = Utc::now();
        let mut rows = Vec::new();
        for card in &parsed.data {
            let card_id = card
                .tcgplayer_id
                .as_deref()
                .and_then(|id| by_external.get(id).copied());
            match card_id {
                Some(card_id) => rows.extend(variants_to_rows(card_id, &card.variants, now)),
                None => warn!("JustTCG returned prices for unrequested card {}", card.name),
            }
        }

        let daily_remaining = parsed
            .metadata
            .and_then(|m| m.api_daily_requests_remaining)
            .filter(|r| *r >= 0)
            .map(|r| u32::try_from(r).unwrap_or(u32::MAX));

        info!(
            "JustTCG: batch fetched {} cards, {} price rows (daily remaining: {:?})",
            parsed.data.len(),
            rows.len(),
            daily_remaining
        );
        Ok(BatchPrices {
            rows,
            daily_remaining,
        })
    }
}

#[cfg(test)]
#[path = "justtcg_tests.rs"]
mod tests;
