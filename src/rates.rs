//! USD -> crypto rate lookup.
//!
//! Live prices come from a configurable HTTP endpoint with a hard request
//! timeout; when the source is unreachable or returns garbage, static
//! defaults take over. The fallback is a resilience requirement - a
//! withdrawal request must never fail because a price API is down.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

use crate::config::RatesConfig;

/// Static fallback prices, USD per unit.
static FALLBACK_USD: Lazy<HashMap<&'static str, Decimal>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("BTC", Decimal::from(60_000));
    m.insert("ETH", Decimal::from(3_000));
    m.insert("BNB", Decimal::from(550));
    m.insert("SOL", Decimal::from(150));
    m.insert("TRX", Decimal::new(12, 2)); // 0.12
    m.insert("USDT", Decimal::ONE);
    m.insert("USDC", Decimal::ONE);
    m
});

/// Coin ids for the default price endpoint.
static COIN_IDS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("BTC", "bitcoin");
    m.insert("ETH", "ethereum");
    m.insert("BNB", "binancecoin");
    m.insert("SOL", "solana");
    m.insert("TRX", "tron");
    m.insert("USDT", "tether");
    m.insert("USDC", "usd-coin");
    m
});

#[async_trait]
pub trait RateProvider: Send + Sync {
    /// USD price of one unit of `symbol`, or None when the symbol is
    /// unknown to this provider.
    async fn usd_price(&self, symbol: &str) -> Option<Decimal>;
}

/// Fallback-only provider. Also what tests inject.
pub struct StaticRates;

#[async_trait]
impl RateProvider for StaticRates {
    async fn usd_price(&self, symbol: &str) -> Option<Decimal> {
        FALLBACK_USD.get(symbol.to_uppercase().as_str()).copied()
    }
}

/// Live HTTP provider with static fallback.
pub struct LiveRates {
    /// None when the client could not be built - every lookup then goes
    /// straight to the fallback table.
    client: Option<reqwest::Client>,
    url_template: String,
}

impl LiveRates {
    pub fn new(config: &RatesConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                warn!(error = %e, "Rate client build failed, static fallback only");
                e
            })
            .ok();

        Self {
            client,
            url_template: config.url.clone(),
        }
    }

    async fn fetch(&self, symbol: &str) -> Option<Decimal> {
        let client = self.client.as_ref()?;
        let coin_id = COIN_IDS.get(symbol.to_uppercase().as_str())?;
        let url = self.url_template.replace("{symbol}", coin_id);

        let body: serde_json::Value = client.get(&url).send().await.ok()?.json().await.ok()?;

        // Shape: {"<coin_id>": {"usd": 60123.45}}
        let price = body.get(*coin_id)?.get("usd")?;
        let price = match price {
            serde_json::Value::Number(n) => Decimal::from_f64_retain(n.as_f64()?)?,
            serde_json::Value::String(s) => s.parse().ok()?,
            _ => return None,
        };

        (price > Decimal::ZERO).then_some(price)
    }
}

#[async_trait]
impl RateProvider for LiveRates {
    async fn usd_price(&self, symbol: &str) -> Option<Decimal> {
        match self.fetch(symbol).await {
            Some(price) => Some(price),
            None => {
                warn!(symbol, "Live rate unavailable, using static fallback");
                StaticRates.usd_price(symbol).await
            }
        }
    }
}

/// Convert a USD amount to a crypto quantity, 8 decimal places.
pub async fn usd_to_crypto(
    provider: &dyn RateProvider,
    usd_amount: Decimal,
    symbol: &str,
) -> Option<Decimal> {
    let price = provider.usd_price(symbol).await?;
    if price <= Decimal::ZERO {
        return None;
    }
    Some((usd_amount / price).round_dp(8))
}
