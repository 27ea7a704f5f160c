//! Alpha Vantage `TIME_SERIES_DAILY` client.

use super::QuoteProvider;
use crate::config::QuoteConfig;
use crate::types::Symbol;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

const SERIES_KEY: &str = "Time Series (Daily)";
const CLOSE_KEY: &str = "4. close";

/// HTTP quote provider backed by Alpha Vantage daily series.
#[derive(Debug, Clone)]
pub struct AlphaVantage {
    client: Client,
    base_url: String,
    api_key: String,
}

impl AlphaVantage {
    pub fn new(config: &QuoteConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn fetch_series(&self, symbol: &Symbol) -> crate::Result<Option<Value>> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol.as_str()),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::warn!("Quote request for {} failed: {}", symbol, response.status());
            return Ok(None);
        }

        Ok(Some(response.json().await?))
    }
}

#[async_trait]
impl QuoteProvider for AlphaVantage {
    async fn fetch_price(&self, symbol: &Symbol) -> Option<Decimal> {
        match self.fetch_series(symbol).await {
            Ok(Some(body)) => {
                let price = parse_daily_close(&body);
                if price.is_none() {
                    tracing::warn!("Unusable quote payload for {}", symbol);
                }
                price
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Quote request for {} failed: {}", symbol, e);
                None
            }
        }
    }
}

/// Closing price of the most recent day in a daily-series payload.
///
/// Dates are ISO formatted, so the greatest key is the latest day.
pub fn parse_daily_close(body: &Value) -> Option<Decimal> {
    let series = body.get(SERIES_KEY)?.as_object()?;
    let (_, latest) = series.iter().max_by(|(a, _), (b, _)| a.cmp(b))?;
    let close = latest.get(CLOSE_KEY)?.as_str()?;
    Decimal::from_str(close).ok()
}
