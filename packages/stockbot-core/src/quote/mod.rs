//! Quote sources.
//!
//! The engine only sees [`QuoteProvider`]: a price or nothing. Transport
//! errors, bad status codes and unparseable payloads all collapse to `None`.

mod alpha_vantage;

pub use alpha_vantage::{parse_daily_close, AlphaVantage};

use crate::types::Symbol;
use crate::{Error, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Latest-price lookup for a ticker.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Latest closing price of `symbol`, or `None` if it cannot be resolved.
    async fn fetch_price(&self, symbol: &Symbol) -> Option<Decimal>;
}

/// In-memory quote table. Prices can be changed between calls, which makes it
/// the provider for offline runs and tests.
#[derive(Debug, Default)]
pub struct FixedQuotes {
    prices: RwLock<HashMap<Symbol, Decimal>>,
    fetches: AtomicUsize,
}

impl FixedQuotes {
    pub fn new(prices: impl IntoIterator<Item = (Symbol, Decimal)>) -> Self {
        Self {
            prices: RwLock::new(prices.into_iter().collect()),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Parse a `SYMBOL=PRICE,SYMBOL=PRICE` list.
    pub fn parse(list: &str) -> Result<Self> {
        let mut prices = Vec::new();
        for entry in list.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (symbol, price) = entry.split_once('=').ok_or_else(|| {
                Error::InvalidOperation(format!("Expected SYMBOL=PRICE, got '{}'", entry))
            })?;
            let symbol = Symbol::parse(symbol)
                .ok_or_else(|| Error::InvalidOperation(format!("Invalid symbol '{}'", symbol)))?;
            let price = Decimal::from_str(price.trim())
                .map_err(|e| Error::InvalidOperation(format!("Invalid price '{}': {}", price, e)))?;
            prices.push((symbol, price));
        }
        Ok(Self::new(prices))
    }

    /// Set or replace the price of a symbol.
    pub fn set(&self, symbol: &Symbol, price: Decimal) {
        if let Ok(mut prices) = self.prices.write() {
            prices.insert(symbol.clone(), price);
        }
    }

    /// Make a symbol unresolvable.
    pub fn remove(&self, symbol: &Symbol) {
        if let Ok(mut prices) = self.prices.write() {
            prices.remove(symbol);
        }
    }

    /// Number of lookups served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteProvider for FixedQuotes {
    async fn fetch_price(&self, symbol: &Symbol) -> Option<Decimal> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.prices.read().ok()?.get(symbol).copied()
    }
}
