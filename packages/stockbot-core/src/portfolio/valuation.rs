//! Portfolio valuation: market value and unrealized profit per holding.

use super::cost_basis::cost_basis;
use crate::ledger::Ledger;
use crate::quote::QuoteProvider;
use crate::types::{AccountId, Holding, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One holding with its cost basis and, when a quote was available, its
/// market value and profit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioLine {
    pub symbol: Symbol,
    pub quantity: i64,
    /// Purchase cost of the held shares (FIFO)
    pub cost_basis: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_value: Option<Decimal>,
    /// `market_value - cost_basis`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<Decimal>,
}

impl PortfolioLine {
    pub fn new(holding: &Holding, cost_basis: Decimal) -> Self {
        Self {
            symbol: holding.symbol.clone(),
            quantity: holding.quantity,
            cost_basis,
            price: None,
            market_value: None,
            profit: None,
        }
    }

    /// Fill in market value and profit at `price`. A value out of decimal
    /// range leaves the line unpriced.
    pub fn with_price(self, price: Decimal) -> Self {
        let Some(market_value) = Decimal::from(self.quantity).checked_mul(price) else {
            return self;
        };
        let Some(profit) = market_value.checked_sub(self.cost_basis) else {
            return self;
        };
        Self {
            price: Some(price),
            market_value: Some(market_value),
            profit: Some(profit),
            ..self
        }
    }
}

/// Cash plus every holding of one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioView {
    pub cash: Decimal,
    pub lines: Vec<PortfolioLine>,
}

impl PortfolioView {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Market value of the priced lines.
    pub fn market_value(&self) -> Decimal {
        self.lines.iter().filter_map(|l| l.market_value).sum()
    }

    /// Profit of the priced lines.
    pub fn profit(&self) -> Decimal {
        self.lines.iter().filter_map(|l| l.profit).sum()
    }

    /// Lines whose quote could not be fetched.
    pub fn unpriced(&self) -> usize {
        self.lines.iter().filter(|l| l.price.is_none()).count()
    }
}

/// Value every holding of `account` at fresh prices.
///
/// A failed quote leaves that line unpriced instead of failing the view.
/// Returns `None` for unknown accounts.
pub async fn value_portfolio(
    ledger: &Ledger,
    quotes: &dyn QuoteProvider,
    account: AccountId,
) -> Option<PortfolioView> {
    let cash = ledger.cash(account)?;
    let mut lines = Vec::new();

    for holding in ledger.holdings(account) {
        let history = ledger.history(account, &holding.symbol);
        let basis = cost_basis(history.iter().map(|r| (r.quantity, r.price)));
        let line = PortfolioLine::new(&holding, basis);

        match quotes.fetch_price(&holding.symbol).await {
            Some(price) => lines.push(line.with_price(price)),
            None => {
                tracing::warn!(
                    "No quote for {} while valuing account {}",
                    holding.symbol,
                    account
                );
                lines.push(line);
            }
        }
    }

    Some(PortfolioView { cash, lines })
}
