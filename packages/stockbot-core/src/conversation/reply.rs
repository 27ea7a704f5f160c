//! Structured replies handed to the presentation layer.
//!
//! The engine never formats text; each variant carries the values a renderer
//! needs.

use super::state::{FlowKind, MessageRef};
use crate::portfolio::PortfolioView;
use crate::types::{AccountId, Symbol, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A price move that made the guard reject a confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMove {
    pub symbol: Symbol,
    pub quoted: Decimal,
    pub fresh: Decimal,
}

/// The engine is waiting for more input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "prompt", rename_all = "snake_case")]
pub enum Prompt {
    /// Ask for a ticker.
    Symbol {
        flow: FlowKind,
        /// Cash balance, shown when buying
        #[serde(skip_serializing_if = "Option::is_none")]
        balance: Option<Decimal>,
        /// Set when the flow restarts after a price move
        #[serde(skip_serializing_if = "Option::is_none")]
        price_move: Option<PriceMove>,
    },
    /// Ask how many shares.
    Amount {
        side: TradeSide,
        symbol: Symbol,
        price: Decimal,
        /// Shares currently held, shown when selling
        #[serde(skip_serializing_if = "Option::is_none")]
        owned: Option<i64>,
    },
}

/// A terminal result. The account is back in `Idle` afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Welcome {
        created: bool,
    },
    Balance {
        cash: Decimal,
    },
    Portfolio(PortfolioView),
    Quote {
        symbol: Symbol,
        price: Decimal,
    },
    Cancelled,
    InvalidSymbol {
        input: String,
    },
    InvalidAmount {
        input: String,
    },
    /// The quote source could not price the symbol.
    QuoteUnavailable {
        symbol: Symbol,
    },
    /// Sell requested for a symbol the account does not hold.
    NotHeld {
        symbol: Symbol,
    },
    Bought {
        symbol: Symbol,
        amount: i64,
        price: Decimal,
        total: Decimal,
        balance: Decimal,
    },
    InsufficientFunds {
        symbol: Symbol,
        amount: i64,
        balance: Decimal,
    },
    Sold {
        symbol: Symbol,
        amount: i64,
        price: Decimal,
        total: Decimal,
        balance: Decimal,
    },
    InsufficientShares {
        symbol: Symbol,
        amount: i64,
        owned: i64,
    },
    /// The guard rejected the confirmation; nothing was executed.
    PriceMoved {
        side: TradeSide,
        #[serde(flatten)]
        price_move: PriceMove,
    },
    /// Something failed inside the core; nothing was executed.
    TransientError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Prompt(Prompt),
    Outcome(Outcome),
}

/// What the presentation layer should show, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub account: AccountId,
    /// Message to update instead of sending a new one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor: Option<MessageRef>,
    pub reply: Reply,
}

impl Response {
    pub fn prompt(&self) -> Option<&Prompt> {
        match &self.reply {
            Reply::Prompt(prompt) => Some(prompt),
            Reply::Outcome(_) => None,
        }
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match &self.reply {
            Reply::Outcome(outcome) => Some(outcome),
            Reply::Prompt(_) => None,
        }
    }
}
