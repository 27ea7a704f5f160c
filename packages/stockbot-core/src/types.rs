//! Core data types for the trading simulation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque account identifier assigned by the chat platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AccountId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(AccountId)
    }
}

/// Stock ticker symbol: 1 to 5 ASCII letters, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Longest ticker accepted from user input.
    pub const MAX_LEN: usize = 5;

    /// Parse user input into a symbol, returning `None` unless the trimmed
    /// text is 1 to 5 ASCII letters.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        let valid = !trimmed.is_empty()
            && trimmed.len() <= Self::MAX_LEN
            && trimmed.chars().all(|c| c.is_ascii_alphabetic());
        valid.then(|| Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A user of the trading simulation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    /// Platform identity
    pub id: AccountId,
    /// Cash balance, never negative
    pub cash: Decimal,
    /// When the account was first seen
    pub created_at: DateTime<Utc>,
    /// Display handle, kept loosely in sync with the platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
}

impl Account {
    /// Create a new account with the given starting cash.
    pub fn new(id: AccountId, cash: Decimal, handle: Option<String>) -> Self {
        Self {
            id,
            cash,
            created_at: Utc::now(),
            handle,
        }
    }
}

/// Shares of one symbol owned by one account. Only exists while `quantity > 0`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Holding {
    pub account: AccountId,
    pub symbol: Symbol,
    pub quantity: i64,
}

/// Trade direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    /// Sign applied to a share count when recording a trade of this side.
    pub fn signed(self, amount: u32) -> i64 {
        match self {
            TradeSide::Buy => i64::from(amount),
            TradeSide::Sell => -i64::from(amount),
        }
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => f.write_str("buy"),
            TradeSide::Sell => f.write_str("sell"),
        }
    }
}

/// An executed trade. Append-only: never updated or deleted by trading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    /// Store-generated, strictly increasing
    pub id: u64,
    pub account: AccountId,
    pub symbol: Symbol,
    /// Price per share at execution
    pub price: Decimal,
    /// Positive for buys, negative for sells
    pub quantity: i64,
    pub executed_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn side(&self) -> TradeSide {
        if self.quantity >= 0 {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        }
    }

    /// Total cash moved by this trade (always non-negative).
    pub fn value(&self) -> Decimal {
        self.price * Decimal::from(self.quantity.unsigned_abs())
    }
}

/// Response envelope used by the command line output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
