//! Price-staleness guard.
//!
//! A quote can be minutes old when the user confirms an amount. Before money
//! moves the price is fetched again, and the trade only proceeds if the move
//! is not against the user: buyers never pay more than they were shown,
//! sellers never receive less.

use crate::types::TradeSide;
use rust_decimal::Decimal;

/// Verdict on a re-quoted price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Proceed,
    /// The price moved against the user; they must restart the flow.
    Abort,
}

pub fn check_staleness(side: TradeSide, quoted: Decimal, fresh: Decimal) -> GuardDecision {
    let moved_against = match side {
        TradeSide::Buy => fresh > quoted,
        TradeSide::Sell => fresh < quoted,
    };
    if moved_against {
        GuardDecision::Abort
    } else {
        GuardDecision::Proceed
    }
}
