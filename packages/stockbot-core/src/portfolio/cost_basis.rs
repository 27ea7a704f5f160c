//! FIFO cost basis over a trade history.
//!
//! Buys open lots; sells close the oldest open lots first. What remains open
//! is the cost attributable to the shares currently held.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A purchased batch of shares that has not been fully sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    pub remaining: i64,
    pub price: Decimal,
}

/// Open lots left after matching every sell against the oldest buys.
///
/// `trades` are `(signed quantity, price)` pairs in execution order. Sell
/// quantity beyond what is open is ignored.
pub fn open_lots(trades: impl IntoIterator<Item = (i64, Decimal)>) -> Vec<Lot> {
    let mut lots: VecDeque<Lot> = VecDeque::new();

    for (quantity, price) in trades {
        if quantity > 0 {
            lots.push_back(Lot {
                remaining: quantity,
                price,
            });
            continue;
        }

        let mut to_match = -quantity;
        while to_match > 0 {
            let Some(oldest) = lots.front_mut() else {
                break;
            };
            let matched = to_match.min(oldest.remaining);
            oldest.remaining -= matched;
            to_match -= matched;
            if oldest.remaining == 0 {
                lots.pop_front();
            }
        }
    }

    lots.into_iter().collect()
}

/// Aggregate purchase cost of the shares still held.
pub fn cost_basis(trades: impl IntoIterator<Item = (i64, Decimal)>) -> Decimal {
    open_lots(trades)
        .iter()
        .map(|lot| Decimal::from(lot.remaining) * lot.price)
        .sum()
}
