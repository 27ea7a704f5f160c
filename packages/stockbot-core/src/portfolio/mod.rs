//! Portfolio analytics.
//!
//! Provides FIFO cost basis and unrealized profit valuation.

pub mod cost_basis;
mod valuation;

pub use cost_basis::{cost_basis, open_lots, Lot};
pub use valuation::{value_portfolio, PortfolioLine, PortfolioView};
