//! Stockbot Core - conversational paper-trading engine.
//!
//! This crate provides everything behind a chat-driven stock trading
//! simulation except the chat transport itself:
//!
//! - **Conversation engine**: per-account quote/buy/sell flows as a state machine
//! - **Staleness guard**: re-quotes before money moves
//! - **Ledger**: atomic cash/holdings/history mutations with persistence
//! - **Portfolio**: FIFO cost basis and unrealized profit
//! - **Broadcast**: admin fan-out with rate-limit backoff
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stockbot_core::{AccountId, Config, Engine, Inbound, Ledger};
//! use stockbot_core::quote::FixedQuotes;
//!
//! # async fn demo() -> stockbot_core::Result<()> {
//! let config = Config::default();
//! let ledger = Arc::new(Ledger::in_memory());
//! let quotes = Arc::new(FixedQuotes::parse("AAPL=152.90")?);
//! let engine = Engine::new(&config, ledger, quotes);
//!
//! let account = AccountId(1);
//! engine.handle(Inbound::text(account, "/buy")).await;
//! engine.handle(Inbound::text(account, "AAPL")).await;
//! let reply = engine.handle(Inbound::text(account, "10")).await;
//! println!("{:?}", reply);
//! # Ok(())
//! # }
//! ```

pub mod broadcast;
pub mod config;
pub mod conversation;
pub mod ledger;
pub mod portfolio;
pub mod quote;
pub mod types;

pub use types::{Account, AccountId, ApiResponse, Holding, Symbol, TradeSide, TransactionRecord};

pub use broadcast::{BroadcastDispatcher, DeliveryError, MessageSink};
pub use config::Config;
pub use conversation::{Engine, FlowKind, FlowOrigin, Inbound, Outcome, Prompt, Reply};
pub use ledger::{Ledger, TradeOutcome};
pub use portfolio::{cost_basis, PortfolioLine, PortfolioView};
pub use quote::QuoteProvider;

/// Error types for stockbot-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for stockbot-core operations.
pub type Result<T> = std::result::Result<T, Error>;
