//! Conversation states and the per-account session payload.

use crate::types::{Symbol, TradeSide};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Which flow a user started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowKind {
    Quote,
    Buy,
    Sell,
}

impl FlowKind {
    /// Trade side for buy/sell flows.
    pub fn side(self) -> Option<TradeSide> {
        match self {
            FlowKind::Quote => None,
            FlowKind::Buy => Some(TradeSide::Buy),
            FlowKind::Sell => Some(TradeSide::Sell),
        }
    }
}

impl From<TradeSide> for FlowKind {
    fn from(side: TradeSide) -> Self {
        match side {
            TradeSide::Buy => FlowKind::Buy,
            TradeSide::Sell => FlowKind::Sell,
        }
    }
}

/// Why a flow is being entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum FlowOrigin {
    /// The user asked for it.
    Fresh,
    /// Restarted after the staleness guard rejected a confirmation.
    AfterPriceMove {
        symbol: Symbol,
        quoted: Decimal,
        fresh: Decimal,
    },
}

/// Where an account is inside a flow. Each state carries exactly the payload
/// its next handler needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    Idle,
    AwaitingSymbol {
        flow: FlowKind,
    },
    AwaitingAmount {
        side: TradeSide,
        symbol: Symbol,
        /// Price shown to the user when the flow was entered
        quoted: Decimal,
    },
}

/// Transport-side reference to the message a flow keeps updating.
pub type MessageRef = i64;

/// Live conversation of one account.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub state: ConversationState,
    pub anchor: Option<MessageRef>,
    pub updated_at: Instant,
}

impl Session {
    pub fn new(state: ConversationState, anchor: Option<MessageRef>) -> Self {
        Self {
            state,
            anchor,
            updated_at: Instant::now(),
        }
    }

    /// Move to `state`, keeping the anchor.
    pub fn advance(self, state: ConversationState) -> Self {
        Self::new(state, self.anchor)
    }
}
