//! Conversation state machine.
//!
//! Each account is either idle or part-way through one quote, buy or sell
//! flow. [`Engine`] routes every inbound message by that state and answers
//! with a structured [`Response`]; rendering is left to the transport.

mod engine;
mod guard;
mod input;
mod reply;
mod session;
mod state;

pub use engine::Engine;
pub use guard::{check_staleness, GuardDecision};
pub use input::{parse_amount, Command, Inbound, Message};
pub use reply::{Outcome, PriceMove, Prompt, Reply, Response};
pub use session::{AccountTurn, SessionStore};
pub use state::{ConversationState, FlowKind, FlowOrigin, MessageRef, Session};
