//! Conversation engine: routes each inbound message by the sender's state.

use super::guard::{check_staleness, GuardDecision};
use super::input::{parse_amount, Command, Inbound, Message};
use super::reply::{Outcome, PriceMove, Prompt, Reply, Response};
use super::session::SessionStore;
use super::state::{ConversationState, FlowKind, FlowOrigin, MessageRef, Session};
use crate::config::Config;
use crate::ledger::{Ledger, TradeOutcome};
use crate::portfolio::value_portfolio;
use crate::quote::QuoteProvider;
use crate::types::{AccountId, Symbol, TradeSide};
use crate::Error;
use rust_decimal::Decimal;
use std::sync::Arc;

/// Drives quote, buy and sell flows for every account.
///
/// Inputs of one account are handled strictly one at a time; a second message
/// waits until the first has finished its step.
pub struct Engine {
    ledger: Arc<Ledger>,
    quotes: Arc<dyn QuoteProvider>,
    sessions: SessionStore,
    starting_cash: Decimal,
}

impl Engine {
    pub fn new(config: &Config, ledger: Arc<Ledger>, quotes: Arc<dyn QuoteProvider>) -> Self {
        Self {
            ledger,
            quotes,
            sessions: SessionStore::new(config.session_ttl()),
            starting_cash: config.starting_cash,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Current conversation state of `account`.
    pub fn state(&self, account: AccountId) -> ConversationState {
        self.sessions.state(account)
    }

    /// Handle one inbound message. `None` means the message was ignored.
    pub async fn handle(&self, inbound: Inbound) -> Option<Response> {
        let account = inbound.account;
        let _turn = self.sessions.lock_account(account).await;

        let created = match self.register(&inbound).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!("Could not register account {}: {}", account, e);
                self.sessions.clear(account);
                return Some(self.respond(account, inbound.anchor, Outcome::TransientError));
            }
        };

        match inbound.message {
            Message::Command(command) => {
                self.on_command(account, command, created, inbound.anchor)
                    .await
            }
            Message::Text(text) => self.on_text(account, &text).await,
        }
    }

    /// Enter a quote, buy or sell flow.
    ///
    /// Used for button presses and for restarting a trade after the staleness
    /// guard rejected it. Any previous session is replaced.
    pub async fn start_flow(
        &self,
        account: AccountId,
        flow: FlowKind,
        origin: FlowOrigin,
        anchor: Option<MessageRef>,
    ) -> Response {
        let _turn = self.sessions.lock_account(account).await;
        self.enter_flow(account, flow, origin, anchor)
    }

    /// Create the account on first contact and keep its handle current.
    async fn register(&self, inbound: &Inbound) -> crate::Result<bool> {
        let account = inbound.account;
        if let Some(existing) = self.ledger.account(account) {
            if existing.handle == inbound.handle {
                return Ok(false);
            }
        }

        let handle = inbound.handle.clone();
        let starting_cash = self.starting_cash;
        self.write_ledger(move |ledger| {
            let (_, created) = ledger.ensure_account(account, starting_cash, handle.as_deref())?;
            if !created {
                if let Err(e) = ledger.sync_handle(account, handle.as_deref()) {
                    tracing::warn!("Could not sync handle of {}: {}", account, e);
                }
            }
            Ok(created)
        })
        .await
    }

    /// Run a ledger write on the blocking pool.
    async fn write_ledger<T, F>(&self, op: F) -> crate::Result<T>
    where
        F: FnOnce(&Ledger) -> crate::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        tokio::task::spawn_blocking(move || op(&ledger)).await?
    }

    fn respond(&self, account: AccountId, anchor: Option<MessageRef>, outcome: Outcome) -> Response {
        Response {
            account,
            anchor,
            reply: Reply::Outcome(outcome),
        }
    }

    /// End the session and report `outcome` on its anchor.
    fn finish(&self, account: AccountId, anchor: Option<MessageRef>, outcome: Outcome) -> Response {
        self.sessions.clear(account);
        self.respond(account, anchor, outcome)
    }

    async fn on_command(
        &self,
        account: AccountId,
        command: Command,
        created: bool,
        anchor: Option<MessageRef>,
    ) -> Option<Response> {
        match command {
            Command::Start => Some(self.finish(account, anchor, Outcome::Welcome { created })),
            Command::Price => Some(self.enter_flow(account, FlowKind::Quote, FlowOrigin::Fresh, anchor)),
            Command::Buy => Some(self.enter_flow(account, FlowKind::Buy, FlowOrigin::Fresh, anchor)),
            Command::Sell => Some(self.enter_flow(account, FlowKind::Sell, FlowOrigin::Fresh, anchor)),
            Command::Balance => {
                let outcome = match self.ledger.cash(account) {
                    Some(cash) => Outcome::Balance { cash },
                    None => Outcome::TransientError,
                };
                Some(self.finish(account, anchor, outcome))
            }
            Command::Portfolio => {
                self.sessions.clear(account);
                let outcome = match value_portfolio(&self.ledger, self.quotes.as_ref(), account).await {
                    Some(view) => Outcome::Portfolio(view),
                    None => Outcome::TransientError,
                };
                Some(self.respond(account, anchor, outcome))
            }
            Command::Cancel => {
                let session = self.sessions.clear(account)?;
                tracing::info!("Account {} cancelled {:?}", account, session.state);
                Some(self.respond(account, session.anchor.or(anchor), Outcome::Cancelled))
            }
        }
    }

    fn enter_flow(
        &self,
        account: AccountId,
        flow: FlowKind,
        origin: FlowOrigin,
        anchor: Option<MessageRef>,
    ) -> Response {
        let state = ConversationState::AwaitingSymbol { flow };
        self.sessions.set(account, Session::new(state, anchor));
        tracing::debug!("Account {} entered {:?} flow ({:?})", account, flow, origin);

        let balance = match flow {
            FlowKind::Buy => self.ledger.cash(account),
            FlowKind::Quote | FlowKind::Sell => None,
        };
        let price_move = match origin {
            FlowOrigin::Fresh => None,
            FlowOrigin::AfterPriceMove {
                symbol,
                quoted,
                fresh,
            } => Some(PriceMove {
                symbol,
                quoted,
                fresh,
            }),
        };

        Response {
            account,
            anchor,
            reply: Reply::Prompt(Prompt::Symbol {
                flow,
                balance,
                price_move,
            }),
        }
    }

    async fn on_text(&self, account: AccountId, text: &str) -> Option<Response> {
        // Free text outside a flow, or for a stale session, is dropped.
        let session = self.sessions.get(account)?;

        match session.state.clone() {
            ConversationState::Idle => None,
            ConversationState::AwaitingSymbol { flow } => {
                Some(self.on_symbol(account, session, flow, text).await)
            }
            ConversationState::AwaitingAmount {
                side,
                symbol,
                quoted,
            } => Some(
                self.on_amount(account, session, side, symbol, quoted, text)
                    .await,
            ),
        }
    }

    async fn on_symbol(
        &self,
        account: AccountId,
        session: Session,
        flow: FlowKind,
        text: &str,
    ) -> Response {
        let anchor = session.anchor;
        let Some(symbol) = Symbol::parse(text) else {
            return self.finish(
                account,
                anchor,
                Outcome::InvalidSymbol {
                    input: text.to_string(),
                },
            );
        };

        match flow {
            FlowKind::Quote => {
                let outcome = match self.quotes.fetch_price(&symbol).await {
                    Some(price) => Outcome::Quote { symbol, price },
                    None => Outcome::InvalidSymbol {
                        input: text.to_string(),
                    },
                };
                self.finish(account, anchor, outcome)
            }
            FlowKind::Buy => match self.quotes.fetch_price(&symbol).await {
                Some(price) => self.await_amount(account, session, TradeSide::Buy, symbol, price, None),
                None => self.finish(
                    account,
                    anchor,
                    Outcome::InvalidSymbol {
                        input: text.to_string(),
                    },
                ),
            },
            FlowKind::Sell => {
                let owned = self.ledger.holding(account, &symbol);
                if owned <= 0 {
                    return self.finish(account, anchor, Outcome::NotHeld { symbol });
                }
                match self.quotes.fetch_price(&symbol).await {
                    Some(price) => {
                        self.await_amount(account, session, TradeSide::Sell, symbol, price, Some(owned))
                    }
                    None => self.finish(account, anchor, Outcome::QuoteUnavailable { symbol }),
                }
            }
        }
    }

    fn await_amount(
        &self,
        account: AccountId,
        session: Session,
        side: TradeSide,
        symbol: Symbol,
        price: Decimal,
        owned: Option<i64>,
    ) -> Response {
        let anchor = session.anchor;
        let next = ConversationState::AwaitingAmount {
            side,
            symbol: symbol.clone(),
            quoted: price,
        };
        self.sessions.set(account, session.advance(next));

        Response {
            account,
            anchor,
            reply: Reply::Prompt(Prompt::Amount {
                side,
                symbol,
                price,
                owned,
            }),
        }
    }

    async fn on_amount(
        &self,
        account: AccountId,
        session: Session,
        side: TradeSide,
        symbol: Symbol,
        quoted: Decimal,
        text: &str,
    ) -> Response {
        let anchor = session.anchor;
        let Some(amount) = parse_amount(text) else {
            return self.finish(
                account,
                anchor,
                Outcome::InvalidAmount {
                    input: text.to_string(),
                },
            );
        };

        let Some(fresh) = self.quotes.fetch_price(&symbol).await else {
            tracing::warn!(
                "Re-quote of {} failed before {} for account {}",
                symbol,
                side,
                account
            );
            return self.finish(account, anchor, Outcome::TransientError);
        };

        if check_staleness(side, quoted, fresh) == GuardDecision::Abort {
            tracing::info!(
                "Account {} {} of {} aborted: price moved {} -> {}",
                account,
                side,
                symbol,
                quoted,
                fresh
            );
            return self.finish(
                account,
                anchor,
                Outcome::PriceMoved {
                    side,
                    price_move: PriceMove {
                        symbol,
                        quoted,
                        fresh,
                    },
                },
            );
        }

        let signed_amount = side.signed(amount);
        let traded = symbol.clone();
        let executed = self
            .write_ledger(move |ledger| ledger.execute(account, &traded, signed_amount, fresh))
            .await;
        let outcome = match executed {
            Ok(TradeOutcome::Bought {
                record,
                total,
                balance,
            }) => Outcome::Bought {
                symbol,
                amount: record.quantity,
                price: record.price,
                total,
                balance,
            },
            Ok(TradeOutcome::Sold {
                record,
                total,
                balance,
            }) => Outcome::Sold {
                symbol,
                amount: -record.quantity,
                price: record.price,
                total,
                balance,
            },
            Ok(TradeOutcome::InsufficientFunds {
                amount, balance, ..
            }) => Outcome::InsufficientFunds {
                symbol,
                amount,
                balance,
            },
            Ok(TradeOutcome::InsufficientShares { amount, owned }) => Outcome::InsufficientShares {
                symbol,
                amount,
                owned,
            },
            Err(Error::Task(e)) => {
                tracing::error!("Trade task of account {} failed: {}", account, e);
                Outcome::TransientError
            }
            // Already logged with context by the executor.
            Err(_) => Outcome::TransientError,
        };

        self.finish(account, anchor, outcome)
    }
}
