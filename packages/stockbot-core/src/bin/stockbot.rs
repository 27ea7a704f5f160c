//! Stockbot CLI - terminal front end for the trading engine.
//!
//! `chat` runs a conversation on stdin/stdout. `admin` subcommands print JSON
//! in the `ApiResponse` envelope.

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stockbot_core::{
    broadcast::{BroadcastDispatcher, DeliveryError, MessageSink},
    conversation::{Engine, FlowOrigin, Inbound, Outcome, Prompt, Reply},
    quote::{AlphaVantage, FixedQuotes, QuoteProvider},
    AccountId, ApiResponse, Config, FlowKind, Ledger, TradeSide,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "stockbot")]
#[command(about = "Stockbot - conversational paper trading")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.stockbot/config.toml or $STOCKBOT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Serve quotes from a fixed SYMBOL=PRICE,... list instead of the network
    #[arg(long, global = true)]
    offline: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the bot as one account
    Chat {
        /// Account id
        #[arg(short, long)]
        account: i64,
        /// Display handle
        #[arg(long)]
        handle: Option<String>,
    },
    /// Administrative commands
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// List all accounts
    Users,
    /// Show one account with holdings and recent trades
    Report {
        #[arg(short, long)]
        account: i64,
    },
    /// Send a message to every account except the operator
    Broadcast {
        /// Administrator sending the message
        #[arg(short, long)]
        operator: i64,
        #[arg(short, long)]
        text: String,
    },
    /// Delete an account with its holdings and history
    Purge {
        #[arg(short, long)]
        account: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = config.ledger_path();
    let ledger = Arc::new(
        Ledger::open(&path)
            .with_context(|| format!("Failed to open ledger at {}", path.display()))?,
    );
    if let Some(path) = ledger.path() {
        tracing::debug!("Using ledger {}", path.display());
    }

    match cli.command {
        Commands::Chat { account, handle } => {
            let quotes = quote_provider(&config, cli.offline.as_deref())?;
            let engine = Engine::new(&config, ledger, quotes);
            chat(&engine, AccountId(account), handle).await
        }
        Commands::Admin { action } => admin(&config, &ledger, action).await,
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => {
            let mut config = Config::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
        None => Ok(Config::load()?),
    }
}

fn quote_provider(config: &Config, offline: Option<&str>) -> anyhow::Result<Arc<dyn QuoteProvider>> {
    if let Some(prices) = offline {
        return Ok(Arc::new(FixedQuotes::parse(prices)?));
    }
    if config.quote.api_key.is_empty() {
        bail!("No quote API key configured; set ALPHA_VANTAGE_API_KEY or use --offline");
    }
    Ok(Arc::new(AlphaVantage::new(&config.quote)))
}

async fn chat(engine: &Engine, account: AccountId, handle: Option<String>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let mut inbound = Inbound::text(account, &line);
        if let Some(handle) = &handle {
            inbound = inbound.with_handle(handle.clone());
        }

        let Some(response) = engine.handle(inbound).await else {
            continue;
        };
        println!("{}", render(&response.reply));

        // Offer the same flow again with the new price.
        if let Some(Outcome::PriceMoved { side, price_move }) = response.outcome() {
            let origin = FlowOrigin::AfterPriceMove {
                symbol: price_move.symbol.clone(),
                quoted: price_move.quoted,
                fresh: price_move.fresh,
            };
            let restart = engine
                .start_flow(account, FlowKind::from(*side), origin, response.anchor)
                .await;
            println!("{}", render(&restart.reply));
        }
    }

    Ok(())
}

fn render(reply: &Reply) -> String {
    match reply {
        Reply::Prompt(prompt) => render_prompt(prompt),
        Reply::Outcome(outcome) => render_outcome(outcome),
    }
}

fn render_prompt(prompt: &Prompt) -> String {
    match prompt {
        Prompt::Symbol {
            flow,
            balance,
            price_move,
        } => {
            let mut text = String::new();
            if let Some(moved) = price_move {
                text.push_str(&format!(
                    "The price of {} changed from ${} to ${}.\n",
                    moved.symbol, moved.quoted, moved.fresh
                ));
            }
            if let Some(balance) = balance {
                text.push_str(&format!("Your balance: ${}\n", balance));
            }
            let verb = match flow.side() {
                Some(side) => side.to_string(),
                None => "look up".to_string(),
            };
            text.push_str(&format!(
                "Enter the ticker you want to {} (or 'cancel'):",
                verb
            ));
            text
        }
        Prompt::Amount {
            side,
            symbol,
            price,
            owned,
        } => {
            let mut text = format!("{} is trading at ${}.\n", symbol, price);
            if let Some(owned) = owned {
                text.push_str(&format!("You own {} shares.\n", owned));
            }
            text.push_str(&format!("How many shares do you want to {}?", side));
            text
        }
    }
}

fn render_outcome(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Welcome { created: true } => {
            "Welcome! Your paper trading account is ready. Try /price, /buy or /sell.".to_string()
        }
        Outcome::Welcome { created: false } => "Welcome back!".to_string(),
        Outcome::Balance { cash } => format!("Your balance: ${}", cash),
        Outcome::Portfolio(view) => {
            let mut text = format!("Cash: ${}\n", view.cash);
            if view.is_empty() {
                text.push_str("You hold no stocks.");
                return text;
            }
            for line in &view.lines {
                match (line.price, line.market_value, line.profit) {
                    (Some(price), Some(value), Some(profit)) => text.push_str(&format!(
                        "{}: {} @ ${} = ${} (profit ${})\n",
                        line.symbol, line.quantity, price, value, profit
                    )),
                    _ => text.push_str(&format!(
                        "{}: {} (price unavailable, cost ${})\n",
                        line.symbol, line.quantity, line.cost_basis
                    )),
                }
            }
            text.push_str(&format!(
                "Total: ${} (profit ${})",
                view.market_value(),
                view.profit()
            ));
            text
        }
        Outcome::Quote { symbol, price } => format!("{} is trading at ${}.", symbol, price),
        Outcome::Cancelled => "Cancelled.".to_string(),
        Outcome::InvalidSymbol { input } => format!("'{}' is not a valid ticker.", input),
        Outcome::InvalidAmount { input } => {
            format!("'{}' is not a valid number of shares.", input)
        }
        Outcome::QuoteUnavailable { symbol } => {
            format!("Could not get a price for {}. Try again later.", symbol)
        }
        Outcome::NotHeld { symbol } => format!("You don't own any {}.", symbol),
        Outcome::Bought {
            symbol,
            amount,
            price,
            total,
            balance,
        } => format!(
            "Bought {} {} at ${} for ${}. Balance: ${}",
            amount, symbol, price, total, balance
        ),
        Outcome::InsufficientFunds {
            symbol,
            amount,
            balance,
        } => format!(
            "Not enough cash to buy {} {}. Balance: ${}",
            amount, symbol, balance
        ),
        Outcome::Sold {
            symbol,
            amount,
            price,
            total,
            balance,
        } => format!(
            "Sold {} {} at ${} for ${}. Balance: ${}",
            amount, symbol, price, total, balance
        ),
        Outcome::InsufficientShares {
            symbol,
            amount,
            owned,
        } => format!(
            "You can't sell {} {}: you own {}.",
            amount, symbol, owned
        ),
        Outcome::PriceMoved { side, price_move } => {
            let direction = match side {
                TradeSide::Buy => "rose",
                TradeSide::Sell => "fell",
            };
            format!(
                "The price of {} {} from ${} to ${}. Nothing was {}.",
                price_move.symbol,
                direction,
                price_move.quoted,
                price_move.fresh,
                match side {
                    TradeSide::Buy => "bought",
                    TradeSide::Sell => "sold",
                }
            )
        }
        Outcome::TransientError => "Something went wrong. Please try again.".to_string(),
    }
}

/// Prints broadcast messages to stderr.
struct ConsoleSink;

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn deliver(&self, account: AccountId, text: &str) -> Result<(), DeliveryError> {
        eprintln!("[to {}] {}", account, text);
        Ok(())
    }
}

fn print_json<T: Serialize>(response: &ApiResponse<T>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}

async fn admin(config: &Config, ledger: &Ledger, action: AdminAction) -> anyhow::Result<()> {
    match action {
        AdminAction::Users => {
            let accounts = ledger.accounts();
            print_json(&ApiResponse::ok(json!({
                "count": accounts.len(),
                "accounts": accounts,
            })))
        }
        AdminAction::Report { account } => match ledger.report(AccountId(account)) {
            Some(report) => {
                let trades: Vec<_> = report
                    .recent_trades
                    .iter()
                    .map(|record| {
                        json!({
                            "id": record.id,
                            "symbol": record.symbol,
                            "side": record.side(),
                            "quantity": record.quantity.abs(),
                            "price": record.price,
                            "value": record.value(),
                            "executed_at": record.executed_at,
                        })
                    })
                    .collect();
                print_json(&ApiResponse::ok(json!({
                    "account": report.account,
                    "holdings": report.holdings,
                    "recent_trades": trades,
                })))
            }
            None => print_json(&ApiResponse::<()>::err(format!(
                "Account not found: {}",
                account
            ))),
        },
        AdminAction::Broadcast { operator, text } => {
            let operator = AccountId(operator);
            if !config.is_admin(operator) {
                return print_json(&ApiResponse::<()>::err(format!(
                    "Account {} is not an administrator",
                    operator
                )));
            }

            let recipients = ledger.account_ids_except(Some(operator));
            let dispatcher = BroadcastDispatcher::new(
                Arc::new(ConsoleSink),
                config.broadcast.max_rate_limit_retries,
            );
            let delivered = dispatcher.broadcast(&text, &recipients).await;
            print_json(&ApiResponse::ok(json!({
                "recipients": recipients.len(),
                "delivered": delivered,
            })))
        }
        AdminAction::Purge { account } => match ledger.purge(AccountId(account)) {
            Ok(true) => print_json(&ApiResponse::ok(json!({ "purged": account }))),
            Ok(false) => print_json(&ApiResponse::<()>::err(format!(
                "Account not found: {}",
                account
            ))),
            Err(e) => print_json(&ApiResponse::<()>::err(e.to_string())),
        },
    }
}
