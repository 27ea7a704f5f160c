//! Inbound messages and input classification.

use super::state::MessageRef;
use crate::types::AccountId;
use serde::{Deserialize, Serialize};

/// Explicit requests, sent either as slash commands or as button presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Price,
    Buy,
    Sell,
    Balance,
    Portfolio,
    Cancel,
}

impl Command {
    /// Recognize `/command` text and the bare word `cancel` (any case).
    pub fn parse(text: &str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("cancel") {
            return Some(Command::Cancel);
        }

        let name = trimmed.strip_prefix('/')?;
        // Group chats append the bot name: /buy@some_bot
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "price" => Some(Command::Price),
            "buy" => Some(Command::Buy),
            "sell" => Some(Command::Sell),
            "balance" => Some(Command::Balance),
            "portfolio" | "profile" => Some(Command::Portfolio),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}

/// Body of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    Text(String),
}

impl Message {
    pub fn parse(text: &str) -> Self {
        Command::parse(text)
            .map(Message::Command)
            .unwrap_or_else(|| Message::Text(text.trim().to_string()))
    }
}

/// One message from one account, as handed over by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub account: AccountId,
    /// Platform handle of the sender, if it has one
    pub handle: Option<String>,
    pub message: Message,
    /// Message the reply should update (e.g. the one carrying the button)
    pub anchor: Option<MessageRef>,
}

impl Inbound {
    /// Typed text, classified into a command or free text.
    pub fn text(account: AccountId, text: &str) -> Self {
        Self {
            account,
            handle: None,
            message: Message::parse(text),
            anchor: None,
        }
    }

    /// A button press or other explicit command.
    pub fn command(account: AccountId, command: Command) -> Self {
        Self {
            account,
            handle: None,
            message: Message::Command(command),
            anchor: None,
        }
    }

    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    pub fn with_anchor(mut self, anchor: MessageRef) -> Self {
        self.anchor = Some(anchor);
        self
    }
}

/// Parse a share amount: a positive integer with no sign or decimals.
pub fn parse_amount(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse::<u32>().ok().filter(|amount| *amount > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(Command::parse("/buy"), Some(Command::Buy));
        assert_eq!(Command::parse(" /SELL "), Some(Command::Sell));
        assert_eq!(Command::parse("/price@stock_bot"), Some(Command::Price));
        assert_eq!(Command::parse("/profile"), Some(Command::Portfolio));
        assert_eq!(Command::parse("Cancel"), Some(Command::Cancel));
        assert_eq!(Command::parse("/cancel"), Some(Command::Cancel));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("buy"), None);
    }

    #[test]
    fn test_message_parse() {
        assert_eq!(Message::parse("/start"), Message::Command(Command::Start));
        assert_eq!(Message::parse(" aapl "), Message::Text("aapl".to_string()));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("10"), Some(10));
        assert_eq!(parse_amount(" 7 "), Some(7));
        assert_eq!(parse_amount("0"), None);
        assert_eq!(parse_amount("-3"), None);
        assert_eq!(parse_amount("+3"), None);
        assert_eq!(parse_amount("1.5"), None);
        assert_eq!(parse_amount("ten"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("99999999999"), None);
    }

    #[test]
    fn test_inbound_builders() {
        let inbound = Inbound::text(AccountId(3), "/buy")
            .with_handle("trader")
            .with_anchor(42);
        assert_eq!(inbound.message, Message::Command(Command::Buy));
        assert_eq!(inbound.handle.as_deref(), Some("trader"));
        assert_eq!(inbound.anchor, Some(42));
    }
}
