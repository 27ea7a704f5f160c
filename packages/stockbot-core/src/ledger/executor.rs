//! Buy/sell execution as single statement groups.

use super::{Completion, Ledger};
use crate::types::{AccountId, Symbol, TradeSide, TransactionRecord};
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Result of a trade that reached the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TradeOutcome {
    /// Shares bought and cash debited.
    Bought {
        record: TransactionRecord,
        total: Decimal,
        balance: Decimal,
    },
    /// Shares sold and cash credited.
    Sold {
        record: TransactionRecord,
        total: Decimal,
        balance: Decimal,
    },
    /// Cash does not cover the purchase; nothing was written.
    InsufficientFunds {
        amount: i64,
        total: Decimal,
        balance: Decimal,
    },
    /// The holding is smaller than the sale; nothing was written.
    InsufficientShares { amount: i64, owned: i64 },
}

impl Ledger {
    /// Apply a buy (`signed_amount > 0`) or sell (`signed_amount < 0`) of
    /// `symbol` at `unit_price`.
    ///
    /// Cash, holding and history change together or not at all. Price
    /// staleness must already have been checked by the caller.
    pub fn execute(
        &self,
        account: AccountId,
        symbol: &Symbol,
        signed_amount: i64,
        unit_price: Decimal,
    ) -> Result<TradeOutcome> {
        let side = match signed_amount {
            a if a > 0 => TradeSide::Buy,
            a if a < 0 => TradeSide::Sell,
            _ => {
                return Err(Error::InvalidOperation(
                    "Trade amount must not be zero".to_string(),
                ))
            }
        };
        let amount = signed_amount.checked_abs().ok_or_else(|| {
            Error::InvalidOperation(format!("Trade amount {} is out of range", signed_amount))
        })?;

        let result = Decimal::from(amount)
            .checked_mul(unit_price)
            .ok_or_else(|| {
                Error::Constraint(format!(
                    "total of {} x {} is out of range",
                    amount, unit_price
                ))
            })
            .and_then(|total| {
                self.transaction(|state| match side {
                    TradeSide::Buy => {
                        let cash = state.account_mut(account)?.cash;
                        if cash < total {
                            return Ok(Completion::Rollback(TradeOutcome::InsufficientFunds {
                                amount,
                                total,
                                balance: cash,
                            }));
                        }

                        let balance = checked_balance(cash.checked_sub(total), account)?;
                        state.account_mut(account)?.cash = balance;
                        state.adjust_holding(account, symbol, signed_amount)?;
                        let record = state.append_record(account, symbol, unit_price, signed_amount);
                        Ok(Completion::Commit(TradeOutcome::Bought {
                            record,
                            total,
                            balance,
                        }))
                    }
                    TradeSide::Sell => {
                        let cash = state.account_mut(account)?.cash;
                        let owned = state.holding_quantity(account, symbol);
                        if owned < amount {
                            return Ok(Completion::Rollback(TradeOutcome::InsufficientShares {
                                amount,
                                owned,
                            }));
                        }

                        let balance = checked_balance(cash.checked_add(total), account)?;
                        state.account_mut(account)?.cash = balance;
                        state.adjust_holding(account, symbol, signed_amount)?;
                        let record = state.append_record(account, symbol, unit_price, signed_amount);
                        Ok(Completion::Commit(TradeOutcome::Sold {
                            record,
                            total,
                            balance,
                        }))
                    }
                })
            });

        match &result {
            Ok(TradeOutcome::Bought { total, .. }) | Ok(TradeOutcome::Sold { total, .. }) => {
                tracing::info!(
                    "Account {} {} {} {} at {} (total {})",
                    account,
                    side,
                    amount,
                    symbol,
                    unit_price,
                    total
                );
            }
            Ok(outcome) => {
                tracing::info!("Account {} {} {} rejected: {:?}", account, side, symbol, outcome);
            }
            Err(e) => {
                tracing::error!(
                    "Rolled back {} of {} {} for account {}: {}",
                    side,
                    amount,
                    symbol,
                    account,
                    e
                );
            }
        }

        result
    }
}

fn checked_balance(balance: Option<Decimal>, account: AccountId) -> Result<Decimal> {
    balance.ok_or_else(|| Error::Constraint(format!("cash of {} is out of range", account)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn ledger_with_cash(cash: Decimal) -> Ledger {
        let ledger = Ledger::in_memory();
        ledger.ensure_account(AccountId(1), cash, None).unwrap();
        ledger
    }

    #[test]
    fn test_buy_debits_and_records() {
        let ledger = ledger_with_cash(dec!(10000.00));
        let x = sym("X");

        let outcome = ledger.execute(AccountId(1), &x, 10, dec!(152.90)).unwrap();

        match outcome {
            TradeOutcome::Bought {
                record,
                total,
                balance,
            } => {
                assert_eq!(total, dec!(1529.00));
                assert_eq!(balance, dec!(8471.00));
                assert_eq!(record.quantity, 10);
                assert_eq!(record.price, dec!(152.90));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(ledger.cash(AccountId(1)), Some(dec!(8471.00)));
        assert_eq!(ledger.holding(AccountId(1), &x), 10);
        assert_eq!(ledger.history(AccountId(1), &x).len(), 1);
    }

    #[test]
    fn test_buy_upserts_holding() {
        let ledger = ledger_with_cash(dec!(10000));
        let x = sym("X");

        ledger.execute(AccountId(1), &x, 3, dec!(10)).unwrap();
        ledger.execute(AccountId(1), &x, 4, dec!(12)).unwrap();

        assert_eq!(ledger.holding(AccountId(1), &x), 7);
        assert_eq!(ledger.holdings(AccountId(1)).len(), 1);
        assert_eq!(ledger.cash(AccountId(1)), Some(dec!(9922)));
    }

    #[test]
    fn test_buy_insufficient_funds_is_atomic() {
        let ledger = ledger_with_cash(dec!(1000));
        let before = ledger.read(|s| s.clone());

        let outcome = ledger.execute(AccountId(1), &sym("X"), 100, dec!(150)).unwrap();

        assert_eq!(
            outcome,
            TradeOutcome::InsufficientFunds {
                amount: 100,
                total: dec!(15000),
                balance: dec!(1000),
            }
        );
        assert_eq!(ledger.read(|s| s.clone()), before);
    }

    #[test]
    fn test_buy_exact_balance() {
        let ledger = ledger_with_cash(dec!(300));
        let outcome = ledger.execute(AccountId(1), &sym("X"), 2, dec!(150)).unwrap();
        assert!(matches!(outcome, TradeOutcome::Bought { .. }));
        assert_eq!(ledger.cash(AccountId(1)), Some(dec!(0)));
    }

    #[test]
    fn test_sell_credits_and_records_negative() {
        let ledger = ledger_with_cash(dec!(10000));
        let x = sym("X");
        ledger.execute(AccountId(1), &x, 10, dec!(100)).unwrap();

        let outcome = ledger.execute(AccountId(1), &x, -4, dec!(110)).unwrap();

        match outcome {
            TradeOutcome::Sold {
                record,
                total,
                balance,
            } => {
                assert_eq!(record.quantity, -4);
                assert_eq!(total, dec!(440));
                assert_eq!(balance, dec!(9440));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(ledger.holding(AccountId(1), &x), 6);
    }

    #[test]
    fn test_sell_full_position_deletes_holding() {
        let ledger = ledger_with_cash(dec!(10000));
        let x = sym("X");
        ledger.execute(AccountId(1), &x, 5, dec!(20)).unwrap();

        ledger.execute(AccountId(1), &x, -5, dec!(20)).unwrap();

        assert!(ledger.holdings(AccountId(1)).is_empty());
        assert_eq!(ledger.holding(AccountId(1), &x), 0);
        assert_eq!(ledger.history(AccountId(1), &x).len(), 2);
    }

    #[test]
    fn test_sell_insufficient_shares() {
        let ledger = ledger_with_cash(dec!(10000));
        let x = sym("X");
        ledger.execute(AccountId(1), &x, 2, dec!(20)).unwrap();
        let before = ledger.read(|s| s.clone());

        let outcome = ledger.execute(AccountId(1), &x, -3, dec!(20)).unwrap();
        assert_eq!(
            outcome,
            TradeOutcome::InsufficientShares {
                amount: 3,
                owned: 2
            }
        );

        let outcome = ledger.execute(AccountId(1), &sym("Y"), -1, dec!(20)).unwrap();
        assert_eq!(
            outcome,
            TradeOutcome::InsufficientShares {
                amount: 1,
                owned: 0
            }
        );
        assert_eq!(ledger.read(|s| s.clone()), before);
    }

    #[test]
    fn test_unknown_account_is_error() {
        let ledger = Ledger::in_memory();
        let result = ledger.execute(AccountId(9), &sym("X"), 1, dec!(1));
        assert!(matches!(result, Err(Error::AccountNotFound(_))));
        assert!(ledger.read(|s| s.history.is_empty()));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let ledger = ledger_with_cash(dec!(10));
        assert!(matches!(
            ledger.execute(AccountId(1), &sym("X"), 0, dec!(1)),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_overflowing_total_is_error() {
        let ledger = ledger_with_cash(dec!(10000));
        let before = ledger.read(|s| s.clone());

        let result = ledger.execute(AccountId(1), &sym("X"), i64::MAX, dec!(100000000000));

        assert!(matches!(result, Err(Error::Constraint(_))));
        assert_eq!(ledger.read(|s| s.clone()), before);
    }

    #[test]
    fn test_extreme_amounts() {
        let ledger = ledger_with_cash(dec!(10000));
        let before = ledger.read(|s| s.clone());

        assert!(matches!(
            ledger.execute(AccountId(1), &sym("X"), i64::MIN, dec!(1)),
            Err(Error::InvalidOperation(_))
        ));
        assert_eq!(
            ledger.execute(AccountId(1), &sym("X"), -i64::MAX, dec!(1)).unwrap(),
            TradeOutcome::InsufficientShares {
                amount: i64::MAX,
                owned: 0
            }
        );
        assert_eq!(
            ledger.execute(AccountId(1), &sym("X"), i64::MAX, dec!(1)).unwrap(),
            TradeOutcome::InsufficientFunds {
                amount: i64::MAX,
                total: Decimal::from(i64::MAX),
                balance: dec!(10000),
            }
        );
        assert_eq!(ledger.read(|s| s.clone()), before);
    }

    #[test]
    fn test_sell_credit_overflow_is_error() {
        let ledger = ledger_with_cash(Decimal::MAX);
        let x = sym("X");
        ledger.execute(AccountId(1), &x, 1, dec!(1)).unwrap();
        let before = ledger.read(|s| s.clone());

        let result = ledger.execute(AccountId(1), &x, -1, dec!(10));

        assert!(matches!(result, Err(Error::Constraint(_))));
        assert_eq!(ledger.read(|s| s.clone()), before);
        assert_eq!(ledger.holding(AccountId(1), &x), 1);
    }

    #[test]
    fn test_ledger_conservation() {
        let initial = dec!(10000.00);
        let ledger = ledger_with_cash(initial);
        let (x, y) = (sym("X"), sym("Y"));
        let trades = [
            (&x, 10, dec!(152.90)),
            (&y, 3, dec!(99.99)),
            (&x, -4, dec!(160.10)),
            (&y, -3, dec!(101.01)),
            (&x, 2, dec!(149.37)),
            (&x, -8, dec!(150.00)),
        ];

        let mut bought = Decimal::ZERO;
        let mut sold = Decimal::ZERO;
        for (symbol, amount, price) in trades {
            match ledger.execute(AccountId(1), symbol, amount, price).unwrap() {
                TradeOutcome::Bought { total, .. } => bought += total,
                TradeOutcome::Sold { total, .. } => sold += total,
                other => panic!("unexpected outcome: {:?}", other),
            }
        }

        let cash = ledger.cash(AccountId(1)).unwrap();
        assert_eq!(initial - cash, bought - sold);
        for symbol in [&x, &y] {
            let signed: i64 = ledger
                .history(AccountId(1), symbol)
                .iter()
                .map(|r| r.quantity)
                .sum();
            assert_eq!(signed, ledger.holding(AccountId(1), symbol));
        }
        assert!(ledger.holdings(AccountId(1)).is_empty());
    }
}
