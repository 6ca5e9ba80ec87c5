//! Wallet ledger operations.
//!
//! Every mutation of a user's wallet goes through [`WalletOp`]. Operations
//! are validated in full before anything is written; a failed operation
//! leaves the wallet and the ledger exactly as they were.

use chrono::{DateTime, Utc};

use super::error::WalletError;
use crate::model::{
    Direction, InvestmentId, LedgerEntry, LedgerKind, PayoutId, UserId, Wallet, WithdrawalId,
};
use crate::money::Money;

/// A single wallet mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletOp {
    /// balance += amount
    Credit { amount: Money },
    /// balance -= amount; requires amount <= available
    Debit { amount: Money },
    /// locked += amount; requires amount <= available
    Lock { amount: Money },
    /// locked -= amount; requires amount <= locked
    Unlock { amount: Money },
    /// balance = value; requires value >= locked
    SetBalance { value: Money },
    /// locked = value; requires value <= balance
    SetLocked { value: Money },
    /// balance += amount; total_profit += amount
    AddProfit { amount: Money },
    /// total_payout += amount, no balance change
    BookPayout { amount: Money },
    /// total_payout -= amount; requires amount <= total_payout
    UnbookPayout { amount: Money },
    /// balance += amount; total_profit += amount; total_payout += amount.
    /// Used by payout settlement so a paid payout is one ledger entry.
    SettlePayout { amount: Money },
}

/// Direction and magnitude actually recorded for an applied operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Applied {
    pub direction: Direction,
    pub amount: Money,
}

fn require_positive(amount: Money) -> Result<Money, WalletError> {
    if amount.is_positive() {
        Ok(amount)
    } else {
        Err(WalletError::InvalidAmount(amount))
    }
}

/// Validates and applies one operation to `wallet`.
///
/// The caller passes a staged copy; nothing observable changes until the
/// surrounding transaction commits.
pub(crate) fn apply(wallet: &mut Wallet, op: &WalletOp) -> Result<Applied, WalletError> {
    match *op {
        WalletOp::Credit { amount } => {
            let amount = require_positive(amount)?;
            wallet.balance += amount;
            Ok(Applied {
                direction: Direction::Credit,
                amount,
            })
        }
        WalletOp::Debit { amount } => {
            let amount = require_positive(amount)?;
            if amount > wallet.available() {
                return Err(WalletError::InsufficientAvailable {
                    available: wallet.available(),
                    requested: amount,
                });
            }
            wallet.balance -= amount;
            Ok(Applied {
                direction: Direction::Debit,
                amount,
            })
        }
        WalletOp::Lock { amount } => {
            let amount = require_positive(amount)?;
            if amount > wallet.available() {
                return Err(WalletError::InsufficientAvailable {
                    available: wallet.available(),
                    requested: amount,
                });
            }
            wallet.locked += amount;
            Ok(Applied {
                direction: Direction::None,
                amount,
            })
        }
        WalletOp::Unlock { amount } => {
            let amount = require_positive(amount)?;
            if amount > wallet.locked {
                return Err(WalletError::InsufficientLocked {
                    locked: wallet.locked,
                    requested: amount,
                });
            }
            wallet.locked -= amount;
            Ok(Applied {
                direction: Direction::None,
                amount,
            })
        }
        WalletOp::SetBalance { value } => {
            if value.is_negative() {
                return Err(WalletError::InvalidAmount(value));
            }
            if value < wallet.locked {
                return Err(WalletError::AvailabilityViolated {
                    balance: value,
                    locked: wallet.locked,
                });
            }
            let old = wallet.balance;
            wallet.balance = value;
            let direction = if value > old {
                Direction::Credit
            } else if value < old {
                Direction::Debit
            } else {
                Direction::None
            };
            Ok(Applied {
                direction,
                amount: (value - old).abs(),
            })
        }
        WalletOp::SetLocked { value } => {
            if value.is_negative() {
                return Err(WalletError::InvalidAmount(value));
            }
            if value > wallet.balance {
                return Err(WalletError::AvailabilityViolated {
                    balance: wallet.balance,
                    locked: value,
                });
            }
            let old = wallet.locked;
            wallet.locked = value;
            // inverse sense: a larger hold takes funds out of the free pool
            let direction = if value < old {
                Direction::Credit
            } else if value > old {
                Direction::Debit
            } else {
                Direction::None
            };
            Ok(Applied {
                direction,
                amount: (value - old).abs(),
            })
        }
        WalletOp::AddProfit { amount } => {
            let amount = require_positive(amount)?;
            wallet.balance += amount;
            wallet.total_profit += amount;
            Ok(Applied {
                direction: Direction::Credit,
                amount,
            })
        }
        WalletOp::BookPayout { amount } => {
            let amount = require_positive(amount)?;
            wallet.total_payout += amount;
            Ok(Applied {
                direction: Direction::None,
                amount,
            })
        }
        WalletOp::UnbookPayout { amount } => {
            let amount = require_positive(amount)?;
            if amount > wallet.total_payout {
                return Err(WalletError::PayoutBookUnderflow {
                    recorded: wallet.total_payout,
                    requested: amount,
                });
            }
            wallet.total_payout -= amount;
            Ok(Applied {
                direction: Direction::None,
                amount,
            })
        }
        WalletOp::SettlePayout { amount } => {
            let amount = require_positive(amount)?;
            wallet.balance += amount;
            wallet.total_profit += amount;
            wallet.total_payout += amount;
            Ok(Applied {
                direction: Direction::Credit,
                amount,
            })
        }
    }
}

/// Audit context attached to a ledger entry.
#[derive(Debug, Clone, Default)]
pub(crate) struct EntryCtx {
    pub investment: Option<InvestmentId>,
    pub payout: Option<PayoutId>,
    pub withdrawal: Option<WithdrawalId>,
    pub note: Option<String>,
    pub reference: Option<String>,
}

/// Staged wallet mutation: operations apply to a working copy and collect
/// ledger entries; the engine commits both together only when every step
/// has succeeded. Dropping the transaction discards everything.
#[derive(Debug)]
pub(crate) struct WalletTxn {
    user: UserId,
    wallet: Wallet,
    entries: Vec<LedgerEntry>,
    at: DateTime<Utc>,
}

impl WalletTxn {
    pub fn begin(user: UserId, wallet: Wallet, at: DateTime<Utc>) -> Self {
        Self {
            user,
            wallet,
            entries: Vec::new(),
            at,
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Applies one operation and records its ledger entry.
    pub fn apply(
        &mut self,
        op: &WalletOp,
        kind: LedgerKind,
        ctx: EntryCtx,
    ) -> Result<(), WalletError> {
        let before = self.wallet;
        let applied = apply(&mut self.wallet, op)?;
        self.push_entry(kind, applied.direction, applied.amount, before, ctx);
        Ok(())
    }

    /// Records a bookkeeping-only entry (status change, no wallet effect).
    pub fn record_status(&mut self, kind: LedgerKind, ctx: EntryCtx) {
        let before = self.wallet;
        self.push_entry(kind, Direction::None, Money::ZERO, before, ctx);
    }

    fn push_entry(
        &mut self,
        kind: LedgerKind,
        direction: Direction,
        amount: Money,
        before: Wallet,
        ctx: EntryCtx,
    ) {
        self.entries.push(LedgerEntry {
            user: self.user,
            investment: ctx.investment,
            payout: ctx.payout,
            withdrawal: ctx.withdrawal,
            kind,
            direction,
            amount,
            balance_before: before.balance,
            balance_after: self.wallet.balance,
            locked_before: before.locked,
            locked_after: self.wallet.locked,
            note: ctx.note,
            reference: ctx.reference,
            at: self.at,
        });
    }

    pub fn into_parts(self) -> (UserId, Wallet, Vec<LedgerEntry>) {
        (self.user, self.wallet, self.entries)
    }
}
