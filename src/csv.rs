use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use rust_decimal::Decimal;

use crate::{Command, Money, UserId, Wallet, WalletOp};

/// Errors that can occur when parsing csv rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized operation '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing amount")]
    MissingAmount { line: usize, op: String },

    #[error("line {line}: invalid amount '{value}'")]
    BadAmount { line: usize, value: String },

    #[error("line {line}: {op} missing note (administrator reason)")]
    MissingNote { line: usize, op: String },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    user: UserId,
    amount: Option<String>,
    note: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    user: UserId,
    balance: String,
    locked: String,
    available: String,
    total_profit: String,
    total_payout: String,
}

fn wallet_op(op: &str, amount: Money) -> Option<WalletOp> {
    Some(match op {
        "credit" => WalletOp::Credit { amount },
        "debit" => WalletOp::Debit { amount },
        "lock" => WalletOp::Lock { amount },
        "unlock" => WalletOp::Unlock { amount },
        "set_balance" => WalletOp::SetBalance { value: amount },
        "set_locked" => WalletOp::SetLocked { value: amount },
        "add_profit" => WalletOp::AddProfit { amount },
        "book_payout" => WalletOp::BookPayout { amount },
        "unbook_payout" => WalletOp::UnbookPayout { amount },
        _ => return None,
    })
}

/// Read administrative wallet commands from a csv file
pub fn read_commands(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Command, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;

            let raw_amount = match row.amount.as_deref() {
                Some(s) if !s.is_empty() => s,
                _ => {
                    return Err(CsvError::MissingAmount {
                        line,
                        op: row.op.clone(),
                    });
                }
            };
            let amount = Decimal::from_str(raw_amount)
                .map(Money::new)
                .map_err(|_| CsvError::BadAmount {
                    line,
                    value: raw_amount.to_string(),
                })?;
            let op = wallet_op(&row.op, amount).ok_or_else(|| CsvError::UnrecognizedOp {
                line,
                op: row.op.clone(),
            })?;
            let note = match row.note {
                Some(note) if !note.trim().is_empty() => note,
                _ => {
                    return Err(CsvError::MissingNote { line, op: row.op });
                }
            };

            Ok(Command {
                user: row.user,
                op,
                note,
            })
        })
}

/// write wallet states to stdout in csv format, sorted by user id
pub fn write_wallets(wallets: impl IntoIterator<Item = (UserId, Wallet)>) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    let mut rows: Vec<(UserId, Wallet)> = wallets.into_iter().collect();
    rows.sort_by_key(|(user, _)| *user);

    for (user, wallet) in rows {
        let row = OutputRow {
            user,
            balance: wallet.balance.to_string(),
            locked: wallet.locked.to_string(),
            available: wallet.available().to_string(),
            total_profit: wallet.total_profit.to_string(),
            total_payout: wallet.total_payout.to_string(),
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}
