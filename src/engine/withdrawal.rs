//! Withdrawal request workflow.

use chrono::{DateTime, Utc};
use tracing::info;

use super::error::{EngineError, WithdrawalError};
use super::wallet::EntryCtx;
use super::{Engine, WalletOp};
use crate::model::{
    LedgerKind, UserId, Withdrawal, WithdrawalEvent, WithdrawalId, WithdrawalSource,
    WithdrawalStatus,
};
use crate::money::Money;

impl Engine {
    /// Requests a withdrawal of `amount` from available balance. Charges and
    /// TDS come off the requested amount (`net = amount - charges - tds`);
    /// the full gross amount is locked until review completes.
    pub fn request_withdrawal(
        &mut self,
        user: UserId,
        amount: Money,
        source: WithdrawalSource,
        now: DateTime<Utc>,
    ) -> Result<WithdrawalId, EngineError> {
        if amount < self.config.min_withdrawal {
            return Err(WithdrawalError::BelowMinimum {
                amount,
                minimum: self.config.min_withdrawal,
            }
            .into());
        }
        let charges = self
            .config
            .withdrawal_charge_rate
            .of(amount)
            .min(self.config.withdrawal_charge_cap);
        let tds = self.config.withdrawal_tds_rate.of(amount);
        let net_amount = amount - charges - tds;
        if !net_amount.is_positive() {
            return Err(WithdrawalError::NonPositiveNet(net_amount).into());
        }

        let id = self.next_withdrawal;
        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::Lock { amount },
            LedgerKind::WithdrawalLock,
            EntryCtx {
                withdrawal: Some(id),
                note: Some("withdrawal requested, amount held".to_string()),
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);
        self.next_withdrawal += 1;
        self.withdrawals.insert(
            id,
            Withdrawal {
                id,
                user,
                amount,
                source,
                charges,
                tds,
                net_amount,
                status: WithdrawalStatus::UnderAdminReview,
                reason: None,
                paid_at: None,
                rrn: None,
                gateway: None,
                created_at: now,
            },
        );
        info!(withdrawal = id, user, amount = %amount, net = %net_amount, "withdrawal requested");
        Ok(id)
    }

    /// Approves a withdrawal: releases the full hold, then debits the net
    /// amount. The release comes first so the debit is checked against the
    /// whole balance; the difference (charges + tds) stays in balance as
    /// platform revenue.
    pub fn approve_withdrawal(
        &mut self,
        id: WithdrawalId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let wd = self
            .withdrawals
            .get(&id)
            .ok_or(WithdrawalError::NotFound(id))?;
        let next = wd
            .status
            .transition(WithdrawalEvent::Approve)
            .ok_or(WithdrawalError::InvalidTransition {
                status: wd.status,
                event: WithdrawalEvent::Approve,
            })?;
        let (user, amount, net) = (wd.user, wd.amount, wd.net_amount);

        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::Unlock { amount },
            LedgerKind::WithdrawalUnlock,
            EntryCtx {
                withdrawal: Some(id),
                note: Some("hold released on approval".to_string()),
                ..EntryCtx::default()
            },
        )?;
        txn.apply(
            &WalletOp::Debit { amount: net },
            LedgerKind::WithdrawalDebit,
            EntryCtx {
                withdrawal: Some(id),
                note: Some("net amount debited on approval".to_string()),
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);
        if let Some(wd) = self.withdrawals.get_mut(&id) {
            wd.status = next;
        }
        info!(withdrawal = id, user, net = %net, "withdrawal approved");
        Ok(())
    }

    /// Rejects a withdrawal under review: the hold is released, balance is
    /// untouched.
    pub fn reject_withdrawal(
        &mut self,
        id: WithdrawalId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WithdrawalError::MissingReason.into());
        }
        let wd = self
            .withdrawals
            .get(&id)
            .ok_or(WithdrawalError::NotFound(id))?;
        let next = wd
            .status
            .transition(WithdrawalEvent::Reject)
            .ok_or(WithdrawalError::InvalidTransition {
                status: wd.status,
                event: WithdrawalEvent::Reject,
            })?;
        let (user, amount) = (wd.user, wd.amount);

        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::Unlock { amount },
            LedgerKind::WithdrawalUnlock,
            EntryCtx {
                withdrawal: Some(id),
                note: Some(format!("rejected: {reason}")),
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);
        if let Some(wd) = self.withdrawals.get_mut(&id) {
            wd.status = next;
            wd.reason = Some(reason.to_string());
        }
        info!(withdrawal = id, user, "withdrawal rejected");
        Ok(())
    }

    /// Marks an approved withdrawal as physically settled. Books the net
    /// amount into the payout total; the balance was already debited at
    /// approval.
    pub fn settle_withdrawal(
        &mut self,
        id: WithdrawalId,
        rrn: &str,
        gateway: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let wd = self
            .withdrawals
            .get(&id)
            .ok_or(WithdrawalError::NotFound(id))?;
        let next = wd
            .status
            .transition(WithdrawalEvent::MarkPaid)
            .ok_or(WithdrawalError::InvalidTransition {
                status: wd.status,
                event: WithdrawalEvent::MarkPaid,
            })?;
        if rrn.trim().is_empty() || gateway.trim().is_empty() {
            return Err(WithdrawalError::MissingSettlementRef.into());
        }
        let (user, net) = (wd.user, wd.net_amount);

        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::BookPayout { amount: net },
            LedgerKind::WithdrawalPaid,
            EntryCtx {
                withdrawal: Some(id),
                note: Some("withdrawal settled".to_string()),
                reference: Some(rrn.to_string()),
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);
        if let Some(wd) = self.withdrawals.get_mut(&id) {
            wd.status = next;
            wd.paid_at = Some(now);
            wd.rrn = Some(rrn.to_string());
            wd.gateway = Some(gateway.to_string());
        }
        info!(withdrawal = id, user, net = %net, "withdrawal settled");
        Ok(())
    }

    /// Marks an approved withdrawal as failed at the payment rail and
    /// refunds the net amount, reversing the approval debit.
    pub fn fail_withdrawal(
        &mut self,
        id: WithdrawalId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(WithdrawalError::MissingReason.into());
        }
        let wd = self
            .withdrawals
            .get(&id)
            .ok_or(WithdrawalError::NotFound(id))?;
        let next = wd
            .status
            .transition(WithdrawalEvent::MarkFailed)
            .ok_or(WithdrawalError::InvalidTransition {
                status: wd.status,
                event: WithdrawalEvent::MarkFailed,
            })?;
        let (user, net) = (wd.user, wd.net_amount);

        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::Credit { amount: net },
            LedgerKind::WithdrawalRefund,
            EntryCtx {
                withdrawal: Some(id),
                note: Some(format!("settlement failed, net refunded: {reason}")),
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);
        if let Some(wd) = self.withdrawals.get_mut(&id) {
            wd.status = next;
            wd.reason = Some(reason.to_string());
        }
        info!(withdrawal = id, user, net = %net, "withdrawal failed and refunded");
        Ok(())
    }
}
