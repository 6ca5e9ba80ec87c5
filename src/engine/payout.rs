//! Payout scheduling and settlement.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc};
use tracing::info;

use super::error::{EngineError, PayoutError, PlanError};
use super::wallet::EntryCtx;
use super::{Engine, WalletOp};
use crate::model::{
    InvestmentEvent, InvestmentId, LedgerKind, PayoutEvent, PayoutId, PayoutStatus, PlanRule,
};
use crate::money::Money;
use crate::plan;

/// One row of a payout schedule before it is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PayoutDraft {
    pub month_no: u32,
    pub due_date: NaiveDate,
    pub gross: Money,
    pub admin_charge: Money,
    pub booster: Money,
    pub tds: Money,
    pub net: Money,
}

/// Builds the full schedule for an investment: one payout per month,
/// due on the 25th of each successive month after `started_at`.
///
/// If the first due date would already be past at creation time, the whole
/// schedule shifts forward one month so due dates stay strictly increasing.
pub(crate) fn build_schedule(
    principal: Money,
    months: u32,
    booster_applied: bool,
    rule: &PlanRule,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<PayoutDraft>, PlanError> {
    let start = started_at.date_naive();
    let shift = if due_on(start, 1) <= now.date_naive() {
        1
    } else {
        0
    };
    let mut drafts = Vec::with_capacity(months as usize);
    for month_no in 1..=months {
        let r = plan::monthly_return(principal, month_no, rule, booster_applied)?;
        drafts.push(PayoutDraft {
            month_no,
            due_date: due_on(start, month_no + shift),
            gross: r.gross,
            admin_charge: r.admin_charge,
            booster: r.booster_income,
            tds: Money::ZERO,
            net: r.net_payout,
        });
    }
    Ok(drafts)
}

/// 25th of the n-th month after `start`, clamped to the month's last day.
/// The clamp can never fire for day 25; it exists for robustness.
fn due_on(start: NaiveDate, months_ahead: u32) -> NaiveDate {
    let anchor = start
        .checked_add_months(Months::new(months_ahead))
        .unwrap_or(start);
    anchor
        .with_day(25)
        .unwrap_or_else(|| last_day_of_month(anchor))
}

fn last_day_of_month(d: NaiveDate) -> NaiveDate {
    d.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.checked_sub_days(Days::new(1)))
        .unwrap_or(d)
}

impl Engine {
    /// Picks up a scheduled payout for processing.
    pub fn start_payout(&mut self, id: PayoutId, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition_payout(id, PayoutEvent::Process, None, now)
    }

    /// Settles a payout: requires the external settlement references and
    /// credits the net amount to the user's wallet. Balance, total profit
    /// and total payout move together in a single `payout_credit` entry —
    /// profit is recognized at payment time, not at schedule creation.
    pub fn settle_payout(
        &mut self,
        id: PayoutId,
        rrn: &str,
        gateway: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let payout = self.payouts.get(&id).ok_or(PayoutError::NotFound(id))?;
        let next = payout
            .status
            .transition(PayoutEvent::Pay)
            .ok_or(PayoutError::InvalidTransition {
                status: payout.status,
                event: PayoutEvent::Pay,
            })?;
        if rrn.trim().is_empty() || gateway.trim().is_empty() {
            return Err(PayoutError::MissingSettlementRef.into());
        }
        let user = payout.user;
        let investment = payout.investment;
        let month_no = payout.month_no;
        let net = payout.net_payout;

        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::SettlePayout { amount: net },
            LedgerKind::PayoutCredit,
            EntryCtx {
                investment: Some(investment),
                payout: Some(id),
                note: Some(format!("monthly payout {month_no} settled")),
                reference: Some(rrn.to_string()),
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);

        if let Some(payout) = self.payouts.get_mut(&id) {
            payout.status = next;
            payout.paid_at = Some(now);
            payout.rrn = Some(rrn.to_string());
            payout.gateway = Some(gateway.to_string());
        }
        info!(payout = id, user, amount = %net, "payout settled");
        self.complete_if_done(investment);
        Ok(())
    }

    /// Marks a payout failed. No balance change: nothing was credited yet.
    pub fn fail_payout(
        &mut self,
        id: PayoutId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(PayoutError::MissingReason.into());
        }
        self.transition_payout(id, PayoutEvent::Fail, Some(reason.to_string()), now)
    }

    /// Administrative pause.
    pub fn hold_payout(&mut self, id: PayoutId, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.transition_payout(id, PayoutEvent::Hold, None, now)
    }

    /// Returns a failed or held payout to the schedule.
    pub fn reschedule_payout(
        &mut self,
        id: PayoutId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.transition_payout(id, PayoutEvent::Reschedule, None, now)
    }

    /// Retries a failed or held payout.
    pub fn reprocess_payout(
        &mut self,
        id: PayoutId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.transition_payout(id, PayoutEvent::Reprocess, None, now)
    }

    /// Bookkeeping-only status change. Still writes a ledger entry so the
    /// audit trail covers every payout transition.
    fn transition_payout(
        &mut self,
        id: PayoutId,
        event: PayoutEvent,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let payout = self.payouts.get(&id).ok_or(PayoutError::NotFound(id))?;
        let from = payout.status;
        let next = from
            .transition(event)
            .ok_or(PayoutError::InvalidTransition {
                status: from,
                event,
            })?;
        let user = payout.user;
        let investment = payout.investment;

        let mut note = format!("payout status {from:?} -> {next:?}");
        if let Some(r) = &reason {
            note.push_str(": ");
            note.push_str(r);
        }
        let mut txn = self.begin_txn(user, now)?;
        txn.record_status(
            LedgerKind::PayoutStatus,
            EntryCtx {
                investment: Some(investment),
                payout: Some(id),
                note: Some(note),
                ..EntryCtx::default()
            },
        );
        self.commit(txn);

        if let Some(payout) = self.payouts.get_mut(&id) {
            payout.status = next;
            if reason.is_some() {
                payout.reason = reason;
            }
        }
        Ok(())
    }

    /// Completes the investment once every payout has been paid.
    fn complete_if_done(&mut self, investment: InvestmentId) {
        let Some(inv) = self.investments.get(&investment) else {
            return;
        };
        let all_paid = !inv.payouts.is_empty()
            && inv.payouts.iter().all(|pid| {
                self.payouts
                    .get(pid)
                    .is_some_and(|p| p.status == PayoutStatus::Paid)
            });
        if !all_paid {
            return;
        }
        if let Some(next) = inv.status.transition(InvestmentEvent::Complete) {
            if let Some(inv) = self.investments.get_mut(&investment) {
                inv.status = next;
                info!(investment, "investment completed");
            }
        }
    }
}
