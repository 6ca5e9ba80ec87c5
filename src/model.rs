//! Core domain types for the investment platform.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::{Money, Rate};

/// User identifier.
pub type UserId = u64;

/// Investment identifier.
pub type InvestmentId = u64;

/// Payout identifier.
pub type PayoutId = u64;

/// Withdrawal identifier.
pub type WithdrawalId = u64;

/// Plan rule version, unique and monotonically increasing.
pub type PlanVersion = u32;

/// Longest payout schedule the engine will generate.
pub const MAX_SCHEDULE_MONTHS: u32 = 120;

/// A user's wallet. Mutated only through ledger operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Wallet {
    /// Spendable funds, never negative.
    pub balance: Money,
    /// Funds held against in-flight withdrawals.
    pub locked: Money,
    /// Cumulative profit ever credited.
    pub total_profit: Money,
    /// Cumulative amount ever paid out.
    pub total_payout: Money,
}

impl Wallet {
    /// The portion of the balance not reserved by a hold.
    pub fn available(&self) -> Money {
        self.balance - self.locked
    }
}

/// Whether a ledger entry grew, shrank, or did not change the user's free
/// funds. `None` covers holds and pure counter updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
    None,
}

/// The operation a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    /// Principal credited on investment approval.
    InvestmentCredit,
    /// Monthly payout settled to the wallet.
    PayoutCredit,
    /// Payout status change with no balance effect.
    PayoutStatus,
    /// Hold placed when a withdrawal is requested.
    WithdrawalLock,
    /// Hold released on withdrawal approval or rejection.
    WithdrawalUnlock,
    /// Net amount debited on withdrawal approval.
    WithdrawalDebit,
    /// Net amount refunded after a failed settlement.
    WithdrawalRefund,
    /// Settled withdrawal booked into the payout total.
    WithdrawalPaid,
    /// Referral commission credit.
    ReferralCredit,
    AdminCredit,
    AdminDebit,
    AdminLock,
    AdminUnlock,
    AdminSetBalance,
    AdminSetLocked,
    /// Administrative profit override, kept distinct from `PayoutCredit` so
    /// audits can separate the two profit sources.
    AdminProfitCredit,
    AdminPayoutBook,
    /// Administrative settlement outside the payout records.
    AdminSettlement,
}

/// One append-only record of a wallet mutation. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub user: UserId,
    pub investment: Option<InvestmentId>,
    pub payout: Option<PayoutId>,
    pub withdrawal: Option<WithdrawalId>,
    pub kind: LedgerKind,
    pub direction: Direction,
    /// Magnitude of the change; the direction encodes the sign.
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub locked_before: Money,
    pub locked_after: Money,
    /// Human-readable reason, mandatory for administrator actions.
    pub note: Option<String>,
    /// External settlement reference (e.g. RRN).
    pub reference: Option<String>,
    pub at: DateTime<Utc>,
}

/// Investment lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Initiated,
    UnderReview,
    Active,
    Rejected,
    Completed,
    Cancelled,
}

/// Events that drive the investment state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvestmentEvent {
    SubmitProof,
    Approve,
    Reject,
    Complete,
    Cancel,
}

impl InvestmentStatus {
    /// Transition table. Returns `None` when the event is not allowed from
    /// the current status.
    pub fn transition(self, event: InvestmentEvent) -> Option<InvestmentStatus> {
        use InvestmentEvent::*;
        use InvestmentStatus::*;
        match (self, event) {
            (Initiated, SubmitProof) => Some(UnderReview),
            (Initiated | UnderReview, Approve) => Some(Active),
            (Initiated | UnderReview, Reject) => Some(Rejected),
            (Active, Complete) => Some(Completed),
            (Active, Cancel) => Some(Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvestmentStatus::Rejected | InvestmentStatus::Completed | InvestmentStatus::Cancelled
        )
    }
}

/// One user's principal commitment to a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Investment {
    pub id: InvestmentId,
    pub user: UserId,
    pub principal: Money,
    pub method: String,
    pub proof_url: Option<String>,
    /// Payment reference supplied with the proof.
    pub utr: Option<String>,
    pub status: InvestmentStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Plan rule version snapshotted at creation; fixes the terms for the
    /// life of the investment even if plan rules change later.
    pub plan_version: PlanVersion,
    pub plan_name: String,
    pub month_duration: u32,
    pub booster_applied: bool,
    /// Payouts owned by this investment, in month order.
    pub payouts: Vec<PayoutId>,
    pub remarks: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Payout lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Scheduled,
    Processing,
    Reprocessing,
    Paid,
    Failed,
    OnHold,
}

/// Events that drive the payout state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayoutEvent {
    Process,
    Pay,
    Fail,
    Hold,
    Reschedule,
    Reprocess,
}

impl PayoutStatus {
    pub fn transition(self, event: PayoutEvent) -> Option<PayoutStatus> {
        use PayoutEvent::*;
        use PayoutStatus::*;
        match (self, event) {
            (Scheduled, Process) => Some(Processing),
            (Processing | Reprocessing, Pay) => Some(Paid),
            (Processing | Reprocessing, Fail) => Some(Failed),
            (Processing, Hold) => Some(OnHold),
            (Failed | OnHold, Reschedule) => Some(Scheduled),
            (Failed | OnHold, Reprocess) => Some(Reprocessing),
            _ => None,
        }
    }
}

/// One scheduled monthly disbursement belonging to exactly one investment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    pub id: PayoutId,
    pub investment: InvestmentId,
    pub user: UserId,
    /// 1-based month number within the investment.
    pub month_no: u32,
    pub due_date: NaiveDate,
    pub gross_payout: Money,
    pub admin_charge: Money,
    pub booster: Money,
    pub tds: Money,
    pub net_payout: Money,
    pub status: PayoutStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub rrn: Option<String>,
    pub gateway: Option<String>,
    pub reason: Option<String>,
}

/// Withdrawal lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStatus {
    UnderAdminReview,
    Approved,
    Paid,
    Rejected,
    Failed,
}

/// Events that drive the withdrawal state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalEvent {
    Approve,
    Reject,
    MarkPaid,
    MarkFailed,
}

impl WithdrawalStatus {
    pub fn transition(self, event: WithdrawalEvent) -> Option<WithdrawalStatus> {
        use WithdrawalEvent::*;
        use WithdrawalStatus::*;
        match (self, event) {
            (UnderAdminReview, Approve) => Some(Approved),
            (UnderAdminReview, Reject) => Some(Rejected),
            (Approved, MarkPaid) => Some(Paid),
            (Approved, MarkFailed) => Some(Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WithdrawalStatus::Paid | WithdrawalStatus::Rejected | WithdrawalStatus::Failed
        )
    }
}

/// Which earnings pool a withdrawal draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalSource {
    Earnings,
    Referral,
}

/// One user request to move funds out of the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user: UserId,
    /// Requested gross amount; this is what gets locked.
    pub amount: Money,
    pub source: WithdrawalSource,
    pub charges: Money,
    pub tds: Money,
    /// Amount actually paid if approved: `amount - charges - tds`.
    pub net_amount: Money,
    pub status: WithdrawalStatus,
    pub reason: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub rrn: Option<String>,
    pub gateway: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A contiguous month range with an associated monthly interest rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBand {
    pub from_month: u32,
    pub to_month: u32,
    pub monthly_rate: Rate,
}

/// Versioned, time-banded interest schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRule {
    pub name: String,
    pub min_amount: Money,
    /// Principal threshold for the flat special rate. Non-positive disables
    /// the special tier.
    pub special_min: Money,
    /// Ordered, contiguous from month 1.
    pub bands: Vec<RateBand>,
    pub special_rate: Rate,
    pub admin_charge: Rate,
    pub booster: Rate,
    pub active: bool,
    pub version: PlanVersion,
    pub effective_from: DateTime<Utc>,
}

impl PlanRule {
    /// Structural validation: at least one band, ordered and contiguous
    /// starting at month 1.
    pub fn validate(&self) -> Result<(), crate::engine::PlanError> {
        use crate::engine::PlanError;
        if self.bands.is_empty() {
            return Err(PlanError::NoBands);
        }
        let mut expected_from = 1;
        for band in &self.bands {
            if band.from_month != expected_from || band.to_month < band.from_month {
                return Err(PlanError::MalformedBands);
            }
            expected_from = band.to_month + 1;
        }
        Ok(())
    }

    /// Rate for a given month. Months beyond the last band fall back to the
    /// last band's rate.
    pub fn rate_for_month(&self, month_no: u32) -> Rate {
        self.bands
            .iter()
            .find(|b| b.from_month <= month_no && month_no <= b.to_month)
            .map(|b| b.monthly_rate)
            .unwrap_or_else(|| {
                self.bands
                    .last()
                    .map(|b| b.monthly_rate)
                    .unwrap_or(Rate::ZERO)
            })
    }
}
