//! Error types for the platform engine.

use thiserror::Error;

use crate::model::{
    InvestmentEvent, InvestmentId, InvestmentStatus, PayoutEvent, PayoutId, PayoutStatus,
    PlanVersion, UserId, WithdrawalEvent, WithdrawalId, WithdrawalStatus,
};
use crate::money::Money;

/// Top-level error returned by [`Engine`](super::Engine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("an administrator reason is required")]
    MissingReason,

    #[error("kyc submission rate limit reached for user {0}")]
    RateLimited(UserId),

    #[error("wallet operation failed: {0}")]
    Wallet(#[from] WalletError),

    #[error("investment operation failed: {0}")]
    Investment(#[from] InvestmentError),

    #[error("payout operation failed: {0}")]
    Payout(#[from] PayoutError),

    #[error("withdrawal operation failed: {0}")]
    Withdrawal(#[from] WithdrawalError),

    #[error("plan rule error: {0}")]
    Plan(#[from] PlanError),
}

/// Error during a wallet ledger operation. The wallet and ledger are left
/// untouched on every variant.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(Money),

    #[error("insufficient available funds: available {available}, requested {requested}")]
    InsufficientAvailable { available: Money, requested: Money },

    #[error("insufficient locked funds: locked {locked}, requested {requested}")]
    InsufficientLocked { locked: Money, requested: Money },

    #[error("operation would leave available balance negative: balance {balance}, locked {locked}")]
    AvailabilityViolated { balance: Money, locked: Money },

    #[error("payout book underflow: recorded {recorded}, requested {requested}")]
    PayoutBookUnderflow { recorded: Money, requested: Money },
}

/// Error during investment lifecycle processing.
#[derive(Debug, Error)]
pub enum InvestmentError {
    #[error("investment {0} not found")]
    NotFound(InvestmentId),

    #[error("no active plan rule")]
    NoActivePlan,

    #[error("plan rule version {0} not found")]
    PlanRuleNotFound(PlanVersion),

    #[error("principal {principal} is below plan minimum {minimum}")]
    BelowMinimum { principal: Money, minimum: Money },

    #[error("duration must be 1..={max} months, got {requested}")]
    DurationOutOfRange { requested: u32, max: u32 },

    #[error("a proof of payment url is required")]
    MissingProof,

    #[error("{event:?} is not allowed from status {status:?}")]
    InvalidTransition {
        status: InvestmentStatus,
        event: InvestmentEvent,
    },
}

/// Error during payout processing.
#[derive(Debug, Error)]
pub enum PayoutError {
    #[error("payout {0} not found")]
    NotFound(PayoutId),

    #[error("settlement requires rrn and gateway")]
    MissingSettlementRef,

    #[error("a reason is required")]
    MissingReason,

    #[error("{event:?} is not allowed from status {status:?}")]
    InvalidTransition {
        status: PayoutStatus,
        event: PayoutEvent,
    },
}

/// Error during withdrawal processing.
#[derive(Debug, Error)]
pub enum WithdrawalError {
    #[error("withdrawal {0} not found")]
    NotFound(WithdrawalId),

    #[error("amount {amount} is below the minimum withdrawal {minimum}")]
    BelowMinimum { amount: Money, minimum: Money },

    #[error("net amount {0} must be positive after charges and tds")]
    NonPositiveNet(Money),

    #[error("a reason is required")]
    MissingReason,

    #[error("settlement requires rrn and gateway")]
    MissingSettlementRef,

    #[error("{event:?} is not allowed from status {status:?}")]
    InvalidTransition {
        status: WithdrawalStatus,
        event: WithdrawalEvent,
    },
}

/// Error in plan rule data or the plan store.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("principal must be positive, got {0}")]
    NonPositivePrincipal(Money),

    #[error("month number must be at least 1")]
    ZeroMonth,

    #[error("plan rule has no rate bands")]
    NoBands,

    #[error("rate bands must be ordered and contiguous from month 1")]
    MalformedBands,

    #[error("plan version {version} is not newer than latest {latest}")]
    StaleVersion {
        version: PlanVersion,
        latest: PlanVersion,
    },
}
