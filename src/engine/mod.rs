//! Platform engine.
//!
//! Owns the users, investments, payouts, withdrawals, plan rules and the
//! append-only ledger, and exposes one entry point per operation. Every
//! mutating operation is all-or-nothing: validation runs against a staged
//! wallet copy and the wallet, ledger entries and entity changes commit
//! together only after every fallible step has succeeded.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};
use tokio_stream::{Stream, StreamExt};
use tracing::info;

use crate::limit::{FixedWindowLimiter, RateLimiter};
use crate::model::{
    Investment, InvestmentId, LedgerEntry, LedgerKind, Payout, PayoutId, PlanRule, PlanVersion,
    UserId, Wallet, Withdrawal, WithdrawalId,
};
use crate::money::{Money, Rate};

mod error;
mod investment;
mod payout;
mod withdrawal;
mod wallet;

pub use error::{
    EngineError, InvestmentError, PayoutError, PlanError, WalletError, WithdrawalError,
};
pub use wallet::WalletOp;

use wallet::{EntryCtx, WalletTxn};

/// Platform-level policy knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Floor for withdrawal requests.
    pub min_withdrawal: Money,
    /// Percentage charge on the requested withdrawal amount.
    pub withdrawal_charge_rate: Rate,
    /// Upper bound on the withdrawal charge.
    pub withdrawal_charge_cap: Money,
    /// Tax deducted at source on withdrawals; zero under current policy.
    pub withdrawal_tds_rate: Rate,
    /// KYC submissions allowed per user per day.
    pub kyc_daily_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_withdrawal: Money::from_major(100),
            withdrawal_charge_rate: Rate::new(rust_decimal::Decimal::new(2, 2)),
            withdrawal_charge_cap: Money::from_major(50),
            withdrawal_tds_rate: Rate::ZERO,
            kyc_daily_limit: 3,
        }
    }
}

#[derive(Debug, Default)]
struct UserRecord {
    wallet: Wallet,
    referred_by: Option<UserId>,
    referral_earned: Money,
    kyc_docs: Vec<String>,
}

/// An administrative wallet operation, as replayed from the CSV surface.
#[derive(Debug, Clone)]
pub struct Command {
    pub user: UserId,
    pub op: WalletOp,
    /// Administrator reason, mandatory.
    pub note: String,
}

/// The investment platform engine.
pub struct Engine {
    users: HashMap<UserId, UserRecord>,
    investments: HashMap<InvestmentId, Investment>,
    payouts: HashMap<PayoutId, Payout>,
    withdrawals: HashMap<WithdrawalId, Withdrawal>,
    plans: BTreeMap<PlanVersion, PlanRule>,
    /// Append-only; entries are never mutated or removed.
    ledger: Vec<LedgerEntry>,
    config: EngineConfig,
    kyc_limiter: Box<dyn RateLimiter>,
    next_user: UserId,
    next_investment: InvestmentId,
    next_payout: PayoutId,
    next_withdrawal: WithdrawalId,
}

/// Public API
impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let kyc_limiter = Box::new(FixedWindowLimiter::new(
            config.kyc_daily_limit,
            Duration::days(1),
        ));
        Self {
            users: HashMap::new(),
            investments: HashMap::new(),
            payouts: HashMap::new(),
            withdrawals: HashMap::new(),
            plans: BTreeMap::new(),
            ledger: Vec::new(),
            config,
            kyc_limiter,
            next_user: 1,
            next_investment: 1,
            next_payout: 1,
            next_withdrawal: 1,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Swaps the KYC rate limiter, e.g. for a shared store in a
    /// multi-instance deployment.
    pub fn set_kyc_limiter(&mut self, limiter: Box<dyn RateLimiter>) {
        self.kyc_limiter = limiter;
    }

    /// Registers a new user with a zeroed wallet.
    pub fn register_user(&mut self, referred_by: Option<UserId>) -> Result<UserId, EngineError> {
        if let Some(referrer) = referred_by {
            if !self.users.contains_key(&referrer) {
                return Err(EngineError::UserNotFound(referrer));
            }
        }
        let id = self.next_user;
        self.next_user += 1;
        self.users.insert(
            id,
            UserRecord {
                referred_by,
                ..UserRecord::default()
            },
        );
        Ok(id)
    }

    /// Creates the user record with the given id if absent. Replay surface
    /// only; ids from normal registration never collide with these.
    pub fn ensure_user(&mut self, user: UserId) {
        self.users.entry(user).or_default();
        if user >= self.next_user {
            self.next_user = user + 1;
        }
    }

    pub fn wallet(&self, user: UserId) -> Option<&Wallet> {
        self.users.get(&user).map(|r| &r.wallet)
    }

    /// All user wallets, in no particular order.
    pub fn wallets(&self) -> impl Iterator<Item = (UserId, &Wallet)> + '_ {
        self.users.iter().map(|(id, r)| (*id, &r.wallet))
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub fn ledger_for(&self, user: UserId) -> impl Iterator<Item = &LedgerEntry> + '_ {
        self.ledger.iter().filter(move |e| e.user == user)
    }

    pub fn investment(&self, id: InvestmentId) -> Option<&Investment> {
        self.investments.get(&id)
    }

    pub fn payout(&self, id: PayoutId) -> Option<&Payout> {
        self.payouts.get(&id)
    }

    /// Payouts of one investment, in month order.
    pub fn payouts_for(&self, investment: InvestmentId) -> Vec<&Payout> {
        self.investments
            .get(&investment)
            .map(|inv| {
                inv.payouts
                    .iter()
                    .filter_map(|id| self.payouts.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn withdrawal(&self, id: WithdrawalId) -> Option<&Withdrawal> {
        self.withdrawals.get(&id)
    }

    /// Applies one administrative wallet operation. The reason is mandatory
    /// and lands in the ledger entry's note.
    pub fn admin_adjust(
        &mut self,
        user: UserId,
        op: WalletOp,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::MissingReason);
        }
        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &op,
            admin_kind(&op),
            EntryCtx {
                note: Some(reason.to_string()),
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);
        Ok(())
    }

    /// Credits referral commission. The percentage policy lives outside the
    /// core; the amount arrives already computed.
    pub fn credit_referral(
        &mut self,
        user: UserId,
        amount: Money,
        investment: Option<InvestmentId>,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::Credit { amount },
            LedgerKind::ReferralCredit,
            EntryCtx {
                investment,
                note,
                ..EntryCtx::default()
            },
        )?;
        self.commit(txn);
        if let Some(record) = self.users.get_mut(&user) {
            record.referral_earned += amount;
        }
        info!(user, amount = %amount, "referral commission credited");
        Ok(())
    }

    pub fn referred_by(&self, user: UserId) -> Option<UserId> {
        self.users.get(&user).and_then(|r| r.referred_by)
    }

    pub fn referral_earned(&self, user: UserId) -> Option<Money> {
        self.users.get(&user).map(|r| r.referral_earned)
    }

    /// Stores a KYC document URL after consulting the rate limiter. The URL
    /// arrives already validated; review happens outside the core.
    pub fn submit_kyc(
        &mut self,
        user: UserId,
        doc_url: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !self.users.contains_key(&user) {
            return Err(EngineError::UserNotFound(user));
        }
        let key = format!("kyc:{user}");
        if !self.kyc_limiter.check_and_record(&key, now) {
            return Err(EngineError::RateLimited(user));
        }
        if let Some(record) = self.users.get_mut(&user) {
            record.kyc_docs.push(doc_url.into());
        }
        Ok(())
    }

    pub fn kyc_docs(&self, user: UserId) -> Option<&[String]> {
        self.users.get(&user).map(|r| r.kyc_docs.as_slice())
    }

    /// Inserts a plan rule. Versions must be strictly increasing; activating
    /// a rule deactivates all others.
    pub fn put_plan(&mut self, rule: PlanRule) -> Result<(), EngineError> {
        rule.validate()?;
        if let Some(latest) = self.plans.keys().next_back().copied() {
            if rule.version <= latest {
                return Err(PlanError::StaleVersion {
                    version: rule.version,
                    latest,
                }
                .into());
            }
        }
        if rule.active {
            for existing in self.plans.values_mut() {
                existing.active = false;
            }
        }
        self.plans.insert(rule.version, rule);
        Ok(())
    }

    /// The single globally-active plan rule, if any.
    pub fn active_plan(&self) -> Option<&PlanRule> {
        self.plans.values().find(|p| p.active)
    }

    pub fn plan(&self, version: PlanVersion) -> Option<&PlanRule> {
        self.plans.get(&version)
    }

    /// Removal hook for the external plan CRUD.
    pub fn remove_plan(&mut self, version: PlanVersion) -> Option<PlanRule> {
        self.plans.remove(&version)
    }

    /// Runs the engine over a stream of administrative commands. Failed
    /// commands are logged and skipped; the stream keeps going.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(cmd) = stream.next().await {
            let _ = self.apply_command(cmd);
        }
    }

    /// Applies a single administrative command on top of the current state.
    pub fn apply_command(&mut self, cmd: Command) -> Result<(), EngineError> {
        self.ensure_user(cmd.user);
        let result = self.admin_adjust(cmd.user, cmd.op, &cmd.note, Utc::now());
        match &result {
            Ok(()) => {
                info!(user = cmd.user, op = ?cmd.op, "command applied");
            }
            Err(e) => {
                info!(user = cmd.user, op = ?cmd.op, reason = %e, "command skipped");
            }
        }
        result
    }
}

/// Private API
impl Engine {
    fn begin_txn(&self, user: UserId, at: DateTime<Utc>) -> Result<WalletTxn, EngineError> {
        let record = self
            .users
            .get(&user)
            .ok_or(EngineError::UserNotFound(user))?;
        Ok(WalletTxn::begin(user, record.wallet, at))
    }

    /// Commit point: the staged wallet and its ledger entries become
    /// visible together.
    fn commit(&mut self, txn: WalletTxn) {
        let (user, wallet, entries) = txn.into_parts();
        if let Some(record) = self.users.get_mut(&user) {
            record.wallet = wallet;
        }
        self.ledger.extend(entries);
    }

    fn alloc_investment_id(&mut self) -> InvestmentId {
        let id = self.next_investment;
        self.next_investment += 1;
        id
    }

    fn alloc_payout_id(&mut self) -> PayoutId {
        let id = self.next_payout;
        self.next_payout += 1;
        id
    }
}

fn admin_kind(op: &WalletOp) -> LedgerKind {
    match op {
        WalletOp::Credit { .. } => LedgerKind::AdminCredit,
        WalletOp::Debit { .. } => LedgerKind::AdminDebit,
        WalletOp::Lock { .. } => LedgerKind::AdminLock,
        WalletOp::Unlock { .. } => LedgerKind::AdminUnlock,
        WalletOp::SetBalance { .. } => LedgerKind::AdminSetBalance,
        WalletOp::SetLocked { .. } => LedgerKind::AdminSetLocked,
        WalletOp::AddProfit { .. } => LedgerKind::AdminProfitCredit,
        WalletOp::BookPayout { .. } | WalletOp::UnbookPayout { .. } => LedgerKind::AdminPayoutBook,
        WalletOp::SettlePayout { .. } => LedgerKind::AdminSettlement,
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Direction, RateBand};
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn engine_with_user() -> (Engine, UserId) {
        let mut engine = Engine::new();
        let user = engine.register_user(None).unwrap();
        (engine, user)
    }

    // Admin wallet operations

    #[test]
    fn admin_credit_writes_ledger_entry() {
        let (mut engine, user) = engine_with_user();
        engine
            .admin_adjust(
                user,
                WalletOp::Credit { amount: Money::from_major(100) },
                "manual funding",
                now(),
            )
            .unwrap();

        assert_eq!(engine.wallet(user).unwrap().balance, Money::from_major(100));
        let entry = engine.ledger().last().unwrap();
        assert_eq!(entry.kind, LedgerKind::AdminCredit);
        assert_eq!(entry.direction, Direction::Credit);
        assert_eq!(entry.amount, Money::from_major(100));
        assert_eq!(entry.note.as_deref(), Some("manual funding"));
        assert_eq!(entry.balance_before, Money::ZERO);
        assert_eq!(entry.balance_after, Money::from_major(100));
    }

    #[test]
    fn admin_reason_is_mandatory() {
        let (mut engine, user) = engine_with_user();
        let result = engine.admin_adjust(
            user,
            WalletOp::Credit { amount: Money::from_major(10) },
            "   ",
            now(),
        );
        assert!(matches!(result, Err(EngineError::MissingReason)));
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn failed_op_leaves_wallet_and_ledger_untouched() {
        let (mut engine, user) = engine_with_user();
        engine
            .admin_adjust(
                user,
                WalletOp::Credit { amount: Money::from_major(50) },
                "funding",
                now(),
            )
            .unwrap();

        let wallet_before = *engine.wallet(user).unwrap();
        let ledger_len = engine.ledger().len();
        let result = engine.admin_adjust(
            user,
            WalletOp::Debit { amount: Money::from_major(60) },
            "overdraft attempt",
            now(),
        );
        assert!(matches!(
            result,
            Err(EngineError::Wallet(WalletError::InsufficientAvailable { .. }))
        ));
        assert_eq!(*engine.wallet(user).unwrap(), wallet_before);
        assert_eq!(engine.ledger().len(), ledger_len);
    }

    #[test]
    fn unknown_user_is_rejected() {
        let mut engine = Engine::new();
        let result = engine.admin_adjust(
            99,
            WalletOp::Credit { amount: Money::from_major(10) },
            "nobody",
            now(),
        );
        assert!(matches!(result, Err(EngineError::UserNotFound(99))));
    }

    // Referral bookkeeping

    #[test]
    fn referral_registration_and_credit() {
        let mut engine = Engine::new();
        let referrer = engine.register_user(None).unwrap();
        let referred = engine.register_user(Some(referrer)).unwrap();
        assert_eq!(engine.referred_by(referred), Some(referrer));
        assert_eq!(engine.referred_by(referrer), None);

        engine
            .credit_referral(
                referrer,
                Money::from_major(250),
                None,
                Some("commission for signup".into()),
                now(),
            )
            .unwrap();
        assert_eq!(engine.wallet(referrer).unwrap().balance, Money::from_major(250));
        assert_eq!(engine.referral_earned(referrer), Some(Money::from_major(250)));
        let entry = engine.ledger().last().unwrap();
        assert_eq!(entry.kind, LedgerKind::ReferralCredit);
    }

    #[test]
    fn referrer_must_exist() {
        let mut engine = Engine::new();
        assert!(matches!(
            engine.register_user(Some(42)),
            Err(EngineError::UserNotFound(42))
        ));
    }

    // KYC

    #[test]
    fn kyc_submissions_are_rate_limited() {
        let (mut engine, user) = engine_with_user();
        let at = now();
        for i in 0..3 {
            engine.submit_kyc(user, format!("https://docs/{i}"), at).unwrap();
        }
        let result = engine.submit_kyc(user, "https://docs/extra", at);
        assert!(matches!(result, Err(EngineError::RateLimited(_))));
        assert_eq!(engine.kyc_docs(user).unwrap().len(), 3);
    }

    // Plan store

    fn plan(version: PlanVersion, active: bool) -> PlanRule {
        PlanRule {
            name: format!("plan-v{version}"),
            min_amount: Money::from_major(10_000),
            special_min: Money::from_major(300_000),
            bands: vec![RateBand {
                from_month: 1,
                to_month: 12,
                monthly_rate: Rate::new(dec!(0.03)),
            }],
            special_rate: Rate::new(dec!(0.10)),
            admin_charge: Rate::new(dec!(0.04)),
            booster: Rate::new(dec!(0.10)),
            active,
            version,
            effective_from: DateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn activating_a_plan_deactivates_others() {
        let mut engine = Engine::new();
        engine.put_plan(plan(1, true)).unwrap();
        engine.put_plan(plan(2, true)).unwrap();
        assert_eq!(engine.active_plan().unwrap().version, 2);
        assert!(!engine.plan(1).unwrap().active);
    }

    #[test]
    fn plan_versions_must_increase() {
        let mut engine = Engine::new();
        engine.put_plan(plan(3, true)).unwrap();
        assert!(matches!(
            engine.put_plan(plan(3, false)),
            Err(EngineError::Plan(PlanError::StaleVersion { .. }))
        ));
        assert!(matches!(
            engine.put_plan(plan(2, false)),
            Err(EngineError::Plan(PlanError::StaleVersion { .. }))
        ));
    }

    #[test]
    fn inactive_insert_keeps_current_active() {
        let mut engine = Engine::new();
        engine.put_plan(plan(1, true)).unwrap();
        engine.put_plan(plan(2, false)).unwrap();
        assert_eq!(engine.active_plan().unwrap().version, 1);
    }

    // Command stream

    fn cmd(user: UserId, op: WalletOp, note: &str) -> Command {
        Command {
            user,
            op,
            note: note.to_string(),
        }
    }

    #[tokio::test]
    async fn run_processes_all_commands() {
        let mut engine = Engine::new();
        let commands = vec![
            cmd(1, WalletOp::Credit { amount: Money::from_major(100) }, "seed"),
            cmd(2, WalletOp::Credit { amount: Money::from_major(200) }, "seed"),
            cmd(1, WalletOp::Debit { amount: Money::from_major(25) }, "correction"),
        ];

        engine.run(tokio_stream::iter(commands)).await;

        assert_eq!(engine.wallet(1).unwrap().balance, Money::from_major(75));
        assert_eq!(engine.wallet(2).unwrap().balance, Money::from_major(200));
        assert_eq!(engine.ledger().len(), 3);
    }

    #[tokio::test]
    async fn run_skips_failed_commands_and_continues() {
        let mut engine = Engine::new();
        let commands = vec![
            cmd(1, WalletOp::Credit { amount: Money::from_major(100) }, "seed"),
            cmd(1, WalletOp::Debit { amount: Money::from_major(500) }, "too much"),
            cmd(1, WalletOp::Credit { amount: Money::from_major(50) }, "more"),
        ];

        engine.run(tokio_stream::iter(commands)).await;

        assert_eq!(engine.wallet(1).unwrap().balance, Money::from_major(150));
        assert_eq!(engine.ledger().len(), 2);
    }
}
