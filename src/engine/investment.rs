//! Investment lifecycle.

use chrono::{DateTime, Utc};
use tracing::info;

use super::error::{EngineError, InvestmentError};
use super::payout;
use super::wallet::EntryCtx;
use super::{Engine, WalletOp};
use crate::model::{
    Investment, InvestmentEvent, InvestmentId, InvestmentStatus, LedgerKind, Payout, PayoutStatus,
    UserId, MAX_SCHEDULE_MONTHS,
};
use crate::money::Money;

impl Engine {
    /// Creates an investment in `initiated` status, snapshotting the active
    /// plan's version and terms. The snapshot fixes the terms for the life
    /// of the investment even if plan rules change later.
    pub fn create_investment(
        &mut self,
        user: UserId,
        principal: Money,
        months: u32,
        method: impl Into<String>,
        booster_applied: bool,
        now: DateTime<Utc>,
    ) -> Result<InvestmentId, EngineError> {
        if !self.users.contains_key(&user) {
            return Err(EngineError::UserNotFound(user));
        }
        if months == 0 || months > MAX_SCHEDULE_MONTHS {
            return Err(InvestmentError::DurationOutOfRange {
                requested: months,
                max: MAX_SCHEDULE_MONTHS,
            }
            .into());
        }
        let rule = self.active_plan().ok_or(InvestmentError::NoActivePlan)?;
        if !principal.is_positive() || principal < rule.min_amount {
            return Err(InvestmentError::BelowMinimum {
                principal,
                minimum: rule.min_amount,
            }
            .into());
        }
        let plan_version = rule.version;
        let plan_name = rule.name.clone();

        let id = self.alloc_investment_id();
        self.investments.insert(
            id,
            Investment {
                id,
                user,
                principal,
                method: method.into(),
                proof_url: None,
                utr: None,
                status: InvestmentStatus::Initiated,
                started_at: None,
                plan_version,
                plan_name,
                month_duration: months,
                booster_applied,
                payouts: Vec::new(),
                remarks: None,
                created_at: now,
            },
        );
        info!(investment = id, user, principal = %principal, months, "investment created");
        Ok(id)
    }

    /// Attaches proof of payment and moves the investment under review.
    pub fn submit_proof(
        &mut self,
        id: InvestmentId,
        proof_url: impl Into<String>,
        utr: Option<String>,
    ) -> Result<(), EngineError> {
        let url = proof_url.into();
        if url.trim().is_empty() {
            return Err(InvestmentError::MissingProof.into());
        }
        let inv = self
            .investments
            .get_mut(&id)
            .ok_or(InvestmentError::NotFound(id))?;
        let next = inv
            .status
            .transition(InvestmentEvent::SubmitProof)
            .ok_or(InvestmentError::InvalidTransition {
                status: inv.status,
                event: InvestmentEvent::SubmitProof,
            })?;
        inv.proof_url = Some(url);
        inv.utr = utr;
        inv.status = next;
        Ok(())
    }

    /// Approves an investment: generates the full payout schedule from the
    /// snapshotted plan rule, credits the principal to the user's balance
    /// and activates the investment — all or nothing.
    ///
    /// A missing rule for the snapshotted version blocks approval outright;
    /// falling back to a different rule would silently change the financial
    /// terms.
    pub fn approve_investment(
        &mut self,
        id: InvestmentId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let inv = self
            .investments
            .get(&id)
            .ok_or(InvestmentError::NotFound(id))?;
        let next = inv
            .status
            .transition(InvestmentEvent::Approve)
            .ok_or(InvestmentError::InvalidTransition {
                status: inv.status,
                event: InvestmentEvent::Approve,
            })?;
        let rule = self
            .plans
            .get(&inv.plan_version)
            .ok_or(InvestmentError::PlanRuleNotFound(inv.plan_version))?;

        let user = inv.user;
        let principal = inv.principal;
        let drafts = payout::build_schedule(
            principal,
            inv.month_duration,
            inv.booster_applied,
            rule,
            now,
            now,
        )?;

        let mut txn = self.begin_txn(user, now)?;
        txn.apply(
            &WalletOp::Credit { amount: principal },
            LedgerKind::InvestmentCredit,
            EntryCtx {
                investment: Some(id),
                note: Some("principal credited on approval".to_string()),
                ..EntryCtx::default()
            },
        )?;

        // Commit point: every fallible step has succeeded.
        let mut payout_ids = Vec::with_capacity(drafts.len());
        for d in drafts {
            let pid = self.alloc_payout_id();
            self.payouts.insert(
                pid,
                Payout {
                    id: pid,
                    investment: id,
                    user,
                    month_no: d.month_no,
                    due_date: d.due_date,
                    gross_payout: d.gross,
                    admin_charge: d.admin_charge,
                    booster: d.booster,
                    tds: d.tds,
                    net_payout: d.net,
                    status: PayoutStatus::Scheduled,
                    paid_at: None,
                    rrn: None,
                    gateway: None,
                    reason: None,
                },
            );
            payout_ids.push(pid);
        }
        self.commit(txn);
        let scheduled = payout_ids.len();
        if let Some(inv) = self.investments.get_mut(&id) {
            inv.payouts = payout_ids;
            inv.started_at = Some(now);
            inv.status = next;
        }
        info!(investment = id, user, payouts = scheduled, "investment approved");
        Ok(())
    }

    /// Rejects an investment under review. No wallet effect: the principal
    /// was never credited.
    pub fn reject_investment(
        &mut self,
        id: InvestmentId,
        remarks: impl Into<String>,
    ) -> Result<(), EngineError> {
        let inv = self
            .investments
            .get_mut(&id)
            .ok_or(InvestmentError::NotFound(id))?;
        let next = inv
            .status
            .transition(InvestmentEvent::Reject)
            .ok_or(InvestmentError::InvalidTransition {
                status: inv.status,
                event: InvestmentEvent::Reject,
            })?;
        inv.remarks = Some(remarks.into());
        inv.status = next;
        info!(investment = id, "investment rejected");
        Ok(())
    }

    /// Manual administrative cancellation of an active investment.
    pub fn cancel_investment(
        &mut self,
        id: InvestmentId,
        remarks: impl Into<String>,
    ) -> Result<(), EngineError> {
        let inv = self
            .investments
            .get_mut(&id)
            .ok_or(InvestmentError::NotFound(id))?;
        let next = inv
            .status
            .transition(InvestmentEvent::Cancel)
            .ok_or(InvestmentError::InvalidTransition {
                status: inv.status,
                event: InvestmentEvent::Cancel,
            })?;
        inv.remarks = Some(remarks.into());
        inv.status = next;
        info!(investment = id, "investment cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PlanRule, RateBand};
    use crate::money::Rate;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn plan_v1() -> PlanRule {
        PlanRule {
            name: "growth".into(),
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
            active: true,
            version: 1,
            effective_from: DateTime::UNIX_EPOCH,
        }
    }

    fn setup() -> (Engine, UserId) {
        let mut engine = Engine::new();
        engine.put_plan(plan_v1()).unwrap();
        let user = engine.register_user(None).unwrap();
        (engine, user)
    }

    #[test]
    fn create_snapshots_plan_terms() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(100_000), 12, "bank_transfer", true, at(2026, 1, 5))
            .unwrap();

        let inv = engine.investment(id).unwrap();
        assert_eq!(inv.status, InvestmentStatus::Initiated);
        assert_eq!(inv.plan_version, 1);
        assert_eq!(inv.plan_name, "growth");
        assert_eq!(inv.month_duration, 12);
        assert!(inv.booster_applied);
        assert!(inv.payouts.is_empty());
    }

    #[test]
    fn create_rejects_below_minimum_and_bad_duration() {
        let (mut engine, user) = setup();
        assert!(matches!(
            engine.create_investment(user, Money::from_major(5000), 12, "upi", false, at(2026, 1, 5)),
            Err(EngineError::Investment(InvestmentError::BelowMinimum { .. }))
        ));
        assert!(matches!(
            engine.create_investment(user, Money::from_major(50_000), 0, "upi", false, at(2026, 1, 5)),
            Err(EngineError::Investment(InvestmentError::DurationOutOfRange { .. }))
        ));
        assert!(matches!(
            engine.create_investment(user, Money::from_major(50_000), 121, "upi", false, at(2026, 1, 5)),
            Err(EngineError::Investment(InvestmentError::DurationOutOfRange { .. }))
        ));
    }

    #[test]
    fn create_requires_an_active_plan() {
        let mut engine = Engine::new();
        let user = engine.register_user(None).unwrap();
        assert!(matches!(
            engine.create_investment(user, Money::from_major(50_000), 6, "upi", false, at(2026, 1, 5)),
            Err(EngineError::Investment(InvestmentError::NoActivePlan))
        ));
    }

    #[test]
    fn proof_moves_to_under_review_once() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(50_000), 6, "upi", false, at(2026, 1, 5))
            .unwrap();

        assert!(matches!(
            engine.submit_proof(id, "  ", None),
            Err(EngineError::Investment(InvestmentError::MissingProof))
        ));

        engine
            .submit_proof(id, "https://proofs/1.png", Some("UTR123".into()))
            .unwrap();
        let inv = engine.investment(id).unwrap();
        assert_eq!(inv.status, InvestmentStatus::UnderReview);
        assert_eq!(inv.utr.as_deref(), Some("UTR123"));

        // resubmission is an invalid transition
        assert!(matches!(
            engine.submit_proof(id, "https://proofs/2.png", None),
            Err(EngineError::Investment(InvestmentError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn approve_generates_schedule_and_credits_principal() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(100_000), 3, "upi", false, at(2026, 1, 5))
            .unwrap();
        engine.submit_proof(id, "https://proofs/1.png", None).unwrap();
        engine.approve_investment(id, at(2026, 1, 10)).unwrap();

        let inv = engine.investment(id).unwrap();
        assert_eq!(inv.status, InvestmentStatus::Active);
        assert_eq!(inv.started_at, Some(at(2026, 1, 10)));
        assert_eq!(inv.payouts.len(), 3);

        let payouts = engine.payouts_for(id);
        for (i, p) in payouts.iter().enumerate() {
            assert_eq!(p.month_no, i as u32 + 1);
            assert_eq!(p.status, PayoutStatus::Scheduled);
            assert_eq!(p.net_payout, Money::from_major(2880));
        }
        assert!(payouts.windows(2).all(|w| w[0].due_date < w[1].due_date));

        let wallet = engine.wallet(user).unwrap();
        assert_eq!(wallet.balance, Money::from_major(100_000));
        let entry = engine.ledger().last().unwrap();
        assert_eq!(entry.kind, LedgerKind::InvestmentCredit);
        assert_eq!(entry.investment, Some(id));
    }

    #[test]
    fn approve_straight_from_initiated_is_allowed() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(50_000), 2, "upi", false, at(2026, 1, 5))
            .unwrap();
        engine.approve_investment(id, at(2026, 1, 10)).unwrap();
        assert_eq!(engine.investment(id).unwrap().status, InvestmentStatus::Active);
    }

    #[test]
    fn approve_twice_is_rejected() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(50_000), 2, "upi", false, at(2026, 1, 5))
            .unwrap();
        engine.approve_investment(id, at(2026, 1, 10)).unwrap();
        assert!(matches!(
            engine.approve_investment(id, at(2026, 1, 11)),
            Err(EngineError::Investment(InvestmentError::InvalidTransition { .. }))
        ));
    }

    #[test]
    fn approve_without_snapshotted_rule_is_a_hard_stop() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(50_000), 6, "upi", false, at(2026, 1, 5))
            .unwrap();
        engine.submit_proof(id, "https://proofs/1.png", None).unwrap();
        engine.remove_plan(1);

        let result = engine.approve_investment(id, at(2026, 1, 10));
        assert!(matches!(
            result,
            Err(EngineError::Investment(InvestmentError::PlanRuleNotFound(1)))
        ));
        // status unchanged, nothing credited, nothing scheduled
        let inv = engine.investment(id).unwrap();
        assert_eq!(inv.status, InvestmentStatus::UnderReview);
        assert!(inv.payouts.is_empty());
        assert_eq!(engine.wallet(user).unwrap().balance, Money::ZERO);
        assert!(engine.ledger().is_empty());
    }

    #[test]
    fn reject_records_remarks_without_wallet_effect() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(50_000), 6, "upi", false, at(2026, 1, 5))
            .unwrap();
        engine.submit_proof(id, "https://proofs/1.png", None).unwrap();
        engine.reject_investment(id, "proof unreadable").unwrap();

        let inv = engine.investment(id).unwrap();
        assert_eq!(inv.status, InvestmentStatus::Rejected);
        assert_eq!(inv.remarks.as_deref(), Some("proof unreadable"));
        assert_eq!(engine.wallet(user).unwrap().balance, Money::ZERO);
        assert!(engine.ledger().is_empty());

        // terminal: no further transitions
        assert!(engine.approve_investment(id, at(2026, 1, 10)).is_err());
    }

    #[test]
    fn cancel_only_from_active() {
        let (mut engine, user) = setup();
        let id = engine
            .create_investment(user, Money::from_major(50_000), 2, "upi", false, at(2026, 1, 5))
            .unwrap();
        assert!(engine.cancel_investment(id, "user request").is_err());
        engine.approve_investment(id, at(2026, 1, 10)).unwrap();
        engine.cancel_investment(id, "user request").unwrap();
        assert_eq!(engine.investment(id).unwrap().status, InvestmentStatus::Cancelled);
    }
}
