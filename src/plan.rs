//! Plan rule engine: pure monthly-return computation.
//!
//! No side effects. Rounding to 2 decimal places happens at each
//! intermediate step so results are penny-reproducible.

use crate::engine::PlanError;
use crate::model::PlanRule;
use crate::money::Money;

/// Breakdown of one month's return for a principal under a plan rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyReturn {
    pub gross: Money,
    pub admin_charge: Money,
    pub booster_income: Money,
    pub net_payout: Money,
}

/// Computes the gross monthly return, admin charge, optional booster income
/// and net payout for `principal` in month `month_no` (1-based).
///
/// Principals at or above `special_min` earn the flat special rate
/// regardless of month; otherwise the band covering `month_no` applies,
/// with months beyond all bands falling back to the last band's rate.
pub fn monthly_return(
    principal: Money,
    month_no: u32,
    rule: &PlanRule,
    booster_applied: bool,
) -> Result<MonthlyReturn, PlanError> {
    if !principal.is_positive() {
        return Err(PlanError::NonPositivePrincipal(principal));
    }
    if month_no == 0 {
        return Err(PlanError::ZeroMonth);
    }

    let special = rule.special_min.is_positive() && principal >= rule.special_min;
    let gross = if special {
        rule.special_rate.of(principal)
    } else {
        rule.rate_for_month(month_no).of(principal)
    };
    let admin_charge = rule.admin_charge.of(gross);
    let booster_income = if booster_applied {
        rule.booster.of(gross)
    } else {
        Money::ZERO
    };
    let net_payout = gross - admin_charge + booster_income;

    Ok(MonthlyReturn {
        gross,
        admin_charge,
        booster_income,
        net_payout,
    })
}
