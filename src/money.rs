use std::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Monetary amount with 2 decimal places, rounded at construction.
///
/// Keeping every `Money` normalized to 2 dp means sums and differences of
/// amounts are exact, which is what the ledger's penny-level reconciliation
/// relies on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Rounds to 2 decimal places, midpoint away from zero.
    pub fn new(value: Decimal) -> Self {
        Money(value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
    }

    /// Whole currency units, no fractional part.
    pub fn from_major(value: i64) -> Self {
        Money(Decimal::from(value))
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        !self.0.is_zero() && self.0.is_sign_positive()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn abs(self) -> Money {
        Money(self.0.abs())
    }

    pub fn min(self, other: Money) -> Money {
        if self <= other { self } else { other }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl std::ops::Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Money {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// A percentage rate (e.g. `0.03` for 3% monthly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(Decimal);

impl Rate {
    pub const ZERO: Rate = Rate(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Rate(value)
    }

    pub fn as_decimal(self) -> Decimal {
        self.0
    }

    /// Applies the rate to an amount, rounding the result to 2 dp.
    pub fn of(self, amount: Money) -> Money {
        Money::new(amount.as_decimal() * self.0)
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn new_rounds_to_two_places() {
        assert_eq!(Money::new(dec!(1.005)), Money::new(dec!(1.01)));
        assert_eq!(Money::new(dec!(1.004)), Money::new(dec!(1.00)));
        assert_eq!(Money::new(dec!(-1.005)), Money::new(dec!(-1.01)));
    }

    #[test]
    fn from_major_has_no_fraction() {
        assert_eq!(Money::from_major(100), Money::new(dec!(100.00)));
        assert_eq!(Money::from_major(-5), Money::new(dec!(-5)));
    }

    #[test]
    fn display_formats_two_places() {
        assert_eq!(Money::from_major(100).to_string(), "100.00");
        assert_eq!(Money::new(dec!(1.5)).to_string(), "1.50");
        assert_eq!(Money::new(dec!(-50.25)).to_string(), "-50.25");
        assert_eq!(Money::ZERO.to_string(), "0.00");
    }

    #[test]
    fn sign_predicates() {
        assert!(Money::from_major(1).is_positive());
        assert!(!Money::ZERO.is_positive());
        assert!(!Money::ZERO.is_negative());
        assert!(Money::new(dec!(-0.01)).is_negative());
    }

    #[test]
    fn arithmetic() {
        let mut a = Money::new(dec!(100.50));
        a += Money::new(dec!(0.25));
        assert_eq!(a, Money::new(dec!(100.75)));
        a -= Money::new(dec!(0.75));
        assert_eq!(a, Money::from_major(100));
        assert_eq!(a + a, Money::from_major(200));
        assert_eq!(a - Money::from_major(150), Money::from_major(-50));
    }

    #[test]
    fn ordering() {
        assert!(Money::new(dec!(1.99)) < Money::from_major(2));
        assert!(Money::from_major(-1) < Money::ZERO);
    }

    #[test]
    fn min_picks_smaller() {
        let a = Money::from_major(12);
        let b = Money::from_major(50);
        assert_eq!(a.min(b), a);
        assert_eq!(b.min(a), a);
    }

    #[test]
    fn rate_of_rounds_result() {
        // 100000 * 0.03 = 3000
        let rate = Rate::new(dec!(0.03));
        assert_eq!(rate.of(Money::from_major(100_000)), Money::from_major(3000));
        // 333.33 * 0.04 = 13.3332 -> 13.33
        let fee = Rate::new(dec!(0.04));
        assert_eq!(fee.of(Money::new(dec!(333.33))), Money::new(dec!(13.33)));
    }

    #[test]
    fn zero_rate_yields_zero() {
        assert_eq!(Rate::ZERO.of(Money::from_major(1000)), Money::ZERO);
    }
}
