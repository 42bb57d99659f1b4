//! Prepaid credit amounts.
//!
//! Balances and prices are counted in hundredths of a credit (an i64, the
//! usual smallest-unit-integer money representation) so arithmetic is exact
//! and comparisons are trivial. Display renders the decimal form ("12.50").

use serde::{Deserialize, Serialize};

/// An amount of prepaid credits, in hundredths.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Credits(i64);

impl Credits {
    pub const ZERO: Credits = Credits(0);

    /// Amount from whole credits.
    pub const fn from_whole(credits: i64) -> Self {
        Self(credits * 100)
    }

    /// Amount from hundredths of a credit.
    pub const fn from_hundredths(hundredths: i64) -> Self {
        Self(hundredths)
    }

    pub const fn as_hundredths(&self) -> i64 {
        self.0
    }

    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Credits) -> Option<Credits> {
        self.0.checked_add(other.0).map(Credits)
    }

    /// Subtraction that refuses to go negative.
    pub fn checked_sub(self, other: Credits) -> Option<Credits> {
        let rest = self.0.checked_sub(other.0)?;
        (rest >= 0).then_some(Credits(rest))
    }

    /// `other - self`, clamped at zero. Used for insufficient-balance deficits.
    pub fn deficit_against(self, other: Credits) -> Credits {
        Credits((other.0 - self.0).max(0))
    }
}

impl core::fmt::Display for Credits {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
