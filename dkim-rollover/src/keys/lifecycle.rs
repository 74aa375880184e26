//! Key lifecycle states and the durations that drive them.

use std::fmt::{self, Display};
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

/// Derived state of a key. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Published ahead of time, not yet used for signing.
    Future,
    /// Used for signing.
    Active,
    /// No longer used for signing; the DNS record is kept for mail in flight.
    Expired,
    /// Past the expired window; due for deletion.
    Dead,
    /// The key failed validation.
    Invalid,
}

impl Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Future => "future",
            LifecycleState::Active => "active",
            LifecycleState::Expired => "expired",
            LifecycleState::Dead => "dead",
            LifecycleState::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// One of the three persisted key collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Future,
    Active,
    Expired,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Active, Category::Future, Category::Expired];

    /// The state every key in this category is expected to derive to.
    pub fn expected_state(&self) -> LifecycleState {
        match self {
            Category::Future => LifecycleState::Future,
            Category::Active => LifecycleState::Active,
            Category::Expired => LifecycleState::Expired,
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.expected_state().fmt(f)
    }
}

/// Longest accepted lifetime of any period, in months.
pub const MAX_LIFETIME_MONTHS: u32 = 1200;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{period} lifetime of {months} months exceeds the maximum of {}", MAX_LIFETIME_MONTHS)]
pub struct LifetimeTooLong {
    pub period: &'static str,
    pub months: u32,
}

/// Lifecycle durations, in months.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Lifetimes {
    /// How far ahead of the active key's expiry a successor is created.
    pub future: NonZeroU32,
    /// How long a key signs mail.
    pub active: NonZeroU32,
    /// How long an expired key's DNS record stays published.
    pub expired: NonZeroU32,
}

impl Lifetimes {
    pub fn new(future: NonZeroU32, active: NonZeroU32, expired: NonZeroU32) -> Self {
        Self {
            future,
            active,
            expired,
        }
    }

    /// Reject periods longer than [`MAX_LIFETIME_MONTHS`].
    pub fn validate(&self) -> Result<(), LifetimeTooLong> {
        for (period, months) in [
            ("future", self.future),
            ("active", self.active),
            ("expired", self.expired),
        ] {
            if months.get() > MAX_LIFETIME_MONTHS {
                return Err(LifetimeTooLong {
                    period,
                    months: months.get(),
                });
            }
        }
        Ok(())
    }

    pub fn future_months(&self) -> i32 {
        months(self.future)
    }

    pub fn active_months(&self) -> i32 {
        months(self.active)
    }

    pub fn expired_months(&self) -> i32 {
        months(self.expired)
    }

    /// State of a key `age` months after its valid-from month.
    pub fn state_for_age(&self, age: i32) -> LifecycleState {
        let active = self.active_months();
        let expired = self.expired_months();
        if age < 0 {
            LifecycleState::Future
        } else if age < active {
            LifecycleState::Active
        } else if age < active.saturating_add(expired) {
            LifecycleState::Expired
        } else {
            LifecycleState::Dead
        }
    }

    /// Whether an active key of this age is close enough to expiry to need a successor.
    pub fn needs_successor(&self, age: i32) -> bool {
        self.active_months().saturating_sub(age) <= self.future_months()
    }
}

/// Unvalidated values saturate instead of wrapping negative.
fn months(period: NonZeroU32) -> i32 {
    i32::try_from(period.get()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lifetimes(future: u32, active: u32, expired: u32) -> Lifetimes {
        Lifetimes::new(
            NonZeroU32::new(future).unwrap(),
            NonZeroU32::new(active).unwrap(),
            NonZeroU32::new(expired).unwrap(),
        )
    }

    #[test]
    fn test_state_boundaries() {
        let l = lifetimes(1, 3, 2);
        let cases = [
            (-5, LifecycleState::Future),
            (-1, LifecycleState::Future),
            (0, LifecycleState::Active),
            (2, LifecycleState::Active),
            (3, LifecycleState::Expired),
            (4, LifecycleState::Expired),
            (5, LifecycleState::Dead),
            (40, LifecycleState::Dead),
        ];
        for (age, expected) in cases {
            assert_eq!(l.state_for_age(age), expected, "age {}", age);
        }
    }

    #[test]
    fn test_single_month_windows() {
        let l = lifetimes(1, 1, 1);
        assert_eq!(l.state_for_age(0), LifecycleState::Active);
        assert_eq!(l.state_for_age(1), LifecycleState::Expired);
        assert_eq!(l.state_for_age(2), LifecycleState::Dead);
    }

    #[test]
    fn test_needs_successor() {
        let l = lifetimes(1, 3, 1);
        assert!(!l.needs_successor(0));
        assert!(!l.needs_successor(1));
        assert!(l.needs_successor(2));
        // Grace-extended keys are past the window and always need one.
        assert!(l.needs_successor(3));
    }

    #[test]
    fn test_lifetime_cap() {
        assert!(lifetimes(1, MAX_LIFETIME_MONTHS, 1).validate().is_ok());
        assert_eq!(
            lifetimes(1, 3, MAX_LIFETIME_MONTHS + 1).validate(),
            Err(LifetimeTooLong {
                period: "expired",
                months: MAX_LIFETIME_MONTHS + 1,
            })
        );
    }

    #[test]
    fn test_huge_lifetime_does_not_wrap() {
        let l = lifetimes(1, 3_000_000_000, 1);
        assert_eq!(l.active_months(), i32::MAX);
        assert_eq!(l.state_for_age(0), LifecycleState::Active);
        assert!(!l.needs_successor(0));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(Category::Active.to_string(), "active");
        assert_eq!(Category::Future.to_string(), "future");
        assert_eq!(Category::Expired.to_string(), "expired");
    }
}
