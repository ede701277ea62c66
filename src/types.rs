// 1.0: primitives shared by every module. IDs, swap direction, risk tranche,
// timestamps, block stamps, and the minimal-unit rounding helpers. each ID is
// a newtype so the compiler catches mixups between accounts and exchanges.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub u32);

// 1.1: which way the named asset flows. AddToAmm = the caller sends the asset
// into the pool, RemoveFromAmm = the caller takes it out. swap_input uses it
// for the quote asset, swap_output for the base asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    AddToAmm,
    RemoveFromAmm,
}

impl Direction {
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::AddToAmm => Decimal::ONE,
            Direction::RemoveFromAmm => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Direction::AddToAmm => Direction::RemoveFromAmm,
            Direction::RemoveFromAmm => Direction::AddToAmm,
        }
    }
}

// 1.2: the two pooled-capital risk levels. High absorbs losses before Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tranche {
    High,
    Low,
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tranche::High => write!(f, "High"),
            Tranche::Low => write!(f, "Low"),
        }
    }
}

// 1.3: millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs * 1000)
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0 + secs * 1000)
    }

    pub fn minus_secs(&self, secs: i64) -> Self {
        Self(self.0 - secs * 1000)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

// 1.4: one discrete ordering epoch of the host. the fluctuation guard needs
// "one block = one reference price", so every mutating call carries a stamp.
// off-chain hosts supply a monotonic logical height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockStamp {
    pub height: u64,
    pub timestamp: Timestamp,
}

impl BlockStamp {
    pub fn new(height: u64, timestamp: Timestamp) -> Self {
        Self { height, timestamp }
    }
}

// 1.5: fixed-point unit. all reserve math settles on 18 fractional digits,
// and every indivisible remainder is rounded in the pool's favor.
pub const RESERVE_DP: u32 = 18;

pub fn minimal_unit() -> Decimal {
    Decimal::new(1, RESERVE_DP)
}

// round up to the next representable reserve amount
pub fn ceil_unit(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RESERVE_DP, RoundingStrategy::ToPositiveInfinity)
}

// round down to the previous representable reserve amount
pub fn floor_unit(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(RESERVE_DP, RoundingStrategy::ToNegativeInfinity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn direction_sign() {
        assert_eq!(Direction::AddToAmm.sign(), dec!(1));
        assert_eq!(Direction::RemoveFromAmm.sign(), dec!(-1));
        assert_eq!(Direction::AddToAmm.opposite(), Direction::RemoveFromAmm);
    }

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_secs(100);
        assert_eq!(t.as_millis(), 100_000);
        assert_eq!(t.plus_secs(5), Timestamp::from_millis(105_000));
        assert_eq!(t.minus_secs(5), Timestamp::from_millis(95_000));
    }

    #[test]
    fn rounding_helpers() {
        let exact = dec!(1.5);
        assert_eq!(ceil_unit(exact), exact);
        assert_eq!(floor_unit(exact), exact);

        // 1/3 is not representable in 18 digits
        let third = Decimal::ONE / dec!(3);
        assert_eq!(ceil_unit(third), dec!(0.333333333333333334));
        assert_eq!(floor_unit(third), dec!(0.333333333333333333));
        assert_eq!(ceil_unit(third) - floor_unit(third), minimal_unit());
    }
}
