// 2.0: the reserve ledger. two balances define a constant-product curve and
// every price quote comes from these pure functions. nothing here touches
// history or the vault, so the formulas stay unit-testable in isolation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ceil_unit, Direction};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("quote reserve {reserve} exhausted by withdrawal of {requested}")]
    QuoteExhausted { reserve: Decimal, requested: Decimal },

    #[error("base reserve {reserve} exhausted by withdrawal of {requested}")]
    BaseExhausted { reserve: Decimal, requested: Decimal },

    #[error("reserves must be positive, got quote={quote} base={base}")]
    NonPositiveReserves { quote: Decimal, base: Decimal },
}

// 2.1: the AMM's two balances. quote * base = k between depth-changing events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserves {
    pub quote: Decimal,
    pub base: Decimal,
}

impl Reserves {
    pub fn new(quote: Decimal, base: Decimal) -> Result<Self, PricingError> {
        if quote <= Decimal::ZERO || base <= Decimal::ZERO {
            return Err(PricingError::NonPositiveReserves { quote, base });
        }
        Ok(Self { quote, base })
    }

    pub fn spot_price(&self) -> Decimal {
        self.quote / self.base
    }

    pub fn invariant(&self) -> Decimal {
        self.quote * self.base
    }
}

// 2.2: quote in, base out. AddToAmm trades quote into the pool (buying base),
// RemoveFromAmm pulls quote out (the caller pays base). the returned amount is
// the base side of the trade.
//
// rounding: the pool's post-trade base reserve is k / new_quote rounded UP to
// the minimal unit, so on AddToAmm the caller receives one unit less than the
// exact quotient and on RemoveFromAmm the caller pays one unit more. k never
// decreases across an indivisible trade.
pub fn input_price(
    dir: Direction,
    quote_amount: Decimal,
    reserves: &Reserves,
) -> Result<Decimal, PricingError> {
    if quote_amount.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let k = reserves.invariant();
    match dir {
        Direction::AddToAmm => {
            let new_quote = reserves.quote + quote_amount;
            let new_base = ceil_unit(k / new_quote);
            Ok(reserves.base - new_base)
        }
        Direction::RemoveFromAmm => {
            let new_quote = reserves.quote - quote_amount;
            if new_quote <= Decimal::ZERO {
                return Err(PricingError::QuoteExhausted {
                    reserve: reserves.quote,
                    requested: quote_amount,
                });
            }
            let new_base = ceil_unit(k / new_quote);
            Ok(new_base - reserves.base)
        }
    }
}

// 2.3: base in, quote out. the mirror of input_price with the reserve roles
// swapped; the returned amount is the quote side of the trade.
pub fn output_price(
    dir: Direction,
    base_amount: Decimal,
    reserves: &Reserves,
) -> Result<Decimal, PricingError> {
    if base_amount.is_zero() {
        return Ok(Decimal::ZERO);
    }
    let k = reserves.invariant();
    match dir {
        Direction::AddToAmm => {
            let new_base = reserves.base + base_amount;
            let new_quote = ceil_unit(k / new_base);
            Ok(reserves.quote - new_quote)
        }
        Direction::RemoveFromAmm => {
            let new_base = reserves.base - base_amount;
            if new_base <= Decimal::ZERO {
                return Err(PricingError::BaseExhausted {
                    reserve: reserves.base,
                    requested: base_amount,
                });
            }
            let new_quote = ceil_unit(k / new_base);
            Ok(new_quote - reserves.quote)
        }
    }
}

// 2.4: reserves after a quote-driven swap. the arithmetic reuses the rounded
// amount from input_price, so applying is exact addition/subtraction.
pub fn apply_input(dir: Direction, quote_amount: Decimal, base_amount: Decimal, reserves: &Reserves) -> Reserves {
    match dir {
        Direction::AddToAmm => Reserves {
            quote: reserves.quote + quote_amount,
            base: reserves.base - base_amount,
        },
        Direction::RemoveFromAmm => Reserves {
            quote: reserves.quote - quote_amount,
            base: reserves.base + base_amount,
        },
    }
}

// 2.5: reserves after a base-driven swap.
pub fn apply_output(dir: Direction, base_amount: Decimal, quote_amount: Decimal, reserves: &Reserves) -> Reserves {
    match dir {
        Direction::AddToAmm => Reserves {
            quote: reserves.quote - quote_amount,
            base: reserves.base + base_amount,
        },
        Direction::RemoveFromAmm => Reserves {
            quote: reserves.quote + quote_amount,
            base: reserves.base - base_amount,
        },
    }
}
