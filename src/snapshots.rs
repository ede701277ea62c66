// 3.0: append-only reserve history. every reserve mutation lands here, at
// most one entry per block (same-block re-entry overwrites). spot and
// time-weighted prices are derived by walking the log backwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::{input_price, output_price, PricingError, Reserves};
use crate::types::{BlockStamp, Direction, Timestamp};

// lookback for trade-sized TWAPs (input_twap / output_twap)
pub const TRADE_TWAP_WINDOW_SECS: i64 = 15 * 60;

// backward walks stop after this many entries; the covered duration is
// normalized accordingly
pub const TWAP_MAX_SNAPSHOTS: usize = 1024;

// 3.1: one recorded reserve state. cumulative_notional is the signed sum of
// quote flow into the pool since genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSnapshot {
    pub quote_reserve: Decimal,
    pub base_reserve: Decimal,
    pub cumulative_notional: Decimal,
    pub block_height: u64,
    pub timestamp: Timestamp,
}

impl ReserveSnapshot {
    pub fn reserves(&self) -> Reserves {
        Reserves {
            quote: self.quote_reserve,
            base: self.base_reserve,
        }
    }

    pub fn spot_price(&self) -> Decimal {
        self.quote_reserve / self.base_reserve
    }
}

// 3.2: depth-change marker, appended only on liquidity migration. index 0 is
// the genesis state; cumulative_notional holds the flow accrued since the
// previous migration, not since genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityChangedSnapshot {
    pub quote_reserve: Decimal,
    pub base_reserve: Decimal,
    pub cumulative_notional: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHistory {
    snapshots: Vec<ReserveSnapshot>,
}

impl SnapshotHistory {
    pub fn new(genesis: &Reserves, at: BlockStamp) -> Self {
        Self {
            snapshots: vec![ReserveSnapshot {
                quote_reserve: genesis.quote,
                base_reserve: genesis.base,
                cumulative_notional: Decimal::ZERO,
                block_height: at.height,
                timestamp: at.timestamp,
            }],
        }
    }

    // 3.3: record a reserve state. a second append within one block replaces
    // the block's entry instead of growing the log.
    pub fn append(&mut self, reserves: &Reserves, notional_delta: Decimal, at: BlockStamp) {
        let cumulative = self.cumulative_notional() + notional_delta;
        let entry = ReserveSnapshot {
            quote_reserve: reserves.quote,
            base_reserve: reserves.base,
            cumulative_notional: cumulative,
            block_height: at.height,
            timestamp: at.timestamp,
        };
        match self.snapshots.last_mut() {
            Some(last) if last.block_height == at.height => *last = entry,
            _ => self.snapshots.push(entry),
        }
    }

    pub fn latest(&self) -> &ReserveSnapshot {
        // the vec is never empty: new() seeds genesis and append never drains
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    // never true: new() seeds genesis and nothing drains the log
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReserveSnapshot> {
        self.snapshots.get(index)
    }

    pub fn cumulative_notional(&self) -> Decimal {
        self.latest().cumulative_notional
    }

    pub fn spot_price(&self) -> Decimal {
        self.latest().spot_price()
    }

    // 3.4: time-weighted spot price over [now - interval, now]. the walk is
    // anchored at the newest snapshot, which itself carries zero duration;
    // each older snapshot is weighted by the slice of its active span inside
    // the window. shorter histories normalize by the covered duration.
    pub fn twap_price(&self, interval_secs: i64, now: Timestamp) -> Decimal {
        if interval_secs <= 0 || self.snapshots.len() < 2 {
            return self.spot_price();
        }
        let window_start = now.minus_secs(interval_secs);
        let latest = self.latest();
        let mut prev_ts = latest.timestamp;
        let mut weighted = Decimal::ZERO;
        let mut covered = Decimal::ZERO;

        for (scanned, snap) in self.snapshots.iter().rev().skip(1).enumerate() {
            let price = snap.spot_price();
            if snap.timestamp <= window_start || scanned + 1 >= TWAP_MAX_SNAPSHOTS {
                let span = Decimal::from((prev_ts.as_millis() - window_start.as_millis()).max(0));
                weighted += price * span;
                covered += span;
                break;
            }
            let span = Decimal::from(prev_ts.as_millis() - snap.timestamp.as_millis());
            weighted += price * span;
            covered += span;
            prev_ts = snap.timestamp;
        }

        if covered.is_zero() {
            self.spot_price()
        } else {
            weighted / covered
        }
    }

    // 3.5: time-weighted base output for a quote-sized trade, re-priced
    // against each historical reserve state over the 15 minute lookback.
    pub fn input_twap(
        &self,
        dir: Direction,
        quote_amount: Decimal,
        now: Timestamp,
    ) -> Result<Decimal, PricingError> {
        if quote_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.weighted_quote(now, |snap| input_price(dir, quote_amount, &snap.reserves()))
    }

    // 3.6: time-weighted quote output for a base-sized trade.
    pub fn output_twap(
        &self,
        dir: Direction,
        base_amount: Decimal,
        now: Timestamp,
    ) -> Result<Decimal, PricingError> {
        if base_amount.is_zero() {
            return Ok(Decimal::ZERO);
        }
        self.weighted_quote(now, |snap| output_price(dir, base_amount, &snap.reserves()))
    }

    fn weighted_quote<F>(&self, now: Timestamp, quote: F) -> Result<Decimal, PricingError>
    where
        F: Fn(&ReserveSnapshot) -> Result<Decimal, PricingError>,
    {
        let latest = self.latest();
        if self.snapshots.len() < 2 {
            return quote(latest);
        }
        let window_start = now.minus_secs(TRADE_TWAP_WINDOW_SECS);
        let mut prev_ts = latest.timestamp;
        let mut weighted = Decimal::ZERO;
        let mut covered = Decimal::ZERO;

        for (scanned, snap) in self.snapshots.iter().rev().skip(1).enumerate() {
            let value = quote(snap)?;
            if snap.timestamp <= window_start || scanned + 1 >= TWAP_MAX_SNAPSHOTS {
                let span = Decimal::from((prev_ts.as_millis() - window_start.as_millis()).max(0));
                weighted += value * span;
                covered += span;
                break;
            }
            let span = Decimal::from(prev_ts.as_millis() - snap.timestamp.as_millis());
            weighted += value * span;
            covered += span;
            prev_ts = snap.timestamp;
        }

        if covered.is_zero() {
            quote(latest)
        } else {
            Ok(weighted / covered)
        }
    }
}
