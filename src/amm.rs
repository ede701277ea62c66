// 5.0 amm.rs: the virtual AMM state machine. swaps price against the reserve
// ledger, every mutation lands in the snapshot history, the guard runs per
// block, and the pool can converge toward the oracle, rescale its depth,
// settle funding and shut down. the vault is only ever consulted through the
// narrow LiquiditySource capability.

use rust_decimal::prelude::MathematicalOps;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ExchangeConfig;
use crate::events::{
    CapChangedEvent, EventCollector, EventPayload, FundingSettledEvent, MoveAmmPriceEvent,
    ReserveSnapshottedEvent, ShutdownEvent, SwapInputEvent, SwapOutputEvent,
};
use crate::guard::{check_fluctuation, FluctuationViolation};
use crate::oracle::PriceOracle;
use crate::pricing::{apply_input, apply_output, input_price, output_price, PricingError, Reserves};
use crate::snapshots::{LiquidityChangedSnapshot, SnapshotHistory};
use crate::types::{ceil_unit, minimal_unit, AccountId, BlockStamp, Direction, ExchangeId, Timestamp};
use crate::vault::PnlSource;

// read-only view of the vault's usable MM depth, injected per call
pub trait LiquiditySource {
    fn available_liquidity(&self, exchange: ExchangeId) -> Decimal;
}

#[derive(Debug, Clone, Error)]
pub enum AmmError {
    #[error("market is closed")]
    MarketClosed,

    #[error("input amount must be positive")]
    ZeroInput,

    #[error("caller is not authorized")]
    Unauthorized,

    #[error("swap of {amount} exceeds trade limit {limit}")]
    OverTradeLimit { amount: Decimal, limit: Decimal },

    #[error("output {actual} below minimum {limit}")]
    BelowMinOutput { actual: Decimal, limit: Decimal },

    #[error("output {actual} above maximum {limit}")]
    AboveMaxOutput { actual: Decimal, limit: Decimal },

    #[error("price {new_price} outside ±{limit} band around block entry price {entry_price}")]
    PriceFluctuation {
        entry_price: Decimal,
        new_price: Decimal,
        limit: Decimal,
    },

    #[error("liquidity multiplier must be positive and not 1")]
    InvalidMultiplier,

    #[error("oracle key mismatch: expected {expected}, got {got}")]
    InvalidPriceKey { expected: String, got: String },

    #[error("oracle price is zero")]
    ZeroOracle,

    #[error("oracle spread {spread} exceeds limit {limit}")]
    OracleOutOfRange { spread: Decimal, limit: Decimal },

    #[error("funding not due until {next_funding_time}, now {now}")]
    TooEarly {
        now: Timestamp,
        next_funding_time: Timestamp,
    },

    #[error("decimal arithmetic out of range")]
    Arithmetic,

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

impl From<FluctuationViolation> for AmmError {
    fn from(v: FluctuationViolation) -> Self {
        AmmError::PriceFluctuation {
            entry_price: v.entry_price,
            new_price: v.new_price,
            limit: v.limit,
        }
    }
}

// 5.1: funding cadence state. next_funding_time only ever moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FundingSchedule {
    pub next_funding_time: Timestamp,
    pub funding_period_secs: i64,
    pub funding_buffer_secs: i64,
    pub funding_rate: Decimal,
}

impl FundingSchedule {
    pub fn new(cfg: &ExchangeConfig, start: Timestamp) -> Self {
        Self {
            next_funding_time: start.plus_secs(cfg.funding_period_secs),
            funding_period_secs: cfg.funding_period_secs,
            funding_buffer_secs: cfg.funding_buffer_secs,
            funding_rate: Decimal::ZERO,
        }
    }
}

// 5.2: aggregate trader exposure, owned and refreshed by the counterparty
// contract. notionals are the quote amounts open positions were entered at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenExposure {
    pub long_base: Decimal,
    pub long_notional: Decimal,
    pub short_base: Decimal,
    pub short_notional: Decimal,
}

impl OpenExposure {
    pub fn net_base(&self) -> Decimal {
        self.long_base - self.short_base
    }
}

// position caps stored here for the counterparty contract to consult
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Caps {
    pub max_holding_base_asset: Decimal,
    pub open_interest_notional_cap: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SwapResult {
    pub quote_asset_amount: Decimal,
    pub base_asset_amount: Decimal,
}

// 5.3: the market itself.
#[derive(Debug, Clone)]
pub struct Amm {
    id: ExchangeId,
    reserves: Reserves,
    history: SnapshotHistory,
    liquidity_changes: Vec<LiquidityChangedSnapshot>,
    // cumulative notional as of the last migration
    notional_baseline: Decimal,
    funding: FundingSchedule,
    exposure: OpenExposure,
    caps: Caps,
    open: bool,
    settlement_price: Option<Decimal>,
    // reserves rotated to the settlement price, frozen at shutdown; the
    // vault's PNL view reads these once the market is closed
    settlement_reserves: Option<Reserves>,
    events: EventCollector,
}

impl Amm {
    pub fn new(
        id: ExchangeId,
        quote_reserve: Decimal,
        base_reserve: Decimal,
        cfg: &ExchangeConfig,
        at: BlockStamp,
    ) -> Result<Self, AmmError> {
        let reserves = Reserves::new(quote_reserve, base_reserve)?;
        let mut events = EventCollector::new();
        events.record(
            at.timestamp,
            EventPayload::ReserveSnapshotted(ReserveSnapshottedEvent {
                quote_asset_reserve: reserves.quote,
                base_asset_reserve: reserves.base,
            }),
        );
        Ok(Self {
            id,
            reserves,
            history: SnapshotHistory::new(&reserves, at),
            liquidity_changes: vec![LiquidityChangedSnapshot {
                quote_reserve: reserves.quote,
                base_reserve: reserves.base,
                cumulative_notional: Decimal::ZERO,
            }],
            notional_baseline: Decimal::ZERO,
            funding: FundingSchedule::new(cfg, at.timestamp),
            exposure: OpenExposure::default(),
            caps: Caps::default(),
            open: true,
            settlement_price: None,
            settlement_reserves: None,
            events,
        })
    }

    pub fn id(&self) -> ExchangeId {
        self.id
    }

    pub fn reserves(&self) -> &Reserves {
        &self.reserves
    }

    pub fn spot_price(&self) -> Decimal {
        self.reserves.spot_price()
    }

    pub fn twap_price(&self, interval_secs: i64, now: Timestamp) -> Decimal {
        self.history.twap_price(interval_secs, now)
    }

    pub fn input_twap(&self, dir: Direction, quote_amount: Decimal, now: Timestamp) -> Result<Decimal, AmmError> {
        Ok(self.history.input_twap(dir, quote_amount, now)?)
    }

    pub fn output_twap(&self, dir: Direction, base_amount: Decimal, now: Timestamp) -> Result<Decimal, AmmError> {
        Ok(self.history.output_twap(dir, base_amount, now)?)
    }

    pub fn history(&self) -> &SnapshotHistory {
        &self.history
    }

    pub fn liquidity_changes(&self) -> &[LiquidityChangedSnapshot] {
        &self.liquidity_changes
    }

    pub fn funding(&self) -> &FundingSchedule {
        &self.funding
    }

    pub fn exposure(&self) -> &OpenExposure {
        &self.exposure
    }

    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    pub fn is_market_open(&self) -> bool {
        self.open
    }

    pub fn settlement_price(&self) -> Option<Decimal> {
        self.settlement_price
    }

    pub fn events(&self) -> &[crate::events::Event] {
        self.events.events()
    }

    fn require_open(&self) -> Result<(), AmmError> {
        if self.open {
            Ok(())
        } else {
            Err(AmmError::MarketClosed)
        }
    }

    // 5.4: trade a fixed quote amount against the pool. base_limit bounds the
    // base side: a minimum when buying, a maximum when paying (0 = unbounded).
    pub fn swap_input(
        &mut self,
        cfg: &ExchangeConfig,
        dir: Direction,
        quote_amount: Decimal,
        base_limit: Decimal,
        allow_override: bool,
        at: BlockStamp,
    ) -> Result<SwapResult, AmmError> {
        self.require_open()?;
        if quote_amount <= Decimal::ZERO {
            return Err(AmmError::ZeroInput);
        }
        if cfg.trade_limit_ratio > Decimal::ZERO {
            let limit = self.reserves.quote * cfg.trade_limit_ratio;
            if quote_amount > limit {
                return Err(AmmError::OverTradeLimit {
                    amount: quote_amount,
                    limit,
                });
            }
        }

        let base_amount = input_price(dir, quote_amount, &self.reserves)?;
        match dir {
            Direction::AddToAmm => {
                if base_amount < base_limit {
                    return Err(AmmError::BelowMinOutput {
                        actual: base_amount,
                        limit: base_limit,
                    });
                }
            }
            Direction::RemoveFromAmm => {
                if !base_limit.is_zero() && base_amount > base_limit {
                    return Err(AmmError::AboveMaxOutput {
                        actual: base_amount,
                        limit: base_limit,
                    });
                }
            }
        }

        let pre_price = self.reserves.spot_price();
        let next = apply_input(dir, quote_amount, base_amount, &self.reserves);
        check_fluctuation(
            &self.history,
            cfg.fluctuation_limit_ratio,
            at.height,
            pre_price,
            next.spot_price(),
            allow_override,
        )?;

        self.reserves = next;
        self.history.append(&self.reserves, dir.sign() * quote_amount, at);
        self.events.record(
            at.timestamp,
            EventPayload::SwapInput(SwapInputEvent {
                dir,
                quote_asset_amount: quote_amount,
                base_asset_amount: base_amount,
            }),
        );
        self.snapshot_event(at.timestamp);

        Ok(SwapResult {
            quote_asset_amount: quote_amount,
            base_asset_amount: base_amount,
        })
    }

    // 5.5: trade a fixed base amount; quote_limit bounds the quote side the
    // same way (minimum received when selling base, maximum paid when buying;
    // 0 = unbounded maximum).
    pub fn swap_output(
        &mut self,
        cfg: &ExchangeConfig,
        dir: Direction,
        base_amount: Decimal,
        quote_limit: Decimal,
        allow_override: bool,
        at: BlockStamp,
    ) -> Result<SwapResult, AmmError> {
        self.require_open()?;
        if base_amount <= Decimal::ZERO {
            return Err(AmmError::ZeroInput);
        }
        if cfg.trade_limit_ratio > Decimal::ZERO {
            let limit = self.reserves.base * cfg.trade_limit_ratio;
            if base_amount > limit {
                return Err(AmmError::OverTradeLimit {
                    amount: base_amount,
                    limit,
                });
            }
        }

        let quote_amount = output_price(dir, base_amount, &self.reserves)?;
        match dir {
            Direction::AddToAmm => {
                if quote_amount < quote_limit {
                    return Err(AmmError::BelowMinOutput {
                        actual: quote_amount,
                        limit: quote_limit,
                    });
                }
            }
            Direction::RemoveFromAmm => {
                if !quote_limit.is_zero() && quote_amount > quote_limit {
                    return Err(AmmError::AboveMaxOutput {
                        actual: quote_amount,
                        limit: quote_limit,
                    });
                }
            }
        }

        let pre_price = self.reserves.spot_price();
        let next = apply_output(dir, base_amount, quote_amount, &self.reserves);
        check_fluctuation(
            &self.history,
            cfg.fluctuation_limit_ratio,
            at.height,
            pre_price,
            next.spot_price(),
            allow_override,
        )?;

        self.reserves = next;
        // quote flows opposite to the base direction
        self.history
            .append(&self.reserves, -dir.sign() * quote_amount, at);
        self.events.record(
            at.timestamp,
            EventPayload::SwapOutput(SwapOutputEvent {
                dir,
                quote_asset_amount: quote_amount,
                base_asset_amount: base_amount,
            }),
        );
        self.snapshot_event(at.timestamp);

        Ok(SwapResult {
            quote_asset_amount: quote_amount,
            base_asset_amount: base_amount,
        })
    }

    // 5.6: rescale market depth. both reserves scale by the multiplier, so k
    // scales by its square and the spot price is preserved up to minimal-unit
    // rounding; the drift must stay inside the caller's allowance. records the
    // notional accrued since the previous migration and resets the baseline.
    pub fn migrate_liquidity(
        &mut self,
        cfg: &ExchangeConfig,
        caller: AccountId,
        multiplier: Decimal,
        fluctuation_allowance: Decimal,
        at: BlockStamp,
    ) -> Result<(), AmmError> {
        if caller != cfg.owner {
            return Err(AmmError::Unauthorized);
        }
        self.require_open()?;
        if multiplier <= Decimal::ZERO || multiplier == Decimal::ONE {
            return Err(AmmError::InvalidMultiplier);
        }

        let pre_price = self.reserves.spot_price();
        let scaled = Reserves::new(
            ceil_unit(self.reserves.quote * multiplier),
            ceil_unit(self.reserves.base * multiplier),
        )?;
        let drift = (scaled.spot_price() - pre_price).abs() / pre_price;
        if drift > fluctuation_allowance {
            return Err(AmmError::PriceFluctuation {
                entry_price: pre_price,
                new_price: scaled.spot_price(),
                limit: fluctuation_allowance,
            });
        }

        let accrued = self.history.cumulative_notional() - self.notional_baseline;
        self.liquidity_changes.push(LiquidityChangedSnapshot {
            quote_reserve: scaled.quote,
            base_reserve: scaled.base,
            cumulative_notional: accrued,
        });
        self.notional_baseline = self.history.cumulative_notional();

        self.reserves = scaled;
        self.history.append(&self.reserves, Decimal::ZERO, at);
        self.snapshot_event(at.timestamp);
        Ok(())
    }

    // 5.7: rotate the pool toward the oracle price. k is preserved; the move
    // is refused (not an error) when the resulting MM loss would exceed the
    // vault's usable depth. the decision context is emitted either way.
    pub fn move_price_to_oracle(
        &mut self,
        cfg: &ExchangeConfig,
        oracle_price: Decimal,
        key: &str,
        vault: &impl LiquiditySource,
        at: BlockStamp,
    ) -> Result<bool, AmmError> {
        self.require_open()?;
        if key != cfg.price_key {
            return Err(AmmError::InvalidPriceKey {
                expected: cfg.price_key.clone(),
                got: key.to_string(),
            });
        }
        if oracle_price <= Decimal::ZERO {
            return Err(AmmError::ZeroOracle);
        }

        let spot = self.reserves.spot_price();
        let spread = (spot - oracle_price).abs() / spot;
        if spread > cfg.oracle_spread_limit {
            return Err(AmmError::OracleOutOfRange {
                spread,
                limit: cfg.oracle_spread_limit,
            });
        }

        let adjust_price = spot + (oracle_price - spot) * cfg.price_adjust_ratio;
        let candidate = self.rotated_reserves(adjust_price)?;
        let pnl = self.unrealized_pnl(&candidate)?;
        let liquidity = vault.available_liquidity(self.id);
        let moved = !(pnl < Decimal::ZERO && -pnl > liquidity);

        if moved {
            self.reserves = candidate;
            self.history.append(&self.reserves, Decimal::ZERO, at);
            self.snapshot_event(at.timestamp);
        }

        self.events.record(
            at.timestamp,
            EventPayload::MoveAmmPrice(MoveAmmPriceEvent {
                amm_price: spot,
                oracle_price,
                adjust_price,
                mm_liquidity: liquidity,
                mm_pnl: pnl,
                moved,
            }),
        );
        Ok(moved)
    }

    // 5.8: funding bookkeeping. the rate is recomputed from the snapshot
    // history and the oracle TWAP on every call; the schedule advances by one
    // period when settled inside the buffer window and snaps to now + buffer
    // after a missed window.
    pub fn settle_funding(
        &mut self,
        cfg: &ExchangeConfig,
        caller: AccountId,
        oracle: &impl PriceOracle,
        at: BlockStamp,
    ) -> Result<Decimal, AmmError> {
        if caller != cfg.counterparty {
            return Err(AmmError::Unauthorized);
        }
        self.require_open()?;
        if at.timestamp < self.funding.next_funding_time {
            return Err(AmmError::TooEarly {
                now: at.timestamp,
                next_funding_time: self.funding.next_funding_time,
            });
        }

        let underlying = oracle.get_twap_price();
        if underlying <= Decimal::ZERO {
            return Err(AmmError::ZeroOracle);
        }
        let mark_twap = self.history.twap_price(cfg.funding_twap_interval_secs, at.timestamp);
        let premium = mark_twap - underlying;
        let premium_fraction = premium * Decimal::from(self.funding.funding_period_secs) / dec!(86400);
        let rate = premium_fraction / underlying;
        self.funding.funding_rate = rate;

        let buffer_deadline = self.funding.next_funding_time.plus_secs(self.funding.funding_buffer_secs);
        self.funding.next_funding_time = if at.timestamp <= buffer_deadline {
            self.funding.next_funding_time.plus_secs(self.funding.funding_period_secs)
        } else {
            at.timestamp.plus_secs(self.funding.funding_buffer_secs)
        };

        self.events.record(
            at.timestamp,
            EventPayload::FundingSettled(FundingSettledEvent {
                funding_rate: rate,
                underlying_price: underlying,
                next_funding_time: self.funding.next_funding_time,
            }),
        );
        Ok(rate)
    }

    // 5.9: one-way stop. when the MM loss at current reserves exceeds the
    // vault's usable depth, the settlement price is solved so the loss equals
    // exactly that depth; otherwise it is the current spot. reserves freeze
    // for downstream settlement reads.
    pub fn shutdown(
        &mut self,
        cfg: &ExchangeConfig,
        caller: AccountId,
        vault: &impl LiquiditySource,
        now: Timestamp,
    ) -> Result<Decimal, AmmError> {
        if caller != cfg.owner {
            return Err(AmmError::Unauthorized);
        }
        self.require_open()?;

        let available = vault.available_liquidity(self.id);
        let pnl = self.unrealized_pnl(&self.reserves)?;
        let settlement = if pnl < Decimal::ZERO && -pnl > available {
            self.solve_settlement_price(available)
        } else {
            self.reserves.spot_price()
        };
        let frozen = self.rotated_reserves(settlement)?;

        self.open = false;
        self.settlement_price = Some(settlement);
        self.settlement_reserves = Some(frozen);
        self.events.record(
            now,
            EventPayload::Shutdown(ShutdownEvent {
                settlement_price: settlement,
            }),
        );
        Ok(settlement)
    }

    // 5.10: MM-side counterparty PNL at candidate reserves: what the pool
    // would gain or lose if every open trader position closed against them.
    pub fn unrealized_pnl(&self, candidate: &Reserves) -> Result<Decimal, PricingError> {
        let e = &self.exposure;
        let mut pnl = Decimal::ZERO;
        if e.long_base > Decimal::ZERO {
            // longs close by selling base back to the pool
            let close = output_price(Direction::AddToAmm, e.long_base, candidate)?;
            pnl += e.long_notional - close;
        }
        if e.short_base > Decimal::ZERO {
            // shorts close by buying base back from the pool
            let close = output_price(Direction::RemoveFromAmm, e.short_base, candidate)?;
            pnl += close - e.short_notional;
        }
        Ok(pnl)
    }

    // counterparty contract refreshes the aggregate exposure it tracks
    pub fn set_open_exposure(
        &mut self,
        cfg: &ExchangeConfig,
        caller: AccountId,
        exposure: OpenExposure,
    ) -> Result<(), AmmError> {
        if caller != cfg.counterparty {
            return Err(AmmError::Unauthorized);
        }
        self.exposure = exposure;
        Ok(())
    }

    pub fn set_caps(
        &mut self,
        cfg: &ExchangeConfig,
        caller: AccountId,
        max_holding_base_asset: Decimal,
        open_interest_notional_cap: Decimal,
        now: Timestamp,
    ) -> Result<(), AmmError> {
        if caller != cfg.owner {
            return Err(AmmError::Unauthorized);
        }
        self.caps = Caps {
            max_holding_base_asset,
            open_interest_notional_cap,
        };
        self.events.record(
            now,
            EventPayload::CapChanged(CapChangedEvent {
                max_holding_base_asset,
                open_interest_notional_cap,
            }),
        );
        Ok(())
    }

    // reserves with the same k rotated to the target price:
    // quote = sqrt(k * price), base = sqrt(k / price)
    fn rotated_reserves(&self, price: Decimal) -> Result<Reserves, AmmError> {
        let k = self.reserves.invariant();
        let quote = (k * price).sqrt().ok_or(AmmError::Arithmetic)?;
        let base = (k / price).sqrt().ok_or(AmmError::Arithmetic)?;
        Ok(Reserves::new(ceil_unit(quote), ceil_unit(base))?)
    }

    // bisection on the PNL-vs-price curve: find the price where the MM loss
    // equals the vault's usable depth. the loss shrinks toward lower prices
    // when traders are net long and toward higher prices when net short.
    fn solve_settlement_price(&self, available: Decimal) -> Decimal {
        let spot = self.reserves.spot_price();
        let net = self.exposure.net_base();
        if net.is_zero() {
            return spot;
        }

        // None = the curve is past its asymptote there, which also means the
        // pool keeps everything; both count as "loss covered"
        let covered = |price: Decimal| -> bool {
            match self.rotated_reserves(price) {
                Ok(r) => match self.unrealized_pnl(&r) {
                    Ok(pnl) => pnl + available >= Decimal::ZERO,
                    Err(_) => true,
                },
                Err(_) => true,
            }
        };

        let mut bad = spot;
        let mut good = spot;
        let mut found = false;
        let mut probe = spot;
        for _ in 0..64 {
            if net > Decimal::ZERO {
                if probe <= minimal_unit() {
                    break;
                }
                probe /= Decimal::TWO;
            } else {
                if probe >= Decimal::MAX / dec!(4) {
                    break;
                }
                probe *= Decimal::TWO;
            }
            if covered(probe) {
                good = probe;
                found = true;
                break;
            }
            bad = probe;
        }
        if !found {
            return spot;
        }

        for _ in 0..128 {
            let mid = (good + bad) / Decimal::TWO;
            if (good - bad).abs() <= minimal_unit() {
                break;
            }
            if covered(mid) {
                good = mid;
            } else {
                bad = mid;
            }
        }
        good
    }

    fn snapshot_event(&mut self, now: Timestamp) {
        self.events.record(
            now,
            EventPayload::ReserveSnapshotted(ReserveSnapshottedEvent {
                quote_asset_reserve: self.reserves.quote,
                base_asset_reserve: self.reserves.base,
            }),
        );
    }
}

impl PnlSource for Amm {
    fn mm_unrealized_pnl(&self) -> Result<Decimal, PricingError> {
        let reserves = self.settlement_reserves.as_ref().unwrap_or(&self.reserves);
        self.unrealized_pnl(reserves)
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
