// 6.0 vault.rs: pooled third-party capital behind the AMM, split into a High
// and a Low risk tranche per exchange. deposits mint tranche tokens at the
// pool's share price, the counterparty's profit/loss is allocated across
// tranches by weight-scaled share, and bad debt drains insurance first, then
// the tranches by weight with capacity reassignment.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::allocation::{allocate_pnl, split_by_weight_clamped, weight_fraction};
use crate::amm::LiquiditySource;
use crate::config::VaultConfig;
use crate::events::{
    BadDebtResolvedEvent, CachedLiquidityAddedEvent, EventCollector, EventPayload,
    LiquidityAddEvent, LiquidityRemoveEvent, VaultWithdrawEvent,
};
use crate::pricing::PricingError;
use crate::types::{AccountId, ExchangeId, Timestamp, Tranche};

// read-only view of the AMM the vault backs, injected per call
pub trait PnlSource {
    fn mm_unrealized_pnl(&self) -> Result<Decimal, PricingError>;
    fn is_open(&self) -> bool;
}

#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("input amount must be positive")]
    ZeroInput,

    #[error("caller is not authorized")]
    Unauthorized,

    #[error("exchange {0:?} is not registered with the vault")]
    UnknownExchange(ExchangeId),

    #[error("no LP position for this account and tranche")]
    NoPosition,

    #[error("liquidity locked until {until}")]
    Locked { until: Timestamp },

    #[error("token balance {balance} is less than requested {requested}")]
    InsufficientTokens { requested: Decimal, balance: Decimal },

    #[error("vault balance {available} cannot cover {requested}")]
    InsufficientFunds { requested: Decimal, available: Decimal },

    #[error("bad debt {demand} exceeds total loss capacity {capacity}")]
    Bankrupt { demand: Decimal, capacity: Decimal },

    #[error("market is still open")]
    MarketStillOpen,

    #[error("at least one tranche weight must be nonzero")]
    InvalidWeight,

    #[error("max loss must be within (0, 10000] bps, got {bps}")]
    InvalidMaxLoss { bps: u32 },

    #[error("unrealized loss {exposure} does not fit under cap {cap}")]
    FundNotEnough { exposure: Decimal, cap: Decimal },

    #[error(transparent)]
    Pricing(#[from] PricingError),
}

// 6.1: one risk tranche. tokens are a plain mintable/burnable supply; the
// share price is total_liquidity / token_supply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranchePool {
    pub total_liquidity: Decimal,
    pub token_supply: Decimal,
    pub weight: u32,
    pub max_loss_bps: u32,
}

impl TranchePool {
    fn new(weight: u32, max_loss_bps: u32) -> Self {
        Self {
            total_liquidity: Decimal::ZERO,
            token_supply: Decimal::ZERO,
            weight,
            max_loss_bps,
        }
    }

    pub fn token_price(&self) -> Decimal {
        if self.token_supply.is_zero() {
            Decimal::ONE
        } else {
            self.total_liquidity / self.token_supply
        }
    }

    pub fn weighted_liquidity(&self) -> Decimal {
        self.total_liquidity * weight_fraction(self.weight)
    }
}

// 6.2: LP position per (exchange, tranche, account). destroyed on full
// withdrawal so a later deposit starts a fresh lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LpPosition {
    pub account: AccountId,
    pub tranche: Tranche,
    pub token_balance: Decimal,
    pub next_withdraw_time: Timestamp,
}

// 6.3: everything the vault holds for one exchange. balance is the quote
// asset actually sitting in the vault for that market; cached_liquidity is
// counterparty profit staged for the High tranche but not yet folded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MmFunds {
    pub high: TranchePool,
    pub low: TranchePool,
    pub cached_liquidity: Decimal,
    pub balance: Decimal,
}

impl MmFunds {
    fn new(cfg: &VaultConfig) -> Self {
        Self {
            high: TranchePool::new(cfg.high_weight, cfg.high_max_loss_bps),
            low: TranchePool::new(cfg.low_weight, cfg.low_max_loss_bps),
            cached_liquidity: Decimal::ZERO,
            balance: Decimal::ZERO,
        }
    }

    pub fn tranche(&self, tranche: Tranche) -> &TranchePool {
        match tranche {
            Tranche::High => &self.high,
            Tranche::Low => &self.low,
        }
    }

    fn tranche_mut(&mut self, tranche: Tranche) -> &mut TranchePool {
        match tranche {
            Tranche::High => &mut self.high,
            Tranche::Low => &mut self.low,
        }
    }

    // usable MM depth: weight-scaled liquidity across both tranches
    pub fn available_liquidity(&self) -> Decimal {
        self.high.weighted_liquidity() + self.low.weighted_liquidity()
    }
}

// 6.4: insurance buffer, first tier of the bad-debt waterfall. a capped
// quote-asset balance with payout bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceFund {
    pub balance: Decimal,
    pub total_deposits: Decimal,
    pub total_payouts: Decimal,
}

impl InsuranceFund {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            balance: initial_balance,
            total_deposits: initial_balance,
            total_payouts: Decimal::ZERO,
        }
    }

    pub fn deposit(&mut self, amount: Decimal) {
        self.balance += amount;
        self.total_deposits += amount;
    }

    fn pay(&mut self, amount: Decimal) {
        self.balance -= amount;
        self.total_payouts += amount;
    }
}

// the four waterfall components; they sum exactly to the resolved amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadDebtResolution {
    pub bad_debt: Decimal,
    pub insurance: Decimal,
    pub high: Decimal,
    pub low: Decimal,
}

// 6.5: the vault itself. exchanges are registered once and keep independent
// funds; LP positions are keyed by exchange, tranche and account.
#[derive(Debug, Clone)]
pub struct RiskVault {
    funds: HashMap<ExchangeId, MmFunds>,
    positions: HashMap<(ExchangeId, Tranche, AccountId), LpPosition>,
    insurance: InsuranceFund,
    events: EventCollector,
}

impl RiskVault {
    pub fn new(insurance_balance: Decimal) -> Self {
        Self {
            funds: HashMap::new(),
            positions: HashMap::new(),
            insurance: InsuranceFund::new(insurance_balance),
            events: EventCollector::new(),
        }
    }

    pub fn register_exchange(&mut self, cfg: &VaultConfig, exchange: ExchangeId) {
        self.funds.entry(exchange).or_insert_with(|| MmFunds::new(cfg));
    }

    pub fn funds(&self, exchange: ExchangeId) -> Option<&MmFunds> {
        self.funds.get(&exchange)
    }

    pub fn position(&self, exchange: ExchangeId, tranche: Tranche, account: AccountId) -> Option<&LpPosition> {
        self.positions.get(&(exchange, tranche, account))
    }

    pub fn insurance(&self) -> &InsuranceFund {
        &self.insurance
    }

    pub fn fund_insurance(&mut self, amount: Decimal) {
        self.insurance.deposit(amount);
    }

    pub fn events(&self) -> &[crate::events::Event] {
        self.events.events()
    }

    fn funds_mut(&mut self, exchange: ExchangeId) -> Result<&mut MmFunds, VaultError> {
        self.funds
            .get_mut(&exchange)
            .ok_or(VaultError::UnknownExchange(exchange))
    }

    // 6.6: deposit into a tranche. tokens mint at the current share price.
    // the lock starts fresh on a zero-balance deposit, extends while a lock
    // is already running, and is left alone once expired with balance held.
    pub fn add_liquidity(
        &mut self,
        cfg: &VaultConfig,
        exchange: ExchangeId,
        account: AccountId,
        tranche: Tranche,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<Decimal, VaultError> {
        if amount <= Decimal::ZERO {
            return Err(VaultError::ZeroInput);
        }
        self.fold_cached_liquidity(exchange)?;

        let funds = self.funds_mut(exchange)?;
        let pool = funds.tranche_mut(tranche);
        let tokens = amount / pool.token_price();
        pool.total_liquidity += amount;
        pool.token_supply += tokens;
        funds.balance += amount;

        let lock_until = now.plus_secs(cfg.lock_duration_secs);
        let position = self
            .positions
            .entry((exchange, tranche, account))
            .or_insert_with(|| LpPosition {
                account,
                tranche,
                token_balance: Decimal::ZERO,
                next_withdraw_time: lock_until,
            });
        if position.token_balance.is_zero() || now < position.next_withdraw_time {
            position.next_withdraw_time = lock_until;
        }
        position.token_balance += tokens;

        self.events.record(
            now,
            EventPayload::LiquidityAdd(LiquidityAddEvent {
                exchange,
                account,
                risk: tranche,
                lp_fund: amount,
                token_amount: tokens,
            }),
        );
        Ok(tokens)
    }

    // 6.7: burn tranche tokens for quote. the withdraw fee stays in the pool
    // and accrues to the remaining holders.
    pub fn remove_liquidity(
        &mut self,
        cfg: &VaultConfig,
        exchange: ExchangeId,
        account: AccountId,
        tranche: Tranche,
        token_amount: Decimal,
        now: Timestamp,
    ) -> Result<Decimal, VaultError> {
        if token_amount <= Decimal::ZERO {
            return Err(VaultError::ZeroInput);
        }
        let position = self
            .positions
            .get(&(exchange, tranche, account))
            .ok_or(VaultError::NoPosition)?;
        if now < position.next_withdraw_time {
            return Err(VaultError::Locked {
                until: position.next_withdraw_time,
            });
        }
        if token_amount > position.token_balance {
            return Err(VaultError::InsufficientTokens {
                requested: token_amount,
                balance: position.token_balance,
            });
        }
        self.fold_cached_liquidity(exchange)?;

        let funds = self.funds_mut(exchange)?;
        let pool = funds.tranche_mut(tranche);
        let liquidity_out = token_amount * pool.token_price();
        let payout = liquidity_out * (Decimal::ONE - cfg.withdraw_fee_ratio);
        if payout > funds.balance {
            return Err(VaultError::InsufficientFunds {
                requested: payout,
                available: funds.balance,
            });
        }

        let pool = funds.tranche_mut(tranche);
        pool.token_supply -= token_amount;
        pool.total_liquidity -= payout;
        funds.balance -= payout;

        let position = self
            .positions
            .get_mut(&(exchange, tranche, account))
            .ok_or(VaultError::NoPosition)?;
        position.token_balance -= token_amount;
        if position.token_balance.is_zero() {
            self.positions.remove(&(exchange, tranche, account));
        }

        self.events.record(
            now,
            EventPayload::LiquidityRemove(LiquidityRemoveEvent {
                exchange,
                account,
                risk: tranche,
                lp_fund: payout,
                token_amount,
            }),
        );
        Ok(payout)
    }

    // 6.8: full exit after the exchange has shut down. pays the whole
    // position at the settlement-adjusted share price, lock and fee waived.
    pub fn remove_liquidity_when_shutdown(
        &mut self,
        _cfg: &VaultConfig,
        exchange: ExchangeId,
        account: AccountId,
        tranche: Tranche,
        amm: &impl PnlSource,
        now: Timestamp,
    ) -> Result<Decimal, VaultError> {
        if amm.is_open() {
            return Err(VaultError::MarketStillOpen);
        }
        let position = self
            .positions
            .get(&(exchange, tranche, account))
            .ok_or(VaultError::NoPosition)?;
        let token_amount = position.token_balance;
        self.fold_cached_liquidity(exchange)?;

        let pnl = amm.mm_unrealized_pnl()?;
        let funds = self.funds_mut(exchange)?;
        let allocated = allocate_pnl(
            pnl,
            [funds.high.weighted_liquidity(), funds.low.weighted_liquidity()],
            [funds.high.total_liquidity, funds.low.total_liquidity],
        );
        let alloc = match tranche {
            Tranche::High => allocated[0],
            Tranche::Low => allocated[1],
        };

        let pool = funds.tranche(tranche);
        let adjusted_value = (pool.total_liquidity + alloc).max(Decimal::ZERO);
        let settle_price = if pool.token_supply.is_zero() {
            Decimal::ONE
        } else {
            adjusted_value / pool.token_supply
        };
        let payout = token_amount * settle_price;
        if payout > funds.balance {
            return Err(VaultError::InsufficientFunds {
                requested: payout,
                available: funds.balance,
            });
        }

        let pool = funds.tranche_mut(tranche);
        pool.token_supply -= token_amount;
        pool.total_liquidity = (pool.total_liquidity - payout).max(Decimal::ZERO);
        funds.balance -= payout;
        self.positions.remove(&(exchange, tranche, account));

        self.events.record(
            now,
            EventPayload::LiquidityRemove(LiquidityRemoveEvent {
                exchange,
                account,
                risk: tranche,
                lp_fund: payout,
                token_amount,
            }),
        );
        Ok(payout)
    }

    // 6.9: the counterparty PNL as seen by the vault, and its split across
    // tranches. a tranche's allocated loss never exceeds its own liquidity.
    pub fn unrealized_pnl(
        &self,
        exchange: ExchangeId,
        amm: &impl PnlSource,
    ) -> Result<Decimal, VaultError> {
        self.funds
            .get(&exchange)
            .ok_or(VaultError::UnknownExchange(exchange))?;
        Ok(amm.mm_unrealized_pnl()?)
    }

    pub fn allocated_pnl(
        &self,
        exchange: ExchangeId,
        amm: &impl PnlSource,
    ) -> Result<(Decimal, Decimal), VaultError> {
        let funds = self
            .funds
            .get(&exchange)
            .ok_or(VaultError::UnknownExchange(exchange))?;
        let pnl = amm.mm_unrealized_pnl()?;
        let allocated = allocate_pnl(
            pnl,
            [funds.high.weighted_liquidity(), funds.low.weighted_liquidity()],
            [funds.high.total_liquidity, funds.low.total_liquidity],
        );
        Ok((allocated[0], allocated[1]))
    }

    // 6.10: counterparty profit staged for the High tranche. folded in
    // exactly once by the next liquidity-modifying call.
    pub fn add_cached_liquidity(
        &mut self,
        cfg: &VaultConfig,
        caller: AccountId,
        exchange: ExchangeId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<(), VaultError> {
        if caller != cfg.counterparty {
            return Err(VaultError::Unauthorized);
        }
        if amount <= Decimal::ZERO {
            return Err(VaultError::ZeroInput);
        }
        let funds = self.funds_mut(exchange)?;
        funds.cached_liquidity += amount;
        funds.balance += amount;

        self.events.record(
            now,
            EventPayload::CachedLiquidityAdded(CachedLiquidityAddedEvent { exchange, amount }),
        );
        Ok(())
    }

    // idempotent: the pending amount is zeroed in the same transition
    pub fn fold_cached_liquidity(&mut self, exchange: ExchangeId) -> Result<(), VaultError> {
        let funds = self.funds_mut(exchange)?;
        if funds.cached_liquidity > Decimal::ZERO {
            funds.high.total_liquidity += funds.cached_liquidity;
            funds.cached_liquidity = Decimal::ZERO;
        }
        Ok(())
    }

    // 6.11: two-pass loss waterfall. insurance pays first up to its whole
    // balance; the remainder splits across tranches by weight, each capped at
    // its own liquidity with the shortfall reassigned to the other.
    pub fn realize_bad_debt(
        &mut self,
        cfg: &VaultConfig,
        caller: AccountId,
        exchange: ExchangeId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<BadDebtResolution, VaultError> {
        if caller != cfg.counterparty {
            return Err(VaultError::Unauthorized);
        }
        if amount <= Decimal::ZERO {
            return Err(VaultError::ZeroInput);
        }

        let insurance_available = self.insurance.balance;
        let funds = self.funds_mut(exchange)?;

        let from_insurance = amount.min(insurance_available);
        let remainder = amount - from_insurance;
        let tranche_split = split_by_weight_clamped(
            [funds.high.total_liquidity, funds.low.total_liquidity],
            [funds.high.weight, funds.low.weight],
            remainder,
        );
        let covered = from_insurance + tranche_split[0] + tranche_split[1];
        if covered < amount {
            return Err(VaultError::Bankrupt {
                demand: amount,
                capacity: insurance_available + funds.high.total_liquidity + funds.low.total_liquidity,
            });
        }

        let from_tranches = tranche_split[0] + tranche_split[1];
        if from_tranches > funds.balance {
            return Err(VaultError::InsufficientFunds {
                requested: from_tranches,
                available: funds.balance,
            });
        }

        funds.high.total_liquidity -= tranche_split[0];
        funds.low.total_liquidity -= tranche_split[1];
        funds.balance -= from_tranches;
        self.insurance.pay(from_insurance);

        let resolution = BadDebtResolution {
            bad_debt: amount,
            insurance: from_insurance,
            high: tranche_split[0],
            low: tranche_split[1],
        };
        self.events.record(
            now,
            EventPayload::BadDebtResolved(BadDebtResolvedEvent {
                exchange,
                bad_debt: amount,
                insurance_fund_resolve_bad_debt: from_insurance,
                mm_high_resolve_bad_debt: tranche_split[0],
                mm_low_resolve_bad_debt: tranche_split[1],
            }),
        );
        Ok(resolution)
    }

    // 6.12: counterparty pulls quote out of the vault, e.g. to pay a winning
    // trader. a shortfall is a liquidity-timing guard, not a normal path.
    pub fn withdraw(
        &mut self,
        cfg: &VaultConfig,
        caller: AccountId,
        exchange: ExchangeId,
        to: AccountId,
        amount: Decimal,
        now: Timestamp,
    ) -> Result<(), VaultError> {
        if caller != cfg.counterparty {
            return Err(VaultError::Unauthorized);
        }
        if amount <= Decimal::ZERO {
            return Err(VaultError::ZeroInput);
        }
        let funds = self.funds_mut(exchange)?;
        if amount > funds.balance {
            return Err(VaultError::InsufficientFunds {
                requested: amount,
                available: funds.balance,
            });
        }
        funds.balance -= amount;

        self.events.record(
            now,
            EventPayload::VaultWithdraw(VaultWithdrawEvent { exchange, to, amount }),
        );
        Ok(())
    }

    // 6.13: owner reconfiguration. the new loss cap must still cover the
    // tranche's current allocated loss.
    pub fn set_max_loss(
        &mut self,
        cfg: &VaultConfig,
        caller: AccountId,
        exchange: ExchangeId,
        tranche: Tranche,
        bps: u32,
        amm: &impl PnlSource,
    ) -> Result<(), VaultError> {
        if caller != cfg.owner {
            return Err(VaultError::Unauthorized);
        }
        if bps == 0 || bps > 10_000 {
            return Err(VaultError::InvalidMaxLoss { bps });
        }

        let (high_alloc, low_alloc) = self.allocated_pnl(exchange, amm)?;
        let alloc = match tranche {
            Tranche::High => high_alloc,
            Tranche::Low => low_alloc,
        };
        let funds = self.funds_mut(exchange)?;
        let pool = funds.tranche(tranche);
        let exposure = (-alloc).max(Decimal::ZERO);
        let cap = pool.total_liquidity * Decimal::from(bps) / Decimal::from(10_000u32);
        if exposure > cap {
            return Err(VaultError::FundNotEnough { exposure, cap });
        }

        funds.tranche_mut(tranche).max_loss_bps = bps;
        Ok(())
    }

    pub fn set_risk_liquidity_weight(
        &mut self,
        cfg: &VaultConfig,
        caller: AccountId,
        exchange: ExchangeId,
        high_weight: u32,
        low_weight: u32,
    ) -> Result<(), VaultError> {
        if caller != cfg.owner {
            return Err(VaultError::Unauthorized);
        }
        if high_weight == 0 && low_weight == 0 {
            return Err(VaultError::InvalidWeight);
        }
        let funds = self.funds_mut(exchange)?;
        funds.high.weight = high_weight;
        funds.low.weight = low_weight;
        Ok(())
    }
}

impl LiquiditySource for RiskVault {
    fn available_liquidity(&self, exchange: ExchangeId) -> Decimal {
        self.funds
            .get(&exchange)
            .map(MmFunds::available_liquidity)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    struct FixedPnl {
        pnl: Decimal,
        open: bool,
    }

    impl PnlSource for FixedPnl {
        fn mm_unrealized_pnl(&self) -> Result<Decimal, PricingError> {
            Ok(self.pnl)
        }

        fn is_open(&self) -> bool {
            self.open
        }
    }

    fn cfg() -> VaultConfig {
        VaultConfig::default()
    }

    fn exchange() -> ExchangeId {
        ExchangeId(1)
    }

    fn lp() -> AccountId {
        AccountId(10)
    }

    fn vault_with_exchange() -> RiskVault {
        let mut vault = RiskVault::new(dec!(0));
        vault.register_exchange(&cfg(), exchange());
        vault
    }

    fn t(secs: i64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    #[test]
    fn add_liquidity_mints_one_to_one_when_empty() {
        let mut vault = vault_with_exchange();
        let tokens = vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::High, dec!(10000), t(0))
            .unwrap();
        assert_eq!(tokens, dec!(10000));

        let funds = vault.funds(exchange()).unwrap();
        assert_eq!(funds.high.total_liquidity, dec!(10000));
        assert_eq!(funds.high.token_supply, dec!(10000));
        assert_eq!(funds.balance, dec!(10000));
    }

    #[test]
    fn add_liquidity_zero_rejected() {
        let mut vault = vault_with_exchange();
        let res = vault.add_liquidity(&cfg(), exchange(), lp(), Tranche::High, dec!(0), t(0));
        assert!(matches!(res, Err(VaultError::ZeroInput)));
    }

    #[test]
    fn available_liquidity_is_weight_scaled() {
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::High, dec!(10000), t(0))
            .unwrap();
        vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::Low, dec!(20000), t(0))
            .unwrap();

        // 10000 * 0.5 + 20000 * 0.25 = 10000
        assert_eq!(vault.available_liquidity(exchange()), dec!(10000));
    }

    #[test]
    fn lock_timer_rules() {
        let config = cfg();
        let lock = config.lock_duration_secs;
        let mut vault = vault_with_exchange();

        // fresh deposit starts the lock
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(100), t(0))
            .unwrap();
        let until = vault.position(exchange(), Tranche::High, lp()).unwrap().next_withdraw_time;
        assert_eq!(until, t(lock));

        // deposit during an active lock extends it
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(100), t(100))
            .unwrap();
        let until = vault.position(exchange(), Tranche::High, lp()).unwrap().next_withdraw_time;
        assert_eq!(until, t(lock + 100));

        // deposit after expiry with balance held leaves the timer alone
        let late = lock + 200;
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(100), t(late))
            .unwrap();
        let until = vault.position(exchange(), Tranche::High, lp()).unwrap().next_withdraw_time;
        assert_eq!(until, t(lock + 100));

        // full drain and redeposit starts a fresh lock
        let balance = vault.position(exchange(), Tranche::High, lp()).unwrap().token_balance;
        vault
            .remove_liquidity(&config, exchange(), lp(), Tranche::High, balance, t(late + 10))
            .unwrap();
        assert!(vault.position(exchange(), Tranche::High, lp()).is_none());

        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(100), t(late + 20))
            .unwrap();
        let until = vault.position(exchange(), Tranche::High, lp()).unwrap().next_withdraw_time;
        assert_eq!(until, t(late + 20 + lock));
    }

    #[test]
    fn remove_liquidity_respects_lock() {
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::High, dec!(1000), t(0))
            .unwrap();

        let res = vault.remove_liquidity(&cfg(), exchange(), lp(), Tranche::High, dec!(500), t(10));
        assert!(matches!(res, Err(VaultError::Locked { .. })));
    }

    #[test]
    fn withdraw_fee_stays_in_pool() {
        let config = cfg();
        let mut vault = vault_with_exchange();
        let other = AccountId(11);
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(1000), t(0))
            .unwrap();
        vault
            .add_liquidity(&config, exchange(), other, Tranche::High, dec!(1000), t(0))
            .unwrap();

        let after_lock = config.lock_duration_secs + 1;
        let price_before = vault.funds(exchange()).unwrap().high.token_price();
        let payout = vault
            .remove_liquidity(&config, exchange(), lp(), Tranche::High, dec!(1000), t(after_lock))
            .unwrap();

        // 0.5% fee withheld
        assert_eq!(payout, dec!(995));
        let price_after = vault.funds(exchange()).unwrap().high.token_price();
        assert!(price_after > price_before);
    }

    #[test]
    fn remove_liquidity_more_than_held_rejected() {
        let config = cfg();
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(100), t(0))
            .unwrap();
        let res = vault.remove_liquidity(
            &config,
            exchange(),
            lp(),
            Tranche::High,
            dec!(200),
            t(config.lock_duration_secs + 1),
        );
        assert!(matches!(res, Err(VaultError::InsufficientTokens { .. })));
    }

    #[test]
    fn shutdown_withdrawal_bypasses_lock_and_fee() {
        let config = cfg();
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(1000), t(0))
            .unwrap();

        let open_amm = FixedPnl { pnl: dec!(0), open: true };
        let res = vault.remove_liquidity_when_shutdown(
            &config,
            exchange(),
            lp(),
            Tranche::High,
            &open_amm,
            t(10),
        );
        assert!(matches!(res, Err(VaultError::MarketStillOpen)));

        // shut down with a 100 loss allocated entirely to High
        let closed_amm = FixedPnl { pnl: dec!(-100), open: false };
        let payout = vault
            .remove_liquidity_when_shutdown(&config, exchange(), lp(), Tranche::High, &closed_amm, t(10))
            .unwrap();
        assert_eq!(payout, dec!(900));
        assert!(vault.position(exchange(), Tranche::High, lp()).is_none());
    }

    #[test]
    fn pnl_allocation_matches_weighted_shares() {
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::High, dec!(10000), t(0))
            .unwrap();
        vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::Low, dec!(20000), t(0))
            .unwrap();

        // weighted shares are 5000 vs 5000: even split
        let amm = FixedPnl { pnl: dec!(600), open: true };
        let (high, low) = vault.allocated_pnl(exchange(), &amm).unwrap();
        assert_eq!(high, dec!(300));
        assert_eq!(low, dec!(300));

        let amm = FixedPnl { pnl: dec!(-600), open: true };
        let (high, low) = vault.allocated_pnl(exchange(), &amm).unwrap();
        assert_eq!(high, dec!(-300));
        assert_eq!(low, dec!(-300));
    }

    #[test]
    fn oversized_loss_clamps_to_tranche_liquidity() {
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::High, dec!(100), t(0))
            .unwrap();
        vault
            .add_liquidity(&cfg(), exchange(), lp(), Tranche::Low, dec!(50), t(0))
            .unwrap();

        // aggregate liquidity 150 cannot absorb a 400 loss; each tranche is
        // clamped at its own balance and the remainder stays unallocated
        let amm = FixedPnl { pnl: dec!(-400), open: true };
        let (high, low) = vault.allocated_pnl(exchange(), &amm).unwrap();
        assert_eq!(high, dec!(-100));
        assert_eq!(low, dec!(-50));
    }

    #[test]
    fn cached_liquidity_folds_once_into_high() {
        let config = cfg();
        let mut vault = vault_with_exchange();
        vault
            .add_cached_liquidity(&config, config.counterparty, exchange(), dec!(500), t(0))
            .unwrap();

        let funds = vault.funds(exchange()).unwrap();
        assert_eq!(funds.cached_liquidity, dec!(500));
        assert_eq!(funds.high.total_liquidity, dec!(0));

        // next liquidity event folds the pending amount into High
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::Low, dec!(100), t(10))
            .unwrap();
        let funds = vault.funds(exchange()).unwrap();
        assert_eq!(funds.cached_liquidity, dec!(0));
        assert_eq!(funds.high.total_liquidity, dec!(500));

        // a second fold is a no-op
        vault.fold_cached_liquidity(exchange()).unwrap();
        assert_eq!(vault.funds(exchange()).unwrap().high.total_liquidity, dec!(500));
    }

    #[test]
    fn cached_liquidity_requires_counterparty() {
        let config = cfg();
        let mut vault = vault_with_exchange();
        let res = vault.add_cached_liquidity(&config, AccountId(99), exchange(), dec!(500), t(0));
        assert!(matches!(res, Err(VaultError::Unauthorized)));
    }

    #[test]
    fn bad_debt_waterfall_components_sum() {
        let config = cfg();
        let mut vault = RiskVault::new(dec!(300));
        vault.register_exchange(&config, exchange());
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(1000), t(0))
            .unwrap();
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::Low, dec!(1000), t(0))
            .unwrap();

        // 300 insurance first, then 600 split 2:1 by weight
        let res = vault
            .realize_bad_debt(&config, config.counterparty, exchange(), dec!(900), t(10))
            .unwrap();
        assert_eq!(res.insurance, dec!(300));
        assert_eq!(res.high, dec!(400));
        assert_eq!(res.low, dec!(200));
        assert_eq!(res.insurance + res.high + res.low, res.bad_debt);

        assert_eq!(vault.insurance().balance, dec!(0));
        let funds = vault.funds(exchange()).unwrap();
        assert_eq!(funds.high.total_liquidity, dec!(600));
        assert_eq!(funds.low.total_liquidity, dec!(800));
    }

    #[test]
    fn bad_debt_reassigns_capped_tranche() {
        let config = cfg();
        let mut vault = RiskVault::new(dec!(0));
        vault.register_exchange(&config, exchange());
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(100), t(0))
            .unwrap();
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::Low, dec!(1000), t(0))
            .unwrap();

        // High owes 200 by weight but holds only 100; Low absorbs the rest
        let res = vault
            .realize_bad_debt(&config, config.counterparty, exchange(), dec!(300), t(10))
            .unwrap();
        assert_eq!(res.high, dec!(100));
        assert_eq!(res.low, dec!(200));
        assert_eq!(res.insurance, dec!(0));
    }

    #[test]
    fn bad_debt_bankrupt_when_capacity_short() {
        let config = cfg();
        let mut vault = RiskVault::new(dec!(50));
        vault.register_exchange(&config, exchange());
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(100), t(0))
            .unwrap();

        let res = vault.realize_bad_debt(&config, config.counterparty, exchange(), dec!(200), t(10));
        assert!(matches!(res, Err(VaultError::Bankrupt { .. })));

        // nothing was drained by the failed call
        assert_eq!(vault.insurance().balance, dec!(50));
        assert_eq!(vault.funds(exchange()).unwrap().high.total_liquidity, dec!(100));
    }

    #[test]
    fn withdraw_pays_from_vault_balance() {
        let config = cfg();
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(1000), t(0))
            .unwrap();

        vault
            .withdraw(&config, config.counterparty, exchange(), AccountId(77), dec!(400), t(10))
            .unwrap();
        assert_eq!(vault.funds(exchange()).unwrap().balance, dec!(600));

        let res = vault.withdraw(&config, config.counterparty, exchange(), AccountId(77), dec!(700), t(20));
        assert!(matches!(res, Err(VaultError::InsufficientFunds { .. })));

        let res = vault.withdraw(&config, AccountId(99), exchange(), AccountId(77), dec!(1), t(30));
        assert!(matches!(res, Err(VaultError::Unauthorized)));
    }

    #[test]
    fn set_max_loss_validates_range_and_exposure() {
        let config = cfg();
        let mut vault = vault_with_exchange();
        vault
            .add_liquidity(&config, exchange(), lp(), Tranche::High, dec!(1000), t(0))
            .unwrap();

        let flat = FixedPnl { pnl: dec!(0), open: true };
        let res = vault.set_max_loss(&config, config.owner, exchange(), Tranche::High, 0, &flat);
        assert!(matches!(res, Err(VaultError::InvalidMaxLoss { .. })));
        let res = vault.set_max_loss(&config, config.owner, exchange(), Tranche::High, 10_001, &flat);
        assert!(matches!(res, Err(VaultError::InvalidMaxLoss { .. })));

        vault
            .set_max_loss(&config, config.owner, exchange(), Tranche::High, 2000, &flat)
            .unwrap();
        assert_eq!(vault.funds(exchange()).unwrap().high.max_loss_bps, 2000);

        // a 300 loss sits entirely on High; a 20% cap (200) cannot hold it
        let losing = FixedPnl { pnl: dec!(-300), open: true };
        let res = vault.set_max_loss(&config, config.owner, exchange(), Tranche::High, 2000, &losing);
        assert!(matches!(res, Err(VaultError::FundNotEnough { .. })));
        vault
            .set_max_loss(&config, config.owner, exchange(), Tranche::High, 5000, &losing)
            .unwrap();
    }

    #[test]
    fn set_weight_requires_one_nonzero() {
        let config = cfg();
        let mut vault = vault_with_exchange();

        let res = vault.set_risk_liquidity_weight(&config, config.owner, exchange(), 0, 0);
        assert!(matches!(res, Err(VaultError::InvalidWeight)));

        vault
            .set_risk_liquidity_weight(&config, config.owner, exchange(), 800, 0)
            .unwrap();
        let funds = vault.funds(exchange()).unwrap();
        assert_eq!(funds.high.weight, 800);
        assert_eq!(funds.low.weight, 0);

        let res = vault.set_risk_liquidity_weight(&config, AccountId(9), exchange(), 1, 1);
        assert!(matches!(res, Err(VaultError::Unauthorized)));
    }

    #[test]
    fn unknown_exchange_rejected() {
        let mut vault = RiskVault::new(dec!(0));
        let res = vault.add_liquidity(&cfg(), ExchangeId(9), lp(), Tranche::High, dec!(1), t(0));
        assert!(matches!(res, Err(VaultError::UnknownExchange(_))));
        assert_eq!(vault.available_liquidity(ExchangeId(9)), dec!(0));
    }
}
