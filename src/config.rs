// 8.0 config.rs: every owner-set ratio and address in one place. configs are
// passed by reference into operations instead of living as ambient state, so
// tests can run several independent setups side by side.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::AccountId;

// 8.1: AMM-side knobs. ratios are fractions (0.05 = 5%), periods in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub owner: AccountId,
    // the one contract allowed to call funding / exposure updates
    pub counterparty: AccountId,
    // oracle key this market is bound to (e.g. "BTC-PERP")
    pub price_key: String,
    // max fraction of a reserve a single swap may move; 0 disables
    pub trade_limit_ratio: Decimal,
    // per-block price band; 0 disables the guard
    pub fluctuation_limit_ratio: Decimal,
    // fraction of the spot-to-oracle gap closed per convergence move
    pub price_adjust_ratio: Decimal,
    // max |spot - oracle| / spot tolerated before a move is refused
    pub oracle_spread_limit: Decimal,
    pub funding_period_secs: i64,
    pub funding_buffer_secs: i64,
    // lookback for the funding premium TWAP
    pub funding_twap_interval_secs: i64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            owner: AccountId(1),
            counterparty: AccountId(2),
            price_key: "BTC-PERP".to_string(),
            trade_limit_ratio: dec!(0.9),
            fluctuation_limit_ratio: dec!(0.012),
            price_adjust_ratio: dec!(0.1),
            oracle_spread_limit: dec!(0.1),
            funding_period_secs: 3600,
            funding_buffer_secs: 1800,
            funding_twap_interval_secs: 900,
        }
    }
}

// 8.2: vault-side knobs. weights are per-mille of tranche liquidity counted
// as usable MM depth; these seed each exchange's funds and stay adjustable
// through the owner-gated setters afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub owner: AccountId,
    pub counterparty: AccountId,
    // LP deposits stay locked for this long
    pub lock_duration_secs: i64,
    // fraction of a withdrawal withheld and left in the pool
    pub withdraw_fee_ratio: Decimal,
    pub high_weight: u32,
    pub low_weight: u32,
    pub high_max_loss_bps: u32,
    pub low_max_loss_bps: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            owner: AccountId(1),
            counterparty: AccountId(2),
            lock_duration_secs: 24 * 3600,
            withdraw_fee_ratio: dec!(0.005),
            high_weight: 500,
            low_weight: 250,
            high_max_loss_bps: 5000,
            low_max_loss_bps: 2500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_defaults_sane() {
        let cfg = ExchangeConfig::default();
        assert!(cfg.trade_limit_ratio > Decimal::ZERO && cfg.trade_limit_ratio < Decimal::ONE);
        assert!(cfg.fluctuation_limit_ratio < dec!(0.1));
        assert!(cfg.funding_buffer_secs < cfg.funding_period_secs);
    }

    #[test]
    fn vault_defaults_sane() {
        let cfg = VaultConfig::default();
        assert!(cfg.high_weight > 0);
        assert!(cfg.high_weight <= 1000 && cfg.low_weight <= 1000);
        assert!(cfg.withdraw_fee_ratio < dec!(0.05));
    }
}
