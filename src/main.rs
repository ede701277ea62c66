//! Virtual AMM engine simulation.
//!
//! Walks the pricing core and the risk vault through a full market lifecycle:
//! bootstrap, swaps, oracle convergence, funding, bad debt, and shutdown.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use vamm_core::*;

fn main() {
    println!("Virtual AMM Pricing Engine Simulation");
    println!("Constant-Product Core, Two-Tranche Vault, Full Lifecycle\n");

    scenario_1_bootstrap_and_swaps();
    scenario_2_twap_tracking();
    scenario_3_oracle_convergence();
    scenario_4_funding_settlement();
    scenario_5_bad_debt_waterfall();
    scenario_6_shutdown_settlement();

    println!("\nAll simulations completed successfully.");
}

fn stamp(height: u64, secs: i64) -> BlockStamp {
    BlockStamp::new(height, Timestamp::from_secs(secs))
}

/// Basic swaps against a fresh pool.
fn scenario_1_bootstrap_and_swaps() {
    println!("Scenario 1: Bootstrap and Swaps\n");

    let cfg = ExchangeConfig {
        fluctuation_limit_ratio: dec!(0),
        ..ExchangeConfig::default()
    };
    let mut amm = Amm::new(ExchangeId(1), dec!(1000), dec!(100), &cfg, stamp(1, 0)).unwrap();

    println!("  Pool opens with 1000 quote / 100 base, spot ${}", amm.spot_price());

    let result = amm
        .swap_input(&cfg, Direction::AddToAmm, dec!(600), dec!(0), false, stamp(2, 10))
        .unwrap();
    println!(
        "  Trader buys with 600 quote, receives {} base, spot now ${}",
        result.base_asset_amount,
        amm.spot_price()
    );

    let result = amm
        .swap_output(&cfg, Direction::AddToAmm, result.base_asset_amount, dec!(0), false, stamp(3, 20))
        .unwrap();
    println!(
        "  Trader sells the base back for {} quote, spot ${}\n",
        result.quote_asset_amount,
        amm.spot_price()
    );
}

/// Snapshot history and time-weighted prices.
fn scenario_2_twap_tracking() {
    println!("Scenario 2: TWAP Tracking\n");

    let cfg = ExchangeConfig {
        fluctuation_limit_ratio: dec!(0),
        ..ExchangeConfig::default()
    };
    let mut amm = Amm::new(ExchangeId(1), dec!(1000), dec!(100), &cfg, stamp(1, 0)).unwrap();

    for (block, secs, quote) in [(2u64, 300i64, dec!(50)), (3, 600, dec!(50)), (4, 900, dec!(50))] {
        amm.swap_input(&cfg, Direction::AddToAmm, quote, dec!(0), false, stamp(block, secs))
            .unwrap();
        println!("  t={}s spot ${}", secs, amm.spot_price());
    }

    let twap = amm.twap_price(900, Timestamp::from_secs(900));
    println!("  15 minute TWAP: ${}", twap);

    let base_for_ten = amm
        .input_twap(Direction::AddToAmm, dec!(10), Timestamp::from_secs(900))
        .unwrap();
    let quote_for_one = amm
        .output_twap(Direction::AddToAmm, dec!(1), Timestamp::from_secs(900))
        .unwrap();
    println!("  time-weighted fill for a 10-quote buy: {} base", base_for_ten);
    println!("  time-weighted payout for selling 1 base: {} quote", quote_for_one);
    println!("  snapshots recorded: {}\n", amm.history().len());
}

/// Oracle convergence gated by vault depth.
fn scenario_3_oracle_convergence() {
    println!("Scenario 3: Oracle Convergence\n");

    let cfg = ExchangeConfig::default();
    let vault_cfg = VaultConfig::default();
    let mut amm = Amm::new(ExchangeId(1), dec!(1000), dec!(100), &cfg, stamp(1, 0)).unwrap();
    let mut vault = RiskVault::new(dec!(0));
    vault.register_exchange(&vault_cfg, ExchangeId(1));

    vault
        .add_liquidity(&vault_cfg, ExchangeId(1), AccountId(10), Tranche::High, dec!(10000), Timestamp::from_secs(0))
        .unwrap();
    vault
        .add_liquidity(&vault_cfg, ExchangeId(1), AccountId(10), Tranche::Low, dec!(20000), Timestamp::from_secs(0))
        .unwrap();
    println!("  Vault depth: {}", vault.available_liquidity(ExchangeId(1)));

    let moved = amm
        .move_price_to_oracle(&cfg, dec!(10.5), "BTC-PERP", &vault, stamp(2, 10))
        .unwrap();
    println!("  Oracle at $10.50, moved: {}, spot now ${}\n", moved, amm.spot_price());
}

/// Funding cadence: regular advance vs catch-up.
fn scenario_4_funding_settlement() {
    println!("Scenario 4: Funding Settlement\n");

    let cfg = ExchangeConfig::default();
    let mut amm = Amm::new(ExchangeId(1), dec!(1000), dec!(100), &cfg, stamp(1, 0)).unwrap();
    let oracle = MockOracle::new(dec!(10));

    let rate = amm
        .settle_funding(&cfg, cfg.counterparty, &oracle, stamp(2, 3600))
        .unwrap();
    println!("  Settled on time, rate {}, next at {}", rate, amm.funding().next_funding_time);

    let rate = amm
        .settle_funding(&cfg, cfg.counterparty, &oracle, stamp(3, 30_000))
        .unwrap();
    println!(
        "  Settled after a missed window, rate {}, next at {}\n",
        rate,
        amm.funding().next_funding_time
    );
}

/// Insurance buffer, then tranches by weight.
fn scenario_5_bad_debt_waterfall() {
    println!("Scenario 5: Bad Debt Waterfall\n");

    let vault_cfg = VaultConfig::default();
    let mut vault = RiskVault::new(dec!(300));
    vault.register_exchange(&vault_cfg, ExchangeId(1));
    vault
        .add_liquidity(&vault_cfg, ExchangeId(1), AccountId(10), Tranche::High, dec!(1000), Timestamp::from_secs(0))
        .unwrap();
    vault
        .add_liquidity(&vault_cfg, ExchangeId(1), AccountId(11), Tranche::Low, dec!(1000), Timestamp::from_secs(0))
        .unwrap();

    let res = vault
        .realize_bad_debt(&vault_cfg, vault_cfg.counterparty, ExchangeId(1), dec!(900), Timestamp::from_secs(10))
        .unwrap();
    println!("  900 bad debt resolved:");
    println!("    insurance: {}", res.insurance);
    println!("    High tranche: {}", res.high);
    println!("    Low tranche: {}", res.low);

    let res = vault.realize_bad_debt(&vault_cfg, vault_cfg.counterparty, ExchangeId(1), dec!(5000), Timestamp::from_secs(20));
    println!("  5000 more: {:?}\n", res.err().map(|e| e.to_string()));
}

/// Shutdown with an insolvent book solves the settlement price.
fn scenario_6_shutdown_settlement() {
    println!("Scenario 6: Shutdown Settlement\n");

    let cfg = ExchangeConfig::default();
    let vault_cfg = VaultConfig::default();
    let mut amm = Amm::new(ExchangeId(1), dec!(1000), dec!(100), &cfg, stamp(1, 0)).unwrap();
    let mut vault = RiskVault::new(dec!(0));
    vault.register_exchange(&vault_cfg, ExchangeId(1));
    vault
        .add_liquidity(&vault_cfg, ExchangeId(1), AccountId(10), Tranche::High, dec!(100), Timestamp::from_secs(0))
        .unwrap();

    // traders are net long far beyond what the vault can cover
    amm.set_open_exposure(
        &cfg,
        cfg.counterparty,
        OpenExposure {
            long_base: dec!(50),
            long_notional: dec!(100),
            short_base: Decimal::ZERO,
            short_notional: Decimal::ZERO,
        },
    )
    .unwrap();

    let loss = -amm.unrealized_pnl(amm.reserves()).unwrap();
    println!("  MM loss at spot: {}", loss);
    println!("  Vault depth: {}", vault.available_liquidity(ExchangeId(1)));

    let settlement = amm
        .shutdown(&cfg, cfg.owner, &vault, Timestamp::from_secs(100))
        .unwrap();
    println!("  Settlement price solved: ${}", settlement.round_dp(6));

    let payout = vault
        .remove_liquidity_when_shutdown(
            &vault_cfg,
            ExchangeId(1),
            AccountId(10),
            Tranche::High,
            &amm,
            Timestamp::from_secs(110),
        )
        .unwrap();
    println!("  LP exits at the settlement-adjusted price: {}", payout.round_dp(6));
}
