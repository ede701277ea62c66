// 4.0: per-block price-fluctuation guard. the reference price is fixed at the
// first snapshot of the block, so every trade inside one block is measured
// against the same band no matter how many trades came before it.

use rust_decimal::Decimal;

use crate::snapshots::SnapshotHistory;

// raised into AmmError::PriceFluctuation by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FluctuationViolation {
    pub entry_price: Decimal,
    pub new_price: Decimal,
    pub limit: Decimal,
}

// 4.1: spot price as of the block's entry: the newest snapshot strictly below
// the current block. when the whole history sits in the current block the
// oldest entry anchors instead.
pub fn block_entry_price(history: &SnapshotHistory, current_block: u64) -> Decimal {
    for idx in (0..history.len()).rev() {
        if let Some(snap) = history.get(idx) {
            if snap.block_height < current_block {
                return snap.spot_price();
            }
        }
    }
    // all snapshots belong to the current block
    history
        .get(0)
        .map(|s| s.spot_price())
        .unwrap_or_else(|| history.spot_price())
}

// 4.2: band check. a limit of zero disables the guard. a trade landing
// outside the band passes only when the override flag is set, the pre-trade
// price was still inside the band (one breach per block), and the trade's own
// displacement already exceeds the limit.
pub fn check_fluctuation(
    history: &SnapshotHistory,
    limit: Decimal,
    current_block: u64,
    pre_price: Decimal,
    post_price: Decimal,
    allow_override: bool,
) -> Result<(), FluctuationViolation> {
    if limit <= Decimal::ZERO {
        return Ok(());
    }
    let entry = block_entry_price(history, current_block);
    let upper = entry * (Decimal::ONE + limit);
    let lower = entry * (Decimal::ONE - limit);

    if post_price >= lower && post_price <= upper {
        return Ok(());
    }

    if allow_override {
        let pre_inside = pre_price >= lower && pre_price <= upper;
        let own_move = (post_price - pre_price).abs() / pre_price;
        if pre_inside && own_move > limit {
            return Ok(());
        }
    }

    Err(FluctuationViolation {
        entry_price: entry,
        new_price: post_price,
        limit,
    })
}
