// 7.0: capacity/weight allocation math. pure functions over plain numbers so
// the waterfall and the PNL split can be tested without any vault state.
// slot 0 is the High tranche, slot 1 the Low tranche throughout.

use rust_decimal::Decimal;

pub const WEIGHT_DENOMINATOR: u32 = 1000;

pub fn weight_fraction(weight: u32) -> Decimal {
    Decimal::from(weight) / Decimal::from(WEIGHT_DENOMINATOR)
}

// 7.1: split a demand across two slots proportionally by weight, clamp each
// slot at its capacity and reassign the shortfall to the other slot's spare
// capacity. the result sums to the demand whenever aggregate capacity
// suffices, otherwise to the aggregate capacity.
pub fn split_by_weight_clamped(
    capacities: [Decimal; 2],
    weights: [u32; 2],
    demand: Decimal,
) -> [Decimal; 2] {
    if demand <= Decimal::ZERO {
        return [Decimal::ZERO, Decimal::ZERO];
    }
    let total_weight = Decimal::from(weights[0] + weights[1]);
    let share0 = if total_weight.is_zero() {
        demand / Decimal::TWO
    } else {
        demand * Decimal::from(weights[0]) / total_weight
    };

    let mut alloc = [share0.min(capacities[0]), (demand - share0).min(capacities[1])];
    let mut remainder = demand - alloc[0] - alloc[1];

    for slot in 0..2 {
        if remainder <= Decimal::ZERO {
            break;
        }
        let spare = capacities[slot] - alloc[slot];
        let extra = remainder.min(spare);
        alloc[slot] += extra;
        remainder -= extra;
    }
    alloc
}

// 7.2: allocate the MM-side counterparty PNL across two slots, each weighted
// by its share of weight-scaled liquidity. profit splits proportionally; a
// loss splits proportionally and is then clamped so no slot loses more than
// its own capacity. the unallocatable remainder of an oversized loss stays
// unallocated here and surfaces later as realized bad debt.
pub fn allocate_pnl(
    pnl: Decimal,
    weighted_liquidity: [Decimal; 2],
    capacities: [Decimal; 2],
) -> [Decimal; 2] {
    let total = weighted_liquidity[0] + weighted_liquidity[1];
    if total <= Decimal::ZERO || pnl.is_zero() {
        return [Decimal::ZERO, Decimal::ZERO];
    }
    let share0 = pnl * weighted_liquidity[0] / total;
    let share1 = pnl - share0;
    if pnl > Decimal::ZERO {
        [share0, share1]
    } else {
        [share0.max(-capacities[0]), share1.max(-capacities[1])]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn split_proportional_when_capacity_ample() {
        let alloc = split_by_weight_clamped([dec!(10000), dec!(20000)], [500, 250], dec!(300));
        assert_eq!(alloc, [dec!(200), dec!(100)]);
        assert_eq!(alloc[0] + alloc[1], dec!(300));
    }

    #[test]
    fn split_reassigns_capped_slot() {
        // slot 0 would owe 200 but can only pay 50; slot 1 absorbs the rest
        let alloc = split_by_weight_clamped([dec!(50), dec!(20000)], [500, 250], dec!(300));
        assert_eq!(alloc, [dec!(50), dec!(250)]);
        assert_eq!(alloc[0] + alloc[1], dec!(300));
    }

    #[test]
    fn split_reassigns_toward_slot_zero_too() {
        let alloc = split_by_weight_clamped([dec!(20000), dec!(40)], [500, 250], dec!(300));
        assert_eq!(alloc, [dec!(260), dec!(40)]);
    }

    #[test]
    fn split_caps_at_aggregate_capacity() {
        let alloc = split_by_weight_clamped([dec!(100), dec!(50)], [500, 250], dec!(300));
        assert_eq!(alloc, [dec!(100), dec!(50)]);
        // short by 150: caller decides whether that is bankruptcy
        assert_eq!(alloc[0] + alloc[1], dec!(150));
    }

    #[test]
    fn split_zero_demand() {
        let alloc = split_by_weight_clamped([dec!(100), dec!(50)], [500, 250], dec!(0));
        assert_eq!(alloc, [dec!(0), dec!(0)]);
    }

    #[test]
    fn split_with_one_zero_weight() {
        let alloc = split_by_weight_clamped([dec!(1000), dec!(1000)], [500, 0], dec!(300));
        assert_eq!(alloc, [dec!(300), dec!(0)]);
    }

    #[test]
    fn pnl_profit_splits_by_weighted_share() {
        // weighted: 10000*0.5 = 5000, 20000*0.25 = 5000 -> even split
        let alloc = allocate_pnl(dec!(600), [dec!(5000), dec!(5000)], [dec!(10000), dec!(20000)]);
        assert_eq!(alloc, [dec!(300), dec!(300)]);
    }

    #[test]
    fn pnl_loss_splits_and_sums() {
        let alloc = allocate_pnl(dec!(-600), [dec!(5000), dec!(5000)], [dec!(10000), dec!(20000)]);
        assert_eq!(alloc, [dec!(-300), dec!(-300)]);
    }

    #[test]
    fn pnl_loss_clamped_at_tranche_liquidity() {
        // aggregate liquidity 150 cannot absorb a 600 loss; each slot is
        // clamped at its own balance and the remainder stays unallocated
        let alloc = allocate_pnl(dec!(-600), [dec!(50), dec!(25)], [dec!(100), dec!(50)]);
        assert_eq!(alloc, [dec!(-100), dec!(-50)]);
    }

    #[test]
    fn pnl_no_liquidity_no_allocation() {
        let alloc = allocate_pnl(dec!(500), [dec!(0), dec!(0)], [dec!(0), dec!(0)]);
        assert_eq!(alloc, [dec!(0), dec!(0)]);
    }
}
