// 9.0: the oracle seam. the engine never fetches prices itself; whoever hosts
// it hands in something implementing PriceOracle. the mock keeps tests and
// the sim deterministic.

use rust_decimal::Decimal;

// index-price provider keyed by market symbol
pub trait PriceOracle {
    fn get_price(&self, key: &str) -> Decimal;
    fn get_twap_price(&self) -> Decimal;
}

#[derive(Debug, Clone)]
pub struct MockOracle {
    price: Decimal,
    twap: Decimal,
}

impl MockOracle {
    pub fn new(price: Decimal) -> Self {
        Self { price, twap: price }
    }

    pub fn set_price(&mut self, price: Decimal) {
        self.price = price;
    }

    pub fn set_twap(&mut self, twap: Decimal) {
        self.twap = twap;
    }
}

impl PriceOracle for MockOracle {
    fn get_price(&self, _key: &str) -> Decimal {
        self.price
    }

    fn get_twap_price(&self) -> Decimal {
        self.twap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mock_oracle_tracks_settings() {
        let mut oracle = MockOracle::new(dec!(10));
        assert_eq!(oracle.get_price("BTC-PERP"), dec!(10));
        assert_eq!(oracle.get_twap_price(), dec!(10));

        oracle.set_price(dec!(11));
        oracle.set_twap(dec!(10.5));
        assert_eq!(oracle.get_price("BTC-PERP"), dec!(11));
        assert_eq!(oracle.get_twap_price(), dec!(10.5));
    }
}
