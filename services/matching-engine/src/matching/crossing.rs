//! Crossing detection logic
//!
//! Determines when an incoming order can match a resting price. The
//! boundary is inclusive: equal prices match.

use types::numeric::Price;
use types::order::Side;

/// Check if a bid and ask can match at given prices
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check if an incoming order at `incoming_price` crosses `resting_price`
/// on the opposite side.
pub fn incoming_can_match(incoming_side: Side, incoming_price: Price, resting_price: Price) -> bool {
    match incoming_side {
        Side::BUY => incoming_price >= resting_price,
        Side::SELL => incoming_price <= resting_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_match_crossing() {
        assert!(can_match(Price::from_u64(50000), Price::from_u64(49000)));
    }

    #[test]
    fn test_can_match_exact_boundary() {
        let price = Price::from_u64(50000);
        assert!(can_match(price, price), "equal prices must match");
    }

    #[test]
    fn test_can_match_no_cross() {
        assert!(!can_match(Price::from_u64(49000), Price::from_u64(50000)));
    }

    #[test]
    fn test_incoming_buy_can_match() {
        assert!(incoming_can_match(
            Side::BUY,
            Price::from_u64(50000),
            Price::from_u64(49000)
        ));
        assert!(!incoming_can_match(
            Side::BUY,
            Price::from_u64(48000),
            Price::from_u64(49000)
        ));
    }

    #[test]
    fn test_incoming_sell_can_match() {
        assert!(incoming_can_match(
            Side::SELL,
            Price::from_u64(49000),
            Price::from_u64(50000)
        ));
        assert!(!incoming_can_match(
            Side::SELL,
            Price::from_u64(51000),
            Price::from_u64(50000)
        ));
    }
}
