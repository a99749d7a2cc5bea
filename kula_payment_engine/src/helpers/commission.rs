//! The commission calculator.
//!
//! A pure function over its inputs: it never consults live configuration, so audit and repair passes that replay it
//! with a recorded rate are reproducible.

use kpg_common::Money;
use serde::{Deserialize, Serialize};

/// How an order's money is divided: the platform takes its commission from the subtotal, the vendor gets the rest,
/// and the delivery fee passes through to the rider untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionSplit {
    pub platform_commission: Money,
    pub vendor_share: Money,
    pub rider_share: Money,
}

/// Computes the commission split for an order.
///
/// `rate_percent` is the platform's cut of the subtotal, 0–100. The commission is rounded half-up to the nearest
/// cent and the vendor share is the exact remainder, so `vendor_share + platform_commission == subtotal` holds in
/// cents, not merely within tolerance.
pub fn split(subtotal: Money, delivery_fee: Money, rate_percent: f64) -> CommissionSplit {
    let raw = subtotal.cents() as f64 * rate_percent / 100.0;
    let platform_commission = Money::from((raw + 0.5).floor() as i64);
    let vendor_share = subtotal - platform_commission;
    CommissionSplit { platform_commission, vendor_share, rider_share: delivery_fee }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn the_canonical_example() {
        // 1000 subtotal, 100 delivery fee, 10% commission
        let s = split(Money::from_kes(1000), Money::from_kes(100), 10.0);
        assert_eq!(s.platform_commission, Money::from_kes(100));
        assert_eq!(s.vendor_share, Money::from_kes(900));
        assert_eq!(s.rider_share, Money::from_kes(100));
    }

    #[test]
    fn shares_always_sum_back_to_the_subtotal() {
        let cases = [
            (100_00, 0, 0.0),
            (999_99, 50_00, 10.0),
            (1_00, 10_00, 33.3),
            (12345_67, 250_00, 15.5),
            (1, 1, 99.9),
        ];
        for (subtotal, fee, rate) in cases {
            let subtotal = Money::from(subtotal);
            let fee = Money::from(fee);
            let s = split(subtotal, fee, rate);
            assert_eq!(s.vendor_share + s.platform_commission, subtotal, "rate {rate} subtotal {subtotal}");
            assert_eq!(s.rider_share, fee);
        }
    }

    #[test]
    fn commission_rounds_half_up() {
        // 0.125% of KES 100.00 is 12.5 cents
        let s = split(Money::from_kes(100), Money::default(), 0.125);
        assert_eq!(s.platform_commission, Money::from(13));
        assert_eq!(s.vendor_share, Money::from(100_00 - 13));
    }

    #[test]
    fn zero_rate_gives_the_vendor_everything() {
        let s = split(Money::from_kes(500), Money::from_kes(80), 0.0);
        assert_eq!(s.platform_commission, Money::default());
        assert_eq!(s.vendor_share, Money::from_kes(500));
        assert_eq!(s.rider_share, Money::from_kes(80));
    }
}
