//! Marketplace commission: the platform's cut of a peer-to-peer sale and the
//! remainder paid out to the seller. Rates are currency-dependent; the
//! internal currency is cheaper to incentivize its use.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::order::{Currency, Money};

/// Commission in basis points per currency.
fn rate_bps(currency: Currency) -> i64 {
    match currency {
        Currency::Usd => 1000,
        Currency::DiehardDollars => 500,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionResult {
    /// Fractional rate, e.g. 0.10
    pub rate: Decimal,
    pub commission_amount: Money,
    pub seller_payout: Money,
}

/// Computes the platform commission and seller payout for a sale amount.
/// Integer basis-point math: the commission is floored, and the payout is the
/// exact remainder, so `commission_amount + seller_payout == sale_amount`
/// always holds.
pub fn calculate(sale_amount: Money, currency: Currency) -> CommissionResult {
    let bps = rate_bps(currency);
    let commission_amount = sale_amount * bps / 10_000;
    CommissionResult {
        rate: Decimal::new(bps, 4).normalize(),
        commission_amount,
        seller_payout: sale_amount - commission_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_sales_pay_ten_percent() {
        let result = calculate(1000, Currency::Usd);
        assert_eq!(result.rate, Decimal::new(10, 2));
        assert_eq!(result.commission_amount, 100);
        assert_eq!(result.seller_payout, 900);
    }

    #[test]
    fn internal_currency_sales_pay_five_percent() {
        let result = calculate(1000, Currency::DiehardDollars);
        assert_eq!(result.rate, Decimal::new(5, 2));
        assert_eq!(result.commission_amount, 50);
        assert_eq!(result.seller_payout, 950);
    }

    #[test]
    fn commission_plus_payout_is_always_the_sale_amount() {
        for amount in [1, 7, 99, 1001, 123_457] {
            for currency in [Currency::Usd, Currency::DiehardDollars] {
                let r = calculate(amount, currency);
                assert_eq!(r.commission_amount + r.seller_payout, amount);
            }
        }
    }

    #[test]
    fn odd_amounts_floor_the_commission() {
        // 999 * 5% = 49.95 -> 49 to the platform, 950 to the seller
        let r = calculate(999, Currency::DiehardDollars);
        assert_eq!(r.commission_amount, 49);
        assert_eq!(r.seller_payout, 950);
    }
}
