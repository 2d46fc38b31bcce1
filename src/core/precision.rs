// Rounding to exchange tick and step sizes

use rust_decimal::{Decimal, RoundingStrategy};

/// Round `value` down to a multiple of `step`. A non-positive step leaves the value unchanged.
pub fn round_down(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).floor() * step).normalize()
}

/// Round `value` up to a multiple of `step`
pub fn round_up(value: Decimal, step: Decimal) -> Decimal {
    if step <= Decimal::ZERO {
        return value;
    }
    ((value / step).ceil() * step).normalize()
}

/// Round to a fixed number of decimal places for display
pub fn round_dp(value: Decimal, dp: u32) -> Decimal {
    value.round_dp_with_strategy(dp, RoundingStrategy::MidpointNearestEven)
}

/// Quantity for a limit order at `price`, scaled up when it would fall under
/// the exchange minimum notional
pub fn scale_to_min_notional(
    qty: Decimal,
    price: Decimal,
    min_notional: Decimal,
    fee_buffer: Decimal,
    amount_step: Decimal,
) -> Decimal {
    if price <= Decimal::ZERO || qty * price >= min_notional {
        return qty;
    }
    round_up(min_notional / price * (Decimal::ONE + fee_buffer), amount_step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_round_down_to_tick() {
        assert_eq!(round_down(dec!(0.20201234), dec!(0.00001)), dec!(0.20201));
        assert_eq!(round_down(dec!(24.975), dec!(1)), dec!(24));
        assert_eq!(round_down(dec!(24.975), dec!(0.1)), dec!(24.9));
    }

    #[test]
    fn test_round_up_to_step() {
        assert_eq!(round_up(dec!(5.01), dec!(1)), dec!(6));
        assert_eq!(round_up(dec!(5), dec!(1)), dec!(5));
        assert_eq!(round_up(dec!(0.123), dec!(0.01)), dec!(0.13));
    }

    #[test]
    fn test_zero_step_is_identity() {
        assert_eq!(round_down(dec!(1.2345), Decimal::ZERO), dec!(1.2345));
        assert_eq!(round_up(dec!(1.2345), Decimal::ZERO), dec!(1.2345));
    }

    #[test]
    fn test_min_notional_scaling() {
        // 4 * 0.2 = 0.8 < 1 -> 1 / 0.2 * 1.001 = 5.005 -> 6
        let qty = scale_to_min_notional(dec!(4), dec!(0.2), dec!(1), dec!(0.001), dec!(1));
        assert_eq!(qty, dec!(6));

        let untouched = scale_to_min_notional(dec!(10), dec!(0.2), dec!(1), dec!(0.001), dec!(1));
        assert_eq!(untouched, dec!(10));
    }
}
