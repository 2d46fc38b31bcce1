// Geometric grid ladder generation

use std::collections::VecDeque;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::{TradingError, TradingResult};

/// Upper bound on ladder size; a smaller step is rejected
pub const MAX_LEVELS: usize = 5000;

/// Upper bound on levels walked when only the top of a ladder is needed
pub const MAX_WALK_STEPS: usize = 1_000_000;

const SNAP_EPSILON: Decimal = dec!(0.000000001);

/// Geometric step rule shared by the full ladder and the partial walk
struct Ladder {
    low: Decimal,
    high: Decimal,
    step_pct: Decimal,
    factor: Decimal,
    dp: u32,
}

impl Ladder {
    fn new(low: Decimal, high: Decimal, step_pct: Decimal) -> TradingResult<Self> {
        if low <= Decimal::ZERO {
            return Err(TradingError::InvalidParameter("low".into(), format!("must be positive, got {}", low)));
        }
        if high <= low {
            return Err(TradingError::InvalidParameter(
                "high".into(),
                format!("must be greater than low ({} <= {})", high, low),
            ));
        }
        if step_pct <= Decimal::ZERO {
            return Err(TradingError::InvalidParameter(
                "step_pct".into(),
                format!("must be positive, got {}", step_pct),
            ));
        }
        Ok(Self {
            low,
            high,
            step_pct,
            factor: Decimal::ONE + step_pct / dec!(100),
            dp: level_dp(low),
        })
    }

    fn next(&self, level: Decimal) -> TradingResult<Decimal> {
        let next = (level * self.factor).round_dp(self.dp);
        if next <= level {
            return Err(TradingError::InvalidParameter(
                "step_pct".into(),
                format!("{}% does not move a level of {}", self.step_pct, level),
            ));
        }
        Ok(next)
    }

    /// Whether the top of the body sits close enough to `high` to be replaced by it
    fn snaps(&self, last: Decimal) -> bool {
        (self.high - last) <= self.high * SNAP_EPSILON
    }
}

/// Rounding scale that keeps at least six significant digits at `low`
fn level_dp(low: Decimal) -> u32 {
    let mut dp = 12;
    let mut scaled = low * Decimal::from(1_000_000_000_000i64);
    while scaled < dec!(1000000) && dp < 28 {
        scaled *= dec!(10);
        dp += 1;
    }
    dp
}

/// Build a geometric ladder from `low` to `high`, each level `step_pct`% above
/// the previous one. The result starts at `low`, ends at `high` exactly and is
/// strictly increasing.
pub fn generate_levels(low: Decimal, high: Decimal, step_pct: Decimal) -> TradingResult<Vec<Decimal>> {
    let ladder = Ladder::new(low, high, step_pct)?;
    let mut levels = vec![low];
    let mut price = low;

    loop {
        let next = ladder.next(price)?;
        if next > high {
            break;
        }
        if levels.len() >= MAX_LEVELS {
            return Err(TradingError::InvalidParameter(
                "step_pct".into(),
                format!("{}% between {} and {} exceeds {} levels", step_pct, low, high, MAX_LEVELS),
            ));
        }
        levels.push(next);
        price = next;
    }

    let idx = levels.len() - 1;
    if ladder.snaps(levels[idx]) && idx > 0 {
        levels[idx] = high;
    } else {
        levels.push(high);
    }

    Ok(levels)
}

/// The `n` highest levels of the `generate_levels` ladder at or below `price`,
/// nearest first, each with its index in the ladder.
///
/// Only the top of the walk is kept, so a wide range close to zero is not
/// subject to `MAX_LEVELS`.
pub fn levels_at_or_below(
    low: Decimal,
    high: Decimal,
    step_pct: Decimal,
    price: Decimal,
    n: usize,
) -> TradingResult<Vec<(usize, Decimal)>> {
    let ladder = Ladder::new(low, high, step_pct)?;
    if n == 0 || price < ladder.low {
        return Ok(Vec::new());
    }

    let keep = n + 1;
    let mut window: VecDeque<(usize, Decimal)> = VecDeque::with_capacity(keep + 1);
    window.push_back((0, low));
    let mut idx = 0;
    let mut level = low;

    loop {
        let next = ladder.next(level)?;
        if next > ladder.high {
            let top = if ladder.snaps(level) && idx > 0 {
                window.pop_back();
                idx
            } else {
                idx + 1
            };
            if ladder.high <= price {
                window.push_back((top, ladder.high));
            }
            break;
        }
        if next > price {
            break;
        }
        idx += 1;
        if idx >= MAX_WALK_STEPS {
            return Err(TradingError::InvalidParameter(
                "step_pct".into(),
                format!("{}% between {} and {} exceeds {} levels", step_pct, low, price, MAX_WALK_STEPS),
            ));
        }
        window.push_back((idx, next));
        if window.len() > keep {
            window.pop_front();
        }
        level = next;
    }

    Ok(window.into_iter().rev().take(n).collect())
}

/// The `n` highest levels strictly below `last_price`, ascending
pub fn active_buy_window(levels: &[Decimal], last_price: Decimal, n: usize) -> Vec<Decimal> {
    let below: Vec<Decimal> = levels.iter().copied().filter(|l| *l < last_price).collect();
    let start = below.len().saturating_sub(n);
    below[start..].to_vec()
}

/// Width of one step at `price`, used to match an order to its level
pub fn step_width(price: Decimal, step_pct: Decimal) -> Decimal {
    price * step_pct / dec!(100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_bounds_and_order() {
        let levels = generate_levels(dec!(0.13), dec!(0.32), dec!(1.0)).unwrap();

        assert_eq!(levels[0], dec!(0.13));
        assert_eq!(*levels.last().unwrap(), dec!(0.32));
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
        // ln(0.32/0.13)/ln(1.01) ~ 90.5
        assert!(levels.len() >= 90 && levels.len() <= 93, "got {}", levels.len());
    }

    #[test]
    fn test_ladder_is_deterministic() {
        let a = generate_levels(dec!(1), dec!(2), dec!(5)).unwrap();
        let b = generate_levels(dec!(1), dec!(2), dec!(5)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_exact_multiple_snaps_to_high() {
        // 100 * 1.1 = 110 lands exactly on high
        let levels = generate_levels(dec!(100), dec!(110), dec!(10)).unwrap();
        assert_eq!(levels, vec![dec!(100), dec!(110)]);
    }

    #[test]
    fn test_step_larger_than_range() {
        let levels = generate_levels(dec!(1), dec!(1.5), dec!(80)).unwrap();
        assert_eq!(levels, vec![dec!(1), dec!(1.5)]);
    }

    #[test]
    fn test_rejects_invalid_input() {
        assert!(matches!(
            generate_levels(Decimal::ZERO, dec!(1), dec!(1)),
            Err(TradingError::InvalidParameter(p, _)) if p == "low"
        ));
        assert!(generate_levels(dec!(2), dec!(1), dec!(1)).is_err());
        assert!(generate_levels(dec!(1), dec!(2), Decimal::ZERO).is_err());
    }

    #[test]
    fn test_rejects_runaway_ladder() {
        let result = generate_levels(dec!(0.0001), dec!(1000), dec!(0.01));
        assert!(matches!(result, Err(TradingError::InvalidParameter(_, _))));
    }

    #[test]
    fn test_tiny_low_keeps_precision() {
        let low = dec!(0.0000000000001);
        let levels = generate_levels(low, dec!(0.0000000000002), dec!(10)).unwrap();
        assert_eq!(levels[0], low);
        assert_eq!(*levels.last().unwrap(), dec!(0.0000000000002));
        assert!(levels.windows(2).all(|w| w[0] < w[1]));
        assert!(levels.len() > 5);
    }

    #[test]
    fn test_partial_walk_matches_full_ladder() {
        let levels = generate_levels(dec!(0.13), dec!(0.32), dec!(1.0)).unwrap();
        let top = levels_at_or_below(dec!(0.13), dec!(0.32), dec!(1.0), dec!(0.20), 4).unwrap();

        let expected: Vec<(usize, Decimal)> = levels
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, l)| *l <= dec!(0.20))
            .rev()
            .take(4)
            .collect();
        assert_eq!(top, expected);
    }

    #[test]
    fn test_partial_walk_includes_high_above_the_ladder() {
        let levels = generate_levels(dec!(1), dec!(1.5), dec!(10)).unwrap();
        let top = levels_at_or_below(dec!(1), dec!(1.5), dec!(10), dec!(2), 2).unwrap();
        let n = levels.len();
        assert_eq!(top, vec![(n - 1, dec!(1.5)), (n - 2, levels[n - 2])]);

        assert!(levels_at_or_below(dec!(1), dec!(1.5), dec!(10), dec!(0.5), 3).unwrap().is_empty());
    }

    #[test]
    fn test_partial_walk_near_zero_ignores_level_cap() {
        // Too many levels for a full ladder
        assert!(generate_levels(dec!(0.000000001), dec!(0.190000001), dec!(0.3)).is_err());

        let top = levels_at_or_below(dec!(0.000000001), dec!(0.190000001), dec!(0.3), dec!(0.05), 7).unwrap();
        assert_eq!(top.len(), 7);
        assert!(top[0].0 > MAX_LEVELS);
        assert!(top.iter().all(|(_, l)| *l <= dec!(0.05)));
        assert!(top.windows(2).all(|w| w[0].1 > w[1].1));
    }

    #[test]
    fn test_active_buy_window() {
        let levels = vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)];
        assert_eq!(active_buy_window(&levels, dec!(4), 2), vec![dec!(2), dec!(3)]);
        assert_eq!(active_buy_window(&levels, dec!(1), 3), Vec::<Decimal>::new());
        assert_eq!(active_buy_window(&levels, dec!(10), 10), levels);
    }
}
