//! Decimal-aware price and fee-growth math (C1).
//!
//! All values in and out are [`Amount`] smallest-unit integers; these
//! functions only handle the power-of-ten scaling between differently-keyed
//! decimal precisions. Division truncates toward zero, consistent with the
//! rest of this core's smallest-unit math.

use crate::amount::Amount;

/// The fee-growth accumulator is always normalized to 18 decimals, matching
/// the `feeGrowthDelta` formula and the `UserLiquidityPosition`
/// `feeGrowthEntry{A,B}` fields.
pub const FEE_GROWTH_DECIMALS: u32 = 18;

/// `decimalAwarePrice(amountIn, amountOut, quoteDecimals, baseDecimals)`.
///
/// Returns a price in quote-smallest-units per one base-whole-unit, scaled by
/// `10^quoteDecimals`. `delta = baseDecimals - quoteDecimals` (reverse of the
/// source swap direction, per §4.1). Returns `Amount::zero()` if `amountOut`
/// is zero (caller is expected to have already rejected that case upstream;
/// this function never panics or divides by zero). Never returns a negative
/// price; when direct division would truncate to 0 despite both `amountIn`
/// and `amountOut` being positive, the numerator is rescaled by successive
/// powers of ten and the division retried, per §4.1's underflow rule.
pub fn decimal_aware_price(
    amount_in: &Amount,
    amount_out: &Amount,
    quote_decimals: u32,
    base_decimals: u32,
) -> Amount {
    if amount_out.is_zero() {
        return Amount::zero();
    }

    let quote_scale = Amount::pow10(quote_decimals);

    if base_decimals >= quote_decimals {
        let delta = base_decimals - quote_decimals;
        let scale = Amount::pow10(delta);
        let numerator = amount_in.checked_mul(&scale).checked_mul(&quote_scale);
        divide_with_underflow_rescale(&numerator, amount_out, amount_in)
    } else {
        let delta = quote_decimals - base_decimals;
        let scale = Amount::pow10(delta);
        let numerator = amount_in.checked_mul(&quote_scale);
        let denominator = amount_out.checked_mul(&scale);
        divide_with_underflow_rescale(&numerator, &denominator, amount_in)
    }
}

/// `numerator / denominator`, rescaling the numerator by an extra power of
/// ten and retrying when the direct division truncates to 0 despite both
/// `amount_in` and `denominator` being positive. Caps at 36 extra digits,
/// comfortably beyond any realistic token decimals spread.
fn divide_with_underflow_rescale(numerator: &Amount, denominator: &Amount, amount_in: &Amount) -> Amount {
    if let Some(direct) = numerator.checked_div(denominator) {
        if direct.is_positive() || !amount_in.is_positive() || !denominator.is_positive() {
            return direct;
        }
        let mut scaled = numerator.clone();
        for _ in 0..36 {
            scaled = scaled.checked_mul(&Amount::from_i128(10));
            if let Some(candidate) = scaled.checked_div(denominator) {
                if candidate.is_positive() {
                    return candidate;
                }
            }
        }
        direct
    } else {
        Amount::zero()
    }
}

/// `feeGrowthDelta(feeAmount, tokenDecimals, totalLp)`.
///
/// Normalizes `feeAmount` to 18 decimals and spreads it per unit of LP token.
/// Returns zero if `totalLp <= 0` or `feeAmount <= 0`.
pub fn fee_growth_delta(fee_amount: &Amount, token_decimals: u32, total_lp: &Amount) -> Amount {
    if total_lp.is_negative() || total_lp.is_zero() || fee_amount.is_negative() || fee_amount.is_zero() {
        return Amount::zero();
    }
    let norm_scale = Amount::pow10(FEE_GROWTH_DECIMALS.saturating_sub(token_decimals));
    let fee_growth_scale = Amount::pow10(FEE_GROWTH_DECIMALS);
    let numerator = fee_amount.checked_mul(&norm_scale).checked_mul(&fee_growth_scale);
    numerator.checked_div(total_lp).unwrap_or_else(Amount::zero)
}

/// Divides `feeGrowthDelta * lp_amount` back down by `10^18` to get a payout
/// in the token's own smallest units — the inverse used by remove-liquidity
/// and claim-fees (§4.6) to turn `(global - entry) * lp / 10^18` into a payout.
pub fn fee_growth_payout(fee_growth_delta: &Amount, lp_amount: &Amount) -> Amount {
    let scale = Amount::pow10(FEE_GROWTH_DECIMALS);
    fee_growth_delta
        .checked_mul(lp_amount)
        .checked_div(&scale)
        .unwrap_or_else(Amount::zero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn price_scenario_order_book() {
        // Scenario 4 (spec §8): 100 base @ 10 quote/base, tickSize=1.
        // decimalAwarePrice isn't exercised directly there (price is quoted
        // directly), but exercise the AMM swap scenario (§8 scenario 3) instead.
        let amount_in = Amount::from_str("10000").unwrap();
        let amount_out = Amount::from_str("19742").unwrap();
        // both tokens share 0 decimals for this synthetic check; direct
        // 10000/19742 truncates to 0, so the underflow rescale kicks in.
        let price = decimal_aware_price(&amount_in, &amount_out, 0, 0);
        assert_eq!(price.to_string(), "5"); // 100000/19742 == 5 once rescaled by one extra power of ten
    }

    #[test]
    fn price_direct_division_used_when_nonzero() {
        let amount_in = Amount::from_str("200").unwrap();
        let amount_out = Amount::from_str("50").unwrap();
        let price = decimal_aware_price(&amount_in, &amount_out, 0, 0);
        assert_eq!(price.to_string(), "4");
    }

    #[test]
    fn fee_growth_delta_zero_cases() {
        let fee = Amount::from_i128(30);
        assert_eq!(fee_growth_delta(&fee, 8, &Amount::zero()), Amount::zero());
        assert_eq!(
            fee_growth_delta(&Amount::zero(), 8, &Amount::from_i128(100)),
            Amount::zero()
        );
    }

    #[test]
    fn fee_growth_delta_and_payout_roundtrip() {
        let fee = Amount::from_i128(30);
        let total_lp = Amount::from_i128(1_000_000);
        let delta = fee_growth_delta(&fee, 8, &total_lp);
        // fee normalized to 18 decimals: 30 * 10^10, scaled by 10^18, / 1e6
        // payout for the full LP supply should reproduce ~fee (up to truncation)
        let payout = fee_growth_payout(&delta, &total_lp);
        assert_eq!(payout, fee);
    }
}
