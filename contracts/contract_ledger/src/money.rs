//! Fixed-point money helpers.

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Decimal places carried by every derived money amount.
pub const MONEY_SCALE: u32 = 2;

/// Largest amount the engine accepts for a single input value.
pub const MAX_AMOUNT: Decimal = dec!(1_000_000_000_000_000);

const ONE_HUNDRED: Decimal = dec!(100);

/// Round to cents, midpoint away from zero, always at [`MONEY_SCALE`].
pub fn round_money(value: Decimal) -> Decimal {
    let mut rounded = value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}

/// `base * percentage / 100`, unrounded.
pub fn percent_of(base: Decimal, percentage: Decimal) -> Decimal {
    base * percentage / ONE_HUNDRED
}

/// Apportion `total` across `weights` in proportion to each weight.
///
/// Returns `(proportion, share)` per weight. Shares are floored to cents and
/// the leftover cents go one at a time to the largest remainders (earliest
/// on ties), so shares are never negative and sum to `total` exactly. Any
/// sub-cent residue of `total` itself lands on the largest weight. When the
/// weights sum to zero, every proportion and share is zero.
pub fn apportion(total: Decimal, weights: &[Decimal]) -> Vec<(Decimal, Decimal)> {
    let weight_sum: Decimal = weights.iter().copied().sum();
    if weight_sum <= Decimal::ZERO {
        return weights.iter().map(|_| (Decimal::ZERO, Decimal::ZERO)).collect();
    }

    let exact: Vec<Decimal> = weights
        .iter()
        .map(|w| match w.checked_mul(total) {
            Some(product) => product / weight_sum,
            None => *w / weight_sum * total,
        })
        .collect();
    let mut shares: Vec<Decimal> = exact
        .iter()
        .map(|e| e.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::ToNegativeInfinity))
        .collect();

    let cent = Decimal::new(1, MONEY_SCALE);
    let mut remaining = total - shares.iter().copied().sum::<Decimal>();

    let mut order: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] > Decimal::ZERO).collect();
    order.sort_by(|&a, &b| {
        (exact[b] - shares[b])
            .cmp(&(exact[a] - shares[a]))
            .then(a.cmp(&b))
    });
    for i in order {
        if remaining < cent {
            break;
        }
        shares[i] += cent;
        remaining -= cent;
    }
    if !remaining.is_zero() {
        let mut largest = 0;
        for (i, w) in weights.iter().enumerate() {
            if *w > weights[largest] {
                largest = i;
            }
        }
        shares[largest] += remaining;
    }

    weights
        .iter()
        .zip(shares)
        .map(|(w, mut share)| {
            if share.scale() < MONEY_SCALE {
                share.rescale(MONEY_SCALE);
            }
            (*w / weight_sum, share)
        })
        .collect()
}
